use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::local_store::LocalStore;

const GALLERY_KEY_PREFIX: &str = "residue_link_gallery_";
const MUSIC_KEY_PREFIX: &str = "residue_link_music_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub name: String,
    pub src: String,
}

/// Gallery images and music tracks per profile slug.
#[derive(Clone)]
pub struct MediaStore {
    store: Arc<LocalStore>,
}

impl MediaStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub async fn gallery(&self, slug: &str) -> Vec<String> {
        self.store
            .get(&format!("{GALLERY_KEY_PREFIX}{slug}"))
            .await
            .unwrap_or_default()
    }

    pub async fn set_gallery(&self, slug: &str, images: &[String]) -> anyhow::Result<()> {
        self.store
            .set(&format!("{GALLERY_KEY_PREFIX}{slug}"), &images)
            .await
    }

    pub async fn music(&self, slug: &str) -> Vec<Track> {
        self.store
            .get(&format!("{MUSIC_KEY_PREFIX}{slug}"))
            .await
            .unwrap_or_default()
    }

    pub async fn set_music(&self, slug: &str, tracks: &[Track]) -> anyhow::Result<()> {
        self.store
            .set(&format!("{MUSIC_KEY_PREFIX}{slug}"), &tracks)
            .await
    }
}
