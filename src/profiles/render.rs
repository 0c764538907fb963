use std::time::Duration;

use tracing::debug;

use super::{
    codec::{decode_links, ProfileSettings},
    dto::{Affordance, AffordanceKind, PublicLink, PublicProfileView},
    repo::{ProfileRepository, Resolution},
    repo_types::{StoredProfile, Theme},
};
use crate::media::repo::MediaStore;

pub const PLACEHOLDER_NAME: &str = "Your name";
pub const PLACEHOLDER_TITLE: &str = "Your title";
pub const PLACEHOLDER_BIO: &str = "Add a short description.";
pub const PLACEHOLDER_AVATAR: &str = "https://placehold.co/200x200?text=Add+photo";

const NO_SLUG: &str = "No profile yet. Tap manage to add yours.";
const NOT_FOUND: &str = "Profile not found. Tap manage to create it.";
const UNAVAILABLE: &str = "Profile service unavailable right now.";

#[derive(Debug, Clone, Copy, Default)]
pub struct AssetPresence {
    pub gallery: bool,
    pub music: bool,
}

pub fn placeholder(status: &str, preview: bool) -> PublicProfileView {
    PublicProfileView {
        slug: None,
        name: PLACEHOLDER_NAME.into(),
        title: Some(PLACEHOLDER_TITLE.into()),
        bio: Some(PLACEHOLDER_BIO.into()),
        avatar_url: PLACEHOLDER_AVATAR.into(),
        theme: Theme::Dark,
        links: Vec::new(),
        affordances: Vec::new(),
        placeholder: true,
        preview,
        status: Some(status.into()),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Visible fields only: meta decoded first, hidden and meta links dropped, stored order kept.
pub fn view_from_profile(profile: &StoredProfile, assets: AssetPresence, preview: bool) -> PublicProfileView {
    let decoded = decode_links(&profile.links);
    let settings = ProfileSettings::from_meta(&decoded.visible_meta);

    let links = decoded
        .normal_links
        .into_iter()
        .filter(|l| !l.hidden)
        .map(|l| PublicLink {
            label: if l.label.trim().is_empty() { l.url.clone() } else { l.label },
            url: l.url,
        })
        .collect();

    let slug = urlencoding::encode(&profile.slug).into_owned();
    let mut affordances = Vec::new();
    if assets.gallery {
        affordances.push(Affordance {
            kind: AffordanceKind::Gallery,
            label: "View Gallery".into(),
            href: format!("gallery.html?u={slug}"),
        });
    }
    if assets.music {
        affordances.push(Affordance {
            kind: AffordanceKind::Music,
            label: "View Music".into(),
            href: format!("music.html?u={slug}"),
        });
    }

    PublicProfileView {
        slug: Some(profile.slug.clone()),
        name: non_empty(&profile.name).unwrap_or_else(|| PLACEHOLDER_NAME.into()),
        title: settings.show_title.then(|| non_empty(&profile.title)).flatten(),
        bio: settings.show_bio.then(|| non_empty(&profile.bio)).flatten(),
        avatar_url: non_empty(&profile.avatar_url).unwrap_or_else(|| PLACEHOLDER_AVATAR.into()),
        theme: profile.theme,
        links,
        affordances,
        placeholder: false,
        preview,
        status: None,
    }
}

pub fn normalize_slug(raw: Option<&str>) -> Option<String> {
    raw.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

async fn resolve(
    repo: &ProfileRepository,
    media: &MediaStore,
    slug: Option<String>,
    preview: bool,
) -> PublicProfileView {
    let Some(slug) = slug else {
        return placeholder(NO_SLUG, preview);
    };
    let profile = match repo.resolve_by_slug(&slug).await {
        Resolution::Remote(p) | Resolution::Draft(p) => p,
        Resolution::NotFound => return placeholder(NOT_FOUND, preview),
        Resolution::Unavailable(err) => {
            debug!(%slug, error = %err, "rendering placeholder for unreachable backend");
            return placeholder(UNAVAILABLE, preview);
        }
    };
    let assets = AssetPresence {
        gallery: !media.gallery(&slug).await.is_empty(),
        music: !media.music(&slug).await.is_empty(),
    };
    view_from_profile(&profile, assets, preview)
}

/// Resolves and renders, taking at least `min_dwell` so a fast lookup doesn't flash.
pub async fn render(
    repo: &ProfileRepository,
    media: &MediaStore,
    slug: Option<&str>,
    preview: bool,
    min_dwell: Duration,
) -> PublicProfileView {
    let slug = normalize_slug(slug);
    let (view, ()) = tokio::join!(
        resolve(repo, media, slug, preview),
        tokio::time::sleep(min_dwell)
    );
    view
}
