use serde::Serialize;

use super::repo::Track;

pub const SAMPLE_TRACK_NAME: &str = "Mock Track (Sample)";
pub const SAMPLE_TRACK_SRC: &str = "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-1.mp3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryImage {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryView {
    pub slug: String,
    pub title: String,
    pub back_href: String,
    pub images: Vec<GalleryImage>,
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackView {
    pub name: String,
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MusicView {
    pub slug: String,
    pub title: String,
    pub back_href: String,
    pub tracks: Vec<TrackView>,
    /// True when nothing was uploaded and the sample track stands in.
    pub sample: bool,
}

pub fn back_href(slug: &str) -> String {
    format!("link-profile.html?u={}", urlencoding::encode(slug))
}

fn titled(name: Option<&str>, suffix: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} {suffix}"),
        None => suffix.to_string(),
    }
}

pub fn gallery_view(slug: &str, owner_name: Option<&str>, images: Vec<String>) -> GalleryView {
    let images: Vec<GalleryImage> = images
        .into_iter()
        .enumerate()
        .map(|(i, src)| GalleryImage {
            src,
            alt: format!("Gallery image {}", i + 1),
        })
        .collect();
    GalleryView {
        slug: slug.to_string(),
        title: titled(owner_name, "Gallery"),
        back_href: back_href(slug),
        empty: images.is_empty(),
        images,
    }
}

pub fn music_view(slug: &str, owner_name: Option<&str>, tracks: Vec<Track>) -> MusicView {
    let sample = tracks.is_empty();
    let tracks = if sample {
        vec![TrackView {
            name: SAMPLE_TRACK_NAME.into(),
            src: SAMPLE_TRACK_SRC.into(),
        }]
    } else {
        tracks
            .into_iter()
            .enumerate()
            .map(|(i, t)| TrackView {
                name: if t.name.trim().is_empty() {
                    format!("Track {}", i + 1)
                } else {
                    t.name
                },
                src: t.src,
            })
            .collect()
    };
    MusicView {
        slug: slug.to_string(),
        title: titled(owner_name, "Music"),
        back_href: back_href(slug),
        tracks,
        sample,
    }
}

/// Cleans an uploaded gallery: blank entries dropped, only http(s) or inline image URLs kept.
pub fn clean_gallery(images: Vec<String>) -> Result<Vec<String>, String> {
    let mut out = Vec::with_capacity(images.len());
    for (i, src) in images.into_iter().enumerate() {
        let src = src.trim().to_string();
        if src.is_empty() {
            continue;
        }
        if !(src.starts_with("https://") || src.starts_with("http://") || src.starts_with("data:image/")) {
            return Err(format!("Image {} is not a usable URL.", i + 1));
        }
        out.push(src);
    }
    Ok(out)
}

pub fn clean_tracks(tracks: Vec<Track>) -> Result<Vec<Track>, String> {
    let mut out = Vec::with_capacity(tracks.len());
    for (i, t) in tracks.into_iter().enumerate() {
        let src = t.src.trim().to_string();
        if src.is_empty() {
            if t.name.trim().is_empty() {
                continue;
            }
            return Err(format!("Track {} has no audio source.", i + 1));
        }
        out.push(Track {
            name: t.name.trim().to_string(),
            src,
        });
    }
    Ok(out)
}
