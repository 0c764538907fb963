//! Visibility flags carried inside the link list.
//!
//! A flag travels as a hidden link whose label starts with [`META_PREFIX`] and
//! whose url holds the value (`meta:true` / `meta:false`). Everything that
//! reads links must go through [`decode_links`] before showing them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::repo_types::Link;

pub const META_PREFIX: &str = "__meta__:";
const VALUE_PREFIX: &str = "meta:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedLinks {
    pub visible_meta: BTreeMap<String, bool>,
    pub normal_links: Vec<Link>,
}

pub fn is_meta(link: &Link) -> bool {
    link.label.starts_with(META_PREFIX)
}

/// Splits stored links into meta flags and ordinary links, keeping stored order.
pub fn decode_links(links: &[Link]) -> DecodedLinks {
    let mut out = DecodedLinks::default();
    for link in links {
        if is_meta(link) {
            let key = &link.label[META_PREFIX.len()..];
            out.visible_meta.insert(key.to_string(), decode_value(&link.url));
        } else {
            out.normal_links.push(link.clone());
        }
    }
    out
}

/// Unparseable or empty values read as `true`.
fn decode_value(url: &str) -> bool {
    let raw = url.trim();
    let raw = raw.strip_prefix(VALUE_PREFIX).unwrap_or(raw);
    let decoded = urlencoding::decode(raw)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    match decoded.trim().to_ascii_lowercase().as_str() {
        "false" | "0" | "no" | "off" => false,
        _ => true,
    }
}

pub fn encode_flag(key: &str, value: bool, sort: i32) -> Link {
    let raw = if value { "true" } else { "false" };
    Link {
        label: format!("{META_PREFIX}{key}"),
        url: format!("{VALUE_PREFIX}{}", urlencoding::encode(raw)),
        sort,
        hidden: true,
    }
}

/// Typed view over the flags the editor and renderer care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default = "default_true")]
    pub show_title: bool,
    #[serde(default = "default_true")]
    pub show_bio: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            show_title: true,
            show_bio: true,
        }
    }
}

impl ProfileSettings {
    pub const SHOW_TITLE: &'static str = "show_title";
    pub const SHOW_BIO: &'static str = "show_bio";

    pub fn from_meta(meta: &BTreeMap<String, bool>) -> Self {
        Self {
            show_title: meta.get(Self::SHOW_TITLE).copied().unwrap_or(true),
            show_bio: meta.get(Self::SHOW_BIO).copied().unwrap_or(true),
        }
    }

    /// Meta links for these settings, numbered from `first_sort`.
    pub fn encode(&self, first_sort: i32) -> Vec<Link> {
        vec![
            encode_flag(Self::SHOW_TITLE, self.show_title, first_sort),
            encode_flag(Self::SHOW_BIO, self.show_bio, first_sort + 1),
        ]
    }
}
