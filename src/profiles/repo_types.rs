use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    /// Anything other than `light` renders dark.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("light") {
            Theme::Light
        } else {
            Theme::Dark
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

/// Row in `profiles`. `id` is the owner's user id.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub theme: Option<String>,
}

/// Row in `links`, also the link shape inside a local draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub label: String,
    pub url: String,
    pub sort: i32,
    #[serde(default)]
    pub hidden: bool,
}

/// A profile as persisted: plain fields plus the raw link list, meta entries included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl StoredProfile {
    pub fn from_row(row: ProfileRow, links: Vec<Link>) -> Self {
        Self {
            owner_id: Some(row.id),
            name: row.name,
            slug: row.slug,
            title: row.title.unwrap_or_default(),
            bio: row.bio.unwrap_or_default(),
            avatar_url: row.avatar_url.unwrap_or_default(),
            theme: row.theme.as_deref().map(Theme::parse).unwrap_or_default(),
            links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_falls_back_to_dark() {
        assert_eq!(Theme::parse("light"), Theme::Light);
        assert_eq!(Theme::parse(" LIGHT "), Theme::Light);
        assert_eq!(Theme::parse("sepia"), Theme::Dark);
        assert_eq!(Theme::parse(""), Theme::Dark);
    }

    #[test]
    fn draft_json_tolerates_missing_fields() {
        let draft: StoredProfile =
            serde_json::from_str(r#"{"name":"Ana","slug":"ana","links":[{"label":"x","url":"https://x.io","sort":0}]}"#)
                .unwrap();
        assert_eq!(draft.theme, Theme::Dark);
        assert!(draft.title.is_empty());
        assert!(!draft.links[0].hidden);
    }
}
