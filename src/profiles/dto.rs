use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{codec::ProfileSettings, repo_types::Theme};

pub const DEFAULT_WHATSAPP_TEMPLATE: &str = "Hi {name}, I found you through your Residue link.";

/// A text input paired with its "hide on profile" toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleField {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    #[serde(default)]
    pub website: ToggleField,
    #[serde(default)]
    pub phone: ToggleField,
    #[serde(default)]
    pub email: ToggleField,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WhatsAppMessage {
    /// `{name}` is replaced with the profile name.
    Template { template: String },
    Custom { text: String },
}

impl Default for WhatsAppMessage {
    fn default() -> Self {
        WhatsAppMessage::Template {
            template: DEFAULT_WHATSAPP_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatsAppFields {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub number_hidden: bool,
    #[serde(default)]
    pub include_message: bool,
    #[serde(default)]
    pub message: WhatsAppMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialField {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
}

/// Everything the profile editor form submits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
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
    pub settings: ProfileSettings,
    #[serde(default)]
    pub contact: ContactFields,
    #[serde(default)]
    pub whatsapp: WhatsAppFields,
    #[serde(default)]
    pub socials: Vec<SocialField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorSource {
    Remote,
    Draft,
    Empty,
}

#[derive(Debug, Serialize)]
pub struct EditorState {
    pub owner_id: Option<Uuid>,
    pub source: EditorSource,
    pub form: EditorForm,
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RemoteWrite {
    Saved,
    Skipped,
    Failed(String),
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub slug: String,
    pub public_url: String,
    pub redirect_after_ms: u64,
    pub remote: RemoteWrite,
    pub draft_saved: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PublicProfileQuery {
    pub u: Option<String>,
    pub preview: Option<String>,
}

impl PublicProfileQuery {
    pub fn is_preview(&self) -> bool {
        matches!(self.preview.as_deref(), Some("1") | Some("true"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AffordanceKind {
    Gallery,
    Music,
}

/// "View Gallery" / "View Music" buttons under the links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Affordance {
    pub kind: AffordanceKind,
    pub label: String,
    pub href: String,
}

/// View-model for the public profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicProfileView {
    pub slug: Option<String>,
    pub name: String,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: String,
    pub theme: Theme,
    pub links: Vec<PublicLink>,
    pub affordances: Vec<Affordance>,
    pub placeholder: bool,
    pub preview: bool,
    pub status: Option<String>,
}
