use thiserror::Error;
use url::Url;
use uuid::Uuid;

use super::{
    codec::{decode_links, ProfileSettings},
    dto::{
        ContactFields, EditorForm, EditorSource, EditorState, SocialField, ToggleField,
        WhatsAppFields, WhatsAppMessage,
    },
    repo::ProfileRepository,
    repo_types::{Link, StoredProfile, Theme},
    slug::{slugify, MAX_SLUG_LEN},
};
use crate::auth::services::is_valid_email;

/// Display cap for ordinary links; meta entries are not counted.
pub const MAX_LINKS: usize = 5;
pub const MAX_SOCIALS: usize = 5;

const WEBSITE_LABEL: &str = "Website";
const PHONE_LABEL: &str = "Phone";
const EMAIL_LABEL: &str = "Email";
const WHATSAPP_LABEL: &str = "WhatsApp";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("Name is required.")]
    NameRequired,
    #[error("Slug / URL is required.")]
    SlugRequired,
}

/// Identity of a signed-in editor.
#[derive(Debug, Clone)]
pub struct EditorSession {
    pub owner_id: Uuid,
    pub email: String,
}

/// Makes a user-typed link absolute. Returns `None` for blanks and garbage.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    let candidate = if ["http://", "https://", "mailto:", "tel:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate).ok().map(|_| candidate)
}

/// "https://www.instagram.com/ana" -> "Instagram".
pub fn label_from_host(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
    let Some(host) = host else {
        return url.to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let first = host.split('.').next().unwrap_or(host);
    let known = match first {
        "instagram" => Some("Instagram"),
        "tiktok" => Some("TikTok"),
        "youtube" | "youtu" => Some("YouTube"),
        "x" | "twitter" => Some("X"),
        "linkedin" => Some("LinkedIn"),
        "facebook" | "fb" => Some("Facebook"),
        "soundcloud" => Some("SoundCloud"),
        "spotify" | "open" if host.contains("spotify") => Some("Spotify"),
        "github" => Some("GitHub"),
        _ => None,
    };
    match known {
        Some(label) => label.to_string(),
        None => {
            let mut chars = first.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => host.to_string(),
            }
        }
    }
}

fn phone_digits(raw: &str) -> String {
    let raw = raw.trim();
    let mut out = String::new();
    if raw.starts_with('+') {
        out.push('+');
    }
    out.extend(raw.chars().filter(|c| c.is_ascii_digit()));
    if out == "+" {
        out.clear();
    }
    out
}

pub fn whatsapp_link(fields: &WhatsAppFields, name: &str) -> Option<String> {
    let digits: String = fields.number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let mut link = format!("https://wa.me/{digits}");
    if fields.include_message {
        let text = match &fields.message {
            WhatsAppMessage::Template { template } => template.replace("{name}", name.trim()),
            WhatsAppMessage::Custom { text } => text.clone(),
        };
        let text = text.trim();
        if !text.is_empty() {
            link.push_str("?text=");
            link.push_str(&urlencoding::encode(text));
        }
    }
    Some(link)
}

/// Builds the ordered link list for a form: contacts, WhatsApp, socials, then meta flags.
pub fn collect_links(form: &EditorForm) -> Vec<Link> {
    let mut entries: Vec<(String, String, bool)> = Vec::new();
    let contact = &form.contact;

    if let Some(url) = normalize_url(&contact.website.value) {
        entries.push((WEBSITE_LABEL.into(), url, contact.website.hidden));
    }
    let phone = phone_digits(&contact.phone.value);
    if !phone.is_empty() {
        entries.push((PHONE_LABEL.into(), format!("tel:{phone}"), contact.phone.hidden));
    }
    let email = contact.email.value.trim();
    if is_valid_email(email) {
        entries.push((EMAIL_LABEL.into(), format!("mailto:{email}"), contact.email.hidden));
    }
    if let Some(url) = whatsapp_link(&form.whatsapp, &form.name) {
        entries.push((WHATSAPP_LABEL.into(), url, form.whatsapp.number_hidden));
    }
    for social in form.socials.iter().take(MAX_SOCIALS) {
        let Some(url) = normalize_url(&social.url) else {
            continue;
        };
        let label = match social.label.trim() {
            "" => label_from_host(&url),
            l => l.to_string(),
        };
        entries.push((label, url, false));
    }

    entries.truncate(MAX_LINKS);
    let mut links: Vec<Link> = entries
        .into_iter()
        .enumerate()
        .map(|(i, (label, url, hidden))| Link {
            label,
            url,
            sort: i as i32,
            hidden,
        })
        .collect();
    let next = links.len() as i32;
    links.extend(form.settings.encode(next));
    links
}

impl EditorForm {
    /// Rebuilds the structured form from a stored profile.
    pub fn from_profile(profile: &StoredProfile) -> Self {
        let decoded = decode_links(&profile.links);
        let mut form = EditorForm {
            name: profile.name.clone(),
            slug: profile.slug.clone(),
            title: profile.title.clone(),
            bio: profile.bio.clone(),
            avatar_url: profile.avatar_url.clone(),
            theme: profile.theme,
            settings: ProfileSettings::from_meta(&decoded.visible_meta),
            contact: ContactFields::default(),
            whatsapp: WhatsAppFields::default(),
            socials: Vec::new(),
        };

        for link in decoded.normal_links {
            let toggle = |value: &str| ToggleField {
                value: value.to_string(),
                hidden: link.hidden,
            };
            if let Some(number) = link.url.strip_prefix("tel:") {
                if form.contact.phone.value.is_empty() {
                    form.contact.phone = toggle(number);
                    continue;
                }
            }
            if let Some(address) = link.url.strip_prefix("mailto:") {
                if form.contact.email.value.is_empty() {
                    form.contact.email = toggle(address);
                    continue;
                }
            }
            if form.whatsapp.number.is_empty() {
                if let Some(wa) = parse_whatsapp(&link) {
                    form.whatsapp = wa;
                    continue;
                }
            }
            if link.label == WEBSITE_LABEL && form.contact.website.value.is_empty() {
                form.contact.website = toggle(&link.url);
                continue;
            }
            form.socials.push(SocialField {
                label: link.label.clone(),
                url: link.url.clone(),
            });
        }
        form
    }
}

fn parse_whatsapp(link: &Link) -> Option<WhatsAppFields> {
    let url = Url::parse(&link.url).ok()?;
    if url.host_str()? != "wa.me" {
        return None;
    }
    let number: String = url.path().chars().filter(|c| c.is_ascii_digit()).collect();
    if number.is_empty() {
        return None;
    }
    let text = url
        .query_pairs()
        .find(|(k, _)| k == "text")
        .map(|(_, v)| v.into_owned());
    Some(WhatsAppFields {
        number,
        number_hidden: link.hidden,
        include_message: text.is_some(),
        message: match text {
            Some(text) => WhatsAppMessage::Custom { text },
            None => WhatsAppMessage::default(),
        },
    })
}

/// Validates the form and produces the record to persist. Runs before any write.
pub fn build_profile(form: &EditorForm, owner_id: Option<Uuid>) -> Result<StoredProfile, EditorError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(EditorError::NameRequired);
    }
    let slug = match form.slug.trim() {
        "" => slugify(name),
        given => slugify(given),
    };
    if slug.is_empty() {
        return Err(EditorError::SlugRequired);
    }

    Ok(StoredProfile {
        owner_id,
        name: name.to_string(),
        slug,
        title: form.title.trim().to_string(),
        bio: form.bio.trim().to_string(),
        avatar_url: form.avatar_url.trim().to_string(),
        theme: form.theme,
        links: collect_links(form),
    })
}

/// First-load defaults for a signed-in owner without a profile row.
pub fn default_profile(session: &EditorSession) -> StoredProfile {
    let local = session.email.split('@').next().unwrap_or_default();
    StoredProfile {
        owner_id: Some(session.owner_id),
        name: session.email.clone(),
        slug: slugify(local),
        title: String::new(),
        bio: String::new(),
        avatar_url: String::new(),
        theme: Theme::Dark,
        links: Vec::new(),
    }
}

/// `slug` shortened to fit a `-<owner tag>` suffix, for first-visit slugs already taken.
fn owner_slug(slug: &str, owner_id: Uuid) -> String {
    let tag = owner_id.simple().to_string();
    let tag = &tag[..6];
    let mut base: String = slug.chars().take(MAX_SLUG_LEN - tag.len() - 1).collect();
    while base.ends_with('-') {
        base.pop();
    }
    if base.is_empty() {
        tag.to_string()
    } else {
        format!("{base}-{tag}")
    }
}

/// Loads the editor: remote row (created on first visit) with a session, else the latest draft.
pub async fn load_profile(
    repo: &ProfileRepository,
    session: Option<&EditorSession>,
) -> anyhow::Result<(EditorSource, Option<StoredProfile>)> {
    if let (Some(session), Some(remote)) = (session, repo.remote()) {
        let profile = match remote.find_by_owner(session.owner_id).await? {
            Some(p) => p,
            None => {
                let mut fresh = default_profile(session);
                let taken = match remote.find_by_slug(&fresh.slug).await {
                    Ok(row) => row.is_some_and(|p| p.owner_id != Some(session.owner_id)),
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "slug lookup failed");
                        false
                    }
                };
                if taken || fresh.slug.is_empty() {
                    fresh.slug = owner_slug(&fresh.slug, session.owner_id);
                }
                // The editor still opens on defaults; the first save retries the write.
                match remote.save(session.owner_id, &fresh).await {
                    Ok(()) => tracing::info!(owner_id = %session.owner_id, slug = %fresh.slug, "profile row created"),
                    Err(e) => tracing::warn!(
                        owner_id = %session.owner_id,
                        slug = %fresh.slug,
                        error = %format!("{e:#}"),
                        "profile row not created"
                    ),
                }
                fresh
            }
        };
        return Ok((EditorSource::Remote, Some(profile)));
    }

    match repo.drafts().latest().await {
        Some(draft) => Ok((EditorSource::Draft, Some(draft))),
        None => Ok((EditorSource::Empty, None)),
    }
}

pub fn editor_state(
    source: EditorSource,
    profile: Option<&StoredProfile>,
    public_url: impl Fn(&str) -> String,
) -> EditorState {
    match profile {
        Some(p) => EditorState {
            owner_id: p.owner_id,
            source,
            form: EditorForm::from_profile(p),
            public_url: (!p.slug.is_empty()).then(|| public_url(&p.slug)),
        },
        None => EditorState {
            owner_id: None,
            source,
            form: EditorForm::default(),
            public_url: None,
        },
    }
}
