use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    dto::RemoteWrite,
    repo_types::{Link, ProfileRow, StoredProfile},
};
use crate::local_store::LocalStore;

const PROFILE_KEY_PREFIX: &str = "residue_link_profile_";
const LAST_PROFILE_KEY: &str = "residue_last_profile_key";

pub fn draft_key(slug: &str) -> String {
    format!("{PROFILE_KEY_PREFIX}{slug}")
}

/// Hosted profile persistence. Only used when a backend is configured.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_owner(&self, owner_id: Uuid) -> anyhow::Result<Option<StoredProfile>>;
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<StoredProfile>>;
    /// Upserts the profile row and replaces every link of the owner.
    async fn save(&self, owner_id: Uuid, profile: &StoredProfile) -> anyhow::Result<()>;
}

pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn links_for(&self, profile_id: Uuid) -> anyhow::Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(
            r#"
            SELECT label, url, sort, hidden
            FROM links
            WHERE profile_id = $1
            ORDER BY sort ASC
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.db)
        .await
        .context("select links")?;
        Ok(links)
    }

    async fn with_links(&self, row: Option<ProfileRow>) -> anyhow::Result<Option<StoredProfile>> {
        match row {
            Some(row) => {
                let links = self.links_for(row.id).await?;
                Ok(Some(StoredProfile::from_row(row, links)))
            }
            None => Ok(None),
        }
    }
}

async fn insert_link_tx(
    tx: &mut Transaction<'_, Postgres>,
    profile_id: Uuid,
    link: &Link,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO links (profile_id, label, url, sort, hidden)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(profile_id)
    .bind(&link.label)
    .bind(&link.url)
    .bind(link.sort)
    .bind(link.hidden)
    .execute(&mut **tx)
    .await
    .context("insert link")?;
    Ok(())
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_owner(&self, owner_id: Uuid) -> anyhow::Result<Option<StoredProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, name, slug, title, bio, avatar_url, theme
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await
        .context("select profile by owner")?;
        self.with_links(row).await
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<StoredProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, name, slug, title, bio, avatar_url, theme
            FROM profiles
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.db)
        .await
        .context("select profile by slug")?;
        self.with_links(row).await
    }

    async fn save(&self, owner_id: Uuid, profile: &StoredProfile) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        sqlx::query(
            r#"
            INSERT INTO profiles (id, name, slug, title, bio, avatar_url, theme)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name,
                   slug = EXCLUDED.slug,
                   title = EXCLUDED.title,
                   bio = EXCLUDED.bio,
                   avatar_url = EXCLUDED.avatar_url,
                   theme = EXCLUDED.theme,
                   updated_at = now()
            "#,
        )
        .bind(owner_id)
        .bind(&profile.name)
        .bind(&profile.slug)
        .bind(&profile.title)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .bind(profile.theme.as_str())
        .execute(&mut *tx)
        .await
        .context("upsert profile")?;

        sqlx::query("DELETE FROM links WHERE profile_id = $1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .context("delete links")?;

        for link in &profile.links {
            insert_link_tx(&mut tx, owner_id, link).await?;
        }

        tx.commit().await.context("commit tx")?;
        debug!(%owner_id, slug = %profile.slug, links = profile.links.len(), "profile saved remotely");
        Ok(())
    }
}

/// Local drafts keyed by slug, plus a pointer to the last one saved.
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<LocalStore>,
}

impl DraftStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, slug: &str) -> Option<StoredProfile> {
        self.store.get(&draft_key(slug)).await
    }

    pub async fn put(&self, profile: &StoredProfile) -> anyhow::Result<()> {
        let key = draft_key(&profile.slug);
        self.store.set(&key, profile).await?;
        self.store.set(LAST_PROFILE_KEY, &key).await
    }

    /// The draft named by the last-profile pointer, else any draft at all.
    pub async fn latest(&self) -> Option<StoredProfile> {
        if let Some(key) = self.store.get::<String>(LAST_PROFILE_KEY).await {
            if let Some(draft) = self.store.get::<StoredProfile>(&key).await {
                return Some(draft);
            }
        }
        for key in self.store.keys_with_prefix(PROFILE_KEY_PREFIX).await {
            if let Some(draft) = self.store.get::<StoredProfile>(&key).await {
                return Some(draft);
            }
        }
        None
    }
}

#[derive(Debug)]
pub struct SaveOutcome {
    pub remote: RemoteWrite,
    pub draft_saved: bool,
}

/// Where a public profile was found.
#[derive(Debug)]
pub enum Resolution {
    Remote(StoredProfile),
    Draft(StoredProfile),
    NotFound,
    /// Backend failed and no draft exists either.
    Unavailable(String),
}

/// Single entry point for profile persistence: remote when available, local draft always.
#[derive(Clone)]
pub struct ProfileRepository {
    remote: Option<Arc<dyn ProfileStore>>,
    drafts: DraftStore,
}

impl ProfileRepository {
    pub fn new(remote: Option<Arc<dyn ProfileStore>>, drafts: DraftStore) -> Self {
        Self { remote, drafts }
    }

    pub fn remote(&self) -> Option<&Arc<dyn ProfileStore>> {
        self.remote.as_ref()
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    /// Writes remote first (with a session), then mirrors to the local draft whatever
    /// the remote result was. Both outcomes are reported.
    pub async fn save(&self, owner_id: Option<Uuid>, profile: &StoredProfile) -> SaveOutcome {
        let remote = match (owner_id, self.remote.as_ref()) {
            (Some(owner_id), Some(store)) => match store.save(owner_id, profile).await {
                Ok(()) => RemoteWrite::Saved,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), %owner_id, "remote profile save failed");
                    RemoteWrite::Failed(format!("{e:#}"))
                }
            },
            _ => RemoteWrite::Skipped,
        };

        let draft_saved = match self.drafts.put(profile).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %format!("{e:#}"), slug = %profile.slug, "draft save failed");
                false
            }
        };

        SaveOutcome {
            remote,
            draft_saved,
        }
    }

    pub async fn resolve_by_slug(&self, slug: &str) -> Resolution {
        let mut remote_error = None;
        if let Some(store) = &self.remote {
            match store.find_by_slug(slug).await {
                Ok(Some(profile)) => return Resolution::Remote(profile),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %format!("{e:#}"), slug, "remote profile lookup failed");
                    remote_error = Some(format!("{e:#}"));
                }
            }
        }

        match (self.drafts.get(slug).await, remote_error) {
            (Some(draft), _) => Resolution::Draft(draft),
            (None, Some(err)) => Resolution::Unavailable(err),
            (None, None) => Resolution::NotFound,
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;

    /// In-process `ProfileStore` for tests. `failing` makes every call error.
    #[derive(Default)]
    pub struct MemoryProfileStore {
        pub rows: Mutex<HashMap<Uuid, StoredProfile>>,
        pub failing: bool,
    }

    impl MemoryProfileStore {
        pub fn failing() -> Self {
            Self {
                rows: Mutex::default(),
                failing: true,
            }
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfileStore {
        async fn find_by_owner(&self, owner_id: Uuid) -> anyhow::Result<Option<StoredProfile>> {
            anyhow::ensure!(!self.failing, "connection refused");
            Ok(self.rows.lock().await.get(&owner_id).cloned())
        }

        async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<StoredProfile>> {
            anyhow::ensure!(!self.failing, "connection refused");
            Ok(self
                .rows
                .lock()
                .await
                .values()
                .find(|p| p.slug == slug)
                .cloned())
        }

        async fn save(&self, owner_id: Uuid, profile: &StoredProfile) -> anyhow::Result<()> {
            anyhow::ensure!(!self.failing, "connection refused");
            let mut rows = self.rows.lock().await;
            anyhow::ensure!(
                !rows
                    .iter()
                    .any(|(id, p)| *id != owner_id && p.slug == profile.slug),
                "duplicate key value violates unique constraint \"profiles_slug_key\""
            );
            let mut stored = profile.clone();
            stored.owner_id = Some(owner_id);
            rows.insert(owner_id, stored);
            Ok(())
        }
    }
}
