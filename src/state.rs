use std::sync::Arc;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::auth::repo::{AccountStore, LocalAccountStore, PgAccountStore};
use crate::auth::services::ResetCodes;
use crate::checkout::repo::{OrderStore, PgOrderStore};
use crate::codes::repo::{CodeStore, PgCodeStore};
use crate::config::AppConfig;
use crate::local_store::LocalStore;
use crate::media::repo::MediaStore;
use crate::profiles::repo::{DraftStore, PgProfileStore, ProfileRepository, ProfileStore};
use crate::storage::{Storage, StorageClient};
use crate::telemetry::{ActivityLog, PgActivityLog, TracingActivityLog};

#[derive(Clone)]
pub struct AppState {
    /// `None` when no hosted backend is configured.
    pub db: Option<PgPool>,
    pub config: Arc<AppConfig>,
    pub storage: Option<Arc<dyn StorageClient>>,
    pub profiles: ProfileRepository,
    pub media: MediaStore,
    pub accounts: Arc<dyn AccountStore>,
    pub orders: Option<Arc<dyn OrderStore>>,
    pub codes: Option<Arc<dyn CodeStore>>,
    pub reset_codes: Arc<ResetCodes>,
    pub activity: Arc<dyn ActivityLog>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let local = Arc::new(LocalStore::open(config.local_store_path.clone()).await?);

        // Lazy so a down database degrades requests instead of blocking startup.
        let db = match config.database_url.as_deref() {
            Some(url) => Some(PgPoolOptions::new().max_connections(10).connect_lazy(url)?),
            None => {
                warn!("DATABASE_URL not set; running with local storage only");
                None
            }
        };

        let storage = match &config.storage {
            Some(cfg) => {
                info!(bucket = %cfg.bucket, "object storage enabled");
                Some(Arc::new(Storage::new(cfg).await?) as Arc<dyn StorageClient>)
            }
            None => None,
        };

        Ok(Self::from_parts(db, config, storage, local))
    }

    /// Wires every store against `db` when present, else the local fallbacks.
    pub fn from_parts(
        db: Option<PgPool>,
        config: Arc<AppConfig>,
        storage: Option<Arc<dyn StorageClient>>,
        local: Arc<LocalStore>,
    ) -> Self {
        let remote_profiles = db
            .clone()
            .map(|db| Arc::new(PgProfileStore::new(db)) as Arc<dyn ProfileStore>);
        let accounts: Arc<dyn AccountStore> = match &db {
            Some(db) => Arc::new(PgAccountStore::new(db.clone())),
            None => Arc::new(LocalAccountStore::new(local.clone())),
        };
        let activity: Arc<dyn ActivityLog> = match &db {
            Some(db) => Arc::new(PgActivityLog::new(db.clone())),
            None => Arc::new(TracingActivityLog),
        };

        Self {
            orders: db
                .clone()
                .map(|db| Arc::new(PgOrderStore::new(db)) as Arc<dyn OrderStore>),
            codes: db
                .clone()
                .map(|db| Arc::new(PgCodeStore::new(db)) as Arc<dyn CodeStore>),
            profiles: ProfileRepository::new(remote_profiles, DraftStore::new(local.clone())),
            media: MediaStore::new(local.clone()),
            reset_codes: Arc::new(ResetCodes::default()),
            db,
            config,
            storage,
            accounts,
            activity,
        }
    }

    /// Local-only state for tests: no database, no object storage, in-memory local store.
    #[cfg(test)]
    pub fn fake() -> Self {
        use rust_decimal::Decimal;

        use crate::config::{AccessConfig, JwtConfig, PayfastConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            local_store_path: None,
            storage: None,
            payfast: PayfastConfig {
                merchant_id: None,
                merchant_key: None,
                notify_url: None,
                return_url: None,
                cancel_url: None,
                process_url: "https://sandbox.payfast.co.za/eng/process".into(),
            },
            site_url: "http://localhost:8080".into(),
            shipping_fee: Decimal::from(99),
            admin: None,
            access: AccessConfig {
                master_codes: vec!["FOUNDER-001".into()],
                drop_open: false,
                drop_end: None,
            },
            render_min_dwell_ms: 0,
            expose_reset_codes: false,
        });

        Self::from_parts(None, config, None, Arc::new(LocalStore::in_memory()))
    }
}
