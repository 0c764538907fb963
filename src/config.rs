use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible bucket for uploaded media.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayfastConfig {
    pub merchant_id: Option<String>,
    pub merchant_key: Option<String>,
    pub notify_url: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub process_url: String,
}

/// Hard-wired operator login. Only a placeholder until real server-side auth exists.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminCredential {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    pub master_codes: Vec<String>,
    pub drop_open: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub drop_end: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Absent means the hosted backend is not configured; everything degrades to local-only.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    /// `None` keeps the local store in memory only.
    pub local_store_path: Option<PathBuf>,
    pub storage: Option<StorageConfig>,
    pub payfast: PayfastConfig,
    pub site_url: String,
    pub shipping_fee: Decimal,
    pub admin: Option<AdminCredential>,
    pub access: AccessConfig,
    pub render_min_dwell_ms: u64,
    pub expose_reset_codes: bool,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "residue".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "residue-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let storage = match (
            env_opt("S3_ENDPOINT"),
            env_opt("S3_BUCKET"),
            env_opt("S3_ACCESS_KEY"),
            env_opt("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => {
                let public_base_url = env_opt("S3_PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
                Some(StorageConfig {
                    endpoint,
                    bucket,
                    access_key,
                    secret_key,
                    region: env_opt("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                    public_base_url,
                })
            }
            _ => None,
        };

        let payfast = PayfastConfig {
            merchant_id: env_opt("PAYFAST_MERCHANT_ID"),
            merchant_key: env_opt("PAYFAST_MERCHANT_KEY"),
            notify_url: env_opt("PAYFAST_NOTIFY_URL"),
            return_url: env_opt("PAYFAST_RETURN_URL"),
            cancel_url: env_opt("PAYFAST_CANCEL_URL"),
            process_url: env_opt("PAYFAST_PROCESS_URL")
                .unwrap_or_else(|| "https://www.payfast.co.za/eng/process".into()),
        };

        let admin = match (env_opt("ADMIN_EMAIL"), env_opt("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminCredential {
                email: email.to_lowercase(),
                password,
            }),
            _ => None,
        };

        let drop_end = match env_opt("DROP_END") {
            Some(v) => Some(OffsetDateTime::parse(&v, &Rfc3339).context("DROP_END must be RFC 3339")?),
            None => None,
        };
        let access = AccessConfig {
            master_codes: env_opt("ACCESS_MASTER_CODES")
                .unwrap_or_else(|| "FOUNDER-001".into())
                .split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
            drop_open: env_flag("DROP_OPEN"),
            drop_end,
        };

        let local_store_path = match env_opt("LOCAL_STORE_PATH").as_deref() {
            Some("memory") => None,
            Some(p) => Some(PathBuf::from(p)),
            None => Some(PathBuf::from("data/local-store.json")),
        };

        Ok(Self {
            database_url: env_opt("DATABASE_URL"),
            jwt,
            local_store_path,
            storage,
            payfast,
            site_url: env_opt("SITE_URL")
                .unwrap_or_else(|| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            shipping_fee: env_parse("SHIPPING_FEE", Decimal::from(99)),
            admin,
            access,
            render_min_dwell_ms: env_parse("RENDER_MIN_DWELL_MS", 200),
            expose_reset_codes: env_flag("EXPOSE_RESET_CODES"),
        })
    }

    /// Absolute URL of the public profile page for `slug`.
    pub fn public_profile_url(&self, slug: &str) -> String {
        format!("{}/link-profile.html?u={}", self.site_url, urlencoding::encode(slug))
    }
}
