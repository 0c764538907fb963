use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// One row of `auth_activity_log`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub action: &'static str,
    pub outcome: Outcome,
    pub provider: &'static str,
    pub detail: Option<String>,
    pub metadata: Value,
}

impl AuthEvent {
    pub fn new(action: &'static str, outcome: Outcome, email: &str) -> Self {
        let email = email.trim().to_lowercase();
        Self {
            user_id: None,
            email: (!email.is_empty()).then_some(email),
            action,
            outcome,
            provider: "password",
            detail: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One row of `purchase_activity_log`.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseEvent {
    pub email: Option<String>,
    pub invoice_no: Option<String>,
    pub stage: &'static str,
    pub outcome: Outcome,
    pub payment_provider: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<Decimal>,
    pub currency: &'static str,
    pub product: Option<String>,
    pub quantity: Option<i32>,
    pub detail: Option<String>,
}

impl PurchaseEvent {
    pub fn new(stage: &'static str, outcome: Outcome) -> Self {
        Self {
            email: None,
            invoice_no: None,
            stage,
            outcome,
            payment_provider: None,
            payment_status: None,
            amount_total: None,
            currency: "ZAR",
            product: None,
            quantity: None,
            detail: None,
        }
    }
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn auth(&self, event: &AuthEvent) -> anyhow::Result<()>;
    async fn purchase(&self, event: &PurchaseEvent) -> anyhow::Result<()>;
}

pub struct PgActivityLog {
    db: PgPool,
}

impl PgActivityLog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityLog for PgActivityLog {
    async fn auth(&self, e: &AuthEvent) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_activity_log
                (user_id, email, action, outcome, provider, detail, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(e.user_id)
        .bind(&e.email)
        .bind(e.action)
        .bind(e.outcome.as_str())
        .bind(e.provider)
        .bind(&e.detail)
        .bind(&e.metadata)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn purchase(&self, e: &PurchaseEvent) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_activity_log
                (email, invoice_no, stage, outcome, payment_provider, payment_status,
                 amount_total, currency, product, quantity, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&e.email)
        .bind(&e.invoice_no)
        .bind(e.stage)
        .bind(e.outcome.as_str())
        .bind(&e.payment_provider)
        .bind(&e.payment_status)
        .bind(e.amount_total)
        .bind(e.currency)
        .bind(&e.product)
        .bind(e.quantity)
        .bind(&e.detail)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Used when no database is configured: events only reach the tracing output.
pub struct TracingActivityLog;

#[async_trait]
impl ActivityLog for TracingActivityLog {
    async fn auth(&self, e: &AuthEvent) -> anyhow::Result<()> {
        info!(action = e.action, outcome = e.outcome.as_str(), email = ?e.email, "auth activity");
        Ok(())
    }

    async fn purchase(&self, e: &PurchaseEvent) -> anyhow::Result<()> {
        info!(
            stage = e.stage,
            outcome = e.outcome.as_str(),
            invoice_no = ?e.invoice_no,
            "purchase activity"
        );
        Ok(())
    }
}

/// Never fails the caller; a lost telemetry row is only logged.
pub async fn record_auth(log: &dyn ActivityLog, event: AuthEvent) {
    if let Err(e) = log.auth(&event).await {
        warn!(error = %e, action = event.action, "auth telemetry insert failed");
    }
}

pub async fn record_purchase(log: &dyn ActivityLog, event: PurchaseEvent) {
    if let Err(e) = log.purchase(&event).await {
        warn!(error = %e, stage = event.stage, "purchase telemetry insert failed");
    }
}
