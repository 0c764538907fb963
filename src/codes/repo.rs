use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::repo_types::{InviteCode, Redemption};

/// SQLSTATE `undefined_function`.
const UNDEFINED_FUNCTION: &str = "42883";

const CODE_COLUMNS: &str = "id, owner_profile, code, max_uses, used_count, active, created_at";

#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn find_by_owner(&self, owner: Uuid) -> anyhow::Result<Option<InviteCode>>;
    /// Returns the owner's existing code, or stores `code` as their new one.
    async fn create_for_owner(
        &self,
        owner: Uuid,
        code: &str,
        max_uses: i32,
    ) -> anyhow::Result<InviteCode>;
    /// Spends one use of an active code. `code` is matched case-insensitively.
    async fn redeem(&self, code: &str) -> anyhow::Result<Redemption>;
}

pub struct PgCodeStore {
    db: PgPool,
}

impl PgCodeStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Not atomic: two concurrent first calls for one owner can both insert.
    async fn select_then_insert(
        &self,
        owner: Uuid,
        code: &str,
        max_uses: i32,
    ) -> anyhow::Result<InviteCode> {
        if let Some(existing) = self.find_by_owner(owner).await? {
            return Ok(existing);
        }
        let row = sqlx::query_as::<_, InviteCode>(&format!(
            "INSERT INTO codes (owner_profile, code, max_uses) VALUES ($1, $2, $3) RETURNING {CODE_COLUMNS}"
        ))
        .bind(owner)
        .bind(code)
        .bind(max_uses)
        .fetch_one(&self.db)
        .await
        .context("insert code")?;
        Ok(row)
    }
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn find_by_owner(&self, owner: Uuid) -> anyhow::Result<Option<InviteCode>> {
        let row = sqlx::query_as::<_, InviteCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM codes WHERE owner_profile = $1"
        ))
        .bind(owner)
        .fetch_optional(&self.db)
        .await
        .context("select code by owner")?;
        Ok(row)
    }

    async fn create_for_owner(
        &self,
        owner: Uuid,
        code: &str,
        max_uses: i32,
    ) -> anyhow::Result<InviteCode> {
        let res = sqlx::query_as::<_, InviteCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM create_owner_code($1, $2, $3)"
        ))
        .bind(owner)
        .bind(code)
        .bind(max_uses)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNDEFINED_FUNCTION) => {
                warn!(%owner, "create_owner_code missing; falling back to select-then-insert");
                self.select_then_insert(owner, code, max_uses).await
            }
            Err(e) => Err(anyhow::Error::new(e).context("create_owner_code")),
        }
    }

    async fn redeem(&self, code: &str) -> anyhow::Result<Redemption> {
        let spent = sqlx::query_as::<_, InviteCode>(&format!(
            r#"
            UPDATE codes SET used_count = used_count + 1
            WHERE upper(code) = upper($1) AND active AND used_count < max_uses
            RETURNING {CODE_COLUMNS}
            "#
        ))
        .bind(code)
        .fetch_optional(&self.db)
        .await
        .context("redeem code")?;

        if let Some(row) = spent {
            debug!(code = %row.code, used = row.used_count, "code redeemed");
            return Ok(Redemption::Redeemed(row));
        }

        let existing = sqlx::query_as::<_, InviteCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM codes WHERE upper(code) = upper($1)"
        ))
        .bind(code)
        .fetch_optional(&self.db)
        .await
        .context("select code")?;

        Ok(match existing {
            Some(row) if row.active => Redemption::Exhausted,
            _ => Redemption::Unknown,
        })
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryCodeStore {
        pub rows: Mutex<Vec<InviteCode>>,
    }

    impl MemoryCodeStore {
        pub async fn insert(&self, owner: Uuid, code: &str, max_uses: i32, active: bool) {
            self.rows.lock().await.push(InviteCode {
                id: Uuid::new_v4(),
                owner_profile: owner,
                code: code.into(),
                max_uses,
                used_count: 0,
                active,
                created_at: OffsetDateTime::now_utc(),
            });
        }
    }

    #[async_trait]
    impl CodeStore for MemoryCodeStore {
        async fn find_by_owner(&self, owner: Uuid) -> anyhow::Result<Option<InviteCode>> {
            let rows = self.rows.lock().await;
            Ok(rows.iter().find(|c| c.owner_profile == owner).cloned())
        }

        async fn create_for_owner(
            &self,
            owner: Uuid,
            code: &str,
            max_uses: i32,
        ) -> anyhow::Result<InviteCode> {
            if let Some(existing) = self.find_by_owner(owner).await? {
                return Ok(existing);
            }
            self.insert(owner, code, max_uses, true).await;
            self.find_by_owner(owner)
                .await?
                .context("code vanished after insert")
        }

        async fn redeem(&self, code: &str) -> anyhow::Result<Redemption> {
            let mut rows = self.rows.lock().await;
            let Some(row) = rows.iter_mut().find(|c| c.code.eq_ignore_ascii_case(code)) else {
                return Ok(Redemption::Unknown);
            };
            if !row.active {
                return Ok(Redemption::Unknown);
            }
            if row.used_count >= row.max_uses {
                return Ok(Redemption::Exhausted);
            }
            row.used_count += 1;
            Ok(Redemption::Redeemed(row.clone()))
        }
    }
}
