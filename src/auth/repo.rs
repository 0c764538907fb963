use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repo_types::Account;
use crate::local_store::LocalStore;

const LOCAL_ACCOUNTS_KEY: &str = "residue_local_accounts";

#[derive(Debug, thiserror::Error)]
#[error("Email already registered")]
pub struct EmailTaken;

/// Where accounts live: the hosted `users` table, or the local fallback list.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>>;
    /// Fails with [`EmailTaken`] when the email exists.
    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Account>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;
}

pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let user = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let user = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select user by id")?;
        Ok(user)
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Account> {
        let res = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(EmailTaken.into()),
            Err(e) => Err(anyhow::Error::new(e).context("insert user")),
        }
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("update password")?;
        Ok(())
    }
}

/// Self-registered accounts kept in the local store when no backend is configured.
pub struct LocalAccountStore {
    store: Arc<LocalStore>,
    write: Mutex<()>,
}

impl LocalAccountStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            write: Mutex::new(()),
        }
    }

    async fn all(&self) -> Vec<Account> {
        self.store
            .get(LOCAL_ACCOUNTS_KEY)
            .await
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccountStore for LocalAccountStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        Ok(self.all().await.into_iter().find(|a| a.email == email))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        Ok(self.all().await.into_iter().find(|a| a.id == id))
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Account> {
        let _guard = self.write.lock().await;
        let mut accounts = self.all().await;
        if accounts.iter().any(|a| a.email == email) {
            return Err(EmailTaken.into());
        }
        let now = OffsetDateTime::now_utc();
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        accounts.push(account.clone());
        self.store.set(LOCAL_ACCOUNTS_KEY, &accounts).await?;
        Ok(account)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        let _guard = self.write.lock().await;
        let mut accounts = self.all().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .context("account not found")?;
        account.password_hash = password_hash.to_string();
        account.updated_at = OffsetDateTime::now_utc();
        self.store.set(LOCAL_ACCOUNTS_KEY, &accounts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_accounts_reject_duplicate_email() {
        let store = LocalAccountStore::new(Arc::new(LocalStore::in_memory()));
        let created = store.create("ana@example.com", "h1").await.unwrap();
        let err = store.create("ana@example.com", "h2").await.unwrap_err();
        assert!(err.downcast_ref::<EmailTaken>().is_some());

        let found = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.email, "ana@example.com");
    }

    #[tokio::test]
    async fn local_password_update_persists() {
        let store = LocalAccountStore::new(Arc::new(LocalStore::in_memory()));
        let created = store.create("ana@example.com", "old").await.unwrap();
        store.update_password(created.id, "new").await.unwrap();
        let found = store.find_by_email("ana@example.com").await.unwrap().unwrap();
        assert_eq!(found.password_hash, "new");
        assert!(store.update_password(Uuid::new_v4(), "x").await.is_err());
    }
}
