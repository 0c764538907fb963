use std::{collections::HashMap, sync::Mutex};

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

use super::{
    password::{hash_password, needs_rehash, verify_password},
    repo::AccountStore,
};
use crate::config::AdminCredential;

/// Stable id handed to the configured admin login.
pub const ADMIN_USER_ID: Uuid = Uuid::from_u128(0xad);

pub const RESET_CODE_TTL: Duration = Duration::minutes(10);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub admin: bool,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn admin_matches(admin: Option<&AdminCredential>, email: &str, password: &str) -> bool {
    admin.is_some_and(|a| a.email == email && a.password == password)
}

/// Checks the admin pair first, then the account store. `email` must already be normalized.
pub async fn authenticate(
    accounts: &dyn AccountStore,
    admin: Option<&AdminCredential>,
    email: &str,
    password: &str,
) -> Result<Identity, LoginError> {
    if admin_matches(admin, email, password) {
        warn!(email, "admin credential used");
        return Ok(Identity {
            id: ADMIN_USER_ID,
            email: email.to_string(),
            admin: true,
        });
    }

    let account = accounts
        .find_by_email(email)
        .await?
        .ok_or(LoginError::InvalidCredentials)?;

    if !verify_password(password, &account.password_hash)? {
        return Err(LoginError::InvalidCredentials);
    }

    if needs_rehash(&account.password_hash) {
        let upgraded = hash_password(password)?;
        if let Err(e) = accounts.update_password(account.id, &upgraded).await {
            warn!(error = %e, user_id = %account.id, "legacy hash upgrade failed");
        }
    }

    Ok(Identity {
        id: account.id,
        email: account.email,
        admin: false,
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResetError {
    #[error("No reset was requested for this email.")]
    NotRequested,
    #[error("Reset code expired. Request a new one.")]
    Expired,
    #[error("Reset code is incorrect.")]
    Mismatch,
}

struct PendingReset {
    code: String,
    expires_at: OffsetDateTime,
}

/// One-time password reset codes. Process memory only; a restart forgets them.
#[derive(Default)]
pub struct ResetCodes {
    pending: Mutex<HashMap<String, PendingReset>>,
}

impl ResetCodes {
    pub fn issue(&self, email: &str) -> String {
        self.issue_at(email, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, email: &str, now: OffsetDateTime) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(
            email.to_string(),
            PendingReset {
                code: code.clone(),
                expires_at: now + RESET_CODE_TTL,
            },
        );
        code
    }

    pub fn consume(&self, email: &str, code: &str) -> Result<(), ResetError> {
        self.consume_at(email, code, OffsetDateTime::now_utc())
    }

    /// A matching code is removed; a wrong code leaves the pending reset in place.
    pub fn consume_at(&self, email: &str, code: &str, now: OffsetDateTime) -> Result<(), ResetError> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let entry = pending.get(email).ok_or(ResetError::NotRequested)?;
        if now > entry.expires_at {
            pending.remove(email);
            return Err(ResetError::Expired);
        }
        if entry.code != code.trim() {
            return Err(ResetError::Mismatch);
        }
        pending.remove(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{auth::repo::LocalAccountStore, local_store::LocalStore};

    fn admin() -> AdminCredential {
        AdminCredential {
            email: "admin@residue.test".into(),
            password: "letmein".into(),
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana example.com"));
    }

    #[tokio::test]
    async fn admin_pair_wins_over_local_accounts() {
        let accounts = LocalAccountStore::new(Arc::new(LocalStore::in_memory()));
        accounts
            .create("admin@residue.test", &hash_password("something-else").unwrap())
            .await
            .unwrap();

        let who = authenticate(&accounts, Some(&admin()), "admin@residue.test", "letmein")
            .await
            .unwrap();
        assert!(who.admin);
        assert_eq!(who.id, ADMIN_USER_ID);
    }

    #[tokio::test]
    async fn without_admin_config_the_store_decides() {
        let accounts = LocalAccountStore::new(Arc::new(LocalStore::in_memory()));
        let err = authenticate(&accounts, None, "admin@residue.test", "letmein")
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::InvalidCredentials));
    }

    #[tokio::test]
    async fn legacy_hash_is_upgraded_on_login() {
        let accounts = LocalAccountStore::new(Arc::new(LocalStore::in_memory()));
        let legacy = "sha256:5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        accounts.create("old@example.com", legacy).await.unwrap();

        let who = authenticate(&accounts, None, "old@example.com", "password").await.unwrap();
        assert!(!who.admin);

        let stored = accounts.find_by_email("old@example.com").await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2"));
        assert!(authenticate(&accounts, None, "old@example.com", "password").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let accounts = LocalAccountStore::new(Arc::new(LocalStore::in_memory()));
        accounts
            .create("ana@example.com", &hash_password("correct-horse").unwrap())
            .await
            .unwrap();
        let err = authenticate(&accounts, Some(&admin()), "ana@example.com", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::InvalidCredentials));
    }

    #[test]
    fn reset_code_is_six_digits_and_single_use() {
        let codes = ResetCodes::default();
        let now = OffsetDateTime::now_utc();
        let code = codes.issue_at("ana@example.com", now);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        assert_eq!(
            codes.consume_at("ana@example.com", "not-it", now),
            Err(ResetError::Mismatch)
        );
        assert_eq!(codes.consume_at("ana@example.com", &code, now), Ok(()));
        assert_eq!(
            codes.consume_at("ana@example.com", &code, now),
            Err(ResetError::NotRequested)
        );
    }

    #[test]
    fn reset_code_expires_after_ten_minutes() {
        let codes = ResetCodes::default();
        let now = OffsetDateTime::now_utc();
        let code = codes.issue_at("ana@example.com", now);
        let later = now + Duration::minutes(10) + Duration::seconds(1);
        assert_eq!(
            codes.consume_at("ana@example.com", &code, later),
            Err(ResetError::Expired)
        );

        let code = codes.issue_at("ana@example.com", now);
        let edge = now + Duration::minutes(10);
        assert_eq!(codes.consume_at("ana@example.com", &code, edge), Ok(()));
    }
}
