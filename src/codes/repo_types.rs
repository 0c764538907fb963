use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Invite code row. One per owner profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InviteCode {
    pub id: Uuid,
    pub owner_profile: Uuid,
    pub code: String,
    pub max_uses: i32,
    pub used_count: i32,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl InviteCode {
    pub fn uses_left(&self) -> i32 {
        (self.max_uses - self.used_count).max(0)
    }
}

/// Result of trying to spend one use of a code.
#[derive(Debug)]
pub enum Redemption {
    Redeemed(InviteCode),
    Exhausted,
    Unknown,
}
