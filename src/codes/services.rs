use rand::Rng;
use tracing::info;
use uuid::Uuid;

use super::{repo::CodeStore, repo_types::InviteCode};

pub const CODE_PREFIX: &str = "RES";
pub const DEFAULT_MAX_USES: i32 = 5;

/// No 0/O or 1/I, so codes survive being read aloud or retyped.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_BODY_LEN: usize = 4;

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..CODE_BODY_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{CODE_PREFIX}-{body}")
}

/// Idempotent per owner: a second call returns the first code.
pub async fn issue_owner_code(store: &dyn CodeStore, owner: Uuid) -> anyhow::Result<InviteCode> {
    let code = store
        .create_for_owner(owner, &generate_code(), DEFAULT_MAX_USES)
        .await?;
    info!(%owner, code = %code.code, "owner code ready");
    Ok(code)
}
