use serde::Serialize;

use super::repo_types::InviteCode;

/// An owner's invite code with its remaining uses.
#[derive(Debug, Serialize)]
pub struct OwnerCode {
    #[serde(flatten)]
    pub code: InviteCode,
    pub uses_left: i32,
}

impl From<InviteCode> for OwnerCode {
    fn from(code: InviteCode) -> Self {
        Self {
            uses_left: code.uses_left(),
            code,
        }
    }
}
