use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use super::dto::AccessRequest;
use crate::{
    auth::services::is_valid_email,
    codes::{repo::CodeStore, repo_types::Redemption},
    config::AccessConfig,
};

pub const PRIVATE_PAGE: &str = "residue-private.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Granted,
    Missing,
    BadFormat,
    Unknown,
    Exhausted,
}

impl GateOutcome {
    pub fn message(self) -> &'static str {
        match self {
            GateOutcome::Granted => "Access granted.",
            GateOutcome::Missing => "Enter a code to continue.",
            GateOutcome::BadFormat => "Use your issued access code.",
            GateOutcome::Unknown => "Code not recognised. Request access if needed.",
            GateOutcome::Exhausted => "This code was used. Request access if needed.",
        }
    }
}

/// Trims and upper-cases `raw`, or says why it cannot be a code.
pub fn normalize_code(raw: &str) -> Result<String, GateOutcome> {
    lazy_static! {
        static ref CODE_RE: Regex = Regex::new(r"^[A-Z]+-[A-Z0-9]{3,6}$").unwrap();
    }
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(GateOutcome::Missing);
    }
    if !CODE_RE.is_match(&code) {
        return Err(GateOutcome::BadFormat);
    }
    Ok(code)
}

/// Master codes never run out. Invite codes spend one use each; without a code store only
/// master codes are recognised.
pub async fn verify_code(
    access: &AccessConfig,
    codes: Option<&dyn CodeStore>,
    raw: &str,
) -> anyhow::Result<GateOutcome> {
    let code = match normalize_code(raw) {
        Ok(c) => c,
        Err(outcome) => return Ok(outcome),
    };
    if access.master_codes.iter().any(|m| *m == code) {
        return Ok(GateOutcome::Granted);
    }
    let Some(codes) = codes else {
        debug!(%code, "no code store; only master codes accepted");
        return Ok(GateOutcome::Unknown);
    };
    Ok(match codes.redeem(&code).await? {
        Redemption::Redeemed(spent) => {
            info!(code = %spent.code, uses_left = spent.uses_left(), "invite code redeemed");
            GateOutcome::Granted
        }
        Redemption::Exhausted => GateOutcome::Exhausted,
        Redemption::Unknown => GateOutcome::Unknown,
    })
}

pub const REQUEST_MISSING: &str = "Check your details. Some fields are missing.";
pub const REQUEST_BAD_EMAIL: &str = "Email looks off. Adjust and resend.";
pub const REQUEST_RECEIVED: &str = "Received. We will respond if aligned.";

pub fn validate_request(req: &AccessRequest) -> Result<(), &'static str> {
    let fields = [&req.name, &req.email, &req.social, &req.reason];
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(REQUEST_MISSING);
    }
    if !is_valid_email(req.email.trim()) {
        return Err(REQUEST_BAD_EMAIL);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropState {
    Closed,
    Elapsed,
    OpenIndefinitely,
    Open { remaining: Duration },
}

pub fn drop_state(access: &AccessConfig, now: OffsetDateTime) -> DropState {
    if !access.drop_open {
        return DropState::Closed;
    }
    match access.drop_end {
        None => DropState::OpenIndefinitely,
        Some(end) if now >= end => DropState::Elapsed,
        Some(end) => DropState::Open {
            remaining: end - now,
        },
    }
}

/// `HH:MM:SS remaining`; hours are not wrapped at 24.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.whole_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02} remaining",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

impl DropState {
    pub fn is_open(&self) -> bool {
        matches!(self, DropState::OpenIndefinitely | DropState::Open { .. })
    }

    pub fn message(&self) -> String {
        match self {
            DropState::Closed => "Closed for now. Request a code to enter.".into(),
            DropState::Elapsed => "Closed for now. Window elapsed.".into(),
            DropState::OpenIndefinitely => "Open until manually closed.".into(),
            DropState::Open { remaining } => format_remaining(*remaining),
        }
    }
}
