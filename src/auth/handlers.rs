use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest, ResetConfirm,
            ResetIssued, ResetRequest,
        },
        jwt::{AuthUser, JwtKeys},
        password::hash_password,
        repo::EmailTaken,
        services::{authenticate, is_valid_email, Identity, LoginError, ADMIN_USER_ID},
    },
    state::AppState,
    telemetry::{record_auth, AuthEvent, Outcome},
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/reset/request", post(request_reset))
        .route("/auth/reset/confirm", post(confirm_reset))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue_pair(state: &AppState, who: Identity) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(who.id, &who.email).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let refresh_token = keys.sign_refresh(who.id, &who.email).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: who.id,
            email: who.email,
            admin: who.admin,
        },
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let account = match state.accounts.create(&payload.email, &hash).await {
        Ok(a) => a,
        Err(e) if e.is::<EmailTaken>() => {
            warn!(email = %payload.email, "email already registered");
            record_auth(
                state.activity.as_ref(),
                AuthEvent::new("register", Outcome::Failure, &payload.email).detail("email taken"),
            )
            .await;
            return Err((StatusCode::CONFLICT, e.to_string()));
        }
        Err(e) => {
            error!(error = %e, "create account failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    record_auth(
        state.activity.as_ref(),
        AuthEvent::new("register", Outcome::Success, &account.email).user(account.id),
    )
    .await;
    info!(user_id = %account.id, email = %account.email, "user registered");
    let response = issue_pair(
        &state,
        Identity {
            id: account.id,
            email: account.email,
            admin: false,
        },
    )?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let who = match authenticate(
        state.accounts.as_ref(),
        state.config.admin.as_ref(),
        &payload.email,
        &payload.password,
    )
    .await
    {
        Ok(who) => who,
        Err(LoginError::InvalidCredentials) => {
            warn!(email = %payload.email, "login rejected");
            record_auth(
                state.activity.as_ref(),
                AuthEvent::new("login", Outcome::Failure, &payload.email)
                    .detail("invalid credentials"),
            )
            .await;
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(LoginError::Internal(e)) => {
            error!(error = %e, "login failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    record_auth(
        state.activity.as_ref(),
        AuthEvent::new("login", Outcome::Success, &who.email)
            .user(who.id)
            .metadata(json!({ "admin": who.admin })),
    )
    .await;
    info!(user_id = %who.id, email = %who.email, "user logged in");
    Ok(Json(issue_pair(&state, who)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("{}", e)))?;

    let who = resolve_identity(&state, claims.sub, &claims.email).await?;
    Ok(Json(issue_pair(&state, who)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let who = resolve_identity(&state, user.user_id, &user.email).await?;
    Ok(Json(PublicUser {
        id: who.id,
        email: who.email,
        admin: who.admin,
    }))
}

/// The admin identity is not stored anywhere; it stays valid only while the admin pair is configured.
async fn resolve_identity(
    state: &AppState,
    user_id: Uuid,
    email: &str,
) -> Result<Identity, (StatusCode, String)> {
    if user_id == ADMIN_USER_ID {
        return match &state.config.admin {
            Some(admin) if admin.email == email => Ok(Identity {
                id: ADMIN_USER_ID,
                email: email.to_string(),
                admin: true,
            }),
            _ => Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        };
    }

    match state.accounts.find_by_id(user_id).await {
        Ok(Some(a)) => Ok(Identity {
            id: a.id,
            email: a.email,
            admin: false,
        }),
        Ok(None) => {
            warn!(user_id = %user_id, "user not found");
            Err((StatusCode::UNAUTHORIZED, "User not found".into()))
        }
        Err(e) => {
            error!(error = %e, user_id = %user_id, "find_by_id failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn request_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<ResetIssued>, (StatusCode, String)> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let account = state.accounts.find_by_email(&email).await.map_err(|e| {
        error!(error = %e, "find_by_email failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let mut code = None;
    if let Some(account) = account {
        let issued = state.reset_codes.issue(&account.email);
        if state.config.expose_reset_codes {
            code = Some(issued);
        } else {
            info!(email = %account.email, code = %issued, "password reset code issued");
        }
        record_auth(
            state.activity.as_ref(),
            AuthEvent::new("reset_request", Outcome::Success, &email).user(account.id),
        )
        .await;
    } else {
        warn!(email = %email, "reset requested for unknown email");
    }

    Ok(Json(ResetIssued {
        message: "If the account exists, a reset code has been issued.".into(),
        code,
    }))
}

#[instrument(skip(state, payload))]
pub async fn confirm_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetConfirm>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let email = payload.email.trim().to_lowercase();
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    if let Err(e) = state.reset_codes.consume(&email, &payload.code) {
        warn!(email = %email, reason = %e, "reset code rejected");
        record_auth(
            state.activity.as_ref(),
            AuthEvent::new("reset_confirm", Outcome::Failure, &email).detail(e.to_string()),
        )
        .await;
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let account = state
        .accounts
        .find_by_email(&email)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    let hash = hash_password(&payload.new_password)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state
        .accounts
        .update_password(account.id, &hash)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %account.id, "update_password failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    record_auth(
        state.activity.as_ref(),
        AuthEvent::new("reset_confirm", Outcome::Success, &email).user(account.id),
    )
    .await;
    info!(user_id = %account.id, "password reset");
    Ok(Json(PublicUser {
        id: account.id,
        email: account.email,
        admin: false,
    }))
}
