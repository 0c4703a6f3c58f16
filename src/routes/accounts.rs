use axum::{extract::State, http::StatusCode};
use serde_json::{json, Value};

use super::{AppState, Json};
use crate::error::ApiError;
use crate::models::{LoginReq, RegisterReq};
use crate::policy::Principal;
use crate::{auth, rules, store};

pub async fn register(
    State(st): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    rules::check_registration(&req)?;
    let username = rules::normalize_username(&req.username);
    let password_hash = auth::hash_password(&req.password)?;
    let user = store::register_user(&st.db, &username, req.email.trim(), &password_hash).await?;

    let token = auth::new_token();
    store::issue_token(&st.db, user.id, &auth::token_digest(&token), st.token_ttl_hours).await?;
    tracing::info!(user = %user.username, "registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registered Successfully!",
            "username": user.username,
            "email": user.email,
            "token": token,
        })),
    ))
}

pub async fn login(
    State(st): State<AppState>,
    Json(req): Json<LoginReq>,
) -> Result<Json<Value>, ApiError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::general("Must include 'username' and 'password'."));
    }

    let username = rules::normalize_username(&req.username);
    let user = match store::user_by_username(&st.db, &username).await? {
        Some(u) if auth::verify_password(&req.password, &u.password_hash) => u,
        _ => {
            tracing::warn!(user = %username, "rejected login");
            return Err(ApiError::general("Unable to log in with provided credentials."));
        }
    };
    if !user.is_active {
        return Err(ApiError::general("User account is not active."));
    }

    let token = auth::new_token();
    store::issue_token(&st.db, user.id, &auth::token_digest(&token), st.token_ttl_hours).await?;

    Ok(Json(json!({ "message": "Login Successfully!", "token": token })))
}

pub async fn logout(
    State(st): State<AppState>,
    principal: Principal,
) -> Result<Json<Value>, ApiError> {
    let me = principal.require()?;
    let revoked = store::revoke_tokens(&st.db, me.user_id).await?;
    tracing::debug!(user = %me.username, revoked, "logged out");
    Ok(Json(json!({ "message": "Logout successful." })))
}
