//! Forced password rotation for accounts that never changed their initial
//! password.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    GENERIC_ERROR_MESSAGE, reject,
    state::AuthState,
    storage,
    types::{ChangePasswordRequest, MessageResponse},
    utils::{normalize_email, valid_email},
};

#[utoipa::path(
    post,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation error", body = MessageResponse),
        (status = 401, description = "Bad credentials", body = MessageResponse),
        (status = 403, description = "Suspended account", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn change_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return reject(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return reject(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if request.current_password.is_empty() || request.new_password.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "Missing password");
    }

    let user = match storage::lookup_user_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Password change lookup failed: {err}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
        }
    };

    let verified = match &user {
        Some(user) => storage::verify_password(&user.password_hash, &request.current_password),
        None => {
            let _ = storage::verify_password(
                auth_state.dummy_password_hash(),
                &request.current_password,
            );
            false
        }
    };

    let Some(user) = user.filter(|_| verified) else {
        return reject(StatusCode::UNAUTHORIZED, "Incorrect email or password.");
    };

    if user.status != "active" {
        return reject(StatusCode::FORBIDDEN, "Your account has been suspended.");
    }

    let password_hash = match storage::hash_password(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
        }
    };

    if let Err(err) = storage::set_password(&pool, user.id, &password_hash).await {
        error!("Failed to store new password: {err}");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
    }

    let response = MessageResponse {
        message: "Password changed successfully. You can now log in with your new password."
            .to_string(),
    };
    (StatusCode::OK, Json(response)).into_response()
}
