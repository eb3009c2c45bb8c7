//! Password login: IP-gated, credential-checked, then either a trusted
//! device bypass or an OTP challenge.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    GENERIC_ERROR_MESSAGE, otp_error_response, reject,
    state::AuthState,
    storage::{self, UserRecord},
    types::{LoginRequest, LoginResponse, MessageResponse, UserSummary},
    user_agent::parse_user_agent,
    utils::{normalize_email, trusted_device_cookie, valid_email},
};
use crate::api::middleware::ClientIp;
use crate::trusted::{self, TrustedDevice};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login accepted: session issued, OTP required, or password change required", body = LoginResponse),
        (status = 400, description = "Validation error", body = MessageResponse),
        (status = 401, description = "Bad credentials", body = MessageResponse),
        (status = 403, description = "Blocked IP or suspended account", body = MessageResponse),
        (status = 423, description = "OTP device locked", body = MessageResponse),
        (status = 429, description = "OTP cooldown in effect", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    client_ip: Extension<ClientIp>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return reject(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return reject(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if request.password.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "Missing password");
    }

    let ip = client_ip.0.0.clone();

    let user = match storage::lookup_user_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Login lookup failed: {err}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
        }
    };

    // Unknown accounts still pay the verification cost so the failure path
    // is indistinguishable from a wrong password.
    let verified = match &user {
        Some(user) => storage::verify_password(&user.password_hash, &request.password),
        None => {
            let _ = storage::verify_password(auth_state.dummy_password_hash(), &request.password);
            false
        }
    };

    let Some(user) = user.filter(|_| verified) else {
        return credential_failure(&pool, &auth_state, ip.as_deref()).await;
    };

    if !user.has_changed_password {
        let response = LoginResponse {
            message: "Please change your password to continue.".to_string(),
            change_password_required: Some(true),
            email: Some(user.email),
            ..LoginResponse::default()
        };
        return (StatusCode::OK, Json(response)).into_response();
    }

    if user.status != "active" {
        if let Some(ip) = ip.as_deref() {
            if let Err(err) = auth_state.ip_guard().record_failure(&pool, ip).await {
                error!("Failed to record suspended-account attempt: {err}");
            }
        }
        return reject(StatusCode::FORBIDDEN, "Your account has been suspended.");
    }

    // Credentials are good; the failed-attempt counter no longer applies.
    if let Some(ip) = ip.as_deref() {
        auth_state.ip_guard().reset_attempts(ip);
    }

    if let Some(device_id) = trusted_device_cookie(&headers) {
        match trusted::lookup_active(&pool, user.id, &device_id, Utc::now()).await {
            Ok(Some(device)) => {
                return trusted_bypass(&pool, &auth_state, &headers, &user, device, ip.as_deref())
                    .await;
            }
            // Unknown, expired, or foreign device id: fall through to OTP.
            Ok(None) => {}
            Err(err) => {
                error!("Trusted device lookup failed: {err}");
                return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
            }
        }
    }

    match auth_state.otp().request_code(&pool, user.id, &user.email).await {
        Ok(()) => {
            let response = LoginResponse {
                message: "We sent a verification code to your email.".to_string(),
                otp_required: Some(true),
                email: Some(user.email),
                ..LoginResponse::default()
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(rejection) => otp_error_response(&rejection, true),
    }
}

/// Record the failure against the IP. Crossing the blocking threshold turns
/// the response into the same generic 403 the middleware serves; otherwise
/// the 401 reveals nothing about the account or the counter.
async fn credential_failure(pool: &PgPool, auth_state: &AuthState, ip: Option<&str>) -> Response {
    if let Some(ip) = ip {
        match auth_state.ip_guard().record_failure(pool, ip).await {
            Ok(true) => {
                return reject(StatusCode::FORBIDDEN, "Access denied. Please contact support.");
            }
            Ok(false) => {}
            Err(err) => {
                error!("Failed to record login failure: {err}");
                return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
            }
        }
    }
    reject(
        StatusCode::UNAUTHORIZED,
        "The credentials you entered are incorrect.",
    )
}

/// Complete a login on a remembered device: refresh its metadata, renew the
/// trust window, and issue session credentials without an OTP round trip.
async fn trusted_bypass(
    pool: &PgPool,
    auth_state: &AuthState,
    headers: &HeaderMap,
    user: &UserRecord,
    device: TrustedDevice,
    ip: Option<&str>,
) -> Response {
    let agent = parse_user_agent(
        headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(""),
    );

    let renewed = trusted::renew_for_login(
        pool,
        device.id,
        &agent.browser,
        &agent.os,
        &agent.device,
        ip,
        auth_state.config().trust_policy().trust_days(),
    )
    .await;
    if let Err(err) = renewed {
        error!("Failed to renew trusted device: {err}");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
    }

    if let Err(err) = storage::update_last_login(pool, user.id).await {
        error!("Failed to update last login: {err}");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
    }

    let access_token = match storage::insert_session(
        pool,
        user.id,
        auth_state.config().session_ttl_seconds(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
        }
    };

    let response = LoginResponse {
        message: "Login successful.".to_string(),
        otp_required: Some(false),
        user: Some(UserSummary {
            id: user.id.to_string(),
            email: user.email.clone(),
            username: user.username.clone(),
        }),
        access_token: Some(access_token),
        trusted_device_id: Some(device.device_id),
        ..LoginResponse::default()
    };
    (StatusCode::OK, Json(response)).into_response()
}
