//! OTP verification: consumes the emailed code, remembers the device, and
//! issues session credentials.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    GENERIC_ERROR_MESSAGE, otp_error_response, reject,
    state::AuthState,
    storage,
    types::{MessageResponse, UserSummary, VerifyOtpRequest, VerifyOtpResponse},
    user_agent::parse_user_agent,
    utils::{generate_device_token, normalize_email, valid_email},
};
use crate::api::middleware::ClientIp;
use crate::trusted::{self, NewTrustedDevice};

#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP verified, session issued", body = VerifyOtpResponse),
        (status = 400, description = "Invalid, expired, or already used code", body = MessageResponse),
        (status = 423, description = "OTP device locked", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    client_ip: Extension<ClientIp>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Response {
    let request: VerifyOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return reject(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return reject(StatusCode::BAD_REQUEST, "Invalid email");
    }

    let code = request.otp_code.trim();
    let expected_length = auth_state.otp().policy().code_length();
    if code.len() != expected_length || !code.chars().all(|c| c.is_ascii_digit()) {
        return reject(StatusCode::BAD_REQUEST, "Invalid OTP. Please try again.");
    }

    let user = match storage::lookup_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return reject(
                StatusCode::BAD_REQUEST,
                "OTP device not found. Please try again.",
            );
        }
        Err(err) => {
            error!("OTP verification lookup failed: {err}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
        }
    };

    if let Err(rejection) = auth_state.otp().verify_code(&pool, user.id, code).await {
        return otp_error_response(&rejection, false);
    }

    let device_id = match generate_device_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate device token: {err}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
        }
    };

    let agent = parse_user_agent(
        headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(""),
    );

    // Session-limit enforcement and the insert run in one transaction, so
    // parallel verifications cannot push the user past the cap.
    let new_device = NewTrustedDevice {
        user_id: user.id,
        device_id: device_id.clone(),
        browser: agent.browser,
        os: agent.os,
        device: agent.device,
        ip_address: client_ip.0.0.clone(),
    };
    if let Err(err) =
        trusted::register(&pool, &new_device, auth_state.config().trust_policy()).await
    {
        error!("Failed to register trusted device: {err}");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
    }

    if let Err(err) = storage::update_last_login(&pool, user.id).await {
        error!("Failed to update last login: {err}");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE);
    }

    let access_token = match storage::insert_session(
        &pool,
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

    let response = VerifyOtpResponse {
        message: "OTP verified successfully.".to_string(),
        user: UserSummary {
            id: user.id.to_string(),
            email: user.email,
            username: user.username,
        },
        access_token,
        trusted_device_id: device_id,
    };
    (StatusCode::OK, Json(response)).into_response()
}
