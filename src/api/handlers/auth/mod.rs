//! Auth handlers and supporting modules.
//!
//! The login flow is a chain of terminal decisions: IP block (middleware),
//! credential check, forced password rotation, suspension, trusted-device
//! bypass, OTP issuance. `verify-otp` is the second half of the OTP path:
//! it consumes the code, registers the browser as a trusted device, and
//! issues session credentials.
//!
//! Security-sensitive failures answer with deliberately generic messages; a
//! failed login never reveals whether the email exists or how close the IP
//! is to being blocked. Remaining cooldown/lock durations are the one
//! exception, since they help legitimate users.

mod login;
mod password;
mod state;
mod storage;
mod types;
mod user_agent;
mod utils;
mod verify;

pub use login::login;
pub use password::change_password;
pub use state::{AuthConfig, AuthState, Environment};
pub use verify::verify_otp;

pub(crate) use types::MessageResponse;
pub(crate) use utils::client_ip;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::otp::OtpRejection;

pub(crate) const GENERIC_ERROR_MESSAGE: &str = "An error occurred. Please try again.";

/// Build a JSON error response.
pub(crate) fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Translate an OTP rejection into its caller-facing response. The lock
/// message differs between requesting a code and verifying one.
pub(crate) fn otp_error_response(rejection: &OtpRejection, requesting: bool) -> Response {
    let status = match rejection {
        OtpRejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        OtpRejection::Locked { .. } => StatusCode::LOCKED,
        OtpRejection::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        OtpRejection::Invalid | OtpRejection::Expired | OtpRejection::AlreadyUsed => {
            StatusCode::BAD_REQUEST
        }
    };

    let message = match rejection {
        OtpRejection::Locked {
            retry_after_seconds,
        } if requesting => format!(
            "Your device is temporarily locked. Please try again in {}.",
            crate::otp::wait_phrase(*retry_after_seconds)
        ),
        other => other.message(),
    };

    reject(status, &message)
}
