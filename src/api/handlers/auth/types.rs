//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub username: String,
}

/// Login outcome. Exactly one of the optional groups is populated: session
/// credentials (trusted bypass), an OTP challenge acknowledgement, or the
/// forced password change signal.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LoginResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_password_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_device_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpResponse {
    pub message: String,
    pub user: UserSummary,
    pub access_token: String,
    /// Fresh identifier the client presents on future logins to skip the
    /// OTP step.
    pub trusted_device_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "alice@example.com");
        Ok(())
    }

    #[test]
    fn login_response_omits_empty_fields() -> Result<()> {
        let response = LoginResponse {
            message: "OTP sent".to_string(),
            otp_required: Some(true),
            email: Some("alice@example.com".to_string()),
            ..LoginResponse::default()
        };
        let value = serde_json::to_value(&response)?;
        let object = value.as_object().context("expected object")?;

        assert!(object.contains_key("otp_required"));
        assert!(!object.contains_key("access_token"));
        assert!(!object.contains_key("change_password_required"));
        assert!(!object.contains_key("trusted_device_id"));
        Ok(())
    }

    #[test]
    fn verify_otp_response_round_trips() -> Result<()> {
        let response = VerifyOtpResponse {
            message: "OTP verified successfully.".to_string(),
            user: UserSummary {
                id: "2d4cfa23-1bc5-4f82-9c1d-5a1c4c9fadc1".to_string(),
                email: "alice@example.com".to_string(),
                username: "alice".to_string(),
            },
            access_token: "token".to_string(),
            trusted_device_id: "device".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: VerifyOtpResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.trusted_device_id, "device");
        assert_eq!(decoded.user.username, "alice");
        Ok(())
    }
}
