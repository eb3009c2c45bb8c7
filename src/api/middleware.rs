//! IP block middleware guarding the auth routes.
//!
//! Runs before any credential work: resolve the client IP, reject blocked
//! addresses with the same generic message regardless of why, and stash the
//! resolved IP in request extensions so handlers do not re-derive it.

use axum::{
    Extension,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tracing::error;

use super::handlers::auth::{self, AuthState};

/// Client IP resolved once at the edge, `None` when undetectable.
#[derive(Clone, Debug)]
pub struct ClientIp(pub Option<String>);

pub async fn ip_block(
    Extension(pool): Extension<PgPool>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ip = auth::client_ip(request.headers(), peer.map(|info| info.0));

    let Some(ip) = ip else {
        // Development tolerates undetectable IPs; production rejects them.
        if auth_state.config().permissive_ip() {
            request.extensions_mut().insert(ClientIp(None));
            return next.run(request).await;
        }
        return auth::reject(StatusCode::BAD_REQUEST, "Unable to process your request.");
    };

    match auth_state.ip_guard().is_blocked(&pool, &ip).await {
        Ok(true) => auth::reject(
            StatusCode::FORBIDDEN,
            "Access denied. Please contact support.",
        ),
        Ok(false) => {
            request.extensions_mut().insert(ClientIp(Some(ip)));
            next.run(request).await
        }
        Err(err) => {
            error!("IP block check failed: {err}");
            auth::reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                auth::GENERIC_ERROR_MESSAGE,
            )
        }
    }
}
