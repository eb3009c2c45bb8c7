//! HTTP server assembly: connection pool, middleware stack, routes, and
//! background workers.

use crate::{
    api::handlers::{auth, health, root},
    ipguard::{IpGuard, IpPolicy, MemoryCache},
    otp::{OtpCipher, OtpPolicy, OtpService},
    trusted,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;

pub(crate) mod email;
pub mod handlers;
pub mod middleware;

pub use email::EmailWorkerConfig;

const TRUSTED_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable or the listener cannot
/// bind.
pub async fn new(
    port: u16,
    dsn: String,
    cipher: OtpCipher,
    auth_config: auth::AuthConfig,
    otp_policy: OtpPolicy,
    ip_policy: IpPolicy,
    email_config: EmailWorkerConfig,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let otp = OtpService::new(cipher, otp_policy);
    let ip_guard = IpGuard::new(Arc::new(MemoryCache::new()), ip_policy);
    let auth_state = Arc::new(auth::AuthState::new(auth_config, otp, ip_guard)?);

    // OTP delivery drains through the outbox; expired trusted devices are
    // swept in the background.
    email::spawn_outbox_worker(
        pool.clone(),
        Arc::new(email::LogEmailSender),
        email_config,
    );
    trusted::spawn_cleanup_worker(pool.clone(), TRUSTED_CLEANUP_INTERVAL);

    // Every auth route sits behind the IP block middleware; health and the
    // root banner stay open.
    let auth_routes = Router::new()
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/verify-otp", post(auth::verify_otp))
        .route("/v1/auth/change-password", post(auth::change_password))
        .route_layer(axum::middleware::from_fn(middleware::ip_block));

    let app = Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health))
        .merge(auth_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state.clone()))
                .layer(Extension(pool.clone())),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
