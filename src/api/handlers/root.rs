use axum::response::IntoResponse;

// Plain banner so load balancers and humans get a cheap 200.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
