use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{any, get},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

pub mod bearer;
pub mod client;
pub mod config;
pub mod context;
pub mod csrf;
pub mod error;
pub mod handlers;
pub mod redirect;
pub mod registry;
pub mod session;
pub mod settings;

mod state;
pub use self::state::GatewayState;

/// Request parameter selecting a client by name.
pub const CLIENT_NAME_PARAM: &str = "client_name";

/// Wrap `protected` in the security stage and mount the gateway endpoints.
///
/// `/logout` and `/callback` are served by their stages. `/health` stays open
/// unless disabled in the settings, then it is guarded like everything else.
/// Every other path, including unknown ones, requires authentication.
#[must_use]
pub fn router(protected: Router, state: Arc<GatewayState>) -> Router {
    let mut protected = protected.fallback(handlers::not_found);
    let mut public = Router::new()
        .route("/logout", any(handlers::logout))
        .route("/callback", any(handlers::callback));
    if state.settings().public_health() {
        public = public.route("/health", get(handlers::health));
    } else {
        protected = protected.route("/health", get(handlers::health));
    }
    let protected = protected.layer(middleware::from_fn(handlers::guard));

    public
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Serve the gateway until Ctrl-C.
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(port: u16, state: Arc<GatewayState>, protected: Router) -> Result<()> {
    let app = router(protected, state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let method = request.method().as_str();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", method, path, request_id)
}
