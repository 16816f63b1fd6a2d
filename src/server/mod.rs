//! HTTP server: router, auth middleware, and request plumbing

mod extract;
mod samples;
mod users;

pub use extract::{CurrentUser, MaybeUser};
pub use samples::{Sample, SampleCreate, SampleStore, SampleUpdate};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::auth::{OidcAuthorizer, User};
use crate::config::Config;
use crate::rate_limit::{PrincipalRateLimiter, rate_limit_key};
use crate::{Error, Result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The OIDC authorizer, initialized at startup
    pub authorizer: Arc<OidcAuthorizer>,
    /// Per-principal rate limiter
    pub limiter: Arc<PrincipalRateLimiter>,
    /// In-memory sample store
    pub samples: Arc<SampleStore>,
    /// Scopes every protected route requires
    pub required_scopes: Arc<Vec<String>>,
    /// Paths that bypass authentication
    pub public_paths: Arc<Vec<String>>,
}

impl AppState {
    /// Assemble application state from configuration and an authorizer
    #[must_use]
    pub fn new(config: &Config, authorizer: Arc<OidcAuthorizer>) -> Self {
        Self {
            authorizer,
            limiter: Arc::new(PrincipalRateLimiter::new(&config.rate_limit)),
            samples: Arc::new(SampleStore::new()),
            required_scopes: Arc::new(config.oidc.required_scopes.clone()),
            public_paths: Arc::new(config.server.public_paths.clone()),
        }
    }

    fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path == p)
    }
}

/// Build the gateway router
pub fn build_router(config: &Config, state: AppState) -> Result<Router> {
    let cors = cors_layer(&config.server.cors_origins)?;

    let router = Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(openapi))
        .route("/users/me", get(users::me))
        .route("/samples", get(samples::list).post(samples::create))
        .route(
            "/samples/{id}",
            get(samples::get_by_id)
                .put(samples::update)
                .delete(samples::remove),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    Ok(router)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).map_err(|_| Error::Config(format!("Invalid CORS origin: {o}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Authentication + rate-limit middleware.
///
/// Public paths pass through untouched. Everything else is authenticated
/// against the configured required scopes; the resulting [`User`] is inserted
/// as a request extension for downstream handlers. Rate limiting runs after
/// authentication so quotas key on the principal rather than the socket.
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let user = match state
        .authorizer
        .authenticate(request.headers(), &state.required_scopes)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            warn!(path = %path, error = %e, "Authentication failed");
            return e.into_response();
        }
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let key = rate_limit_key(user.as_ref(), peer);
    if !state.limiter.try_acquire(&key) {
        warn!(path = %path, key = %key, "Rate limit exceeded");
        return Error::RateLimited.into_response();
    }

    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

/// Read the authenticated principal attached to a request, if any
#[must_use]
pub fn current_user(request: &Request<Body>) -> Option<&User> {
    request.extensions().get::<User>()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "discovery_loaded": state.authorizer.is_initialized(),
    }))
}

/// Minimal OpenAPI document advertising the OAuth2 security scheme.
///
/// The scheme carries the live authorization/token endpoints, so it is only
/// present once the startup discovery fetch has completed.
async fn openapi(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut doc = json!({
        "openapi": "3.1.0",
        "info": {
            "title": "oidc-gateway",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    if let Some(scheme) = state.authorizer.security_scheme() {
        doc["components"] = json!({ "securitySchemes": { "oauth2": scheme } });
        doc["security"] = json!([{ "oauth2": *state.required_scopes }]);
    }
    if let Some(init) = state.authorizer.swagger_init_oauth() {
        doc["x-swagger-ui-init-oauth"] = init;
    }

    Json(doc)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidAuth(reason) => unauthorized_response(&reason),
            // A token referencing an unpublished key is treated as invalid;
            // the key id itself is not echoed back to the client
            Self::SigningKeyUnavailable(_) => unauthorized_response("Invalid token"),
            Self::DiscoveryUnavailable(_) => detail_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Identity provider configuration unavailable",
            ),
            Self::NotFound(detail) => detail_response(StatusCode::NOT_FOUND, &detail),
            Self::Validation(detail) => detail_response(StatusCode::UNPROCESSABLE_ENTITY, &detail),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", "60")],
                Json(json!({ "detail": "Rate limit exceeded" })),
            )
                .into_response(),
            other => {
                // Full detail server-side only
                error!(error = %other, "Internal error while handling request");
                detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

fn unauthorized_response(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({ "detail": detail })),
    )
        .into_response()
}

fn detail_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

/// The gateway server: composition root and run loop
pub struct GatewayServer {
    config: Config,
}

impl GatewayServer {
    /// Create a server from loaded configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server until a shutdown signal arrives.
    ///
    /// The startup discovery load is fatal: a gateway that cannot reach its
    /// identity provider on a cold start must not begin serving requests.
    pub async fn run(self) -> Result<()> {
        let authorizer = Arc::new(OidcAuthorizer::new(&self.config.oidc)?);
        authorizer.init().await?;

        let state = AppState::new(&self.config, authorizer);
        let app = build_router(&self.config, state)?;

        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "Gateway listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Gateway shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
