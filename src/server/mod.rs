//! HTTP server module
//!
//! Accepts connections, routes requests, and maps authentication decisions
//! to HTTP responses. Any rejected decision yields the same generic 401 body;
//! internal rejection kinds are never echoed to callers.

use crate::auth::{AuthDecision, AuthGate, HttpKeyFetcher, KeyProvider, TokenValidator};
use crate::config::Config;
use crate::metrics;
use crate::router::{Route, RouteParser, RouterError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Generic body returned for every rejected authentication. Deliberately
/// does not distinguish failure reasons.
const REJECTION_BODY: &str = r#"{"error":"invalid or expired credential"}"#;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Failed to initialize authentication: {0}")]
    InitError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Origin allow-list for browser callers
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

/// Process-wide state shared by all connections
struct AppState {
    gate: AuthGate,
    cors: CorsPolicy,
    metrics_enabled: bool,
}

/// HTTP Server
pub struct Server {
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Server {
    /// Create a new server instance and wire up the authentication pipeline
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("{}", e)))?;

        let fetcher = HttpKeyFetcher::new(
            &config.auth.jwks_url,
            Duration::from_secs(config.auth.fetch_timeout_secs),
        )
        .map_err(|e| ServerError::InitError(e.to_string()))?;
        let keys = Arc::new(KeyProvider::new(Arc::new(fetcher)));
        let validator = TokenValidator::new(&config.auth, keys)?;
        let gate = AuthGate::new(validator);

        let state = Arc::new(AppState {
            gate,
            cors: CorsPolicy::new(config.cors.allowed_origins.clone()),
            metrics_enabled: config.metrics.enabled,
        });

        Ok(Self {
            addr,
            state,
            shutdown_tx: None,
            server_handle: None,
        })
    }

    /// Start the server in the background.
    ///
    /// Returns the actual bound address (useful when using port 0).
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            run_server(listener, state, shutdown_rx).await;
        });
        self.server_handle = Some(handle);

        info!("Listening on {}", addr);
        Ok(addr)
    }

    /// Shutdown the server
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }

    /// Run the server until interrupted
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.start().await?;

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| ServerError::RuntimeError(e.to_string()))?;

        info!("Shutting down server");
        self.shutdown().await;
        Ok(())
    }
}

/// Run the HTTP accept loop
async fn run_server(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(state, req).await }
                            });
                            let _ = http1::Builder::new()
                                .serve_connection(io, service)
                                .await;
                        });
                    }
                    Err(_) => continue,
                }
            }
        }
    }
}

/// Handle one HTTP request
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = Uuid::new_v4();
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let mut response = match RouteParser::parse(&method, &path) {
        Ok(Route::Preflight) => preflight_response(&state.cors, origin.as_deref()),
        Ok(Route::Public) => public_handler(),
        Ok(Route::Protected) => {
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            protected_handler(&state.gate, authorization).await
        }
        Ok(Route::Health) => health_handler(),
        Ok(Route::Metrics) if state.metrics_enabled => metrics_handler(),
        Ok(Route::Metrics) => error_response(StatusCode::NOT_FOUND, "Not Found"),
        Err(RouterError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "Not Found"),
        Err(RouterError::MethodNotAllowed(_)) => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
    };

    apply_cors(&state.cors, origin.as_deref(), &mut response);
    metrics::record_http_request(&path, response.status().as_u16());
    debug!(
        %request_id,
        %method,
        %path,
        status = response.status().as_u16(),
        "request handled"
    );

    Ok(response)
}

/// Handle the unprotected route
fn public_handler() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        serde_json::json!({"message": "This is a public route"}),
    )
}

/// Handle the protected route
async fn protected_handler(
    gate: &AuthGate,
    authorization: Option<&str>,
) -> Response<Full<Bytes>> {
    match gate.authenticate(authorization).await {
        AuthDecision::Authenticated(claims) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "message": "This is a protected route",
                "subject": claims.subject(),
            }),
        ),
        AuthDecision::Rejected(_) => unauthorized_response(),
    }
}

/// Handle /health
fn health_handler() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(r#"{"status":"ok"}"#)))
        .unwrap()
}

/// Handle /metrics
fn metrics_handler() -> Response<Full<Bytes>> {
    match metrics::gather_text() {
        Ok(buffer) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(buffer)))
            .unwrap(),
        Err(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        ),
    }
}

/// Uniform response for any rejected authentication
fn unauthorized_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::WWW_AUTHENTICATE, "Bearer")
        .body(Full::new(Bytes::from(REJECTION_BODY)))
        .unwrap()
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn error_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(message)))
        .unwrap()
}

/// Answer a CORS preflight. Handled before authentication; a preflight never
/// carries credentials.
fn preflight_response(cors: &CorsPolicy, origin: Option<&str>) -> Response<Full<Bytes>> {
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap();

    if origin.map(|o| cors.allows(o)).unwrap_or(false) {
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("authorization, content-type"),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("600"),
        );
    }

    response
}

/// Attach CORS headers for allowed origins
fn apply_cors(cors: &CorsPolicy, origin: Option<&str>, response: &mut Response<Full<Bytes>>) {
    let Some(origin) = origin else { return };
    if !cors.allows(origin) {
        return;
    }

    // The origin came from a parsed header value, so it round-trips.
    if let Ok(value) = HeaderValue::from_str(origin) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, CorsConfig, MetricsConfig, ServerConfig};

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
            },
            auth: AuthConfig {
                issuer: "https://idp.example.com/".into(),
                audience: "test-api".into(),
                algorithms: vec!["RS256".into()],
                jwks_url: "https://idp.example.com/.well-known/jwks.json".into(),
                clock_skew_secs: 30,
                fetch_timeout_secs: 5,
            },
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_server_new() {
        let config = test_config();
        let server = Server::new(config);
        assert!(server.is_ok());
    }

    #[test]
    fn test_server_invalid_address() {
        let mut config = test_config();
        config.server.address = "invalid".into();
        let server = Server::new(config);
        assert!(matches!(server, Err(ServerError::BindError(_))));
    }

    #[test]
    fn test_cors_policy_allows_listed_origin() {
        let cors = CorsPolicy::new(vec!["http://127.0.0.1:5500".into()]);
        assert!(cors.allows("http://127.0.0.1:5500"));
        assert!(!cors.allows("http://evil.example.com"));
    }

    #[test]
    fn test_unauthorized_body_is_generic() {
        let response = unauthorized_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn test_preflight_without_origin_has_no_cors_headers() {
        let cors = CorsPolicy::new(vec!["http://127.0.0.1:5500".into()]);
        let response = preflight_response(&cors, None);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }
}
