//! HTTP route parsing
//!
//! Maps incoming method/path pairs to the service's routes.

use thiserror::Error;

/// Router errors
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
}

/// Service routes
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// GET /api/public — no authentication
    Public,
    /// GET /api/protected — requires a valid bearer token
    Protected,
    /// GET /health
    Health,
    /// GET /metrics — Prometheus text exposition
    Metrics,
    /// OPTIONS on any path — CORS preflight, handled before auth
    Preflight,
}

/// Request route parser
pub struct RouteParser;

impl RouteParser {
    /// Parse an HTTP request line into a route
    pub fn parse(method: &str, path: &str) -> Result<Route, RouterError> {
        if method == "OPTIONS" {
            return Ok(Route::Preflight);
        }

        let route = match path {
            "/api/public" => Route::Public,
            "/api/protected" => Route::Protected,
            "/health" => Route::Health,
            "/metrics" => Route::Metrics,
            other => return Err(RouterError::NotFound(other.to_string())),
        };

        if method != "GET" {
            return Err(RouterError::MethodNotAllowed(format!(
                "Method {} not allowed",
                method
            )));
        }

        Ok(route)
    }
}
