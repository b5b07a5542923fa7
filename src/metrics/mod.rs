//! Metrics module
//!
//! Prometheus metrics for the authentication pipeline and HTTP surface.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder,
};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "tokengate_auth_attempts_total",
        "Authentication attempts",
        &["outcome"]
    ).unwrap();

    pub static ref AUTH_REJECTIONS: CounterVec = register_counter_vec!(
        "tokengate_auth_rejections_total",
        "Rejected authentications by kind",
        &["kind"]
    ).unwrap();

    pub static ref VALIDATION_DURATION: Histogram = register_histogram!(
        "tokengate_token_validation_duration_seconds",
        "Token validation duration in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // Key cache metrics
    pub static ref KEY_FETCHES: CounterVec = register_counter_vec!(
        "tokengate_key_fetches_total",
        "JWKS document fetches",
        &["status"]
    ).unwrap();

    pub static ref KEY_CACHE: CounterVec = register_counter_vec!(
        "tokengate_key_cache_lookups_total",
        "Key cache lookups",
        &["result"]
    ).unwrap();

    // HTTP metrics
    pub static ref HTTP_REQUESTS: CounterVec = register_counter_vec!(
        "tokengate_http_requests_total",
        "HTTP requests",
        &["path", "status"]
    ).unwrap();
}

/// Record a successful authentication and its validation duration
pub fn record_auth_success(duration_secs: f64) {
    AUTH_ATTEMPTS.with_label_values(&["authenticated"]).inc();
    VALIDATION_DURATION.observe(duration_secs);
}

/// Record a rejected authentication
pub fn record_auth_rejection(kind: &str) {
    AUTH_ATTEMPTS.with_label_values(&["rejected"]).inc();
    AUTH_REJECTIONS.with_label_values(&[kind]).inc();
}

/// Record a JWKS fetch attempt
pub fn record_key_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    KEY_FETCHES.with_label_values(&[status]).inc();
}

/// Record a key cache hit
pub fn record_key_cache_hit() {
    KEY_CACHE.with_label_values(&["hit"]).inc();
}

/// Record a key cache miss
pub fn record_key_cache_miss() {
    KEY_CACHE.with_label_values(&["miss"]).inc();
}

/// Record a handled HTTP request
pub fn record_http_request(path: &str, status: u16) {
    HTTP_REQUESTS
        .with_label_values(&[path, &status.to_string()])
        .inc();
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        record_auth_success(0.002);
        record_auth_rejection("bad_signature");
        record_key_fetch(true);
        record_key_cache_hit();
        record_key_cache_miss();
        record_http_request("/api/protected", 401);

        let text = String::from_utf8(gather_text().unwrap()).unwrap();
        assert!(text.contains("tokengate_auth_attempts_total"));
        assert!(text.contains("tokengate_key_cache_lookups_total"));
    }
}
