use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::global_metrics;

/// Axum middleware for `concord-bridge`'s webhook receiver: records
/// `bridge_requests_total` and `bridge_request_duration_seconds` for every
/// inbound request (§6, §10.1).
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let m = global_metrics();
    m.increment_counter("bridge_requests_total", &[("method", &method), ("path", &path), ("status", &status)]);
    m.record_histogram("bridge_request_duration_seconds", duration);

    response
}
