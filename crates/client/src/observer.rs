//! Side-channel hooks around outgoing requests.
//!
//! Observers see every attempt the connection makes. They are called
//! synchronously and cannot influence the request.

use adb_domain::http::{Request, Response};

pub trait RequestObserver: Send + Sync {
    fn on_request(&self, _host: &str, _request: &Request) {}

    fn on_response(&self, _host: &str, _request: &Request, _response: &Response) {}

    /// A connection-level failure on `host`; the connection will fail over
    /// if another host is left.
    fn on_failure(&self, _host: &str, _request: &Request, _reason: &str) {}
}

/// Logs each attempt at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn on_request(&self, host: &str, request: &Request) {
        tracing::debug!(
            host,
            method = %request.method,
            endpoint = %request.endpoint,
            body_bytes = request.body_len(),
            "sending request"
        );
    }

    fn on_response(&self, host: &str, request: &Request, response: &Response) {
        tracing::debug!(
            host,
            method = %request.method,
            endpoint = %request.endpoint,
            status = response.status_code,
            body_bytes = response.raw_body.len(),
            "received response"
        );
    }

    fn on_failure(&self, host: &str, request: &Request, reason: &str) {
        tracing::debug!(host, request = %request, reason, "request attempt failed");
    }
}
