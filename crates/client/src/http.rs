//! HTTP transport layer.
//!
//! A [`Transport`] executes exactly one exchange against one host. It knows
//! nothing about credentials, failover or error bodies; it only has to tell
//! a failed connection apart from a well-formed (possibly non-2xx) response.

use std::collections::HashMap;
use std::time::Duration;

use adb_domain::config::ClientConfig;
use adb_domain::http::{Headers, Method, Request, Response};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Handle to an opened host. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    host: String,
}

impl Session {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Base URL of the host, without a trailing slash.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.host, endpoint)
    }
}

/// Trait for per-host HTTP exchanges.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Open (or reuse) a session for `host`. Idempotent per host.
    async fn open(&self, host: &str) -> Result<Session, TransportError>;

    /// Drop the pooled connections behind `session`.
    async fn close(&self, session: &Session);

    /// Send `request` as-is. Non-2xx answers are `Ok`.
    async fn execute(&self, session: &Session, request: &Request) -> Result<Response, TransportError>;
}

/// Errors that can occur while executing one exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// DNS, refused connection, TLS handshake. Triggers failover.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No answer within the request deadline. The server may have acted.
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Other(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// reqwest transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 32,
        }
    }
}

impl From<&ClientConfig> for TransportOptions {
    fn from(cfg: &ClientConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            pool_max_idle_per_host: cfg.pool_max_idle_per_host,
        }
    }
}

/// Transport backed by one pooled `reqwest::Client` per host.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    options: TransportOptions,
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        reqwest::Client::builder()
            .timeout(self.options.request_timeout)
            .connect_timeout(self.options.connect_timeout)
            .pool_max_idle_per_host(self.options.pool_max_idle_per_host)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))
    }

    fn client_for(&self, session: &Session) -> Result<reqwest::Client, TransportError> {
        self.clients
            .lock()
            .get(session.host())
            .cloned()
            .ok_or_else(|| TransportError::Other(format!("session for {} is closed", session.host())))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, host: &str) -> Result<Session, TransportError> {
        let session = Session::new(host);
        let mut clients = self.clients.lock();
        if !clients.contains_key(session.host()) {
            let client = self.build_client()?;
            clients.insert(session.host().to_owned(), client);
            tracing::debug!(host = %session.host(), "opened http session");
        }
        Ok(session)
    }

    async fn close(&self, session: &Session) {
        if self.clients.lock().remove(session.host()).is_some() {
            tracing::debug!(host = %session.host(), "closed http session");
        }
    }

    async fn execute(&self, session: &Session, request: &Request) -> Result<Response, TransportError> {
        let client = self.client_for(session)?;
        let url = session.url(&request.endpoint);

        let mut rb = client.request(to_reqwest_method(request.method), &url);
        for (key, value) in request.headers.iter() {
            rb = rb.header(key, value);
        }
        if !request.params.is_empty() {
            rb = rb.query(&request.params);
        }
        if let Some(body) = &request.body {
            rb = rb.body(body.clone());
        }

        let resp = rb.send().await.map_err(from_reqwest)?;

        let status = resp.status();
        let headers: Headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_owned(), v.to_owned())))
            .collect();
        let raw_body = resp.bytes().await.map_err(from_reqwest)?.to_vec();

        let mut response = Response::new(request.method, url, status.as_u16());
        response.status_text = status.canonical_reason().unwrap_or_default().to_owned();
        response.headers = headers;
        response.raw_body = raw_body;
        Ok(response)
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// Classify a reqwest failure. Only connect-phase errors may fail over.
pub fn from_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
