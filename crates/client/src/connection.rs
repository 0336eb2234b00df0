//! One logical request, end to end.
//!
//! [`Connection`] ties the resolver, transport, auth manager, codec and
//! compression policy together:
//!
//! 1. prefix the endpoint with the database, compress the body;
//! 2. pick a host, attach credentials, execute;
//! 3. on a connection-level failure mark the host unreachable and try the
//!    next one, at most once per configured host;
//! 4. on a 401 for a managed bearer token refresh once and resend to the
//!    same host, taking that answer as final;
//! 5. decompress the body and extract the server's error fields.
//!
//! Well-formed non-2xx answers are returned as responses; deciding what
//! they mean is left to the caller's response handler.

use std::sync::Arc;
use std::time::Instant;

use adb_domain::credential::BasicAuth;
use adb_domain::error::{Error, Result, ServerError};
use adb_domain::http::{AuthOverride, Request, Response};
use adb_domain::trace::TraceEvent;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::{AuthManager, Generation};
use crate::compression::CompressionManager;
use crate::http::{Session, Transport, TransportError};
use crate::observer::RequestObserver;
use crate::resolver::{HostAttempts, HostResolver};
use crate::serialization::{self, Codec};

/// Shared plumbing a [`Connection`] is built from. One set per client;
/// every database handle gets its own connection on top of it.
#[derive(Clone)]
pub struct ConnectionParts {
    /// One session per host, index-aligned with the resolver.
    pub sessions: Vec<Session>,
    pub resolver: Arc<dyn HostResolver>,
    pub transport: Arc<dyn Transport>,
    pub codec: Arc<dyn Codec>,
    pub compression: Arc<dyn CompressionManager>,
    pub observers: Vec<Arc<dyn RequestObserver>>,
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    db_name: String,
    parts: ConnectionParts,
    auth: AuthManager,
}

/// What the failover loop produced.
struct Exchange {
    host: usize,
    response: Response,
    generation: Option<Generation>,
    attempts: usize,
}

impl Connection {
    pub fn new(parts: ConnectionParts, db_name: impl Into<String>, auth: AuthManager) -> Result<Self> {
        let db_name = db_name.into();
        if db_name.is_empty() {
            return Err(Error::InvalidArgument("database name must not be empty".into()));
        }
        if parts.sessions.is_empty() {
            return Err(Error::InvalidArgument("at least one host is required".into()));
        }
        if parts.sessions.len() != parts.resolver.host_count() {
            return Err(Error::InvalidArgument(format!(
                "{} sessions for a resolver over {} hosts",
                parts.sessions.len(),
                parts.resolver.host_count()
            )));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                db_name,
                parts,
                auth,
            }),
        })
    }

    pub fn db_name(&self) -> &str {
        &self.inner.db_name
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.inner.parts.sessions.iter().map(Session::host)
    }

    pub fn auth(&self) -> &AuthManager {
        &self.inner.auth
    }

    pub fn codec(&self) -> &dyn Codec {
        self.inner.parts.codec.as_ref()
    }

    // ── serialization helpers ────────────────────────────────────────

    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.codec().encode(&serialization::to_value(value)?)
    }

    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serialization::from_value(self.codec().decode(bytes)?)
    }

    // ── request pipeline ─────────────────────────────────────────────

    /// Send one logical request with failover and single-shot token refresh.
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        let auth = &self.inner.auth;
        let fetched = request.auth.is_none() && auth.needs_token();
        if fetched {
            self.refresh_token(auth.generation()).await?;
        }

        let started = Instant::now();
        let request = self.prepare(request)?;
        let exchange = self.send_with_failover(&request).await?;
        let mut attempts = exchange.attempts;

        let response = match exchange.generation {
            Some(seen) if exchange.response.status_code == 401 => {
                // A token fetched for this very request is not refreshed again.
                if fetched || !auth.can_refresh() {
                    return Err(auth_error(&request, exchange.response, "bearer token rejected"));
                }
                self.refresh_token(seen).await?;
                attempts += 1;
                let (retry, _) = self.send_to_host(exchange.host, &request).await?;
                if retry.status_code == 401 {
                    return Err(auth_error(
                        &request,
                        retry,
                        "bearer token rejected after refresh",
                    ));
                }
                retry
            }
            _ => exchange.response,
        };

        TraceEvent::RequestCompleted {
            method: request.method.to_string(),
            endpoint: request.endpoint.clone(),
            host: self.inner.parts.sessions[exchange.host].host().to_owned(),
            status: response.status_code,
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        Ok(response)
    }

    /// Check that the server is reachable and accepts our credentials.
    /// Returns the HTTP status of the check.
    pub async fn ping(&self) -> Result<u16> {
        let request = Request::get("/_api/collection");
        let response = self.send_request(request.clone()).await?;
        if matches!(response.status_code, 401 | 403) {
            return Err(auth_error(&request, response, "ping rejected"));
        }
        if !response.is_success() {
            return Err(Error::server(&request, response, "bad server response"));
        }
        Ok(response.status_code)
    }

    /// Database scoping, body compression and `accept-encoding`.
    fn prepare(&self, mut request: Request) -> Result<Request> {
        if request.db_scoped {
            request.endpoint = format!("/_db/{}{}", self.inner.db_name, request.endpoint);
            request.db_scoped = false;
        }

        let compression = &self.inner.parts.compression;
        if let Some(body) = &request.body {
            if compression.should_compress(body.len()) {
                let packed = compression.compress(body)?;
                request.body = Some(packed);
                request
                    .headers
                    .insert("content-encoding", compression.content_encoding());
            }
        }
        let accepted = compression.accepted_encodings();
        if !accepted.is_empty() {
            let value = accepted.iter().map(|e| e.as_str()).collect::<Vec<_>>().join(", ");
            request.headers.insert("accept-encoding", value);
        }
        Ok(request)
    }

    async fn send_with_failover(&self, request: &Request) -> Result<Exchange> {
        let parts = &self.inner.parts;
        let mut hosts = HostAttempts::new(parts.resolver.as_ref());
        let mut last_failure = String::new();

        while let Some(index) = hosts.next_host() {
            match self.attempt(index, request).await? {
                Ok((response, generation)) => {
                    return Ok(Exchange {
                        host: index,
                        response,
                        generation,
                        attempts: hosts.used(),
                    });
                }
                Err(reason) => {
                    let host = parts.sessions[index].host();
                    tracing::warn!(host, attempt = hosts.used(), %reason, "host unreachable, failing over");
                    TraceEvent::HostFailover {
                        host: host.to_owned(),
                        attempt: hosts.used(),
                        reason: reason.clone(),
                    }
                    .emit();
                    hosts.mark_unreachable(index);
                    last_failure = reason;
                }
            }
        }

        Err(Error::ConnectionAborted {
            attempts: hosts.used(),
            message: last_failure,
        })
    }

    /// Resend to one host with no failover. A connection failure here is final.
    async fn send_to_host(&self, index: usize, request: &Request) -> Result<(Response, Option<Generation>)> {
        match self.attempt(index, request).await? {
            Ok(done) => Ok(done),
            Err(reason) => Err(Error::ConnectionAborted {
                attempts: 1,
                message: reason,
            }),
        }
    }

    /// One exchange against one host. The inner `Err` is a connection-level
    /// failure eligible for failover; everything else is final.
    async fn attempt(
        &self,
        index: usize,
        request: &Request,
    ) -> Result<std::result::Result<(Response, Option<Generation>), String>> {
        let parts = &self.inner.parts;
        let session = &parts.sessions[index];

        let mut wire = request.clone();
        let generation = self.inner.auth.authorize(&mut wire)?;

        for o in &parts.observers {
            o.on_request(session.host(), &wire);
        }
        tracing::debug!(host = session.host(), request = %wire, "executing request");

        match parts.transport.execute(session, &wire).await {
            Ok(response) => {
                let response = self.process_response(response)?;
                for o in &parts.observers {
                    o.on_response(session.host(), &wire, &response);
                }
                Ok(Ok((response, generation)))
            }
            Err(e) => {
                let reason = e.to_string();
                for o in &parts.observers {
                    o.on_failure(session.host(), &wire, &reason);
                }
                match e {
                    TransportError::Connect(_) => Ok(Err(reason)),
                    TransportError::Timeout(_) => Err(Error::Timeout(format!("{wire}: {reason}"))),
                    TransportError::Other(_) => Err(Error::Io(std::io::Error::other(reason))),
                }
            }
        }
    }

    /// Decompress the body and pull `errorNum` / `errorMessage` out of
    /// non-2xx answers.
    fn process_response(&self, mut response: Response) -> Result<Response> {
        let encoding = response.headers.remove("content-encoding");
        let raw = std::mem::take(&mut response.raw_body);
        response.raw_body = self
            .inner
            .parts
            .compression
            .decode_body(encoding.as_deref(), raw)?;

        if !response.is_success() {
            if let Ok(Value::Object(body)) = self.codec().decode(&response.raw_body) {
                if body.get("error").and_then(Value::as_bool).unwrap_or(true) {
                    response.error_code = body.get("errorNum").and_then(Value::as_i64);
                    response.error_message = body
                        .get("errorMessage")
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                }
            }
        }
        Ok(response)
    }

    // ── token refresh ────────────────────────────────────────────────

    async fn refresh_token(&self, seen: Generation) -> Result<Generation> {
        self.inner
            .auth
            .refresh(seen, |creds| self.fetch_token(creds))
            .await
    }

    /// `POST /_open/auth` with authentication disabled for this one call.
    async fn fetch_token(&self, creds: BasicAuth) -> Result<String> {
        let body = self.serialize(&json!({
            "username": creds.username,
            "password": creds.password,
        }))?;
        let request = self.prepare(
            Request::post("/_open/auth")
                .unscoped()
                .auth(AuthOverride::Disabled)
                .body(body),
        )?;

        let exchange = self.send_with_failover(&request).await?;
        let response = exchange.response;
        if !response.is_success() {
            return Err(Error::TokenRefresh(format!(
                "[HTTP {}] {}",
                response.status_code,
                response
                    .error_message
                    .as_deref()
                    .unwrap_or(response.status_text.as_str())
            )));
        }

        let body = self.codec().decode(&response.raw_body)?;
        body.get("jwt")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::TokenRefresh("auth response carried no jwt".into()))
    }
}

fn auth_error(request: &Request, response: Response, what: &str) -> Error {
    Error::AuthRejected(Box::new(ServerError {
        message: what.to_owned(),
        request: request.clone(),
        response,
    }))
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("db_name", &self.inner.db_name)
            .field("hosts", &self.hosts().collect::<Vec<_>>())
            .field("auth", &self.inner.auth)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
