#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adb_client::{
    ArangoClient, ConnectionParts, JsonCodec, NoCompression, RequestObserver, Session,
    SingleHostResolver, Transport, TransportError,
};
use adb_domain::config::ClientConfig;
use adb_domain::http::{Request, Response};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

type Responder = dyn Fn(&str, &Request) -> Response + Send + Sync;

/// Scripted in-memory transport.
///
/// Hosts in `down` fail at the connection level; every other request is
/// answered by the responder closure. All calls are recorded.
pub struct MockTransport {
    down: Mutex<HashSet<String>>,
    responder: Box<Responder>,
    latency: Option<Duration>,
    pub calls: Mutex<Vec<(String, Request)>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new(responder: impl Fn(&str, &Request) -> Response + Send + Sync + 'static) -> Self {
        Self {
            down: Mutex::new(HashSet::new()),
            responder: Box::new(responder),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn take_down(&self, host: &str) {
        self.down.lock().insert(host.to_owned());
    }

    pub fn calls_to(&self, endpoint_prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(_, r)| r.endpoint.starts_with(endpoint_prefix))
            .count()
    }

    pub fn hosts_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(h, _)| h.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, host: &str) -> Result<Session, TransportError> {
        Ok(Session::new(host))
    }

    async fn close(&self, _session: &Session) {}

    async fn execute(&self, session: &Session, request: &Request) -> Result<Response, TransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.calls
            .lock()
            .push((session.host().to_owned(), request.clone()));
        if self.down.lock().contains(session.host()) {
            return Err(TransportError::Connect(format!("{} refused", session.host())));
        }
        Ok((self.responder)(session.host(), request))
    }
}

/// Counts connection-level failures seen by the connection.
#[derive(Default)]
pub struct FailureCounter(pub AtomicUsize);

impl RequestObserver for FailureCounter {
    fn on_failure(&self, _host: &str, _request: &Request, _reason: &str) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn hosts(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("http://db{i}:8529")).collect()
}

pub fn json_response(request: &Request, host: &str, status: u16, body: Value) -> Response {
    let mut resp = Response::new(request.method, format!("{host}{}", request.endpoint), status);
    resp.headers.insert("content-type", "application/json");
    resp.raw_body = serde_json::to_vec(&body).unwrap();
    resp
}

pub fn empty_response(request: &Request, host: &str, status: u16) -> Response {
    Response::new(request.method, format!("{host}{}", request.endpoint), status)
}

pub fn client(
    transport: Arc<MockTransport>,
    host_count: usize,
    observers: Vec<Arc<dyn RequestObserver>>,
) -> ArangoClient {
    let hosts = hosts(host_count);
    let config = ClientConfig {
        hosts: hosts.clone(),
        ..ClientConfig::default()
    };
    let parts = ConnectionParts {
        sessions: hosts.iter().map(Session::new).collect(),
        resolver: Arc::new(SingleHostResolver::new(host_count).unwrap()),
        transport,
        codec: Arc::new(JsonCodec),
        compression: Arc::new(NoCompression),
        observers,
    };
    ArangoClient::with_parts(config, parts).unwrap()
}
