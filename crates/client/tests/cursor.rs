mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use adb_client::{CursorState, QueryRequest};
use adb_domain::error::StateError;
use adb_domain::http::{Method, Request};
use adb_domain::Error;
use common::{client, json_response, MockTransport};
use futures_util::{pin_mut, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

const CURSOR_ID: &str = "4711";

/// Serves `total` documents in pages of `batch`, one page per request.
struct CursorServer {
    total: usize,
    batch: usize,
    served: AtomicUsize,
    /// Fail the next fetch once with a 503 before answering it.
    fail_next_fetch: AtomicBool,
}

impl CursorServer {
    fn new(total: usize, batch: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            batch,
            served: AtomicUsize::new(0),
            fail_next_fetch: AtomicBool::new(false),
        })
    }

    fn page(&self, index: usize) -> Value {
        let start = index * self.batch;
        let end = (start + self.batch).min(self.total);
        let docs: Vec<Value> = (start..end)
            .map(|i| json!({"_key": format!("k{i}"), "n": i}))
            .collect();
        let has_more = end < self.total;
        let mut body = json!({
            "result": docs,
            "hasMore": has_more,
            "count": self.total,
            "cached": false,
            "error": false,
            "code": 201,
            "nextBatchId": (index + 2).to_string(),
            "extra": {"stats": {"scannedFull": self.total}, "warnings": []},
        });
        if has_more {
            body["id"] = json!(CURSOR_ID);
        }
        body
    }

    fn transport(self: &Arc<Self>) -> Arc<MockTransport> {
        let server = self.clone();
        Arc::new(MockTransport::new(move |host, req| {
            let cursor = format!("/_db/_system/_api/cursor/{CURSOR_ID}");
            match req.method {
                Method::Post if req.endpoint == "/_db/_system/_api/cursor" => {
                    server.served.store(1, Ordering::SeqCst);
                    json_response(req, host, 201, server.page(0))
                }
                Method::Post if req.endpoint.starts_with(&cursor) => {
                    if server.fail_next_fetch.swap(false, Ordering::SeqCst) {
                        return json_response(req, host, 503, json!({"error": true, "errorNum": 503}));
                    }
                    let index = server.served.fetch_add(1, Ordering::SeqCst);
                    json_response(req, host, 200, server.page(index))
                }
                Method::Delete if req.endpoint == cursor => {
                    json_response(req, host, 202, json!({"id": CURSOR_ID, "error": false, "code": 202}))
                }
                _ => json_response(req, host, 404, json!({"error": true, "errorNum": 1600})),
            }
        }))
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Doc {
    #[serde(rename = "_key")]
    key: String,
    n: usize,
}

fn cursor_fetches(transport: &MockTransport) -> Vec<Request> {
    transport
        .calls
        .lock()
        .iter()
        .filter(|(_, r)| r.method == Method::Post && r.endpoint.contains("/_api/cursor/"))
        .map(|(_, r)| r.clone())
        .collect()
}

#[tokio::test]
async fn pages_through_every_batch() {
    let server = CursorServer::new(5, 2);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();

    let mut cursor = db
        .query::<Doc>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(2).count(true))
        .await
        .unwrap();
    assert_eq!(cursor.count(), Some(5));
    assert_eq!(cursor.id(), Some(CURSOR_ID));

    let mut has_more = vec![cursor.has_more()];
    let mut seen = Vec::new();
    for _ in 0..5 {
        if cursor.is_empty() {
            cursor.fetch().await.unwrap();
            has_more.push(cursor.has_more());
        }
        seen.push(cursor.next().await.unwrap().n);
    }

    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(has_more, vec![true, true, false]);
    assert_eq!(transport.calls_to("/_db/_system/_api/cursor"), 3);
    assert_eq!(cursor.state(), CursorState::Exhausted);
    assert_eq!(cursor.id(), None);
}

#[tokio::test]
async fn exhausted_cursor_reports_state_errors() {
    let server = CursorServer::new(3, 2);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();
    let mut cursor = db
        .query::<Doc>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(2))
        .await
        .unwrap();

    for _ in 0..3 {
        cursor.next().await.unwrap();
    }
    let err = cursor.next().await.unwrap_err();
    assert_eq!(err.state(), Some(&StateError::CursorExhausted));
    let err = cursor.fetch().await.unwrap_err();
    assert_eq!(err.state(), Some(&StateError::CursorExhausted));

    // Server already dropped it with the last batch: nothing to release.
    assert!(!cursor.close(false).await.unwrap());
    let err = cursor.close(true).await.unwrap_err();
    assert_eq!(err.state(), Some(&StateError::CursorClosed));
    assert_eq!(cursor.state(), CursorState::Closed);
}

#[tokio::test]
async fn close_releases_open_server_cursor() {
    let server = CursorServer::new(10, 2);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();
    let mut cursor = db
        .query::<Value>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(2))
        .await
        .unwrap();

    assert!(cursor.close(false).await.unwrap());
    let deletes = transport
        .calls
        .lock()
        .iter()
        .filter(|(_, r)| r.method == Method::Delete)
        .count();
    assert_eq!(deletes, 1);

    let err = cursor.next().await.unwrap_err();
    assert_eq!(err.state(), Some(&StateError::CursorClosed));
}

#[tokio::test]
async fn collect_all_drains_the_cursor() {
    let server = CursorServer::new(7, 3);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();
    let cursor = db
        .query::<Doc>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(3))
        .await
        .unwrap();

    let docs = cursor.collect_all().await.unwrap();
    assert_eq!(docs.len(), 7);
    assert_eq!(docs[6], Doc { key: "k6".into(), n: 6 });
    assert_eq!(cursor_fetches(&transport).len(), 2);
}

#[tokio::test]
async fn stream_yields_items_in_order() {
    let server = CursorServer::new(5, 2);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();
    let cursor = db
        .query::<Doc>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(2))
        .await
        .unwrap();

    let stream = cursor.into_stream();
    pin_mut!(stream);
    let mut keys = Vec::new();
    while let Some(doc) = stream.next().await {
        keys.push(doc.unwrap().key);
    }
    assert_eq!(keys, vec!["k0", "k1", "k2", "k3", "k4"]);
}

#[tokio::test]
async fn retryable_cursor_refetches_same_batch_after_failure() {
    let server = CursorServer::new(5, 2);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();
    let mut cursor = db
        .query::<Doc>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(2).allow_retry(true))
        .await
        .unwrap();

    cursor.next().await.unwrap();
    cursor.next().await.unwrap();

    server.fail_next_fetch.store(true, Ordering::SeqCst);
    let err = cursor.fetch().await.unwrap_err();
    assert_eq!(err.http_status(), Some(503));
    assert!(cursor.is_empty());
    assert!(cursor.has_more());

    assert_eq!(cursor.next().await.unwrap().n, 2);

    let fetches = cursor_fetches(&transport);
    assert_eq!(fetches.len(), 2);
    let expected = format!("/_db/_system/_api/cursor/{CURSOR_ID}/2");
    assert!(fetches.iter().all(|r| r.endpoint == expected));
}

#[tokio::test]
async fn plain_cursor_fetches_by_id_only() {
    let server = CursorServer::new(3, 2);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();
    let cursor = db
        .query::<Doc>(&QueryRequest::new("FOR d IN docs RETURN d").batch_size(2))
        .await
        .unwrap();
    assert!(cursor.statistics().is_some());
    cursor.collect_all().await.unwrap();

    let fetches = cursor_fetches(&transport);
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].endpoint, format!("/_db/_system/_api/cursor/{CURSOR_ID}"));
}

#[tokio::test]
async fn invalid_query_never_reaches_the_server() {
    let server = CursorServer::new(1, 1);
    let transport = server.transport();
    let db = client(transport.clone(), 1, Vec::new()).db("_system", None).unwrap();

    let err = db.query::<Value>(&QueryRequest::new("  ")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    let err = db
        .query::<Value>(&QueryRequest::new("RETURN 1").batch_size(0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(transport.calls.lock().is_empty());
}
