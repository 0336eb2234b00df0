mod common;

use std::sync::Arc;
use std::time::Duration;

use adb_domain::credential::{BasicAuth, Credential};
use adb_domain::http::Request;
use adb_domain::Error;
use common::{client, json_response, MockTransport};
use futures_util::future::join_all;
use serde_json::json;

const AUTH: &str = "/_open/auth";
const VERSION: &str = "/_db/_system/_api/version";

fn bearer(req: &Request) -> Option<&str> {
    req.headers.get("authorization")?.strip_prefix("Bearer ")
}

/// Accepts only `valid` as bearer token; `/_open/auth` hands out `issued`.
fn token_server(valid: &'static str, issued: &'static str) -> MockTransport {
    MockTransport::new(move |host, req| {
        if req.endpoint == AUTH {
            return json_response(req, host, 200, json!({"jwt": issued}));
        }
        if bearer(req) == Some(valid) {
            json_response(req, host, 200, json!({"server": "arango", "version": "3.11.0"}))
        } else {
            json_response(
                req,
                host,
                401,
                json!({"error": true, "code": 401, "errorNum": 11, "errorMessage": "not authorized to execute this request"}),
            )
        }
    })
}

fn jwt(token: Option<&str>) -> Credential {
    Credential::Jwt {
        token: token.map(str::to_owned),
        refresher: Some(BasicAuth::new("root", "secret")),
    }
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_retried() {
    let transport = Arc::new(token_server("fresh", "fresh"));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(Some("stale"))))
        .unwrap();

    assert_eq!(db.version().await.unwrap(), "3.11.0");
    assert_eq!(transport.calls_to(AUTH), 1);
    assert_eq!(transport.calls_to(VERSION), 2);
    assert_eq!(db.connection().auth().token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn refresh_happens_at_most_once_per_request() {
    // The server issues tokens it then refuses.
    let transport = Arc::new(token_server("never", "useless"));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(Some("stale"))))
        .unwrap();

    let err = db.version().await.unwrap_err();
    assert!(matches!(err, Error::AuthRejected(_)), "got {err:?}");
    assert_eq!(err.error_num(), Some(11));
    assert_eq!(err.http_status(), Some(401));
    assert_eq!(transport.calls_to(AUTH), 1);
    assert_eq!(transport.calls_to(VERSION), 2);
}

#[tokio::test]
async fn freshly_fetched_token_rejected_is_not_fetched_again() {
    let transport = Arc::new(token_server("never", "useless"));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(None)))
        .unwrap();

    let err = db.version().await.unwrap_err();
    assert!(matches!(err, Error::AuthRejected(_)), "got {err:?}");
    assert!(err.to_string().contains("not authorized"), "{err}");
    assert_eq!(transport.calls_to(AUTH), 1);
    assert_eq!(transport.calls_to(VERSION), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_rejections_share_one_refresh() {
    let transport = Arc::new(token_server("fresh", "fresh").with_latency(Duration::from_millis(20)));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(Some("stale"))))
        .unwrap();

    let results = join_all((0..8).map(|_| db.version())).await;
    for r in results {
        assert_eq!(r.unwrap(), "3.11.0");
    }
    assert_eq!(transport.calls_to(AUTH), 1);
    assert_eq!(db.connection().auth().generation(), 1);
}

#[tokio::test]
async fn missing_token_is_fetched_before_first_request() {
    let transport = Arc::new(token_server("fresh", "fresh"));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(None)))
        .unwrap();

    db.version().await.unwrap();
    let calls = transport.calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1.endpoint, AUTH);
    assert!(calls[0].1.headers.get("authorization").is_none());
    assert_eq!(bearer(&calls[1].1), Some("fresh"));
}

#[tokio::test]
async fn token_request_carries_refresh_credentials() {
    let transport = Arc::new(token_server("fresh", "fresh"));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(None)))
        .unwrap();
    db.version().await.unwrap();

    let calls = transport.calls.lock();
    let body: serde_json::Value = serde_json::from_slice(calls[0].1.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"username": "root", "password": "secret"}));
}

#[tokio::test]
async fn failed_token_fetch_is_a_refresh_error() {
    let transport = Arc::new(MockTransport::new(|host, req| {
        json_response(
            req,
            host,
            401,
            json!({"error": true, "code": 401, "errorNum": 401, "errorMessage": "wrong credentials"}),
        )
    }));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(jwt(None)))
        .unwrap();

    let err = db.version().await.unwrap_err();
    assert!(matches!(err, Error::TokenRefresh(_)), "got {err:?}");
    assert!(err.is_auth());
    assert_eq!(transport.calls_to(VERSION), 0);
}

#[tokio::test]
async fn superuser_token_is_never_refreshed() {
    let transport = Arc::new(token_server("fresh", "fresh"));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(Credential::Superuser("stale".into())))
        .unwrap();

    // A 401 without a managed token is a plain server answer.
    let err = db.version().await.unwrap_err();
    assert_eq!(err.http_status(), Some(401));
    assert!(err.is_auth());
    assert_eq!(transport.calls_to(AUTH), 0);
}

#[tokio::test]
async fn basic_credentials_go_in_every_request() {
    let transport = Arc::new(MockTransport::new(|host, req| {
        json_response(req, host, 200, json!({"version": "3.11.0"}))
    }));
    let db = client(transport.clone(), 1, Vec::new())
        .db("_system", Some(Credential::Basic(BasicAuth::new("root", "pw"))))
        .unwrap();
    db.version().await.unwrap();
    db.version().await.unwrap();

    for (_, req) in transport.calls.lock().iter() {
        // base64("root:pw")
        assert_eq!(req.headers.get("authorization"), Some("Basic cm9vdDpwdw=="));
    }
}
