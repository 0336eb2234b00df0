//! Per-request credentials and bearer-token refresh.
//!
//! [`AuthManager`] turns a [`Credential`] into an `Authorization` header.
//! For JWT credentials it also owns the current token and coalesces
//! refreshes: callers that saw the same expired token wait on one refresh
//! and all reuse its result.
//!
//! Each authorized request records the token *generation* it was sent with.
//! A refresh only goes to the server when the caller's generation is still
//! current; otherwise somebody else already refreshed and the caller just
//! retries with the new token.

use std::future::Future;

use adb_domain::credential::{BasicAuth, Credential};
use adb_domain::error::{Error, Result};
use adb_domain::http::{AuthOverride, Request};
use adb_domain::trace::TraceEvent;
use parking_lot::RwLock;

/// Token generation a request was authorized with.
pub type Generation = u64;

pub struct AuthManager {
    scheme: Scheme,
}

enum Scheme {
    None,
    Basic(String),
    Bearer(BearerState),
    Superuser(String),
}

struct BearerState {
    token: RwLock<TokenState>,
    refresher: Option<BasicAuth>,
    /// Held for the whole refresh so only one is in flight.
    refresh_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
struct TokenState {
    token: Option<String>,
    generation: Generation,
}

impl AuthManager {
    /// Build from an optional credential. Basic headers are computed once
    /// here, so unencodable credentials fail before any request is sent.
    pub fn new(credential: Option<Credential>) -> Result<Self> {
        let scheme = match credential {
            None => Scheme::None,
            Some(Credential::Basic(auth)) => Scheme::Basic(auth.header_value()?),
            Some(Credential::Jwt { token, refresher }) => {
                if token.is_none() && refresher.is_none() {
                    return Err(Error::InvalidArgument(
                        "jwt credential needs a token or credentials to obtain one".into(),
                    ));
                }
                Scheme::Bearer(BearerState {
                    token: RwLock::new(TokenState {
                        token,
                        generation: 0,
                    }),
                    refresher,
                    refresh_lock: tokio::sync::Mutex::new(()),
                })
            }
            Some(Credential::Superuser(token)) => Scheme::Superuser(token),
        };
        Ok(Self { scheme })
    }

    pub fn none() -> Self {
        Self { scheme: Scheme::None }
    }

    pub fn kind(&self) -> &'static str {
        match self.scheme {
            Scheme::None => "none",
            Scheme::Basic(_) => "basic",
            Scheme::Bearer(_) => "jwt",
            Scheme::Superuser(_) => "superuser",
        }
    }

    /// Whether a 401 on a managed request may be answered with a refresh.
    pub fn can_refresh(&self) -> bool {
        matches!(&self.scheme, Scheme::Bearer(b) if b.refresher.is_some())
    }

    /// Bearer credentials are in use but no token has been obtained yet.
    pub fn needs_token(&self) -> bool {
        matches!(&self.scheme, Scheme::Bearer(b) if b.token.read().token.is_none())
    }

    pub fn token(&self) -> Option<String> {
        match &self.scheme {
            Scheme::Bearer(b) => b.token.read().token.clone(),
            Scheme::Superuser(t) => Some(t.clone()),
            _ => None,
        }
    }

    /// Current token generation; bumps on every successful refresh.
    pub fn generation(&self) -> Generation {
        match &self.scheme {
            Scheme::Bearer(b) => b.token.read().generation,
            _ => 0,
        }
    }

    /// Replace the bearer token, e.g. with one obtained out of band.
    pub fn set_token(&self, token: impl Into<String>) -> Result<Generation> {
        match &self.scheme {
            Scheme::Bearer(b) => {
                let mut state = b.token.write();
                state.token = Some(token.into());
                state.generation += 1;
                Ok(state.generation)
            }
            _ => Err(Error::InvalidArgument(format!(
                "cannot set a token on {} credentials",
                self.kind()
            ))),
        }
    }

    /// Attach the `Authorization` header to `request`.
    ///
    /// Returns the token generation when the header came from a managed
    /// bearer token; only such requests are eligible for refresh-and-retry.
    pub fn authorize(&self, request: &mut Request) -> Result<Option<Generation>> {
        if let Some(auth) = &request.auth {
            match auth {
                AuthOverride::Disabled => {
                    request.headers.remove("authorization");
                }
                AuthOverride::Basic(basic) => {
                    let value = basic.header_value()?;
                    request.headers.insert("authorization", value);
                }
                AuthOverride::Bearer(token) => {
                    request.headers.insert("authorization", format!("Bearer {token}"));
                }
            }
            return Ok(None);
        }

        match &self.scheme {
            Scheme::None => Ok(None),
            Scheme::Basic(header) => {
                request.headers.insert("authorization", header.clone());
                Ok(None)
            }
            Scheme::Superuser(token) => {
                request.headers.insert("authorization", format!("Bearer {token}"));
                Ok(None)
            }
            Scheme::Bearer(b) => {
                let state = b.token.read().clone();
                match state.token {
                    Some(token) => {
                        request.headers.insert("authorization", format!("Bearer {token}"));
                    }
                    None => {
                        request.headers.remove("authorization");
                    }
                }
                Ok(Some(state.generation))
            }
        }
    }

    /// Refresh the bearer token unless a newer one than `seen` exists.
    ///
    /// `fetch` performs the actual token request with the refresher
    /// credentials. It runs at most once across all concurrent callers that
    /// observed generation `seen`. Dropping the returned future before it
    /// completes leaves the token untouched.
    pub async fn refresh<F, Fut>(&self, seen: Generation, fetch: F) -> Result<Generation>
    where
        F: FnOnce(BasicAuth) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let Scheme::Bearer(bearer) = &self.scheme else {
            return Err(Error::Auth(format!(
                "{} credentials cannot be refreshed",
                self.kind()
            )));
        };
        let Some(refresher) = &bearer.refresher else {
            return Err(Error::Auth(
                "token rejected and no refresh credentials are configured".into(),
            ));
        };

        let _guard = bearer.refresh_lock.lock().await;
        {
            let state = bearer.token.read();
            if state.generation != seen && state.token.is_some() {
                tracing::debug!(
                    generation = state.generation,
                    "token already refreshed by a concurrent request"
                );
                return Ok(state.generation);
            }
        }

        tracing::warn!(seen, "refreshing bearer token");
        let token = fetch(refresher.clone())
            .await
            .map_err(|e| match e {
                Error::TokenRefresh(_) => e,
                other => Error::TokenRefresh(other.to_string()),
            })?;

        let generation = {
            let mut state = bearer.token.write();
            state.token = Some(token);
            state.generation += 1;
            state.generation
        };
        TraceEvent::TokenRefreshed { generation }.emit();
        Ok(generation)
    }
}

// Manual Debug impl to avoid leaking secrets.
impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("kind", &self.kind())
            .field("generation", &self.generation())
            .field("can_refresh", &self.can_refresh())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn jwt(token: Option<&str>) -> AuthManager {
        AuthManager::new(Some(Credential::Jwt {
            token: token.map(str::to_owned),
            refresher: Some(BasicAuth::new("root", "pw")),
        }))
        .unwrap()
    }

    #[test]
    fn basic_header_is_static() {
        let mgr = AuthManager::new(Some(Credential::Basic(BasicAuth::new("root", "passwd")))).unwrap();
        let mut req = Request::get("/_api/version");
        assert_eq!(mgr.authorize(&mut req).unwrap(), None);
        assert_eq!(req.headers.get("authorization"), Some("Basic cm9vdDpwYXNzd2Q="));
        assert!(!mgr.can_refresh());
    }

    #[test]
    fn superuser_is_bearer_without_refresh() {
        let mgr = AuthManager::new(Some(Credential::Superuser("su".into()))).unwrap();
        let mut req = Request::get("/x");
        assert_eq!(mgr.authorize(&mut req).unwrap(), None);
        assert_eq!(req.headers.get("authorization"), Some("Bearer su"));
        assert!(!mgr.can_refresh());
    }

    #[test]
    fn override_wins_over_manager() {
        let mgr = jwt(Some("t0"));
        let mut req = Request::post("/_open/auth").auth(AuthOverride::Disabled);
        assert_eq!(mgr.authorize(&mut req).unwrap(), None);
        assert!(req.headers.get("authorization").is_none());
    }

    #[test]
    fn jwt_without_any_source_is_rejected() {
        let res = AuthManager::new(Some(Credential::Jwt {
            token: None,
            refresher: None,
        }));
        assert!(matches!(res, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn refresh_bumps_generation_and_header() {
        let mgr = jwt(Some("t0"));
        let mut req = Request::get("/x");
        let seen = mgr.authorize(&mut req).unwrap().unwrap();
        assert_eq!(req.headers.get("authorization"), Some("Bearer t0"));

        let gen = mgr
            .refresh(seen, |creds| async move {
                assert_eq!(creds.username, "root");
                Ok("t1".to_string())
            })
            .await
            .unwrap();
        assert_eq!(gen, seen + 1);

        let mut req = Request::get("/x");
        mgr.authorize(&mut req).unwrap();
        assert_eq!(req.headers.get("authorization"), Some("Bearer t1"));
    }

    #[tokio::test]
    async fn stale_generation_reuses_newer_token() {
        let mgr = jwt(Some("t0"));
        mgr.refresh(0, |_| async { Ok("t1".to_string()) }).await.unwrap();
        let gen = mgr
            .refresh(0, |_| async { Ok("t2".to_string()) })
            .await
            .unwrap();
        assert_eq!(gen, 1);
        assert_eq!(mgr.token().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn concurrent_refreshes_coalesce() {
        let mgr = Arc::new(jwt(Some("expired")));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    mgr.refresh(0, |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("fresh".to_string())
                    })
                    .await
                })
            })
            .collect();

        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn failed_refresh_leaves_state_untouched() {
        let mgr = jwt(Some("t0"));
        let err = mgr
            .refresh(0, |_| async { Err(Error::Timeout("slow".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenRefresh(_)));
        assert_eq!(mgr.generation(), 0);
        assert_eq!(mgr.token().as_deref(), Some("t0"));
    }

    #[tokio::test]
    async fn cancelled_refresh_leaves_state_untouched() {
        let mgr = jwt(Some("t0"));
        let fut = mgr.refresh(0, |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        });
        let res = tokio::time::timeout(Duration::from_millis(10), fut).await;
        assert!(res.is_err());
        assert_eq!(mgr.generation(), 0);
        // Lock released: a later refresh goes through.
        mgr.refresh(0, |_| async { Ok("t1".to_string()) }).await.unwrap();
        assert_eq!(mgr.token().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn refresh_without_refresher_is_auth_error() {
        let mgr = AuthManager::new(Some(Credential::Jwt {
            token: Some("t".into()),
            refresher: None,
        }))
        .unwrap();
        let err = mgr.refresh(0, |_| async { Ok(String::new()) }).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn debug_hides_token() {
        let dbg = format!("{:?}", jwt(Some("secret-token")));
        assert!(!dbg.contains("secret-token"));
    }
}
