//! Paginated query results.
//!
//! A [`Cursor`] holds the current batch plus the server-side cursor id and
//! pulls further batches on demand:
//!
//! ```text
//!   Open ──(last batch fetched)──► DepletedServer ──(batch drained)──► Exhausted
//!     │                                  │
//!     └──────────── close() ─────────────┴─────────────────────────► Closed
//! ```
//!
//! Batch state only changes after a fetch response parsed completely, so a
//! failed fetch can simply be retried. With `allow_retry` the retry asks
//! for the same batch id again.

use std::collections::VecDeque;

use adb_domain::error::{Error, Result, StateError};
use adb_domain::http::{Request, Response};
use adb_domain::trace::TraceEvent;
use futures_core::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::executor::{ensure_success, ApiExecutor};
use crate::serialization;

/// Server error number for an unknown cursor id.
pub const CURSOR_NOT_FOUND: i64 = 1600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// More batches on the server, or items left locally.
    Open,
    /// Server has nothing more; items remain in the local batch.
    DepletedServer,
    /// Nothing left anywhere.
    Exhausted,
    Closed,
}

pub struct Cursor<T = Value> {
    executor: ApiExecutor,
    id: Option<String>,
    batch: VecDeque<T>,
    count: Option<u64>,
    has_more: bool,
    cached: bool,
    allow_retry: bool,
    next_batch_id: Option<String>,
    extra: Value,
    closed: bool,
}

/// One parsed cursor response, applied to the cursor only once complete.
struct Page<T> {
    id: Option<String>,
    items: Vec<T>,
    count: Option<u64>,
    has_more: bool,
    cached: bool,
    next_batch_id: Option<String>,
    extra: Option<Value>,
}

impl<T: DeserializeOwned> Page<T> {
    fn parse(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(Error::Deserialization("cursor response is not an object".into()));
        };
        let items = match body.remove("result") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(serialization::from_value)
                .collect::<Result<Vec<T>>>()?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(Error::Deserialization(
                    "cursor response 'result' is not an array".into(),
                ))
            }
        };
        Ok(Self {
            id: body.get("id").and_then(id_string),
            items,
            count: body.get("count").and_then(Value::as_u64),
            has_more: body.get("hasMore").and_then(Value::as_bool).unwrap_or(false),
            cached: body.get("cached").and_then(Value::as_bool).unwrap_or(false),
            next_batch_id: body.get("nextBatchId").and_then(id_string),
            extra: body.remove("extra"),
        })
    }
}

/// Ids arrive as strings, but accept numbers too.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl<T: DeserializeOwned> Cursor<T> {
    /// Build from the body of the initial `POST /_api/cursor` response.
    pub fn from_body(executor: ApiExecutor, body: Value, allow_retry: bool) -> Result<Self> {
        let page = Page::<T>::parse(body)?;
        let mut cursor = Self {
            executor,
            id: None,
            batch: VecDeque::new(),
            count: page.count,
            has_more: false,
            cached: false,
            allow_retry,
            next_batch_id: None,
            extra: Value::Null,
            closed: false,
        };
        cursor.apply(page);
        Ok(cursor)
    }

    /// Next item, fetching a batch first when the local one is empty.
    pub async fn next(&mut self) -> Result<T> {
        if self.closed {
            return Err(StateError::CursorClosed.into());
        }
        while self.batch.is_empty() && self.has_more {
            self.fetch().await?;
        }
        self.batch
            .pop_front()
            .ok_or_else(|| StateError::CursorExhausted.into())
    }

    /// Fetch the next batch and append it. Returns the number of new items.
    pub async fn fetch(&mut self) -> Result<usize> {
        if self.closed {
            return Err(StateError::CursorClosed.into());
        }
        let id = match (&self.id, self.has_more) {
            (Some(id), true) => id.clone(),
            _ => return Err(StateError::CursorExhausted.into()),
        };

        let endpoint = match (&self.next_batch_id, self.allow_retry) {
            (Some(batch_id), true) => format!("/_api/cursor/{id}/{batch_id}"),
            _ => format!("/_api/cursor/{id}"),
        };
        let request = Request::post(endpoint);
        let conn = self.executor.connection().clone();
        let page = self
            .executor
            .execute(request.clone(), |resp| {
                let resp = ensure_success(&request, resp, "failed to fetch cursor batch")?;
                Page::<T>::parse(conn.codec().decode(&resp.raw_body)?)
            })
            .await?;

        let added = page.items.len();
        self.apply(page);
        TraceEvent::CursorFetched {
            cursor_id: id,
            batch_len: added,
            has_more: self.has_more,
        }
        .emit();
        Ok(added)
    }

    /// Drain every remaining item, then release the cursor.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut out: Vec<T> = self.batch.drain(..).collect();
        while self.has_more {
            self.fetch().await?;
            out.extend(self.batch.drain(..));
        }
        self.close(true).await?;
        Ok(out)
    }

    /// Lazily yield every remaining item. The cursor is released when the
    /// stream ends; dropping the stream early releases it in the background.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>>
    where
        T: Send + 'static,
    {
        let mut cursor = self;
        async_stream::try_stream! {
            loop {
                if cursor.batch.is_empty() && !cursor.has_more {
                    break;
                }
                let item = cursor.next().await?;
                yield item;
            }
            if !cursor.closed {
                cursor.close(true).await?;
            }
        }
    }
}

impl<T> Cursor<T> {
    fn apply(&mut self, page: Page<T>) {
        self.has_more = page.has_more;
        // The server drops the cursor together with the last batch.
        self.id = if page.has_more { page.id.or(self.id.take()) } else { None };
        if page.count.is_some() {
            self.count = page.count;
        }
        self.cached = page.cached;
        self.next_batch_id = page.next_batch_id;
        if let Some(extra) = page.extra {
            self.extra = extra;
        }
        self.batch.extend(page.items);
    }

    /// Release the server-side cursor.
    ///
    /// Returns `true` if the server released it, `false` if there was
    /// nothing to release (fully fetched, or unknown and `ignore_missing`).
    /// A second close fails with [`StateError::CursorClosed`].
    pub async fn close(&mut self, ignore_missing: bool) -> Result<bool> {
        if self.closed {
            return Err(StateError::CursorClosed.into());
        }
        let Some(id) = self.id.clone() else {
            self.mark_closed();
            return Ok(false);
        };

        let request = Request::delete(format!("/_api/cursor/{id}"));
        let released = self
            .executor
            .execute(request.clone(), |resp| close_outcome(&request, resp, ignore_missing))
            .await?;

        self.mark_closed();
        TraceEvent::CursorClosed {
            cursor_id: id,
            released,
        }
        .emit();
        Ok(released)
    }

    fn mark_closed(&mut self) {
        self.closed = true;
        self.id = None;
        self.has_more = false;
        self.batch.clear();
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Total result count, if the query asked for it.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    /// Items currently buffered locally.
    pub fn batch(&self) -> &VecDeque<T> {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn state(&self) -> CursorState {
        match (self.closed, self.has_more, self.batch.is_empty()) {
            (true, _, _) => CursorState::Closed,
            (false, true, _) => CursorState::Open,
            (false, false, false) => CursorState::DepletedServer,
            (false, false, true) => CursorState::Exhausted,
        }
    }

    pub fn statistics(&self) -> Option<&Value> {
        self.extra_field("stats")
    }

    pub fn profile(&self) -> Option<&Value> {
        self.extra_field("profile")
    }

    pub fn warnings(&self) -> Option<&Value> {
        self.extra_field("warnings")
    }

    pub fn plan(&self) -> Option<&Value> {
        self.extra_field("plan")
    }

    fn extra_field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }
}

fn close_outcome(request: &Request, response: Response, ignore_missing: bool) -> Result<bool> {
    if response.is_success() {
        return Ok(true);
    }
    let missing = response.status_code == 404
        && response.error_code.map_or(true, |c| c == CURSOR_NOT_FOUND);
    if missing && ignore_missing {
        return Ok(false);
    }
    Err(Error::server(request, response, "failed to close cursor"))
}

// Release a server-side cursor nobody closed. Best effort: needs a running
// tokio runtime, and errors are only logged.
impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(cursor_id = %id, "no runtime to release dropped cursor");
            return;
        };
        let conn = self.executor.connection().clone();
        handle.spawn(async move {
            let request = Request::delete(format!("/_api/cursor/{id}"));
            match conn.send_request(request).await {
                Ok(resp) => TraceEvent::CursorClosed {
                    cursor_id: id,
                    released: resp.is_success(),
                }
                .emit(),
                Err(e) => tracing::debug!(cursor_id = %id, error = %e, "failed to release dropped cursor"),
            }
        });
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("batch_len", &self.batch.len())
            .field("count", &self.count)
            .field("has_more", &self.has_more)
            .field("cached", &self.cached)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adb_domain::http::Method;
    use serde_json::json;

    #[test]
    fn page_parses_protocol_fields() {
        let page = Page::<Value>::parse(json!({
            "id": "123",
            "result": [1, 2],
            "hasMore": true,
            "count": 5,
            "cached": false,
            "nextBatchId": 2,
            "extra": {"stats": {"scannedFull": 5}, "warnings": []}
        }))
        .unwrap();
        assert_eq!(page.id.as_deref(), Some("123"));
        assert_eq!(page.items, vec![json!(1), json!(2)]);
        assert!(page.has_more);
        assert_eq!(page.count, Some(5));
        assert_eq!(page.next_batch_id.as_deref(), Some("2"));
        assert!(page.extra.is_some());
    }

    #[test]
    fn page_rejects_non_array_result() {
        assert!(Page::<Value>::parse(json!({"result": {}})).is_err());
        assert!(Page::<Value>::parse(json!([1])).is_err());
    }

    #[test]
    fn page_reports_typed_decode_errors() {
        let err = Page::<u32>::parse(json!({"result": ["x"]})).err().unwrap();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn close_outcome_handles_missing_cursor() {
        let req = Request::delete("/_api/cursor/9");
        let mut gone = Response::new(Method::Delete, "u", 404);
        gone.error_code = Some(CURSOR_NOT_FOUND);

        assert!(!close_outcome(&req, gone.clone(), true).unwrap());
        let err = close_outcome(&req, gone, false).unwrap_err();
        assert_eq!(err.error_num(), Some(CURSOR_NOT_FOUND));

        let ok = Response::new(Method::Delete, "u", 202);
        assert!(close_outcome(&req, ok, false).unwrap());

        let mut other = Response::new(Method::Delete, "u", 404);
        other.error_code = Some(1203);
        assert!(close_outcome(&req, other, true).is_err());
    }
}
