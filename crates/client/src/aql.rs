//! Query submission payload (`POST /_api/cursor`).

use adb_domain::error::{Error, Result};
use adb_domain::http::Request;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::connection::Connection;

/// A query plus its cursor options.
///
/// ```rust
/// # use adb_client::QueryRequest;
/// let q = QueryRequest::new("FOR u IN users FILTER u.age > @min RETURN u")
///     .bind_var("min", 21)
///     .batch_size(100)
///     .count(true);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub bind_vars: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Server-side cursor lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    #[serde(skip_serializing_if = "QueryOptions::is_empty")]
    pub options: QueryOptions,
    /// Sent as the `x-arango-allow-dirty-read` header, not in the body.
    #[serde(skip)]
    pub allow_dirty_read: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_block_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_plans: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runtime: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_warning_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_on_warning: Option<bool>,
    /// 0 off, 1 profile, 2 profile with per-node stats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Keep the last batch on the server so a failed fetch can be retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_retry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_inaccessible_collections: Option<bool>,
}

impl QueryOptions {
    pub fn is_empty(&self) -> bool {
        *self == QueryOptions::default()
    }
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn bind_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind_vars.insert(name.into(), value.into());
        self
    }

    pub fn bind_vars(mut self, vars: Map<String, Value>) -> Self {
        self.bind_vars.extend(vars);
        self
    }

    pub fn count(mut self, count: bool) -> Self {
        self.count = Some(count);
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn full_count(mut self, full_count: bool) -> Self {
        self.options.full_count = Some(full_count);
        self
    }

    pub fn profile(mut self, level: u8) -> Self {
        self.options.profile = Some(level);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.options.stream = Some(stream);
        self
    }

    pub fn allow_retry(mut self, allow: bool) -> Self {
        self.options.allow_retry = Some(allow);
        self
    }

    pub fn max_runtime(mut self, seconds: f64) -> Self {
        self.options.max_runtime = Some(seconds);
        self
    }

    pub fn fail_on_warning(mut self, fail: bool) -> Self {
        self.options.fail_on_warning = Some(fail);
        self
    }

    pub fn allow_dirty_read(mut self, allow: bool) -> Self {
        self.allow_dirty_read = allow;
        self
    }

    pub fn retry_enabled(&self) -> bool {
        self.options.allow_retry.unwrap_or(false)
    }

    /// Validate and encode. Bad input never reaches the network.
    pub fn to_request(&self, conn: &Connection) -> Result<Request> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".into()));
        }
        if self.batch_size == Some(0) {
            return Err(Error::InvalidArgument("batch_size must be at least 1".into()));
        }
        if matches!(self.options.profile, Some(p) if p > 2) {
            return Err(Error::InvalidArgument("profile must be 0, 1 or 2".into()));
        }

        let mut request = Request::post("/_api/cursor").body(conn.serialize(self)?);
        if self.allow_dirty_read {
            request = request.header("x-arango-allow-dirty-read", "true");
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_uses_protocol_names_and_skips_unset() {
        let q = QueryRequest::new("FOR d IN docs RETURN d")
            .bind_var("x", 1)
            .batch_size(2)
            .count(true)
            .allow_retry(true)
            .full_count(true)
            .allow_dirty_read(true);
        let body = serde_json::to_value(&q).unwrap();
        assert_eq!(
            body,
            json!({
                "query": "FOR d IN docs RETURN d",
                "bindVars": {"x": 1},
                "count": true,
                "batchSize": 2,
                "options": {"fullCount": true, "allowRetry": true}
            })
        );
        assert!(q.retry_enabled());
    }

    #[test]
    fn minimal_body_has_only_query() {
        let body = serde_json::to_value(QueryRequest::new("RETURN 1")).unwrap();
        assert_eq!(body, json!({"query": "RETURN 1"}));
    }
}
