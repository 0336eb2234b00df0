//! HTTP wire model shared by every layer of the client.
//!
//! [`Request`] and [`Response`] are plain data. The transport turns a
//! `Request` into bytes on the wire and hands back a `Response`; the
//! connection layer decides what the status code means.

use std::collections::BTreeMap;
use std::fmt;

use crate::credential::BasicAuth;

/// Value of the `x-arango-driver` header attached to every request.
pub const DRIVER_HEADER: &str = concat!("adb-client/", env!("CARGO_PKG_VERSION"));

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Method
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Headers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Case-insensitive header map with unique keys.
///
/// Keys are stored lower-cased; inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.as_ref().to_ascii_lowercase(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(&key.to_ascii_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-request override of the connection's credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthOverride {
    /// Send the request without an `Authorization` header.
    Disabled,
    /// Use these basic-auth credentials instead of the connection's.
    Basic(BasicAuth),
    /// Use this bearer token instead of the connection's.
    Bearer(String),
}

impl fmt::Debug for AuthOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOverride::Disabled => f.write_str("Disabled"),
            AuthOverride::Basic(auth) => f.debug_tuple("Basic").field(auth).finish(),
            AuthOverride::Bearer(_) => f.write_str("Bearer([REDACTED])"),
        }
    }
}

/// A logical HTTP request against a database endpoint.
///
/// Built once by a surface (query, job, database) and then only read by the
/// connection, apart from the header/body adjustments it makes while
/// attaching credentials and compressing the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub headers: Headers,
    /// Query parameters. A key may appear more than once.
    pub params: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub auth: Option<AuthOverride>,
    /// Prefix the endpoint with `/_db/<name>` when sent. Off for
    /// server-level endpoints such as `/_open/auth`.
    pub db_scoped: bool,
}

impl Request {
    /// New request with the driver's default headers.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("charset", "utf-8");
        headers.insert("content-type", "application/json");
        headers.insert("x-arango-driver", DRIVER_HEADER);
        Self {
            method,
            endpoint: endpoint.into(),
            headers,
            params: Vec::new(),
            body: None,
            auth: None,
            db_scoped: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    pub fn header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Boolean parameters go on the wire as `1` / `0`.
    pub fn param_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.param(key, u8::from(value))
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn auth(mut self, auth: AuthOverride) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Address the endpoint at the server root instead of the database.
    pub fn unscoped(mut self) -> Self {
        self.db_scoped = false;
        self
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Vec::len)
    }

    /// All values of a (possibly repeated) query parameter.
    pub fn param_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.endpoint)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An HTTP response as received from one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub status_code: u16,
    pub status_text: String,
    pub raw_body: Vec<u8>,
    /// Server error number (`errorNum`) when the body carried one.
    pub error_code: Option<i64>,
    /// Server error message (`errorMessage`) when the body carried one.
    pub error_message: Option<String>,
}

impl Response {
    pub fn new(method: Method, url: impl Into<String>, status_code: u16) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            status_code,
            status_text: String::new(),
            raw_body: Vec::new(),
            error_code: None,
            error_message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }
}
