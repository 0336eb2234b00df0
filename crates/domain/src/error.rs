use crate::http::{Request, Response};

/// Shared error type used across all adb crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Every host failed at the connection level.
    #[error("can't connect to host(s) within limit ({attempts}): {message}")]
    ConnectionAborted { attempts: usize, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("auth: {0}")]
    Auth(String),

    /// The server refused our credentials. Keeps the rejected exchange.
    #[error("auth: {0}")]
    AuthRejected(Box<ServerError>),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("{0}")]
    Server(Box<ServerError>),

    /// Rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("deserialization: {0}")]
    Deserialization(String),

    #[error("compression: {0}")]
    Compression(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a non-2xx response together with the request that produced it.
    pub fn server(request: &Request, response: Response, message: impl Into<String>) -> Self {
        Error::Server(Box::new(ServerError {
            message: message.into(),
            request: request.clone(),
            response,
        }))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::ConnectionAborted { .. })
    }

    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth(_) | Error::AuthRejected(_) | Error::TokenRefresh(_) => true,
            Error::Server(e) => matches!(e.response.status_code, 401 | 403),
            _ => false,
        }
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Error::State(_))
    }

    pub fn state(&self) -> Option<&StateError> {
        match self {
            Error::State(s) => Some(s),
            _ => None,
        }
    }

    /// The server's `errorNum`, if this is a server error that carried one.
    pub fn error_num(&self) -> Option<i64> {
        self.server_error().and_then(|e| e.response.error_code)
    }

    pub fn http_status(&self) -> Option<u16> {
        self.server_error().map(|e| e.response.status_code)
    }

    /// Request/response context of a rejected exchange.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(e) | Error::AuthRejected(e) => Some(e),
            _ => None,
        }
    }
}

/// A well-formed non-2xx answer from the server.
///
/// Keeps the full request and response so callers can inspect headers,
/// body and the server's error number.
#[derive(Debug)]
pub struct ServerError {
    pub message: String,
    pub request: Request,
    pub response: Response,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[HTTP {}]",
            self.response.status_code,
        )?;
        if let Some(code) = self.response.error_code {
            write!(f, "[ERR {code}]")?;
        }
        match &self.response.error_message {
            Some(server_msg) => write!(f, " {}: {server_msg}", self.message),
            None => write!(f, " {}", self.message),
        }?;
        write!(f, " ({})", self.request)
    }
}

/// Operations that are invalid for the current client-side protocol state.
///
/// These are distinct from network and server failures so callers can
/// tell "already done" apart from a genuine error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("cursor is exhausted")]
    CursorExhausted,

    #[error("cursor is already closed")]
    CursorClosed,

    #[error("async job {0} is still pending")]
    JobPending(String),

    #[error("async job {0} is not pending: nothing to cancel")]
    NothingToCancel(String),

    #[error("async job {0} result was already retrieved or cleared")]
    JobCleared(String),

    #[error("async job {0} is unknown to the server")]
    JobNotFound(String),
}
