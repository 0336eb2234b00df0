//! `adb-domain`: shared types for the adb database client.
//!
//! No I/O lives here. Error taxonomy, client configuration, credential
//! data, the HTTP wire model and structured trace events.

pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod trace;

pub use credential::{BasicAuth, Credential, CredentialEncoding};
pub use error::{Error, Result, ServerError, StateError};
pub use http::{AuthOverride, Headers, Method, Request, Response};
