//! `adb-client`: async multi-host HTTP client for a document/graph database.
//!
//! Layering, leaves first:
//!
//! ```text
//!   Codec ─┐   CompressionManager ─┐   HostResolver ─┐   Transport ─┐
//!          └──────────────┬────────┴──────┬──────────┴──────┬───────┘
//!                         │               │   AuthManager   │
//!                         ▼               ▼                 ▼
//!                              Connection (failover, auth retry)
//!                                        │
//!                        ApiExecutor / AsyncApiExecutor
//!                                        │
//!                        Database ─► Cursor · AsyncJob
//! ```
//!
//! [`ArangoClient`] wires the pieces together from a
//! [`ClientConfig`](adb_domain::config::ClientConfig).

pub mod aql;
pub mod auth;
pub mod client;
pub mod compression;
pub mod connection;
pub mod cursor;
pub mod database;
pub mod executor;
pub mod http;
pub mod job;
pub mod observer;
pub mod resolver;
pub mod serialization;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use aql::{QueryOptions, QueryRequest};
pub use auth::AuthManager;
pub use client::{ArangoClient, ArangoClientBuilder};
pub use compression::{CompressionManager, DefaultCompressionManager, NoCompression};
pub use connection::{Connection, ConnectionParts};
pub use cursor::{Cursor, CursorState};
pub use database::{AsyncDatabase, Database};
pub use executor::{ApiExecutor, AsyncApiExecutor};
pub use http::{ReqwestTransport, Session, Transport, TransportError, TransportOptions};
pub use job::{AsyncJob, JobStatus};
pub use observer::{RequestObserver, TracingObserver};
pub use resolver::{get_resolver, HostResolver, RoundRobinHostResolver, SingleHostResolver};
pub use serialization::{Codec, JsonCodec};

pub use adb_domain::{Error, Result};
