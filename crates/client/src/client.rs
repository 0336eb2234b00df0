//! Client entry point.
//!
//! [`ArangoClient`] owns the process-wide pieces (host set, resolver,
//! transport sessions, codec, compression) and hands out [`Database`]
//! handles, each with its own credentials.

use std::sync::Arc;

use adb_domain::config::{ClientConfig, ConfigSeverity};
use adb_domain::credential::Credential;
use adb_domain::error::{Error, Result};

use crate::auth::AuthManager;
use crate::compression::{CompressionManager, DefaultCompressionManager, NoCompression};
use crate::connection::{Connection, ConnectionParts};
use crate::database::Database;
use crate::http::{ReqwestTransport, Transport, TransportOptions};
use crate::observer::{RequestObserver, TracingObserver};
use crate::resolver::get_resolver;
use crate::serialization::{Codec, JsonCodec};

#[derive(Clone)]
pub struct ArangoClient {
    config: ClientConfig,
    parts: ConnectionParts,
}

impl ArangoClient {
    /// Client with the default stack: reqwest transport, JSON codec,
    /// compression per config, tracing observer.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn builder(config: ClientConfig) -> ArangoClientBuilder {
        ArangoClientBuilder::new(config)
    }

    /// Assemble from ready-made parts. Sessions must already be open.
    pub fn with_parts(config: ClientConfig, parts: ConnectionParts) -> Result<Self> {
        if parts.sessions.len() != parts.resolver.host_count() {
            return Err(Error::InvalidArgument(format!(
                "{} sessions for a resolver over {} hosts",
                parts.sessions.len(),
                parts.resolver.host_count()
            )));
        }
        Ok(Self { config, parts })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.parts.sessions.iter().map(|s| s.host()).collect()
    }

    /// Handle for database `name`. `None` sends requests unauthenticated.
    pub fn db(&self, name: &str, credential: Option<Credential>) -> Result<Database> {
        let auth = AuthManager::new(credential)?;
        let conn = Connection::new(self.parts.clone(), name, auth)?;
        Ok(Database::new(conn, self.config.jobs.clone()))
    }

    /// Handle for the configured database with the configured credentials.
    pub fn default_db(&self) -> Result<Database> {
        let credential = self.config.auth.to_credential()?;
        self.db(&self.config.database, Some(credential))
    }

    /// Close every transport session. Handles created earlier stop working.
    pub async fn close(&self) {
        for session in &self.parts.sessions {
            self.parts.transport.close(session).await;
        }
        tracing::debug!(hosts = self.parts.sessions.len(), "client closed");
    }
}

impl std::fmt::Debug for ArangoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArangoClient")
            .field("hosts", &self.hosts())
            .field("resolver", &self.config.resolver)
            .field("transport", &self.parts.transport)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Swap out individual layers before connecting.
pub struct ArangoClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    codec: Arc<dyn Codec>,
    compression: Option<Arc<dyn CompressionManager>>,
    observers: Vec<Arc<dyn RequestObserver>>,
}

impl ArangoClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            codec: Arc::new(JsonCodec),
            compression: None,
            observers: vec![Arc::new(TracingObserver)],
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn compression(mut self, compression: Arc<dyn CompressionManager>) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate the config and open one session per host.
    ///
    /// Auth settings are only checked when [`ArangoClient::default_db`]
    /// turns them into a credential.
    pub async fn build(self) -> Result<ArangoClient> {
        let errors: Vec<String> = self
            .config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error && !i.field.starts_with("auth"))
            .map(|i| i.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(Error::Config(errors.join("; ")));
        }

        let resolver = get_resolver(self.config.resolver, self.config.hosts.len())?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(TransportOptions::from(&self.config))),
        };
        let compression: Arc<dyn CompressionManager> = match self.compression {
            Some(c) => c,
            None if self.config.compression.is_enabled() => {
                Arc::new(DefaultCompressionManager::from_config(&self.config.compression)?)
            }
            None => Arc::new(NoCompression),
        };

        let mut sessions = Vec::with_capacity(self.config.hosts.len());
        for host in &self.config.hosts {
            let session = transport
                .open(host)
                .await
                .map_err(|e| Error::Config(format!("opening {host}: {e}")))?;
            sessions.push(session);
        }

        tracing::info!(
            hosts = sessions.len(),
            resolver = ?self.config.resolver,
            "client ready"
        );

        ArangoClient::with_parts(
            self.config,
            ConnectionParts {
                sessions,
                resolver,
                transport,
                codec: self.codec,
                compression,
                observers: self.observers,
            },
        )
    }
}
