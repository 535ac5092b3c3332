//! Shared connection state for a server branch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use crate::transport::{HttpTransport, Transport};
use crate::version::ProtocolVersion;

/// Interval between asynchronous-job status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration for connecting a branch to a server.
pub struct ServerConfig {
    pub(crate) base_url: String,
    pub(crate) version: ProtocolVersion,
    pub(crate) auth_params: Option<Value>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) poll_interval: Duration,
}

impl ServerConfig {
    /// Creates a configuration for `base_url` with the default protocol
    /// version, no authentication, and the reqwest-backed transport. A
    /// trailing slash on the URL is stripped.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            version: ProtocolVersion::default(),
            auth_params: None,
            transport: Arc::new(HttpTransport::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the protocol version the server speaks.
    #[must_use]
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Enables the one-time authentication exchange with this token body.
    #[must_use]
    pub fn with_auth(mut self, params: Value) -> Self {
        self.auth_params = Some(params);
        self
    }

    /// Replaces the transport, e.g. with a scripted one in tests.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the delay between asynchronous-job status polls.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("has_auth", &self.auth_params.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Connection state shared by every node downstream of a server connection.
///
/// Auth state is written once, by the connection node's exchange, and read
/// by every descendant call.
pub struct ConnectionState {
    base_url: String,
    version: ProtocolVersion,
    auth: RwLock<Option<Value>>,
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
}

impl ConnectionState {
    pub(crate) fn new(
        base_url: String,
        version: ProtocolVersion,
        transport: Arc<dyn Transport>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            base_url,
            version,
            auth: RwLock::new(None),
            transport,
            poll_interval,
        }
    }

    /// The server base URL, without a trailing slash.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.base_url
    }

    /// The protocol version this connection speaks.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The transport descendant calls go through.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// The delay between asynchronous-job status polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The token-endpoint response stored by the authentication exchange.
    #[must_use]
    pub fn auth(&self) -> Option<Value> {
        self.auth.read().clone()
    }

    pub(crate) fn set_auth(&self, auth: Option<Value>) {
        *self.auth.write() = auth;
    }

    /// The access token inside the stored auth state, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.auth
            .read()
            .as_ref()
            .and_then(|auth| auth.get("access_token"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("authenticated", &self.auth.read().is_some())
            .finish_non_exhaustive()
    }
}
