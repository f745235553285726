//! Client configuration.
//!
//! [`ClientConfig`] collects the endpoint, credentials, timers and the
//! capability/channel lists announced during authentication. Every option has
//! a documented default; only the credentials are required, and they are
//! validated when [`crate::GossipClient::connect`] is called.

use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::error::ClientError;

/// Default directory-service endpoint.
pub const DEFAULT_URL: &str = "wss://grapevine.haus/socket";
/// Capabilities announced in addition to any configured ones.
pub const DEFAULT_SUPPORTS: [&str; 4] = ["channels", "players", "tells", "games"];
/// Channels subscribed in addition to any configured ones.
pub const DEFAULT_CHANNELS: [&str; 2] = ["testing", "gossip"];

const DEFAULT_STATUS_WAIT: Duration = Duration::from_millis(100);
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_EVENT_CAPACITY: usize = 256;
const MAX_EVENT_CAPACITY: usize = 65_536;

/// Configuration for a [`crate::GossipClient`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use grapevine::ClientConfig;
///
/// let config = ClientConfig::new("client-id", "client-secret")
///     .channels(["moo"])
///     .reconnect_interval(Duration::from_secs(1));
/// assert_eq!(config.merged_channels(), vec!["testing", "gossip", "moo"]);
/// assert_eq!(config.reconnect_interval_value(), Duration::from_secs(1));
/// ```
#[derive(Clone, Debug)]
pub struct ClientConfig {
    url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    status_wait: Duration,
    reconnect_interval: Duration,
    heartbeat_timeout: Duration,
    supports: Vec<String>,
    channels: Vec<String>,
    version: String,
    user_agent: Option<String>,
    extra: Map<String, Value>,
    event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            client_id: None,
            client_secret: None,
            status_wait: DEFAULT_STATUS_WAIT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            supports: Vec::new(),
            channels: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            user_agent: None,
            extra: Map::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn merge(defaults: &[&str], configured: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(defaults.len() + configured.len());
    for item in defaults.iter().copied().chain(configured.iter().map(String::as_str)) {
        if !merged.iter().any(|existing| existing == item) {
            merged.push(item.to_owned());
        }
    }
    merged
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

impl ClientConfig {
    /// Create a configuration with the given credentials and defaults
    /// elsewhere.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::default()
            .client_id(client_id)
            .client_secret(client_secret)
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Settle window `connect` waits after sending the initial status pulls.
    #[must_use]
    pub fn status_wait(mut self, wait: Duration) -> Self {
        self.status_wait = wait;
        self
    }

    /// Delay before reconnecting after the connection drops.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Longest silence between heartbeats before the connection is presumed
    /// dead.
    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Extra capabilities announced alongside [`DEFAULT_SUPPORTS`].
    #[must_use]
    pub fn supports<I, S>(mut self, supports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supports = supports.into_iter().map(Into::into).collect();
        self
    }

    /// Extra channels subscribed alongside [`DEFAULT_CHANNELS`].
    #[must_use]
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Pass an additional key through verbatim in the `authenticate`
    /// payload. Keys the client sets itself take precedence.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Capacity of the subscriber event buffer.
    ///
    /// The value is clamped between 1 and 65536.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.clamp(1, MAX_EVENT_CAPACITY);
        self
    }

    #[must_use]
    pub fn url_value(&self) -> &str { &self.url }

    #[must_use]
    pub const fn status_wait_value(&self) -> Duration { self.status_wait }

    #[must_use]
    pub const fn reconnect_interval_value(&self) -> Duration { self.reconnect_interval }

    #[must_use]
    pub const fn heartbeat_timeout_value(&self) -> Duration { self.heartbeat_timeout }

    #[must_use]
    pub const fn event_capacity_value(&self) -> usize { self.event_capacity }

    /// Default capabilities followed by configured ones, without duplicates.
    #[must_use]
    pub fn merged_supports(&self) -> Vec<String> { merge(&DEFAULT_SUPPORTS, &self.supports) }

    /// Default channels followed by configured ones, without duplicates.
    #[must_use]
    pub fn merged_channels(&self) -> Vec<String> { merge(&DEFAULT_CHANNELS, &self.channels) }

    /// Validate that both credentials are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingCredential`] naming the first missing
    /// field.
    pub fn validate(&self) -> Result<(), ClientError> { self.credentials().map(|_| ()) }

    fn credentials(&self) -> Result<(&str, &str), ClientError> {
        let id = present(self.client_id.as_ref()).ok_or(ClientError::MissingCredential("client_id"))?;
        let secret = present(self.client_secret.as_ref())
            .ok_or(ClientError::MissingCredential("client_secret"))?;
        Ok((id, secret))
    }

    /// Build the `authenticate` payload.
    pub(crate) fn authenticate_payload(&self) -> Result<Value, ClientError> {
        let (client_id, client_secret) = self.credentials()?;
        let mut payload = self.extra.clone();
        let known = json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "supports": self.merged_supports(),
            "channels": self.merged_channels(),
            "version": self.version,
        });
        if let Value::Object(known) = known {
            payload.extend(known);
        }
        if let Some(user_agent) = &self.user_agent {
            payload.insert("user_agent".to_owned(), Value::String(user_agent.clone()));
        }
        Ok(Value::Object(payload))
    }
}
