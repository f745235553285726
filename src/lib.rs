#![doc(html_root_url = "https://docs.rs/grapevine/latest")]
//! Public API for the `grapevine` library.
//!
//! This crate provides a client for a gossip directory service: it keeps one
//! authenticated connection alive, announces local players, relays channel
//! broadcasts and tells, and caches the presence of remote games and
//! players.

pub mod client;
pub mod config;
pub mod correlation;
pub mod directory;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod protocol;
pub mod push;
mod router;
pub mod session;
pub mod transport;

pub use client::GossipClient;
pub use config::ClientConfig;
pub use correlation::{CorrelatableFrame, CorrelationError, CorrelationId, CorrelationKey};
pub use directory::{Directory, Invalidation, PlayerRef, RemoteGame};
pub use error::{ClientError, Result};
pub use frame::Frame;
pub use push::{ClientEvent, Subscription};
pub use session::{LocalRoster, SessionState};
pub use transport::{
    Connector,
    Transport,
    TransportError,
    TransportEvent,
    TransportEvents,
    TransportSink,
    WebSocketConnector,
};
