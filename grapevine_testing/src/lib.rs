//! Utilities for driving a [`GossipClient`](grapevine::GossipClient)
//! against an in-memory directory service during tests.
//!
//! [`MockService`] hands out a [`Connector`](grapevine::Connector) whose
//! transports record every frame the client sends and let the test push
//! frames back, close the connection or inject transport errors.
//!
//! ```rust
//! use grapevine::{ClientConfig, GossipClient};
//! use grapevine_testing::MockService;
//!
//! # async fn example() -> grapevine::Result<()> {
//! let service = MockService::new();
//! let client = GossipClient::new(ClientConfig::new("id", "secret"), service.connector());
//! client.connect().await?;
//! let auth = service.next_sent("authenticate").await;
//! assert_eq!(auth.payload.unwrap()["client_id"], "id");
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod service;

pub use logging::{LoggerHandle, logger};
pub use service::{MockConnector, MockService};
