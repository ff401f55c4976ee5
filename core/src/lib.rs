//! # wirebroker
//!
//! A minimal Kafka-style binary protocol front-end. It accepts TCP connections,
//! frames and decodes fixed-layout request headers, routes them to a small table
//! of request handlers and writes typed responses back, while managing the
//! lifecycle of every connection (idle timeouts, abrupt disconnects and graceful
//! teardown coordinated with in-flight writes).
//!
//! There is no storage behind the protocol: the only successful request is
//! ApiVersions (capability negotiation); everything else gets an error response.
//!
//! ## Architecture Overview
//!
//! - [`protocol`] - pure wire codec and the advertised capability table
//! - [`broker`] - listener, per-connection [`broker::Peer`], dispatcher, handler
//!   table and the connection registry
//! - [`config`] - [`BrokerConfig`] and environment loading
//! - [`metrics`] - lock-free connection and request counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wirebroker::{BrokerConfig, BrokerServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig {
//!         host: "127.0.0.1".to_string(),
//!         port: 9092,
//!         ..Default::default()
//!     };
//!
//!     let server = BrokerServer::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod metrics;
pub mod protocol;

pub use broker::{BrokerServer, Dispatcher, HandlerRegistry, Peer, PeerId, PeerRegistry};
pub use config::{BrokerConfig, MalformedFramePolicy};
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use protocol::FramingMode;

use thiserror::Error;

/// Broker error types
///
/// Connection-level conditions (timeouts, resets, end of stream) are not errors
/// here: they end a connection through [`broker::CloseReason`] and never reach
/// the caller of [`BrokerServer::run`].
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Socket and listener I/O failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network-related errors that are not plain I/O failures
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration validation and parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The peer's connection has already been closed
    #[error("Peer {0} is closed")]
    PeerClosed(PeerId),

    /// A response write did not complete within the write timeout
    #[error("Write to peer {peer} timed out after {timeout_ms}ms")]
    WriteTimeout { peer: PeerId, timeout_ms: u64 },
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, BrokerError>;
