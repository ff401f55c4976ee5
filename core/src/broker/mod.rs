//! # Broker Module
//!
//! TCP front-end: accepts connections, frames their byte streams, dispatches
//! requests and tears connections down.
//!
//! ## Architecture
//!
//! - [`server`] - listener and accept loop; spawns one supervisor per connection
//!   and drives graceful shutdown
//! - [`peer`] - a single connection: read loop, bounded frame queue, serialized
//!   sends and an idempotent close that waits for in-flight writes
//! - [`dispatcher`] - drains a peer's frames in order and writes one reply each
//! - [`handler`] - the API key to request handler table
//! - [`registry`] - concurrent map of live peers, swept on shutdown
//!
//! Each connection runs two tasks: the read loop and the dispatcher. The
//! supervisor waits for the read loop to stop, lets the dispatcher answer what
//! was already read, then unregisters and closes the peer.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wirebroker::{BrokerConfig, BrokerServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Arc::new(BrokerServer::new(BrokerConfig::default())?);
//!     let listener = server.bind().await?;
//!
//!     let running = tokio::spawn({
//!         let server = Arc::clone(&server);
//!         async move { server.serve(listener).await }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     running.await??;
//!
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod handler;
pub mod peer;
pub mod registry;
pub mod server;

pub use dispatcher::{Dispatcher, Reply};
pub use handler::{ApiVersionsHandler, HandlerRegistry, RequestHandler};
pub use peer::{CloseReason, Peer, PeerId, PeerOptions, PeerState};
pub use registry::PeerRegistry;
pub use server::BrokerServer;
