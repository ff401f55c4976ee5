use crate::broker::dispatcher::Dispatcher;
use crate::broker::handler::HandlerRegistry;
use crate::broker::peer::{CloseReason, Peer, PeerId, PeerOptions};
use crate::broker::registry::PeerRegistry;
use crate::metrics::BrokerMetrics;
use crate::{config::BrokerConfig, BrokerError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub struct BrokerServer {
    config: BrokerConfig,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<PeerRegistry>,
    metrics: Arc<BrokerMetrics>,
    // One supervisor task per accepted connection
    connections: TaskTracker,
    // Graceful shutdown coordination
    shutdown: CancellationToken,
    next_peer_id: AtomicU64,
}

impl BrokerServer {
    pub fn new(config: BrokerConfig) -> Result<Self> {
        Self::with_handlers(config, HandlerRegistry::with_defaults())
    }

    pub fn with_handlers(config: BrokerConfig, handlers: HandlerRegistry) -> Result<Self> {
        config.validate().map_err(BrokerError::Config)?;

        let metrics = Arc::new(BrokerMetrics::new());
        let dispatcher = Arc::new(Dispatcher::new(
            handlers,
            config.malformed_frame_policy,
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            dispatcher,
            registry: Arc::new(PeerRegistry::new()),
            metrics,
            connections: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            next_peer_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            error!("Failed to bind to {}: {}", addr, e);
            BrokerError::Network(format!("failed to bind {}: {}", addr, e))
        })?;

        info!("Broker listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until [`shutdown`](Self::shutdown).
    ///
    /// Returns once every connection has been closed and its supervisor has
    /// finished.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut accept_errors: u32 = 0;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Received shutdown signal, stopping server gracefully...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            accept_errors = 0;
                            self.accept(stream, peer_addr);
                        }
                        Err(e) => {
                            accept_errors = accept_errors.saturating_add(1);
                            let delay = accept_backoff(accept_errors);
                            error!(
                                "Failed to accept connection: {} (retrying in {:?})",
                                e, delay
                            );
                            // EMFILE and friends fail again immediately
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = self.shutdown.cancelled() => {}
                            }
                        }
                    }
                }
            }
        }

        drop(listener);

        let closed = self.registry.shutdown_all().await;
        debug!("Closed {} open connections", closed);

        self.connections.close();
        self.connections.wait().await;

        info!("Server shutdown complete");
        Ok(())
    }

    /// Stop accepting and close every open connection. [`serve`](Self::serve)
    /// returns once teardown completes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn accept(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if self.registry.len() >= self.config.max_connections {
            warn!(
                "At capacity ({} connections), dropping connection from {}",
                self.config.max_connections, peer_addr
            );
            self.metrics.connection_rejected();
            return;
        }

        if let Err(e) = self.optimize_client_socket(&stream) {
            warn!("Failed to optimize client socket {}: {}", peer_addr, e);
        }

        let id: PeerId = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let peer = match Peer::new(id, stream, PeerOptions::from(&self.config)) {
            Ok(peer) => Arc::new(peer),
            Err(e) => {
                warn!("Dropping connection from {}: {}", peer_addr, e);
                return;
            }
        };

        self.registry.register(Arc::clone(&peer));
        self.metrics.connection_opened();
        info!(
            "New client connected: {} (active: {})",
            peer_addr,
            self.metrics.active_connections()
        );

        self.connections.spawn(Self::handle_client(
            peer,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
        ));
    }

    /// Supervise one connection: run its read loop and dispatcher, then
    /// unregister and close it once reading stops.
    async fn handle_client(
        peer: Arc<Peer>,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<PeerRegistry>,
        metrics: Arc<BrokerMetrics>,
    ) {
        let peer_addr = peer.remote_addr();

        let Some(frames) = peer.frames() else {
            error!("Frame queue for {} was already taken", peer_addr);
            registry.unregister(peer.id());
            if let Err(e) = peer.close().await {
                warn!("Failed to close {}: {}", peer_addr, e);
            }
            metrics.connection_closed();
            return;
        };

        let reader = tokio::spawn({
            let peer = Arc::clone(&peer);
            async move { peer.read_loop().await }
        });
        let dispatch = tokio::spawn({
            let peer = Arc::clone(&peer);
            async move { dispatcher.run(peer, frames).await }
        });

        let reason = reader.await.unwrap_or_else(|e| {
            error!("Read loop for {} panicked: {}", peer_addr, e);
            // The sender died with the task, so the dispatcher still drains out
            CloseReason::Io
        });

        // Every frame read before the stop is answered before the socket closes
        if let Err(e) = dispatch.await {
            error!("Dispatcher for {} panicked: {}", peer_addr, e);
        }

        registry.unregister(peer.id());
        if let Err(e) = peer.close().await {
            warn!("Failed to close {}: {}", peer_addr, e);
        }

        metrics.connection_closed();
        info!("Client {} disconnected ({})", peer_addr, reason);
    }

    fn optimize_client_socket(&self, stream: &TcpStream) -> Result<()> {
        use socket2::SockRef;

        let socket_ref = SockRef::from(stream);

        socket_ref.set_tcp_nodelay(self.config.tcp_nodelay)?;
        // Lets the OS notice peers that vanished without a FIN
        socket_ref.set_keepalive(true)?;

        Ok(())
    }
}

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after the `consecutive_errors`-th accept failure in a row.
fn accept_backoff(consecutive_errors: u32) -> Duration {
    let shift = consecutive_errors.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}
