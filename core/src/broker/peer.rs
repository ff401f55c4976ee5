//! Server-side handle to one accepted connection.
//!
//! A [`Peer`] owns the socket. Its read loop cuts the inbound byte stream into
//! frames and pushes them through a bounded queue to a single dispatcher; the
//! dispatcher answers through [`Peer::send`]. [`Peer::close`] waits for every
//! in-flight send before stopping the read loop and shutting the socket down.
//!
//! ```text
//! Open -> Reading -> (Timeout | EndOfStream | ConnectionReset | DecodeRejected)
//!      -> Closing -> Closed
//! ```

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::protocol::{FramingMode, KafkaCodecError, KafkaFrameCodec};
use crate::{BrokerError, Result};

/// Unique per accepted connection for the lifetime of a server.
pub type PeerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Open,
    Reading,
    Closing,
    Closed,
}

/// Why a peer stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// No frame arrived within the read deadline
    Timeout,
    EndOfStream,
    ConnectionReset,
    /// The inbound bytes could not be framed, or the dispatcher refused a frame
    DecodeRejected,
    /// The socket was closed underneath the read loop
    AlreadyClosed,
    /// [`Peer::close`] was called (server shutdown or registry sweep)
    Shutdown,
    /// Any other I/O failure
    Io,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Timeout => "read timeout",
            CloseReason::EndOfStream => "end of stream",
            CloseReason::ConnectionReset => "connection reset",
            CloseReason::DecodeRejected => "decode rejected",
            CloseReason::AlreadyClosed => "connection already closed",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Io => "i/o error",
        };
        f.write_str(text)
    }
}

/// Per-connection settings, derived from [`BrokerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PeerOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub read_buffer_size: usize,
    pub frame_queue_capacity: usize,
    pub framing: FramingMode,
    pub max_frame_size: usize,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for PeerOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            read_buffer_size: config.read_buffer_size,
            frame_queue_capacity: config.frame_queue_capacity,
            framing: config.framing,
            max_frame_size: config.max_frame_size,
        }
    }
}

pub struct Peer {
    id: PeerId,
    remote_addr: SocketAddr,
    options: PeerOptions,
    // Taken by the read loop when it starts
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    // The read loop holds the only sender; dropping it closes the queue
    frames_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    frames_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    in_flight: TaskTracker,
    stop: CancellationToken,
    state: Mutex<PeerState>,
    close_reason: Mutex<Option<CloseReason>>,
    closed: AtomicBool,
}

impl Peer {
    pub fn new(id: PeerId, stream: TcpStream, options: PeerOptions) -> Result<Self> {
        let remote_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (frames_tx, frames_rx) = mpsc::channel(options.frame_queue_capacity.max(1));

        Ok(Self {
            id,
            remote_addr,
            options,
            reader: Mutex::new(Some(read_half)),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            frames_tx: Mutex::new(Some(frames_tx)),
            frames_rx: Mutex::new(Some(frames_rx)),
            in_flight: TaskTracker::new(),
            stop: CancellationToken::new(),
            state: Mutex::new(PeerState::Open),
            close_reason: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock()
    }

    /// First terminal condition observed, if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Receive side of the frame queue. Handed out once, to the dispatcher.
    pub fn frames(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.frames_rx.lock().take()
    }

    /// Read frames until a terminal condition, then return it.
    ///
    /// Each frame is an owned buffer. When the queue is full the loop waits, so a
    /// slow dispatcher stalls this connection's reads and nothing else. Returning
    /// drops the queue's only sender, which the dispatcher observes as closure.
    pub async fn read_loop(&self) -> CloseReason {
        let (read_half, frames_tx) = {
            let read_half = self.reader.lock().take();
            let frames_tx = self.frames_tx.lock().take();
            match (read_half, frames_tx) {
                (Some(read_half), Some(frames_tx)) => (read_half, frames_tx),
                _ => {
                    debug!(peer = self.id, "read loop started on a closed peer");
                    return self.record_close_reason(CloseReason::AlreadyClosed);
                }
            }
        };

        self.set_state(PeerState::Reading);

        let codec = KafkaFrameCodec::new(self.options.framing, self.options.max_frame_size);
        debug!(peer = self.id, "Reading with {:?} framing", codec.mode());
        let mut framed = FramedRead::with_capacity(read_half, codec, self.options.read_buffer_size);

        let reason = loop {
            let next = tokio::select! {
                _ = self.stop.cancelled() => break CloseReason::Shutdown,
                next = tokio::time::timeout(self.options.read_timeout, framed.next()) => next,
            };

            let frame = match next {
                Err(_) => {
                    info!(
                        "Read from {} timed out after {:?}, stopping reads",
                        self.remote_addr, self.options.read_timeout
                    );
                    break CloseReason::Timeout;
                }
                Ok(None) => {
                    info!("Reached EOF from {}, stopping reads", self.remote_addr);
                    break CloseReason::EndOfStream;
                }
                Ok(Some(Err(e))) => break self.classify_read_error(e),
                Ok(Some(Ok(frame))) => frame,
            };

            debug!(peer = self.id, "Received frame of {} bytes", frame.len());

            tokio::select! {
                _ = self.stop.cancelled() => break CloseReason::Shutdown,
                sent = frames_tx.send(frame) => {
                    if sent.is_err() {
                        debug!(peer = self.id, "Dispatcher went away, stopping reads");
                        break CloseReason::Shutdown;
                    }
                }
            }
        };

        drop(frames_tx);
        self.record_close_reason(reason)
    }

    /// Write `data` to the connection, counted as one outstanding send until it
    /// completes or fails. Callers must serialize sends to keep responses whole.
    pub async fn send(&self, data: &[u8]) -> Result<usize> {
        let _in_flight = self.in_flight.token();

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(BrokerError::PeerClosed(self.id))?;

        debug!(peer = self.id, "Sending {} bytes: {:02x?}", data.len(), data);

        match tokio::time::timeout(self.options.write_timeout, writer.write_all(data)).await {
            Ok(Ok(())) => Ok(data.len()),
            Ok(Err(e)) => Err(BrokerError::Io(e)),
            Err(_) => Err(BrokerError::WriteTimeout {
                peer: self.id,
                timeout_ms: self.options.write_timeout.as_millis() as u64,
            }),
        }
    }

    /// Ask the read loop to stop, recording `reason` unless one is already known.
    pub fn stop_reading(&self, reason: CloseReason) {
        self.record_close_reason(reason);
        self.stop.cancel();
    }

    /// Wait for in-flight sends, stop the read loop (closing the frame queue) and
    /// shut the socket down. Later calls return immediately.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(peer = self.id, "Peer already closed, doing nothing");
            return Ok(());
        }

        self.set_state(PeerState::Closing);

        self.in_flight.close();
        self.in_flight.wait().await;

        self.stop_reading(CloseReason::Shutdown);
        // Covers a read loop that never started
        self.frames_tx.lock().take();
        self.reader.lock().take();

        let writer = self.writer.lock().await.take();
        let result = match writer {
            Some(mut writer) => match writer.shutdown().await {
                Ok(()) => Ok(()),
                Err(e) if is_already_closed(&e) => Ok(()),
                Err(e) => Err(BrokerError::Io(e)),
            },
            None => Ok(()),
        };

        self.set_state(PeerState::Closed);
        debug!(
            peer = self.id,
            "Closed peer {} ({})",
            self.remote_addr,
            self.close_reason().unwrap_or(CloseReason::Shutdown)
        );
        result
    }

    fn set_state(&self, state: PeerState) {
        let mut current = self.state.lock();
        // Closing/Closed are final; a late read loop must not move back to Reading
        if matches!(*current, PeerState::Closing | PeerState::Closed) && state == PeerState::Reading
        {
            return;
        }
        *current = state;
    }

    fn record_close_reason(&self, reason: CloseReason) -> CloseReason {
        *self.close_reason.lock().get_or_insert(reason)
    }

    fn classify_read_error(&self, error: KafkaCodecError) -> CloseReason {
        match error {
            KafkaCodecError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe => {
                    info!("Connection from {} was reset, stopping reads", self.remote_addr);
                    CloseReason::ConnectionReset
                }
                _ if is_already_closed(&e) => {
                    info!("Connection from {} was closed, stopping reads", self.remote_addr);
                    CloseReason::AlreadyClosed
                }
                _ => {
                    warn!("Unexpected error while reading from {}: {}", self.remote_addr, e);
                    CloseReason::Io
                }
            },
            other => {
                warn!("Rejecting stream from {}: {}", self.remote_addr, other);
                CloseReason::DecodeRejected
            }
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .field("close_reason", &self.close_reason())
            .finish()
    }
}

fn is_already_closed(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotConnected
}
