//! Per-connection request dispatch.
//!
//! The dispatcher drains one peer's frame queue in order and writes exactly one
//! reply per frame before taking the next, so responses leave in request order.
//!
//! | Frame                              | Reply                                  |
//! |------------------------------------|----------------------------------------|
//! | shorter than the 12 byte header    | empty write (placeholder)              |
//! | `api_version != 4`                 | error response, code 35                |
//! | registered `api_key`               | handler output                         |
//! | any other `api_key`                | error response, code 35                |
//! | handler failed to encode           | empty write, connection stays open     |

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::handler::HandlerRegistry;
use super::peer::{CloseReason, Peer};
use crate::config::MalformedFramePolicy;
use crate::metrics::BrokerMetrics;
use crate::protocol::kafka::SUPPORTED_API_VERSION;
use crate::protocol::{KafkaCodec, KafkaErrorCode};

/// What to write back for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Successful handler output
    Response(Bytes),
    /// Error response for an unsupported version or unknown API key
    Rejected(Bytes),
    /// The frame could not be decoded
    Malformed,
    /// The handler failed to produce a response
    Failed,
}

impl Reply {
    /// Bytes to write. The non-response outcomes write nothing.
    pub fn payload(&self) -> Bytes {
        match self {
            Reply::Response(bytes) | Reply::Rejected(bytes) => bytes.clone(),
            Reply::Malformed | Reply::Failed => Bytes::new(),
        }
    }
}

pub struct Dispatcher {
    handlers: HandlerRegistry,
    malformed_policy: MalformedFramePolicy,
    metrics: Arc<BrokerMetrics>,
}

impl Dispatcher {
    pub fn new(
        handlers: HandlerRegistry,
        malformed_policy: MalformedFramePolicy,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            handlers,
            malformed_policy,
            metrics,
        }
    }

    /// Answer every frame from `frames` on `peer` until the queue closes.
    pub async fn run(&self, peer: Arc<Peer>, mut frames: mpsc::Receiver<Bytes>) {
        while let Some(frame) = frames.recv().await {
            let reply = self.handle_frame(&frame);

            if let Err(e) = peer.send(&reply.payload()).await {
                // The read loop notices a dead socket on its own
                debug!(peer = peer.id(), "Failed to send reply: {}", e);
            }

            let disconnect = self.malformed_policy == MalformedFramePolicy::Disconnect;
            if reply == Reply::Malformed && disconnect {
                peer.stop_reading(CloseReason::DecodeRejected);
            }
        }

        debug!(peer = peer.id(), "Frame queue closed, dispatcher exiting");
    }

    /// Decide the reply for one frame. Pure apart from metrics.
    pub fn handle_frame(&self, frame: &[u8]) -> Reply {
        self.metrics.request_received();

        let header = match KafkaCodec::decode_request(frame) {
            Ok(header) => header,
            Err(e) => {
                warn!("Dropping malformed request: {}", e);
                self.metrics.malformed_request();
                return Reply::Malformed;
            }
        };

        debug!(
            "Request api_key={} api_version={} correlation_id={}",
            header.api_key, header.api_version, header.correlation_id
        );

        if header.api_version != SUPPORTED_API_VERSION {
            return self.reject(header.correlation_id);
        }

        let Some(handler) = self.handlers.get(header.api_key) else {
            debug!("No handler for api_key {}", header.api_key);
            return self.reject(header.correlation_id);
        };

        match handler.handle(&header) {
            Ok(response) => Reply::Response(response),
            Err(e) => {
                error!(
                    "Handler for api_key {} failed (correlation_id={}): {}",
                    header.api_key, header.correlation_id, e
                );
                Reply::Failed
            }
        }
    }

    fn reject(&self, correlation_id: i32) -> Reply {
        self.metrics.error_response_sent();
        Reply::Rejected(KafkaCodec::encode_error(
            correlation_id,
            KafkaErrorCode::UnsupportedVersion.as_i16(),
        ))
    }
}
