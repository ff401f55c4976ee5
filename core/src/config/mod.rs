pub mod settings;

use crate::protocol::kafka::REQUEST_HEADER_SIZE;
use crate::protocol::FramingMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest length-prefixed frame accepted by default. Requests here are a
/// 12 byte header, so this leaves room for bodies without letting a bare
/// size prefix reserve megabytes per connection.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// What the dispatcher does with a frame too short to hold a request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedFramePolicy {
    /// Answer with a zero-length placeholder and keep the connection open
    #[default]
    Placeholder,
    /// Answer with the placeholder, then close the connection
    Disconnect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,

    // Per-connection lifecycle
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub read_buffer_size: usize,
    pub frame_queue_capacity: usize,
    pub tcp_nodelay: bool,

    // Framing and request handling
    pub framing: FramingMode,
    pub max_frame_size: usize,
    pub malformed_frame_policy: MalformedFramePolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9092,
            max_connections: 1000,

            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            read_buffer_size: 1024,
            frame_queue_capacity: 1, // reader stays at most one frame ahead of the dispatcher
            tcp_nodelay: true,

            framing: FramingMode::ReadUnit,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            malformed_frame_policy: MalformedFramePolicy::Placeholder,
        }
    }
}

impl BrokerConfig {
    /// `host:port` the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn with_framing(mut self, framing: FramingMode) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Validate configuration bounds so no per-connection resource can be zero-sized
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if self.read_timeout_ms == 0 {
            return Err("read_timeout_ms must be > 0".to_string());
        }
        if self.write_timeout_ms == 0 {
            return Err("write_timeout_ms must be > 0".to_string());
        }
        // One read is one frame in read_unit mode, so a read must fit a whole header
        if self.read_buffer_size < REQUEST_HEADER_SIZE {
            return Err(format!("read_buffer_size must be >= {}", REQUEST_HEADER_SIZE));
        }
        if self.frame_queue_capacity == 0 {
            return Err("frame_queue_capacity must be > 0".to_string());
        }
        if self.max_frame_size < REQUEST_HEADER_SIZE {
            return Err(format!("max_frame_size must be >= {}", REQUEST_HEADER_SIZE));
        }
        Ok(())
    }
}
