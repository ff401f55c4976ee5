//! # Protocol Module
//!
//! Wire protocol for the broker. Everything here is pure: byte buffers in, typed
//! records out (and back), with no sockets or shared state involved.
//!
//! ## Modules
//!
//! - [`kafka`] - Kafka-style request header, error and ApiVersions codecs, frame
//!   splitting and the advertised capability table

pub mod kafka;

pub use kafka::codec::FramingMode;
pub use kafka::{
    ApiVersionInfo, ApiVersionRegistry, ApiVersionsResponse, ErrorResponse, KafkaCodec,
    KafkaCodecError, KafkaErrorCode, KafkaFrameCodec, RequestHeader,
};
