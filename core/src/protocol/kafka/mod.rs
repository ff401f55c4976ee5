//! Kafka Wire Protocol Implementation
//!
//! The subset of the Kafka binary protocol spoken by this broker.
//!
//! ## Protocol Structure
//!
//! All integers are big-endian and fixed width. Requests carry a 12 byte header:
//! ```text
//! Request    => size:int32 api_key:int16 api_version:int16 correlation_id:int32
//! Error      => payload_size(=6):int32 correlation_id:int32 error_code:int16
//! ApiVersions=> size:int32 correlation_id:int32 error_code:int16
//!               entry_count:int32 [api_key:int16 min_version:int16 max_version:int16]
//! ```
//!
//! ## Supported APIs
//!
//! - **ApiKey 18**: ApiVersions - capability negotiation (version 4 only)
//! - **ApiKey 75**: DescribeTopicPartitions - advertised, requests are rejected

pub mod api_versions;
pub mod codec;
pub mod errors;
pub mod messages;

pub use api_versions::*;
pub use codec::{KafkaCodec, KafkaCodecError, KafkaFrameCodec};
pub use errors::*;
pub use messages::*;

/// Kafka API Keys - Protocol negotiation
pub const API_KEY_API_VERSIONS: i16 = 18;

/// Kafka API Keys - Topic description (advertised only)
pub const API_KEY_DESCRIBE_TOPIC_PARTITIONS: i16 = 75;

/// The only request version the dispatcher routes to a handler.
pub const SUPPORTED_API_VERSION: i16 = 4;
