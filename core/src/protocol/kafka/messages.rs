//! Kafka Protocol Message Structures
//!
//! Typed records for the fixed-layout messages this broker understands. Wire
//! sizes are fixed, so every record also exposes the number of bytes it occupies.

use serde::{Deserialize, Serialize};

use super::api_versions::ApiVersionInfo;
use super::errors::KafkaErrorCode;

/// Size of a request header on the wire: size + api_key + api_version + correlation_id.
pub const REQUEST_HEADER_SIZE: usize = 12;

/// Size of an error response on the wire.
pub const ERROR_RESPONSE_SIZE: usize = 10;

/// Payload length advertised by every error response (correlation_id + error_code).
pub const ERROR_RESPONSE_PAYLOAD_SIZE: i32 = 6;

/// Fixed part of an ApiVersions response: size + correlation_id + error_code + entry count.
pub const API_VERSIONS_FIXED_SIZE: usize = 14;

/// Size of one ApiVersions entry: api_key + min_version + max_version.
pub const API_VERSION_ENTRY_SIZE: usize = 6;

/// Kafka request header present in all requests
///
/// `declared_size` is carried as read from the wire; whether it drives framing
/// depends on [`FramingMode`](super::codec::FramingMode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub declared_size: i32,
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
}

impl RequestHeader {
    pub fn new(api_key: i16, api_version: i16, correlation_id: i32) -> Self {
        Self {
            declared_size: (REQUEST_HEADER_SIZE - 4) as i32,
            api_key,
            api_version,
            correlation_id,
        }
    }
}

/// Generic rejection: `payload_size | correlation_id | error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub payload_size: i32,
    pub correlation_id: i32,
    pub error_code: i16,
}

impl ErrorResponse {
    pub fn new(correlation_id: i32, error_code: KafkaErrorCode) -> Self {
        Self {
            payload_size: ERROR_RESPONSE_PAYLOAD_SIZE,
            correlation_id,
            error_code: error_code.as_i16(),
        }
    }
}

/// Capability advertisement returned for ApiVersions requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersionsResponse {
    pub correlation_id: i32,
    pub error_code: i16,
    pub api_versions: Vec<ApiVersionInfo>,
}

impl ApiVersionsResponse {
    pub fn new(correlation_id: i32, api_versions: Vec<ApiVersionInfo>) -> Self {
        Self {
            correlation_id,
            error_code: KafkaErrorCode::NoError.as_i16(),
            api_versions,
        }
    }

    /// Total bytes on the wire, including the leading size field.
    pub fn encoded_len(&self) -> usize {
        API_VERSIONS_FIXED_SIZE + API_VERSION_ENTRY_SIZE * self.api_versions.len()
    }
}
