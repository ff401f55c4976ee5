//! Kafka Wire Protocol Codec
//!
//! This module implements encoding and decoding of the fixed-layout messages
//! spoken by the broker, plus the frame splitter used by the connection read loop.
//!
//! - All integers are encoded in network byte order (big-endian)
//! - Every field is fixed width; signed containers carry the raw wire bit pattern
//! - Decoders validate lengths up front and never return partial results

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use super::api_versions::ApiVersionInfo;
use super::messages::*;

#[derive(Debug, Error)]
pub enum KafkaCodecError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed request: needed {needed} bytes, available {available}")]
    MalformedRequest { needed: usize, available: usize },
    #[error("Truncated response: needed {needed} bytes, available {available}")]
    TruncatedResponse { needed: usize, available: usize },
    #[error("Failed to encode response: {0}")]
    EncodeFailure(String),
    #[error("Invalid frame length: {0}")]
    InvalidFrameLength(i32),
    #[error("Frame of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, KafkaCodecError>;

/// Kafka protocol codec for encoding/decoding messages
pub struct KafkaCodec;

impl KafkaCodec {
    /// Decode a request header from one frame.
    ///
    /// Bytes past the 12 byte header are ignored.
    pub fn decode_request(data: &[u8]) -> Result<RequestHeader> {
        if data.len() < REQUEST_HEADER_SIZE {
            return Err(KafkaCodecError::MalformedRequest {
                needed: REQUEST_HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut cursor = data;
        Ok(RequestHeader {
            declared_size: cursor.get_i32(),
            api_key: cursor.get_i16(),
            api_version: cursor.get_i16(),
            correlation_id: cursor.get_i32(),
        })
    }

    /// Encode a request header (client side).
    pub fn encode_request(header: &RequestHeader) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE);
        buf.put_i32(header.declared_size);
        buf.put_i16(header.api_key);
        buf.put_i16(header.api_version);
        buf.put_i32(header.correlation_id);
        buf.freeze()
    }

    /// Encode an error response. Always 10 bytes; the size field is the constant 6.
    pub fn encode_error(correlation_id: i32, error_code: i16) -> Bytes {
        let mut buf = BytesMut::with_capacity(ERROR_RESPONSE_SIZE);
        buf.put_i32(ERROR_RESPONSE_PAYLOAD_SIZE);
        buf.put_i32(correlation_id);
        buf.put_i16(error_code);
        buf.freeze()
    }

    pub fn decode_error_response(data: &[u8]) -> Result<ErrorResponse> {
        if data.len() < ERROR_RESPONSE_SIZE {
            return Err(KafkaCodecError::TruncatedResponse {
                needed: ERROR_RESPONSE_SIZE,
                available: data.len(),
            });
        }

        let mut cursor = data;
        Ok(ErrorResponse {
            payload_size: cursor.get_i32(),
            correlation_id: cursor.get_i32(),
            error_code: cursor.get_i16(),
        })
    }

    /// Encode a successful ApiVersions response advertising `entries` in order.
    pub fn encode_api_versions(correlation_id: i32, entries: &[ApiVersionInfo]) -> Result<Bytes> {
        Self::encode_api_versions_response(&ApiVersionsResponse::new(
            correlation_id,
            entries.to_vec(),
        ))
    }

    pub fn encode_api_versions_response(response: &ApiVersionsResponse) -> Result<Bytes> {
        let entry_count = i32::try_from(response.api_versions.len()).map_err(|_| {
            KafkaCodecError::EncodeFailure(format!(
                "{} api version entries do not fit an int32 count",
                response.api_versions.len()
            ))
        })?;
        let total_size = response.encoded_len();
        let size_field = i32::try_from(total_size - 4).map_err(|_| {
            KafkaCodecError::EncodeFailure(format!(
                "response of {} bytes does not fit an int32 size",
                total_size
            ))
        })?;

        let mut buf = BytesMut::with_capacity(total_size);
        buf.put_i32(size_field); // excludes itself
        buf.put_i32(response.correlation_id);
        buf.put_i16(response.error_code);
        buf.put_i32(entry_count);

        for api in &response.api_versions {
            buf.put_i16(api.api_key);
            buf.put_i16(api.min_version);
            buf.put_i16(api.max_version);
        }

        debug_assert_eq!(buf.len(), total_size);
        Ok(buf.freeze())
    }

    /// Decode an ApiVersions response.
    ///
    /// The entry count read from the wire drives the loop but is only used to
    /// allocate once the buffer is known to hold every entry.
    pub fn decode_api_versions_response(data: &[u8]) -> Result<ApiVersionsResponse> {
        if data.len() < API_VERSIONS_FIXED_SIZE {
            return Err(KafkaCodecError::TruncatedResponse {
                needed: API_VERSIONS_FIXED_SIZE,
                available: data.len(),
            });
        }

        let mut cursor = data;
        let _size = cursor.get_i32();
        let correlation_id = cursor.get_i32();
        let error_code = cursor.get_i16();
        let declared_count = cursor.get_i32();

        let needed = usize::try_from(declared_count)
            .ok()
            .and_then(|count| count.checked_mul(API_VERSION_ENTRY_SIZE))
            .and_then(|entries| entries.checked_add(API_VERSIONS_FIXED_SIZE))
            .ok_or(KafkaCodecError::TruncatedResponse {
                needed: usize::MAX,
                available: data.len(),
            })?;

        if data.len() < needed {
            return Err(KafkaCodecError::TruncatedResponse {
                needed,
                available: data.len(),
            });
        }

        let count = declared_count as usize;
        let mut api_versions = Vec::with_capacity(count);
        for _ in 0..count {
            api_versions.push(ApiVersionInfo {
                api_key: cursor.get_i16(),
                min_version: cursor.get_i16(),
                max_version: cursor.get_i16(),
            });
        }

        Ok(ApiVersionsResponse {
            correlation_id,
            error_code,
            api_versions,
        })
    }
}

/// How the read loop cuts the incoming byte stream into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Whatever one socket read delivered is one frame; the size field is advisory.
    #[default]
    ReadUnit,
    /// The leading size field is authoritative: a frame is `4 + size` bytes.
    LengthPrefixed,
}

impl std::str::FromStr for FramingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "read_unit" => Ok(FramingMode::ReadUnit),
            "length_prefixed" => Ok(FramingMode::LengthPrefixed),
            other => Err(format!("unknown framing mode '{}'", other)),
        }
    }
}

/// Splits inbound bytes into owned request frames.
///
/// Frames keep their size prefix so [`KafkaCodec::decode_request`] sees the full header.
#[derive(Debug, Clone, Copy)]
pub struct KafkaFrameCodec {
    mode: FramingMode,
    max_frame_size: usize,
}

impl KafkaFrameCodec {
    pub fn new(mode: FramingMode, max_frame_size: usize) -> Self {
        Self {
            mode,
            max_frame_size,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }
}

impl Decoder for KafkaFrameCodec {
    type Item = Bytes;
    type Error = KafkaCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.mode {
            FramingMode::ReadUnit => {
                if src.is_empty() {
                    return Ok(None);
                }
                // split() hands out the filled region; later reads land in fresh memory
                Ok(Some(src.split().freeze()))
            }
            FramingMode::LengthPrefixed => {
                if src.len() < 4 {
                    // Need at least 4 bytes for message length
                    return Ok(None);
                }

                // Peek at message length without consuming bytes
                let message_length = (&src[..4]).get_i32();
                if message_length < 0 {
                    return Err(KafkaCodecError::InvalidFrameLength(message_length));
                }

                let total_length = 4 + message_length as usize;
                if total_length > self.max_frame_size {
                    return Err(KafkaCodecError::FrameTooLarge {
                        size: total_length,
                        max: self.max_frame_size,
                    });
                }

                if src.len() < total_length {
                    // Don't have the full message yet
                    src.reserve(total_length - src.len());
                    return Ok(None);
                }

                let frame = src.split_to(total_length).freeze();
                debug!("KafkaFrameCodec: framed request of {} bytes", frame.len());
                Ok(Some(frame))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    warn!(
                        "Discarding {} bytes of incomplete frame at end of stream",
                        src.len()
                    );
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability_entries() -> Vec<ApiVersionInfo> {
        vec![ApiVersionInfo::new(18, 0, 4), ApiVersionInfo::new(75, 0, 0)]
    }

    #[test]
    fn test_decode_request_fields() {
        let bytes = [
            0, 0, 0, 0, // size: advisory
            0, 18, // api key
            0, 4, // api version
            0, 0xbc, 0x61, 0x4e, // correlation id 12345678
        ];

        let header = KafkaCodec::decode_request(&bytes).unwrap();
        assert_eq!(header.declared_size, 0);
        assert_eq!(header.api_key, 18);
        assert_eq!(header.api_version, 4);
        assert_eq!(header.correlation_id, 12345678);
    }

    #[test]
    fn test_decode_request_too_short() {
        let err = KafkaCodec::decode_request(&[0, 0, 0, 8, 0, 18, 0, 4, 0, 0, 1]).unwrap_err();
        assert!(matches!(
            err,
            KafkaCodecError::MalformedRequest {
                needed: 12,
                available: 11
            }
        ));
    }

    #[test]
    fn test_request_round_trip_preserves_bit_patterns() {
        let header = RequestHeader {
            declared_size: -1,
            api_key: i16::MIN,
            api_version: -2,
            correlation_id: i32::MIN + 7,
        };

        let encoded = KafkaCodec::encode_request(&header);
        assert_eq!(encoded.len(), REQUEST_HEADER_SIZE);
        assert_eq!(&encoded[..4], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(KafkaCodec::decode_request(&encoded).unwrap(), header);
    }

    #[test]
    fn test_encode_error_layout() {
        let bytes = KafkaCodec::encode_error(0x0102_0304, 35);
        assert_eq!(
            bytes.as_ref(),
            &[0, 0, 0, 6, 1, 2, 3, 4, 0, 35],
            "size field is constant and layout is big-endian"
        );

        let decoded = KafkaCodec::decode_error_response(&bytes).unwrap();
        assert_eq!(decoded.payload_size, 6);
        assert_eq!(decoded.correlation_id, 0x0102_0304);
        assert_eq!(decoded.error_code, 35);
    }

    #[test]
    fn test_encode_error_size_independent_of_correlation_id() {
        for correlation_id in [0, -1, i32::MAX, i32::MIN] {
            let bytes = KafkaCodec::encode_error(correlation_id, 35);
            assert_eq!(bytes.len(), ERROR_RESPONSE_SIZE);
            assert_eq!(&bytes[..4], &[0, 0, 0, 6]);
        }
    }

    #[test]
    fn test_encode_api_versions_exact_bytes() {
        let bytes = KafkaCodec::encode_api_versions(7, &capability_entries()).unwrap();

        #[rustfmt::skip]
        let expected: &[u8] = &[
            0, 0, 0, 22,   // size = 26 - 4
            0, 0, 0, 7,    // correlation id
            0, 0,          // error code
            0, 0, 0, 2,    // entry count
            0, 18, 0, 0, 0, 4,
            0, 75, 0, 0, 0, 0,
        ];
        assert_eq!(bytes.as_ref(), expected);
    }

    #[test]
    fn test_api_versions_round_trip() {
        for n in [0usize, 1, 2, 5] {
            let entries: Vec<ApiVersionInfo> = (0..n)
                .map(|i| ApiVersionInfo::new(i as i16, 0, i as i16 * 2))
                .collect();
            let response = ApiVersionsResponse::new(-42, entries);

            let bytes = KafkaCodec::encode_api_versions_response(&response).unwrap();
            assert_eq!(bytes.len(), 14 + 6 * n);
            assert_eq!(
                KafkaCodec::decode_api_versions_response(&bytes).unwrap(),
                response
            );
        }
    }

    #[test]
    fn test_decode_api_versions_truncated_header() {
        let err = KafkaCodec::decode_api_versions_response(&[0; 13]).unwrap_err();
        assert!(matches!(
            err,
            KafkaCodecError::TruncatedResponse {
                needed: 14,
                available: 13
            }
        ));
    }

    #[test]
    fn test_decode_api_versions_count_exceeds_buffer() {
        let bytes = KafkaCodec::encode_api_versions(1, &capability_entries()).unwrap();
        let err = KafkaCodec::decode_api_versions_response(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            KafkaCodecError::TruncatedResponse {
                needed: 26,
                available: 25
            }
        ));
    }

    #[test]
    fn test_decode_api_versions_huge_declared_count_does_not_allocate() {
        let mut bytes = BytesMut::new();
        bytes.put_i32(10);
        bytes.put_i32(1);
        bytes.put_i16(0);
        bytes.put_i32(i32::MAX);

        assert!(matches!(
            KafkaCodec::decode_api_versions_response(&bytes),
            Err(KafkaCodecError::TruncatedResponse { .. })
        ));

        let mut negative = BytesMut::new();
        negative.put_i32(10);
        negative.put_i32(1);
        negative.put_i16(0);
        negative.put_i32(-1);
        assert!(KafkaCodec::decode_api_versions_response(&negative).is_err());
    }

    #[test]
    fn test_read_unit_framing_takes_whole_buffer() {
        let mut codec = KafkaFrameCodec::new(FramingMode::ReadUnit, 1024);
        let mut buf = BytesMut::from(&[1u8, 2, 3, 4, 5][..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_ref(), &[1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_read_unit_frame_does_not_alias_buffer() {
        let mut codec = KafkaFrameCodec::new(FramingMode::ReadUnit, 1024);
        let mut buf = BytesMut::with_capacity(64);
        buf.extend_from_slice(&[9; 12]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        buf.extend_from_slice(&[1; 12]);

        assert_eq!(frame.as_ref(), &[9; 12]);
    }

    #[test]
    fn test_length_prefixed_framing_splits_and_reassembles() {
        let mut codec = KafkaFrameCodec::new(FramingMode::LengthPrefixed, 1024);
        let first = KafkaCodec::encode_request(&RequestHeader::new(18, 4, 1));
        let second = KafkaCodec::encode_request(&RequestHeader::new(18, 4, 2));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second[..5]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), first);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&second[5..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), second);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_prefixed_rejects_bad_lengths() {
        let mut codec = KafkaFrameCodec::new(FramingMode::LengthPrefixed, 64);

        let mut negative = BytesMut::from(&[0xff, 0xff, 0xff, 0xfe, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut negative),
            Err(KafkaCodecError::InvalidFrameLength(-2))
        ));

        let mut oversized = BytesMut::from(&[0, 0, 1, 0][..]);
        assert!(matches!(
            codec.decode(&mut oversized),
            Err(KafkaCodecError::FrameTooLarge { size: 260, max: 64 })
        ));
    }

    #[test]
    fn test_length_prefixed_discards_partial_frame_at_eof() {
        let mut codec = KafkaFrameCodec::new(FramingMode::LengthPrefixed, 1024);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 8, 0, 18][..]);

        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_framing_mode_from_str() {
        assert_eq!("read_unit".parse::<FramingMode>(), Ok(FramingMode::ReadUnit));
        assert_eq!(
            "length-prefixed".parse::<FramingMode>(),
            Ok(FramingMode::LengthPrefixed)
        );
        assert!("lines".parse::<FramingMode>().is_err());
    }
}
