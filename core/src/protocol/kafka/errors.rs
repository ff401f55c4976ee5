//! Kafka Error Codes
//!
//! Error codes written into response bodies. Only the codes this broker can
//! actually emit or needs to recognise are modelled; anything else read off the
//! wire maps to [`KafkaErrorCode::Unknown`].

/// Kafka protocol error codes (numbering follows the Kafka protocol)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i16)]
pub enum KafkaErrorCode {
    #[default]
    NoError = 0,
    Unknown = -1,
    UnsupportedVersion = 35,
}

impl KafkaErrorCode {
    /// Convert error code to i16 for wire protocol
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Create error code from i16 value
    pub fn from_i16(code: i16) -> Self {
        match code {
            0 => KafkaErrorCode::NoError,
            35 => KafkaErrorCode::UnsupportedVersion,
            _ => KafkaErrorCode::Unknown,
        }
    }

    pub fn is_success(self) -> bool {
        self == KafkaErrorCode::NoError
    }

    /// Get human-readable error message
    pub fn message(self) -> &'static str {
        match self {
            KafkaErrorCode::NoError => "No error",
            KafkaErrorCode::Unknown => {
                "The server experienced an unexpected error when processing the request"
            }
            KafkaErrorCode::UnsupportedVersion => "The version of API is not supported",
        }
    }
}

impl std::fmt::Display for KafkaErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", *self as i16, self, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(KafkaErrorCode::NoError.as_i16(), 0);
        assert_eq!(KafkaErrorCode::Unknown.as_i16(), -1);
        assert_eq!(KafkaErrorCode::UnsupportedVersion.as_i16(), 35);

        assert_eq!(KafkaErrorCode::from_i16(0), KafkaErrorCode::NoError);
        assert_eq!(
            KafkaErrorCode::from_i16(35),
            KafkaErrorCode::UnsupportedVersion
        );
        assert_eq!(KafkaErrorCode::from_i16(999), KafkaErrorCode::Unknown);
    }

    #[test]
    fn test_unmodelled_codes_read_as_unknown() {
        for code in [2, 7, 13, 42, i16::MIN] {
            let parsed = KafkaErrorCode::from_i16(code);
            assert_eq!(parsed, KafkaErrorCode::Unknown);
            assert!(!parsed.is_success());
        }
    }

    #[test]
    fn test_error_display() {
        let display = format!("{}", KafkaErrorCode::UnsupportedVersion);
        assert!(display.contains("35"));
        assert!(display.contains("UnsupportedVersion"));
        assert!(display.contains("not supported"));
    }

    #[test]
    fn test_default_is_success() {
        assert!(KafkaErrorCode::default().is_success());
        assert!(!KafkaErrorCode::UnsupportedVersion.is_success());
    }
}
