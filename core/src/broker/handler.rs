//! Request handlers, keyed by API key.
//!
//! A handler turns a decoded [`RequestHeader`] into the full response bytes. The
//! dispatcher only consults this table after a request has passed the version
//! gate, so handlers never see unsupported versions.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::protocol::kafka::{codec, API_KEY_API_VERSIONS};
use crate::protocol::{ApiVersionRegistry, KafkaCodec, RequestHeader};

pub trait RequestHandler: Send + Sync {
    fn handle(&self, header: &RequestHeader) -> codec::Result<Bytes>;
}

/// Answers ApiVersions with the advertised capability table.
#[derive(Debug, Clone)]
pub struct ApiVersionsHandler {
    versions: ApiVersionRegistry,
}

impl ApiVersionsHandler {
    pub fn new(versions: ApiVersionRegistry) -> Self {
        Self { versions }
    }
}

impl Default for ApiVersionsHandler {
    fn default() -> Self {
        Self::new(ApiVersionRegistry::new())
    }
}

impl RequestHandler for ApiVersionsHandler {
    fn handle(&self, header: &RequestHeader) -> codec::Result<Bytes> {
        KafkaCodec::encode_api_versions(header.correlation_id, self.versions.entries())
    }
}

/// Mapping from API key to handler. Read-only once the server is running.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<i16, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock table: ApiVersions only. Every other key is answered with an
    /// error by the dispatcher.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(API_KEY_API_VERSIONS, Arc::new(ApiVersionsHandler::default()));
        registry
    }

    /// Install `handler` for `api_key`, returning the one it replaces.
    pub fn register(
        &mut self,
        api_key: i16,
        handler: Arc<dyn RequestHandler>,
    ) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.insert(api_key, handler)
    }

    pub fn get(&self, api_key: i16) -> Option<&Arc<dyn RequestHandler>> {
        self.handlers.get(&api_key)
    }

    pub fn contains(&self, api_key: i16) -> bool {
        self.handlers.contains_key(&api_key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().copied().collect();
        keys.sort_unstable();
        f.debug_struct("HandlerRegistry").field("api_keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::kafka::API_KEY_DESCRIBE_TOPIC_PARTITIONS;
    use crate::protocol::{ApiVersionInfo, KafkaErrorCode};

    #[test]
    fn test_default_table_serves_api_versions_only() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(API_KEY_API_VERSIONS));
        assert!(!registry.contains(API_KEY_DESCRIBE_TOPIC_PARTITIONS));
    }

    #[test]
    fn test_api_versions_handler_response() {
        let handler = ApiVersionsHandler::default();
        let response = handler
            .handle(&RequestHeader::new(API_KEY_API_VERSIONS, 4, 42))
            .unwrap();

        assert_eq!(response.len(), 26);
        let decoded = KafkaCodec::decode_api_versions_response(&response).unwrap();
        assert_eq!(decoded.correlation_id, 42);
        assert_eq!(decoded.error_code, KafkaErrorCode::NoError.as_i16());
        assert_eq!(
            decoded.api_versions,
            vec![ApiVersionInfo::new(18, 0, 4), ApiVersionInfo::new(75, 0, 0)]
        );
    }

    #[test]
    fn test_register_replaces_handler() {
        struct Fixed;
        impl RequestHandler for Fixed {
            fn handle(&self, _header: &RequestHeader) -> codec::Result<Bytes> {
                Ok(Bytes::from_static(b"fixed"))
            }
        }

        let mut registry = HandlerRegistry::with_defaults();
        let previous = registry.register(API_KEY_API_VERSIONS, Arc::new(Fixed));
        assert!(previous.is_some());

        let handler = registry.get(API_KEY_API_VERSIONS).unwrap();
        let response = handler.handle(&RequestHeader::new(18, 4, 1)).unwrap();
        assert_eq!(&response[..], b"fixed");
    }
}
