//! Kafka API Version Support
//!
//! This module holds the capability table advertised in ApiVersions responses.
//! Entries keep their registration order because clients (and tests) compare the
//! encoded response byte for byte.

use serde::{Deserialize, Serialize};

use super::{API_KEY_API_VERSIONS, API_KEY_DESCRIBE_TOPIC_PARTITIONS};

/// Supported version range for one Kafka API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersionInfo {
    pub api_key: i16,
    pub min_version: i16,
    pub max_version: i16,
}

impl ApiVersionInfo {
    pub fn new(api_key: i16, min_version: i16, max_version: i16) -> Self {
        Self {
            api_key,
            min_version,
            max_version,
        }
    }

    /// Check if a version is supported for this API
    pub fn supports_version(&self, version: i16) -> bool {
        version >= self.min_version && version <= self.max_version
    }

    /// Get the highest supported version (used for version negotiation)
    pub fn max_supported_version(&self, client_version: i16) -> i16 {
        std::cmp::min(self.max_version, client_version)
    }
}

/// Ordered table of advertised API versions
#[derive(Debug, Clone, Default)]
pub struct ApiVersionRegistry {
    versions: Vec<ApiVersionInfo>,
}

impl ApiVersionRegistry {
    /// Empty table; callers register entries in advertisement order.
    pub fn empty() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// The table this broker advertises.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Protocol negotiation
        registry.register(API_KEY_API_VERSIONS, 0, 4);

        // Advertised for client discovery, requests are still rejected
        registry.register(API_KEY_DESCRIBE_TOPIC_PARTITIONS, 0, 0);

        registry
    }

    /// Add an entry, replacing an earlier one for the same key in place.
    pub fn register(&mut self, api_key: i16, min_version: i16, max_version: i16) {
        let info = ApiVersionInfo::new(api_key, min_version, max_version);
        match self.versions.iter_mut().find(|v| v.api_key == api_key) {
            Some(existing) => *existing = info,
            None => self.versions.push(info),
        }
    }

    /// Get version info for an API key
    pub fn get_version_info(&self, api_key: i16) -> Option<&ApiVersionInfo> {
        self.versions.iter().find(|v| v.api_key == api_key)
    }

    /// Check if an API key and version combination is supported
    pub fn is_supported(&self, api_key: i16, version: i16) -> bool {
        self.get_version_info(api_key)
            .is_some_and(|info| info.supports_version(version))
    }

    /// Negotiate the best version for a given API key and client max version
    pub fn negotiate_version(&self, api_key: i16, client_max_version: i16) -> Option<i16> {
        self.get_version_info(api_key)
            .map(|info| info.max_supported_version(client_max_version))
    }

    /// Entries in advertisement order (for ApiVersionsResponse)
    pub fn entries(&self) -> &[ApiVersionInfo] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
