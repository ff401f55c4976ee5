//! # Broker Metrics
//!
//! Lock-free counters updated from the connection and dispatch hot paths.
//!
//! Every update is a single atomic operation, so recording a request never
//! contends with other connections. Readers get a point-in-time
//! [`MetricsSnapshot`] for logging or inspection.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Ensure structures are cache-line aligned to prevent false sharing
#[repr(align(64))]
#[derive(Debug, Default)]
struct CacheLineAligned<T>(T);

/// Connection and request counters for one broker instance
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    active_connections: CacheLineAligned<AtomicUsize>,
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,
    total_requests: CacheLineAligned<AtomicU64>,
    error_responses: AtomicU64,
    malformed_requests: AtomicU64,
}

/// Point-in-time copy of [`BrokerMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub active_connections: usize,
    pub total_connections: u64,
    pub rejected_connections: u64,
    pub total_requests: u64,
    pub error_responses: u64,
    pub malformed_requests: u64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn connection_opened(&self) {
        self.active_connections.0.fetch_add(1, Ordering::AcqRel);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn connection_closed(&self) {
        self.active_connections.0.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn request_received(&self) {
        self.total_requests.0.fetch_add(1, Ordering::Release);
    }

    pub fn error_response_sent(&self) {
        self.error_responses.fetch_add(1, Ordering::Release);
    }

    pub fn malformed_request(&self) {
        self.malformed_requests.fetch_add(1, Ordering::Release);
    }

    #[inline(always)]
    pub fn active_connections(&self) -> usize {
        self.active_connections.0.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.0.load(Ordering::Acquire)
    }

    pub fn error_rate(&self) -> f64 {
        let total = self.total_requests();
        let errors = self.error_responses.load(Ordering::Acquire);
        if total > 0 {
            errors as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections(),
            total_connections: self.total_connections.load(Ordering::Acquire),
            rejected_connections: self.rejected_connections.load(Ordering::Acquire),
            total_requests: self.total_requests(),
            error_responses: self.error_responses.load(Ordering::Acquire),
            malformed_requests: self.malformed_requests.load(Ordering::Acquire),
        }
    }
}
