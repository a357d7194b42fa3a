//! In-process collaborators.
//!
//! Uses DashMap for lock-free concurrent access. These back the CLI
//! simulation, benches and tests; there is no eviction policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use super::{Cache, CacheEntry, LocalSource, Network, NetworkResponse, Response};
use crate::error::FetchError;
use crate::request::Request;

/// Concurrent in-memory response cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, key: &str, entry: CacheEntry) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.to_string(), entry);
    }
}

/// Network stand-in that answers from a fixed route table.
///
/// Unknown URLs fail with a 404. Every call sleeps for `latency` first.
#[derive(Default)]
pub struct StaticNetwork {
    routes: DashMap<String, Result<NetworkResponse, FetchError>>,
    calls: DashMap<String, u64>,
    latency: Duration,
}

impl StaticNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    pub fn route(&self, url: impl Into<String>, response: NetworkResponse) {
        self.routes.insert(url.into(), Ok(response));
    }

    pub fn fail(&self, url: impl Into<String>, error: FetchError) {
        self.routes.insert(url.into(), Err(error));
    }

    /// Number of calls made for `url`.
    pub fn calls(&self, url: &str) -> u64 {
        self.calls.get(url).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|c| *c.value()).sum()
    }
}

impl Network for StaticNetwork {
    fn perform(&self, request: &Request) -> Result<NetworkResponse, FetchError> {
        *self.calls.entry(request.url().to_string()).or_insert(0) += 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        match self.routes.get(request.url()) {
            Some(route) => route.clone(),
            None => Err(FetchError::Server { status: 404 }),
        }
    }
}

/// Local source backed by a key/value map, keyed by request URL.
#[derive(Default)]
pub struct MemoryLocalSource {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryLocalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.records.insert(url.into(), data.into());
    }
}

impl LocalSource for MemoryLocalSource {
    fn perform(&self, request: &Request) -> Result<Option<Response>, FetchError> {
        Ok(self
            .records
            .get(request.url())
            .map(|data| Response::local(data.clone())))
    }
}
