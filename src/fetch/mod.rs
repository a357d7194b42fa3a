//! Collaborator contracts for the three fetch paths.
//!
//! The queue never performs I/O itself. Dispatchers call into these traits and
//! hand whatever comes back to the delivery mechanism.

pub mod memory;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::FetchError;
use crate::request::Request;

pub use memory::{MemoryCache, MemoryLocalSource, StaticNetwork};

/// Durable response cache.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn put(&self, key: &str, entry: CacheEntry);
}

/// Remote transport.
pub trait Network: Send + Sync {
    fn perform(&self, request: &Request) -> Result<NetworkResponse, FetchError>;
}

/// Local data source. `Ok(None)` means the source has nothing for this request.
pub trait LocalSource: Send + Sync {
    fn perform(&self, request: &Request) -> Result<Option<Response>, FetchError>;
}

/// Where a delivered response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Local,
    Cache,
    Network,
}

/// Result handed to the delivery mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub source: ResponseSource,
    /// True for a soft-expired cache hit that will be followed by a network refresh.
    pub intermediate: bool,
}

impl Response {
    pub fn new(data: Vec<u8>, source: ResponseSource) -> Self {
        Self { data, source, intermediate: false }
    }

    pub fn local(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data.into(), ResponseSource::Local)
    }
}

/// A cached response body with optional hard and soft expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub data: Vec<u8>,
    /// After this instant the entry must not be served.
    pub ttl: Option<Instant>,
    /// After this instant the entry may be served but should be refreshed.
    pub soft_ttl: Option<Instant>,
}

impl CacheEntry {
    /// Entry that never expires.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), ttl: None, soft_ttl: None }
    }

    /// Entry with a soft and a hard lifetime from now. The soft lifetime is
    /// capped by the hard one. A lifetime too long to represent as an
    /// `Instant` never expires.
    pub fn with_ttl(data: impl Into<Vec<u8>>, soft: Duration, hard: Duration) -> Self {
        let now = Instant::now();
        Self {
            data: data.into(),
            ttl: now.checked_add(hard),
            soft_ttl: now.checked_add(soft.min(hard)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= Instant::now())
    }

    pub fn refresh_needed(&self) -> bool {
        self.soft_ttl.is_some_and(|soft| soft <= Instant::now())
    }
}

/// How a network response may be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    NoStore,
    Forever,
    Ttl { soft: Duration, hard: Duration },
}

/// Raw outcome of a network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub status: u16,
    pub data: Vec<u8>,
    /// Server confirmed the previously delivered data is still current.
    pub not_modified: bool,
    pub cache: CacheDirective,
}

impl NetworkResponse {
    pub fn ok(data: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            data: data.into(),
            not_modified: false,
            cache: CacheDirective::Forever,
        }
    }

    pub fn not_modified() -> Self {
        Self {
            status: 304,
            data: Vec::new(),
            not_modified: true,
            cache: CacheDirective::NoStore,
        }
    }

    pub fn with_cache(mut self, cache: CacheDirective) -> Self {
        self.cache = cache;
        self
    }

    /// Entry to write to the cache, if the response may be stored.
    pub fn cache_entry(&self) -> Option<CacheEntry> {
        match self.cache {
            CacheDirective::NoStore => None,
            CacheDirective::Forever => Some(CacheEntry::new(self.data.clone())),
            CacheDirective::Ttl { soft, hard } => {
                Some(CacheEntry::with_ttl(self.data.clone(), soft, hard))
            }
        }
    }

    pub fn into_response(self) -> Response {
        Response::new(self.data, ResponseSource::Network)
    }
}
