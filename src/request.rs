//! Request handle shared between callers, the orchestrator and dispatchers.
//!
//! A request is an opaque, cancellable token. The queue only reads its
//! routing flags, priority and cache key; the payload is interpreted by the
//! collaborators.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::delivery::RequestListener;
use crate::scheduler::{Priority, QueueShared};

/// Caller-supplied tag for bulk cancellation. Compared by identity.
pub type Tag = Arc<dyn Any + Send + Sync>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named point in a request's life, recorded for debugging.
#[derive(Debug, Clone)]
pub struct Marker {
    pub name: &'static str,
    pub thread: String,
    pub elapsed: Duration,
}

/// A unit of work routed through the relay queue.
pub struct Request {
    id: RequestId,
    url: String,
    cache_key: Option<String>,
    priority: Priority,
    should_cache: bool,
    should_process_local: bool,
    should_process_network: bool,
    tag: Option<Tag>,
    listener: Option<Arc<dyn RequestListener>>,
    sequence: OnceLock<u64>,
    queue: OnceLock<Weak<QueueShared>>,
    cancelled: AtomicBool,
    response_delivered: AtomicBool,
    created_at: Instant,
    markers: Mutex<Vec<Marker>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence.get())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Request {
    /// Start building a request for `url`.
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Key used for deduplication and cache lookups. Defaults to the URL.
    pub fn cache_key(&self) -> &str {
        self.cache_key.as_deref().unwrap_or(&self.url)
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn should_cache(&self) -> bool {
        self.should_cache
    }

    pub fn should_process_local(&self) -> bool {
        self.should_process_local
    }

    pub fn should_process_network(&self) -> bool {
        self.should_process_network
    }

    /// True when the request takes part in cache-key deduplication.
    pub fn is_cache_eligible(&self) -> bool {
        self.should_cache && self.should_process_network
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// True if this request carries exactly `tag` (identity, not equality).
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tag.as_ref().is_some_and(|t| Arc::ptr_eq(t, tag))
    }

    pub fn listener(&self) -> Option<&Arc<dyn RequestListener>> {
        self.listener.as_ref()
    }

    /// Sequence number assigned at admission, if admitted.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence.get().copied()
    }

    /// Assign the admission sequence. Fails if one was already assigned.
    pub(crate) fn assign_sequence(&self, sequence: u64) -> bool {
        self.sequence.set(sequence).is_ok()
    }

    pub(crate) fn bind_queue(&self, queue: Weak<QueueShared>) {
        let _ = self.queue.set(queue);
    }

    /// Check if request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Mark the request as cancelled. Queued copies are skipped when popped.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn has_had_response_delivered(&self) -> bool {
        self.response_delivered.load(Ordering::Acquire)
    }

    pub(crate) fn mark_delivered(&self) {
        self.response_delivered.store(true, Ordering::Release);
    }

    /// Record a marker and emit it as a trace event.
    pub fn add_marker(&self, name: &'static str) {
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        tracing::trace!(request_id = %self.id, marker = name, thread = %thread, "request marker");
        self.markers.lock().push(Marker {
            name,
            thread,
            elapsed: self.created_at.elapsed(),
        });
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.markers.lock().clone()
    }

    pub fn has_marker(&self, name: &str) -> bool {
        self.markers.lock().iter().any(|m| m.name == name)
    }

    /// Tell the owning queue this request is done.
    ///
    /// Returns false if the request was never admitted, its queue is gone,
    /// or it had already finished.
    pub fn finish(&self) -> bool {
        match self.queue.get().and_then(Weak::upgrade) {
            Some(queue) => queue.finish(self),
            None => false,
        }
    }
}

/// Builder for [`Request`].
pub struct RequestBuilder {
    url: String,
    cache_key: Option<String>,
    priority: Priority,
    should_cache: bool,
    should_process_local: bool,
    should_process_network: bool,
    tag: Option<Tag>,
    listener: Option<Arc<dyn RequestListener>>,
}

impl RequestBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_key: None,
            priority: Priority::default(),
            should_cache: true,
            should_process_local: false,
            should_process_network: true,
            tag: None,
            listener: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn should_cache(mut self, value: bool) -> Self {
        self.should_cache = value;
        self
    }

    pub fn local(mut self, value: bool) -> Self {
        self.should_process_local = value;
        self
    }

    pub fn network(mut self, value: bool) -> Self {
        self.should_process_network = value;
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn RequestListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> Arc<Request> {
        Arc::new(Request {
            id: RequestId::next(),
            url: self.url,
            cache_key: self.cache_key,
            priority: self.priority,
            should_cache: self.should_cache,
            should_process_local: self.should_process_local,
            should_process_network: self.should_process_network,
            tag: self.tag,
            listener: self.listener,
            sequence: OnceLock::new(),
            queue: OnceLock::new(),
            cancelled: AtomicBool::new(false),
            response_delivered: AtomicBool::new(false),
            created_at: Instant::now(),
            markers: Mutex::new(Vec::new()),
        })
    }
}
