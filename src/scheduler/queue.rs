//! Request queue management.
//!
//! [`RequestQueue`] is the single admission and completion gateway. It routes
//! each request to the local, cache or network queue, collapses concurrent
//! requests for the same cache key into one fetch, and owns the lifecycle of
//! the dispatcher threads.
//!
//! Two locks guard the shared state:
//! - the current-request set, used for cancellation sweeps;
//! - the waiting-requests map, keyed by cache key. A present key means a
//!   cache/network resolution is in flight. Staging in `add` and release in
//!   `finish` each run as one critical section on this lock.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::dispatch_queue::{DispatchQueue, QueueKind};
use super::dispatcher::{DispatchContext, Dispatcher, DispatcherState};
use crate::delivery::Delivery;
use crate::error::QueueError;
use crate::fetch::{Cache, LocalSource, Network};
use crate::request::{Request, RequestId, Tag};
use crate::telemetry;

/// Number of network dispatcher threads started by default.
pub const DEFAULT_NETWORK_THREADS: usize = 4;

/// Configuration for request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestQueueConfig {
    /// Network dispatcher threads to start.
    pub network_threads: usize,
    pub thread_name_prefix: String,
    /// Post a cancel notification when a dispatcher drops a cancelled request.
    pub notify_cancelled: bool,
    /// Send local-only requests that miss the local source to the network queue.
    pub local_miss_to_network: bool,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self {
            network_threads: DEFAULT_NETWORK_THREADS,
            thread_name_prefix: "relay".to_string(),
            notify_cancelled: false,
            local_miss_to_network: false,
        }
    }
}

/// Where `add` placed a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Neither local nor network requested; the caller finishes it.
    PassThrough,
    Local,
    Network,
    LocalAndNetwork,
    Cache,
    LocalAndCache,
    /// Held behind an in-flight request with the same cache key.
    Staged,
    LocalAndStaged,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::Local => "local",
            Self::Network => "network",
            Self::LocalAndNetwork => "local_network",
            Self::Cache => "cache",
            Self::LocalAndCache => "local_cache",
            Self::Staged => "staged",
            Self::LocalAndStaged => "local_staged",
        }
    }
}

type StagedRequests = Option<VecDeque<Arc<Request>>>;

/// State shared between the orchestrator, dispatchers and request handles.
pub struct QueueShared {
    current: Mutex<HashMap<RequestId, Arc<Request>>>,
    waiting: Mutex<HashMap<String, StagedRequests>>,
    cache_queue: DispatchQueue,
    network_queue: DispatchQueue,
    local_queue: DispatchQueue,
    sequence: AtomicU64,
}

impl QueueShared {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(HashMap::new()),
            waiting: Mutex::new(HashMap::new()),
            cache_queue: DispatchQueue::new(QueueKind::Cache),
            network_queue: DispatchQueue::new(QueueKind::Network),
            local_queue: DispatchQueue::new(QueueKind::Local),
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn queue(&self, kind: QueueKind) -> &DispatchQueue {
        match kind {
            QueueKind::Cache => &self.cache_queue,
            QueueKind::Network => &self.network_queue,
            QueueKind::Local => &self.local_queue,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn route(&self, request: &Arc<Request>) -> Route {
        let local = request.should_process_local();
        let network = request.should_process_network();

        if !local && !network {
            return Route::PassThrough;
        }
        if local && !network {
            self.local_queue.push(request.clone());
            return Route::Local;
        }
        if !request.should_cache() && !local {
            self.network_queue.push(request.clone());
            return Route::Network;
        }
        if local {
            self.local_queue.push(request.clone());
        }
        if !request.should_cache() {
            self.network_queue.push(request.clone());
            return Route::LocalAndNetwork;
        }

        match (self.stage_or_admit(request), local) {
            (true, true) => Route::LocalAndStaged,
            (true, false) => Route::Staged,
            (false, true) => Route::LocalAndCache,
            (false, false) => Route::Cache,
        }
    }

    /// Stage behind an in-flight duplicate, or mark the key in flight and
    /// queue for cache triage. Returns true if staged.
    fn stage_or_admit(&self, request: &Arc<Request>) -> bool {
        let mut waiting = self.waiting.lock();
        let cache_key = request.cache_key();
        match waiting.get_mut(cache_key) {
            Some(staged) => {
                staged
                    .get_or_insert_with(VecDeque::new)
                    .push_back(request.clone());
                tracing::debug!(cache_key, "request in flight, putting on hold");
                telemetry::record_staged();
                true
            }
            None => {
                waiting.insert(cache_key.to_string(), None);
                self.cache_queue.push(request.clone());
                false
            }
        }
    }

    pub(crate) fn is_in_flight(&self, request: &Request) -> bool {
        self.current.lock().contains_key(&request.id())
    }

    /// Remove `request` from the in-flight bookkeeping and release any
    /// requests staged behind its cache key.
    pub(crate) fn finish(&self, request: &Request) -> bool {
        let removed = {
            let mut current = self.current.lock();
            let removed = current.remove(&request.id()).is_some();
            telemetry::record_in_flight(current.len());
            removed
        };
        if !removed {
            tracing::warn!(request_id = %request.id(), "finish called for a request that is not in flight");
            return false;
        }
        request.add_marker("done");
        telemetry::record_finished();

        if request.is_cache_eligible() {
            let mut waiting = self.waiting.lock();
            let cache_key = request.cache_key();
            if let Some(Some(staged)) = waiting.remove(cache_key) {
                tracing::debug!(count = staged.len(), cache_key, "releasing waiting requests");
                telemetry::record_released(staged.len());
                // Released requests go back through cache triage; the cache
                // has been primed by the request that just finished.
                self.cache_queue.push_all(staged);
            }
        }
        true
    }
}

/// A request dispatch queue with a pool of dispatcher threads.
///
/// Calling [`add`](Self::add) routes a request for local, cache or network
/// resolution on a worker thread; outcomes go to the configured [`Delivery`].
pub struct RequestQueue {
    shared: Arc<QueueShared>,
    cache: Arc<dyn Cache>,
    network: Arc<dyn Network>,
    local: Option<Arc<dyn LocalSource>>,
    delivery: Arc<dyn Delivery>,
    config: RequestQueueConfig,
    dispatchers: Mutex<Vec<Dispatcher>>,
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl RequestQueue {
    /// Create the queue with default configuration. Processing does not begin
    /// until [`start`](Self::start) is called.
    pub fn new(
        cache: Arc<dyn Cache>,
        network: Arc<dyn Network>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self::with_config(cache, network, delivery, RequestQueueConfig::default())
    }

    pub fn with_config(
        cache: Arc<dyn Cache>,
        network: Arc<dyn Network>,
        delivery: Arc<dyn Delivery>,
        config: RequestQueueConfig,
    ) -> Self {
        Self {
            shared: Arc::new(QueueShared::new()),
            cache,
            network,
            local: None,
            delivery,
            config,
            dispatchers: Mutex::new(Vec::new()),
        }
    }

    /// Attach the local data source. Without one, every local lookup misses.
    pub fn with_local_source(mut self, local: Arc<dyn LocalSource>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn config(&self) -> &RequestQueueConfig {
        &self.config
    }

    /// The cache the dispatchers read and write.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Start the dispatchers, stopping any that are already running.
    ///
    /// On a spawn failure every dispatcher started so far is stopped again.
    pub fn start(&self) -> Result<(), QueueError> {
        self.stop();

        let context = DispatchContext {
            shared: self.shared.clone(),
            cache: self.cache.clone(),
            network: self.network.clone(),
            local: self.local.clone(),
            delivery: self.delivery.clone(),
            notify_cancelled: self.config.notify_cancelled,
            local_miss_to_network: self.config.local_miss_to_network,
        };
        let prefix = &self.config.thread_name_prefix;
        let network_threads = self.config.network_threads.max(1);

        let mut plan = Vec::with_capacity(network_threads + 2);
        plan.push((QueueKind::Cache, format!("{prefix}-cache")));
        for i in 0..network_threads {
            plan.push((QueueKind::Network, format!("{prefix}-network-{i}")));
        }
        plan.push((QueueKind::Local, format!("{prefix}-local")));

        let mut started = Vec::with_capacity(plan.len());
        for (kind, name) in plan {
            match Dispatcher::spawn(kind, name, context.clone()) {
                Ok(dispatcher) => started.push(dispatcher),
                Err(e) => {
                    tracing::error!(error = %e, "failed to start dispatchers");
                    Self::shut_down(&mut started);
                    return Err(e);
                }
            }
        }

        tracing::info!(network_threads, "request queue started");
        // A concurrent start may have won the race; its dispatchers go.
        let mut previous = std::mem::replace(&mut *self.dispatchers.lock(), started);
        Self::shut_down(&mut previous);
        Ok(())
    }

    /// Stop all dispatchers and wait for them to exit.
    ///
    /// Safe to call repeatedly or before `start`. Queued requests stay queued
    /// and are picked up by the next `start`.
    pub fn stop(&self) {
        let mut dispatchers = std::mem::take(&mut *self.dispatchers.lock());
        if dispatchers.is_empty() {
            return;
        }
        Self::shut_down(&mut dispatchers);
        tracing::info!("request queue stopped");
    }

    fn shut_down(dispatchers: &mut [Dispatcher]) {
        for dispatcher in dispatchers.iter() {
            dispatcher.quit();
        }
        for dispatcher in dispatchers.iter_mut() {
            dispatcher.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.dispatchers
            .lock()
            .iter()
            .any(|d| d.state() == DispatcherState::Running)
    }

    /// Name and state of every started dispatcher.
    pub fn dispatcher_states(&self) -> Vec<(String, DispatcherState)> {
        self.dispatchers
            .lock()
            .iter()
            .map(|d| (d.name().to_string(), d.state()))
            .collect()
    }

    /// Next value of the sequence generator.
    pub fn sequence_number(&self) -> u64 {
        self.shared.next_sequence()
    }

    /// Admit a request. Returns the same handle.
    ///
    /// Fails if the request was already admitted to a queue.
    pub fn add(&self, request: Arc<Request>) -> Result<Arc<Request>, QueueError> {
        self.admit(request).map(|(request, _)| request)
    }

    /// Like [`add`](Self::add), also reporting where the request went.
    pub fn admit(&self, request: Arc<Request>) -> Result<(Arc<Request>, Route), QueueError> {
        {
            let mut current = self.shared.current.lock();
            // Sequence is taken under the set lock so FIFO ties follow admission order.
            if !request.assign_sequence(self.shared.next_sequence()) {
                return Err(QueueError::AlreadyAdmitted { id: request.id() });
            }
            request.bind_queue(Arc::downgrade(&self.shared));
            current.insert(request.id(), request.clone());
            telemetry::record_in_flight(current.len());
        }
        request.add_marker("add-to-queue");

        let route = self.shared.route(&request);
        telemetry::record_admission(route.as_str());
        tracing::debug!(
            request_id = %request.id(),
            sequence = request.sequence(),
            route = route.as_str(),
            "request admitted"
        );
        Ok((request, route))
    }

    /// Mark `request` finished. Returns false if it was not in flight.
    pub fn finish(&self, request: &Request) -> bool {
        self.shared.finish(request)
    }

    /// Cancel every in-flight request matching `filter`. Returns how many
    /// were flagged.
    ///
    /// `filter` sees a snapshot of the requests in flight when the call
    /// began and may call back into this queue.
    pub fn cancel_all<F>(&self, filter: F) -> usize
    where
        F: Fn(&Request) -> bool,
    {
        let snapshot: Vec<Arc<Request>> = self.shared.current.lock().values().cloned().collect();
        let mut cancelled = 0;
        for request in &snapshot {
            if filter(request) {
                request.cancel();
                cancelled += 1;
            }
        }

        telemetry::record_cancelled(cancelled);
        tracing::debug!(cancelled, "cancelled matching requests");
        cancelled
    }

    /// Cancel every in-flight request carrying `tag` (identity comparison).
    pub fn cancel_all_tagged(&self, tag: &Tag) -> usize {
        self.cancel_all(|request| request.has_tag(tag))
    }

    /// Requests admitted and not yet finished.
    pub fn in_flight_count(&self) -> usize {
        self.shared.current.lock().len()
    }

    pub fn is_in_flight(&self, request: &Request) -> bool {
        self.shared.is_in_flight(request)
    }

    /// Cache keys with a resolution currently in flight.
    pub fn waiting_keys(&self) -> Vec<String> {
        self.shared.waiting.lock().keys().cloned().collect()
    }

    /// Number of requests staged behind `cache_key`, or `None` if no
    /// resolution for it is in flight.
    pub fn staged_count(&self, cache_key: &str) -> Option<usize> {
        self.shared
            .waiting
            .lock()
            .get(cache_key)
            .map(|staged| staged.as_ref().map_or(0, VecDeque::len))
    }

    /// Requests waiting in the given queue.
    pub fn pending(&self, kind: QueueKind) -> usize {
        self.shared.queue(kind).len()
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<QueueShared> {
        &self.shared
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
