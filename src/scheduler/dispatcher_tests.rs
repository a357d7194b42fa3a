//! Dispatcher behavior against in-memory collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::*;
use crate::delivery::{Delivery, InlineDelivery, RequestListener};
use crate::fetch::{
    CacheDirective, CacheEntry, MemoryCache, MemoryLocalSource, NetworkResponse, Response,
    ResponseSource, StaticNetwork,
};
use crate::scheduler::{RequestQueue, RequestQueueConfig};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Result { url: String, data: String, source: ResponseSource, intermediate: bool },
    Error { url: String, kind: &'static str },
    Cancel { url: String },
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<Event>>,
}

impl Recording {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn for_url(&self, url: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                Event::Result { url: u, .. } | Event::Error { url: u, .. } | Event::Cancel { url: u } => {
                    u == url
                }
            })
            .collect()
    }
}

impl Delivery for Recording {
    fn post_result(&self, request: Arc<Request>, response: Response) {
        self.events.lock().push(Event::Result {
            url: request.url().to_string(),
            data: String::from_utf8_lossy(&response.data).into_owned(),
            source: response.source,
            intermediate: response.intermediate,
        });
    }

    fn post_error(&self, request: Arc<Request>, error: FetchError) {
        self.events.lock().push(Event::Error {
            url: request.url().to_string(),
            kind: error.kind(),
        });
    }

    fn post_cancel(&self, request: Arc<Request>) {
        self.events.lock().push(Event::Cancel { url: request.url().to_string() });
    }
}

/// Network that holds every call until the gate opens.
#[derive(Default)]
struct GatedNetwork {
    inner: StaticNetwork,
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl GatedNetwork {
    fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl Network for GatedNetwork {
    fn perform(&self, request: &Request) -> Result<crate::fetch::NetworkResponse, FetchError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        self.inner.perform(request)
    }
}

/// Network whose first call panics.
#[derive(Default)]
struct FlakyNetwork {
    inner: StaticNetwork,
    tripped: AtomicBool,
}

impl Network for FlakyNetwork {
    fn perform(&self, request: &Request) -> Result<NetworkResponse, FetchError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("connection pool poisoned");
        }
        self.inner.perform(request)
    }
}

/// Local source that panics on every lookup.
struct BrokenLocalSource;

impl LocalSource for BrokenLocalSource {
    fn perform(&self, _request: &Request) -> Result<Option<Response>, FetchError> {
        panic!("index corrupted");
    }
}

/// Listener that panics on every response.
#[derive(Default)]
struct PanickyListener {
    calls: AtomicUsize,
}

impl RequestListener for PanickyListener {
    fn on_response(&self, _request: &Request, _response: &Response) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("listener bug");
    }

    fn on_error(&self, _request: &Request, _error: &FetchError) {}
}

fn all_running(queue: &RequestQueue) -> bool {
    let states = queue.dispatcher_states();
    !states.is_empty() && states.iter().all(|(_, state)| *state == DispatcherState::Running)
}

struct Harness {
    queue: RequestQueue,
    cache: Arc<MemoryCache>,
    network: Arc<StaticNetwork>,
    delivery: Arc<Recording>,
}

fn harness(config: RequestQueueConfig) -> Harness {
    harness_with(config, None)
}

fn harness_with(config: RequestQueueConfig, local: Option<Arc<MemoryLocalSource>>) -> Harness {
    let cache = Arc::new(MemoryCache::new());
    let network = Arc::new(StaticNetwork::new());
    let delivery = Arc::new(Recording::default());
    let mut queue =
        RequestQueue::with_config(cache.clone(), network.clone(), delivery.clone(), config);
    if let Some(local) = local {
        queue = queue.with_local_source(local);
    }
    Harness { queue, cache, network, delivery }
}

fn small_config() -> RequestQueueConfig {
    RequestQueueConfig {
        network_threads: 2,
        thread_name_prefix: "test".to_string(),
        ..Default::default()
    }
}

fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn ok(url: &str, data: &str, source: ResponseSource) -> Event {
    Event::Result {
        url: url.to_string(),
        data: data.to_string(),
        source,
        intermediate: false,
    }
}

fn done_count(request: &Request) -> usize {
    request.markers().iter().filter(|m| m.name == "done").count()
}

#[test]
fn fresh_cache_hit_skips_network() {
    let h = harness(small_config());
    h.cache.put("a", CacheEntry::new("cached"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![ok("a", "cached", ResponseSource::Cache)]);
    assert_eq!(h.network.total_calls(), 0);
    assert!(req.has_marker("cache-hit"));
    assert!(req.has_had_response_delivered());
    assert!(h.queue.waiting_keys().is_empty());
}

#[test]
fn cache_miss_goes_to_network_and_primes_cache() {
    let h = harness(small_config());
    h.network.route("a", NetworkResponse::ok("fresh"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![ok("a", "fresh", ResponseSource::Network)]);
    assert!(h.cache.contains("a"));
    for marker in ["cache-miss", "network-queue-take", "network-http-complete", "network-cache-written"] {
        assert!(req.has_marker(marker), "missing marker {marker}");
    }
}

#[test]
fn hard_expired_entry_is_not_served() {
    let h = harness(small_config());
    h.cache.put("a", CacheEntry::with_ttl("old", Duration::ZERO, Duration::ZERO));
    h.network.route("a", NetworkResponse::ok("new"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![ok("a", "new", ResponseSource::Network)]);
    assert!(req.has_marker("cache-hit-expired"));
}

#[test]
fn soft_expired_hit_delivers_twice() {
    let h = harness(small_config());
    h.cache.put("a", CacheEntry::with_ttl("stale", Duration::ZERO, Duration::from_secs(60)));
    h.network.route("a", NetworkResponse::ok("fresh"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(
        h.delivery.events(),
        vec![
            Event::Result {
                url: "a".into(),
                data: "stale".into(),
                source: ResponseSource::Cache,
                intermediate: true,
            },
            ok("a", "fresh", ResponseSource::Network),
        ]
    );
    assert_eq!(done_count(&req), 1);
}

#[test]
fn not_modified_after_delivery_is_not_redelivered() {
    let h = harness(small_config());
    h.cache.put("a", CacheEntry::with_ttl("stale", Duration::ZERO, Duration::from_secs(60)));
    h.network.route("a", NetworkResponse::not_modified());
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events().len(), 1);
    assert!(req.has_marker("not-modified"));
    assert_eq!(done_count(&req), 1);
}

#[test]
fn not_modified_without_prior_delivery_is_delivered() {
    let h = harness(small_config());
    h.network.route("a", NetworkResponse::not_modified());
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![ok("a", "", ResponseSource::Network)]);
    assert!(!req.has_marker("not-modified"));
}

#[test]
fn duplicates_share_one_network_fetch() {
    let h = harness(small_config());
    h.network.route("a", NetworkResponse::ok("body"));

    let requests: Vec<_> = (0..5)
        .map(|_| h.queue.add(Request::builder("a").build()).unwrap())
        .collect();
    h.queue.start().unwrap();

    assert!(wait_until(|| h.queue.in_flight_count() == 0));
    assert_eq!(h.network.calls("a"), 1);

    let events = h.delivery.events();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0], ok("a", "body", ResponseSource::Network));
    assert!(events[1..].iter().all(|e| *e == ok("a", "body", ResponseSource::Cache)));
    assert!(requests.iter().all(|r| done_count(r) == 1));
}

#[test]
fn failed_fetch_still_releases_staged_requests() {
    let h = harness(small_config());
    h.network.fail("a", FetchError::Timeout);

    for _ in 0..3 {
        h.queue.add(Request::builder("a").build()).unwrap();
    }
    h.queue.start().unwrap();

    assert!(wait_until(|| h.queue.in_flight_count() == 0));
    // Nothing was cached, so each released request retries the network.
    assert_eq!(h.network.calls("a"), 3);
    assert_eq!(
        h.delivery.events(),
        vec![Event::Error { url: "a".into(), kind: "timeout" }; 3]
    );
    assert!(h.queue.waiting_keys().is_empty());
}

#[test]
fn cancelling_in_flight_request_releases_duplicates() {
    let cache = Arc::new(MemoryCache::new());
    let network = Arc::new(GatedNetwork::default());
    network.inner.route("a", NetworkResponse::ok("body"));
    let delivery = Arc::new(Recording::default());
    let queue = RequestQueue::with_config(cache.clone(), network.clone(), delivery.clone(), small_config());
    queue.start().unwrap();

    let first = queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| network.entered.load(Ordering::SeqCst) == 1));

    let second = queue.add(Request::builder("a").build()).unwrap();
    let third = queue.add(Request::builder("a").build()).unwrap();
    assert_eq!(queue.staged_count("a"), Some(2));

    first.cancel();
    network.release();

    assert!(wait_until(|| queue.in_flight_count() == 0));
    assert_eq!(network.entered.load(Ordering::SeqCst), 1);
    assert_eq!(
        delivery.events(),
        vec![ok("a", "body", ResponseSource::Cache), ok("a", "body", ResponseSource::Cache)]
    );
    assert!(!first.has_had_response_delivered());
    assert!(first.has_marker("network-discard-cancelled"));
    assert!(second.has_had_response_delivered());
    assert!(third.has_had_response_delivered());
    assert_eq!(done_count(&first), 1);
}

#[test]
fn request_cancelled_while_queued_is_discarded() {
    let h = harness(small_config());
    h.network.route("a", NetworkResponse::ok("body"));

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    req.cancel();
    h.queue.start().unwrap();

    assert!(wait_until(|| !h.queue.is_in_flight(&req)));
    assert!(h.delivery.events().is_empty());
    assert_eq!(h.network.total_calls(), 0);
    assert!(req.has_marker("cache-discard-canceled"));
    assert_eq!(done_count(&req), 1);
    assert!(h.queue.waiting_keys().is_empty());
}

#[test]
fn cancel_notification_is_posted_once_when_enabled() {
    let h = harness(RequestQueueConfig {
        notify_cancelled: true,
        ..small_config()
    });

    let req = h
        .queue
        .add(Request::builder("a").local(true).should_cache(false).build())
        .unwrap();
    req.cancel();
    h.queue.start().unwrap();

    assert!(wait_until(|| !h.queue.is_in_flight(&req)
        && req.has_marker("local-discard-canceled")));
    assert_eq!(h.delivery.events(), vec![Event::Cancel { url: "a".into() }]);
    assert_eq!(done_count(&req), 1);
}

#[test]
fn local_only_hit_never_touches_network() {
    let local = Arc::new(MemoryLocalSource::new());
    local.insert("a", "from-disk");
    let h = harness_with(small_config(), Some(local));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").local(true).network(false).build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![ok("a", "from-disk", ResponseSource::Local)]);
    assert_eq!(h.network.total_calls(), 0);
    assert!(req.has_marker("local-complete"));
}

#[test]
fn local_only_miss_reports_error() {
    let h = harness_with(small_config(), Some(Arc::new(MemoryLocalSource::new())));
    h.network.route("a", NetworkResponse::ok("remote"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").local(true).network(false).build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![Event::Error { url: "a".into(), kind: "local_miss" }]);
    assert_eq!(h.network.total_calls(), 0);
}

#[test]
fn local_only_miss_can_forward_to_network() {
    let h = harness_with(
        RequestQueueConfig {
            local_miss_to_network: true,
            ..small_config()
        },
        Some(Arc::new(MemoryLocalSource::new())),
    );
    h.network.route("a", NetworkResponse::ok("remote"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").local(true).network(false).build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    assert_eq!(h.delivery.events(), vec![ok("a", "remote", ResponseSource::Network)]);
    assert!(req.has_marker("local-miss"));
    assert_eq!(done_count(&req), 1);
}

#[test]
fn local_and_network_both_deliver_but_finish_once() {
    let local = Arc::new(MemoryLocalSource::new());
    local.insert("a", "local");
    let h = harness_with(small_config(), Some(local));
    h.network.route("a", NetworkResponse::ok("remote"));
    h.queue.start().unwrap();

    let req = h
        .queue
        .add(Request::builder("a").local(true).should_cache(false).build())
        .unwrap();
    assert!(wait_until(|| h.delivery.events().len() == 2 && !h.queue.is_in_flight(&req)));

    let mut events = h.delivery.events();
    events.sort_by_key(|e| format!("{e:?}"));
    let mut expected = vec![
        ok("a", "local", ResponseSource::Local),
        ok("a", "remote", ResponseSource::Network),
    ];
    expected.sort_by_key(|e| format!("{e:?}"));
    assert_eq!(events, expected);
    assert_eq!(done_count(&req), 1);
}

#[test]
fn local_miss_with_network_leg_defers_to_network() {
    let h = harness_with(small_config(), Some(Arc::new(MemoryLocalSource::new())));
    h.network.route("a", NetworkResponse::ok("remote"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").local(true).build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req) && req.has_marker("local-miss")));

    assert_eq!(h.delivery.for_url("a"), vec![ok("a", "remote", ResponseSource::Network)]);
    assert_eq!(done_count(&req), 1);
}

#[test]
fn panicking_network_reports_error_and_releases_staged_requests() {
    let network = Arc::new(FlakyNetwork::default());
    network.inner.route("a", NetworkResponse::ok("body"));
    let delivery = Arc::new(Recording::default());
    let queue = RequestQueue::with_config(
        Arc::new(MemoryCache::new()),
        network.clone(),
        delivery.clone(),
        small_config(),
    );

    let first = queue.add(Request::builder("a").build()).unwrap();
    let second = queue.add(Request::builder("a").build()).unwrap();
    assert_eq!(queue.staged_count("a"), Some(1));
    queue.start().unwrap();

    assert!(wait_until(|| queue.in_flight_count() == 0));
    assert_eq!(
        delivery.events(),
        vec![
            Event::Error { url: "a".into(), kind: "panicked" },
            ok("a", "body", ResponseSource::Network),
        ]
    );
    assert_eq!(done_count(&first), 1);
    assert_eq!(done_count(&second), 1);
    assert!(queue.waiting_keys().is_empty());
    assert!(all_running(&queue));

    // The key is usable again and now served from cache.
    let third = queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !queue.is_in_flight(&third)));
    assert_eq!(delivery.for_url("a").last(), Some(&ok("a", "body", ResponseSource::Cache)));
}

#[test]
fn panicking_local_source_is_reported_as_error() {
    let delivery = Arc::new(Recording::default());
    let queue = RequestQueue::with_config(
        Arc::new(MemoryCache::new()),
        Arc::new(StaticNetwork::new()),
        delivery.clone(),
        small_config(),
    )
    .with_local_source(Arc::new(BrokenLocalSource));
    queue.start().unwrap();

    let req = queue.add(Request::builder("a").local(true).network(false).build()).unwrap();
    assert!(wait_until(|| !queue.is_in_flight(&req)));

    assert_eq!(delivery.events(), vec![Event::Error { url: "a".into(), kind: "panicked" }]);
    assert!(all_running(&queue));
}

#[test]
fn panicking_listener_does_not_strand_the_key() {
    let cache = Arc::new(MemoryCache::new());
    let network = Arc::new(StaticNetwork::new());
    network.route("a", NetworkResponse::ok("body"));
    let queue = RequestQueue::with_config(cache.clone(), network.clone(), Arc::new(InlineDelivery), small_config());

    let listener = Arc::new(PanickyListener::default());
    let requests: Vec<_> = (0..3)
        .map(|_| queue.add(Request::builder("a").listener(listener.clone()).build()).unwrap())
        .collect();
    queue.start().unwrap();

    assert!(wait_until(|| queue.in_flight_count() == 0));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 3);
    assert_eq!(network.calls("a"), 1);
    assert!(cache.contains("a"));
    assert!(requests.iter().all(|r| done_count(r) == 1 && r.has_marker("dispatch-panicked")));
    assert!(queue.waiting_keys().is_empty());
    assert!(all_running(&queue));
}

#[test]
fn unbounded_cache_lifetime_is_stored_and_served() {
    let h = harness(small_config());
    h.network.route(
        "a",
        NetworkResponse::ok("body").with_cache(CacheDirective::Ttl {
            soft: Duration::MAX,
            hard: Duration::MAX,
        }),
    );
    h.queue.start().unwrap();

    let first = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&first)));
    let second = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&second)));

    assert_eq!(
        h.delivery.events(),
        vec![ok("a", "body", ResponseSource::Network), ok("a", "body", ResponseSource::Cache)]
    );
    assert_eq!(h.network.calls("a"), 1);
    assert!(all_running(&h.queue));
}

#[test]
fn cancel_sweeps_racing_completions_finish_each_request_once() {
    const KEYS: usize = 4;
    const PER_KEY: usize = 50;
    const SWEEPERS: usize = 3;

    let network = Arc::new(StaticNetwork::with_latency(Duration::from_micros(200)));
    for key in 0..KEYS {
        network.route(format!("k{key}"), NetworkResponse::ok("body"));
    }
    let delivery = Arc::new(Recording::default());
    let queue = Arc::new(RequestQueue::with_config(
        Arc::new(MemoryCache::new()),
        network,
        delivery.clone(),
        RequestQueueConfig { network_threads: 4, ..small_config() },
    ));
    queue.start().unwrap();

    let sweeping = Arc::new(AtomicBool::new(true));
    let sweepers: Vec<_> = (0..SWEEPERS)
        .map(|_| {
            let queue = queue.clone();
            let sweeping = sweeping.clone();
            thread::spawn(move || {
                while sweeping.load(Ordering::SeqCst) {
                    queue.cancel_all(|_| true);
                    thread::yield_now();
                }
            })
        })
        .collect();

    let mut requests = Vec::with_capacity(KEYS * PER_KEY);
    for round in 0..PER_KEY {
        for key in 0..KEYS {
            requests.push(queue.add(Request::builder(format!("k{key}")).build()).unwrap());
        }
        if round % 10 == 0 {
            thread::sleep(Duration::from_micros(300));
        }
    }

    assert!(wait_until(|| queue.in_flight_count() == 0));
    sweeping.store(false, Ordering::SeqCst);
    for sweeper in sweepers {
        sweeper.join().unwrap();
    }

    assert!(queue.waiting_keys().is_empty());
    let mut posted = 0;
    for request in &requests {
        assert_eq!(done_count(request), 1, "request {} finished {} times", request.url(), done_count(request));
        let delivered = request.has_marker("post-response");
        let discarded = request.has_marker("cache-discard-canceled")
            || request.has_marker("network-discard-cancelled");
        assert!(!(delivered && discarded), "cancelled request {} was delivered", request.id());
        if delivered {
            posted += 1;
        }
    }
    let results = delivery
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Result { .. }))
        .count();
    assert_eq!(results, posted);
    assert!(all_running(&queue));
}

#[test]
fn dispatchers_run_on_named_threads() {
    let h = harness(small_config());
    h.network.route("a", NetworkResponse::ok("x"));
    h.queue.start().unwrap();

    let req = h.queue.add(Request::builder("a").build()).unwrap();
    assert!(wait_until(|| !h.queue.is_in_flight(&req)));

    let markers = req.markers();
    let thread_of = |name: &str| {
        markers
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.thread.clone())
            .unwrap_or_default()
    };
    assert_eq!(thread_of("cache-queue-take"), "test-cache");
    assert!(thread_of("network-queue-take").starts_with("test-network-"));
}

#[test]
fn dispatcher_state_follows_lifecycle() {
    let shared = Arc::new(QueueShared::new());
    let context = DispatchContext {
        shared: shared.clone(),
        cache: Arc::new(MemoryCache::new()),
        network: Arc::new(StaticNetwork::new()),
        local: None,
        delivery: Arc::new(Recording::default()),
        notify_cancelled: false,
        local_miss_to_network: false,
    };

    let mut dispatcher = Dispatcher::spawn(QueueKind::Local, "lifecycle".into(), context).unwrap();
    assert_eq!(dispatcher.kind(), QueueKind::Local);
    assert_eq!(dispatcher.name(), "lifecycle");
    assert!(wait_until(|| dispatcher.state() == DispatcherState::Running));

    dispatcher.quit();
    assert_ne!(dispatcher.state(), DispatcherState::Running);
    dispatcher.join();
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);

    // Joining again is a no-op.
    dispatcher.join();
}

#[test]
fn quit_before_thread_runs_still_stops() {
    let shared = Arc::new(QueueShared::new());
    let context = DispatchContext {
        shared,
        cache: Arc::new(MemoryCache::new()),
        network: Arc::new(StaticNetwork::new()),
        local: None,
        delivery: Arc::new(Recording::default()),
        notify_cancelled: false,
        local_miss_to_network: false,
    };

    let mut dispatcher = Dispatcher::spawn(QueueKind::Cache, "early".into(), context).unwrap();
    dispatcher.quit();
    dispatcher.join();
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}

#[test]
fn dispatcher_state_from_raw() {
    assert_eq!(DispatcherState::from(0), DispatcherState::Created);
    assert_eq!(DispatcherState::from(1), DispatcherState::Running);
    assert_eq!(DispatcherState::from(2), DispatcherState::QuitRequested);
    assert_eq!(DispatcherState::from(9), DispatcherState::Stopped);
}
