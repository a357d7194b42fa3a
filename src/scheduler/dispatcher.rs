//! Dispatcher worker threads.
//!
//! One loop shape serves all three queues. A dispatcher blocks on its queue,
//! skips cancelled requests, runs the operation for its [`QueueKind`], then
//! either re-routes the request or delivers the outcome and finishes it.
//!
//! Only the terminal leg of a request calls `finish`: the network leg always,
//! the cache leg on a fresh hit, the local leg when no network leg exists.
//!
//! A panicking collaborator is reported to the request as
//! [`FetchError::Panicked`] and the dispatcher keeps running.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;

use super::dispatch_queue::QueueKind;
use super::queue::QueueShared;
use crate::delivery::Delivery;
use crate::error::{FetchError, QueueError};
use crate::fetch::{Cache, LocalSource, Network, Response, ResponseSource};
use crate::request::Request;
use crate::telemetry;

/// Lifecycle of a dispatcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Created = 0,
    Running = 1,
    QuitRequested = 2,
    Stopped = 3,
}

impl From<u8> for DispatcherState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::QuitRequested,
            _ => Self::Stopped,
        }
    }
}

/// Everything a dispatcher loop needs, shared by all workers of one queue.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub shared: Arc<QueueShared>,
    pub cache: Arc<dyn Cache>,
    pub network: Arc<dyn Network>,
    pub local: Option<Arc<dyn LocalSource>>,
    pub delivery: Arc<dyn Delivery>,
    pub notify_cancelled: bool,
    pub local_miss_to_network: bool,
}

/// Handle to one running dispatcher thread.
pub struct Dispatcher {
    kind: QueueKind,
    name: String,
    state: Arc<AtomicU8>,
    quit: CancellationToken,
    shared: Arc<QueueShared>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Dispatcher {
    /// Spawn a named thread draining the queue for `kind`.
    pub(crate) fn spawn(
        kind: QueueKind,
        name: String,
        context: DispatchContext,
    ) -> Result<Self, QueueError> {
        let state = Arc::new(AtomicU8::new(DispatcherState::Created as u8));
        let quit = CancellationToken::new();
        let shared = context.shared.clone();

        let worker = Worker {
            kind,
            context,
            state: state.clone(),
            quit: quit.clone(),
        };
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run())
            .map_err(|e| QueueError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            kind,
            name,
            state,
            quit,
            shared,
            handle: Some(handle),
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from(self.state.load(Ordering::Acquire))
    }

    /// Ask the thread to exit. Work already popped runs to completion.
    pub fn quit(&self) {
        let _ = self.state.compare_exchange(
            DispatcherState::Created as u8,
            DispatcherState::QuitRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.state.compare_exchange(
            DispatcherState::Running as u8,
            DispatcherState::QuitRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.quit.cancel();
        self.shared.queue(self.kind).wake_all();
    }

    /// Wait for the thread to exit. Never joins the calling thread itself.
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!(dispatcher = %self.name, "dispatcher thread panicked");
            self.state.store(DispatcherState::Stopped as u8, Ordering::Release);
        }
    }
}

struct Worker {
    kind: QueueKind,
    context: DispatchContext,
    state: Arc<AtomicU8>,
    quit: CancellationToken,
}

/// Marks the dispatcher stopped when its thread leaves the loop, even by
/// unwinding.
struct StoppedOnExit<'a>(&'a AtomicU8);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(DispatcherState::Stopped as u8, Ordering::Release);
    }
}

impl Worker {
    fn run(self) {
        let _stopped = StoppedOnExit(&self.state);
        let _ = self.state.compare_exchange(
            DispatcherState::Created as u8,
            DispatcherState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        tracing::debug!(kind = %self.kind, "dispatcher started");

        let queue = self.context.shared.queue(self.kind);
        while let Some(request) = queue.pop_blocking(&self.quit) {
            request.add_marker(take_marker(self.kind));
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&request))) {
                Ok(outcome) => outcome,
                Err(payload) => {
                    self.recover(&request, payload);
                    "panicked"
                }
            };
            telemetry::record_dispatch(self.kind, outcome);
        }

        tracing::debug!(kind = %self.kind, "dispatcher stopped");
    }

    fn dispatch(&self, request: &Arc<Request>) -> &'static str {
        let request = request.clone();
        if request.is_cancelled() {
            self.discard(request);
            return "cancelled";
        }
        match self.kind {
            QueueKind::Cache => self.process_cache(request),
            QueueKind::Network => self.process_network(request),
            QueueKind::Local => self.process_local(request),
        }
    }

    /// A panic escaped delivery. Release the key if this leg owns it.
    fn recover(&self, request: &Arc<Request>, payload: Box<dyn Any + Send>) {
        tracing::error!(
            kind = %self.kind,
            request_id = %request.id(),
            panic = %panic_message(payload.as_ref()),
            "dispatcher recovered from panic"
        );
        request.add_marker("dispatch-panicked");
        if self.is_terminal(request) && self.context.shared.is_in_flight(request) {
            self.context.shared.finish(request);
        }
    }

    /// Whether this leg is the one that must call `finish`.
    fn is_terminal(&self, request: &Request) -> bool {
        match self.kind {
            QueueKind::Cache | QueueKind::Network => true,
            QueueKind::Local => !request.should_process_network(),
        }
    }

    fn discard(&self, request: Arc<Request>) {
        request.add_marker(discard_marker(self.kind));
        if self.is_terminal(&request) {
            if self.context.notify_cancelled {
                self.context.delivery.post_cancel(request.clone());
            }
            self.context.shared.finish(&request);
        }
    }

    fn process_cache(&self, request: Arc<Request>) -> &'static str {
        let ctx = &self.context;
        let entry = match guarded(|| ctx.cache.get(request.cache_key())) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::error!(request_id = %request.id(), error = %error, "cache lookup failed");
                self.complete(request, Err(error));
                return "panicked";
            }
        };
        let Some(entry) = entry else {
            request.add_marker("cache-miss");
            ctx.shared.queue(QueueKind::Network).push(request);
            return "miss";
        };

        if entry.is_expired() {
            request.add_marker("cache-hit-expired");
            ctx.shared.queue(QueueKind::Network).push(request);
            return "expired";
        }

        request.add_marker("cache-hit");
        let refresh_needed = entry.refresh_needed();
        let mut response = Response::new(entry.data, ResponseSource::Cache);
        if !refresh_needed {
            self.complete(request, Ok(response));
            return "hit";
        }

        // Soft-expired: serve what we have, then refresh from the network.
        request.add_marker("cache-hit-refresh-needed");
        response.intermediate = true;
        self.post(&request, Ok(response));
        ctx.shared.queue(QueueKind::Network).push(request);
        "refresh"
    }

    fn process_network(&self, request: Arc<Request>) -> &'static str {
        let ctx = &self.context;
        let response = match guarded(|| ctx.network.perform(&request)).and_then(|r| r) {
            Ok(response) => response,
            Err(error) => {
                let outcome = error.kind();
                tracing::debug!(request_id = %request.id(), error = %error, "network fetch failed");
                self.complete(request, Err(error));
                return outcome;
            }
        };
        request.add_marker("network-http-complete");

        if response.not_modified && request.has_had_response_delivered() {
            request.add_marker("not-modified");
            ctx.shared.finish(&request);
            return "not_modified";
        }

        if request.should_cache() {
            if let Some(entry) = response.cache_entry() {
                match guarded(|| ctx.cache.put(request.cache_key(), entry)) {
                    Ok(()) => request.add_marker("network-cache-written"),
                    Err(error) => {
                        tracing::warn!(request_id = %request.id(), error = %error, "cache write failed");
                    }
                }
            }
        }
        self.complete(request, Ok(response.into_response()));
        "ok"
    }

    fn process_local(&self, request: Arc<Request>) -> &'static str {
        let ctx = &self.context;
        let result = match &ctx.local {
            Some(local) => guarded(|| local.perform(&request)).and_then(|r| r),
            None => Ok(None),
        };
        let has_network_leg = request.should_process_network();

        match result {
            Ok(Some(response)) => {
                request.add_marker("local-complete");
                if has_network_leg {
                    self.post(&request, Ok(response));
                } else {
                    self.complete(request, Ok(response));
                }
                "ok"
            }
            Ok(None) => {
                request.add_marker("local-miss");
                if has_network_leg {
                    // The network leg will deliver.
                } else if ctx.local_miss_to_network {
                    ctx.shared.queue(QueueKind::Network).push(request);
                    return "forwarded";
                } else {
                    self.complete(request, Err(FetchError::LocalMiss));
                }
                "miss"
            }
            Err(error) => {
                if has_network_leg {
                    tracing::debug!(
                        request_id = %request.id(),
                        error = %error,
                        "local fetch failed, network leg pending"
                    );
                } else {
                    self.complete(request, Err(error));
                }
                "error"
            }
        }
    }

    /// Deliver and finish. Cancelled requests get no result delivery.
    fn complete(&self, request: Arc<Request>, result: Result<Response, FetchError>) {
        if !self.post(&request, result) && self.context.notify_cancelled {
            self.context.delivery.post_cancel(request.clone());
        }
        self.context.shared.finish(&request);
    }

    /// Hand a result to the delivery mechanism unless the request was
    /// cancelled. Returns whether anything was posted.
    fn post(&self, request: &Arc<Request>, result: Result<Response, FetchError>) -> bool {
        if request.is_cancelled() {
            request.add_marker(discard_marker(self.kind));
            return false;
        }
        let delivery = &self.context.delivery;
        match result {
            Ok(response) => {
                request.mark_delivered();
                request.add_marker("post-response");
                delivery.post_result(request.clone(), response);
            }
            Err(error) => {
                request.add_marker("post-error");
                delivery.post_error(request.clone(), error);
            }
        }
        true
    }
}

/// Run a collaborator call, turning a panic into [`FetchError::Panicked`].
fn guarded<T>(call: impl FnOnce() -> T) -> Result<T, FetchError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .map_err(|payload| FetchError::Panicked(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn take_marker(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Cache => "cache-queue-take",
        QueueKind::Network => "network-queue-take",
        QueueKind::Local => "local-queue-take",
    }
}

fn discard_marker(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Cache => "cache-discard-canceled",
        QueueKind::Network => "network-discard-cancelled",
        QueueKind::Local => "local-discard-canceled",
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
