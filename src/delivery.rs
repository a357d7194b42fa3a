//! Completion delivery onto a caller-chosen execution context.
//!
//! Dispatchers call a [`Delivery`] from their worker threads. The delivery
//! decides where the request's [`RequestListener`] runs: inline on the worker
//! ([`InlineDelivery`]) or on whatever task drains a [`CompletionContext`]
//! ([`ChannelDelivery`]).

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::FetchError;
use crate::fetch::Response;
use crate::request::Request;

/// Callbacks owned by a request, invoked on the completion context.
pub trait RequestListener: Send + Sync {
    fn on_response(&self, request: &Request, response: &Response);
    fn on_error(&self, request: &Request, error: &FetchError);
    fn on_cancel(&self, _request: &Request) {}
}

/// Hands finished requests to their completion context.
pub trait Delivery: Send + Sync {
    fn post_result(&self, request: Arc<Request>, response: Response);
    fn post_error(&self, request: Arc<Request>, error: FetchError);
    fn post_cancel(&self, request: Arc<Request>);
}

/// What happened to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Response(Response),
    Error(FetchError),
    Cancelled,
}

/// A request paired with its outcome, waiting to run its callbacks.
#[derive(Debug)]
pub struct Completion {
    pub request: Arc<Request>,
    pub outcome: Outcome,
}

impl Completion {
    /// Run the listener callback for this outcome.
    ///
    /// Returns false without invoking anything when the request was cancelled
    /// after its result was posted.
    pub fn dispatch(self) -> bool {
        let Completion { request, outcome } = self;
        if request.is_cancelled() && outcome != Outcome::Cancelled {
            request.add_marker("canceled-at-delivery");
            return false;
        }
        let Some(listener) = request.listener() else {
            return true;
        };
        match &outcome {
            Outcome::Response(response) => listener.on_response(&request, response),
            Outcome::Error(error) => listener.on_error(&request, error),
            Outcome::Cancelled => listener.on_cancel(&request),
        }
        true
    }
}

/// Runs listener callbacks directly on the dispatcher thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDelivery;

impl Delivery for InlineDelivery {
    fn post_result(&self, request: Arc<Request>, response: Response) {
        Completion { request, outcome: Outcome::Response(response) }.dispatch();
    }

    fn post_error(&self, request: Arc<Request>, error: FetchError) {
        Completion { request, outcome: Outcome::Error(error) }.dispatch();
    }

    fn post_cancel(&self, request: Arc<Request>) {
        Completion { request, outcome: Outcome::Cancelled }.dispatch();
    }
}

/// Posts completions onto a channel drained by a [`CompletionContext`].
#[derive(Clone)]
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<Completion>,
}

impl fmt::Debug for ChannelDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDelivery")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl ChannelDelivery {
    fn send(&self, completion: Completion) {
        if let Err(mpsc::error::SendError(completion)) = self.tx.send(completion) {
            tracing::debug!(
                request_id = %completion.request.id(),
                "completion context closed, dropping delivery"
            );
        }
    }
}

impl Delivery for ChannelDelivery {
    fn post_result(&self, request: Arc<Request>, response: Response) {
        self.send(Completion { request, outcome: Outcome::Response(response) });
    }

    fn post_error(&self, request: Arc<Request>, error: FetchError) {
        self.send(Completion { request, outcome: Outcome::Error(error) });
    }

    fn post_cancel(&self, request: Arc<Request>) {
        self.send(Completion { request, outcome: Outcome::Cancelled });
    }
}

/// Receiving end of a [`ChannelDelivery`]: the thread or task that drains it
/// is where listener callbacks run.
pub struct CompletionContext {
    rx: mpsc::UnboundedReceiver<Completion>,
    dispatched: u64,
}

/// Create a connected delivery and completion context.
pub fn channel() -> (ChannelDelivery, CompletionContext) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelDelivery { tx }, CompletionContext { rx, dispatched: 0 })
}

impl CompletionContext {
    /// Dispatch completions until every sender is dropped.
    /// Returns the number of callbacks that ran.
    pub async fn run(mut self) -> u64 {
        while let Some(completion) = self.rx.recv().await {
            if completion.dispatch() {
                self.dispatched += 1;
            }
        }
        self.dispatched
    }

    /// Dispatch whatever is queued right now without waiting.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(completion) = self.rx.try_recv() {
            if completion.dispatch() {
                ran += 1;
            }
        }
        self.dispatched += ran as u64;
        ran
    }

    /// Receive the next completion without dispatching it.
    pub async fn recv(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Total callbacks run through this context.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}
