//! Thread-safe blocking priority queue feeding one kind of dispatcher.
//!
//! Many producers push; dispatchers block in `pop_blocking` until an item
//! arrives or their quit token fires. The quit check happens under the queue
//! lock and `wake_all` takes the same lock before notifying, so a quit can
//! never slip in between the check and the wait.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::priority::PriorityQueue;
use crate::request::Request;

/// The three staging queues, which double as dispatcher kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Cache,
    Network,
    Local,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unbounded blocking queue ordered by (priority desc, sequence asc).
pub struct DispatchQueue {
    kind: QueueKind,
    inner: Mutex<PriorityQueue<Arc<Request>>>,
    available: Condvar,
}

impl DispatchQueue {
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(PriorityQueue::new()),
            available: Condvar::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn push(&self, request: Arc<Request>) {
        let priority = request.priority();
        let sequence = request.sequence().unwrap_or_default();
        self.inner.lock().push(request, priority, sequence);
        self.available.notify_one();
    }

    /// Push a batch under one lock acquisition. Returns how many were pushed.
    pub fn push_all<I>(&self, requests: I) -> usize
    where
        I: IntoIterator<Item = Arc<Request>>,
    {
        let mut queue = self.inner.lock();
        let mut pushed = 0;
        for request in requests {
            let priority = request.priority();
            let sequence = request.sequence().unwrap_or_default();
            queue.push(request, priority, sequence);
            pushed += 1;
        }
        drop(queue);
        if pushed > 0 {
            self.available.notify_all();
        }
        pushed
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<Arc<Request>> {
        self.inner.lock().pop()
    }

    /// Block until an item is available. Returns `None` once `quit` fires,
    /// leaving any remaining items queued.
    pub fn pop_blocking(&self, quit: &CancellationToken) -> Option<Arc<Request>> {
        let mut queue = self.inner.lock();
        loop {
            if quit.is_cancelled() {
                return None;
            }
            if let Some(request) = queue.pop() {
                return Some(request);
            }
            self.available.wait(&mut queue);
        }
    }

    /// Wake every blocked consumer so it re-checks its quit token.
    pub fn wake_all(&self) {
        let _guard = self.inner.lock();
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// True if this exact request object is currently queued.
    pub fn contains(&self, request: &Request) -> bool {
        self.inner
            .lock()
            .iter()
            .any(|queued| std::ptr::eq(Arc::as_ptr(queued), request))
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}
