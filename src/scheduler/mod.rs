//! Request scheduling for the relay queue.
//!
//! Manages admission, prioritization, in-flight deduplication and the
//! dispatcher thread pool.

mod dispatch_queue;
mod dispatcher;
mod priority;
mod queue;

pub use dispatch_queue::{DispatchQueue, QueueKind};
pub use dispatcher::{Dispatcher, DispatcherState};
pub use priority::{Priority, PriorityQueue};
pub use queue::{RequestQueue, RequestQueueConfig, Route, DEFAULT_NETWORK_THREADS};

pub(crate) use queue::QueueShared;
