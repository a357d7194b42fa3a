//! Relay Queue
//!
//! An in-process request dispatch queue. Requests are admitted once, routed
//! to a local, cache or network stage, and resolved by dedicated dispatcher
//! threads. Concurrent requests for the same cache key share one fetch.
//!
//! # Stages
//!
//! - **Cache**: one dispatcher triages against the [`fetch::Cache`]
//! - **Network**: a pool of dispatchers calls the [`fetch::Network`]
//! - **Local**: one dispatcher consults the optional [`fetch::LocalSource`]
//!
//! Outcomes are handed to a [`delivery::Delivery`], which decides on which
//! execution context the request's listener runs.

pub mod config;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod request;
pub mod scheduler;
pub mod telemetry;

pub use delivery::{ChannelDelivery, CompletionContext, Delivery, InlineDelivery, RequestListener};
pub use error::{FetchError, QueueError};
pub use request::{Request, RequestBuilder, RequestId, Tag};
pub use scheduler::{Priority, RequestQueue, RequestQueueConfig};
