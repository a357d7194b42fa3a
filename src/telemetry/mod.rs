//! Telemetry for the relay queue.
//!
//! Structured logging via `tracing` and counters via the `metrics` facade.
//! No exporter is installed here; hosts pick their own recorder.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_admission, record_cancelled, record_dispatch, record_finished, record_in_flight,
    record_released, record_staged,
};
