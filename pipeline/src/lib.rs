//! Sensor telemetry pipeline: thermistor readings are normalized and gated
//! by a health registry, queued, batched per location, and aggregated into
//! per-minute series.

pub mod batching;
pub mod config;
pub mod errors;
pub mod forwarder;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod report;
pub mod storage;

pub use errors::{Error, Result};
