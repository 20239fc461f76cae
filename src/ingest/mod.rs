//! Vital ingestion
//!
//! Transports (the HTTP API, the CLI through it) validate and hand readings
//! to `VitalService`, which stores them and publishes them on the event bus.

pub mod service;

pub use service::{IngestError, VitalService};
