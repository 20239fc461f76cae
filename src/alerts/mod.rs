//! Alerting for abnormal vitals
//!
//! The alert worker consumes vital events from the bus, stores alerts for
//! abnormal readings and queues a notification for the patient.

pub mod worker;

pub use worker::AlertWorker;
