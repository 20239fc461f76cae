pub mod alert;
pub mod vital;

pub use alert::{Alert, AlertStatus};
pub use vital::{alert_reason, Event, EventKind, Vital, MAX_DIASTOLIC, MAX_SYSTOLIC};
