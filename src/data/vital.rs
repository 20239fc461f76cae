//! Vital readings and the events that carry them onto the bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Systolic readings above this are abnormal
pub const MAX_SYSTOLIC: i32 = 180;
/// Diastolic readings above this are abnormal
pub const MAX_DIASTOLIC: i32 = 120;

/// One blood-pressure reading for a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vital {
    /// Assigned by storage; zero until stored
    pub id: u64,
    pub patient_id: String,
    pub systolic: i32,
    pub diastolic: i32,
    /// When the reading was taken on the device
    pub taken_at: DateTime<Utc>,
    /// When the reading reached us
    pub received_at: Option<DateTime<Utc>>,
}

impl Vital {
    /// Create an unstored vital
    pub fn new(
        patient_id: impl Into<String>,
        systolic: i32,
        diastolic: i32,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            patient_id: patient_id.into(),
            systolic,
            diastolic,
            taken_at,
            received_at: None,
        }
    }

    /// Set the storage identifier
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Set the received timestamp
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    /// Whether either reading is above its limit
    pub fn is_abnormal(&self) -> bool {
        self.systolic > MAX_SYSTOLIC || self.diastolic > MAX_DIASTOLIC
    }
}

/// Human-readable reason attached to an alert raised for `vital`
pub fn alert_reason(vital: &Vital) -> String {
    format!(
        "abnormal blood pressure {}/{}",
        vital.systolic, vital.diastolic
    )
}

/// Event discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    VitalReceived,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::VitalReceived => "VITAL_RECEIVED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope delivered over the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub vital: Vital,
}

impl Event {
    pub fn vital_received(vital: Vital) -> Self {
        Self {
            kind: EventKind::VitalReceived,
            vital,
        }
    }
}
