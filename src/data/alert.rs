//! Alert records raised for abnormal vitals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vital::Vital;

/// Lifecycle status of an alert
///
/// Only `Active` is produced by the alerting pipeline; the other variants
/// exist so stored records can carry them through the API unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    #[default]
    Active,
    AutoResolved,
    ResolvedByRetake,
    ConfirmedAbnormal,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::AutoResolved => "AUTO_RESOLVED",
            AlertStatus::ResolvedByRetake => "RESOLVED_BY_RETAKE",
            AlertStatus::ConfirmedAbnormal => "CONFIRMED_ABNORMAL",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert definition
///
/// Vital fields are copied so an alert renders on its own even if the
/// originating reading is no longer at hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned by storage; zero until stored
    pub id: u64,
    pub vital_id: u64,
    pub patient_id: String,
    pub systolic: i32,
    pub diastolic: i32,
    pub taken_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Build an active alert for `vital`
    pub fn from_vital(vital: &Vital, reason: impl Into<String>) -> Self {
        Self {
            id: 0,
            vital_id: vital.id,
            patient_id: vital.patient_id.clone(),
            systolic: vital.systolic,
            diastolic: vital.diastolic,
            taken_at: vital.taken_at,
            received_at: vital.received_at,
            reason: reason.into(),
            status: AlertStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Override the status
    pub fn with_status(mut self, status: AlertStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vital::alert_reason;

    #[test]
    fn test_alert_copies_vital_fields() {
        let vital = Vital::new("p1", 200, 130, Utc::now())
            .with_id(7)
            .with_received_at(Utc::now());
        let alert = Alert::from_vital(&vital, alert_reason(&vital));

        assert_eq!(alert.id, 0);
        assert_eq!(alert.vital_id, 7);
        assert_eq!(alert.patient_id, "p1");
        assert_eq!(alert.systolic, 200);
        assert_eq!(alert.diastolic, 130);
        assert_eq!(alert.taken_at, vital.taken_at);
        assert_eq!(alert.received_at, vital.received_at);
        assert_eq!(alert.status, AlertStatus::Active);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(AlertStatus::Active.to_string(), "ACTIVE");
        assert_eq!(AlertStatus::AutoResolved.to_string(), "AUTO_RESOLVED");
        assert_eq!(AlertStatus::ResolvedByRetake.to_string(), "RESOLVED_BY_RETAKE");
        assert_eq!(AlertStatus::ConfirmedAbnormal.to_string(), "CONFIRMED_ABNORMAL");
        assert_eq!(
            serde_json::to_value(AlertStatus::ResolvedByRetake).unwrap(),
            "RESOLVED_BY_RETAKE"
        );
    }
}
