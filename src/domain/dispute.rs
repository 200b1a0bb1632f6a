use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    ResolvedClient,
    ResolvedProvider,
    Closed,
}

impl DisputeStatus {
    pub fn is_settled(self) -> bool {
        !matches!(self, DisputeStatus::Open)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DisputeSide {
    Client,
    Provider,
}

/// A dispute raised by either party against a booking.
///
/// At most one per booking; opening one forces the booking into the
/// `Disputed` status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub initiator_id: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Dispute {
    pub fn new(booking_id: Uuid, initiator_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            initiator_id,
            reason: reason.into(),
            status: DisputeStatus::Open,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }
}
