use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::gig::Gig;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Disputed,
}

impl BookingStatus {
    /// The party-driven transition table.
    ///
    /// `Disputed` is additionally reachable from `InProgress` and
    /// `Completed` through the dispute subsystem, which holds its own
    /// narrower authority and does not go through this table.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Disputed)
        )
    }

    /// Whether a booking in this status may still be cancelled by a party.
    pub fn cancellable(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Disputed => "disputed",
        }
    }
}

/// A client's booking of a gig.
///
/// `total_price` is snapshotted from the gig at creation and immutable
/// thereafter. Bookings are never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub client_id: Uuid,
    /// The gig owner, denormalized at creation so authorization checks do
    /// not need a gig lookup.
    pub provider_id: Uuid,
    pub status: BookingStatus,
    pub scheduled_at: DateTime<Utc>,
    pub address: String,
    pub notes: Option<String>,
    pub total_price: Decimal,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        client_id: Uuid,
        gig: &Gig,
        scheduled_at: DateTime<Utc>,
        address: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            gig_id: gig.id,
            client_id,
            provider_id: gig.provider_id,
            status: BookingStatus::Pending,
            scheduled_at,
            address: address.into(),
            notes,
            total_price: gig.base_price,
            cancel_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `actor` is one of the two parties to this booking.
    pub fn is_party(&self, actor: Uuid) -> bool {
        actor == self.client_id || actor == self.provider_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn test_transition_table_allows_only_listed_edges() {
        let all = [Pending, Accepted, InProgress, Completed, Cancelled, Disputed];
        let allowed = [
            (Pending, Accepted),
            (Pending, Cancelled),
            (Accepted, InProgress),
            (Accepted, Cancelled),
            (InProgress, Completed),
            (InProgress, Disputed),
        ];

        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        let all = [Pending, Accepted, InProgress, Completed, Cancelled, Disputed];
        for terminal in [Completed, Cancelled, Disputed] {
            for to in all {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_cancellable_window() {
        assert!(Pending.cancellable());
        assert!(Accepted.cancellable());
        assert!(!InProgress.cancellable());
        assert!(!Completed.cancellable());
        assert!(!Cancelled.cancellable());
        assert!(!Disputed.cancellable());
    }
}
