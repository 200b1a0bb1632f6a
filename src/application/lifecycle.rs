use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::ports::{BookingUpdate, SharedNotifier, SharedStore};
use crate::error::{MarketError, Result};

/// Owns booking status and the role-gated transitions.
///
/// Cancellation and the party-driven transitions live here; the disputed
/// status is reachable only through the dispute coordinator.
pub struct LifecycleService {
    store: SharedStore,
    notifier: SharedNotifier,
}

impl LifecycleService {
    pub fn new(store: SharedStore, notifier: SharedNotifier) -> Self {
        Self { store, notifier }
    }

    /// Creates a pending booking, snapshotting the gig's current base
    /// price as the immutable total.
    pub async fn create_booking(
        &self,
        client_id: Uuid,
        gig_id: Uuid,
        scheduled_at: DateTime<Utc>,
        address: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Booking> {
        let gig = self
            .store
            .gig(gig_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("gig {gig_id}")))?;

        if !gig.active {
            return Err(MarketError::InvalidState(
                "gig is not active".to_string(),
            ));
        }
        if gig.provider_id == client_id {
            return Err(MarketError::Forbidden(
                "providers cannot book their own gig".to_string(),
            ));
        }

        let booking = Booking::new(client_id, &gig, scheduled_at, address, notes);
        self.store.put_booking(booking.clone()).await?;

        self.notify(
            "booking.created",
            json!({ "booking_id": booking.id, "client_id": client_id }),
        )
        .await;

        Ok(booking)
    }

    /// Drives a provider-side transition: accepted, in_progress or
    /// completed. Authorization is checked before the transition table, so
    /// a client poking at a provider action gets `Forbidden`, not
    /// `InvalidState`.
    pub async fn transition_booking(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        new_status: BookingStatus,
    ) -> Result<Booking> {
        let booking = self.load_booking(booking_id).await?;

        match new_status {
            BookingStatus::Accepted | BookingStatus::InProgress | BookingStatus::Completed => {}
            BookingStatus::Disputed => {
                return Err(MarketError::Forbidden(
                    "disputed is set by the dispute process, not by a party".to_string(),
                ));
            }
            BookingStatus::Pending | BookingStatus::Cancelled => {
                return Err(MarketError::InvalidState(format!(
                    "cannot transition a booking to {}",
                    new_status.as_str()
                )));
            }
        }

        if actor_id != booking.provider_id {
            return Err(MarketError::Forbidden(
                "only the booking's provider may drive this transition".to_string(),
            ));
        }
        if !booking.status.can_transition_to(new_status) {
            return Err(MarketError::InvalidState(format!(
                "cannot move booking from {} to {}",
                booking.status.as_str(),
                new_status.as_str()
            )));
        }

        let updated = self
            .store
            .update_booking_status(
                booking_id,
                &[booking.status],
                BookingUpdate::status(new_status),
            )
            .await?
            .ok_or_else(|| {
                MarketError::InvalidState(format!(
                    "booking left {} before the transition committed",
                    booking.status.as_str()
                ))
            })?;

        self.notify(
            &format!("booking.{}", new_status.as_str()),
            json!({ "booking_id": booking_id, "actor_id": actor_id }),
        )
        .await;

        Ok(updated)
    }

    /// Cancels a booking. Either party may cancel while the booking is
    /// still pending or accepted.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking> {
        let booking = self.load_booking(booking_id).await?;

        if !booking.is_party(actor_id) {
            return Err(MarketError::Forbidden(
                "only the client or the provider may cancel".to_string(),
            ));
        }
        if !booking.status.cancellable() {
            return Err(MarketError::InvalidState(format!(
                "cannot cancel a booking that is {}",
                booking.status.as_str()
            )));
        }

        let update = BookingUpdate {
            new_status: BookingStatus::Cancelled,
            cancel_reason: reason,
            cancelled_by: Some(actor_id),
        };
        let updated = self
            .store
            .update_booking_status(
                booking_id,
                &[BookingStatus::Pending, BookingStatus::Accepted],
                update,
            )
            .await?
            .ok_or_else(|| {
                MarketError::InvalidState(
                    "booking is no longer cancellable".to_string(),
                )
            })?;

        self.notify(
            "booking.cancelled",
            json!({ "booking_id": booking_id, "cancelled_by": actor_id }),
        )
        .await;

        Ok(updated)
    }

    async fn load_booking(&self, booking_id: Uuid) -> Result<Booking> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("booking {booking_id}")))
    }

    /// Fire-and-forget: a failed enqueue never rolls back a committed
    /// transition.
    async fn notify(&self, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.notifier.enqueue(event, payload).await {
            tracing::warn!(event, error = %e, "notification enqueue failed");
        }
    }
}
