use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::domain::booking::BookingStatus;
use crate::domain::dispute::{Dispute, DisputeSide, DisputeStatus};
use crate::domain::ports::{SharedNotifier, SharedStore};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::gateway::GatewayClient;
use crate::error::{MarketError, Result};

/// Booking statuses from which a dispute may be opened.
const DISPUTABLE: [BookingStatus; 2] = [BookingStatus::InProgress, BookingStatus::Completed];

/// Outcome of a refund request. Money moves manually at the gateway, so
/// the refund transaction stays pending and wallets are untouched until
/// an explicit reconciliation step.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub reference: String,
}

/// Coordinates disputes and the refunds they trigger.
///
/// Disputes hold the only authority to move a booking into `Disputed`;
/// the party-driven transition table never grants it.
pub struct DisputeService {
    store: SharedStore,
    notifier: SharedNotifier,
    gateway: GatewayClient,
}

impl DisputeService {
    pub fn new(store: SharedStore, notifier: SharedNotifier, gateway: GatewayClient) -> Self {
        Self {
            store,
            notifier,
            gateway,
        }
    }

    /// Opens a dispute on an in-progress or completed booking. One per
    /// booking; opening forces the booking into `Disputed`.
    pub async fn open_dispute(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<Dispute> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("booking {booking_id}")))?;

        if !booking.is_party(actor_id) {
            return Err(MarketError::Forbidden(
                "only the client or the provider may open a dispute".to_string(),
            ));
        }
        // Uniqueness before the status check: a second complaint about an
        // already-disputed booking reports the existing dispute, not the
        // disputed status it caused.
        if self.store.dispute_for_booking(booking_id).await?.is_some() {
            return Err(MarketError::InvalidState(
                "a dispute already exists for this booking".to_string(),
            ));
        }
        if !DISPUTABLE.contains(&booking.status) {
            return Err(MarketError::InvalidState(format!(
                "cannot dispute a booking that is {}",
                booking.status.as_str()
            )));
        }

        let dispute = Dispute::new(booking_id, actor_id, reason);
        if !self.store.open_dispute(dispute.clone(), &DISPUTABLE).await? {
            return Err(MarketError::InvalidState(
                "a dispute already exists for this booking".to_string(),
            ));
        }

        self.notify(
            "booking.disputed",
            json!({ "booking_id": booking_id, "dispute_id": dispute.id, "initiator": actor_id }),
        )
        .await;

        Ok(dispute)
    }

    /// Resolves an open dispute in favor of one side.
    ///
    /// Resolving for the client requests a refund; a refund failure is
    /// logged and swallowed so the resolution record is always durable.
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        admin_id: Uuid,
        resolution: impl Into<String>,
        favor_of: DisputeSide,
    ) -> Result<Dispute> {
        let dispute = self
            .store
            .dispute(dispute_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("dispute {dispute_id}")))?;

        if dispute.status.is_settled() {
            return Err(MarketError::InvalidState(
                "dispute is already resolved".to_string(),
            ));
        }

        let status = match favor_of {
            DisputeSide::Client => DisputeStatus::ResolvedClient,
            DisputeSide::Provider => DisputeStatus::ResolvedProvider,
        };
        let resolved = self
            .store
            .resolve_dispute(dispute_id, status, resolution.into(), admin_id, Utc::now())
            .await?
            .ok_or_else(|| {
                MarketError::InvalidState("dispute is already resolved".to_string())
            })?;

        if favor_of == DisputeSide::Client
            && let Err(e) = self.refund_booking(dispute.booking_id, admin_id).await
        {
            tracing::warn!(
                dispute_id = %dispute_id,
                booking_id = %dispute.booking_id,
                error = %e,
                "refund failed during dispute resolution; resolution kept"
            );
        }

        self.notify(
            "dispute.resolved",
            json!({ "dispute_id": dispute_id, "favor_of": status, "admin_id": admin_id }),
        )
        .await;

        Ok(resolved)
    }

    /// Records a refund for a paid booking.
    ///
    /// Creates the pending refund transaction and hands the order to the
    /// gateway's manual queue. Wallet balances are deliberately untouched:
    /// settlement is out-of-band.
    pub async fn refund_booking(&self, booking_id: Uuid, admin_id: Uuid) -> Result<RefundOutcome> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("booking {booking_id}")))?;

        let charge = self
            .store
            .charge_for_booking(booking_id)
            .await?
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .ok_or_else(|| {
                MarketError::InvalidState(
                    "no completed payment to refund for this booking".to_string(),
                )
            })?;

        let refund = Transaction::refund(booking_id, booking.client_id, charge.amount);
        if !self.store.insert_refund(refund).await? {
            return Err(MarketError::InvalidState(
                "a refund already exists for this booking".to_string(),
            ));
        }

        let order_ref = charge.order_id.as_deref().unwrap_or("unknown");
        let ticket = self.gateway.refund(order_ref, charge.amount);

        self.notify(
            "refund.requested",
            json!({
                "booking_id": booking_id,
                "amount": charge.amount,
                "reference": ticket.reference,
                "admin_id": admin_id,
            }),
        )
        .await;

        Ok(RefundOutcome {
            status: TransactionStatus::Pending,
            amount: charge.amount,
            reference: ticket.reference,
        })
    }

    async fn notify(&self, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.notifier.enqueue(event, payload).await {
            tracing::warn!(event, error = %e, "notification enqueue failed");
        }
    }
}
