use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::dispute::{Dispute, DisputeStatus};
use crate::domain::gig::Gig;
use crate::domain::money::Balance;
use crate::domain::payout::Payout;
use crate::domain::transaction::Transaction;
use crate::domain::wallet::Wallet;
use crate::error::Result;

/// Mutations applied together when a charge settles successfully: the
/// transaction completes, the booking is accepted and the provider's
/// escrow is credited. A store must commit all three or none.
#[derive(Debug, Clone)]
pub struct ChargeSettlement {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub net_credit: Balance,
    /// Raw callback payload, kept on the transaction for audit.
    pub metadata: serde_json::Value,
}

/// A guarded booking status update.
#[derive(Debug, Clone)]
pub struct BookingUpdate {
    pub new_status: BookingStatus,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
}

impl BookingUpdate {
    pub fn status(new_status: BookingStatus) -> Self {
        Self {
            new_status,
            cancel_reason: None,
            cancelled_by: None,
        }
    }
}

/// Persistence port for the marketplace engine.
///
/// Plain reads and writes carry no invariants. Every method documented as
/// *atomic* evaluates its guard and applies its writes inside a single
/// exclusive section, so the one-charge/one-refund invariants, callback
/// idempotency and wallet conservation hold under concurrent callers.
/// Those methods signal a failed guard through their return value rather
/// than an error; the application layer maps that to the right outcome.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn put_gig(&self, gig: Gig) -> Result<()>;
    async fn gig(&self, id: Uuid) -> Result<Option<Gig>>;

    async fn put_booking(&self, booking: Booking) -> Result<()>;
    async fn booking(&self, id: Uuid) -> Result<Option<Booking>>;

    async fn transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>>;
    /// The non-failed charge for a booking, if any.
    async fn charge_for_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>>;
    /// The non-failed refund for a booking, if any.
    async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>>;

    /// The provider's wallet; a zero wallet if none has been created yet.
    async fn wallet(&self, provider_id: Uuid) -> Result<Wallet>;
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;

    async fn payout(&self, id: Uuid) -> Result<Option<Payout>>;
    async fn dispute(&self, id: Uuid) -> Result<Option<Dispute>>;
    async fn dispute_for_booking(&self, booking_id: Uuid) -> Result<Option<Dispute>>;

    /// Atomic: updates the booking status only while its current status is
    /// in `allowed_from`. Returns the updated booking, or `None` if the
    /// guard failed.
    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        allowed_from: &[BookingStatus],
        update: BookingUpdate,
    ) -> Result<Option<Booking>>;

    /// Atomic: inserts a charge unless a non-failed charge already exists
    /// for the booking. Returns `false` if the guard failed.
    async fn insert_charge(&self, tx: Transaction) -> Result<bool>;

    /// Atomic: inserts a refund unless a non-failed refund already exists
    /// for the booking. Returns `false` if the guard failed.
    async fn insert_refund(&self, tx: Transaction) -> Result<bool>;

    /// Atomic: marks a pending charge as failed, attaching the raw payload
    /// when one is available. Returns `false` if the transaction is no
    /// longer pending.
    async fn fail_charge(&self, order_id: &str, metadata: Option<serde_json::Value>)
    -> Result<bool>;

    /// Atomic settlement of a successful callback: re-checks that the
    /// charge is still pending, then completes it, accepts the booking and
    /// credits the provider's escrow in one commit. Returns `false` if the
    /// charge was no longer pending, in which case nothing is written.
    async fn settle_charge(&self, order_id: &str, settlement: ChargeSettlement) -> Result<bool>;

    /// Atomic: moves the charge's net amount from the provider's escrow to
    /// the available balance and accrues total earnings. Returns `false`
    /// if the charge is not a completed, unreleased charge.
    async fn release_escrow(&self, charge_id: Uuid) -> Result<bool>;

    /// Atomic: debits the provider's available balance and records the
    /// payout plus its audit transaction. Returns `false` if the balance
    /// is insufficient.
    async fn create_payout(&self, payout: Payout, audit: Transaction) -> Result<bool>;

    /// Atomic: marks a payout completed unless it already is. Returns the
    /// updated payout, or `None` if the guard failed.
    async fn complete_payout(
        &self,
        payout_id: Uuid,
        admin_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Payout>>;

    /// Atomic: inserts the dispute and forces the booking to `Disputed`,
    /// provided no dispute exists for the booking and its status is in
    /// `allowed_from`. Returns `false` if either guard failed.
    async fn open_dispute(&self, dispute: Dispute, allowed_from: &[BookingStatus]) -> Result<bool>;

    /// Atomic: records a resolution on an open dispute. Returns the
    /// updated dispute, or `None` if it was not open.
    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        resolution: String,
        resolved_by: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<Dispute>>;
}

/// Outbound notification dispatch. Fire-and-forget, at-least-once; the
/// engine never lets a failed enqueue roll back a committed mutation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn enqueue(&self, event: &str, payload: serde_json::Value) -> Result<()>;
}

pub type SharedStore = Arc<dyn MarketStore>;
pub type SharedNotifier = Arc<dyn Notifier>;
