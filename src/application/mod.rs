pub mod lifecycle;
pub mod payments;
pub mod settlement;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::Settings;
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::dispute::{Dispute, DisputeSide};
use crate::domain::gig::Gig;
use crate::domain::payout::Payout;
use crate::domain::ports::{SharedNotifier, SharedStore};
use crate::domain::wallet::Wallet;
use crate::gateway::{GatewayClient, PaymentSession};
use crate::error::Result;

pub use payments::CallbackStatus;
pub use settlement::RefundOutcome;

/// Facade over the three services. One instance per process; cheap to
/// share behind an `Arc`.
pub struct Marketplace {
    store: SharedStore,
    lifecycle: lifecycle::LifecycleService,
    payments: payments::PaymentService,
    disputes: settlement::DisputeService,
}

impl Marketplace {
    pub fn new(store: SharedStore, notifier: SharedNotifier, settings: Settings) -> Self {
        let gateway = GatewayClient::new(settings.gateway.clone());
        Self {
            lifecycle: lifecycle::LifecycleService::new(store.clone(), notifier.clone()),
            payments: payments::PaymentService::new(
                store.clone(),
                notifier.clone(),
                gateway.clone(),
                settings,
            ),
            disputes: settlement::DisputeService::new(store.clone(), notifier, gateway),
            store,
        }
    }

    pub async fn publish_gig(&self, gig: Gig) -> Result<()> {
        self.store.put_gig(gig).await
    }

    pub async fn create_booking(
        &self,
        client_id: Uuid,
        gig_id: Uuid,
        scheduled_at: DateTime<Utc>,
        address: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Booking> {
        self.lifecycle
            .create_booking(client_id, gig_id, scheduled_at, address, notes)
            .await
    }

    /// Party-driven status transition. Completing a booking also moves
    /// the provider's escrowed funds into their available balance.
    pub async fn transition_booking(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        new_status: BookingStatus,
    ) -> Result<Booking> {
        let booking = self
            .lifecycle
            .transition_booking(booking_id, actor_id, new_status)
            .await?;
        if booking.status == BookingStatus::Completed {
            self.payments.release_escrow(booking_id).await?;
        }
        Ok(booking)
    }

    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking> {
        self.lifecycle
            .cancel_booking(booking_id, actor_id, reason)
            .await
    }

    pub async fn initiate_payment(
        &self,
        booking_id: Uuid,
        client_id: Uuid,
    ) -> Result<PaymentSession> {
        self.payments.initiate_payment(booking_id, client_id).await
    }

    pub async fn handle_payment_callback(
        &self,
        fields: BTreeMap<String, String>,
    ) -> Result<CallbackStatus> {
        self.payments.handle_payment_callback(fields).await
    }

    /// Moves a paid booking's escrowed funds to the provider's available
    /// balance. Normally triggered through completion, exposed for
    /// manual reconciliation.
    pub async fn release_escrow(&self, booking_id: Uuid) -> Result<()> {
        self.payments.release_escrow(booking_id).await
    }

    pub async fn create_payout(
        &self,
        provider_id: Uuid,
        amount: Decimal,
        admin_id: Uuid,
    ) -> Result<Payout> {
        self.payments
            .create_payout(provider_id, amount, admin_id)
            .await
    }

    pub async fn complete_payout(&self, payout_id: Uuid, admin_id: Uuid) -> Result<Payout> {
        self.payments.complete_payout(payout_id, admin_id).await
    }

    pub async fn open_dispute(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<Dispute> {
        self.disputes.open_dispute(booking_id, actor_id, reason).await
    }

    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        admin_id: Uuid,
        resolution: impl Into<String>,
        favor_of: DisputeSide,
    ) -> Result<Dispute> {
        self.disputes
            .resolve_dispute(dispute_id, admin_id, resolution, favor_of)
            .await
    }

    pub async fn refund_booking(&self, booking_id: Uuid, admin_id: Uuid) -> Result<RefundOutcome> {
        self.disputes.refund_booking(booking_id, admin_id).await
    }

    pub async fn booking(&self, booking_id: Uuid) -> Result<Option<Booking>> {
        self.store.booking(booking_id).await
    }

    pub async fn wallet(&self, provider_id: Uuid) -> Result<Wallet> {
        self.store.wallet(provider_id).await
    }

    pub async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        self.store.all_wallets().await
    }
}
