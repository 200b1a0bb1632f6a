use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::Settings;
use crate::domain::booking::BookingStatus;
use crate::domain::money::{Amount, Balance};
use crate::domain::payout::Payout;
use crate::domain::ports::{ChargeSettlement, SharedNotifier, SharedStore};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::gateway::{GatewayClient, PaymentRequest, PaymentSession};
use crate::error::{MarketError, Result};

/// Business outcome of a gateway callback.
///
/// Every variant is a valid, acknowledged outcome: the callback endpoint
/// acks the gateway regardless, and only a signature failure surfaces as
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Success,
    Failed,
    Ignored,
    AlreadyProcessed,
    AmountMismatch,
}

impl CallbackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackStatus::Success => "success",
            CallbackStatus::Failed => "failed",
            CallbackStatus::Ignored => "ignored",
            CallbackStatus::AlreadyProcessed => "already_processed",
            CallbackStatus::AmountMismatch => "amount_mismatch",
        }
    }
}

/// Transaction ledger and escrow wallet operations.
///
/// The safety-critical path is [`handle_payment_callback`]: callbacks are
/// delivered at-least-once over an unauthenticated transport, so it must
/// be idempotent and must never trust an unverified field.
///
/// [`handle_payment_callback`]: PaymentService::handle_payment_callback
pub struct PaymentService {
    store: SharedStore,
    notifier: SharedNotifier,
    gateway: GatewayClient,
    settings: Settings,
}

impl PaymentService {
    pub fn new(
        store: SharedStore,
        notifier: SharedNotifier,
        gateway: GatewayClient,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            notifier,
            gateway,
            settings,
        }
    }

    /// Opens a hosted-page payment session for a pending booking.
    ///
    /// At most one live charge may exist per booking. A pending charge
    /// older than the configured TTL is expired here so the client can
    /// retry an abandoned session.
    pub async fn initiate_payment(
        &self,
        booking_id: Uuid,
        client_id: Uuid,
    ) -> Result<PaymentSession> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("booking {booking_id}")))?;

        if booking.client_id != client_id {
            return Err(MarketError::Forbidden(
                "only the booking's client may pay for it".to_string(),
            ));
        }
        if booking.status != BookingStatus::Pending {
            return Err(MarketError::InvalidState(format!(
                "cannot pay for a booking that is {}",
                booking.status.as_str()
            )));
        }

        if let Some(existing) = self.store.charge_for_booking(booking_id).await? {
            match existing.status {
                TransactionStatus::Completed => {
                    return Err(MarketError::InvalidState(
                        "booking is already paid".to_string(),
                    ));
                }
                TransactionStatus::Pending => {
                    let ttl = Duration::hours(self.settings.pending_charge_ttl_hours);
                    if Utc::now() - existing.created_at <= ttl {
                        return Err(MarketError::InvalidState(
                            "a payment session is already in progress".to_string(),
                        ));
                    }
                    // Expired session: fail it and let the client retry.
                    if let Some(order_id) = &existing.order_id {
                        self.store.fail_charge(order_id, None).await?;
                        tracing::info!(
                            booking_id = %booking_id,
                            order_id,
                            "expired stale pending charge"
                        );
                    }
                }
                TransactionStatus::Failed => {}
            }
        }

        let amount = Amount::new(booking.total_price)?;
        let session = self.gateway.initiate(PaymentRequest {
            amount: amount.value(),
            booking_id,
            description: format!("Booking {booking_id}"),
            return_url: self.settings.return_url.clone(),
            callback_url: self.settings.callback_url.clone(),
        })?;

        let platform_fee = self.settings.platform_fee(booking.total_price);
        let tx = Transaction::charge(
            booking_id,
            client_id,
            booking.total_price,
            platform_fee,
            session.order_id.clone(),
        );
        if !self.store.insert_charge(tx).await? {
            return Err(MarketError::InvalidState(
                "a payment session is already in progress".to_string(),
            ));
        }

        self.notify(
            "payment.initiated",
            json!({ "booking_id": booking_id, "order_id": session.order_id }),
        )
        .await;

        Ok(session)
    }

    /// Processes a verified gateway callback.
    ///
    /// The pending guard and the settlement writes execute inside the
    /// store's atomic unit, so duplicate deliveries credit the wallet
    /// exactly once; every loser of that race reports
    /// `already_processed`.
    pub async fn handle_payment_callback(
        &self,
        fields: BTreeMap<String, String>,
    ) -> Result<CallbackStatus> {
        let notice = self.gateway.parse_callback(fields)?;

        let Some(tx) = self.store.transaction_by_order(&notice.order_id).await? else {
            tracing::warn!(order_id = %notice.order_id, "callback for unknown order, ignoring");
            return Ok(CallbackStatus::Ignored);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(CallbackStatus::AlreadyProcessed);
        }

        let delta = notice.amount - tx.amount;
        if delta.abs() > self.settings.amount_tolerance {
            tracing::warn!(
                order_id = %notice.order_id,
                callback_amount = %notice.amount,
                stored_amount = %tx.amount,
                "callback amount mismatch, leaving charge pending for review"
            );
            return Ok(CallbackStatus::AmountMismatch);
        }

        let metadata = serde_json::to_value(&notice.raw)?;

        if !notice.success {
            return if self.store.fail_charge(&notice.order_id, Some(metadata)).await? {
                Ok(CallbackStatus::Failed)
            } else {
                Ok(CallbackStatus::AlreadyProcessed)
            };
        }

        let Some(booking_id) = tx.booking_id else {
            tracing::warn!(order_id = %notice.order_id, "charge without booking, ignoring");
            return Ok(CallbackStatus::Ignored);
        };
        let Some(booking) = self.store.booking(booking_id).await? else {
            tracing::warn!(order_id = %notice.order_id, "charge for missing booking, ignoring");
            return Ok(CallbackStatus::Ignored);
        };
        if booking.status != BookingStatus::Pending {
            // The gateway captured the money while the booking moved on
            // (most likely cancelled mid-payment). The charge still
            // settles and the escrow credit still lands, so the funds
            // stay on the books until a refund reverses the charge.
            tracing::warn!(
                order_id = %notice.order_id,
                booking_id = %booking_id,
                status = booking.status.as_str(),
                "settling charge for a booking that is no longer pending"
            );
        }

        let settlement = ChargeSettlement {
            booking_id,
            provider_id: booking.provider_id,
            net_credit: Balance::new(tx.net_amount()),
            metadata,
        };
        if !self.store.settle_charge(&notice.order_id, settlement).await? {
            return Ok(CallbackStatus::AlreadyProcessed);
        }

        self.notify(
            "payment.completed",
            json!({ "booking_id": booking_id, "order_id": notice.order_id }),
        )
        .await;
        self.notify("booking.accepted", json!({ "booking_id": booking_id }))
            .await;

        Ok(CallbackStatus::Success)
    }

    /// Releases the escrowed net amount of a completed booking to the
    /// provider. No-op when there is nothing to release.
    pub async fn release_escrow(&self, booking_id: Uuid) -> Result<()> {
        let Some(charge) = self.store.charge_for_booking(booking_id).await? else {
            return Ok(());
        };
        if charge.status != TransactionStatus::Completed {
            return Ok(());
        }

        if self.store.release_escrow(charge.id).await? {
            self.notify(
                "escrow.released",
                json!({ "booking_id": booking_id, "amount": charge.net_amount() }),
            )
            .await;
        }
        Ok(())
    }

    /// Creates an administrator-driven payout, debiting the provider's
    /// available balance at creation.
    pub async fn create_payout(
        &self,
        provider_id: Uuid,
        amount: Decimal,
        admin_id: Uuid,
    ) -> Result<Payout> {
        let amount = Amount::new(amount)?;
        let payout = Payout::new(provider_id, amount.value());
        let audit = Transaction::payout(provider_id, amount.value());

        if !self.store.create_payout(payout.clone(), audit).await? {
            return Err(MarketError::InvalidState(
                "insufficient wallet balance for payout".to_string(),
            ));
        }

        self.notify(
            "payout.created",
            json!({ "payout_id": payout.id, "provider_id": provider_id, "admin_id": admin_id }),
        )
        .await;

        Ok(payout)
    }

    /// Marks a payout as completed once the transfer has been made.
    pub async fn complete_payout(&self, payout_id: Uuid, admin_id: Uuid) -> Result<Payout> {
        if self.store.payout(payout_id).await?.is_none() {
            return Err(MarketError::NotFound(format!("payout {payout_id}")));
        }

        let payout = self
            .store
            .complete_payout(payout_id, admin_id, Utc::now())
            .await?
            .ok_or_else(|| {
                MarketError::InvalidState("payout is already completed".to_string())
            })?;

        self.notify(
            "payout.completed",
            json!({ "payout_id": payout_id, "admin_id": admin_id }),
        )
        .await;

        Ok(payout)
    }

    async fn notify(&self, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.notifier.enqueue(event, payload).await {
            tracing::warn!(event, error = %e, "notification enqueue failed");
        }
    }
}
