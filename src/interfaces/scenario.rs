use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::Marketplace;
use crate::domain::booking::BookingStatus;
use crate::domain::dispute::DisputeSide;
use crate::domain::gig::Gig;
use crate::gateway::{
    APPROVED_RESPONSE_CODE, FIELD_AMOUNT, FIELD_ORDER_ID, FIELD_RESPONSE_CODE, FIELD_STATUS,
    PaymentSession, signing,
};
use crate::error::{MarketError, Result};

/// Namespace for label-derived actor ids.
const ACTOR_NAMESPACE: Uuid = Uuid::from_u128(0x6d61726b_6574_5f61_6374_6f725f6e7321);

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Success,
    Declined,
}

/// One line of a replay scenario. Actor, gig, booking and payout ids are
/// referenced by label; actor labels are minted on first use.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScenarioOp {
    Gig {
        label: String,
        provider: String,
        title: String,
        price: Decimal,
    },
    CreateBooking {
        label: String,
        gig: String,
        client: String,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    InitiatePayment {
        booking: String,
    },
    /// Simulates the gateway posting its signed server-to-server callback
    /// for the booking's most recent payment session.
    GatewayCallback {
        booking: String,
        outcome: CallbackOutcome,
        #[serde(default)]
        amount: Option<Decimal>,
    },
    Transition {
        booking: String,
        actor: String,
        to: BookingStatus,
    },
    CancelBooking {
        booking: String,
        actor: String,
        #[serde(default)]
        reason: Option<String>,
    },
    OpenDispute {
        booking: String,
        actor: String,
        reason: String,
    },
    ResolveDispute {
        booking: String,
        favor_of: DisputeSide,
        resolution: String,
    },
    CreatePayout {
        label: String,
        provider: String,
        amount: Decimal,
    },
    CompletePayout {
        payout: String,
    },
}

/// Replays a JSONL scenario against a [`Marketplace`].
///
/// The runner holds the gateway secret so it can forge the signed
/// callbacks a real gateway would post back.
pub struct ScenarioRunner {
    market: Marketplace,
    secret: String,
    admin_id: Uuid,
    labels: HashMap<String, Uuid>,
    sessions: HashMap<String, PaymentSession>,
    disputes: HashMap<String, Uuid>,
    payouts: HashMap<String, Uuid>,
}

impl ScenarioRunner {
    pub fn new(market: Marketplace, secret: impl Into<String>) -> Self {
        Self {
            market,
            secret: secret.into(),
            admin_id: Uuid::new_v4(),
            labels: HashMap::new(),
            sessions: HashMap::new(),
            disputes: HashMap::new(),
            payouts: HashMap::new(),
        }
    }

    /// Replays every line of the scenario. Malformed lines and rejected
    /// operations are reported on stderr and skipped.
    pub async fn run<R: BufRead>(&mut self, source: R) -> Result<()> {
        for (lineno, line) in source.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let op: ScenarioOp = match serde_json::from_str(trimmed) {
                Ok(op) => op,
                Err(e) => {
                    eprintln!("line {}: malformed operation: {e}", lineno + 1);
                    continue;
                }
            };
            if let Err(e) = self.apply(op).await {
                eprintln!("line {}: {e}", lineno + 1);
            }
        }
        Ok(())
    }

    pub fn market(&self) -> &Marketplace {
        &self.market
    }

    async fn apply(&mut self, op: ScenarioOp) -> Result<()> {
        match op {
            ScenarioOp::Gig {
                label,
                provider,
                title,
                price,
            } => {
                let provider_id = self.actor(&provider);
                let gig = Gig::new(provider_id, title, price);
                self.labels.insert(label, gig.id);
                self.market.publish_gig(gig).await?;
            }
            ScenarioOp::CreateBooking {
                label,
                gig,
                client,
                address,
                notes,
            } => {
                let gig_id = self.lookup(&gig)?;
                let client_id = self.actor(&client);
                let booking = self
                    .market
                    .create_booking(
                        client_id,
                        gig_id,
                        Utc::now() + Duration::hours(24),
                        address.unwrap_or_else(|| "unspecified".to_string()),
                        notes,
                    )
                    .await?;
                self.labels.insert(label, booking.id);
            }
            ScenarioOp::InitiatePayment { booking } => {
                let booking_id = self.lookup(&booking)?;
                let client_id = self.booking_client(booking_id).await?;
                let session = self.market.initiate_payment(booking_id, client_id).await?;
                self.sessions.insert(booking, session);
            }
            ScenarioOp::GatewayCallback {
                booking,
                outcome,
                amount,
            } => {
                let session = self.sessions.get(&booking).ok_or_else(|| {
                    MarketError::InvalidState(format!("no payment session for booking {booking}"))
                })?;
                let fields = self.callback_fields(session, outcome, amount)?;
                let status = self.market.handle_payment_callback(fields).await?;
                tracing::info!(booking = %booking, status = status.as_str(), "callback replayed");
            }
            ScenarioOp::Transition { booking, actor, to } => {
                let booking_id = self.lookup(&booking)?;
                let actor_id = self.actor(&actor);
                self.market.transition_booking(booking_id, actor_id, to).await?;
            }
            ScenarioOp::CancelBooking {
                booking,
                actor,
                reason,
            } => {
                let booking_id = self.lookup(&booking)?;
                let actor_id = self.actor(&actor);
                self.market.cancel_booking(booking_id, actor_id, reason).await?;
            }
            ScenarioOp::OpenDispute {
                booking,
                actor,
                reason,
            } => {
                let booking_id = self.lookup(&booking)?;
                let actor_id = self.actor(&actor);
                let dispute = self.market.open_dispute(booking_id, actor_id, reason).await?;
                self.disputes.insert(booking, dispute.id);
            }
            ScenarioOp::ResolveDispute {
                booking,
                favor_of,
                resolution,
            } => {
                let dispute_id = *self.disputes.get(&booking).ok_or_else(|| {
                    MarketError::InvalidState(format!("no dispute opened for booking {booking}"))
                })?;
                self.market
                    .resolve_dispute(dispute_id, self.admin_id, resolution, favor_of)
                    .await?;
            }
            ScenarioOp::CreatePayout {
                label,
                provider,
                amount,
            } => {
                let provider_id = self.actor(&provider);
                let payout = self
                    .market
                    .create_payout(provider_id, amount, self.admin_id)
                    .await?;
                self.payouts.insert(label, payout.id);
            }
            ScenarioOp::CompletePayout { payout } => {
                let payout_id = *self.payouts.get(&payout).ok_or_else(|| {
                    MarketError::InvalidState(format!("unknown payout label {payout}"))
                })?;
                self.market.complete_payout(payout_id, self.admin_id).await?;
            }
        }
        Ok(())
    }

    /// Resolves an actor label. Ids are derived from the label so a
    /// scenario replayed against a persistent store addresses the same
    /// actors on every run.
    fn actor(&mut self, label: &str) -> Uuid {
        *self
            .labels
            .entry(label.to_string())
            .or_insert_with(|| Uuid::new_v5(&ACTOR_NAMESPACE, label.as_bytes()))
    }

    /// Resolves a label that must already exist (gigs, bookings).
    fn lookup(&self, label: &str) -> Result<Uuid> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| MarketError::InvalidState(format!("unknown label {label}")))
    }

    async fn booking_client(&self, booking_id: Uuid) -> Result<Uuid> {
        let booking = self
            .market
            .booking(booking_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("booking {booking_id}")))?;
        Ok(booking.client_id)
    }

    fn callback_fields(
        &self,
        session: &PaymentSession,
        outcome: CallbackOutcome,
        amount: Option<Decimal>,
    ) -> Result<BTreeMap<String, String>> {
        let amount = match amount {
            Some(a) => a.to_string(),
            None => session
                .fields
                .get(FIELD_AMOUNT)
                .cloned()
                .unwrap_or_default(),
        };
        let (response_code, status) = match outcome {
            CallbackOutcome::Success => (APPROVED_RESPONSE_CODE, "02"),
            CallbackOutcome::Declined => ("116", "01"),
        };

        let mut fields = BTreeMap::new();
        fields.insert(FIELD_ORDER_ID.to_string(), session.order_id.clone());
        fields.insert(FIELD_AMOUNT.to_string(), amount);
        fields.insert(FIELD_RESPONSE_CODE.to_string(), response_code.to_string());
        fields.insert(FIELD_STATUS.to_string(), status.to_string());
        let signature = signing::sign(&self.secret, &fields)?;
        fields.insert(signing::SIGNATURE_FIELD.to_string(), signature);
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::notify::LogNotifier;
    use std::io::Cursor;
    use std::sync::Arc;

    fn runner() -> ScenarioRunner {
        let settings = Settings::default();
        let secret = settings.gateway.secret.clone();
        let market = Marketplace::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(LogNotifier::new()),
            settings,
        );
        ScenarioRunner::new(market, secret)
    }

    #[tokio::test]
    async fn test_replay_full_settlement() {
        let script = r#"
            {"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}
            {"op":"create_booking","label":"b1","gig":"clean","client":"bob","address":"12 Main St"}
            {"op":"initiate_payment","booking":"b1"}
            {"op":"gateway_callback","booking":"b1","outcome":"success"}
            {"op":"transition","booking":"b1","actor":"alice","to":"in_progress"}
            {"op":"transition","booking":"b1","actor":"alice","to":"completed"}
        "#;
        let mut runner = runner();
        runner.run(Cursor::new(script)).await.unwrap();

        let wallets = runner.market().all_wallets().await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(
            wallets[0].balance.value().normalize().to_string(),
            "180"
        );
        assert_eq!(wallets[0].pending_balance.value(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_replay_client_cannot_complete_booking() {
        // Only the provider drives completed; the client's attempt is
        // rejected and the funds stay in escrow.
        let script = r#"
            {"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}
            {"op":"create_booking","label":"b1","gig":"clean","client":"bob","address":"12 Main St"}
            {"op":"initiate_payment","booking":"b1"}
            {"op":"gateway_callback","booking":"b1","outcome":"success"}
            {"op":"transition","booking":"b1","actor":"alice","to":"in_progress"}
            {"op":"transition","booking":"b1","actor":"bob","to":"completed"}
        "#;
        let mut runner = runner();
        runner.run(Cursor::new(script)).await.unwrap();

        let wallets = runner.market().all_wallets().await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].balance.value(), Decimal::ZERO);
        assert_eq!(
            wallets[0].pending_balance.value().normalize().to_string(),
            "180"
        );
    }

    #[tokio::test]
    async fn test_replay_skips_malformed_and_rejected_lines() {
        let script = r#"
            this is not json
            {"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}
            {"op":"initiate_payment","booking":"nope"}
            {"op":"create_booking","label":"b1","gig":"clean","client":"bob"}
        "#;
        let mut runner = runner();
        runner.run(Cursor::new(script)).await.unwrap();

        let booking_id = runner.lookup("b1").unwrap();
        assert!(runner.market().booking(booking_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replay_declined_leaves_wallet_empty() {
        let script = r#"
            {"op":"gig","label":"clean","provider":"alice","title":"Deep cleaning","price":200}
            {"op":"create_booking","label":"b1","gig":"clean","client":"bob"}
            {"op":"initiate_payment","booking":"b1"}
            {"op":"gateway_callback","booking":"b1","outcome":"declined"}
        "#;
        let mut runner = runner();
        runner.run(Cursor::new(script)).await.unwrap();

        let wallets = runner.market().all_wallets().await.unwrap();
        assert!(wallets.is_empty() || wallets[0].pending_balance.value() == Decimal::ZERO);
    }
}
