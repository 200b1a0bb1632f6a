use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::dispute::{Dispute, DisputeStatus};
use crate::domain::gig::Gig;
use crate::domain::money::Balance;
use crate::domain::payout::{Payout, PayoutStatus};
use crate::domain::ports::{BookingUpdate, ChargeSettlement, MarketStore};
use crate::domain::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::wallet::Wallet;
use crate::error::Result;

#[derive(Default)]
struct State {
    gigs: HashMap<Uuid, Gig>,
    bookings: HashMap<Uuid, Booking>,
    transactions: HashMap<Uuid, Transaction>,
    /// external order id -> transaction id
    order_index: HashMap<String, Uuid>,
    wallets: HashMap<Uuid, Wallet>,
    payouts: HashMap<Uuid, Payout>,
    disputes: HashMap<Uuid, Dispute>,
    /// booking id -> dispute id
    dispute_index: HashMap<Uuid, Uuid>,
}

impl State {
    fn live_tx_for_booking(&self, booking_id: Uuid, kind: TransactionKind) -> Option<&Transaction> {
        self.transactions.values().find(|tx| {
            tx.booking_id == Some(booking_id) && tx.kind == kind && tx.is_live()
        })
    }

    fn wallet_entry(&mut self, provider_id: Uuid) -> &mut Wallet {
        self.wallets
            .entry(provider_id)
            .or_insert_with(|| Wallet::new(provider_id))
    }
}

/// A thread-safe in-memory store for the whole marketplace state.
///
/// One `RwLock` guards every entity, so each guarded mutation holds the
/// write lock across its check and its writes. That single lock *is* the
/// transactional boundary: concurrent duplicate callbacks, escrow
/// releases and payout debits serialize here.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for InMemoryStore {
    async fn put_gig(&self, gig: Gig) -> Result<()> {
        let mut state = self.state.write().await;
        state.gigs.insert(gig.id, gig);
        Ok(())
    }

    async fn gig(&self, id: Uuid) -> Result<Option<Gig>> {
        let state = self.state.read().await;
        Ok(state.gigs.get(&id).cloned())
    }

    async fn put_booking(&self, booking: Booking) -> Result<()> {
        let mut state = self.state.write().await;
        state.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state.bookings.get(&id).cloned())
    }

    async fn transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        let tx = state
            .order_index
            .get(order_id)
            .and_then(|id| state.transactions.get(id))
            .cloned();
        Ok(tx)
    }

    async fn charge_for_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .live_tx_for_booking(booking_id, TransactionKind::Charge)
            .cloned())
    }

    async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .live_tx_for_booking(booking_id, TransactionKind::Refund)
            .cloned())
    }

    async fn wallet(&self, provider_id: Uuid) -> Result<Wallet> {
        let state = self.state.read().await;
        Ok(state
            .wallets
            .get(&provider_id)
            .cloned()
            .unwrap_or_else(|| Wallet::new(provider_id)))
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.values().cloned().collect())
    }

    async fn payout(&self, id: Uuid) -> Result<Option<Payout>> {
        let state = self.state.read().await;
        Ok(state.payouts.get(&id).cloned())
    }

    async fn dispute(&self, id: Uuid) -> Result<Option<Dispute>> {
        let state = self.state.read().await;
        Ok(state.disputes.get(&id).cloned())
    }

    async fn dispute_for_booking(&self, booking_id: Uuid) -> Result<Option<Dispute>> {
        let state = self.state.read().await;
        let dispute = state
            .dispute_index
            .get(&booking_id)
            .and_then(|id| state.disputes.get(id))
            .cloned();
        Ok(dispute)
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        allowed_from: &[BookingStatus],
        update: BookingUpdate,
    ) -> Result<Option<Booking>> {
        let mut state = self.state.write().await;
        let Some(booking) = state.bookings.get_mut(&booking_id) else {
            return Ok(None);
        };
        if !allowed_from.contains(&booking.status) {
            return Ok(None);
        }
        booking.status = update.new_status;
        if update.cancel_reason.is_some() {
            booking.cancel_reason = update.cancel_reason;
        }
        if update.cancelled_by.is_some() {
            booking.cancelled_by = update.cancelled_by;
        }
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn insert_charge(&self, tx: Transaction) -> Result<bool> {
        let mut state = self.state.write().await;
        let booking_id = tx.booking_id.unwrap_or_default();
        if state
            .live_tx_for_booking(booking_id, TransactionKind::Charge)
            .is_some()
        {
            return Ok(false);
        }
        if let Some(order_id) = &tx.order_id {
            state.order_index.insert(order_id.clone(), tx.id);
        }
        state.transactions.insert(tx.id, tx);
        Ok(true)
    }

    async fn insert_refund(&self, tx: Transaction) -> Result<bool> {
        let mut state = self.state.write().await;
        let booking_id = tx.booking_id.unwrap_or_default();
        if state
            .live_tx_for_booking(booking_id, TransactionKind::Refund)
            .is_some()
        {
            return Ok(false);
        }
        state.transactions.insert(tx.id, tx);
        Ok(true)
    }

    async fn fail_charge(
        &self,
        order_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(tx_id) = state.order_index.get(order_id).copied() else {
            return Ok(false);
        };
        let Some(tx) = state.transactions.get_mut(&tx_id) else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(false);
        }
        tx.status = TransactionStatus::Failed;
        if metadata.is_some() {
            tx.metadata = metadata;
        }
        tx.updated_at = Utc::now();
        Ok(true)
    }

    async fn settle_charge(&self, order_id: &str, settlement: ChargeSettlement) -> Result<bool> {
        let mut state = self.state.write().await;

        // Guard first, mutate after: the pending check and every write
        // happen under the same exclusive lock.
        let Some(tx_id) = state.order_index.get(order_id).copied() else {
            return Ok(false);
        };
        match state.transactions.get(&tx_id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {}
            _ => return Ok(false),
        }

        let now = Utc::now();
        if let Some(tx) = state.transactions.get_mut(&tx_id) {
            tx.status = TransactionStatus::Completed;
            tx.metadata = Some(settlement.metadata);
            tx.updated_at = now;
        }
        // A booking that already left Pending (e.g. cancelled between
        // initiation and callback) keeps its status; the escrow credit
        // below still lands so the captured money stays accounted for
        // until a refund reverses the charge.
        if let Some(booking) = state.bookings.get_mut(&settlement.booking_id)
            && booking.status == BookingStatus::Pending
        {
            booking.status = BookingStatus::Accepted;
            booking.updated_at = now;
        }
        state
            .wallet_entry(settlement.provider_id)
            .credit_pending(settlement.net_credit);
        Ok(true)
    }

    async fn release_escrow(&self, charge_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;

        let (provider_id, net) = match state.transactions.get(&charge_id) {
            Some(tx)
                if tx.kind == TransactionKind::Charge
                    && tx.status == TransactionStatus::Completed
                    && tx.released_at.is_none() =>
            {
                let provider = tx
                    .booking_id
                    .and_then(|id| state.bookings.get(&id))
                    .map(|b| b.provider_id);
                match provider {
                    Some(provider_id) => (provider_id, tx.net_amount()),
                    None => return Ok(false),
                }
            }
            _ => return Ok(false),
        };

        state.wallet_entry(provider_id).release(Balance::new(net))?;
        if let Some(tx) = state.transactions.get_mut(&charge_id) {
            tx.released_at = Some(Utc::now());
            tx.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn create_payout(&self, payout: Payout, audit: Transaction) -> Result<bool> {
        let mut state = self.state.write().await;
        let wallet = state.wallet_entry(payout.provider_id);
        if wallet.debit(Balance::new(payout.amount)).is_err() {
            return Ok(false);
        }
        state.payouts.insert(payout.id, payout);
        state.transactions.insert(audit.id, audit);
        Ok(true)
    }

    async fn complete_payout(
        &self,
        payout_id: Uuid,
        admin_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Payout>> {
        let mut state = self.state.write().await;
        let Some(payout) = state.payouts.get_mut(&payout_id) else {
            return Ok(None);
        };
        if payout.status == PayoutStatus::Completed {
            return Ok(None);
        }
        payout.status = PayoutStatus::Completed;
        payout.processed_by = Some(admin_id);
        payout.processed_at = Some(at);
        Ok(Some(payout.clone()))
    }

    async fn open_dispute(
        &self,
        dispute: Dispute,
        allowed_from: &[BookingStatus],
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.dispute_index.contains_key(&dispute.booking_id) {
            return Ok(false);
        }
        let Some(booking) = state.bookings.get_mut(&dispute.booking_id) else {
            return Ok(false);
        };
        if !allowed_from.contains(&booking.status) {
            return Ok(false);
        }
        booking.status = BookingStatus::Disputed;
        booking.updated_at = Utc::now();
        state.dispute_index.insert(dispute.booking_id, dispute.id);
        state.disputes.insert(dispute.id, dispute);
        Ok(true)
    }

    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        resolution: String,
        resolved_by: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<Dispute>> {
        let mut state = self.state.write().await;
        let Some(dispute) = state.disputes.get_mut(&dispute_id) else {
            return Ok(None);
        };
        if dispute.status.is_settled() {
            return Ok(None);
        }
        dispute.status = status;
        dispute.resolution = Some(resolution);
        dispute.resolved_by = Some(resolved_by);
        dispute.resolved_at = Some(resolved_at);
        Ok(Some(dispute.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_insert_charge_rejects_duplicate_live_charge() {
        let store = InMemoryStore::new();
        let booking_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();

        let first = Transaction::charge(booking_id, client_id, dec!(200), dec!(20), "o1".into());
        let second = Transaction::charge(booking_id, client_id, dec!(200), dec!(20), "o2".into());

        assert!(store.insert_charge(first).await.unwrap());
        assert!(!store.insert_charge(second).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_charge_allows_retry_after_failure() {
        let store = InMemoryStore::new();
        let booking_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();

        let first = Transaction::charge(booking_id, client_id, dec!(200), dec!(20), "o1".into());
        assert!(store.insert_charge(first).await.unwrap());
        assert!(store.fail_charge("o1", None).await.unwrap());

        let second = Transaction::charge(booking_id, client_id, dec!(200), dec!(20), "o2".into());
        assert!(store.insert_charge(second).await.unwrap());
    }

    #[tokio::test]
    async fn test_settle_charge_is_idempotent() {
        let store = InMemoryStore::new();
        let gig = Gig::new(Uuid::new_v4(), "Test gig", dec!(200));
        let booking = Booking::new(Uuid::new_v4(), &gig, Utc::now(), "12 Main St", None);
        store.put_gig(gig.clone()).await.unwrap();
        store.put_booking(booking.clone()).await.unwrap();

        let tx = Transaction::charge(booking.id, booking.client_id, dec!(200), dec!(20), "o1".into());
        store.insert_charge(tx).await.unwrap();

        let settlement = ChargeSettlement {
            booking_id: booking.id,
            provider_id: gig.provider_id,
            net_credit: Balance::new(dec!(180)),
            metadata: serde_json::json!({"responsecode": "000"}),
        };

        assert!(store.settle_charge("o1", settlement.clone()).await.unwrap());
        assert!(!store.settle_charge("o1", settlement).await.unwrap());

        let wallet = store.wallet(gig.provider_id).await.unwrap();
        assert_eq!(wallet.pending_balance, Balance::new(dec!(180)));
        let booking = store.booking(booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Accepted);
    }

    #[tokio::test]
    async fn test_release_escrow_only_once() {
        let store = InMemoryStore::new();
        let gig = Gig::new(Uuid::new_v4(), "Test gig", dec!(200));
        let booking = Booking::new(Uuid::new_v4(), &gig, Utc::now(), "12 Main St", None);
        store.put_gig(gig.clone()).await.unwrap();
        store.put_booking(booking.clone()).await.unwrap();

        let tx = Transaction::charge(booking.id, booking.client_id, dec!(200), dec!(20), "o1".into());
        let tx_id = tx.id;
        store.insert_charge(tx).await.unwrap();
        store
            .settle_charge(
                "o1",
                ChargeSettlement {
                    booking_id: booking.id,
                    provider_id: gig.provider_id,
                    net_credit: Balance::new(dec!(180)),
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        assert!(store.release_escrow(tx_id).await.unwrap());
        assert!(!store.release_escrow(tx_id).await.unwrap());

        let wallet = store.wallet(gig.provider_id).await.unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(180)));
        assert_eq!(wallet.pending_balance, Balance::ZERO);
        assert_eq!(wallet.total_earned, Balance::new(dec!(180)));
    }

    #[tokio::test]
    async fn test_create_payout_insufficient_balance() {
        let store = InMemoryStore::new();
        let provider_id = Uuid::new_v4();
        let payout = Payout::new(provider_id, dec!(50));
        let audit = Transaction::payout(provider_id, dec!(50));

        assert!(!store.create_payout(payout, audit).await.unwrap());
        let wallet = store.wallet(provider_id).await.unwrap();
        assert_eq!(wallet.balance, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_open_dispute_unique_per_booking() {
        let store = InMemoryStore::new();
        let gig = Gig::new(Uuid::new_v4(), "Test gig", dec!(200));
        let mut booking = Booking::new(Uuid::new_v4(), &gig, Utc::now(), "12 Main St", None);
        booking.status = BookingStatus::InProgress;
        store.put_booking(booking.clone()).await.unwrap();

        let allowed = [BookingStatus::InProgress, BookingStatus::Completed];
        let first = Dispute::new(booking.id, booking.client_id, "no-show");
        let second = Dispute::new(booking.id, booking.provider_id, "counter");

        assert!(store.open_dispute(first, &allowed).await.unwrap());
        assert!(!store.open_dispute(second, &allowed).await.unwrap());

        let booking = store.booking(booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Disputed);
    }

    #[tokio::test]
    async fn test_concurrent_settlement_credits_once() {
        let store = InMemoryStore::new();
        let gig = Gig::new(Uuid::new_v4(), "Test gig", dec!(200));
        let booking = Booking::new(Uuid::new_v4(), &gig, Utc::now(), "12 Main St", None);
        store.put_gig(gig.clone()).await.unwrap();
        store.put_booking(booking.clone()).await.unwrap();

        let tx = Transaction::charge(booking.id, booking.client_id, dec!(200), dec!(20), "o1".into());
        store.insert_charge(tx).await.unwrap();

        let settlement = ChargeSettlement {
            booking_id: booking.id,
            provider_id: gig.provider_id,
            net_credit: Balance::new(dec!(180)),
            metadata: serde_json::json!({}),
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let settlement = settlement.clone();
            handles.push(tokio::spawn(async move {
                store.settle_charge("o1", settlement).await.unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let wallet = store.wallet(gig.provider_id).await.unwrap();
        assert_eq!(wallet.pending_balance, Balance::new(dec!(180)));
    }
}
