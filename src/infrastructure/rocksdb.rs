use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::dispute::{Dispute, DisputeStatus};
use crate::domain::gig::Gig;
use crate::domain::money::Balance;
use crate::domain::payout::{Payout, PayoutStatus};
use crate::domain::ports::{BookingUpdate, ChargeSettlement, MarketStore};
use crate::domain::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::wallet::Wallet;
use crate::error::{MarketError, Result};

/// Column Family for gigs.
pub const CF_GIGS: &str = "gigs";
/// Column Family for bookings.
pub const CF_BOOKINGS: &str = "bookings";
/// Column Family for ledger transactions.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping external order ids to transaction ids.
pub const CF_ORDER_INDEX: &str = "order_index";
/// Column Family for provider wallets.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for payouts.
pub const CF_PAYOUTS: &str = "payouts";
/// Column Family for disputes.
pub const CF_DISPUTES: &str = "disputes";
/// Column Family mapping booking ids to dispute ids.
pub const CF_DISPUTE_INDEX: &str = "dispute_index";

const ALL_CFS: [&str; 8] = [
    CF_GIGS,
    CF_BOOKINGS,
    CF_TRANSACTIONS,
    CF_ORDER_INDEX,
    CF_WALLETS,
    CF_PAYOUTS,
    CF_DISPUTES,
    CF_DISPUTE_INDEX,
];

/// A persistent store implementation using RocksDB.
///
/// Entities are stored as JSON values in one Column Family per type.
/// Guarded mutations take an internal commit mutex for their
/// read-check-write sequence and stage every write into a single
/// `WriteBatch`, so a multi-entity settlement lands atomically on disk.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            MarketError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn batch_put_json<T: serde::Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.get_json(CF_TRANSACTIONS, id.as_bytes())
    }

    fn transaction_for_order(&self, order_id: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_ORDER_INDEX)?;
        let Some(bytes) = self.db.get_cf(cf, order_id.as_bytes())? else {
            return Ok(None);
        };
        let tx_id = Uuid::from_slice(&bytes)
            .map_err(|e| MarketError::InternalError(Box::new(e)))?;
        self.transaction(tx_id)
    }

    /// Scans the transaction CF for the non-failed entry of `kind` tied to
    /// a booking. Transaction volume per booking is tiny, so a scan keyed
    /// by secondary index is not worth its upkeep here.
    fn live_tx_for_booking(
        &self,
        booking_id: Uuid,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            if tx.booking_id == Some(booking_id) && tx.kind == kind && tx.is_live() {
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }

    fn wallet_or_default(&self, provider_id: Uuid) -> Result<Wallet> {
        Ok(self
            .get_json(CF_WALLETS, provider_id.as_bytes())?
            .unwrap_or_else(|| Wallet::new(provider_id)))
    }
}

#[async_trait]
impl MarketStore for RocksDbStore {
    async fn put_gig(&self, gig: Gig) -> Result<()> {
        self.put_json(CF_GIGS, gig.id.as_bytes(), &gig)
    }

    async fn gig(&self, id: Uuid) -> Result<Option<Gig>> {
        self.get_json(CF_GIGS, id.as_bytes())
    }

    async fn put_booking(&self, booking: Booking) -> Result<()> {
        self.put_json(CF_BOOKINGS, booking.id.as_bytes(), &booking)
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>> {
        self.get_json(CF_BOOKINGS, id.as_bytes())
    }

    async fn transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>> {
        self.transaction_for_order(order_id)
    }

    async fn charge_for_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>> {
        self.live_tx_for_booking(booking_id, TransactionKind::Charge)
    }

    async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>> {
        self.live_tx_for_booking(booking_id, TransactionKind::Refund)
    }

    async fn wallet(&self, provider_id: Uuid) -> Result<Wallet> {
        self.wallet_or_default(provider_id)
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf(CF_WALLETS)?;
        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            wallets.push(serde_json::from_slice(&value)?);
        }
        Ok(wallets)
    }

    async fn payout(&self, id: Uuid) -> Result<Option<Payout>> {
        self.get_json(CF_PAYOUTS, id.as_bytes())
    }

    async fn dispute(&self, id: Uuid) -> Result<Option<Dispute>> {
        self.get_json(CF_DISPUTES, id.as_bytes())
    }

    async fn dispute_for_booking(&self, booking_id: Uuid) -> Result<Option<Dispute>> {
        let cf = self.cf(CF_DISPUTE_INDEX)?;
        let Some(bytes) = self.db.get_cf(cf, booking_id.as_bytes())? else {
            return Ok(None);
        };
        let dispute_id = Uuid::from_slice(&bytes)
            .map_err(|e| MarketError::InternalError(Box::new(e)))?;
        self.get_json(CF_DISPUTES, dispute_id.as_bytes())
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        allowed_from: &[BookingStatus],
        update: BookingUpdate,
    ) -> Result<Option<Booking>> {
        let _guard = self.commit_lock.lock().await;

        let Some(mut booking) = self.get_json::<Booking>(CF_BOOKINGS, booking_id.as_bytes())?
        else {
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
        self.put_json(CF_BOOKINGS, booking_id.as_bytes(), &booking)?;
        Ok(Some(booking))
    }

    async fn insert_charge(&self, tx: Transaction) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let booking_id = tx.booking_id.unwrap_or_default();
        if self
            .live_tx_for_booking(booking_id, TransactionKind::Charge)?
            .is_some()
        {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        if let Some(order_id) = &tx.order_id {
            let cf = self.cf(CF_ORDER_INDEX)?;
            batch.put_cf(cf, order_id.as_bytes(), tx.id.as_bytes());
        }
        self.batch_put_json(&mut batch, CF_TRANSACTIONS, tx.id.as_bytes(), &tx)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn insert_refund(&self, tx: Transaction) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let booking_id = tx.booking_id.unwrap_or_default();
        if self
            .live_tx_for_booking(booking_id, TransactionKind::Refund)?
            .is_some()
        {
            return Ok(false);
        }
        self.put_json(CF_TRANSACTIONS, tx.id.as_bytes(), &tx)?;
        Ok(true)
    }

    async fn fail_charge(
        &self,
        order_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let Some(mut tx) = self.transaction_for_order(order_id)? else {
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
        self.put_json(CF_TRANSACTIONS, tx.id.as_bytes(), &tx)?;
        Ok(true)
    }

    async fn settle_charge(&self, order_id: &str, settlement: ChargeSettlement) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let Some(mut tx) = self.transaction_for_order(order_id)? else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(false);
        }

        let now = Utc::now();
        tx.status = TransactionStatus::Completed;
        tx.metadata = Some(settlement.metadata);
        tx.updated_at = now;

        let mut batch = WriteBatch::default();
        self.batch_put_json(&mut batch, CF_TRANSACTIONS, tx.id.as_bytes(), &tx)?;

        // A booking that already left Pending keeps its status; the escrow
        // credit still lands so the captured money stays accounted for
        // until a refund reverses the charge.
        if let Some(mut booking) =
            self.get_json::<Booking>(CF_BOOKINGS, settlement.booking_id.as_bytes())?
            && booking.status == BookingStatus::Pending
        {
            booking.status = BookingStatus::Accepted;
            booking.updated_at = now;
            self.batch_put_json(&mut batch, CF_BOOKINGS, booking.id.as_bytes(), &booking)?;
        }

        let mut wallet = self.wallet_or_default(settlement.provider_id)?;
        wallet.credit_pending(settlement.net_credit);
        self.batch_put_json(
            &mut batch,
            CF_WALLETS,
            settlement.provider_id.as_bytes(),
            &wallet,
        )?;

        self.db.write(batch)?;
        Ok(true)
    }

    async fn release_escrow(&self, charge_id: Uuid) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let Some(mut tx) = self.transaction(charge_id)? else {
            return Ok(false);
        };
        if tx.kind != TransactionKind::Charge
            || tx.status != TransactionStatus::Completed
            || tx.released_at.is_some()
        {
            return Ok(false);
        }
        let Some(booking) = (match tx.booking_id {
            Some(id) => self.get_json::<Booking>(CF_BOOKINGS, id.as_bytes())?,
            None => None,
        }) else {
            return Ok(false);
        };

        let mut wallet = self.wallet_or_default(booking.provider_id)?;
        wallet.release(Balance::new(tx.net_amount()))?;

        let now = Utc::now();
        tx.released_at = Some(now);
        tx.updated_at = now;

        let mut batch = WriteBatch::default();
        self.batch_put_json(&mut batch, CF_TRANSACTIONS, tx.id.as_bytes(), &tx)?;
        self.batch_put_json(
            &mut batch,
            CF_WALLETS,
            booking.provider_id.as_bytes(),
            &wallet,
        )?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn create_payout(&self, payout: Payout, audit: Transaction) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let mut wallet = self.wallet_or_default(payout.provider_id)?;
        if wallet.debit(Balance::new(payout.amount)).is_err() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.batch_put_json(
            &mut batch,
            CF_WALLETS,
            payout.provider_id.as_bytes(),
            &wallet,
        )?;
        self.batch_put_json(&mut batch, CF_PAYOUTS, payout.id.as_bytes(), &payout)?;
        self.batch_put_json(&mut batch, CF_TRANSACTIONS, audit.id.as_bytes(), &audit)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn complete_payout(
        &self,
        payout_id: Uuid,
        admin_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Payout>> {
        let _guard = self.commit_lock.lock().await;

        let Some(mut payout) = self.get_json::<Payout>(CF_PAYOUTS, payout_id.as_bytes())? else {
            return Ok(None);
        };
        if payout.status == PayoutStatus::Completed {
            return Ok(None);
        }
        payout.status = PayoutStatus::Completed;
        payout.processed_by = Some(admin_id);
        payout.processed_at = Some(at);
        self.put_json(CF_PAYOUTS, payout_id.as_bytes(), &payout)?;
        Ok(Some(payout))
    }

    async fn open_dispute(
        &self,
        dispute: Dispute,
        allowed_from: &[BookingStatus],
    ) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;

        let index_cf = self.cf(CF_DISPUTE_INDEX)?;
        if self
            .db
            .get_pinned_cf(index_cf, dispute.booking_id.as_bytes())?
            .is_some()
        {
            return Ok(false);
        }
        let Some(mut booking) =
            self.get_json::<Booking>(CF_BOOKINGS, dispute.booking_id.as_bytes())?
        else {
            return Ok(false);
        };
        if !allowed_from.contains(&booking.status) {
            return Ok(false);
        }
        booking.status = BookingStatus::Disputed;
        booking.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.batch_put_json(&mut batch, CF_BOOKINGS, booking.id.as_bytes(), &booking)?;
        self.batch_put_json(&mut batch, CF_DISPUTES, dispute.id.as_bytes(), &dispute)?;
        batch.put_cf(index_cf, dispute.booking_id.as_bytes(), dispute.id.as_bytes());
        self.db.write(batch)?;
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
        let _guard = self.commit_lock.lock().await;

        let Some(mut dispute) = self.get_json::<Dispute>(CF_DISPUTES, dispute_id.as_bytes())?
        else {
            return Ok(None);
        };
        if dispute.status.is_settled() {
            return Ok(None);
        }
        dispute.status = status;
        dispute.resolution = Some(resolution);
        dispute.resolved_by = Some(resolved_by);
        dispute.resolved_at = Some(resolved_at);
        self.put_json(CF_DISPUTES, dispute_id.as_bytes(), &dispute)?;
        Ok(Some(dispute))
    }
}
