use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Charge,
    Refund,
    Payout,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// A ledger entry recording a money movement.
///
/// The ledger enforces at most one non-failed charge and at most one
/// non-failed refund per booking; those guards live in the store so they
/// hold under concurrent writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Not set for payouts, which are keyed to the provider instead.
    pub booking_id: Option<Uuid>,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    /// The gateway's order id, present on charges.
    pub order_id: Option<String>,
    /// Opaque raw callback payload kept for audit.
    pub metadata: Option<serde_json::Value>,
    /// Set once the escrowed funds for this charge have been released to
    /// the provider; makes escrow release idempotent.
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn charge(
        booking_id: Uuid,
        client_id: Uuid,
        amount: Decimal,
        platform_fee: Decimal,
        order_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: Some(booking_id),
            user_id: client_id,
            kind: TransactionKind::Charge,
            status: TransactionStatus::Pending,
            amount,
            platform_fee,
            order_id: Some(order_id),
            metadata: None,
            released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn refund(booking_id: Uuid, client_id: Uuid, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: Some(booking_id),
            user_id: client_id,
            kind: TransactionKind::Refund,
            status: TransactionStatus::Pending,
            amount,
            platform_fee: Decimal::ZERO,
            order_id: None,
            metadata: None,
            released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Audit record written alongside an administrator-created payout.
    pub fn payout(provider_id: Uuid, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: None,
            user_id: provider_id,
            kind: TransactionKind::Payout,
            status: TransactionStatus::Completed,
            amount,
            platform_fee: Decimal::ZERO,
            order_id: None,
            metadata: None,
            released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Net amount credited to the provider's escrow for this charge.
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.platform_fee
    }

    /// A transaction counts against the one-per-booking invariants unless
    /// it has failed.
    pub fn is_live(&self) -> bool {
        self.status != TransactionStatus::Failed
    }
}
