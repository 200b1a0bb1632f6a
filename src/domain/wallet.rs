use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Balance;
use crate::error::MarketError;

/// A provider's escrow wallet.
///
/// `pending_balance` holds funds collected for bookings that have not yet
/// completed; `balance` is available for payout. Both are invariant ≥ 0
/// and only move through the three operations below, which the store
/// applies under its transactional boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub provider_id: Uuid,
    /// Funds available for payout.
    pub balance: Balance,
    /// Funds held in escrow for bookings not yet completed.
    pub pending_balance: Balance,
    /// Cumulative released earnings.
    pub total_earned: Balance,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(provider_id: Uuid) -> Self {
        Self {
            provider_id,
            balance: Balance::ZERO,
            pending_balance: Balance::ZERO,
            total_earned: Balance::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Credits escrow after a confirmed charge.
    pub fn credit_pending(&mut self, amount: Balance) {
        self.pending_balance += amount;
        self.updated_at = Utc::now();
    }

    /// Moves released funds from escrow to the available balance and
    /// accrues total earnings.
    pub fn release(&mut self, amount: Balance) -> Result<(), MarketError> {
        if self.pending_balance >= amount {
            self.pending_balance -= amount;
            self.balance += amount;
            self.total_earned += amount;
            self.updated_at = Utc::now();
            Ok(())
        } else {
            Err(MarketError::ValidationError(
                "Escrowed funds mismatch".to_string(),
            ))
        }
    }

    /// Debits the available balance for a payout.
    pub fn debit(&mut self, amount: Balance) -> Result<(), MarketError> {
        if self.balance >= amount {
            self.balance -= amount;
            self.updated_at = Utc::now();
            Ok(())
        } else {
            Err(MarketError::InvalidState(
                "Insufficient wallet balance".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_credit_pending() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit_pending(Balance::new(dec!(180)));
        assert_eq!(wallet.pending_balance, Balance::new(dec!(180)));
        assert_eq!(wallet.balance, Balance::ZERO);
    }

    #[test]
    fn test_release_conserves_total() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit_pending(Balance::new(dec!(180)));

        let before = wallet.balance + wallet.pending_balance;
        wallet.release(Balance::new(dec!(180))).unwrap();
        let after = wallet.balance + wallet.pending_balance;

        assert_eq!(before, after);
        assert_eq!(wallet.balance, Balance::new(dec!(180)));
        assert_eq!(wallet.pending_balance, Balance::ZERO);
        assert_eq!(wallet.total_earned, Balance::new(dec!(180)));
    }

    #[test]
    fn test_release_more_than_pending_fails() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit_pending(Balance::new(dec!(50)));

        let result = wallet.release(Balance::new(dec!(51)));
        assert!(matches!(result, Err(MarketError::ValidationError(_))));
        assert_eq!(wallet.pending_balance, Balance::new(dec!(50)));
    }

    #[test]
    fn test_debit_insufficient_balance() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit_pending(Balance::new(dec!(100)));
        wallet.release(Balance::new(dec!(100))).unwrap();

        assert!(wallet.debit(Balance::new(dec!(60))).is_ok());
        let result = wallet.debit(Balance::new(dec!(41)));
        assert!(matches!(result, Err(MarketError::InvalidState(_))));
        assert_eq!(wallet.balance, Balance::new(dec!(40)));
    }
}
