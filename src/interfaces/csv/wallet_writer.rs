use crate::domain::wallet::Wallet;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct WalletRecord {
    provider: String,
    balance: String,
    pending: String,
    total_earned: String,
}

impl From<&Wallet> for WalletRecord {
    fn from(wallet: &Wallet) -> Self {
        Self {
            provider: wallet.provider_id.to_string(),
            balance: wallet.balance.value().normalize().to_string(),
            pending: wallet.pending_balance.value().normalize().to_string(),
            total_earned: wallet.total_earned.value().normalize().to_string(),
        }
    }
}

/// Writes provider wallets as CSV.
///
/// Amounts are normalized so trailing zeros never leak into the output.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes all wallets, sorted by provider id for stable output.
    pub fn write_wallets(&mut self, mut wallets: Vec<Wallet>) -> Result<()> {
        wallets.sort_by_key(|w| w.provider_id);
        for wallet in &wallets {
            self.writer.serialize(WalletRecord::from(wallet))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_writer_normalizes_amounts() {
        let mut wallet = Wallet::new(Uuid::nil());
        wallet.credit_pending(Balance::new(dec!(180.00)));

        let mut out = Vec::new();
        let mut writer = WalletWriter::new(&mut out);
        writer.write_wallets(vec![wallet]).unwrap();
        drop(writer);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("provider,balance,pending,total_earned\n"));
        assert!(text.contains(",0,180,0"));
    }

    #[test]
    fn test_writer_sorts_by_provider() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let mut out = Vec::new();
        let mut writer = WalletWriter::new(&mut out);
        writer
            .write_wallets(vec![Wallet::new(b), Wallet::new(a)])
            .unwrap();
        drop(writer);

        let text = String::from_utf8(out).unwrap();
        let first = text.lines().nth(1).unwrap();
        assert!(first.starts_with(&a.to_string()));
    }
}
