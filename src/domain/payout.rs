use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// An administrator-created withdrawal of released funds.
///
/// The wallet balance is debited at creation; completion only records who
/// processed the transfer and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payout {
    pub fn new(provider_id: Uuid, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            amount,
            status: PayoutStatus::Processing,
            processed_by: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}
