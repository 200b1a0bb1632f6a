use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A service listing offered by a provider.
///
/// Gigs are reference data for this subsystem: bookings snapshot the base
/// price at creation time and never read it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gig {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub title: String,
    pub base_price: Decimal,
    pub active: bool,
}

impl Gig {
    pub fn new(provider_id: Uuid, title: impl Into<String>, base_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            title: title.into(),
            base_price,
            active: true,
        }
    }
}
