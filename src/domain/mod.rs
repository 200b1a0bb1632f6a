pub mod booking;
pub mod dispute;
pub mod gig;
pub mod money;
pub mod payout;
pub mod ports;
pub mod transaction;
pub mod wallet;
