//! Core domain types for the payment spool.

pub mod ids;
pub mod item;

pub use ids::{InvalidPaymentId, MAX_PAYMENT_ID_LEN, PaymentId};
pub use item::QueueItem;
