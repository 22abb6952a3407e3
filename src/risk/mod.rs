// Order settlement safeguards
pub mod order_guard;

pub use order_guard::{OrderGuard, UnfilledVerdict};
