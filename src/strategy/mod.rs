// Entry / stop-loss / take-profit condition evaluation
pub mod conditions;

pub use conditions::{evaluate_entry, evaluate_stop_loss, evaluate_take_profit, Evaluation};
