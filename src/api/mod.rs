pub mod tradier;

pub use tradier::{TradierClient, TradierConfig};
