// Order execution and trade lifecycle
pub mod applier;
pub mod broker;
pub mod decision;
pub mod reconciler;
pub mod trade_manager;

pub use applier::{ApplyError, StateApplier};
pub use broker::{BrokerError, Brokerage, EquitySide, OptionSide};
pub use decision::{decide, TradeAction, TradeDecision};
pub use reconciler::{ExecutionResult, FillPolicy, OrderReconciler, OrderTicket};
pub use trade_manager::{IterationReport, ManagerSettings, TradeError, TradeManager, TradeOutcome};
