use std::collections::{HashMap, HashSet};

use crate::models::TradeId;

/// Per-trade bookkeeping for orders that did not settle cleanly.
///
/// Tracks consecutive unfilled submissions (retried forever, escalated once
/// the threshold is reached) and quarantines trades whose broker-side effect
/// could not be persisted, so no second order goes out for them.
#[derive(Debug, Clone)]
pub struct OrderGuard {
    escalation_threshold: u32,
    unfilled: HashMap<TradeId, u32>,
    quarantined: HashSet<TradeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfilledVerdict {
    Retry { attempts: u32 },
    Escalate { attempts: u32 },
}

impl OrderGuard {
    pub fn new(escalation_threshold: u32) -> Self {
        Self {
            escalation_threshold: escalation_threshold.max(1),
            unfilled: HashMap::new(),
            quarantined: HashSet::new(),
        }
    }

    /// Count another submission that returned no usable fill
    pub fn record_unfilled(&mut self, trade_id: TradeId) -> UnfilledVerdict {
        let attempts = self.unfilled.entry(trade_id).or_insert(0);
        *attempts += 1;

        if *attempts >= self.escalation_threshold {
            UnfilledVerdict::Escalate { attempts: *attempts }
        } else {
            UnfilledVerdict::Retry { attempts: *attempts }
        }
    }

    pub fn record_fill(&mut self, trade_id: TradeId) {
        self.unfilled.remove(&trade_id);
    }

    pub fn unfilled_attempts(&self, trade_id: TradeId) -> u32 {
        self.unfilled.get(&trade_id).copied().unwrap_or(0)
    }

    pub fn quarantine(&mut self, trade_id: TradeId) {
        self.unfilled.remove(&trade_id);
        self.quarantined.insert(trade_id);
    }

    pub fn is_quarantined(&self, trade_id: TradeId) -> bool {
        self.quarantined.contains(&trade_id)
    }

    /// Forget trades that are no longer active
    pub fn retain_active(&mut self, active: &HashSet<TradeId>) {
        self.unfilled.retain(|id, _| active.contains(id));
        self.quarantined.retain(|id| active.contains(id));
    }
}

impl Default for OrderGuard {
    fn default() -> Self {
        Self::new(3)
    }
}
