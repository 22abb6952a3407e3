use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;

use super::applier::{ApplyError, StateApplier};
use super::broker::Brokerage;
use super::decision::{decide, needs_snapshots, TradeAction};
use super::reconciler::{FillPolicy, OrderReconciler};
use crate::db::{StoreError, TradeStore};
use crate::models::{AssetClass, CloseReason, MarketSnapshot, TradeId, TradeRecord};
use crate::persistence::SnapshotSource;
use crate::risk::{OrderGuard, UnfilledVerdict};

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub poll_interval: Duration,
    pub fill_policy: FillPolicy,
    pub unfilled_escalation_threshold: u32,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            fill_policy: FillPolicy::default(),
            unfilled_escalation_threshold: 3,
        }
    }
}

/// What happened to one trade during an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    Skipped,
    Discarded,
    Waiting,
    Opened,
    Closed(CloseReason),
    /// Triggered, but the order produced no usable fill; state unchanged
    Unfilled,
    /// Held back after an earlier persistence failure
    Quarantined,
}

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("snapshot for {instrument} unavailable: {source}")]
    Snapshot {
        instrument: String,
        #[source]
        source: StoreError,
    },
    #[error("discard failed: {0}")]
    Discard(#[source] StoreError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Per-iteration tallies, logged once the iteration finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub fetched: usize,
    pub skipped: usize,
    pub discarded: usize,
    pub waiting: usize,
    pub opened: usize,
    pub closed: usize,
    pub unfilled: usize,
    pub quarantined: usize,
    pub failed: usize,
    /// Trade list could not be fetched; nothing was processed
    pub fetch_failed: bool,
}

impl IterationReport {
    fn record(&mut self, outcome: TradeOutcome) {
        match outcome {
            TradeOutcome::Skipped => self.skipped += 1,
            TradeOutcome::Discarded => self.discarded += 1,
            TradeOutcome::Waiting => self.waiting += 1,
            TradeOutcome::Opened => self.opened += 1,
            TradeOutcome::Closed(_) => self.closed += 1,
            TradeOutcome::Unfilled => self.unfilled += 1,
            TradeOutcome::Quarantined => self.quarantined += 1,
        }
    }
}

/// Drives every active trade through its lifecycle on a fixed interval.
///
/// Trades are handled one at a time in fetch order. A failure while
/// processing one trade is logged and never stops the others.
pub struct TradeManager<S, M, B> {
    store: Arc<S>,
    snapshots: M,
    reconciler: OrderReconciler<B>,
    applier: StateApplier<S>,
    guard: OrderGuard,
    settings: ManagerSettings,
}

impl<S, M, B> TradeManager<S, M, B>
where
    S: TradeStore,
    M: SnapshotSource,
    B: Brokerage,
{
    pub fn new(store: Arc<S>, snapshots: M, broker: B, settings: ManagerSettings) -> Self {
        Self {
            applier: StateApplier::new(Arc::clone(&store)),
            store,
            snapshots,
            reconciler: OrderReconciler::new(broker),
            guard: OrderGuard::new(settings.unfilled_escalation_threshold),
            settings,
        }
    }

    pub fn guard(&self) -> &OrderGuard {
        &self.guard
    }

    /// Run iterations until `shutdown` resolves.
    ///
    /// Shutdown is only observed while sleeping between iterations, so an
    /// in-flight order always runs to completion. The sleep is fixed and does
    /// not account for iteration time.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.settings.poll_interval.as_secs_f64(),
            fill_policy = ?self.settings.fill_policy,
            "💹 Trade manager loop starting"
        );

        loop {
            self.run_iteration().await;

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("⚠️  Shutdown requested, leaving trade loop");
                    break;
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// One pass over all active trades
    pub async fn run_iteration(&mut self) -> IterationReport {
        let mut report = IterationReport::default();

        let trades = match self.store.fetch_active_trades().await {
            Ok(trades) => trades,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch active trades, retrying next iteration");
                report.fetch_failed = true;
                return report;
            }
        };

        report.fetched = trades.len();
        let active: HashSet<TradeId> = trades.iter().map(|t| t.id).collect();
        self.guard.retain_active(&active);

        for record in &trades {
            match self.process_trade(record).await {
                Ok(outcome) => {
                    tracing::debug!(trade_id = record.id, outcome = ?outcome, "Trade processed");
                    report.record(outcome);
                }
                Err(e @ TradeError::Apply(_)) => {
                    tracing::error!(
                        trade_id = record.id,
                        symbol = %record.symbol,
                        error = %e,
                        "Trade processing failed"
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        trade_id = record.id,
                        symbol = %record.symbol,
                        error = %e,
                        "Trade skipped this iteration"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            fetched = report.fetched,
            opened = report.opened,
            closed = report.closed,
            discarded = report.discarded,
            waiting = report.waiting,
            skipped = report.skipped,
            unfilled = report.unfilled,
            quarantined = report.quarantined,
            failed = report.failed,
            "Iteration complete"
        );

        report
    }

    /// Evaluate one trade and carry out whatever it triggered
    pub async fn process_trade(&mut self, record: &TradeRecord) -> Result<TradeOutcome, TradeError> {
        if self.guard.is_quarantined(record.id) {
            tracing::error!(
                trade_id = record.id,
                "Trade quarantined after a persistence failure, needs manual reconciliation"
            );
            return Ok(TradeOutcome::Quarantined);
        }

        let (underlying, option) = if needs_snapshots(record, self.settings.fill_policy) {
            self.load_snapshots(record).await?
        } else {
            (None, None)
        };

        let decision = decide(record, underlying.as_ref(), option.as_ref());
        tracing::debug!(trade_id = record.id, action = ?decision.action, reason = %decision.reason, "Decision");

        match decision.action {
            TradeAction::Skip => Ok(TradeOutcome::Skipped),
            TradeAction::Hold => Ok(TradeOutcome::Waiting),
            TradeAction::Discard => {
                self.applier.discard(record).await.map_err(TradeError::Discard)?;
                Ok(TradeOutcome::Discarded)
            }
            TradeAction::Open { signal_price } => {
                tracing::info!(trade_id = record.id, symbol = %record.symbol, "🎯 {}", decision.reason);
                let execution = self.reconciler.submit_open(record).await;
                let Some(price) = self.settings.fill_policy.settle(&execution, Some(signal_price)) else {
                    self.note_unfilled(record);
                    return Ok(TradeOutcome::Unfilled);
                };
                self.guard.record_fill(record.id);

                if let Err(e) = self.applier.open(record, price).await {
                    self.quarantine(record, &e);
                    return Err(e.into());
                }
                Ok(TradeOutcome::Opened)
            }
            TradeAction::Close { reason, signal_price } => {
                tracing::info!(trade_id = record.id, symbol = %record.symbol, "🚪 {}", decision.reason);
                let execution = self.reconciler.submit_close(record).await;
                let Some(price) = self.settings.fill_policy.settle(&execution, signal_price) else {
                    self.note_unfilled(record);
                    return Ok(TradeOutcome::Unfilled);
                };
                self.guard.record_fill(record.id);

                if let Err(e) = self.applier.close(record, price, reason).await {
                    if e.leaves_trade_active() {
                        self.quarantine(record, &e);
                    }
                    return Err(e.into());
                }
                Ok(TradeOutcome::Closed(reason))
            }
        }
    }

    async fn load_snapshots(
        &self,
        record: &TradeRecord,
    ) -> Result<(Option<MarketSnapshot>, Option<MarketSnapshot>), TradeError> {
        let underlying = self.fetch_snapshot(&record.symbol).await?;

        let option = match (record.asset_class, record.contract.as_deref()) {
            (AssetClass::Option, Some(contract)) => self.fetch_snapshot(contract).await?,
            _ => None,
        };

        Ok((underlying, option))
    }

    async fn fetch_snapshot(&self, instrument: &str) -> Result<Option<MarketSnapshot>, TradeError> {
        self.snapshots
            .fetch_snapshot(instrument)
            .await
            .map_err(|source| TradeError::Snapshot {
                instrument: instrument.to_string(),
                source,
            })
    }

    fn note_unfilled(&mut self, record: &TradeRecord) {
        match self.guard.record_unfilled(record.id) {
            UnfilledVerdict::Retry { attempts } => {
                tracing::warn!(
                    trade_id = record.id,
                    attempts,
                    "No confirmed fill, state unchanged; retrying next iteration"
                );
            }
            UnfilledVerdict::Escalate { attempts } => {
                tracing::error!(
                    trade_id = record.id,
                    symbol = %record.symbol,
                    attempts,
                    "🚨 Repeated orders without a confirmed fill, check the broker for live orders"
                );
            }
        }
    }

    fn quarantine(&mut self, record: &TradeRecord, error: &ApplyError) {
        tracing::error!(
            trade_id = record.id,
            symbol = %record.symbol,
            error = %error,
            reconciliation_gap = true,
            "🚨 Broker filled but state was not persisted; trade quarantined"
        );
        self.guard.quarantine(record.id);
    }
}
