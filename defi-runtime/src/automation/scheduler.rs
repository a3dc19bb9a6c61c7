//! Periodic automation loop.
//!
//! Each tick walks the active strategies in insertion order, evaluates their
//! conditions and runs the actions of those that qualify, strictly in order.
//! Ticks never overlap, so a strategy is never executed twice concurrently,
//! whether the tick comes from the loop or from a manual [`AutomationScheduler::tick`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::condition::{ConditionEvaluator, EvaluationContext};
use super::store::{ExecutionOutcome, StoredStrategy, StrategyStore};
use crate::executor::{ActionExecutor, dispatch};
use crate::types::ExecutionStatus;

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    /// Active strategies whose conditions were checked.
    pub evaluated: usize,
    /// Strategies whose actions ran, successfully or not.
    pub executed: usize,
    /// Strategies not run: conditions false, or paused/removed mid-tick.
    pub skipped: usize,
    /// Executions that ended `Failed`.
    pub failed: usize,
}

struct Engine {
    store: Arc<StrategyStore>,
    evaluator: ConditionEvaluator,
    executor: Arc<dyn ActionExecutor>,
    tick_lock: Mutex<()>,
}

impl Engine {
    async fn tick(&self) -> TickReport {
        let _tick = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        for stored in self.store.active().await {
            let id = stored.strategy.id.clone();
            report.evaluated += 1;

            let ctx = EvaluationContext {
                strategy_id: &id,
                last_executed_at: self.store.last_executed_at(&id).await,
            };
            if !self.evaluator.evaluate_all(&stored.conditions, &ctx).await {
                tracing::debug!(strategy_id = %id, "Conditions not met");
                report.skipped += 1;
                continue;
            }

            // Removed or paused while its conditions were being checked.
            if !matches!(self.store.get(&id).await, Some(s) if s.is_active) {
                report.skipped += 1;
                continue;
            }

            report.executed += 1;
            if self.execute(&stored).await == ExecutionStatus::Failed {
                report.failed += 1;
            }
        }

        tracing::debug!(?report, "Automation tick complete");
        report
    }

    async fn execute(&self, stored: &StoredStrategy) -> ExecutionStatus {
        let strategy = &stored.strategy;
        let run = self.store.begin_execution(&strategy.id).await;
        tracing::info!(strategy_id = %strategy.id, execution_id = %run.id, "Executing strategy {}", strategy.name);

        let mut transaction_ref = None;
        let mut failure = None;
        for action in &strategy.actions {
            match dispatch(self.executor.as_ref(), action).await {
                Ok(Some(reference)) => transaction_ref = Some(reference),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        strategy_id = %strategy.id,
                        action = %action.description,
                        error = %e,
                        "Automation action failed"
                    );
                    failure = Some(ExecutionOutcome::Failed {
                        error: e.to_string(),
                        failed_action: action.description.clone(),
                    });
                    break;
                }
            }
        }

        let outcome = failure.unwrap_or(ExecutionOutcome::Success { transaction_ref });
        match self.store.finish_execution(&run.id, outcome).await {
            Ok(done) => {
                tracing::info!(strategy_id = %strategy.id, status = ?done.status, "Strategy execution finished");
                done.status
            }
            Err(e) => {
                tracing::error!(execution_id = %run.id, error = %e, "Failed to record execution outcome");
                ExecutionStatus::Failed
            }
        }
    }
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct AutomationScheduler {
    engine: Arc<Engine>,
    config: SchedulerConfig,
    running: Mutex<Option<RunningLoop>>,
}

impl AutomationScheduler {
    pub fn new(
        store: Arc<StrategyStore>,
        evaluator: ConditionEvaluator,
        executor: Arc<dyn ActionExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine: Arc::new(Engine {
                store,
                evaluator,
                executor,
                tick_lock: Mutex::new(()),
            }),
            config,
            running: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<StrategyStore> {
        &self.engine.store
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start ticking every `config.interval`. No-op when already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let engine = self.engine.clone();
        let period = self.config.interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {
                        engine.tick().await;
                    }
                }
            }
        });

        tracing::info!(interval_secs = period.as_secs(), "Automation scheduler started");
        *running = Some(RunningLoop { stop_tx, handle });
    }

    /// Stop the loop, letting an in-flight tick finish. No-op when stopped.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.stop_tx.send(true);
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "Automation loop ended abnormally");
        }
        tracing::info!("Automation scheduler stopped");
    }

    /// Run one tick now. Waits for any tick already in progress.
    pub async fn tick(&self) -> TickReport {
        self.engine.tick().await
    }
}

impl std::fmt::Debug for AutomationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
