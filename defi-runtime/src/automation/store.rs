//! Strategy set and execution history.
//!
//! Strategies are kept in insertion order, which is also the order the
//! scheduler visits them in. Execution history is a capped ring buffer per
//! strategy and lives only as long as the process.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::condition::Condition;
use crate::clock::Clock;
use crate::error::AutomationError;
use crate::types::{ActionSpec, AutomationExecution, AutomationStrategy, ExecutionStatus};

pub const DEFAULT_HISTORY_CAP: usize = 500;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success {
        transaction_ref: Option<String>,
    },
    Failed {
        error: String,
        failed_action: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStats {
    pub active_strategies: usize,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    /// Percent of recorded executions that succeeded.
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPage {
    pub executions: Vec<AutomationExecution>,
    pub total: usize,
}

/// A strategy together with its parsed conditions.
#[derive(Debug, Clone)]
pub struct StoredStrategy {
    pub strategy: AutomationStrategy,
    pub conditions: Vec<Condition>,
}

#[derive(Debug)]
struct Recorded {
    seq: u64,
    execution: AutomationExecution,
}

#[derive(Debug, Default)]
struct StoreState {
    strategies: Vec<StoredStrategy>,
    history: HashMap<String, VecDeque<Recorded>>,
    next_seq: u64,
}

impl StoreState {
    fn position(&self, id: &str) -> Option<usize> {
        self.strategies.iter().position(|s| s.strategy.id == id)
    }

    fn find_execution(&mut self, execution_id: &str) -> Option<&mut AutomationExecution> {
        self.history
            .values_mut()
            .flat_map(|runs| runs.iter_mut())
            .map(|r| &mut r.execution)
            .find(|e| e.id == execution_id)
    }
}

pub struct StrategyStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
    history_cap: usize,
}

fn parse_conditions(conditions: &[String]) -> Result<Vec<Condition>, AutomationError> {
    conditions.iter().map(|c| Condition::parse(c)).collect()
}

impl StrategyStore {
    pub fn new(clock: Arc<dyn Clock>, history_cap: usize) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
            history_cap: history_cap.max(1),
        }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Add a fully formed strategy. Every condition must parse.
    pub async fn add(&self, strategy: AutomationStrategy) -> Result<AutomationStrategy, AutomationError> {
        strategy.validate()?;
        let conditions = parse_conditions(&strategy.conditions)?;

        let mut state = self.state.write().await;
        if state.position(&strategy.id).is_some() {
            return Err(AutomationError::DuplicateStrategy(strategy.id));
        }
        tracing::info!(strategy_id = %strategy.id, name = %strategy.name, "Strategy added");
        state.strategies.push(StoredStrategy {
            strategy: strategy.clone(),
            conditions,
        });
        Ok(strategy)
    }

    /// Build a strategy with a fresh id and creation time, then add it.
    pub async fn create_from_parts(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        conditions: Vec<String>,
        actions: Vec<ActionSpec>,
    ) -> Result<AutomationStrategy, AutomationError> {
        let strategy = AutomationStrategy::new(name, description, conditions, actions, self.clock.now());
        self.add(strategy).await
    }

    pub async fn get(&self, id: &str) -> Option<AutomationStrategy> {
        let state = self.state.read().await;
        state.position(id).map(|i| state.strategies[i].strategy.clone())
    }

    pub async fn list(&self) -> Vec<AutomationStrategy> {
        self.state
            .read()
            .await
            .strategies
            .iter()
            .map(|s| s.strategy.clone())
            .collect()
    }

    /// Active strategies with their parsed conditions, in insertion order.
    pub async fn active(&self) -> Vec<StoredStrategy> {
        self.state
            .read()
            .await
            .strategies
            .iter()
            .filter(|s| s.strategy.is_active)
            .cloned()
            .collect()
    }

    /// Remove a strategy. Its execution history is kept.
    pub async fn remove(&self, id: &str) -> Result<AutomationStrategy, AutomationError> {
        let mut state = self.state.write().await;
        let index = state
            .position(id)
            .ok_or_else(|| AutomationError::StrategyNotFound(id.to_string()))?;
        let removed = state.strategies.remove(index).strategy;
        tracing::info!(strategy_id = %id, "Strategy removed");
        Ok(removed)
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<AutomationStrategy, AutomationError> {
        let mut state = self.state.write().await;
        let index = state
            .position(id)
            .ok_or_else(|| AutomationError::StrategyNotFound(id.to_string()))?;
        let stored = &mut state.strategies[index];
        stored.strategy.is_active = active;
        tracing::info!(strategy_id = %id, active, "Strategy toggled");
        Ok(stored.strategy.clone())
    }

    pub async fn update_conditions(
        &self,
        id: &str,
        conditions: Vec<String>,
    ) -> Result<AutomationStrategy, AutomationError> {
        let parsed = parse_conditions(&conditions)?;
        let mut state = self.state.write().await;
        let index = state
            .position(id)
            .ok_or_else(|| AutomationError::StrategyNotFound(id.to_string()))?;
        let stored = &mut state.strategies[index];
        stored.strategy.conditions = conditions;
        stored.conditions = parsed;
        Ok(stored.strategy.clone())
    }

    pub async fn active_count(&self) -> usize {
        self.state
            .read()
            .await
            .strategies
            .iter()
            .filter(|s| s.strategy.is_active)
            .count()
    }

    /// Append a `Pending` record for a run that is about to start.
    pub async fn begin_execution(&self, strategy_id: &str) -> AutomationExecution {
        let execution = AutomationExecution {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_id: strategy_id.to_string(),
            executed_at: self.clock.now(),
            status: ExecutionStatus::Pending,
            transaction_ref: None,
            error: None,
            failed_action: None,
        };

        let mut state = self.state.write().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        let runs = state.history.entry(strategy_id.to_string()).or_default();
        runs.push_back(Recorded {
            seq,
            execution: execution.clone(),
        });
        while runs.len() > self.history_cap {
            runs.pop_front();
        }
        execution
    }

    /// The one allowed transition: `Pending` to `Success` or `Failed`.
    pub async fn finish_execution(
        &self,
        execution_id: &str,
        outcome: ExecutionOutcome,
    ) -> Result<AutomationExecution, AutomationError> {
        let mut state = self.state.write().await;
        let execution = state
            .find_execution(execution_id)
            .ok_or_else(|| AutomationError::ExecutionNotFound(execution_id.to_string()))?;
        if execution.status != ExecutionStatus::Pending {
            return Err(AutomationError::ExecutionAlreadyCompleted(execution_id.to_string()));
        }

        match outcome {
            ExecutionOutcome::Success { transaction_ref } => {
                execution.status = ExecutionStatus::Success;
                execution.transaction_ref = transaction_ref;
            }
            ExecutionOutcome::Failed {
                error,
                failed_action,
            } => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(error);
                execution.failed_action = Some(failed_action);
            }
        }
        Ok(execution.clone())
    }

    /// Newest first, optionally for a single strategy.
    pub async fn history(&self, strategy_id: Option<&str>, limit: usize, offset: usize) -> ExecutionPage {
        let state = self.state.read().await;
        let mut runs: Vec<&Recorded> = match strategy_id {
            Some(id) => state.history.get(id).map(|r| r.iter().collect()).unwrap_or_default(),
            None => state.history.values().flat_map(|r| r.iter()).collect(),
        };
        runs.sort_by(|a, b| b.seq.cmp(&a.seq));

        let total = runs.len();
        let executions = runs
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| r.execution.clone())
            .collect();
        ExecutionPage { executions, total }
    }

    pub async fn last_execution(&self, strategy_id: &str) -> Option<AutomationExecution> {
        self.state
            .read()
            .await
            .history
            .get(strategy_id)
            .and_then(|runs| runs.back())
            .map(|r| r.execution.clone())
    }

    pub async fn last_executed_at(&self, strategy_id: &str) -> Option<DateTime<Utc>> {
        self.last_execution(strategy_id).await.map(|e| e.executed_at)
    }

    pub async fn stats(&self) -> ExecutionStats {
        let state = self.state.read().await;
        let mut stats = ExecutionStats {
            active_strategies: state.strategies.iter().filter(|s| s.strategy.is_active).count(),
            ..Default::default()
        };
        for recorded in state.history.values().flat_map(|r| r.iter()) {
            stats.total_executions += 1;
            match recorded.execution.status {
                ExecutionStatus::Success => stats.successful_executions += 1,
                ExecutionStatus::Failed => stats.failed_executions += 1,
                ExecutionStatus::Pending => {}
            }
        }
        if stats.total_executions > 0 {
            stats.success_rate =
                stats.successful_executions as f64 / stats.total_executions as f64 * 100.0;
        }
        stats
    }
}

impl std::fmt::Debug for StrategyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyStore")
            .field("history_cap", &self.history_cap)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::ActionType;
    use chrono::Duration;

    fn store(cap: usize) -> (StrategyStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (StrategyStore::new(clock.clone(), cap), clock)
    }

    fn alert() -> Vec<ActionSpec> {
        vec![ActionSpec::new(ActionType::Alert, "notify")]
    }

    #[tokio::test]
    async fn test_create_keeps_insertion_order() {
        let (store, _) = store(10);
        let a = store
            .create_from_parts("A", "first", vec!["weekly".into()], alert())
            .await
            .unwrap();
        let b = store
            .create_from_parts("B", "second", vec!["always".into()], alert())
            .await
            .unwrap();

        let ids: Vec<_> = store.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);
        assert!(a.is_active);
        assert_eq!(store.active_count().await, 2);

        store.set_active(&a.id, false).await.unwrap();
        assert_eq!(store.active_count().await, 1);
        assert_eq!(store.active().await[0].strategy.id, b.id);
    }

    #[tokio::test]
    async fn test_rejects_unrecognized_condition() {
        let (store, _) = store(10);
        let err = store
            .create_from_parts("bad", "", vec!["whenever".into()], alert())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::UnrecognizedCondition(_)));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_conditions_validates_first() {
        let (store, _) = store(10);
        let s = store
            .create_from_parts("S", "", vec!["daily".into()], alert())
            .await
            .unwrap();
        assert!(store.update_conditions(&s.id, vec!["nope".into()]).await.is_err());
        assert_eq!(store.get(&s.id).await.unwrap().conditions, vec!["daily".to_string()]);

        let updated = store
            .update_conditions(&s.id, vec!["monthly".into()])
            .await
            .unwrap();
        assert_eq!(updated.conditions, vec!["monthly".to_string()]);
    }

    #[tokio::test]
    async fn test_execution_transitions_once() {
        let (store, _) = store(10);
        let run = store.begin_execution("s-1").await;
        assert_eq!(run.status, ExecutionStatus::Pending);

        let done = store
            .finish_execution(
                &run.id,
                ExecutionOutcome::Failed {
                    error: "boom".into(),
                    failed_action: "Buy XLM".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("boom"));
        assert_eq!(done.failed_action.as_deref(), Some("Buy XLM"));

        assert!(matches!(
            store
                .finish_execution(&run.id, ExecutionOutcome::Success { transaction_ref: None })
                .await,
            Err(AutomationError::ExecutionAlreadyCompleted(_))
        ));
        assert!(matches!(
            store
                .finish_execution("missing", ExecutionOutcome::Success { transaction_ref: None })
                .await,
            Err(AutomationError::ExecutionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_capped_and_newest_first() {
        let (store, clock) = store(3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.begin_execution("s-1").await.id);
            clock.advance(Duration::minutes(1));
        }
        store.begin_execution("s-2").await;

        let page = store.history(Some("s-1"), 10, 0).await;
        assert_eq!(page.total, 3);
        let got: Vec<_> = page.executions.iter().map(|e| e.id.clone()).collect();
        assert_eq!(got, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);

        let all = store.history(None, 2, 1).await;
        assert_eq!(all.total, 4);
        assert_eq!(all.executions[0].id, ids[4]);
        assert_eq!(store.last_execution("s-1").await.unwrap().id, ids[4]);
    }

    #[tokio::test]
    async fn test_history_survives_removal_and_stats() {
        let (store, _) = store(10);
        let s = store
            .create_from_parts("S", "", vec!["always".into()], alert())
            .await
            .unwrap();
        let ok = store.begin_execution(&s.id).await;
        store
            .finish_execution(&ok.id, ExecutionOutcome::Success { transaction_ref: Some("tx".into()) })
            .await
            .unwrap();
        let bad = store.begin_execution(&s.id).await;
        store
            .finish_execution(
                &bad.id,
                ExecutionOutcome::Failed {
                    error: "e".into(),
                    failed_action: "a".into(),
                },
            )
            .await
            .unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.active_strategies, 1);
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.success_rate, 50.0);

        store.remove(&s.id).await.unwrap();
        assert!(store.get(&s.id).await.is_none());
        assert_eq!(store.history(Some(&s.id), 10, 0).await.total, 2);
        assert!(matches!(
            store.remove(&s.id).await,
            Err(AutomationError::StrategyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let (store, _) = store(10);
        assert_eq!(store.stats().await, ExecutionStats::default());
    }
}
