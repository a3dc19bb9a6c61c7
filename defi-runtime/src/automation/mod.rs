//! Automation engine: condition parsing and evaluation, the strategy store
//! with its execution history, and the periodic scheduler.

pub mod condition;
pub mod scheduler;
pub mod store;

pub use condition::{
    Condition, ConditionEvaluator, EvaluationContext, Frequency, MarketCondition, PriceDirection,
};
pub use scheduler::{
    AutomationScheduler, DEFAULT_TICK_INTERVAL_SECS, SchedulerConfig, TickReport,
};
pub use store::{
    DEFAULT_HISTORY_CAP, ExecutionOutcome, ExecutionPage, ExecutionStats, StoredStrategy,
    StrategyStore,
};
