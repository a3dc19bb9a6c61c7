//! Trigger conditions.
//!
//! Strategies carry their conditions as free text. The text is classified by
//! keyword into a [`Condition`] when the strategy is created, so a condition
//! nobody can evaluate is rejected up front instead of silently firing later.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::AutomationError;
use crate::market_data::{DriftContext, MarketDataProvider};
use crate::types::{MonitoringCondition, MonitoringKind, MonitoringOperator};

const ASSET_PATTERN: &str = r"(?i)\b(xlm|usdc|btc|eth)\b";
const AMOUNT_PATTERN: &str = r"\$?(\d+(?:\.\d+)?)";
const DIRECTION_PATTERN: &str = r"(?i)\b(below|above|drops|rises)\b";
const PERCENT_PATTERN: &str = r"(\d+(?:\.\d+)?)\s*%";

/// Volatility under this fraction counts as "low", at or above as "high".
pub const VOLATILITY_THRESHOLD: Decimal = Decimal::from_parts(30, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Minimum time between two runs of the same strategy.
    pub fn period(&self) -> Duration {
        match self {
            Frequency::Daily => Duration::hours(24),
            Frequency::Weekly => Duration::days(7),
            Frequency::Monthly => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDirection {
    Below,
    Above,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketCondition {
    LowVolatility { max: Decimal },
    HighVolatility { min: Decimal },
    /// The network trades around the clock.
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    Time {
        frequency: Frequency,
    },
    Price {
        asset: String,
        direction: PriceDirection,
        threshold: Decimal,
    },
    Drift {
        threshold_pct: Decimal,
    },
    Market(MarketCondition),
}

impl Condition {
    /// Classify condition text. Categories are tried in a fixed order and
    /// the first keyword hit wins; text matching no category is rejected.
    pub fn parse(text: &str) -> Result<Self, AutomationError> {
        let lower = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if lower.is_empty() {
            return Err(AutomationError::UnrecognizedCondition(text.to_string()));
        }

        // Only as the whole condition, so "always" inside a sentence never
        // overrides a real trigger.
        if lower == "always" {
            return Ok(Condition::Always);
        }

        if lower.contains("daily") {
            return Ok(Condition::Time {
                frequency: Frequency::Daily,
            });
        }
        if lower.contains("weekly") {
            return Ok(Condition::Time {
                frequency: Frequency::Weekly,
            });
        }
        if lower.contains("monthly") {
            return Ok(Condition::Time {
                frequency: Frequency::Monthly,
            });
        }

        if ["price", "drops", "rises"].iter().any(|k| lower.contains(k)) {
            return parse_price(text);
        }

        if lower.contains("portfolio") || lower.contains("allocation") {
            let threshold_pct = capture_decimal(PERCENT_PATTERN, text).ok_or_else(|| {
                AutomationError::InvalidCondition {
                    condition: text.to_string(),
                    reason: "no drift percentage".into(),
                }
            })?;
            return Ok(Condition::Drift { threshold_pct });
        }

        if lower.contains("market") || lower.contains("volatility") {
            return parse_market(text, &lower).map(Condition::Market);
        }

        Err(AutomationError::UnrecognizedCondition(text.to_string()))
    }
}

fn parse_price(text: &str) -> Result<Condition, AutomationError> {
    let invalid = |reason: &str| AutomationError::InvalidCondition {
        condition: text.to_string(),
        reason: reason.to_string(),
    };

    let asset = capture(ASSET_PATTERN, text)
        .ok_or_else(|| invalid("no recognized asset"))?
        .to_uppercase();
    let threshold = capture_decimal(AMOUNT_PATTERN, text).ok_or_else(|| invalid("no price threshold"))?;
    let direction = match capture(DIRECTION_PATTERN, text)
        .ok_or_else(|| invalid("no direction (below/above/drops/rises)"))?
        .to_lowercase()
        .as_str()
    {
        "below" | "drops" => PriceDirection::Below,
        _ => PriceDirection::Above,
    };

    Ok(Condition::Price {
        asset,
        direction,
        threshold,
    })
}

fn parse_market(text: &str, lower: &str) -> Result<MarketCondition, AutomationError> {
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |keys: &[&str]| keys.iter().any(|k| words.contains(k));

    // "volatility below 25%" carries its own threshold.
    let threshold = capture_decimal(PERCENT_PATTERN, text)
        .map(|pct| pct / Decimal::ONE_HUNDRED)
        .unwrap_or(VOLATILITY_THRESHOLD);

    if has(&["low", "below", "under", "calm"]) {
        Ok(MarketCondition::LowVolatility { max: threshold })
    } else if has(&["high", "above", "over", "exceeds", "volatile", "spikes"]) {
        Ok(MarketCondition::HighVolatility { min: threshold })
    } else if has(&["open"]) {
        Ok(MarketCondition::Open)
    } else {
        Err(AutomationError::InvalidCondition {
            condition: text.to_string(),
            reason: "no volatility level (low/high) or open market".into(),
        })
    }
}

fn capture(pattern: &str, text: &str) -> Option<String> {
    let regex = Regex::new(pattern).ok()?;
    let captures = regex.captures(text)?;
    Some(captures.get(1)?.as_str().to_string())
}

fn capture_decimal(pattern: &str, text: &str) -> Option<Decimal> {
    Decimal::from_str(&capture(pattern, text)?).ok()
}

impl FromStr for Condition {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("always"),
            Condition::Time { frequency } => match frequency {
                Frequency::Daily => f.write_str("daily"),
                Frequency::Weekly => f.write_str("weekly"),
                Frequency::Monthly => f.write_str("monthly"),
            },
            Condition::Price {
                asset,
                direction,
                threshold,
            } => {
                let dir = match direction {
                    PriceDirection::Below => "below",
                    PriceDirection::Above => "above",
                };
                write!(f, "{asset} price {dir} ${threshold}")
            }
            Condition::Drift { threshold_pct } => {
                write!(f, "portfolio drift above {threshold_pct}%")
            }
            Condition::Market(MarketCondition::LowVolatility { max }) => {
                write!(f, "volatility below {max}")
            }
            Condition::Market(MarketCondition::HighVolatility { min }) => {
                write!(f, "volatility at or above {min}")
            }
            Condition::Market(MarketCondition::Open) => f.write_str("market open"),
        }
    }
}

impl TryFrom<&MonitoringCondition> for Condition {
    type Error = AutomationError;

    /// Monitored conditions map onto the same variants strategies use.
    fn try_from(m: &MonitoringCondition) -> Result<Self, Self::Error> {
        let unsupported = || AutomationError::InvalidCondition {
            condition: m.id.clone(),
            reason: format!("{:?} {:?} cannot be monitored", m.condition_type, m.operator),
        };
        let direction = match m.operator {
            MonitoringOperator::Above => PriceDirection::Above,
            MonitoringOperator::Below => PriceDirection::Below,
            MonitoringOperator::Equals | MonitoringOperator::Changes => return Err(unsupported()),
        };

        match m.condition_type {
            MonitoringKind::Price => Ok(Condition::Price {
                asset: m.asset.clone().ok_or_else(unsupported)?.to_uppercase(),
                direction,
                threshold: m.value,
            }),
            MonitoringKind::Portfolio if direction == PriceDirection::Above => Ok(Condition::Drift {
                threshold_pct: m.value,
            }),
            MonitoringKind::Market => Ok(Condition::Market(match direction {
                PriceDirection::Below => MarketCondition::LowVolatility { max: m.value },
                PriceDirection::Above => MarketCondition::HighVolatility { min: m.value },
            })),
            _ => Err(unsupported()),
        }
    }
}

/// What the evaluator knows about the strategy being checked.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub strategy_id: &'a str,
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// Decides whether conditions currently hold. Reads time from the injected
/// clock and prices, drift and volatility from the market data provider.
#[derive(Clone)]
pub struct ConditionEvaluator {
    clock: Arc<dyn Clock>,
    market: Arc<dyn MarketDataProvider>,
}

impl ConditionEvaluator {
    pub fn new(clock: Arc<dyn Clock>, market: Arc<dyn MarketDataProvider>) -> Self {
        Self { clock, market }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn evaluate(
        &self,
        condition: &Condition,
        ctx: &EvaluationContext<'_>,
    ) -> Result<bool, AutomationError> {
        match condition {
            Condition::Always => Ok(true),
            Condition::Time { frequency } => Ok(match ctx.last_executed_at {
                None => true,
                Some(last) => self.clock.now() - last >= frequency.period(),
            }),
            Condition::Price {
                asset,
                direction,
                threshold,
            } => {
                let price = self.market.get_price(asset).await?;
                tracing::debug!(%asset, %price, %threshold, "Checked price condition");
                Ok(match direction {
                    PriceDirection::Below => price < *threshold,
                    PriceDirection::Above => price > *threshold,
                })
            }
            Condition::Drift { threshold_pct } => {
                let drift = self
                    .market
                    .get_portfolio_drift(DriftContext {
                        strategy_id: ctx.strategy_id,
                    })
                    .await?;
                Ok(drift > *threshold_pct)
            }
            Condition::Market(MarketCondition::Open) => Ok(true),
            Condition::Market(MarketCondition::LowVolatility { max }) => {
                Ok(self.market.get_volatility().await? < *max)
            }
            Condition::Market(MarketCondition::HighVolatility { min }) => {
                Ok(self.market.get_volatility().await? >= *min)
            }
        }
    }

    /// Free-text entry point. Text that cannot be parsed evaluates to false.
    pub async fn evaluate_text(&self, text: &str, ctx: &EvaluationContext<'_>) -> bool {
        match Condition::parse(text) {
            Ok(condition) => self.evaluate_or_false(&condition, ctx).await,
            Err(e) => {
                tracing::debug!(strategy_id = ctx.strategy_id, error = %e, "Condition not evaluable");
                false
            }
        }
    }

    /// True only when every condition holds. Stops at the first false.
    pub async fn evaluate_all(&self, conditions: &[Condition], ctx: &EvaluationContext<'_>) -> bool {
        for condition in conditions {
            if !self.evaluate_or_false(condition, ctx).await {
                return false;
            }
        }
        true
    }

    async fn evaluate_or_false(&self, condition: &Condition, ctx: &EvaluationContext<'_>) -> bool {
        match self.evaluate(condition, ctx).await {
            Ok(holds) => holds,
            Err(e) => {
                tracing::warn!(
                    strategy_id = ctx.strategy_id,
                    %condition,
                    error = %e,
                    "Condition evaluation failed, treating as false"
                );
                false
            }
        }
    }
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("now", &self.clock.now())
            .finish()
    }
}
