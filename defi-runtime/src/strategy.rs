//! Strategy construction: validation, plus the proposer that turns a free
//! text description into a ready-to-store strategy.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::automation::Condition;
use crate::clock::{Clock, SystemClock};
use crate::error::AutomationError;
use crate::types::{ActionSpec, ActionType, AutomationStrategy, RiskLevel};

impl AutomationStrategy {
    /// New active strategy with a generated id.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        conditions: Vec<String>,
        actions: Vec<ActionSpec>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("automation_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            description: description.into(),
            conditions,
            actions,
            is_active: true,
            created_at,
        }
    }

    /// Validate shape and conditions. A strategy with no conditions is
    /// rejected; use the explicit `always` condition instead.
    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.name.trim().is_empty() {
            return Err(AutomationError::Config("Strategy name is empty".into()));
        }
        if self.conditions.is_empty() {
            return Err(AutomationError::InvalidCondition {
                condition: String::new(),
                reason: "a strategy needs at least one condition".into(),
            });
        }
        if self.actions.is_empty() {
            return Err(AutomationError::Config(format!(
                "Strategy '{}' has no actions",
                self.name
            )));
        }
        for condition in &self.conditions {
            Condition::parse(condition)?;
        }
        Ok(())
    }
}

/// What the assistant understood a chat message to be about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    PortfolioAnalysis,
    YieldOpportunity,
    TradeExecution,
    PriceInquiry,
    Automation,
    MarketInsight,
    Rebalance,
    Alert,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
    pub intent: MessageIntent,
    pub actions: Vec<ActionSpec>,
    pub confidence: f64,
}

/// Turns natural language into strategies and suggested actions.
#[async_trait]
pub trait StrategyProposer: Send + Sync {
    async fn propose(&self, description: &str) -> Result<AutomationStrategy, AutomationError>;

    async fn classify_message(&self, text: &str) -> Result<AgentReply, AutomationError>;
}

/// Template based proposer. Every template only emits conditions that
/// [`Condition::parse`] accepts. Stamps `created_at` from its clock.
#[derive(Clone)]
pub struct KeywordStrategyProposer {
    clock: Arc<dyn Clock>,
}

impl KeywordStrategyProposer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for KeywordStrategyProposer {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

const ASSET: &str = r"(?i)\b(xlm|usdc|btc|eth)\b";
const AMOUNT: &str = r"\$?(\d+(?:\.\d+)?)";
const DOLLAR_PRICE: &str = r"\$(\d+(?:\.\d+)?)";
const FREQUENCY: &str = r"(?i)\b(daily|weekly|monthly)\b";

fn find(pattern: &str, text: &str) -> Option<String> {
    let regex = Regex::new(pattern).ok()?;
    Some(regex.captures(text)?.get(1)?.as_str().to_string())
}

fn has_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

impl KeywordStrategyProposer {
    fn template(&self, description: &str) -> (String, Vec<String>, Vec<ActionSpec>) {
        let lower = description.to_lowercase();
        let asset = find(ASSET, description)
            .map(|a| a.to_uppercase())
            .unwrap_or_else(|| "XLM".to_string());

        if has_any(&lower, &["dca", "dollar cost", "weekly", "monthly", "daily"]) {
            let amount = find(AMOUNT, description).unwrap_or_else(|| "100".into());
            let frequency = find(FREQUENCY, description)
                .map(|f| f.to_lowercase())
                .unwrap_or_else(|| "weekly".into());
            let action = ActionSpec::new(ActionType::Trade, format!("Buy {amount} {asset}"))
                .with_param("fromAsset", "USDC")
                .with_param("toAsset", asset.as_str())
                .with_param("amount", amount.as_str())
                .with_outcome("Average purchase price over time");
            return (
                "Dollar Cost Averaging".into(),
                vec![format!("Buy {frequency}"), "Market is open".into()],
                vec![action],
            );
        }

        if has_any(&lower, &["rebalance", "allocation"]) {
            let action = ActionSpec::new(ActionType::Rebalance, "Rebalance to target allocation")
                .with_param(
                    "targetAllocation",
                    serde_json::json!({ "XLM": 60, "USDC": 30, "OTHER": 10 }),
                )
                .with_param("threshold", 5)
                .with_outcome("Maintain target portfolio allocation");
            return (
                "Portfolio Rebalancing".into(),
                vec![
                    "Portfolio drift exceeds 5%".into(),
                    "Monthly check".into(),
                    "Market volatility is low".into(),
                ],
                vec![action],
            );
        }

        if has_any(&lower, &["yield", "optimize", "earn"]) {
            let action = ActionSpec::new(ActionType::Lend, "Move funds to highest yield protocol")
                .with_param("asset", asset.as_str())
                .with_param("protocol", "blend")
                .with_param("minAPY", "8%")
                .with_outcome("Maximize yield while maintaining safety");
            return (
                "Yield Optimization".into(),
                vec!["Weekly yield review".into(), "Market volatility is low".into()],
                vec![action],
            );
        }

        if has_any(&lower, &["stop loss", "protect"]) {
            let trigger = match find(DOLLAR_PRICE, description) {
                Some(price) => format!("{asset} price drops below ${price}"),
                None => "Market volatility is high".into(),
            };
            let action = ActionSpec::new(ActionType::Trade, "Sell risky assets, move to stablecoins")
                .with_param("fromAsset", asset.as_str())
                .with_param("toAsset", "USDC")
                .with_param("percentage", 50)
                .with_risk(RiskLevel::Medium)
                .with_outcome("Protect capital during market downturns");
            return ("Stop Loss Protection".into(), vec![trigger], vec![action]);
        }

        if has_any(&lower, &["take profit", "sell when"]) {
            let trigger = match find(DOLLAR_PRICE, description) {
                Some(price) => format!("{asset} price rises above ${price}"),
                None => "Daily profit check".into(),
            };
            let action = ActionSpec::new(ActionType::Trade, "Take partial profits")
                .with_param("fromAsset", asset.as_str())
                .with_param("toAsset", "USDC")
                .with_param("percentage", 25)
                .with_outcome("Lock in gains while maintaining upside exposure");
            return ("Take Profit Strategy".into(), vec![trigger], vec![action]);
        }

        let condition = if Condition::parse(description).is_ok() {
            description.trim().to_string()
        } else {
            "Daily review".to_string()
        };
        let action = ActionSpec::new(ActionType::Analyze, "Analyze and suggest actions")
            .with_param("description", description)
            .with_outcome("Personalized strategy recommendations");
        ("Custom Strategy".into(), vec![condition], vec![action])
    }

    fn intent(lower: &str) -> MessageIntent {
        const INTENTS: [(MessageIntent, &[&str]); 8] = [
            (
                MessageIntent::PortfolioAnalysis,
                &["analyze", "portfolio", "performance", "risk", "holdings"],
            ),
            (
                MessageIntent::YieldOpportunity,
                &["yield", "earn", "apy", "interest", "stake", "lend"],
            ),
            (
                MessageIntent::TradeExecution,
                &["buy", "sell", "trade", "swap", "exchange"],
            ),
            (MessageIntent::PriceInquiry, &["price", "cost", "value", "worth"]),
            (
                MessageIntent::Automation,
                &["automate", "schedule", "recurring", "dca", "dollar cost"],
            ),
            (
                MessageIntent::MarketInsight,
                &["market", "trend", "forecast", "prediction"],
            ),
            (MessageIntent::Rebalance, &["rebalance", "allocate", "distribute"]),
            (MessageIntent::Alert, &["alert", "notify", "watch", "monitor"]),
        ];

        INTENTS
            .iter()
            .find(|(_, words)| has_any(lower, words))
            .map(|(intent, _)| *intent)
            .unwrap_or(MessageIntent::General)
    }
}

#[async_trait]
impl StrategyProposer for KeywordStrategyProposer {
    async fn propose(&self, description: &str) -> Result<AutomationStrategy, AutomationError> {
        if description.trim().is_empty() {
            return Err(AutomationError::Config("Strategy description is empty".into()));
        }
        let (name, conditions, actions) = self.template(description);
        let strategy = AutomationStrategy::new(name, description, conditions, actions, self.clock.now());
        strategy.validate()?;
        Ok(strategy)
    }

    async fn classify_message(&self, text: &str) -> Result<AgentReply, AutomationError> {
        let lower = text.to_lowercase();
        let intent = Self::intent(&lower);
        let asset = find(ASSET, text)
            .map(|a| a.to_uppercase())
            .unwrap_or_else(|| "XLM".to_string());

        let (content, actions, confidence) = match intent {
            MessageIntent::PortfolioAnalysis => (
                "I can break down your holdings, allocation and risk.".to_string(),
                vec![
                    ActionSpec::new(ActionType::Analyze, "Get detailed portfolio breakdown")
                        .with_outcome("Detailed risk and performance analysis"),
                ],
                0.9,
            ),
            MessageIntent::YieldOpportunity => (
                format!("Lending {asset} is the lowest risk way to earn yield."),
                vec![
                    ActionSpec::new(ActionType::Lend, format!("Lend {asset} to Blend Protocol"))
                        .with_param("asset", asset.as_str())
                        .with_param("protocol", "blend")
                        .with_outcome("Interest on idle funds, low risk"),
                ],
                0.95,
            ),
            MessageIntent::TradeExecution => {
                let side = if lower.contains("sell") { "Sell" } else { "Buy" };
                let amount = find(AMOUNT, text).unwrap_or_else(|| "100".into());
                (
                    format!("I can help you {} {asset}.", side.to_lowercase()),
                    vec![
                        ActionSpec::new(ActionType::Trade, format!("{side} ${amount} of {asset}"))
                            .with_param("fromAsset", "USDC")
                            .with_param("toAsset", asset.as_str())
                            .with_param("amount", amount.as_str())
                            .with_outcome(format!("Acquire {asset} at current market price")),
                    ],
                    0.8,
                )
            }
            MessageIntent::Automation => (
                "I can automate dollar-cost averaging, rebalancing and yield optimization."
                    .to_string(),
                vec![
                    ActionSpec::new(ActionType::Trade, "Set up weekly $100 XLM purchase (DCA)")
                        .with_param("asset", "XLM")
                        .with_param("amount", "100")
                        .with_param("frequency", "weekly"),
                ],
                0.85,
            ),
            MessageIntent::MarketInsight | MessageIntent::PriceInquiry => (
                format!("Here is what the market looks like for {asset}."),
                vec![
                    ActionSpec::new(ActionType::Analyze, "Get detailed market analysis")
                        .with_param("asset", asset.as_str())
                        .with_param("timeframe", "1d"),
                ],
                0.75,
            ),
            MessageIntent::Rebalance => (
                "I can rebalance your portfolio to a target allocation.".to_string(),
                vec![
                    ActionSpec::new(ActionType::Rebalance, "Rebalance to 60% XLM, 30% USDC, 10% other")
                        .with_param(
                            "targetAllocation",
                            serde_json::json!({ "XLM": 60, "USDC": 30, "OTHER": 10 }),
                        )
                        .with_param("threshold", 5),
                ],
                0.9,
            ),
            MessageIntent::Alert => (
                "I can watch prices and notify you when a condition is met.".to_string(),
                vec![
                    ActionSpec::new(ActionType::Alert, format!("Alert when {asset} drops below $0.10"))
                        .with_param("asset", asset.as_str())
                        .with_param("condition", "below")
                        .with_param("price", "0.10"),
                ],
                0.8,
            ),
            MessageIntent::General => (
                "I can analyze your portfolio, find yield, execute trades, automate strategies and monitor markets."
                    .to_string(),
                Vec::new(),
                0.6,
            ),
        };

        Ok(AgentReply {
            content,
            intent,
            actions,
            confidence,
        })
    }
}
