use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of Stellar wallets the hub knows how to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Freighter,
    Lobstr,
    Hana,
    Rabet,
    Albedo,
}

impl WalletKind {
    /// Recommendation priority, most preferred first.
    pub const PRIORITY: [WalletKind; 5] = [
        WalletKind::Freighter,
        WalletKind::Lobstr,
        WalletKind::Hana,
        WalletKind::Rabet,
        WalletKind::Albedo,
    ];

    /// Position in [`Self::PRIORITY`].
    pub const fn rank(self) -> usize {
        match self {
            WalletKind::Freighter => 0,
            WalletKind::Lobstr => 1,
            WalletKind::Hana => 2,
            WalletKind::Rabet => 3,
            WalletKind::Albedo => 4,
        }
    }

    /// Stable identifier used for persistence and the HTTP API.
    pub fn id(&self) -> &'static str {
        match self {
            WalletKind::Freighter => "freighter",
            WalletKind::Lobstr => "lobstr",
            WalletKind::Hana => "hana",
            WalletKind::Rabet => "rabet",
            WalletKind::Albedo => "albedo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WalletKind::Freighter => "Freighter",
            WalletKind::Lobstr => "Lobstr",
            WalletKind::Hana => "Hana",
            WalletKind::Rabet => "Rabet",
            WalletKind::Albedo => "Albedo",
        }
    }

    pub fn descriptor(&self) -> WalletDescriptor {
        WalletDescriptor {
            kind: *self,
            name: self.display_name().to_string(),
            icon: format!("/icons/{}.svg", self.id()),
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "freighter" => Ok(WalletKind::Freighter),
            "lobstr" => Ok(WalletKind::Lobstr),
            "hana" => Ok(WalletKind::Hana),
            "rabet" => Ok(WalletKind::Rabet),
            "albedo" => Ok(WalletKind::Albedo),
            other => Err(format!("Unknown wallet: {other}")),
        }
    }
}

/// Static identity of a wallet: kind, display name and icon reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub kind: WalletKind,
    pub name: String,
    pub icon: String,
}

/// Stellar network the session signs for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Main,
    #[default]
    Test,
}

impl Network {
    /// Network passphrase handed to wallets when signing.
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Main => "Public Global Stellar Network ; September 2015",
            Network::Test => "Test SDF Network ; September 2015",
        }
    }

    pub fn default_horizon_url(&self) -> &'static str {
        match self {
            Network::Main => "https://horizon.stellar.org",
            Network::Test => "https://horizon-testnet.stellar.org",
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" | "public" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            other => Err(format!("Unknown network: {other}")),
        }
    }
}

/// Read-only view of the connection session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub public_key: Option<String>,
    pub wallet: Option<WalletDescriptor>,
    pub network: Network,
}

/// An automation rule: conditions plus an ordered list of actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStrategy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub conditions: Vec<String>,
    pub actions: Vec<ActionSpec>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Trade,
    Lend,
    Rebalance,
    Alert,
    Stake,
    Analyze,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::Trade => "trade",
            ActionType::Lend => "lend",
            ActionType::Rebalance => "rebalance",
            ActionType::Alert => "alert",
            ActionType::Stake => "stake",
            ActionType::Analyze => "analyze",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// A single step of a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

impl ActionSpec {
    pub fn new(action_type: ActionType, description: impl Into<String>) -> Self {
        Self {
            action_type,
            description: description.into(),
            parameters: serde_json::Map::new(),
            risk_level: RiskLevel::Low,
            expected_outcome: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = Some(outcome.into());
        self
    }

    /// String parameter lookup; numbers are rendered as strings.
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.parameters.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

/// One run of a strategy's action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: String,
    pub strategy_id: String,
    pub executed_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub transaction_ref: Option<String>,
    pub error: Option<String>,
    /// Description of the action that failed, when `status` is `Failed`.
    #[serde(default)]
    pub failed_action: Option<String>,
}

/// Planned extension point: a standalone monitored condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringCondition {
    pub id: String,
    #[serde(rename = "type")]
    pub condition_type: MonitoringKind,
    pub asset: Option<String>,
    pub operator: MonitoringOperator,
    pub value: Decimal,
    pub is_active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub triggered_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringKind {
    Price,
    Portfolio,
    Time,
    Yield,
    Market,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringOperator {
    Above,
    Below,
    Equals,
    Changes,
}

/// Market data types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceData {
    pub asset: String,
    pub price_usd: Decimal,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_kind_round_trips_through_id() {
        for kind in WalletKind::PRIORITY {
            assert_eq!(kind.id().parse::<WalletKind>().unwrap(), kind);
        }
        assert!("metamask".parse::<WalletKind>().is_err());
    }

    #[test]
    fn test_rank_matches_priority() {
        for (i, kind) in WalletKind::PRIORITY.iter().enumerate() {
            assert_eq!(kind.rank(), i, "{kind:?}");
        }
    }

    #[test]
    fn test_action_spec_deserializes_type_field() {
        let action: ActionSpec = serde_json::from_value(serde_json::json!({
            "type": "trade",
            "description": "Buy 100 XLM",
            "parameters": {"amount": "100", "toAsset": "XLM"},
            "risk_level": "low"
        }))
        .unwrap();
        assert_eq!(action.action_type, ActionType::Trade);
        assert_eq!(action.param_str("amount").as_deref(), Some("100"));
        assert!(action.expected_outcome.is_none());
    }

    #[test]
    fn test_network_passphrases() {
        assert!(Network::Main.passphrase().starts_with("Public Global"));
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Test);
    }
}
