//! Action execution: turns a strategy's `ActionSpec`s into effects.
//!
//! [`dispatch`] routes an action to the matching [`ActionExecutor`] method.
//! [`PaperActionExecutor`] only simulates; [`WalletActionExecutor`] builds an
//! envelope, has the connected wallet sign it and submits it to the network.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::chain::AccountState;
use crate::error::AutomationError;
use crate::session::ConnectionSession;
use crate::types::{ActionSpec, ActionType, Network};

/// Reference to whatever an action produced (a transaction hash, a
/// simulated id), if anything.
pub type ActionRef = Option<String>;

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn trade(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError>;

    async fn lend(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError>;

    async fn rebalance(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError>;

    async fn alert(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError>;

    async fn stake(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        tracing::warn!(action = %action.description, "Stake actions are not executed, skipping");
        Ok(None)
    }

    async fn analyze(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        tracing::warn!(action = %action.description, "Analyze actions are not executed, skipping");
        Ok(None)
    }
}

/// Route an action to the executor method for its type.
pub async fn dispatch(
    executor: &dyn ActionExecutor,
    action: &ActionSpec,
) -> Result<ActionRef, AutomationError> {
    match action.action_type {
        ActionType::Trade => executor.trade(action).await,
        ActionType::Lend => executor.lend(action).await,
        ActionType::Rebalance => executor.rebalance(action).await,
        ActionType::Alert => executor.alert(action).await,
        ActionType::Stake => executor.stake(action).await,
        ActionType::Analyze => executor.analyze(action).await,
    }
}

/// Simulates every action. Nothing leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperActionExecutor;

impl PaperActionExecutor {
    fn simulated(prefix: &str, action: &ActionSpec) -> ActionRef {
        let reference = format!("{prefix}_{}", uuid::Uuid::new_v4().simple());
        tracing::info!(
            action = %action.description,
            params = ?action.parameters,
            %reference,
            "Paper {prefix} executed"
        );
        Some(reference)
    }
}

#[async_trait]
impl ActionExecutor for PaperActionExecutor {
    async fn trade(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        Ok(Self::simulated("trade", action))
    }

    async fn lend(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        Ok(Self::simulated("lend", action))
    }

    async fn rebalance(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        Ok(Self::simulated("rebalance", action))
    }

    async fn alert(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        tracing::info!(alert = %action.description, "Automation alert");
        Ok(None)
    }
}

/// Produces the opaque, signable envelope for an action. The format is
/// network specific and lives outside the hub.
pub trait EnvelopeBuilder: Send + Sync {
    fn build(
        &self,
        action: &ActionSpec,
        account: &AccountState,
        network: Network,
    ) -> Result<String, AutomationError>;
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    source: &'a str,
    sequence: i64,
    network: &'a str,
    operation: &'a str,
    parameters: &'a serde_json::Map<String, serde_json::Value>,
}

/// JSON envelope for signers that accept structured payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeBuilder;

impl EnvelopeBuilder for JsonEnvelopeBuilder {
    fn build(
        &self,
        action: &ActionSpec,
        account: &AccountState,
        network: Network,
    ) -> Result<String, AutomationError> {
        let operation = action.action_type.to_string();
        let envelope = JsonEnvelope {
            source: &account.account_id,
            sequence: account.sequence + 1,
            network: network.passphrase(),
            operation: &operation,
            parameters: &action.parameters,
        };
        serde_json::to_string(&envelope).map_err(|e| AutomationError::ActionFailed(e.to_string()))
    }
}

/// Executes on-chain actions through the connected wallet.
pub struct WalletActionExecutor {
    session: Arc<ConnectionSession>,
    builder: Arc<dyn EnvelopeBuilder>,
}

impl WalletActionExecutor {
    pub fn new(session: Arc<ConnectionSession>, builder: Arc<dyn EnvelopeBuilder>) -> Self {
        Self { session, builder }
    }

    async fn submit(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        let public_key = self
            .session
            .public_key()
            .await
            .ok_or_else(|| AutomationError::ActionFailed("no wallet connected".into()))?;
        let client = self
            .session
            .network_client()
            .cloned()
            .ok_or_else(|| AutomationError::Config("no network client configured".into()))?;

        let account = client.load_account_sequence(&public_key).await?;
        let envelope = self.builder.build(action, &account, self.session.network())?;
        let result = self.session.sign_and_submit(&envelope).await?;

        tracing::info!(
            action = %action.description,
            tx_hash = %result.transaction_hash,
            "Submitted {} transaction",
            action.action_type
        );
        Ok(Some(result.transaction_hash))
    }
}

#[async_trait]
impl ActionExecutor for WalletActionExecutor {
    async fn trade(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.submit(action).await
    }

    async fn lend(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.submit(action).await
    }

    async fn rebalance(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.submit(action).await
    }

    async fn alert(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        tracing::info!(alert = %action.description, "Automation alert");
        Ok(None)
    }

    async fn stake(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.submit(action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paper_executor_references() {
        let exec = PaperActionExecutor;
        let trade = ActionSpec::new(ActionType::Trade, "Buy XLM").with_param("amount", "100");
        let reference = dispatch(&exec, &trade).await.unwrap().unwrap();
        assert!(reference.starts_with("trade_"));

        let lend = ActionSpec::new(ActionType::Lend, "Supply USDC");
        assert!(dispatch(&exec, &lend).await.unwrap().unwrap().starts_with("lend_"));

        let alert = ActionSpec::new(ActionType::Alert, "Heads up");
        assert_eq!(dispatch(&exec, &alert).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stake_and_analyze_are_skipped() {
        let exec = PaperActionExecutor;
        for kind in [ActionType::Stake, ActionType::Analyze] {
            let action = ActionSpec::new(kind, "noop");
            assert_eq!(dispatch(&exec, &action).await.unwrap(), None);
        }
    }

    #[test]
    fn test_json_envelope_uses_next_sequence() {
        let action = ActionSpec::new(ActionType::Trade, "Buy XLM").with_param("toAsset", "XLM");
        let account = AccountState {
            account_id: "GABC".into(),
            sequence: 41,
        };
        let envelope = JsonEnvelopeBuilder
            .build(&action, &account, Network::Test)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(value["sequence"], 42);
        assert_eq!(value["operation"], "trade");
        assert_eq!(value["parameters"]["toAsset"], "XLM");
        assert_eq!(value["network"], Network::Test.passphrase());
    }
}
