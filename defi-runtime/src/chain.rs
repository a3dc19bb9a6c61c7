//! Network client for the Stellar Horizon API.
//!
//! The hub never encodes transactions itself: it reads the account sequence
//! an envelope builder needs and submits envelopes that a wallet has signed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::types::Network;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountState {
    pub account_id: String,
    pub sequence: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResult {
    pub transaction_hash: String,
    pub ledger: Option<u64>,
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn load_account_sequence(&self, public_key: &str) -> Result<AccountState, WalletError>;

    async fn submit(&self, signed_envelope: &str) -> Result<SubmitResult, WalletError>;
}

#[derive(Debug, Clone)]
pub struct HorizonClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account_id: String,
    sequence: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
    #[serde(default)]
    ledger: Option<u64>,
}

impl HorizonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn for_network(network: Network) -> Self {
        Self::new(network.default_horizon_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl NetworkClient for HorizonClient {
    async fn load_account_sequence(&self, public_key: &str) -> Result<AccountState, WalletError> {
        let url = format!("{}/accounts/{}", self.base_url, public_key);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(WalletError::Network(format!(
                "Horizon returned {} for account {public_key}",
                resp.status()
            )));
        }
        let account: AccountResponse = resp.json().await?;
        let sequence = account
            .sequence
            .parse::<i64>()
            .map_err(|e| WalletError::Network(format!("Invalid account sequence: {e}")))?;

        Ok(AccountState {
            account_id: account.account_id,
            sequence,
        })
    }

    async fn submit(&self, signed_envelope: &str) -> Result<SubmitResult, WalletError> {
        let url = format!("{}/transactions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .form(&[("tx", signed_envelope)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(WalletError::Network(format!(
                "Transaction submission failed ({status}): {body}"
            )));
        }

        let submitted: SubmitResponse = resp.json().await?;
        Ok(SubmitResult {
            transaction_hash: submitted.hash,
            ledger: submitted.ledger,
        })
    }
}
