//! Connection session: the single source of truth for which wallet, if any,
//! is active.
//!
//! State only changes through [`ConnectionSession::connect`],
//! [`ConnectionSession::disconnect`] and [`ConnectionSession::restore_session`].
//! Wallet operations are serialized: a second connect/sign/disconnect while
//! one is outstanding is rejected with [`WalletError::Busy`] instead of being
//! interleaved.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::chain::{NetworkClient, SubmitResult};
use crate::error::WalletError;
use crate::storage::{KeyValueStore, WALLET_TYPE_KEY};
use crate::types::{Network, SessionSnapshot, WalletKind};
use crate::wallet::{WalletCapability, WalletRegistry};

/// Public key and wallet always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveWallet {
    kind: WalletKind,
    public_key: String,
}

pub struct ConnectionSession {
    registry: Arc<WalletRegistry>,
    storage: Arc<dyn KeyValueStore>,
    network: Network,
    network_client: Option<Arc<dyn NetworkClient>>,
    active: RwLock<Option<ActiveWallet>>,
    op_lock: Mutex<()>,
}

impl ConnectionSession {
    pub fn new(
        registry: Arc<WalletRegistry>,
        storage: Arc<dyn KeyValueStore>,
        network: Network,
    ) -> Self {
        Self {
            registry,
            storage,
            network,
            network_client: None,
            active: RwLock::new(None),
            op_lock: Mutex::new(()),
        }
    }

    pub fn with_network_client(mut self, client: Arc<dyn NetworkClient>) -> Self {
        self.network_client = Some(client);
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let active = self.active.read().await;
        SessionSnapshot {
            connected: active.is_some(),
            public_key: active.as_ref().map(|a| a.public_key.clone()),
            wallet: active.as_ref().map(|a| a.kind.descriptor()),
            network: self.network,
        }
    }

    pub async fn public_key(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|a| a.public_key.clone())
    }

    pub async fn active_wallet(&self) -> Option<WalletKind> {
        self.active.read().await.as_ref().map(|a| a.kind)
    }

    fn begin_operation(&self) -> Result<MutexGuard<'_, ()>, WalletError> {
        self.op_lock.try_lock().map_err(|_| WalletError::Busy)
    }

    /// Connect to `wallet`, or to the recommended installed wallet when
    /// `None`. On failure the session is left exactly as it was.
    pub async fn connect(&self, wallet: Option<WalletKind>) -> Result<String, WalletError> {
        let _op = self.begin_operation()?;

        if let Some(current) = self.active.read().await.as_ref() {
            return Err(WalletError::AlreadyConnected(current.kind));
        }

        let capability: Arc<dyn WalletCapability> = match wallet {
            Some(kind) => self.registry.get(kind),
            None => self.registry.recommend().ok_or(WalletError::NoWalletAvailable)?,
        };
        let kind = capability.kind();

        if !capability.is_installed() {
            return Err(WalletError::NotInstalled(kind));
        }

        let public_key = capability.connect().await.map_err(|e| {
            tracing::warn!(wallet = %kind, error = %e, "Wallet connection failed");
            e
        })?;

        // Nothing the wallet remembered may outlive a connect that failed.
        if let Err(e) = self.storage.set(WALLET_TYPE_KEY, kind.id()) {
            tracing::warn!(wallet = %kind, error = %e, "Failed to persist wallet choice");
            if let Err(rollback) = capability.disconnect().await {
                tracing::warn!(wallet = %kind, error = %rollback, "Error rolling back wallet connection");
            }
            return Err(e.into());
        }
        *self.active.write().await = Some(ActiveWallet {
            kind,
            public_key: public_key.clone(),
        });

        tracing::info!(wallet = %kind, %public_key, "Connected wallet");
        Ok(public_key)
    }

    /// Always ends disconnected, even when the wallet's own disconnect fails.
    /// Calling it again is a no-op.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let _op = self.begin_operation()?;

        let previous = self.active.write().await.take();
        if let Some(active) = &previous {
            let capability = self.registry.get(active.kind);
            match capability.disconnect().await {
                Ok(()) => tracing::info!(wallet = %active.kind, "Disconnected wallet"),
                Err(e) => {
                    tracing::warn!(wallet = %active.kind, error = %e, "Error disconnecting wallet")
                }
            }
        }

        if let Err(e) = self.storage.remove(WALLET_TYPE_KEY) {
            tracing::warn!(error = %e, "Failed to clear stored wallet preference");
        }
        Ok(())
    }

    /// Silent reconnection from the stored wallet preference. Returns whether
    /// a wallet was restored; every failure clears the preference instead of
    /// surfacing an error.
    pub async fn restore_session(&self) -> bool {
        let _op = self.op_lock.lock().await;

        let stored = match self.storage.get(WALLET_TYPE_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored wallet preference");
                return false;
            }
        };

        match self.try_restore(&stored).await {
            Some(active) => {
                tracing::info!(wallet = %active.kind, public_key = %active.public_key, "Restored wallet connection");
                *self.active.write().await = Some(active);
                true
            }
            None => {
                tracing::warn!(stored = %stored, "Failed to restore wallet connection");
                *self.active.write().await = None;
                if let Err(e) = self.storage.remove(WALLET_TYPE_KEY) {
                    tracing::warn!(error = %e, "Failed to clear stored wallet preference");
                }
                false
            }
        }
    }

    async fn try_restore(&self, stored: &str) -> Option<ActiveWallet> {
        let kind: WalletKind = stored.parse().ok()?;
        let capability = self.registry.get(kind);
        if !capability.is_installed() || !capability.is_connected().await {
            return None;
        }
        let public_key = capability.get_public_key().await.ok()?;
        if public_key.is_empty() {
            return None;
        }
        Some(ActiveWallet { kind, public_key })
    }

    /// Sign an opaque envelope with the active wallet for this session's network.
    pub async fn sign(&self, envelope: &str) -> Result<String, WalletError> {
        let _op = self.begin_operation()?;
        self.sign_locked(envelope).await
    }

    async fn sign_locked(&self, envelope: &str) -> Result<String, WalletError> {
        let kind = self
            .active
            .read()
            .await
            .as_ref()
            .map(|a| a.kind)
            .ok_or(WalletError::NotConnected)?;

        self.registry
            .get(kind)
            .sign_transaction(envelope, self.network.passphrase())
            .await
            .map_err(|e| {
                tracing::error!(wallet = %kind, error = %e, "Failed to sign transaction");
                e
            })
    }

    /// Sign with the active wallet and submit through the network client.
    pub async fn sign_and_submit(&self, envelope: &str) -> Result<SubmitResult, WalletError> {
        let client = self
            .network_client
            .clone()
            .ok_or_else(|| WalletError::Network("no network client configured".into()))?;
        let _op = self.begin_operation()?;
        let signed = self.sign_locked(envelope).await?;
        client.submit(&signed).await
    }

    pub fn network_client(&self) -> Option<&Arc<dyn NetworkClient>> {
        self.network_client.as_ref()
    }
}
