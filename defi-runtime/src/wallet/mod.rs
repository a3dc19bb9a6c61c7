//! Wallet capability family.
//!
//! Five Stellar wallets with two structural shapes: browser extensions that
//! inject a global API ([`extension::ExtensionWallet`]) and a web wallet
//! driven through a confirmation popup ([`popup::AlbedoWallet`]). Both
//! implement [`WalletCapability`] so the session never branches on which
//! protocol is active.

pub mod extension;
pub mod popup;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WalletError;
use crate::types::{WalletDescriptor, WalletKind};

pub use extension::{ExtensionApi, ExtensionFailure, ExtensionWallet};
pub use popup::{AlbedoWallet, PopupConfig, PopupHost, PopupMessage, RelayPopupHost};
pub use registry::WalletRegistry;

/// Uniform contract every wallet implementation satisfies.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    fn kind(&self) -> WalletKind;

    fn descriptor(&self) -> WalletDescriptor {
        self.kind().descriptor()
    }

    /// Synchronous environment check. Never fails.
    fn is_installed(&self) -> bool;

    async fn is_connected(&self) -> bool;

    /// Ask the wallet for access and return the account's public key.
    async fn connect(&self) -> Result<String, WalletError>;

    /// Best effort. Wallets without a programmatic disconnect return `Ok`.
    async fn disconnect(&self) -> Result<(), WalletError>;

    async fn get_public_key(&self) -> Result<String, WalletError>;

    /// Sign an opaque transaction envelope for the given network passphrase.
    async fn sign_transaction(
        &self,
        envelope: &str,
        network_passphrase: &str,
    ) -> Result<String, WalletError>;
}

/// Result of probing the execution environment once at startup: which
/// extension globals were injected and whether popups can be opened.
#[derive(Clone, Default)]
pub struct WalletEnvironment {
    extensions: HashMap<WalletKind, Arc<dyn ExtensionApi>>,
    popup_host: Option<Arc<dyn PopupHost>>,
}

impl WalletEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an injected extension global. Albedo is not an extension
    /// and is ignored here.
    pub fn with_extension(mut self, kind: WalletKind, api: Arc<dyn ExtensionApi>) -> Self {
        if kind != WalletKind::Albedo {
            self.extensions.insert(kind, api);
        }
        self
    }

    pub fn with_popup_host(mut self, host: Arc<dyn PopupHost>) -> Self {
        self.popup_host = Some(host);
        self
    }

    pub fn extension(&self, kind: WalletKind) -> Option<Arc<dyn ExtensionApi>> {
        self.extensions.get(&kind).cloned()
    }

    pub fn popup_host(&self) -> Option<Arc<dyn PopupHost>> {
        self.popup_host.clone()
    }
}

impl std::fmt::Debug for WalletEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.extensions.keys().collect();
        kinds.sort();
        f.debug_struct("WalletEnvironment")
            .field("extensions", &kinds)
            .field("popup_host", &self.popup_host.is_some())
            .finish()
    }
}
