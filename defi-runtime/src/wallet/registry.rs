use std::sync::Arc;

use super::extension::ExtensionWallet;
use super::popup::{AlbedoWallet, PopupConfig};
use super::{WalletCapability, WalletEnvironment};
use crate::storage::KeyValueStore;
use crate::types::{WalletDescriptor, WalletKind};

/// Fixed set of the five wallet capabilities, built once from the
/// environment detection.
pub struct WalletRegistry {
    wallets: [Arc<dyn WalletCapability>; 5],
}

impl WalletRegistry {
    pub fn from_environment(
        env: &WalletEnvironment,
        storage: Arc<dyn KeyValueStore>,
        popup: PopupConfig,
    ) -> Self {
        let wallets = WalletKind::PRIORITY.map(|kind| -> Arc<dyn WalletCapability> {
            match kind {
                WalletKind::Albedo => Arc::new(AlbedoWallet::new(
                    env.popup_host(),
                    storage.clone(),
                    popup.clone(),
                )),
                extension => Arc::new(ExtensionWallet::new(extension, env.extension(extension))),
            }
        });

        let installed: Vec<&str> = wallets
            .iter()
            .filter(|w| w.is_installed())
            .map(|w| w.kind().id())
            .collect();
        tracing::info!(?installed, "Wallet environment detected");

        Self { wallets }
    }

    /// Direct lookup. Infallible: the registry always holds every kind.
    pub fn get(&self, kind: WalletKind) -> Arc<dyn WalletCapability> {
        self.wallets[kind.rank()].clone()
    }

    pub fn list_available(&self) -> Vec<Arc<dyn WalletCapability>> {
        self.wallets
            .iter()
            .filter(|w| w.is_installed())
            .cloned()
            .collect()
    }

    pub fn available_descriptors(&self) -> Vec<WalletDescriptor> {
        self.list_available().iter().map(|w| w.descriptor()).collect()
    }

    /// First installed wallet in priority order.
    pub fn recommend(&self) -> Option<Arc<dyn WalletCapability>> {
        WalletKind::PRIORITY
            .iter()
            .map(|kind| self.get(*kind))
            .find(|w| w.is_installed())
    }
}

impl std::fmt::Debug for WalletRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.wallets.iter().map(|w| (w.kind(), w.is_installed())))
            .finish()
    }
}
