use std::sync::Arc;

use async_trait::async_trait;

use super::WalletCapability;
use crate::error::WalletError;
use crate::types::WalletKind;

/// Failure reported by an injected extension global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionFailure {
    /// The extension refused access (locked, site not allowed, …).
    Denied(String),
    /// The user dismissed the prompt.
    Rejected(String),
    Other(String),
}

/// The injected browser global of an extension wallet, normalized to
/// one shape. Extensions that lack an operation keep the default.
#[async_trait]
pub trait ExtensionApi: Send + Sync {
    async fn request_access(&self) -> Result<(), ExtensionFailure> {
        Ok(())
    }

    async fn connect(&self) -> Result<String, ExtensionFailure> {
        self.get_public_key().await
    }

    async fn disconnect(&self) -> Result<(), ExtensionFailure> {
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, ExtensionFailure>;

    async fn get_public_key(&self) -> Result<String, ExtensionFailure>;

    async fn sign_transaction(
        &self,
        envelope: &str,
        network_passphrase: &str,
    ) -> Result<String, ExtensionFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFlow {
    /// `requestAccess()` followed by `getPublicKey()`.
    RequestAccess,
    /// A single `connect()` that returns the public key.
    Direct,
}

/// How a particular extension expects to be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionProtocol {
    pub connect_flow: ConnectFlow,
    pub programmatic_disconnect: bool,
}

impl ExtensionProtocol {
    pub fn for_kind(kind: WalletKind) -> Self {
        match kind {
            // Freighter users disconnect from inside the extension.
            WalletKind::Freighter => Self {
                connect_flow: ConnectFlow::RequestAccess,
                programmatic_disconnect: false,
            },
            _ => Self {
                connect_flow: ConnectFlow::Direct,
                programmatic_disconnect: true,
            },
        }
    }
}

pub struct ExtensionWallet {
    kind: WalletKind,
    protocol: ExtensionProtocol,
    api: Option<Arc<dyn ExtensionApi>>,
}

impl ExtensionWallet {
    pub fn new(kind: WalletKind, api: Option<Arc<dyn ExtensionApi>>) -> Self {
        Self {
            kind,
            protocol: ExtensionProtocol::for_kind(kind),
            api,
        }
    }

    fn api(&self) -> Result<&Arc<dyn ExtensionApi>, WalletError> {
        self.api.as_ref().ok_or(WalletError::NotInstalled(self.kind))
    }

    fn connect_error(&self, failure: ExtensionFailure) -> WalletError {
        match failure {
            ExtensionFailure::Denied(message) | ExtensionFailure::Rejected(message) => {
                WalletError::ConnectionRejected {
                    wallet: self.kind,
                    message,
                }
            }
            ExtensionFailure::Other(message) => WalletError::Extension {
                wallet: self.kind,
                message,
            },
        }
    }

    fn request_error(&self, failure: ExtensionFailure) -> WalletError {
        match failure {
            ExtensionFailure::Denied(message) | ExtensionFailure::Rejected(message) => {
                WalletError::UserRejected {
                    wallet: self.kind,
                    message,
                }
            }
            ExtensionFailure::Other(message) => WalletError::Extension {
                wallet: self.kind,
                message,
            },
        }
    }
}

#[async_trait]
impl WalletCapability for ExtensionWallet {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn is_installed(&self) -> bool {
        self.api.is_some()
    }

    async fn is_connected(&self) -> bool {
        match &self.api {
            Some(api) => api.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn connect(&self) -> Result<String, WalletError> {
        let api = self.api()?;
        let public_key = match self.protocol.connect_flow {
            ConnectFlow::RequestAccess => {
                api.request_access()
                    .await
                    .map_err(|e| self.connect_error(e))?;
                api.get_public_key()
                    .await
                    .map_err(|e| self.connect_error(e))?
            }
            ConnectFlow::Direct => api.connect().await.map_err(|e| self.connect_error(e))?,
        };

        if public_key.is_empty() {
            return Err(WalletError::ConnectionRejected {
                wallet: self.kind,
                message: "extension returned an empty public key".into(),
            });
        }
        Ok(public_key)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        if !self.protocol.programmatic_disconnect {
            return Ok(());
        }
        match &self.api {
            Some(api) => api.disconnect().await.map_err(|e| self.request_error(e)),
            None => Ok(()),
        }
    }

    async fn get_public_key(&self) -> Result<String, WalletError> {
        self.api()?
            .get_public_key()
            .await
            .map_err(|e| self.request_error(e))
    }

    async fn sign_transaction(
        &self,
        envelope: &str,
        network_passphrase: &str,
    ) -> Result<String, WalletError> {
        self.api()?
            .sign_transaction(envelope, network_passphrase)
            .await
            .map_err(|e| self.request_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExtension {
        calls: Mutex<Vec<&'static str>>,
        deny_access: bool,
    }

    impl RecordingExtension {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExtensionApi for RecordingExtension {
        async fn request_access(&self) -> Result<(), ExtensionFailure> {
            self.calls.lock().unwrap().push("request_access");
            if self.deny_access {
                return Err(ExtensionFailure::Denied("locked".into()));
            }
            Ok(())
        }

        async fn connect(&self) -> Result<String, ExtensionFailure> {
            self.calls.lock().unwrap().push("connect");
            Ok("GDIRECT".into())
        }

        async fn disconnect(&self) -> Result<(), ExtensionFailure> {
            self.calls.lock().unwrap().push("disconnect");
            Ok(())
        }

        async fn is_connected(&self) -> Result<bool, ExtensionFailure> {
            Err(ExtensionFailure::Other("extension crashed".into()))
        }

        async fn get_public_key(&self) -> Result<String, ExtensionFailure> {
            self.calls.lock().unwrap().push("get_public_key");
            Ok("GACCESS".into())
        }

        async fn sign_transaction(
            &self,
            envelope: &str,
            network_passphrase: &str,
        ) -> Result<String, ExtensionFailure> {
            Ok(format!("{envelope}|{network_passphrase}"))
        }
    }

    #[tokio::test]
    async fn test_freighter_requests_access_then_reads_key() {
        let ext = Arc::new(RecordingExtension::default());
        let wallet = ExtensionWallet::new(WalletKind::Freighter, Some(ext.clone()));

        assert_eq!(wallet.connect().await.unwrap(), "GACCESS");
        assert_eq!(ext.calls(), vec!["request_access", "get_public_key"]);

        // No programmatic disconnect for Freighter
        wallet.disconnect().await.unwrap();
        assert!(!ext.calls().contains(&"disconnect"));
    }

    #[tokio::test]
    async fn test_direct_connect_and_disconnect() {
        let ext = Arc::new(RecordingExtension::default());
        let wallet = ExtensionWallet::new(WalletKind::Lobstr, Some(ext.clone()));

        assert_eq!(wallet.connect().await.unwrap(), "GDIRECT");
        wallet.disconnect().await.unwrap();
        assert_eq!(ext.calls(), vec!["connect", "disconnect"]);
    }

    #[tokio::test]
    async fn test_denied_access_maps_to_connection_rejected() {
        let ext = Arc::new(RecordingExtension {
            deny_access: true,
            ..Default::default()
        });
        let wallet = ExtensionWallet::new(WalletKind::Freighter, Some(ext));
        assert!(matches!(
            wallet.connect().await,
            Err(WalletError::ConnectionRejected { wallet: WalletKind::Freighter, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_global_is_not_installed() {
        let wallet = ExtensionWallet::new(WalletKind::Hana, None);
        assert!(!wallet.is_installed());
        assert!(!wallet.is_connected().await);
        assert_eq!(
            wallet.connect().await,
            Err(WalletError::NotInstalled(WalletKind::Hana))
        );
        assert_eq!(
            wallet.sign_transaction("AAAA", "Test SDF Network ; September 2015").await,
            Err(WalletError::NotInstalled(WalletKind::Hana))
        );
    }

    #[tokio::test]
    async fn test_is_connected_swallows_extension_failure() {
        let ext = Arc::new(RecordingExtension::default());
        let wallet = ExtensionWallet::new(WalletKind::Rabet, Some(ext));
        assert!(!wallet.is_connected().await);
    }
}
