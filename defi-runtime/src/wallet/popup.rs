//! Popup-driven web wallet (Albedo).
//!
//! Every request opens a confirmation window on the wallet's origin and waits
//! for a cross-window message carrying the result. Requests are correlated by
//! a generated `request_id`; messages from any other origin, of any other
//! type, or for another request are ignored. The window and the message
//! listener are owned by [`PopupSession`], which releases both on drop, so
//! success, rejection, timeout and caller cancellation all clean up.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use super::WalletCapability;
use crate::error::WalletError;
use crate::storage::{ALBEDO_PUBLIC_KEY, KeyValueStore};
use crate::types::WalletKind;

pub const ALBEDO_ORIGIN: &str = "https://albedo.link";
const ALBEDO_CONFIRM_URL: &str = "https://albedo.link/confirm";
const INTENT_RESULT_TYPE: &str = "albedo_intent_result";

/// Ceiling observed for popup confirmations.
pub const DEFAULT_POPUP_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct PopupConfig {
    pub timeout: Duration,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_POPUP_TIMEOUT_SECS),
        }
    }
}

/// A cross-window message as seen by the hosting page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupMessage {
    pub origin: String,
    pub data: serde_json::Value,
}

pub type ListenerId = u64;
pub type WindowId = u64;

/// The page hosting the popup flow: opens windows and delivers messages.
pub trait PopupHost: Send + Sync {
    /// Origin of the hosting application, sent as the callback target.
    fn origin(&self) -> &str;

    fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<PopupMessage>);

    fn remove_listener(&self, id: ListenerId);

    fn open(&self, url: &Url) -> Result<WindowId, WalletError>;

    fn close(&self, window: WindowId);
}

/// Listener registration plus window handle for one request.
struct PopupSession {
    host: Arc<dyn PopupHost>,
    listener: ListenerId,
    window: Option<WindowId>,
    messages: mpsc::UnboundedReceiver<PopupMessage>,
}

impl PopupSession {
    fn open(host: Arc<dyn PopupHost>, url: &Url) -> Result<Self, WalletError> {
        // Listen before opening so a fast reply cannot be missed.
        let (listener, messages) = host.add_listener();
        let mut session = Self {
            host,
            listener,
            window: None,
            messages,
        };
        session.window = Some(session.host.open(url)?);
        Ok(session)
    }

    async fn next_message(&mut self) -> Option<PopupMessage> {
        self.messages.recv().await
    }
}

impl Drop for PopupSession {
    fn drop(&mut self) {
        if let Some(window) = self.window.take() {
            self.host.close(window);
        }
        self.host.remove_listener(self.listener);
    }
}

#[derive(Debug, Deserialize)]
struct IntentResultMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    result: Option<IntentResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentResult {
    #[serde(default)]
    pubkey: Option<String>,
    #[serde(default, alias = "signed_envelope_xdr")]
    xdr: Option<String>,
}

enum Intent<'a> {
    PublicKey,
    Tx {
        envelope: &'a str,
        public_key: &'a str,
        network_passphrase: &'a str,
    },
}

impl Intent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Intent::PublicKey => "public_key",
            Intent::Tx { .. } => "tx",
        }
    }
}

pub struct AlbedoWallet {
    host: Option<Arc<dyn PopupHost>>,
    storage: Arc<dyn KeyValueStore>,
    config: PopupConfig,
}

impl AlbedoWallet {
    pub fn new(
        host: Option<Arc<dyn PopupHost>>,
        storage: Arc<dyn KeyValueStore>,
        config: PopupConfig,
    ) -> Self {
        Self {
            host,
            storage,
            config,
        }
    }

    fn intent_url(
        &self,
        host: &dyn PopupHost,
        intent: &Intent<'_>,
        request_id: &str,
    ) -> Result<Url, WalletError> {
        let mut params: Vec<(&str, &str)> = vec![("intent", intent.name())];
        match intent {
            Intent::PublicKey => params.push(("pubkey", "")),
            Intent::Tx {
                envelope,
                public_key,
                network_passphrase,
            } => {
                params.push(("xdr", *envelope));
                params.push(("pubkey", *public_key));
                params.push(("network", *network_passphrase));
            }
        }
        params.push(("callback", host.origin()));
        params.push(("request_id", request_id));

        Url::parse_with_params(ALBEDO_CONFIRM_URL, &params)
            .map_err(|e| WalletError::Popup(format!("Invalid confirmation URL: {e}")))
    }

    async fn run_intent(&self, intent: Intent<'_>) -> Result<IntentResult, WalletError> {
        let host = self
            .host
            .clone()
            .ok_or(WalletError::NotInstalled(WalletKind::Albedo))?;
        let request_id = Uuid::new_v4().to_string();
        let url = self.intent_url(host.as_ref(), &intent, &request_id)?;

        tracing::debug!(intent = intent.name(), %request_id, "Opening Albedo popup");
        let mut session = PopupSession::open(host, &url)?;

        let wait = async {
            while let Some(message) = session.next_message().await {
                if message.origin != ALBEDO_ORIGIN {
                    continue;
                }
                let Ok(reply) = serde_json::from_value::<IntentResultMessage>(message.data) else {
                    continue;
                };
                if reply.kind != INTENT_RESULT_TYPE
                    || reply.request_id.as_deref() != Some(request_id.as_str())
                {
                    continue;
                }
                return match reply.result {
                    Some(result) => Ok(result),
                    None => Err(WalletError::UserRejected {
                        wallet: WalletKind::Albedo,
                        message: reply
                            .error
                            .unwrap_or_else(|| format!("{} request cancelled", intent.name())),
                    }),
                };
            }
            Err(WalletError::Popup("message channel closed".into()))
        };

        match tokio::time::timeout(self.config.timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(intent = intent.name(), %request_id, "Albedo popup timed out");
                Err(WalletError::Timeout {
                    wallet: WalletKind::Albedo,
                    secs: self.config.timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl WalletCapability for AlbedoWallet {
    fn kind(&self) -> WalletKind {
        WalletKind::Albedo
    }

    /// Web based: available wherever popups can be opened.
    fn is_installed(&self) -> bool {
        self.host.is_some()
    }

    async fn is_connected(&self) -> bool {
        matches!(self.storage.get(ALBEDO_PUBLIC_KEY), Ok(Some(key)) if !key.is_empty())
    }

    async fn connect(&self) -> Result<String, WalletError> {
        let result = self.run_intent(Intent::PublicKey).await?;
        let public_key = result
            .pubkey
            .filter(|k| !k.is_empty())
            .ok_or_else(|| WalletError::ConnectionRejected {
                wallet: WalletKind::Albedo,
                message: "popup returned no public key".into(),
            })?;
        self.storage.set(ALBEDO_PUBLIC_KEY, &public_key)?;
        Ok(public_key)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.storage.remove(ALBEDO_PUBLIC_KEY)?;
        Ok(())
    }

    async fn get_public_key(&self) -> Result<String, WalletError> {
        match self.storage.get(ALBEDO_PUBLIC_KEY)? {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(WalletError::NotConnected),
        }
    }

    async fn sign_transaction(
        &self,
        envelope: &str,
        network_passphrase: &str,
    ) -> Result<String, WalletError> {
        let public_key = self.get_public_key().await?;
        let result = self
            .run_intent(Intent::Tx {
                envelope,
                public_key: &public_key,
                network_passphrase,
            })
            .await?;
        result.xdr.ok_or_else(|| {
            WalletError::Popup("popup returned no signed envelope".into())
        })
    }
}

/// A popup window currently open on the relay.
#[derive(Debug, Clone, Serialize)]
pub struct OpenPopup {
    pub id: WindowId,
    pub url: String,
    pub opened_at: DateTime<Utc>,
}

/// In-process [`PopupHost`]: "opening" a window queues its URL for the UI
/// to open, and messages posted back by the UI are fanned out to the
/// registered listeners.
pub struct RelayPopupHost {
    origin: String,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<PopupMessage>>>,
    windows: Mutex<BTreeMap<WindowId, OpenPopup>>,
}

impl RelayPopupHost {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
            windows: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn open_popups(&self) -> Vec<OpenPopup> {
        relock(&self.windows).values().cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        relock(&self.listeners).len()
    }

    /// Deliver a message to every live listener. Returns how many received it.
    pub fn post_message(&self, message: PopupMessage) -> usize {
        let listeners = relock(&self.listeners);
        listeners
            .values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }
}

impl PopupHost for RelayPopupHost {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<PopupMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        relock(&self.listeners).insert(id, tx);
        (id, rx)
    }

    fn remove_listener(&self, id: ListenerId) {
        relock(&self.listeners).remove(&id);
    }

    fn open(&self, url: &Url) -> Result<WindowId, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        relock(&self.windows).insert(
            id,
            OpenPopup {
                id,
                url: url.to_string(),
                opened_at: Utc::now(),
            },
        );
        Ok(id)
    }

    fn close(&self, window: WindowId) {
        relock(&self.windows).remove(&window);
    }
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn wallet(host: &Arc<RelayPopupHost>, timeout_secs: u64) -> AlbedoWallet {
        AlbedoWallet::new(
            Some(host.clone()),
            Arc::new(MemoryStore::new()),
            PopupConfig {
                timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    async fn wait_for_popup(host: &RelayPopupHost) -> OpenPopup {
        loop {
            if let Some(popup) = host.open_popups().pop() {
                return popup;
            }
            tokio::task::yield_now().await;
        }
    }

    fn query(popup: &OpenPopup, key: &str) -> Option<String> {
        Url::parse(&popup.url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    fn reply(request_id: &str, result: serde_json::Value) -> PopupMessage {
        PopupMessage {
            origin: ALBEDO_ORIGIN.into(),
            data: serde_json::json!({
                "type": INTENT_RESULT_TYPE,
                "request_id": request_id,
                "result": result,
            }),
        }
    }

    #[tokio::test]
    async fn test_connect_resolves_and_cleans_up() {
        let host = Arc::new(RelayPopupHost::new("https://hub.example"));
        let albedo = Arc::new(wallet(&host, 300));

        let task = tokio::spawn({
            let albedo = albedo.clone();
            async move { albedo.connect().await }
        });

        let popup = wait_for_popup(&host).await;
        assert_eq!(query(&popup, "intent").as_deref(), Some("public_key"));
        assert_eq!(query(&popup, "callback").as_deref(), Some("https://hub.example"));
        let request_id = query(&popup, "request_id").unwrap();

        // Wrong origin and stale request ids are ignored
        host.post_message(PopupMessage {
            origin: "https://evil.example".into(),
            data: reply(&request_id, serde_json::json!({"pubkey": "GEVIL"})).data,
        });
        host.post_message(reply("some-other-request", serde_json::json!({"pubkey": "GSTALE"})));
        host.post_message(reply(&request_id, serde_json::json!({"pubkey": "GALBEDO"})));

        assert_eq!(task.await.unwrap().unwrap(), "GALBEDO");
        assert!(host.open_popups().is_empty());
        assert_eq!(host.listener_count(), 0);
        assert!(albedo.is_connected().await);
        assert_eq!(albedo.get_public_key().await.unwrap(), "GALBEDO");
    }

    #[tokio::test]
    async fn test_rejection_signal_maps_to_user_rejected() {
        let host = Arc::new(RelayPopupHost::new("https://hub.example"));
        let albedo = Arc::new(wallet(&host, 300));

        let task = tokio::spawn({
            let albedo = albedo.clone();
            async move { albedo.connect().await }
        });

        let popup = wait_for_popup(&host).await;
        let request_id = query(&popup, "request_id").unwrap();
        host.post_message(reply(&request_id, serde_json::Value::Null));

        assert!(matches!(
            task.await.unwrap(),
            Err(WalletError::UserRejected { wallet: WalletKind::Albedo, .. })
        ));
        assert!(host.open_popups().is_empty());
        assert_eq!(host.listener_count(), 0);
        assert!(!albedo.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_closes_popup_and_listener() {
        let host = Arc::new(RelayPopupHost::new("https://hub.example"));
        let albedo = wallet(&host, 300);

        let result = albedo.connect().await;
        assert_eq!(
            result,
            Err(WalletError::Timeout {
                wallet: WalletKind::Albedo,
                secs: 300
            })
        );
        assert!(host.open_popups().is_empty());
        assert_eq!(host.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_resources() {
        let host = Arc::new(RelayPopupHost::new("https://hub.example"));
        let albedo = Arc::new(wallet(&host, 300));

        let task = tokio::spawn({
            let albedo = albedo.clone();
            async move { albedo.connect().await }
        });
        wait_for_popup(&host).await;
        assert_eq!(host.listener_count(), 1);

        task.abort();
        let _ = task.await;
        assert!(host.open_popups().is_empty());
        assert_eq!(host.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_requires_remembered_key() {
        let host = Arc::new(RelayPopupHost::new("https://hub.example"));
        let albedo = wallet(&host, 300);
        assert_eq!(
            albedo.sign_transaction("AAAA", "Test SDF Network ; September 2015").await,
            Err(WalletError::NotConnected)
        );
        assert!(host.open_popups().is_empty());
    }

    #[tokio::test]
    async fn test_sign_carries_envelope_and_network() {
        let host = Arc::new(RelayPopupHost::new("https://hub.example"));
        let storage = Arc::new(MemoryStore::new());
        storage.set(ALBEDO_PUBLIC_KEY, "GALBEDO").unwrap();
        let albedo = Arc::new(AlbedoWallet::new(
            Some(host.clone()),
            storage,
            PopupConfig::default(),
        ));

        let task = tokio::spawn({
            let albedo = albedo.clone();
            async move {
                albedo
                    .sign_transaction("AAAA+ENVELOPE", "Test SDF Network ; September 2015")
                    .await
            }
        });

        let popup = wait_for_popup(&host).await;
        assert_eq!(query(&popup, "intent").as_deref(), Some("tx"));
        assert_eq!(query(&popup, "xdr").as_deref(), Some("AAAA+ENVELOPE"));
        assert_eq!(query(&popup, "pubkey").as_deref(), Some("GALBEDO"));
        assert_eq!(
            query(&popup, "network").as_deref(),
            Some("Test SDF Network ; September 2015")
        );
        let request_id = query(&popup, "request_id").unwrap();
        host.post_message(reply(&request_id, serde_json::json!({"xdr": "SIGNED"})));

        assert_eq!(task.await.unwrap().unwrap(), "SIGNED");
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_not_installed_without_host() {
        let albedo = AlbedoWallet::new(None, Arc::new(MemoryStore::new()), PopupConfig::default());
        assert!(!albedo.is_installed());
    }
}
