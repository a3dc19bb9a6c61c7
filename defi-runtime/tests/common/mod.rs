//! Test doubles shared by the runtime integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use defi_runtime::AutomationError;
use defi_runtime::executor::{ActionExecutor, ActionRef};
use defi_runtime::storage::{KeyValueStore, MemoryStore};
use defi_runtime::wallet::{ExtensionApi, ExtensionFailure, PopupConfig};
use defi_runtime::{
    ActionSpec, ConnectionSession, Network, StorageError, WalletEnvironment, WalletRegistry,
};
use tokio::sync::Notify;

// ── Extension double ─────────────────────────────────────────────────────────

/// Scriptable extension global.
pub struct FakeExtension {
    pub public_key: String,
    connected: AtomicBool,
    deny_access: AtomicBool,
    fail_disconnect: AtomicBool,
    pub disconnect_calls: AtomicUsize,
    pub sign_calls: AtomicUsize,
    /// When set, `connect` parks until released.
    gate: Option<Gate>,
}

pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl FakeExtension {
    pub fn new(public_key: &str) -> Self {
        Self {
            public_key: public_key.to_string(),
            connected: AtomicBool::new(false),
            deny_access: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            disconnect_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(public_key: &str) -> Self {
        Self {
            gate: Some(Gate {
                entered: Notify::new(),
                release: Notify::new(),
            }),
            ..Self::new(public_key)
        }
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("extension is not gated")
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn deny_access(&self) {
        self.deny_access.store(true, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExtensionApi for FakeExtension {
    async fn request_access(&self) -> Result<(), ExtensionFailure> {
        if self.deny_access.load(Ordering::SeqCst) {
            return Err(ExtensionFailure::Denied("User declined access".into()));
        }
        Ok(())
    }

    async fn connect(&self) -> Result<String, ExtensionFailure> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.request_access().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.public_key.clone())
    }

    async fn disconnect(&self) -> Result<(), ExtensionFailure> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ExtensionFailure::Other("extension crashed".into()));
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, ExtensionFailure> {
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn get_public_key(&self) -> Result<String, ExtensionFailure> {
        self.request_access().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.public_key.clone())
    }

    async fn sign_transaction(
        &self,
        envelope: &str,
        network_passphrase: &str,
    ) -> Result<String, ExtensionFailure> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("signed({envelope}|{network_passphrase})"))
    }
}

// ── Storage double ───────────────────────────────────────────────────────────

/// In-memory store whose writes to one key always fail.
pub struct FailingStore {
    inner: MemoryStore,
    failing_key: String,
}

impl FailingStore {
    pub fn failing_on(key: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_key: key.to_string(),
        }
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == self.failing_key {
            return Err(StorageError::Io("disk full".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

// ── Session helpers ──────────────────────────────────────────────────────────

pub fn session(env: &WalletEnvironment, storage: Arc<dyn KeyValueStore>) -> ConnectionSession {
    let registry = Arc::new(WalletRegistry::from_environment(
        env,
        storage.clone(),
        PopupConfig::default(),
    ));
    ConnectionSession::new(registry, storage, Network::Test)
}

// ── Action executor double ───────────────────────────────────────────────────

/// Counts every action it runs and fails the ones it was told to.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashMap<String, String>>,
}

impl RecordingExecutor {
    pub fn fail(&self, description: &str, error: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(description.to_string(), error.to_string());
    }

    pub fn calls(&self, description: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(description)
            .copied()
            .unwrap_or(0)
    }

    fn run(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(action.description.clone())
            .or_default() += 1;
        match self.failing.lock().unwrap().get(&action.description) {
            Some(error) => Err(AutomationError::ActionFailed(error.clone())),
            None => Ok(Some(format!("ref-{}", action.description))),
        }
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn trade(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.run(action)
    }

    async fn lend(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.run(action)
    }

    async fn rebalance(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.run(action)
    }

    async fn alert(&self, action: &ActionSpec) -> Result<ActionRef, AutomationError> {
        self.run(action)
    }
}
