//! Hub configuration.
//!
//! Layered: built-in defaults, then an optional TOML file (`DEFI_HUB_CONFIG`,
//! falling back to `defi-hub.toml` in the working directory), then `DEFI_HUB_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use defi_runtime::Network;
use defi_runtime::automation::{DEFAULT_HISTORY_CAP, DEFAULT_TICK_INTERVAL_SECS};
use defi_runtime::wallet::popup::DEFAULT_POPUP_TIMEOUT_SECS;

pub const CONFIG_PATH_VAR: &str = "DEFI_HUB_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "defi-hub.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub network: Network,
    /// Derived from `network` when unset.
    pub horizon_url: Option<String>,
    /// Static price table when unset.
    pub market_data_url: Option<String>,
    pub api_bind: String,
    pub api_token: String,
    pub cors_origins: String,
    pub state_dir: PathBuf,
    pub scheduler_interval_secs: u64,
    pub execution_history_cap: usize,
    pub popup_timeout_secs: u64,
    /// Callback origin handed to the popup wallet.
    pub popup_origin: String,
    /// Sign and submit through the connected wallet instead of paper trading.
    pub live_execution: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            network: Network::Test,
            horizon_url: None,
            market_data_url: None,
            api_bind: "127.0.0.1:9300".to_string(),
            api_token: String::new(),
            cors_origins: String::new(),
            state_dir: PathBuf::from(".defi-hub"),
            scheduler_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            execution_history_cap: DEFAULT_HISTORY_CAP,
            popup_timeout_secs: DEFAULT_POPUP_TIMEOUT_SECS,
            popup_origin: "http://localhost:3000".to_string(),
            live_execution: false,
        }
    }
}

impl HubConfig {
    /// Defaults, then the config file if one exists, then the process env.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Invalid hub config: {e}"))
    }

    /// Override fields from `DEFI_HUB_*` variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEFI_HUB_NETWORK") {
            self.network = v.parse()?;
        }
        if let Some(v) = lookup("DEFI_HUB_HORIZON_URL") {
            self.horizon_url = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = lookup("DEFI_HUB_MARKET_DATA_URL") {
            self.market_data_url = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = lookup("DEFI_HUB_API_BIND") {
            self.api_bind = v;
        }
        if let Some(v) = lookup("DEFI_HUB_API_TOKEN") {
            self.api_token = v;
        }
        if let Some(v) = lookup("DEFI_HUB_CORS_ORIGINS") {
            self.cors_origins = v;
        }
        if let Some(v) = lookup("DEFI_HUB_STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DEFI_HUB_SCHEDULER_INTERVAL_SECS") {
            self.scheduler_interval_secs = parse_var("DEFI_HUB_SCHEDULER_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("DEFI_HUB_EXECUTION_HISTORY_CAP") {
            self.execution_history_cap = parse_var("DEFI_HUB_EXECUTION_HISTORY_CAP", &v)?;
        }
        if let Some(v) = lookup("DEFI_HUB_POPUP_TIMEOUT_SECS") {
            self.popup_timeout_secs = parse_var("DEFI_HUB_POPUP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("DEFI_HUB_POPUP_ORIGIN") {
            self.popup_origin = v;
        }
        if let Some(v) = lookup("DEFI_HUB_LIVE_EXECUTION") {
            self.live_execution = v.eq_ignore_ascii_case("true") || v == "1";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_token.is_empty() {
            return Err("DEFI_HUB_API_TOKEN must be set".to_string());
        }
        if self.scheduler_interval_secs == 0 {
            return Err("scheduler_interval_secs must be positive".to_string());
        }
        if self.popup_timeout_secs == 0 {
            return Err("popup_timeout_secs must be positive".to_string());
        }
        Ok(())
    }

    pub fn horizon_url(&self) -> &str {
        self.horizon_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_horizon_url())
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn popup_timeout(&self) -> Duration {
        Duration::from_secs(self.popup_timeout_secs)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.state_dir.join("storage.json")
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{key} has an invalid value: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.network, Network::Test);
        assert_eq!(config.scheduler_interval(), Duration::from_secs(30));
        assert_eq!(config.execution_history_cap, 500);
        assert_eq!(config.popup_timeout(), Duration::from_secs(300));
        assert_eq!(config.api_bind, "127.0.0.1:9300");
        assert_eq!(config.horizon_url(), "https://horizon-testnet.stellar.org");
        assert!(!config.live_execution);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HubConfig::from_toml(
            r#"
            network = "main"
            api_token = "secret"
            market_data_url = "http://prices.local"
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Main);
        assert_eq!(config.horizon_url(), "https://horizon.stellar.org");
        assert_eq!(config.market_data_url.as_deref(), Some("http://prices.local"));
        assert_eq!(config.scheduler_interval_secs, 30);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(HubConfig::from_toml("network = \"moon\"").is_err());
        assert!(HubConfig::from_toml("scheduler_interval_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = HubConfig::from_toml("api_token = \"from-file\"\nnetwork = \"main\"").unwrap();
        config
            .apply_env(env(&[
                ("DEFI_HUB_API_TOKEN", "from-env"),
                ("DEFI_HUB_NETWORK", "testnet"),
                ("DEFI_HUB_SCHEDULER_INTERVAL_SECS", "5"),
                ("DEFI_HUB_HORIZON_URL", "http://horizon.local"),
                ("DEFI_HUB_LIVE_EXECUTION", "true"),
            ]))
            .unwrap();

        assert_eq!(config.api_token, "from-env");
        assert_eq!(config.network, Network::Test);
        assert_eq!(config.scheduler_interval_secs, 5);
        assert_eq!(config.horizon_url(), "http://horizon.local");
        assert!(config.live_execution);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = HubConfig::default();
        let err = config
            .apply_env(env(&[("DEFI_HUB_EXECUTION_HISTORY_CAP", "lots")]))
            .unwrap_err();
        assert!(err.contains("DEFI_HUB_EXECUTION_HISTORY_CAP"));
    }

    #[test]
    fn test_validate() {
        assert!(HubConfig::default().validate().is_err());

        let config = HubConfig {
            api_token: "t".into(),
            ..HubConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = HubConfig {
            api_token: "t".into(),
            scheduler_interval_secs: 0,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, "api_token = \"x\"\nstate_dir = \"/var/lib/hub\"").unwrap();

        let config = HubConfig::from_file(&path).unwrap();
        assert_eq!(config.storage_path(), PathBuf::from("/var/lib/hub/storage.json"));
        assert!(HubConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
