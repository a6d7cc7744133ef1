use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

use crate::gateway::aligo::DEFAULT_BASE_URL;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "sendbook";

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    /// Override for the JSON document directory; platform data dir otherwise.
    pub data_dir: Option<PathBuf>,
    /// Where chat hand-off documents are written.
    pub handoff_dir: PathBuf,
    pub gateway: GatewayConfig,
}

/// Vendor account settings. Local commands never touch these; network
/// commands call [`GatewayConfig::validate`] first.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub user_id: String,
    pub sender: String,
    pub base_url: String,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("gateway.api_key is not configured");
        }
        if self.user_id.trim().is_empty() {
            bail!("gateway.user_id is not configured");
        }
        if self.sender.trim().is_empty() {
            bail!("gateway.sender is not configured");
        }
        Ok(())
    }
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    handoff_dir: Option<PathBuf>,
    gateway: GatewayFile,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct GatewayFile {
    api_key: String,
    user_id: String,
    sender: String,
    base_url: Option<String>,
}

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from(["data_dir", "handoff_dir", "gateway"]);
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            eprintln!("warning: unknown configuration key `{}`", key);
        }
    }

    if let Some(gateway) = table.get("gateway").and_then(|v| v.as_table()) {
        let known = HashSet::from(["api_key", "user_id", "sender", "base_url"]);
        for key in gateway.keys() {
            if !known.contains(key.as_str()) {
                eprintln!("warning: unknown gateway.* entry `{}`", key);
            }
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME).join(CONFIG_FILE_NAME))
}

fn default_handoff_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.data_dir().join(APP_NAME).join("handoff"))
}

/// Loads the configuration. A missing file is not an error; every setting
/// has a default and the gateway credentials are only checked when a network
/// command needs them.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => expand_tilde(path),
        None => default_config_path()?,
    };

    let cfg_file = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {} as TOML", path.display()))?;
        warn_unknown_keys(&value);
        value
            .try_into()
            .with_context(|| format!("failed to deserialize config from {}", path.display()))?
    } else {
        ConfigFile::default()
    };

    let handoff_dir = match cfg_file.handoff_dir {
        Some(dir) => expand_tilde(&dir),
        None => default_handoff_dir()?,
    };

    Ok(Config {
        config_path: path,
        data_dir: cfg_file.data_dir.as_deref().map(expand_tilde),
        handoff_dir,
        gateway: GatewayConfig {
            api_key: cfg_file.gateway.api_key,
            user_id: cfg_file.gateway.user_id,
            sender: cfg_file.gateway.sender,
            base_url: cfg_file
                .gateway
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn a_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.gateway.base_url, DEFAULT_BASE_URL);
        assert!(config.data_dir.is_none());
        assert!(config.gateway.validate().is_err());
    }

    #[test]
    fn a_populated_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
data_dir = "/tmp/book"
handoff_dir = "/tmp/handoff"

[gateway]
api_key = "k"
user_id = "u"
sender = "01000000000"
"#,
        )
        .unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/tmp/book")));
        assert_eq!(config.handoff_dir, PathBuf::from("/tmp/handoff"));
        assert!(config.gateway.validate().is_ok());
        assert_eq!(config.gateway.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn partial_gateway_credentials_fail_validation() {
        let gateway = GatewayConfig {
            api_key: "k".to_string(),
            user_id: " ".to_string(),
            sender: "01000000000".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        };
        assert!(gateway.validate().is_err());
    }
}
