use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Updater configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Courtesy pause after each device's pass.
    #[serde(default = "default_device_delay")]
    pub device_delay_secs: u64,
    /// Extensions that are distributed but not installable on a device.
    #[serde(default = "default_non_installable")]
    pub non_installable_extensions: Vec<String>,
    pub market: MarketSettings,
    pub signing: SigningSettings,
    #[serde(default)]
    pub notify: NotifySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Download URLs pointing at this host are fetched through the store API
    /// instead of directly.
    #[serde(default = "default_store_host")]
    pub web_host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningSettings {
    pub private_key_path: PathBuf,
    #[serde(default)]
    pub passphrase: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifySettings {
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            from: default_from(),
            recipients: Vec::new(),
        }
    }
}

fn default_platform() -> String {
    "android".to_string()
}

fn default_device_delay() -> u64 {
    2
}

fn default_non_installable() -> Vec<String> {
    vec!["pdf".to_string(), "html".to_string()]
}

fn default_store_host() -> String {
    "play.google.com".to_string()
}

fn default_from() -> String {
    "bundleman@localhost".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("bundleman.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "./data"

            [market]
            base_url = "https://store.example.com"
            username = "ops@example.org"
            password = "secret"

            [signing]
            private_key_path = "./signing.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.platform, "android");
        assert_eq!(config.device_delay_secs, 2);
        assert_eq!(config.non_installable_extensions, ["pdf", "html"]);
        assert_eq!(config.market.web_host, "play.google.com");
        assert!(config.notify.recipients.is_empty());
        assert_eq!(config.db_path(), PathBuf::from("./data/bundleman.db"));
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/var/lib/bundleman"
            device_delay_secs = 0
            non_installable_extensions = ["pdf"]

            [market]
            base_url = "https://store.example.com"
            username = "ops@example.org"
            password = "secret"
            web_host = "store.example.com"

            [signing]
            private_key_path = "/etc/bundleman/signing.pem"
            passphrase = "hunter2"

            [notify]
            from = "updater@example.org"
            recipients = ["ops@example.org", "oncall@example.org"]
            "#,
        )
        .unwrap();

        assert_eq!(config.device_delay_secs, 0);
        assert_eq!(config.notify.recipients.len(), 2);
        assert_eq!(config.signing.passphrase, "hunter2");
    }
}
