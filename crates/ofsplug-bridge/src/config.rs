//! Bridge configuration file.

use ofsplug_runtime::PluginConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Contents of the TOML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address to accept host connections on.
    pub listen: SocketAddr,
    /// JSON file for persisted plugin properties. In-memory when unset.
    pub store: Option<PathBuf>,
    pub plugin: PluginConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: ([127, 0, 0, 1], 8765).into(),
            store: None,
            plugin: PluginConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = BridgeConfig::parse("").unwrap();
        assert_eq!(config.listen.port(), 8765);
        assert!(config.store.is_none());
        assert_eq!(config.plugin.tag, "ofsplug");
    }

    #[test]
    fn full_file() {
        let config = BridgeConfig::parse(
            r#"
            listen = "0.0.0.0:9000"
            store = "/var/lib/ofsplug/store.json"

            [plugin]
            tag = "activity-checker"

            [plugin.ready]
            show_header = true
            dependencies = ["maps"]

            [plugin.acquisition]
            token_timeout_ms = 2500
            backend_application_type = "ofs"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.plugin.tag, "activity-checker");
        assert!(config.plugin.ready.show_header);
        assert_eq!(config.plugin.ready.dependencies, vec!["maps"]);
        assert_eq!(config.plugin.acquisition.token_timeout_ms, 2500);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(BridgeConfig::parse("listen = 5").is_err());
    }
}
