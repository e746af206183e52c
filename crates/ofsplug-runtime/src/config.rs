//! Plugin configuration.

use ofsplug_core::ReadyMessage;
use serde::Deserialize;
use std::time::Duration;

/// Settings an embedding plugin supplies at setup time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Stable plugin identifier. Namespaces persisted properties and tags logs.
    pub tag: String,
    pub ready: ReadyOptions,
    pub acquisition: AcquisitionConfig,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            tag: "ofsplug".into(),
            ready: ReadyOptions::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl PluginConfig {
    /// Default configuration under a different tag.
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// Capability flags announced in the `ready` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadyOptions {
    pub send_init_data: bool,
    pub show_header: bool,
    pub enable_back_button: bool,
    /// Ask the host to exchange JSON objects instead of strings.
    pub send_message_as_js_object: bool,
    pub dependencies: Vec<String>,
}

impl Default for ReadyOptions {
    fn default() -> Self {
        Self {
            send_init_data: true,
            show_header: false,
            enable_back_button: false,
            send_message_as_js_object: false,
            dependencies: Vec::new(),
        }
    }
}

impl ReadyOptions {
    /// The `ready` payload for these options.
    pub fn to_message(&self) -> ReadyMessage {
        ReadyMessage {
            send_init_data: Some(self.send_init_data),
            show_header: Some(self.show_header),
            enable_back_button: Some(self.enable_back_button),
            send_message_as_js_object: Some(self.send_message_as_js_object),
            dependencies: (!self.dependencies.is_empty()).then(|| self.dependencies.clone()),
            extra: Default::default(),
        }
    }
}

/// How the authenticated client is obtained from the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// How long `open` waits for the token before proceeding without a client.
    pub token_timeout_ms: u64,
    /// Application type that marks the backend service in the init registry.
    pub backend_application_type: String,
    /// Host procedure that returns an access token.
    pub token_procedure: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            token_timeout_ms: 5_000,
            backend_application_type: "ofs".into(),
            token_procedure: "getAccessToken".into(),
        }
    }
}

impl AcquisitionConfig {
    pub fn token_timeout(&self) -> Duration {
        Duration::from_millis(self.token_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: PluginConfig = serde_json::from_str(
            r#"{"tag": "demo", "ready": {"show_header": true}, "acquisition": {"token_timeout_ms": 250}}"#,
        )
        .unwrap();
        assert_eq!(config.tag, "demo");
        assert!(config.ready.send_init_data);
        assert!(config.ready.show_header);
        assert_eq!(config.acquisition.token_timeout(), Duration::from_millis(250));
        assert_eq!(config.acquisition.token_procedure, "getAccessToken");
    }

    #[test]
    fn ready_message_from_options() {
        let ready = ReadyOptions::default().to_message();
        assert_eq!(ready.send_init_data, Some(true));
        assert_eq!(ready.show_header, Some(false));
        assert_eq!(ready.dependencies, None);
    }
}
