//! Secured credentials passed inline by the host.

use crate::Extra;
use serde::{Deserialize, Serialize};

/// The `securedData` block of an `open` message.
///
/// Contains whatever secured parameters the plugin was configured with.
/// The backend client credentials are recognised by name; the rest are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuredData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofs_instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofs_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofs_client_secret: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl SecuredData {
    /// Backend client credentials, if all three parts are present and non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        let non_empty = |s: &Option<String>| s.as_deref().filter(|s| !s.is_empty()).map(String::from);
        Some(Credentials {
            instance: non_empty(&self.ofs_instance)?,
            client_id: non_empty(&self.ofs_client_id)?,
            client_secret: non_empty(&self.ofs_client_secret)?,
        })
    }
}

/// Client credentials for building the backend client directly.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Instance name (the tenant).
    pub instance: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("instance", &self.instance)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
