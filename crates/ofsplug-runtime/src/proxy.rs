//! The authenticated backend client ("proxy").
//!
//! The runtime only decides *when* and *from what* the client is built.
//! Building it is delegated to a [`ProxyFactory`].

use crate::ProxyError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ofsplug_core::Credentials;
use std::fmt;
use url::Url;

/// What the client is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyAuth {
    /// Client credentials supplied inline by the host.
    Credentials(Credentials),
    /// A token obtained from the host for a known base URL.
    Token { base_url: String, token: String },
}

/// Builds the authenticated client.
pub trait ProxyFactory: Send + Sync {
    type Proxy: Send + Sync;

    fn build(&self, auth: ProxyAuth) -> Result<Self::Proxy, ProxyError>;
}

/// Backend REST client settings: where to send requests and how to authorize.
#[derive(Clone, PartialEq, Eq)]
pub struct OfsProxy {
    base_url: String,
    authorization: String,
}

impl OfsProxy {
    /// Base URL requests are made against (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    /// Whether this client uses a host-issued token.
    pub fn is_token_based(&self) -> bool {
        self.authorization.starts_with("Bearer ")
    }
}

impl fmt::Debug for OfsProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfsProxy")
            .field("base_url", &self.base_url)
            .field("token_based", &self.is_token_based())
            .finish()
    }
}

/// Builds [`OfsProxy`] clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfsProxyFactory;

impl ProxyFactory for OfsProxyFactory {
    type Proxy = OfsProxy;

    fn build(&self, auth: ProxyAuth) -> Result<OfsProxy, ProxyError> {
        match auth {
            ProxyAuth::Credentials(creds) => {
                let basic = STANDARD.encode(format!(
                    "{}@{}:{}",
                    creds.client_id, creds.instance, creds.client_secret
                ));
                Ok(OfsProxy {
                    base_url: format!("https://{}.fs.ocs.oraclecloud.com", creds.instance),
                    authorization: format!("Basic {basic}"),
                })
            }
            ProxyAuth::Token { base_url, token } => {
                let parsed = Url::parse(base_url.trim())
                    .map_err(|_| ProxyError::InvalidBaseUrl(base_url.clone()))?;
                if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                    return Err(ProxyError::InvalidBaseUrl(base_url));
                }
                if token.is_empty() {
                    return Err(ProxyError::EmptyToken);
                }
                Ok(OfsProxy {
                    base_url: parsed.as_str().trim_end_matches('/').to_string(),
                    authorization: format!("Bearer {token}"),
                })
            }
        }
    }
}
