//! Core types for the field-service plugin host protocol.
//!
//! This crate provides the protocol primitives: the envelope model, call
//! identifiers, and origin derivation. The runtime that drives a plugin
//! instance lives in `ofsplug-runtime`.

mod call_id;
mod credentials;
mod message;
mod origin;

pub use call_id::{CALL_ID_LEN, PendingCall, generate_call_id};
pub use credentials::{Credentials, SecuredData};
pub use message::{
    API_VERSION, CallProcedureMessage, CallProcedureResultMessage, CloseMessage, Envelope,
    ErrorMessage, Extra, InitEndMessage, InitMessage, MISSING_API_VERSION, Message, Method,
    NO_METHOD, OpenMessage, ReadyMessage, UpdateMessage, UpdateResultMessage, WakeupMessage,
};
pub use origin::{Origin, OriginError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment the host is running in.
///
/// Sent by the host on most lifecycle messages. The last one seen wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Human-readable environment name (e.g. "prod", "test").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,
    /// Field-service application URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_url: Option<String>,
    /// Fusion application URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_url: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// An application declared by the host in the `init` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application type. The backend service is marked `"ofs"` by default.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Base URL of the application's resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host-declared application registry, keyed by application key.
pub type Applications = BTreeMap<String, Application>;

/// Find the first application of the given type that has a resource URL.
pub fn find_application<'a>(
    applications: &'a Applications,
    kind: &str,
) -> Option<(&'a str, &'a Application)> {
    applications
        .iter()
        .find(|(_, app)| app.kind.as_deref() == Some(kind) && app.resource_url.is_some())
        .map(|(key, app)| (key.as_str(), app))
}

/// Plugin lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, nothing sent yet.
    #[default]
    Created,
    /// `ready` sent, waiting for `init` or `open`.
    Ready,
    /// `initEnd` sent.
    Initialized,
    /// `open` received, waiting on proxy acquisition.
    Opening,
    /// `open` handler has run.
    Open,
    /// `close` sent.
    Closed,
}
