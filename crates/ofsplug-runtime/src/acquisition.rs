//! Proxy acquisition.
//!
//! Decides how the authenticated client for an `open` is obtained: by token
//! exchange through the host, from inline credentials, or not at all.

use crate::config::AcquisitionConfig;
use crate::session::Session;
use ofsplug_core::{
    CallProcedureMessage, CallProcedureResultMessage, Credentials, Extra, OpenMessage, PendingCall,
    find_application,
};
use serde_json::{Value, json};

/// How the client for one `open` will be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Ask the host for a token for `application_key`, then build the client
    /// against `base_url`.
    Token {
        application_key: String,
        base_url: String,
    },
    /// Build the client right away from inline credentials.
    Credentials(Credentials),
    /// No way to authenticate; open without a client.
    Unauthenticated,
}

/// Choose the acquisition path for `open`.
///
/// A backend entry in the stored application registry takes precedence over
/// inline credentials.
pub fn plan<P>(session: &Session<P>, config: &AcquisitionConfig, open: &OpenMessage) -> Plan {
    let applications = session.applications();
    if let Some((key, app)) = find_application(&applications, &config.backend_application_type) {
        if let Some(base_url) = &app.resource_url {
            return Plan::Token {
                application_key: key.to_string(),
                base_url: base_url.clone(),
            };
        }
    }

    match open.secured_data.as_ref().and_then(|data| data.credentials()) {
        Some(credentials) => Plan::Credentials(credentials),
        None => Plan::Unauthenticated,
    }
}

/// The `callProcedure` payload asking the host for an access token.
pub fn token_request(call: &PendingCall, application_key: &str) -> CallProcedureMessage {
    CallProcedureMessage {
        call_id: call.id().to_string(),
        procedure: call.procedure().to_string(),
        params: Some(json!({ "applicationKey": application_key })),
        extra: Extra::new(),
    }
}

/// Why a token response could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenFailure {
    #[error("result carries no resultData")]
    NoResultData,
    #[error("host reported failure: {0}")]
    Reported(String),
    #[error("resultData has no token")]
    MissingToken,
}

/// Extract the access token from a `callProcedureResult`.
pub fn token_from_result(result: &CallProcedureResultMessage) -> Result<String, TokenFailure> {
    let data = match &result.result_data {
        Some(Value::Object(data)) => data,
        _ => return Err(TokenFailure::NoResultData),
    };

    if let Some(token) = data.get("token").and_then(Value::as_str).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let reported = data
        .get("error")
        .or_else(|| data.get("message"))
        .or_else(|| data.get("status").filter(|s| s.as_str() != Some("success")));
    match reported {
        Some(Value::String(reason)) => Err(TokenFailure::Reported(reason.clone())),
        Some(other) => Err(TokenFailure::Reported(other.to_string())),
        None => Err(TokenFailure::MissingToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use crate::session::APPLICATIONS;
    use ofsplug_core::SecuredData;

    fn session_with_registry(registry: &str) -> Session<()> {
        let mut session = Session::new("demo", Box::new(MemoryStore::new()));
        session.set_property(APPLICATIONS, registry).unwrap();
        session
    }

    fn open_with_credentials() -> OpenMessage {
        OpenMessage {
            secured_data: Some(SecuredData {
                ofs_instance: Some("acme".into()),
                ofs_client_id: Some("id".into()),
                ofs_client_secret: Some("secret".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn registry_entry_selects_token_path() {
        let session = session_with_registry(
            r#"{"core": {"type": "ofs", "resourceUrl": "https://core.example"}}"#,
        );
        let plan = plan(&session, &AcquisitionConfig::default(), &open_with_credentials());
        assert_eq!(
            plan,
            Plan::Token {
                application_key: "core".into(),
                base_url: "https://core.example".into(),
            }
        );
    }

    #[test]
    fn credentials_without_registry_entry() {
        let session = session_with_registry(
            r#"{"maps": {"type": "external", "resourceUrl": "https://maps.example"}}"#,
        );
        let plan = plan(&session, &AcquisitionConfig::default(), &open_with_credentials());
        assert!(matches!(plan, Plan::Credentials(c) if c.instance == "acme"));
    }

    #[test]
    fn nothing_to_authenticate_with() {
        let session: Session<()> = Session::new("demo", Box::new(MemoryStore::new()));
        let plan = plan(&session, &AcquisitionConfig::default(), &OpenMessage::default());
        assert_eq!(plan, Plan::Unauthenticated);
    }

    #[test]
    fn token_request_payload() {
        let call = PendingCall::new("getAccessToken");
        let request = token_request(&call, "core");
        assert_eq!(request.call_id, call.id());
        assert_eq!(request.procedure, "getAccessToken");
        assert_eq!(request.params.unwrap()["applicationKey"], "core");
    }

    fn result(data: Option<Value>) -> CallProcedureResultMessage {
        CallProcedureResultMessage {
            result_data: data,
            ..Default::default()
        }
    }

    #[test]
    fn token_results() {
        assert_eq!(
            token_from_result(&result(Some(json!({"token": "abc"})))),
            Ok("abc".into())
        );
        assert_eq!(
            token_from_result(&result(None)),
            Err(TokenFailure::NoResultData)
        );
        assert_eq!(
            token_from_result(&result(Some(json!("abc")))),
            Err(TokenFailure::NoResultData)
        );
        assert_eq!(
            token_from_result(&result(Some(json!({"token": ""})))),
            Err(TokenFailure::MissingToken)
        );
        assert_eq!(
            token_from_result(&result(Some(json!({"status": "error", "error": "denied"})))),
            Err(TokenFailure::Reported("denied".into()))
        );
        assert_eq!(
            token_from_result(&result(Some(json!({"status": "failed"})))),
            Err(TokenFailure::Reported("failed".into()))
        );
    }
}
