//! Protocol messages.
//!
//! Every message exchanged with the host is a JSON object with a `method`
//! tag and an `apiVersion`. The remaining fields depend on the method.
//! Fields this crate does not know about are kept in each payload's `extra`
//! map so plugins can read vendor-specific properties.

use crate::{Applications, Environment, SecuredData};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version stamped on every outbound message.
pub const API_VERSION: i64 = 1;

/// `apiVersion` of a message that did not carry one.
pub const MISSING_API_VERSION: i64 = -1;

/// Method name of the sentinel envelope produced from malformed input.
pub const NO_METHOD: &str = "no method";

/// Unknown fields of a payload.
pub type Extra = serde_json::Map<String, Value>;

/// Method tags understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ready,
    Init,
    InitEnd,
    Open,
    Update,
    UpdateResult,
    Close,
    CallProcedure,
    CallProcedureResult,
    Error,
    Wakeup,
}

impl Method {
    /// The wire name of this method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Ready => "ready",
            Method::Init => "init",
            Method::InitEnd => "initEnd",
            Method::Open => "open",
            Method::Update => "update",
            Method::UpdateResult => "updateResult",
            Method::Close => "close",
            Method::CallProcedure => "callProcedure",
            Method::CallProcedureResult => "callProcedureResult",
            Method::Error => "error",
            Method::Wakeup => "wakeup",
        }
    }

    /// Look up a method by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ready" => Method::Ready,
            "init" => Method::Init,
            "initEnd" => Method::InitEnd,
            "open" => Method::Open,
            "update" => Method::Update,
            "updateResult" => Method::UpdateResult,
            "close" => Method::Close,
            "callProcedure" => Method::CallProcedure,
            "callProcedureResult" => Method::CallProcedureResult,
            "error" => Method::Error,
            "wakeup" => Method::Wakeup,
            _ => return None,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin announces itself and the protocol features it wants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_init_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_back_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_message_as_js_object: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host delivers init data (sent once, when `sendInitData` was requested).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<Applications>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_description: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Plugin finished processing init data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitEndMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wakeup_needed: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host opens the plugin for an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenMessage {
    /// Entity the plugin was opened for (e.g. "activity").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secured_data: Option<SecuredData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Plugin pushes updated data to the host without closing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host reports the outcome of an `update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResultMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Plugin closes, optionally returning data to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseMessage {
    #[serde(flatten)]
    pub extra: Extra,
}

/// Plugin asks the host to run a procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallProcedureMessage {
    pub call_id: String,
    pub procedure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host returns the result of a procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallProcedureResultMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host reports errors with a previous plugin message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Host wakes the plugin up in the background.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeupMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A message, keyed by method.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Message {
    Ready(ReadyMessage),
    Init(InitMessage),
    InitEnd(InitEndMessage),
    Open(OpenMessage),
    Update(UpdateMessage),
    UpdateResult(UpdateResultMessage),
    Close(CloseMessage),
    CallProcedure(CallProcedureMessage),
    CallProcedureResult(CallProcedureResultMessage),
    Error(ErrorMessage),
    Wakeup(WakeupMessage),
    /// Well-formed message with a method this protocol does not define.
    Unrecognized { method: String, extra: Extra },
    /// Input could not be understood at all.
    #[default]
    NoMethod,
}

impl Message {
    /// The method tag as it appears on the wire.
    pub fn method(&self) -> &str {
        match self {
            Message::Ready(_) => Method::Ready.as_str(),
            Message::Init(_) => Method::Init.as_str(),
            Message::InitEnd(_) => Method::InitEnd.as_str(),
            Message::Open(_) => Method::Open.as_str(),
            Message::Update(_) => Method::Update.as_str(),
            Message::UpdateResult(_) => Method::UpdateResult.as_str(),
            Message::Close(_) => Method::Close.as_str(),
            Message::CallProcedure(_) => Method::CallProcedure.as_str(),
            Message::CallProcedureResult(_) => Method::CallProcedureResult.as_str(),
            Message::Error(_) => Method::Error.as_str(),
            Message::Wakeup(_) => Method::Wakeup.as_str(),
            Message::Unrecognized { method, .. } => method,
            Message::NoMethod => NO_METHOD,
        }
    }

    /// The environment descriptor carried by this message, if any.
    pub fn environment(&self) -> Option<&Environment> {
        match self {
            Message::Init(m) => m.environment.as_ref(),
            Message::Open(m) => m.environment.as_ref(),
            Message::UpdateResult(m) => m.environment.as_ref(),
            Message::CallProcedureResult(m) => m.environment.as_ref(),
            Message::Error(m) => m.environment.as_ref(),
            Message::Wakeup(m) => m.environment.as_ref(),
            _ => None,
        }
    }

    fn payload(&self) -> Result<Extra, serde_json::Error> {
        let value = match self {
            Message::Ready(m) => serde_json::to_value(m)?,
            Message::Init(m) => serde_json::to_value(m)?,
            Message::InitEnd(m) => serde_json::to_value(m)?,
            Message::Open(m) => serde_json::to_value(m)?,
            Message::Update(m) => serde_json::to_value(m)?,
            Message::UpdateResult(m) => serde_json::to_value(m)?,
            Message::Close(m) => serde_json::to_value(m)?,
            Message::CallProcedure(m) => serde_json::to_value(m)?,
            Message::CallProcedureResult(m) => serde_json::to_value(m)?,
            Message::Error(m) => serde_json::to_value(m)?,
            Message::Wakeup(m) => serde_json::to_value(m)?,
            Message::Unrecognized { extra, .. } => return Ok(extra.clone()),
            Message::NoMethod => return Ok(Extra::new()),
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Extra::new()),
        }
    }
}

/// One message unit exchanged with the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub api_version: i64,
    pub message: Message,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            api_version: MISSING_API_VERSION,
            message: Message::NoMethod,
        }
    }
}

impl Envelope {
    /// Wrap a message with the current protocol version.
    pub fn new(message: Message) -> Self {
        Self {
            api_version: API_VERSION,
            message,
        }
    }

    /// Parse a raw message. Never fails: anything malformed becomes the
    /// "no method" envelope.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw)
            .map(Self::from_value)
            .unwrap_or_default()
    }

    /// Interpret an already-decoded JSON value. Never fails.
    pub fn from_value(value: Value) -> Self {
        Self::try_from_value(value).unwrap_or_default()
    }

    fn try_from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let method = match map.remove("method") {
            Some(Value::String(method)) => method,
            _ => return None,
        };
        let api_version = match map.remove("apiVersion") {
            None | Some(Value::Null) => MISSING_API_VERSION,
            Some(Value::Number(n)) => n.as_i64()?,
            Some(Value::String(s)) => s.trim().parse().ok()?,
            Some(_) => return None,
        };

        let message = match Method::from_name(&method) {
            None => Message::Unrecognized { method, extra: map },
            Some(method) => decode(method, map)?,
        };
        Some(Self {
            api_version,
            message,
        })
    }

    /// The method tag.
    pub fn method(&self) -> &str {
        self.message.method()
    }

    /// Render as a JSON object with `method` and `apiVersion` set.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut map = Extra::new();
        map.insert("apiVersion".into(), self.api_version.into());
        map.insert("method".into(), self.method().into());
        map.extend(self.message.payload()?);
        Ok(Value::Object(map))
    }

    /// The message fields without `method` and `apiVersion`.
    pub fn into_fields(self) -> Result<Extra, serde_json::Error> {
        self.message.payload()
    }
}

fn decode(method: Method, fields: Extra) -> Option<Message> {
    fn typed<T: DeserializeOwned>(fields: Extra) -> Option<T> {
        serde_json::from_value(Value::Object(fields)).ok()
    }

    Some(match method {
        Method::Ready => Message::Ready(typed(fields)?),
        Method::Init => Message::Init(typed(fields)?),
        Method::InitEnd => Message::InitEnd(typed(fields)?),
        Method::Open => Message::Open(typed(fields)?),
        Method::Update => Message::Update(typed(fields)?),
        Method::UpdateResult => Message::UpdateResult(typed(fields)?),
        Method::Close => Message::Close(typed(fields)?),
        Method::CallProcedure => Message::CallProcedure(typed(fields)?),
        Method::CallProcedureResult => Message::CallProcedureResult(typed(fields)?),
        Method::Error => Message::Error(typed(fields)?),
        Method::Wakeup => Message::Wakeup(typed(fields)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_no_method(raw: &str) {
        let envelope = Envelope::parse(raw);
        assert_eq!(envelope.method(), NO_METHOD, "input: {raw:?}");
        assert_eq!(envelope.api_version, MISSING_API_VERSION, "input: {raw:?}");
    }

    #[test]
    fn malformed_input_becomes_no_method() {
        for raw in [
            "",
            "   ",
            "not json",
            "{",
            "null",
            "42",
            "\"open\"",
            "[1, 2, 3]",
            "{}",
            r#"{"apiVersion": 1}"#,
            r#"{"method": 5, "apiVersion": 1}"#,
            r#"{"method": null}"#,
            r#"{"method": "open", "apiVersion": {"major": 1}}"#,
            r#"{"method": "open", "apiVersion": 1, "entity": 17}"#,
            r#"{"method": "init", "applications": "nope"}"#,
            r#"{"method": "callProcedure", "apiVersion": 1}"#,
        ] {
            assert_no_method(raw);
        }
    }

    #[test]
    fn missing_api_version_defaults() {
        let envelope = Envelope::parse(r#"{"method": "wakeup"}"#);
        assert_eq!(envelope.method(), "wakeup");
        assert_eq!(envelope.api_version, MISSING_API_VERSION);
    }

    #[test]
    fn parse_open() {
        let envelope = Envelope::parse(
            r#"{
                "apiVersion": 1,
                "method": "open",
                "entity": "activity",
                "activity": {"aid": "4225"},
                "securedData": {"ofsInstance": "acme", "ofsClientId": "id", "ofsClientSecret": "s"},
                "environment": {"environmentName": "test", "fsUrl": "https://fs", "faUrl": "https://fa"}
            }"#,
        );
        assert_eq!(envelope.api_version, 1);
        let Message::Open(open) = &envelope.message else {
            panic!("expected open, got {envelope:?}");
        };
        assert_eq!(open.entity.as_deref(), Some("activity"));
        assert_eq!(open.extra["activity"]["aid"], "4225");
        assert!(open.secured_data.as_ref().unwrap().credentials().is_some());
        assert_eq!(
            envelope.message.environment().unwrap().environment_name.as_deref(),
            Some("test")
        );
    }

    #[test]
    fn parse_call_procedure_result() {
        let envelope = Envelope::parse(
            r#"{"apiVersion": 1, "method": "callProcedureResult", "callId": "abc",
                "procedure": "getAccessToken", "resultData": {"token": "t"}}"#,
        );
        let Message::CallProcedureResult(result) = envelope.message else {
            panic!("expected callProcedureResult");
        };
        assert_eq!(result.call_id.as_deref(), Some("abc"));
        assert_eq!(result.result_data.unwrap()["token"], "t");
    }

    #[test]
    fn unrecognized_method_is_kept() {
        let envelope = Envelope::parse(r#"{"apiVersion": 1, "method": "teleport", "to": "mars"}"#);
        match envelope.message {
            Message::Unrecognized { method, extra } => {
                assert_eq!(method, "teleport");
                assert_eq!(extra["to"], "mars");
            }
            other => panic!("expected unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn string_api_version_is_accepted() {
        let envelope = Envelope::parse(r#"{"apiVersion": "1", "method": "wakeup"}"#);
        assert_eq!(envelope.api_version, 1);
    }

    #[test]
    fn to_value_includes_method_and_version() {
        let envelope = Envelope::new(Message::CallProcedure(CallProcedureMessage {
            call_id: "abc".into(),
            procedure: "getAccessToken".into(),
            params: Some(json!({"applicationKey": "core"})),
            extra: Extra::new(),
        }));
        assert_eq!(
            envelope.to_value().unwrap(),
            json!({
                "apiVersion": 1,
                "method": "callProcedure",
                "callId": "abc",
                "procedure": "getAccessToken",
                "params": {"applicationKey": "core"}
            })
        );
    }

    #[test]
    fn extra_fields_survive_reencoding() {
        let raw = json!({"apiVersion": 1, "method": "wakeup", "vendor": {"x": 1}});
        let envelope = Envelope::from_value(raw.clone());
        assert_eq!(envelope.to_value().unwrap(), raw);
    }

    #[test]
    fn method_names_round_trip() {
        for method in [
            Method::Ready,
            Method::Init,
            Method::InitEnd,
            Method::Open,
            Method::Update,
            Method::UpdateResult,
            Method::Close,
            Method::CallProcedure,
            Method::CallProcedureResult,
            Method::Error,
            Method::Wakeup,
        ] {
            assert_eq!(Method::from_name(method.as_str()), Some(method));
        }
        assert_eq!(Method::from_name(NO_METHOD), None);
    }
}
