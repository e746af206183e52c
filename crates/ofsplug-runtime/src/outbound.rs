//! Outbound messaging.
//!
//! Frames envelopes for the host and addresses them to the origin of the
//! document that embedded the plugin.

use crate::{ChannelError, PluginError};
use ofsplug_core::{API_VERSION, Envelope, Extra, Origin};
use serde_json::Value;
use tokio::sync::mpsc;

/// A message as handed to the host channel.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// JSON text (the default).
    Text(String),
    /// A structured object, when the host asked for `sendMessageAsJsObject`.
    Object(Value),
}

impl HostMessage {
    /// Decode back into a JSON value.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            HostMessage::Text(text) => serde_json::from_str(text),
            HostMessage::Object(value) => Ok(value.clone()),
        }
    }
}

/// A message addressed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub message: HostMessage,
    pub target_origin: Origin,
}

/// The transport to the host frame.
pub trait HostChannel: Send + Sync {
    fn post(&self, message: HostMessage, target_origin: &Origin) -> Result<(), ChannelError>;
}

impl HostChannel for mpsc::UnboundedSender<OutboundFrame> {
    fn post(&self, message: HostMessage, target_origin: &Origin) -> Result<(), ChannelError> {
        self.send(OutboundFrame {
            message,
            target_origin: target_origin.clone(),
        })
        .map_err(|_| ChannelError::Closed)
    }
}

/// Where the plugin document was loaded from.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingContext {
    /// The referring document's URL.
    pub referrer: Option<String>,
    /// Origins of the ancestor frames, nearest first.
    pub ancestor_origins: Vec<String>,
}

impl EmbeddingContext {
    pub fn from_referrer(referrer: impl Into<String>) -> Self {
        Self {
            referrer: Some(referrer.into()),
            ancestor_origins: Vec::new(),
        }
    }
}

/// Sends envelopes to the host.
pub struct Outbound {
    tag: String,
    channel: Box<dyn HostChannel>,
    embedding: EmbeddingContext,
    as_object: bool,
}

impl Outbound {
    pub fn new(tag: impl Into<String>, channel: Box<dyn HostChannel>, embedding: EmbeddingContext) -> Self {
        Self {
            tag: tag.into(),
            channel,
            embedding,
            as_object: false,
        }
    }

    /// Send structured objects instead of JSON text.
    pub fn set_as_object(&mut self, as_object: bool) {
        self.as_object = as_object;
    }

    /// The origin messages are delivered to, if one can be derived.
    pub fn target_origin(&self) -> Option<Origin> {
        Origin::derive(
            self.embedding.referrer.as_deref(),
            &self.embedding.ancestor_origins,
        )
    }

    /// Send `{apiVersion, method}` merged with `data`. Fields in `data` win.
    ///
    /// Returns `Ok(false)` when no destination origin could be derived; the
    /// message is then dropped rather than broadcast.
    pub fn send(&self, method: &str, data: Extra) -> Result<bool, PluginError> {
        let Some(origin) = self.target_origin() else {
            tracing::warn!(tag = %self.tag, method, "no target origin, message not sent");
            return Ok(false);
        };

        let mut envelope = Extra::new();
        envelope.insert("apiVersion".into(), API_VERSION.into());
        envelope.insert("method".into(), method.into());
        envelope.extend(data);
        let value = Value::Object(envelope);

        let message = if self.as_object {
            HostMessage::Object(value)
        } else {
            HostMessage::Text(serde_json::to_string(&value)?)
        };

        tracing::debug!(tag = %self.tag, method, origin = %origin, "sending message");
        self.channel.post(message, &origin)?;
        Ok(true)
    }

    /// Send a typed envelope.
    pub fn send_envelope(&self, envelope: Envelope) -> Result<bool, PluginError> {
        let method = envelope.method().to_string();
        self.send(&method, envelope.into_fields()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outbound(embedding: EmbeddingContext) -> (Outbound, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbound::new("test", Box::new(tx), embedding), rx)
    }

    fn fields(value: Value) -> Extra {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn sends_to_referrer_origin() {
        let (out, mut rx) = outbound(EmbeddingContext::from_referrer("https://host.example/app/path"));
        assert!(out.send("close", fields(json!({"activity": {"aid": "1"}}))).unwrap());

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.target_origin.to_string(), "https://host.example");
        assert_eq!(
            frame.message.to_value().unwrap(),
            json!({"apiVersion": 1, "method": "close", "activity": {"aid": "1"}})
        );
        assert!(matches!(frame.message, HostMessage::Text(_)));
    }

    #[test]
    fn caller_fields_win() {
        let (out, mut rx) = outbound(EmbeddingContext::from_referrer("https://host.example"));
        out.send("update", fields(json!({"apiVersion": 2, "method": "close"}))).unwrap();
        let value = rx.try_recv().unwrap().message.to_value().unwrap();
        assert_eq!(value, json!({"apiVersion": 2, "method": "close"}));
    }

    #[test]
    fn falls_back_to_ancestor_origin() {
        let (out, mut rx) = outbound(EmbeddingContext {
            referrer: None,
            ancestor_origins: vec!["https://parent.example".into()],
        });
        out.send("ready", Extra::new()).unwrap();
        assert_eq!(rx.try_recv().unwrap().target_origin.to_string(), "https://parent.example");
    }

    #[test]
    fn no_origin_means_no_send() {
        let (out, mut rx) = outbound(EmbeddingContext::from_referrer(""));
        assert!(!out.send("ready", Extra::new()).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn object_mode() {
        let (mut out, mut rx) = outbound(EmbeddingContext::from_referrer("https://host.example"));
        out.set_as_object(true);
        out.send("ready", Extra::new()).unwrap();
        assert_eq!(
            rx.try_recv().unwrap().message,
            HostMessage::Object(json!({"apiVersion": 1, "method": "ready"}))
        );
    }

    #[test]
    fn closed_channel_is_an_error() {
        let (out, rx) = outbound(EmbeddingContext::from_referrer("https://host.example"));
        drop(rx);
        assert!(matches!(
            out.send("ready", Extra::new()),
            Err(PluginError::Channel(ChannelError::Closed))
        ));
    }
}
