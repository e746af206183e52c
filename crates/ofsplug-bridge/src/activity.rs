//! Demonstration activity plugin.
//!
//! Opens on an activity, notes whether a backend client is available, and
//! closes right away returning the activity id to the host.

use ofsplug_core::{
    CallProcedureResultMessage, ErrorMessage, Extra, InitEndMessage, InitMessage, OpenMessage,
    WakeupMessage,
};
use ofsplug_runtime::{Context, OfsProxy, PluginError, PluginHandler, async_trait};
use serde_json::{Value, json};

/// Property remembering the last activity this plugin was opened for.
const LAST_ACTIVITY: &str = "lastActivity";

#[derive(Debug, Default)]
pub struct ActivityPlugin;

#[async_trait]
impl PluginHandler for ActivityPlugin {
    type Proxy = OfsProxy;

    async fn init(
        &mut self,
        cx: &mut Context<'_, OfsProxy>,
        message: InitMessage,
    ) -> Result<InitEndMessage, PluginError> {
        let attributes = match &message.attribute_description {
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        };
        tracing::info!(tag = cx.tag(), attributes, "init");
        Ok(InitEndMessage::default())
    }

    async fn open(
        &mut self,
        cx: &mut Context<'_, OfsProxy>,
        message: OpenMessage,
    ) -> Result<(), PluginError> {
        let aid = message
            .extra
            .get("activity")
            .and_then(|a| a.get("aid"))
            .cloned()
            .unwrap_or(Value::Null);

        match cx.proxy() {
            Some(proxy) => tracing::info!(tag = cx.tag(), base_url = proxy.base_url(), %aid, "opened with backend client"),
            None => tracing::info!(tag = cx.tag(), %aid, "opened without backend client"),
        }

        if let Some(previous) = cx.init_property(LAST_ACTIVITY) {
            tracing::debug!(tag = cx.tag(), %previous, "previously opened activity");
        }
        cx.store_init_property(LAST_ACTIVITY, &aid.to_string())?;

        let mut data = Extra::new();
        if !aid.is_null() {
            data.insert("activity".into(), json!({ "aid": aid }));
        }
        cx.close(data)?;
        Ok(())
    }

    async fn error(
        &mut self,
        cx: &mut Context<'_, OfsProxy>,
        message: ErrorMessage,
    ) -> Result<(), PluginError> {
        let errors = message.errors.unwrap_or(Value::Null);
        tracing::warn!(tag = cx.tag(), %errors, "host reported errors");
        Ok(())
    }

    async fn wakeup(
        &mut self,
        cx: &mut Context<'_, OfsProxy>,
        _message: WakeupMessage,
    ) -> Result<(), PluginError> {
        tracing::info!(tag = cx.tag(), "woken up, nothing to do");
        Ok(())
    }

    async fn call_procedure_result(
        &mut self,
        cx: &mut Context<'_, OfsProxy>,
        message: CallProcedureResultMessage,
    ) -> Result<(), PluginError> {
        tracing::info!(
            tag = cx.tag(),
            call_id = message.call_id.as_deref().unwrap_or("-"),
            procedure = message.procedure.as_deref().unwrap_or("-"),
            "procedure result"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofsplug_runtime::{
        EmbeddingContext, MemoryStore, OfsProxyFactory, OutboundFrame, Plugin, PluginConfig,
    };
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn open_closes_with_activity_id() {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let mut plugin = Plugin::new(
            PluginConfig::with_tag("demo"),
            ActivityPlugin,
            OfsProxyFactory,
            Box::new(tx),
            EmbeddingContext::from_referrer("https://host.example/"),
            Box::new(MemoryStore::new()),
        );

        plugin
            .handle_raw(r#"{"apiVersion": 1, "method": "open", "entity": "activity", "activity": {"aid": "4225"}}"#)
            .await
            .unwrap();

        let close = rx.try_recv().unwrap().message.to_value().unwrap();
        assert_eq!(
            close,
            json!({"apiVersion": 1, "method": "close", "activity": {"aid": "4225"}})
        );
        assert_eq!(
            plugin.session().property(LAST_ACTIVITY).as_deref(),
            Some("\"4225\"")
        );
    }
}
