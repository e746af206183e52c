//! Extension points implemented by a concrete plugin.

use crate::outbound::Outbound;
use crate::session::Session;
use crate::PluginError;
use async_trait::async_trait;
use ofsplug_core::{
    CallProcedureMessage, CallProcedureResultMessage, Envelope, Environment, ErrorMessage, Extra,
    InitEndMessage, InitMessage, LifecycleState, Message, Method, OpenMessage, PendingCall,
    UpdateResultMessage, WakeupMessage,
};
use serde_json::Value;
use std::collections::VecDeque;

/// Handlers for host messages.
///
/// `init`, `open` and `update_result` have defaults. `error`, `wakeup` and
/// `call_procedure_result` must be implemented by every plugin.
///
/// Handlers run one at a time; the next host message is not processed until
/// the current handler returns.
#[async_trait]
pub trait PluginHandler: Send {
    /// The authenticated backend client type.
    type Proxy: Send + Sync;

    /// Host delivered init data. The returned message is sent as `initEnd`.
    async fn init(
        &mut self,
        _cx: &mut Context<'_, Self::Proxy>,
        _message: InitMessage,
    ) -> Result<InitEndMessage, PluginError> {
        Ok(InitEndMessage::default())
    }

    /// Plugin opened. Runs only after proxy acquisition has finished or
    /// been abandoned; `cx.proxy()` may be `None`.
    async fn open(
        &mut self,
        _cx: &mut Context<'_, Self::Proxy>,
        _message: OpenMessage,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn update_result(
        &mut self,
        _cx: &mut Context<'_, Self::Proxy>,
        _message: UpdateResultMessage,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Host rejected a previous message.
    async fn error(
        &mut self,
        cx: &mut Context<'_, Self::Proxy>,
        message: ErrorMessage,
    ) -> Result<(), PluginError>;

    /// Host woke the plugin in the background.
    async fn wakeup(
        &mut self,
        cx: &mut Context<'_, Self::Proxy>,
        message: WakeupMessage,
    ) -> Result<(), PluginError>;

    /// Result of a procedure call that is not the pending token request.
    async fn call_procedure_result(
        &mut self,
        cx: &mut Context<'_, Self::Proxy>,
        message: CallProcedureResultMessage,
    ) -> Result<(), PluginError>;
}

/// What a handler can see and do while it runs.
pub struct Context<'a, P> {
    pub(crate) session: &'a mut Session<P>,
    pub(crate) outbound: &'a Outbound,
    pub(crate) redeliveries: &'a mut VecDeque<Envelope>,
}

impl<P> Context<'_, P> {
    pub fn tag(&self) -> &str {
        self.session.tag()
    }

    /// The authenticated backend client, if one could be built.
    pub fn proxy(&self) -> Option<&P> {
        self.session.proxy()
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.session.environment()
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    /// Read a property persisted by this plugin.
    pub fn init_property(&self, name: &str) -> Option<String> {
        self.session.property(name)
    }

    /// Persist a property under this plugin's tag.
    pub fn store_init_property(&mut self, name: &str, value: &str) -> Result<(), PluginError> {
        Ok(self.session.set_property(name, value)?)
    }

    /// Send an arbitrary message. See [`Outbound::send`].
    pub fn send(&self, method: &str, data: Extra) -> Result<bool, PluginError> {
        self.outbound.send(method, data)
    }

    /// Push updated data to the host without closing.
    pub fn update(&self, data: Extra) -> Result<bool, PluginError> {
        self.outbound.send(Method::Update.as_str(), data)
    }

    /// Close the plugin, returning `data` to the host.
    pub fn close(&mut self, data: Extra) -> Result<bool, PluginError> {
        let sent = self.outbound.send(Method::Close.as_str(), data)?;
        self.session.set_state(LifecycleState::Closed);
        Ok(sent)
    }

    /// Ask the host to run `procedure`. Returns the call id; the result is
    /// delivered to [`PluginHandler::call_procedure_result`].
    pub fn call_procedure(&self, procedure: &str, params: Option<Value>) -> Result<String, PluginError> {
        let call = PendingCall::new(procedure);
        let message = CallProcedureMessage {
            call_id: call.id().to_string(),
            procedure: procedure.to_string(),
            params,
            extra: Extra::new(),
        };
        self.outbound
            .send_envelope(Envelope::new(Message::CallProcedure(message)))?;
        Ok(call.id().to_string())
    }

    /// Dispatch `envelope` again once the current handler returns.
    ///
    /// A `callProcedureResult` that was already handed to
    /// [`PluginHandler::call_procedure_result`] is not forwarded a second time.
    pub fn redeliver(&mut self, envelope: Envelope) {
        self.redeliveries.push_back(envelope);
    }
}
