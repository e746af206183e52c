//! The plugin instance: receives host messages and routes them.

use crate::acquisition::{self, Plan};
use crate::config::PluginConfig;
use crate::gate::LifecycleGate;
use crate::handler::{Context, PluginHandler};
use crate::outbound::{EmbeddingContext, HostChannel, HostMessage, Outbound};
use crate::proxy::{ProxyAuth, ProxyFactory};
use crate::session::{APPLICATIONS, BASE_URL, INIT_DATA, Session};
use crate::store::PropertyStore;
use crate::PluginError;
use ofsplug_core::{
    CallProcedureResultMessage, Envelope, InitMessage, LifecycleState, Message, OpenMessage,
    PendingCall,
};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Upper bound on envelopes re-injected by handlers per host message.
const MAX_REDELIVERIES: usize = 16;

/// One plugin instance bound to one host frame.
pub struct Plugin<H, F>
where
    H: PluginHandler,
    F: ProxyFactory<Proxy = H::Proxy>,
{
    handler: H,
    factory: F,
    config: PluginConfig,
    session: Session<H::Proxy>,
    gate: LifecycleGate,
    outbound: Outbound,
    redeliveries: VecDeque<Envelope>,
    /// Call ids of unmatched results already given to the handler while
    /// processing the current host message.
    forwarded: HashSet<String>,
}

impl<H, F> Plugin<H, F>
where
    H: PluginHandler,
    F: ProxyFactory<Proxy = H::Proxy>,
{
    pub fn new(
        config: PluginConfig,
        handler: H,
        factory: F,
        channel: Box<dyn HostChannel>,
        embedding: EmbeddingContext,
        store: Box<dyn PropertyStore>,
    ) -> Self {
        let outbound = Outbound::new(config.tag.clone(), channel, embedding);
        let session = Session::new(config.tag.clone(), store);
        let gate = LifecycleGate::new(config.acquisition.token_timeout());
        Self {
            handler,
            factory,
            config,
            session,
            gate,
            outbound,
            redeliveries: VecDeque::new(),
            forwarded: HashSet::new(),
        }
    }

    pub fn session(&self) -> &Session<H::Proxy> {
        &self.session
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    /// The call id of the token request `open` is waiting on.
    pub fn pending_call_id(&self) -> Option<&str> {
        self.gate.pending_call().map(PendingCall::id)
    }

    /// Whether an `open` is held back waiting for the proxy.
    pub fn is_waiting(&self) -> bool {
        self.gate.is_held()
    }

    /// Announce the plugin to the host with a `ready` message.
    pub fn start(&mut self) -> Result<(), PluginError> {
        let ready = self.config.ready.to_message();
        self.outbound
            .send_envelope(Envelope::new(Message::Ready(ready)))?;
        self.outbound
            .set_as_object(self.config.ready.send_message_as_js_object);
        self.session.set_state(LifecycleState::Ready);
        tracing::info!(tag = %self.session.tag(), "plugin ready");
        Ok(())
    }

    /// Send `ready`, then process host messages until the channel closes.
    ///
    /// A held `open` is let through without a proxy once its deadline passes.
    pub async fn run(&mut self, mut inbound: mpsc::Receiver<HostMessage>) -> Result<(), PluginError> {
        self.start()?;

        loop {
            let deadline = self.gate.deadline();
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(HostMessage::Text(raw)) => self.handle_raw(&raw).await?,
                    Some(HostMessage::Object(value)) => self.handle_value(value).await?,
                    None => break,
                },
                _ = wait_until(deadline) => {
                    self.expire_acquisition().await?;
                }
            }
        }

        tracing::info!(tag = %self.session.tag(), "host channel closed");
        Ok(())
    }

    /// Process one raw host message.
    pub async fn handle_raw(&mut self, raw: &str) -> Result<(), PluginError> {
        self.handle(Envelope::parse(raw)).await
    }

    /// Process one host message delivered as a structured object.
    pub async fn handle_value(&mut self, value: Value) -> Result<(), PluginError> {
        self.handle(Envelope::from_value(value)).await
    }

    /// Process one envelope, then anything the handlers asked to redeliver.
    pub async fn handle(&mut self, envelope: Envelope) -> Result<(), PluginError> {
        self.forwarded.clear();
        self.dispatch(envelope, false).await?;
        self.drain_redeliveries().await
    }

    /// Let a held `open` through if its deadline has passed.
    ///
    /// Returns whether an `open` was released.
    pub async fn expire_acquisition(&mut self) -> Result<bool, PluginError> {
        let Some(waiting) = self.gate.expire(Instant::now()) else {
            return Ok(false);
        };
        tracing::warn!(
            tag = %self.session.tag(),
            call_id = waiting.call.id(),
            "no token received in time, opening without proxy"
        );
        self.forwarded.clear();
        self.run_open(waiting.open).await?;
        self.drain_redeliveries().await?;
        Ok(true)
    }

    async fn drain_redeliveries(&mut self) -> Result<(), PluginError> {
        let mut count = 0;
        while let Some(envelope) = self.redeliveries.pop_front() {
            count += 1;
            if count > MAX_REDELIVERIES {
                tracing::warn!(
                    tag = %self.session.tag(),
                    dropped = self.redeliveries.len() + 1,
                    "too many redelivered messages"
                );
                self.redeliveries.clear();
                break;
            }
            self.dispatch(envelope, true).await?;
        }
        Ok(())
    }

    fn parts(&mut self) -> (&mut H, Context<'_, H::Proxy>) {
        (
            &mut self.handler,
            Context {
                session: &mut self.session,
                outbound: &self.outbound,
                redeliveries: &mut self.redeliveries,
            },
        )
    }

    async fn dispatch(&mut self, envelope: Envelope, redelivered: bool) -> Result<(), PluginError> {
        tracing::debug!(
            tag = %self.session.tag(),
            method = envelope.method(),
            api_version = envelope.api_version,
            redelivered,
            "message received"
        );

        // `open` records its environment once acquisition has finished.
        if !matches!(envelope.message, Message::Open(_)) {
            self.session
                .observe_environment(envelope.message.environment())?;
        }

        match envelope.message {
            Message::Init(message) => self.on_init(message).await,
            Message::Open(message) => self.on_open(message).await,
            Message::CallProcedureResult(message) => {
                self.on_call_procedure_result(message, redelivered).await
            }
            Message::UpdateResult(message) => {
                let (handler, mut cx) = self.parts();
                handler.update_result(&mut cx, message).await
            }
            Message::Wakeup(message) => {
                let (handler, mut cx) = self.parts();
                handler.wakeup(&mut cx, message).await
            }
            Message::Error(message) => {
                let (handler, mut cx) = self.parts();
                handler.error(&mut cx, message).await
            }
            Message::NoMethod => {
                tracing::warn!(tag = %self.session.tag(), "discarding malformed message");
                Ok(())
            }
            other => Err(PluginError::UnknownMethod(other.method().to_string())),
        }
    }

    async fn on_init(&mut self, message: InitMessage) -> Result<(), PluginError> {
        if let Some(applications) = &message.applications {
            self.session
                .set_property(APPLICATIONS, &serde_json::to_string(applications)?)?;
        }
        self.session
            .set_property(INIT_DATA, &serde_json::to_string(&message)?)?;
        tracing::info!(
            tag = %self.session.tag(),
            applications = message.applications.as_ref().map_or(0, |a| a.len()),
            "init data stored"
        );

        let (handler, mut cx) = self.parts();
        let init_end = handler.init(&mut cx, message).await?;
        self.outbound
            .send_envelope(Envelope::new(Message::InitEnd(init_end)))?;
        self.session.set_state(LifecycleState::Initialized);
        Ok(())
    }

    async fn on_open(&mut self, message: OpenMessage) -> Result<(), PluginError> {
        self.session.set_state(LifecycleState::Opening);

        match acquisition::plan(&self.session, &self.config.acquisition, &message) {
            Plan::Token {
                application_key,
                base_url,
            } => {
                self.session.set_property(BASE_URL, &base_url)?;
                let call = PendingCall::new(self.config.acquisition.token_procedure.as_str());
                let request = acquisition::token_request(&call, &application_key);
                tracing::info!(
                    tag = %self.session.tag(),
                    application = %application_key,
                    call_id = call.id(),
                    "waiting for access token"
                );
                self.outbound
                    .send_envelope(Envelope::new(Message::CallProcedure(request)))?;
                if self.gate.acquire(call, base_url, message).is_some() {
                    tracing::warn!(
                        tag = %self.session.tag(),
                        "open superseded while waiting for a token"
                    );
                }
                Ok(())
            }
            Plan::Credentials(credentials) => {
                self.install_proxy(ProxyAuth::Credentials(credentials));
                self.run_open(message).await
            }
            Plan::Unauthenticated => {
                tracing::info!(tag = %self.session.tag(), "no credentials available, opening without proxy");
                self.run_open(message).await
            }
        }
    }

    async fn on_call_procedure_result(
        &mut self,
        message: CallProcedureResultMessage,
        redelivered: bool,
    ) -> Result<(), PluginError> {
        if let Some(waiting) = self.gate.release(message.call_id.as_deref()) {
            match acquisition::token_from_result(&message) {
                Ok(token) => self.install_proxy(ProxyAuth::Token {
                    base_url: waiting.base_url,
                    token,
                }),
                Err(failure) => tracing::error!(
                    tag = %self.session.tag(),
                    call_id = waiting.call.id(),
                    %failure,
                    "token acquisition failed"
                ),
            }
            return self.run_open(waiting.open).await;
        }

        let call_id = message.call_id.clone().unwrap_or_default();
        if redelivered && self.forwarded.contains(&call_id) {
            tracing::warn!(
                tag = %self.session.tag(),
                call_id = %call_id,
                "dropping redelivered procedure result"
            );
            return Ok(());
        }
        self.forwarded.insert(call_id);

        let (handler, mut cx) = self.parts();
        handler.call_procedure_result(&mut cx, message).await
    }

    fn install_proxy(&mut self, auth: ProxyAuth) {
        let token_based = matches!(auth, ProxyAuth::Token { .. });
        match self.factory.build(auth) {
            Ok(proxy) => {
                self.session.set_proxy(proxy);
                tracing::info!(tag = %self.session.tag(), token_based, "proxy created");
            }
            Err(e) => {
                tracing::error!(tag = %self.session.tag(), error = %e, "proxy creation failed");
            }
        }
    }

    async fn run_open(&mut self, message: OpenMessage) -> Result<(), PluginError> {
        self.session.observe_environment(message.environment.as_ref())?;
        self.session.set_state(LifecycleState::Open);
        tracing::info!(
            tag = %self.session.tag(),
            entity = message.entity.as_deref().unwrap_or("-"),
            has_proxy = self.session.proxy().is_some(),
            "opening"
        );
        let (handler, mut cx) = self.parts();
        handler.open(&mut cx, message).await
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
