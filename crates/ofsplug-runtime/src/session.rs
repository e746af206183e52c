//! Per-instance session state.

use crate::StoreError;
use crate::store::{PropertyStore, namespaced};
use ofsplug_core::{Applications, Environment, LifecycleState};

/// Property holding the host's application registry (JSON).
pub const APPLICATIONS: &str = "applications";
/// Property holding the resolved backend base URL.
pub const BASE_URL: &str = "baseURL";
/// Property holding the last environment descriptor (JSON).
pub const ENVIRONMENT: &str = "environment";
/// Property holding the complete `init` payload (JSON).
pub const INIT_DATA: &str = "initData";

/// State owned by one plugin instance.
///
/// Never shared between instances; each has its own proxy and store view.
pub struct Session<P> {
    tag: String,
    environment: Option<Environment>,
    proxy: Option<P>,
    state: LifecycleState,
    store: Box<dyn PropertyStore>,
}

impl<P> Session<P> {
    pub fn new(tag: impl Into<String>, store: Box<dyn PropertyStore>) -> Self {
        Self {
            tag: tag.into(),
            environment: None,
            proxy: None,
            state: LifecycleState::Created,
            store,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The last environment the host reported.
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Replace the environment if the message carried one. Last write wins.
    pub(crate) fn observe_environment(&mut self, environment: Option<&Environment>) -> Result<(), StoreError> {
        let Some(environment) = environment else {
            return Ok(());
        };
        self.set_property(ENVIRONMENT, &serde_json::to_string(environment)?)?;
        self.environment = Some(environment.clone());
        Ok(())
    }

    /// The authenticated backend client, once built.
    pub fn proxy(&self) -> Option<&P> {
        self.proxy.as_ref()
    }

    pub(crate) fn set_proxy(&mut self, proxy: P) {
        self.proxy = Some(proxy);
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        if self.state != state {
            tracing::debug!(tag = %self.tag, from = ?self.state, to = ?state, "lifecycle transition");
            self.state = state;
        }
    }

    /// Read a persisted property of this plugin.
    pub fn property(&self, name: &str) -> Option<String> {
        self.store.get(&namespaced(&self.tag, name))
    }

    /// Persist a property of this plugin.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        self.store.set(&namespaced(&self.tag, name), value)
    }

    /// The application registry stored during `init`.
    ///
    /// An unreadable registry is treated as empty.
    pub fn applications(&self) -> Applications {
        let Some(raw) = self.property(APPLICATIONS) else {
            return Applications::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(tag = %self.tag, error = %e, "stored application registry is unreadable");
            Applications::new()
        })
    }
}
