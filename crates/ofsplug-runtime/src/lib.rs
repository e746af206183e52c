//! Host-communication runtime for field-service plugins.
//!
//! A [`Plugin`] owns one session with the host frame. It announces itself
//! with `ready`, answers `init` with `initEnd`, obtains the authenticated
//! backend client before letting `open` through, and routes everything else
//! to a [`PluginHandler`].
//!
//! ```text
//! host ──raw──► Plugin::handle_raw ──► Envelope::parse ──► dispatch
//!                                                          │
//!                 init ─► store registry ─► handler.init ─► initEnd
//!                 open ─► acquisition ─┬─► token? callProcedure, hold open
//!                                      └─► credentials / none ─► handler.open
//!  callProcedureResult ─► matches held call? ─► build proxy ─► handler.open
//!                                     └─ no ─► handler.call_procedure_result
//! ```

pub mod acquisition;
mod config;
mod error;
mod gate;
mod handler;
mod outbound;
mod plugin;
mod proxy;
pub mod session;
mod store;

pub use config::{AcquisitionConfig, PluginConfig, ReadyOptions};
pub use error::{ChannelError, PluginError, ProxyError, StoreError};
pub use gate::{LifecycleGate, Waiting};
pub use handler::{Context, PluginHandler};
pub use outbound::{EmbeddingContext, HostChannel, HostMessage, Outbound, OutboundFrame};
pub use plugin::Plugin;
pub use proxy::{OfsProxy, OfsProxyFactory, ProxyAuth, ProxyFactory};
pub use session::Session;
pub use store::{FileStore, MemoryStore, PropertyStore, namespaced};

pub use async_trait::async_trait;
