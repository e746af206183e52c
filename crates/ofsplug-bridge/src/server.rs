//! WebSocket server: one plugin instance per host connection.

use crate::activity::ActivityPlugin;
use crate::config::BridgeConfig;
use futures_util::{SinkExt, StreamExt};
use ofsplug_core::Origin;
use ofsplug_runtime::{
    EmbeddingContext, FileStore, HostMessage, MemoryStore, OfsProxyFactory, OutboundFrame, Plugin,
    PluginConfig, PropertyStore, StoreError,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

/// Property store shared by all connections, so properties survive reconnects.
#[derive(Clone)]
pub struct SharedStore(Arc<Mutex<Box<dyn PropertyStore>>>);

impl SharedStore {
    pub fn new(store: Box<dyn PropertyStore>) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    fn with<T>(&self, f: impl FnOnce(&mut Box<dyn PropertyStore>) -> T) -> T {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl PropertyStore for SharedStore {
    fn get(&self, key: &str) -> Option<String> {
        self.with(|store| store.get(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with(|store| store.set(key, value))
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.with(|store| store.remove(key))
    }
}

pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let store: Box<dyn PropertyStore> = match &config.store {
        Some(path) => Box::new(FileStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };
    let store = SharedStore::new(store);
    let plugin_config = Arc::new(config.plugin);

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!("Listening on ws://{}", config.listen);

    loop {
        let (stream, addr) = listener.accept().await?;
        let store = store.clone();
        let plugin_config = plugin_config.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, store, &plugin_config).await {
                tracing::warn!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// The referrer and origin headers of the handshake stand in for the
/// embedding document.
fn embedding_from(request: &Request) -> EmbeddingContext {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    EmbeddingContext {
        referrer: header("referer"),
        ancestor_origins: header("origin").into_iter().collect(),
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    store: SharedStore,
    plugin_config: &PluginConfig,
) -> anyhow::Result<()> {
    let mut embedding = EmbeddingContext::default();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
        embedding = embedding_from(request);
        Ok(response)
    })
    .await?;
    let (mut sink, mut stream) = ws.split();

    let host_origin = Origin::derive(
        embedding.referrer.as_deref(),
        &embedding.ancestor_origins,
    );
    tracing::debug!(
        "New host connection from {} (origin: {})",
        addr,
        host_origin.as_ref().map_or("none".to_string(), |o| o.to_string())
    );

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let (in_tx, in_rx) = mpsc::channel::<HostMessage>(32);

    let plugin = Plugin::new(
        plugin_config.clone(),
        ActivityPlugin,
        OfsProxyFactory,
        Box::new(out_tx),
        embedding,
        Box::new(store),
    );

    // Owns the plugin so its outbound sender is dropped when it finishes.
    let run_plugin = async move {
        let mut plugin = plugin;
        plugin.run(in_rx).await?;
        anyhow::Ok(())
    };

    let read = async move {
        while let Some(msg) = stream.next().await {
            match msg? {
                Message::Text(text) => {
                    if in_tx.send(HostMessage::Text(text.as_str().to_owned())).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        anyhow::Ok(())
    };

    let write = async move {
        while let Some(frame) = out_rx.recv().await {
            if host_origin.as_ref() != Some(&frame.target_origin) {
                tracing::warn!(
                    "Dropping message for {} on connection from {}",
                    frame.target_origin,
                    addr
                );
                continue;
            }
            let text = match frame.message {
                HostMessage::Text(text) => text,
                HostMessage::Object(value) => serde_json::to_string(&value)?,
            };
            sink.send(Message::Text(text.into())).await?;
        }
        anyhow::Ok(())
    };

    tokio::try_join!(run_plugin, read, write)?;
    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}
