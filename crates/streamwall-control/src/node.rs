//! Node assembly: storage, feeds, engine, server and uplink.

use crate::config::ControlConfig;
use crate::engine::{Engine, EngineHandle};
use crate::error::Result;
use crate::server;
use crate::storage::{spawn_writer, PersistedData, Storage};
use crate::uplink::run_uplink;
use futures::StreamExt;
use std::net::SocketAddr;
use streamwall_streams::feed::{poll_json_url, watch_toml_file};
use streamwall_streams::{Feed, LocalStreamData, SourceAggregator, StreamIdentityRegistry};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A Streamwall control node.
pub struct StreamwallNode {
    config: ControlConfig,
    storage: Storage,
    restored: PersistedData,
}

impl StreamwallNode {
    /// Load persisted state and check that the storage path is writable.
    ///
    /// A corrupt storage file is moved aside by [`Storage::load`] before the
    /// check writes anything.
    pub fn new(config: ControlConfig) -> Result<Self> {
        let storage = Storage::new(config.storage_path.clone());
        let restored = storage.load()?;
        storage.save(&restored)?;

        Ok(Self {
            config,
            storage,
            restored,
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Run until interrupted with ctrl-c.
    pub async fn run(self) -> Result<()> {
        let running = self.start().await?;
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to wait for ctrl-c: {}", e);
        }
        info!("shutting down");
        running.shutdown().await;
        Ok(())
    }

    /// Start every task and return once they are running.
    pub async fn start(self) -> Result<RunningNode> {
        let config = self.config;
        info!("Streamwall node starting");
        info!("  Client: {}", config.client_id);
        info!("  Grid: {0}x{0} at {1}x{2}", config.window.grid_count, config.window.width, config.window.height);
        info!("  Storage: {:?}", self.storage.path());
        info!("  JSON feeds: {:?} every {:?}", config.json_urls, config.data_interval);
        info!("  TOML feeds: {:?}", config.toml_files);
        info!("  Listen: {:?}", config.listen_addr);
        info!("  Uplink: {:?}", config.control_endpoint.as_ref().map(|u| u.as_str()));

        let (persist, writer) = spawn_writer(self.storage, config.persist_interval);

        let mut engine = Engine::new(config.client_id.clone(), config.window.clone())
            .with_custom_streams(LocalStreamData::from_entries(self.restored.local_stream_data.clone()));
        if let Some(doc) = self.restored.decode_state_doc() {
            engine.restore_views(&doc);
        }
        let engine = engine.with_persistence(persist);

        let mut feeds = Vec::new();
        let client = reqwest::Client::new();
        for url in &config.json_urls {
            feeds.push(Feed::new("json-url", poll_json_url(client.clone(), url.clone(), config.data_interval)));
        }
        for path in &config.toml_files {
            feeds.push(Feed::new("toml-file", watch_toml_file(path.clone())));
        }
        feeds.push(Feed::new("custom", engine.custom_feed()));
        feeds.push(Feed::new("overlay", engine.overlay_feed()));

        let (handle, engine_task) = engine.spawn();

        let mut lists = Box::pin(SourceAggregator::combine(feeds, StreamIdentityRegistry::new()));
        let feed_handle = handle.clone();
        let aggregator = tokio::spawn(async move {
            while let Some(list) = lists.next().await {
                if feed_handle.set_streams(list).await.is_err() {
                    break;
                }
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut local_addr = None;
        let server = match config.listen_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                local_addr = Some(listener.local_addr()?);
                let handle = handle.clone();
                let shutdown = shutdown_rx.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = server::serve(listener, handle, shutdown).await {
                        error!("control server error: {}", e);
                    }
                }))
            }
            None => None,
        };

        let uplink = config.control_endpoint.clone().map(|endpoint| {
            tokio::spawn(run_uplink(endpoint, handle.clone(), config.reconnect, shutdown_rx.clone()))
        });

        Ok(RunningNode {
            handle,
            local_addr,
            shutdown_tx,
            engine_task,
            writer,
            aggregator,
            server,
            uplink,
        })
    }
}

/// Handles to a started node.
pub struct RunningNode {
    handle: EngineHandle,
    local_addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    engine_task: JoinHandle<()>,
    writer: JoinHandle<()>,
    aggregator: JoinHandle<()>,
    server: Option<JoinHandle<()>>,
    uplink: Option<JoinHandle<()>>,
}

impl RunningNode {
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Bound address of the control server, if one is listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop everything and wait for the last state to be written.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        self.aggregator.abort();

        self.handle.shutdown().await;
        join("engine", self.engine_task).await;
        join("persistence writer", self.writer).await;
        if let Some(uplink) = self.uplink {
            join("uplink", uplink).await;
        }
        if let Some(server) = self.server {
            join("control server", server).await;
        }
        info!("Streamwall node stopped");
    }
}

async fn join(name: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!("{} task failed: {}", name, e);
    }
}
