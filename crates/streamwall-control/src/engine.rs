//! The engine - single owner of all control plane state.
//!
//! # Architecture
//!
//! ```text
//!  feeds ──→ aggregator task ──┐
//!  peer sessions ──────────────┤  EngineEvent (mpsc)
//!  local console ──────────────┤
//!  stream delay service ───────┘
//!                              ↓
//!                    ┌───────────────────┐
//!                    │      Engine       │──→ WallSurface / StreamDelay
//!                    │  ViewStore        │
//!                    │  ViewFlags        │──→ persistence writer
//!                    │  AuthTokens       │
//!                    │  StateBroadcaster │
//!                    └─────────┬─────────┘
//!               ┌──────────────┼───────────────┐
//!               ↓              ↓               ↓
//!        watch<State>   watch<Update>     mpsc<delta>
//!        (subscribe)    per peer          per peer, ordered
//! ```
//!
//! Nothing outside the engine task touches its state; everything goes
//! through an [`EngineHandle`]. Updates to a peer are latest-wins, deltas
//! are queued in order. A peer receives the full state and a full store
//! snapshot when it attaches, before any delta.

use crate::auth::{AuthTokens, Invite};
use crate::broadcaster::{StatePatch, StateBroadcaster, SubscriberId};
use crate::error::{Error, Result};
use crate::storage::{PersistHandle, PersistedData};
use crate::surface::{NullSurface, StreamDelay, WallSurface};
use crate::views::{resolve_views, ViewFlags};
use std::collections::HashMap;
use std::fmt;
use streamwall_crdt::{ChangeOrigin, ReplicaId, ViewStore};
use streamwall_protocols::{
    Command, Identity, MessageCounter, Role, StreamDelayStatus, StreamWindowConfig, StreamwallState, UpdateMessage,
};
use streamwall_streams::{CanonicalStreamList, FeedStream, LocalStreamData};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Number assigned to an attached peer, unique per engine.
pub type PeerId = u64;

const EVENT_BUFFER: usize = 256;

/// A store delta carries view assignments, so it needs the same right.
const ASSIGN_VIEW: Command = Command::SetViewStream {
    view_idx: 0,
    stream_id: None,
};

/// Who sent a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandOrigin {
    Local,
    Peer(PeerId),
}

/// Result of an applied command.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Applied,
    /// The secret is only ever returned here.
    InviteCreated(Invite),
}

/// What a peer gets when it attaches.
#[derive(Debug)]
pub struct PeerAttachment {
    pub peer: PeerId,
    pub role: Role,
    /// Latest update for this peer; the current value is the initial full state.
    pub updates: watch::Receiver<UpdateMessage>,
    /// Full view store snapshot taken at attach time
    pub snapshot: Vec<u8>,
    /// Store deltas produced after the snapshot, in order
    pub deltas: mpsc::UnboundedReceiver<Vec<u8>>,
}

pub(crate) enum EngineEvent {
    Command {
        origin: CommandOrigin,
        command: Command,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    Delta {
        peer: PeerId,
        bytes: Vec<u8>,
    },
    Streams(CanonicalStreamList),
    StreamDelay(Option<StreamDelayStatus>),
    Attach {
        role: Role,
        reply: oneshot::Sender<Result<PeerAttachment>>,
    },
    Detach {
        peer: PeerId,
    },
    Authenticate {
        secret: String,
        reply: oneshot::Sender<Option<Role>>,
    },
    Shutdown,
}

struct PeerLink {
    role: Role,
    subscriber: SubscriberId,
    deltas: mpsc::UnboundedSender<Vec<u8>>,
}

/// Control plane state and the logic that mutates it.
///
/// Built synchronously, then moved into its own task with [`Engine::spawn`].
pub struct Engine {
    pub(crate) client_id: String,
    pub(crate) window: StreamWindowConfig,
    pub(crate) views: ViewStore,
    pub(crate) flags: ViewFlags,
    pub(crate) streams: CanonicalStreamList,
    pub(crate) custom: LocalStreamData,
    pub(crate) overlay: LocalStreamData,
    pub(crate) tokens: AuthTokens,
    pub(crate) surface: Box<dyn WallSurface>,
    pub(crate) delay: Option<Box<dyn StreamDelay>>,
    broadcaster: StateBroadcaster,
    peers: HashMap<PeerId, PeerLink>,
    next_peer: PeerId,
    changes: mpsc::UnboundedReceiver<(Vec<u8>, ChangeOrigin)>,
    persist: Option<PersistHandle>,
    state_rx: watch::Receiver<StreamwallState>,
}

impl Engine {
    /// Create an engine for a wall with `window.grid_count²` slots.
    pub fn new(client_id: impl Into<String>, window: StreamWindowConfig) -> Self {
        let slot_count = window.slot_count();

        let mut views = ViewStore::new(slot_count, ReplicaId::random());
        let (change_tx, changes) = mpsc::unbounded_channel();
        views.on_change(move |change| {
            let _ = change_tx.send((change.delta.to_vec(), change.origin));
        });

        let initial = StreamwallState {
            identity: Identity { role: Role::Local },
            config: window.clone(),
            ..Default::default()
        };
        let mut broadcaster = StateBroadcaster::new(initial.clone());
        let (state_tx, state_rx) = watch::channel(initial);
        broadcaster.subscribe(move |state| {
            state_tx.send_replace(state.clone());
        });

        let mut engine = Self {
            client_id: client_id.into(),
            window,
            views,
            flags: ViewFlags::new(slot_count),
            streams: CanonicalStreamList::default(),
            custom: LocalStreamData::new(),
            overlay: LocalStreamData::new(),
            tokens: AuthTokens::new(),
            surface: Box::new(NullSurface),
            delay: None,
            broadcaster,
            peers: HashMap::new(),
            next_peer: 0,
            changes,
            persist: None,
            state_rx,
        };
        engine.publish();
        engine
    }

    /// Use a restored custom stream list.
    #[must_use]
    pub fn with_custom_streams(mut self, custom: LocalStreamData) -> Self {
        self.custom = custom;
        self.publish();
        self
    }

    #[must_use]
    pub fn with_surface(mut self, surface: impl WallSurface) -> Self {
        self.surface = Box::new(surface);
        self
    }

    #[must_use]
    pub fn with_stream_delay(mut self, delay: impl StreamDelay) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Persist custom streams and view assignments through `handle`.
    #[must_use]
    pub fn with_persistence(mut self, handle: PersistHandle) -> Self {
        self.persist = Some(handle);
        self
    }

    /// Merge a stored view store snapshot. Undecodable data is logged and ignored.
    pub fn restore_views(&mut self, snapshot: &[u8]) {
        match self.views.load_snapshot(snapshot) {
            Ok(slots) => info!(restored = slots.len(), "restored view assignments"),
            Err(e) => warn!(error = %e, "failed to restore view assignments, starting empty"),
        }
        self.drain_changes(None);
        self.publish();
    }

    /// Feed of the custom stream list, for the aggregator.
    pub fn custom_feed(&self) -> FeedStream {
        self.custom.feed()
    }

    /// Feed of runtime overlays such as rotation, for the aggregator.
    pub fn overlay_feed(&self) -> FeedStream {
        self.overlay.feed()
    }

    pub fn state(&self) -> &StreamwallState {
        self.broadcaster.state()
    }

    /// Move the engine into its own task.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = EngineHandle {
            tx,
            state: self.state_rx.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut events: mpsc::Receiver<EngineEvent>) {
        info!(slots = self.views.slot_count(), "engine started");
        while let Some(event) = events.recv().await {
            if let EngineEvent::Shutdown = event {
                break;
            }
            self.handle(event);
        }
        self.persist_state();
        info!("engine stopped");
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Command { origin, command, reply } => {
                let result = self.dispatch(origin, command);
                self.drain_changes(None);
                if result.is_ok() {
                    self.publish();
                }
                let _ = reply.send(result);
            }
            EngineEvent::Delta { peer, bytes } => {
                let Some(role) = self.peers.get(&peer).map(|link| link.role) else {
                    warn!(peer, "dropping delta from detached peer");
                    return;
                };
                if !role.can(&ASSIGN_VIEW) {
                    warn!(peer, %role, "dropping delta from peer without view access");
                    return;
                }
                match self.views.apply_remote_delta(&bytes, ChangeOrigin::Remote(peer)) {
                    Ok(slots) if slots.is_empty() => debug!(peer, "delta already applied"),
                    Ok(_) => {
                        self.drain_changes(Some(peer));
                        self.publish();
                    }
                    Err(e) => warn!(peer, error = %e, "dropping malformed delta"),
                }
            }
            EngineEvent::Streams(streams) => {
                debug!(streams = streams.len(), "stream list updated");
                self.streams = streams;
                self.publish();
            }
            EngineEvent::StreamDelay(status) => {
                self.broadcaster.update_state(StatePatch {
                    streamdelay: Some(status),
                    ..Default::default()
                });
            }
            EngineEvent::Attach { role, reply } => {
                let _ = reply.send(self.attach(role));
            }
            EngineEvent::Detach { peer } => self.detach(peer),
            EngineEvent::Authenticate { secret, reply } => {
                let role = self.tokens.authenticate(&secret).map(|token| token.role);
                if role.is_some() {
                    self.publish();
                }
                let _ = reply.send(role);
            }
            EngineEvent::Shutdown => {}
        }
    }

    fn dispatch(&mut self, origin: CommandOrigin, command: Command) -> Result<CommandOutcome> {
        let role = match origin {
            CommandOrigin::Local => Role::Local,
            CommandOrigin::Peer(peer) => match self.peers.get(&peer) {
                Some(link) => link.role,
                None => return Err(Error::InvalidInput(format!("unknown peer {}", peer))),
            },
        };
        let name = command.name();
        let result = self.handle_command(role, command);
        if let Err(e) = &result {
            warn!(command = name, ?origin, error = %e, "command rejected");
        }
        result
    }

    fn attach(&mut self, role: Role) -> Result<PeerAttachment> {
        let snapshot = self.views.encode_snapshot()?;

        self.next_peer += 1;
        let peer = self.next_peer;

        let client_id = self.client_id.clone();
        let mut ids = MessageCounter::new();
        let initial = UpdateMessage::state(ids.next_id(), client_id.clone(), state_for_role(self.state(), role));
        let (update_tx, updates) = watch::channel(initial);
        let subscriber = self.broadcaster.subscribe(move |state| {
            update_tx.send_replace(UpdateMessage::state(
                ids.next_id(),
                client_id.clone(),
                state_for_role(state, role),
            ));
        });

        let (delta_tx, deltas) = mpsc::unbounded_channel();
        self.peers.insert(
            peer,
            PeerLink {
                role,
                subscriber,
                deltas: delta_tx,
            },
        );
        info!(peer, %role, peers = self.peers.len(), "peer attached");

        Ok(PeerAttachment {
            peer,
            role,
            updates,
            snapshot,
            deltas,
        })
    }

    fn detach(&mut self, peer: PeerId) {
        if let Some(link) = self.peers.remove(&peer) {
            self.broadcaster.unsubscribe(link.subscriber);
            info!(peer, peers = self.peers.len(), "peer detached");
        }
    }

    /// Mirror store changes to peers, skipping the peer a delta came from.
    fn drain_changes(&mut self, source: Option<PeerId>) {
        let mut changed = false;
        while let Ok((delta, origin)) = self.changes.try_recv() {
            changed = true;
            let skip = match origin {
                ChangeOrigin::Remote(peer) => Some(peer),
                ChangeOrigin::Local => None,
            }
            .or(source);
            for (peer, link) in &self.peers {
                if Some(*peer) != skip {
                    let _ = link.deltas.send(delta.clone());
                }
            }
        }
        if changed {
            self.persist_state();
        }
    }

    pub(crate) fn persist_state(&self) {
        let Some(handle) = &self.persist else {
            return;
        };
        match self.views.encode_snapshot() {
            Ok(doc) => handle.persist(PersistedData::new(self.custom.entries().to_vec(), &doc)),
            Err(e) => error!(error = %e, "failed to encode view state for persistence"),
        }
    }

    /// Rebuild the full snapshot and broadcast it.
    fn publish(&mut self) {
        let views = resolve_views(&self.views.slots(), &self.streams, &self.window, &self.flags);
        self.broadcaster.update_state(StatePatch {
            auth: Some(Some(self.tokens.auth_state())),
            streams: Some(self.streams.clone()),
            custom_streams: Some(self.custom.list()),
            views: Some(views),
            ..Default::default()
        });
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("client_id", &self.client_id)
            .field("views", &self.views)
            .field("streams", &self.streams.len())
            .field("peers", &self.peers.len())
            .finish()
    }
}

/// The snapshot as seen by a peer with `role`.
fn state_for_role(state: &StreamwallState, role: Role) -> StreamwallState {
    let mut state = state.clone();
    state.identity = Identity { role };
    if !role.sees_tokens() {
        state.auth = None;
    }
    state
}

/// Cloneable access to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineEvent>,
    state: watch::Receiver<StreamwallState>,
}

impl EngineHandle {
    /// Apply a command on behalf of `origin`, after checking its role.
    pub async fn submit(&self, command: Command, origin: CommandOrigin) -> Result<CommandOutcome> {
        self.request(|reply| EngineEvent::Command { origin, command, reply })
            .await?
    }

    /// Receiver of every published state snapshot (local view).
    pub fn subscribe(&self) -> watch::Receiver<StreamwallState> {
        self.state.clone()
    }

    /// The most recently published snapshot.
    pub fn state(&self) -> StreamwallState {
        self.state.borrow().clone()
    }

    pub async fn attach(&self, role: Role) -> Result<PeerAttachment> {
        self.request(|reply| EngineEvent::Attach { role, reply }).await?
    }

    pub async fn detach(&self, peer: PeerId) {
        let _ = self.tx.send(EngineEvent::Detach { peer }).await;
    }

    /// Detach without waiting; used where awaiting is not possible.
    pub(crate) fn detach_now(&self, peer: PeerId) {
        if self.tx.try_send(EngineEvent::Detach { peer }).is_err() {
            debug!(peer, "could not queue detach");
        }
    }

    /// Merge a store delta received from `peer`.
    pub async fn apply_delta(&self, peer: PeerId, bytes: Vec<u8>) -> Result<()> {
        self.send(EngineEvent::Delta { peer, bytes }).await
    }

    pub async fn set_streams(&self, streams: CanonicalStreamList) -> Result<()> {
        self.send(EngineEvent::Streams(streams)).await
    }

    pub async fn set_streamdelay_status(&self, status: Option<StreamDelayStatus>) -> Result<()> {
        self.send(EngineEvent::StreamDelay(status)).await
    }

    /// Role granted by the token `secret`, if any.
    pub async fn authenticate(&self, secret: &str) -> Result<Option<Role>> {
        let secret = secret.to_string();
        self.request(|reply| EngineEvent::Authenticate { secret, reply }).await
    }

    /// Stop the engine after the events queued so far.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown).await;
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::EngineClosed)
    }

    async fn request<T>(&self, event: impl FnOnce(oneshot::Sender<T>) -> EngineEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(event(reply)).await?;
        rx.await.map_err(|_| Error::EngineClosed)
    }
}
