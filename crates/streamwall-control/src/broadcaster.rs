//! The authoritative state snapshot and its observers.

use streamwall_protocols::{AuthState, Identity, StreamDelayStatus, StreamWindowConfig, StreamwallState, ViewState};
use streamwall_streams::{CanonicalStreamList, StreamData};
use tracing::trace;

/// Fields to replace in the snapshot. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub identity: Option<Identity>,
    pub auth: Option<Option<AuthState>>,
    pub config: Option<StreamWindowConfig>,
    pub streams: Option<CanonicalStreamList>,
    pub custom_streams: Option<Vec<StreamData>>,
    pub views: Option<Vec<ViewState>>,
    pub streamdelay: Option<Option<StreamDelayStatus>>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        self.identity.is_none()
            && self.auth.is_none()
            && self.config.is_none()
            && self.streams.is_none()
            && self.custom_streams.is_none()
            && self.views.is_none()
            && self.streamdelay.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Observer = Box<dyn FnMut(&StreamwallState) + Send>;

/// Holds the single authoritative [`StreamwallState`].
///
/// Every update replaces the named fields and hands the complete new
/// snapshot to each observer, in registration order.
pub struct StateBroadcaster {
    state: StreamwallState,
    observers: Vec<(SubscriberId, Observer)>,
    next_id: u64,
}

impl StateBroadcaster {
    pub fn new(initial: StreamwallState) -> Self {
        Self {
            state: initial,
            observers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn state(&self) -> &StreamwallState {
        &self.state
    }

    /// Merge `patch` into the snapshot and notify every observer.
    pub fn update_state(&mut self, patch: StatePatch) {
        let StatePatch {
            identity,
            auth,
            config,
            streams,
            custom_streams,
            views,
            streamdelay,
        } = patch;

        if let Some(identity) = identity {
            self.state.identity = identity;
        }
        if let Some(auth) = auth {
            self.state.auth = auth;
        }
        if let Some(config) = config {
            self.state.config = config;
        }
        if let Some(streams) = streams {
            self.state.streams = streams;
        }
        if let Some(custom_streams) = custom_streams {
            self.state.custom_streams = custom_streams;
        }
        if let Some(views) = views {
            self.state.views = views;
        }
        if let Some(streamdelay) = streamdelay {
            self.state.streamdelay = streamdelay;
        }

        trace!(observers = self.observers.len(), "broadcasting state");
        for (_, observer) in self.observers.iter_mut() {
            observer(&self.state);
        }
    }

    /// Register an observer. It is not called with the current state.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriberId
    where
        F: FnMut(&StreamwallState) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Debug for StateBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBroadcaster")
            .field("views", &self.state.views.len())
            .field("streams", &self.state.streams.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
