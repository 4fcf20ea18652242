//! Collaborators that act on the physical wall.
//!
//! The control plane decides what should happen; rendering windows and
//! talking to the stream delay service happen behind these traits.

use tracing::info;
use url::Url;

/// The rendering side of the wall.
pub trait WallSurface: Send + 'static {
    fn reload_view(&mut self, view: usize);

    /// Open `url` in a separate browsing window.
    fn browse(&mut self, url: &Url);

    fn open_dev_tools(&mut self, view: usize);
}

/// The stream delay service in front of the broadcast.
pub trait StreamDelay: Send + 'static {
    fn set_censored(&mut self, censored: bool);

    fn set_stream_running(&mut self, running: bool);
}

/// A surface that only logs what it was asked to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl WallSurface for NullSurface {
    fn reload_view(&mut self, view: usize) {
        info!(view, "reload view");
    }

    fn browse(&mut self, url: &Url) {
        info!(%url, "browse");
    }

    fn open_dev_tools(&mut self, view: usize) {
        info!(view, "open dev tools");
    }
}

impl StreamDelay for NullSurface {
    fn set_censored(&mut self, censored: bool) {
        info!(censored, "set stream censored");
    }

    fn set_stream_running(&mut self, running: bool) {
        info!(running, "set stream running");
    }
}
