//! Outbound connection to a control relay.
//!
//! The wall dials out to `endpoint` and serves the relay as an admin peer.
//! Dropped connections are retried with [`Backoff`](streamwall_protocols::Backoff)
//! delays until shutdown.

use crate::engine::EngineHandle;
use crate::error::Result;
use crate::peer::PeerSession;
use futures::{future, SinkExt, StreamExt};
use streamwall_protocols::{ConnectionState, ConnectionTracker, Frame, ReconnectPolicy, Role};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use url::Url;

/// Keep a relay connection up until `shutdown` becomes true.
///
/// Dropping the shutdown sender also stops the loop.
pub async fn run_uplink(
    endpoint: Url,
    handle: EngineHandle,
    policy: ReconnectPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tracker = ConnectionTracker::new(policy);
    info!(%endpoint, "uplink starting");

    loop {
        if tracker.connecting().is_err() {
            break;
        }

        let stopped = tokio::select! {
            result = connect_and_pump(&endpoint, &handle, &mut tracker) => {
                if let Err(e) = result {
                    warn!(%endpoint, error = %e, "uplink connection failed");
                }
                false
            }
            _ = shutdown.wait_for(|stop| *stop) => true,
        };
        if stopped || *shutdown.borrow() {
            break;
        }

        let delay = match tracker.disconnected() {
            Ok(delay) => delay,
            Err(_) => break,
        };
        info!(
            attempt = tracker.attempts(),
            delay_ms = delay.as_millis() as u64,
            "uplink reconnecting"
        );

        let stopped = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown.wait_for(|stop| *stop) => true,
        };
        if stopped {
            break;
        }
    }

    tracker.close();
    info!(%endpoint, "uplink stopped");
}

async fn connect_and_pump(endpoint: &Url, handle: &EngineHandle, tracker: &mut ConnectionTracker) -> Result<()> {
    let (ws, _) = connect_async(endpoint.as_str()).await?;
    tracker.connected()?;
    debug!(%endpoint, "uplink connected");

    let mut session = PeerSession::open(handle.clone(), Role::Admin).await?;
    let (sink, stream) = ws.split();
    let mut sink = sink.with(|frame: Frame| future::ready(Ok::<_, tungstenite::Error>(to_message(frame))));
    let stream = stream.filter_map(|msg| future::ready(from_message(msg)));

    session.sync(&mut sink).await?;
    tracker.synced()?;
    info!(%endpoint, peer = session.peer(), state = %ConnectionState::Synced, "uplink synced");

    session.pump(sink, stream).await
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(
    msg: std::result::Result<Message, tungstenite::Error>,
) -> Option<std::result::Result<Frame, tungstenite::Error>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(e)),
    }
}
