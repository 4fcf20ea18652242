//! One attached control peer, independent of the transport.
//!
//! A session sends the full state and a full store snapshot first, then
//! pumps three things until either side goes away:
//!
//! ```text
//!   inbound Text   ──→ CommandMessage ──→ EngineHandle::submit
//!   inbound Binary ──→ store delta    ──→ EngineHandle::apply_delta
//!   state updates  ──→ outbound Text   (latest wins)
//!   store deltas   ──→ outbound Binary (in order)
//! ```

use crate::engine::{CommandOrigin, EngineHandle, PeerAttachment, PeerId};
use crate::error::{Error, Result};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use streamwall_protocols::{CommandMessage, Frame, Role};
use tracing::{debug, info, warn};

pub struct PeerSession {
    handle: EngineHandle,
    attachment: PeerAttachment,
    detached: bool,
}

impl PeerSession {
    /// Attach a new peer with `role` to the engine.
    pub async fn open(handle: EngineHandle, role: Role) -> Result<Self> {
        let attachment = handle.attach(role).await?;
        Ok(Self {
            handle,
            attachment,
            detached: false,
        })
    }

    pub fn peer(&self) -> PeerId {
        self.attachment.peer
    }

    pub fn role(&self) -> Role {
        self.attachment.role
    }

    /// Send the full state, then the full store snapshot.
    pub async fn sync<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: Sink<Frame> + Unpin,
        S::Error: Display,
    {
        let text = self.attachment.updates.borrow_and_update().to_json()?;
        send(sink, Frame::Text(text)).await?;
        send(sink, Frame::Binary(self.attachment.snapshot.clone())).await
    }

    /// Run the session until the peer disconnects or the engine stops.
    pub async fn pump<S, R, E>(mut self, mut sink: S, mut stream: R) -> Result<()>
    where
        S: Sink<Frame> + Unpin,
        S::Error: Display,
        R: Stream<Item = std::result::Result<Frame, E>> + Unpin,
        E: Display,
    {
        let peer = self.peer();
        let result = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if let Err(Error::EngineClosed) = self.on_text(&text).await {
                            break Err(Error::EngineClosed);
                        }
                    }
                    Some(Ok(Frame::Binary(bytes))) => {
                        if let Err(e) = self.handle.apply_delta(peer, bytes).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Frame::Close)) | None => {
                        debug!(peer, "peer closed connection");
                        break Ok(());
                    }
                    Some(Err(e)) => {
                        warn!(peer, error = %e, "peer connection failed");
                        break Ok(());
                    }
                },
                changed = self.attachment.updates.changed() => {
                    if changed.is_err() {
                        break Err(Error::EngineClosed);
                    }
                    let text = match self.attachment.updates.borrow_and_update().to_json() {
                        Ok(text) => text,
                        Err(e) => break Err(e.into()),
                    };
                    if let Err(e) = send(&mut sink, Frame::Text(text)).await {
                        break Err(e);
                    }
                }
                delta = self.attachment.deltas.recv() => match delta {
                    Some(bytes) => {
                        if let Err(e) = send(&mut sink, Frame::Binary(bytes)).await {
                            break Err(e);
                        }
                    }
                    None => break Err(Error::EngineClosed),
                },
            }
        };

        self.detached = true;
        self.handle.detach(peer).await;
        info!(peer, "peer session ended");
        result
    }

    async fn on_text(&self, text: &str) -> Result<()> {
        let message = match CommandMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = self.peer(), error = %e, "ignoring malformed control message");
                return Ok(());
            }
        };
        let name = message.command.name();
        match self
            .handle
            .submit(message.command, CommandOrigin::Peer(self.peer()))
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::EngineClosed) => Err(Error::EngineClosed),
            Err(e) => {
                debug!(peer = self.peer(), id = message.id, command = name, error = %e, "command failed");
                Ok(())
            }
        }
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if !self.detached {
            self.handle.detach_now(self.attachment.peer);
        }
    }
}

async fn send<S>(sink: &mut S, frame: Frame) -> Result<()>
where
    S: Sink<Frame> + Unpin,
    S::Error: Display,
{
    sink.send(frame).await.map_err(|e| Error::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use futures::channel::mpsc;
    use std::convert::Infallible;
    use std::time::Duration;
    use streamwall_crdt::{ReplicaId, ViewStore};
    use streamwall_protocols::{Command, StreamWindowConfig, UpdateMessage};
    use streamwall_streams::{StreamData, StreamId};

    fn command_text(command: Command) -> String {
        CommandMessage::new(1, "remote", command).to_json().unwrap()
    }

    #[tokio::test]
    async fn sync_sends_state_then_snapshot() {
        let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
        let mut session = PeerSession::open(handle, Role::Operator).await.unwrap();
        let (mut tx, mut rx) = mpsc::unbounded::<Frame>();

        session.sync(&mut tx).await.unwrap();

        match rx.next().await {
            Some(Frame::Text(text)) => {
                let update = UpdateMessage::from_json(&text).unwrap();
                assert_eq!(update.client_id, "wall");
                assert_eq!(update.snapshot().identity.role, Role::Operator);
                assert_eq!(update.snapshot().views.len(), 9);
            }
            other => panic!("expected state, got {:?}", other),
        }
        assert!(matches!(rx.next().await, Some(Frame::Binary(_))));
    }

    #[tokio::test]
    async fn commands_from_peer_reach_engine() {
        let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
        let session = PeerSession::open(handle.clone(), Role::Operator).await.unwrap();

        let (out_tx, _out_rx) = mpsc::unbounded::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded::<std::result::Result<Frame, Infallible>>();
        let pump = tokio::spawn(session.pump(out_tx, in_rx));

        let mut state = handle.subscribe();
        in_tx.unbounded_send(Ok(Frame::Text("{\"garbage\":true}".into()))).unwrap();
        in_tx
            .unbounded_send(Ok(Frame::Text(command_text(Command::UpdateCustomStream {
                url: "https://c/1".into(),
                data: StreamData::new("https://c/1"),
            }))))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.custom_streams.len() == 1))
            .await
            .unwrap()
            .unwrap();

        in_tx.unbounded_send(Ok(Frame::Close)).unwrap();
        pump.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn forbidden_command_keeps_session_open() {
        let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
        let session = PeerSession::open(handle.clone(), Role::Monitor).await.unwrap();

        let (out_tx, mut out_rx) = mpsc::unbounded::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded::<std::result::Result<Frame, Infallible>>();
        let pump = tokio::spawn(session.pump(out_tx, in_rx));

        in_tx
            .unbounded_send(Ok(Frame::Text(command_text(Command::SetViewStream {
                view_idx: 0,
                stream_id: Some(StreamId(1)),
            }))))
            .unwrap();
        in_tx
            .unbounded_send(Ok(Frame::Text(command_text(Command::SetViewBlurred {
                view_idx: 0,
                blurred: true,
            }))))
            .unwrap();

        let update = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(Frame::Text(text)) = out_rx.next().await {
                    let update = UpdateMessage::from_json(&text).unwrap();
                    return update;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(update.snapshot().identity.role, Role::Monitor);
        assert!(handle.state().views[0].context.content.is_none());

        drop(in_tx);
        pump.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn monitor_cannot_assign_through_store_delta() {
        let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
        let session = PeerSession::open(handle.clone(), Role::Monitor).await.unwrap();

        let (out_tx, _out_rx) = mpsc::unbounded::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded::<std::result::Result<Frame, Infallible>>();
        let pump = tokio::spawn(session.pump(out_tx, in_rx));

        let mut replica = ViewStore::new(9, ReplicaId(500));
        let delta = replica.set_slot(0, Some(StreamId(1))).unwrap();
        in_tx.unbounded_send(Ok(Frame::Binary(delta))).unwrap();
        in_tx
            .unbounded_send(Ok(Frame::Text(command_text(Command::SetViewBlurred {
                view_idx: 0,
                blurred: true,
            }))))
            .unwrap();
        in_tx.unbounded_send(Ok(Frame::Close)).unwrap();
        pump.await.unwrap().unwrap();

        let observer = handle.attach(Role::Operator).await.unwrap();
        let mut check = ViewStore::new(9, ReplicaId(501));
        check.load_snapshot(&observer.snapshot).unwrap();
        assert_eq!(check.get(0), None);
    }
}
