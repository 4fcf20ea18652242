//! End-to-end behaviour of a running engine and node.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use streamwall_control::{
    CommandOrigin, CommandOutcome, ControlConfig, Engine, Error, PersistedData, Storage, StreamwallNode,
};
use streamwall_crdt::{ReplicaId, ViewStore};
use streamwall_protocols::{
    AudioState, Command, CommandMessage, ReconnectPolicy, Role, StreamDelayStatus, StreamWindowConfig,
    UpdateMessage, ViewStateValue,
};
use streamwall_streams::{CanonicalStreamList, StreamData, StreamId, StreamRecord};
use tempfile::tempdir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message, WebSocketStream};
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

fn one_stream() -> CanonicalStreamList {
    CanonicalStreamList::from_records(vec![StreamRecord::new(
        StreamId(1),
        "json-url",
        StreamData::new("https://streams.example/1"),
    )])
}

fn assign(view_idx: usize, id: u64) -> Command {
    Command::SetViewStream {
        view_idx,
        stream_id: Some(StreamId(id)),
    }
}

#[tokio::test]
async fn fresh_engine_shows_empty_grid() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    let state = handle.state();

    assert_eq!(state.views.len(), 9);
    assert!(state.views.iter().all(|v| v.state == ViewStateValue::Empty));
    assert_eq!(state.identity.role, Role::Local);
}

#[tokio::test]
async fn assigned_view_becomes_the_listening_view() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    handle.set_streams(one_stream()).await.unwrap();

    handle.submit(assign(2, 1), CommandOrigin::Local).await.unwrap();
    handle
        .submit(Command::SetListeningView { view_idx: Some(2) }, CommandOrigin::Local)
        .await
        .unwrap();

    let state = handle.state();
    let listening: Vec<usize> = state
        .views
        .iter()
        .filter(|v| v.state.playback().map(|p| p.audio) == Some(AudioState::Listening))
        .map(|v| v.context.id)
        .collect();
    assert_eq!(listening, vec![2]);
    assert_eq!(
        state.views[2].context.content.as_ref().map(|c| c.url.as_str()),
        Some("https://streams.example/1")
    );
}

#[tokio::test]
async fn dangling_assignment_shows_empty_view() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    handle.set_streams(one_stream()).await.unwrap();
    handle.submit(assign(0, 1), CommandOrigin::Local).await.unwrap();
    assert!(matches!(handle.state().views[0].state, ViewStateValue::Running(_)));

    handle.set_streams(CanonicalStreamList::default()).await.unwrap();
    handle.submit(Command::ReloadView { view_idx: 0 }, CommandOrigin::Local).await.unwrap();

    assert_eq!(handle.state().views[0].state, ViewStateValue::Empty);
}

#[tokio::test]
async fn late_peer_snapshot_contains_earlier_assignments() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    let mut early = handle.attach(Role::Operator).await.unwrap();

    handle.submit(assign(3, 7), CommandOrigin::Local).await.unwrap();
    let delta = tokio::time::timeout(WAIT, early.deltas.recv()).await.unwrap().unwrap();

    let late = handle.attach(Role::Operator).await.unwrap();
    let mut replica = ViewStore::new(9, ReplicaId(42));
    replica.load_snapshot(&late.snapshot).unwrap();
    assert_eq!(replica.get(3), Some(StreamId(7)));

    let mut from_deltas = ViewStore::new(9, ReplicaId(43));
    from_deltas.load_snapshot(&early.snapshot).unwrap();
    from_deltas
        .apply_remote_delta(&delta, streamwall_crdt::ChangeOrigin::Remote(0))
        .unwrap();
    assert_eq!(from_deltas.slots(), replica.slots());
}

#[tokio::test]
async fn delta_is_not_echoed_to_its_sender() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    let mut sender = handle.attach(Role::Operator).await.unwrap();
    let mut other = handle.attach(Role::Operator).await.unwrap();

    let mut replica = ViewStore::new(9, ReplicaId(7));
    let delta = replica.set_slot(5, Some(StreamId(1))).unwrap();
    handle.apply_delta(sender.peer, delta).await.unwrap();

    let mirrored = tokio::time::timeout(WAIT, other.deltas.recv()).await.unwrap().unwrap();
    let mut check = ViewStore::new(9, ReplicaId(8));
    check.apply_remote_delta(&mirrored, streamwall_crdt::ChangeOrigin::Remote(1)).unwrap();
    assert_eq!(check.get(5), Some(StreamId(1)));

    assert!(sender.deltas.try_recv().is_err());
}

#[tokio::test]
async fn roles_limit_commands() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    let monitor = handle.attach(Role::Monitor).await.unwrap();
    let operator = handle.attach(Role::Operator).await.unwrap();

    let result = handle
        .submit(
            Command::Browse {
                url: "https://example.com".into(),
            },
            CommandOrigin::Peer(monitor.peer),
        )
        .await;
    assert!(matches!(result, Err(Error::Forbidden { role: Role::Monitor, .. })));

    let result = handle
        .submit(
            Command::CreateInvite {
                role: Role::Admin,
                name: "escalate".into(),
            },
            CommandOrigin::Peer(operator.peer),
        )
        .await;
    assert!(matches!(result, Err(Error::Forbidden { role: Role::Operator, .. })));

    handle
        .submit(
            Command::SetViewBlurred {
                view_idx: 1,
                blurred: true,
            },
            CommandOrigin::Peer(monitor.peer),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn invite_redeems_to_session() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    let outcome = handle
        .submit(
            Command::CreateInvite {
                role: Role::Monitor,
                name: "lobby".into(),
            },
            CommandOrigin::Local,
        )
        .await
        .unwrap();
    let CommandOutcome::InviteCreated(invite) = outcome else {
        panic!("expected an invite");
    };
    assert_eq!(handle.state().auth.unwrap().invites.len(), 1);

    assert_eq!(handle.authenticate(&invite.secret).await.unwrap(), Some(Role::Monitor));
    assert_eq!(handle.authenticate("bogus").await.unwrap(), None);

    let auth = handle.state().auth.unwrap();
    assert!(auth.invites.is_empty());
    assert_eq!(auth.sessions.len(), 1);
}

#[tokio::test]
async fn stream_delay_status_is_published() {
    let (handle, _task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    let status = StreamDelayStatus {
        is_connected: true,
        delay_seconds: 20.0,
        restart_seconds: 0.0,
        is_censored: false,
        is_stream_running: true,
        start_time: 1_700_000_000.0,
        state: "running".into(),
    };

    handle.set_streamdelay_status(Some(status.clone())).await.unwrap();
    let mut state = handle.subscribe();
    let seen = tokio::time::timeout(WAIT, state.wait_for(|s| s.streamdelay.is_some()))
        .await
        .unwrap()
        .unwrap()
        .streamdelay
        .clone();
    assert_eq!(seen, Some(status));
}

#[tokio::test]
async fn stopped_engine_reports_closed() {
    let (handle, task) = Engine::new("wall", StreamWindowConfig::default()).spawn();
    handle.shutdown().await;
    task.await.unwrap();

    let result = handle.submit(Command::ReloadView { view_idx: 0 }, CommandOrigin::Local).await;
    assert!(matches!(result, Err(Error::EngineClosed)));
}

fn node_config(dir: &std::path::Path) -> ControlConfig {
    let mut config = ControlConfig::from_lookup(|_| None);
    config.storage_path = dir.join("streamwall-storage.json");
    config.persist_interval = Duration::from_millis(10);
    config
}

#[tokio::test]
async fn node_persists_and_restores_custom_streams_and_views() {
    let dir = tempdir().unwrap();
    let config = node_config(dir.path());

    let node = StreamwallNode::new(config.clone()).unwrap().start().await.unwrap();
    let handle = node.handle().clone();
    handle
        .submit(
            Command::UpdateCustomStream {
                url: "https://custom.example/a".into(),
                data: StreamData::new("https://custom.example/a"),
            },
            CommandOrigin::Local,
        )
        .await
        .unwrap();
    let mut state = handle.subscribe();
    tokio::time::timeout(WAIT, state.wait_for(|s| s.streams.len() == 1))
        .await
        .unwrap()
        .unwrap();
    let id = handle.state().streams.records()[0].id;
    handle.submit(assign(4, id.0), CommandOrigin::Local).await.unwrap();
    node.shutdown().await;

    let stored: PersistedData = Storage::new(&config.storage_path).load().unwrap();
    assert_eq!(stored.local_stream_data.len(), 1);
    let mut replica = ViewStore::new(9, ReplicaId(1));
    replica.load_snapshot(&stored.decode_state_doc().unwrap()).unwrap();
    assert_eq!(replica.get(4), Some(id));

    let node = StreamwallNode::new(config).unwrap().start().await.unwrap();
    let mut state = node.handle().subscribe();
    let restored = tokio::time::timeout(WAIT, state.wait_for(|s| s.streams.len() == 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(restored.custom_streams.len(), 1);
    node.shutdown().await;
}

#[tokio::test]
async fn node_keeps_corrupt_storage_aside() {
    let dir = tempdir().unwrap();
    let config = node_config(dir.path());
    std::fs::write(&config.storage_path, b"{\"localStreamData\": [").unwrap();

    let node = StreamwallNode::new(config.clone()).unwrap().start().await.unwrap();
    assert!(node.handle().state().custom_streams.is_empty());
    node.shutdown().await;

    let storage = Storage::new(&config.storage_path);
    assert_eq!(
        std::fs::read(storage.corrupt_path()).unwrap(),
        b"{\"localStreamData\": [".to_vec()
    );
    assert!(storage.load().is_ok());
}

#[tokio::test]
async fn websocket_peer_syncs_and_sends_commands() {
    let dir = tempdir().unwrap();
    let mut config = node_config(dir.path());
    config.listen_addr = Some("127.0.0.1:0".parse().unwrap());

    let node = StreamwallNode::new(config).unwrap().start().await.unwrap();
    let addr = node.local_addr().unwrap();
    let handle = node.handle().clone();

    assert!(connect_async(format!("ws://{}/ws?token=bogus", addr)).await.is_err());

    let CommandOutcome::InviteCreated(invite) = handle
        .submit(
            Command::CreateInvite {
                role: Role::Operator,
                name: "desk".into(),
            },
            CommandOrigin::Local,
        )
        .await
        .unwrap()
    else {
        panic!("expected an invite");
    };

    let (mut ws, _) = connect_async(format!("ws://{}/ws?token={}", addr, invite.secret))
        .await
        .unwrap();

    let first = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = first else {
        panic!("expected state first, got {:?}", first);
    };
    let update = UpdateMessage::from_json(&text).unwrap();
    assert_eq!(update.snapshot().identity.role, Role::Operator);
    assert!(update.snapshot().auth.is_none());

    let second = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(second, Message::Binary(_)));

    let command = CommandMessage::new(
        1,
        "desk",
        Command::UpdateCustomStream {
            url: "https://custom.example/b".into(),
            data: StreamData::new("https://custom.example/b"),
        },
    );
    ws.send(Message::Text(command.to_json().unwrap())).await.unwrap();

    let mut state = handle.subscribe();
    tokio::time::timeout(WAIT, state.wait_for(|s| s.custom_streams.len() == 1))
        .await
        .unwrap()
        .unwrap();

    let _ = ws.close(None).await;
    drop(ws);
    node.shutdown().await;
}

async fn next_data_frame(ws: &mut WebSocketStream<TcpStream>) -> Message {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        if matches!(msg, Message::Text(_) | Message::Binary(_)) {
            return msg;
        }
    }
}

async fn accept_uplink(relay: &TcpListener) -> WebSocketStream<TcpStream> {
    let (socket, _) = tokio::time::timeout(WAIT, relay.accept()).await.unwrap().unwrap();
    accept_async(socket).await.unwrap()
}

#[tokio::test]
async fn uplink_resyncs_after_relay_drops() {
    let dir = tempdir().unwrap();
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = node_config(dir.path());
    config.control_endpoint = Some(Url::parse(&format!("ws://{}/", relay.local_addr().unwrap())).unwrap());
    config.reconnect = ReconnectPolicy::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
        .with_jitter(Duration::ZERO);

    let node = StreamwallNode::new(config).unwrap().start().await.unwrap();
    let handle = node.handle().clone();

    let mut first = accept_uplink(&relay).await;
    assert!(matches!(next_data_frame(&mut first).await, Message::Text(_)));
    assert!(matches!(next_data_frame(&mut first).await, Message::Binary(_)));
    drop(first);

    handle.submit(assign(6, 3), CommandOrigin::Local).await.unwrap();

    let mut second = accept_uplink(&relay).await;
    let Message::Text(text) = next_data_frame(&mut second).await else {
        panic!("expected state before the snapshot");
    };
    let update = UpdateMessage::from_json(&text).unwrap();
    assert_eq!(update.snapshot().identity.role, Role::Admin);

    let Message::Binary(snapshot) = next_data_frame(&mut second).await else {
        panic!("expected a store snapshot after the state");
    };
    let mut replica = ViewStore::new(9, ReplicaId(90));
    replica.load_snapshot(&snapshot).unwrap();
    assert_eq!(replica.get(6), Some(StreamId(3)));

    drop(second);
    node.shutdown().await;
}
