//! HTTP and WebSocket endpoint for remote control peers.
//!
//! Peers connect to `/ws?token=<secret>`. The token decides the role; an
//! invite is redeemed on first use. Everything after the upgrade is a
//! [`PeerSession`].

use crate::engine::EngineHandle;
use crate::error::Result;
use crate::peer::PeerSession;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use streamwall_protocols::{Frame, Role};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

pub fn build_router(handle: EngineHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}

/// Serve the control endpoint on `listener` until `shutdown` becomes true.
pub async fn serve(listener: TcpListener, handle: EngineHandle, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    info!("control server listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(handle))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(handle): State<EngineHandle>,
) -> Response {
    let Some(token) = params.token else {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    };
    let role = match handle.authenticate(&token).await {
        Ok(Some(role)) => role,
        Ok(None) => {
            warn!("rejected connection with unknown token");
            return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
        }
        Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, handle, role))
}

async fn handle_socket(socket: WebSocket, handle: EngineHandle, role: Role) {
    let mut session = match PeerSession::open(handle, role).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "could not attach peer");
            return;
        }
    };
    let peer = session.peer();
    info!(peer, %role, "peer connected");

    let (sink, stream) = socket.split();
    let mut sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = stream.filter_map(|msg| future::ready(from_message(msg)));

    if let Err(e) = session.sync(&mut sink).await {
        debug!(peer, error = %e, "initial sync failed");
        return;
    }
    if let Err(e) = session.pump(sink, stream).await {
        debug!(peer, error = %e, "peer session failed");
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(msg: std::result::Result<Message, axum::Error>) -> Option<std::result::Result<Frame, axum::Error>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Err(e) => Some(Err(e)),
    }
}
