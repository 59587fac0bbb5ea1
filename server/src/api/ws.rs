//! Realtime channel upgrade (§4.6, §6): `GET /api/v1/ws?token=...`. The
//! enrollment token is the channel's credential, same as the resolve
//! endpoint — there is no separate login step for an agent.

use crate::{ws::{WebSocketSink, WebSocketSource}, AppState};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/ws", get(upgrade))
}

#[derive(Deserialize)]
struct WsQuery {
    token: String,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, source) = socket.split();
        let sink = Box::new(WebSocketSink::new(sink));
        let source = Box::new(WebSocketSource::new(source, Some(addr)));

        if let Err(e) = state.hub.serve(&q.token, sink, source).await {
            tracing::warn!(error = %e, "agent channel closed with an error");
        }
    })
}
