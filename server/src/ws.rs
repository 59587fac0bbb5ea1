//! The realtime channel transport (§6 "Realtime channel protocol"):
//! `GET /api/v1/ws?token=<enrollment-token>` upgrades to a WebSocket and
//! hands the split halves to [`mesh_core::hub::Hub::serve`] as an
//! [`AgentSink`]/[`AgentSource`] pair, grounded on the
//! `futures_util::StreamExt::split` pattern the example WebSocket clients
//! in this corpus use to drive a send half and a receive half from
//! separate tasks.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use mesh_core::hub::{AgentSink, AgentSource, ObservedHeartbeat, ServerMessage};
use mesh_core::model::Heartbeat;
use mesh_core::{CoreError, CoreResult};
use std::net::SocketAddr;

pub struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl AgentSink for WebSocketSink {
    async fn send(&mut self, message: &ServerMessage) -> CoreResult<()> {
        let text = serde_json::to_string(message).map_err(|e| CoreError::Validation(e.to_string()))?;
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|_| CoreError::Transient(rusqlite::Error::ExecuteReturnedResults))
    }

    async fn close(&mut self) {
        let _ = self.inner.send(Message::Close(None)).await;
        let _ = self.inner.close().await;
    }
}

pub struct WebSocketSource {
    inner: SplitStream<WebSocket>,
    source_addr: Option<SocketAddr>,
}

impl WebSocketSource {
    pub fn new(inner: SplitStream<WebSocket>, source_addr: Option<SocketAddr>) -> Self {
        Self { inner, source_addr }
    }
}

#[async_trait::async_trait]
impl AgentSource for WebSocketSource {
    async fn recv_heartbeat(&mut self) -> Option<ObservedHeartbeat> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Ok(heartbeat) = serde_json::from_str::<Heartbeat>(&text) else { continue };
                    return Some(ObservedHeartbeat { heartbeat, source_addr: self.source_addr });
                },
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return None,
            }
        }
    }
}
