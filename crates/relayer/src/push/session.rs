use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use payment_core::UniversalAddress;
use tokio::time::{interval, timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use super::outbox::Outbox;
use super::{ControlFrame, ServerEvent};
use super::hub::Hub;
use crate::push::{PING_INTERVAL_SECONDS, PONG_GRACE_SECONDS, READ_DEADLINE_SECONDS};

/// Handle registered with the `Hub`. Cloned freely; pushing through it never touches
/// the socket directly (spec §4.5, §9 "one writer per session") and never blocks —
/// `Outbox::push` evicts the oldest queued event instead.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub owner: UniversalAddress,
    pub outbox: Outbox,
}

pub struct Session {
    pub id: Uuid,
    pub owner: UniversalAddress,
}

impl Session {
    pub fn new(owner: UniversalAddress) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
        }
    }

    /// Drives one WebSocket connection to completion. Spawns no helper tasks that
    /// write to `socket` directly — the only writer is the loop below, which merges
    /// inbound control frames and outbound `ServerEvent`s from the `Hub`.
    pub async fn run(self, socket: WebSocket, hub: Hub) {
        let (mut sink, mut stream) = socket.split();
        let outbox = Outbox::new();

        let handle = SessionHandle {
            id: self.id,
            owner: self.owner.clone(),
            outbox: outbox.clone(),
        };
        hub.register(handle).await;

        let mut awaiting_pong = false;
        // Proactive keepalive, independent of read activity (spec §4.5 "protocol-level
        // pings sent every 54s"). The first tick fires immediately; drain it so the
        // cadence starts counting from connection time, not from t=0.
        let mut keepalive = interval(Duration::from_secs(PING_INTERVAL_SECONDS));
        keepalive.tick().await;

        loop {
            tokio::select! {
                event = outbox.recv() => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    outbox.push(self.id, ServerEvent::Ping);
                }
                inbound = timeout(Duration::from_secs(READ_DEADLINE_SECONDS), stream.next()) => {
                    match inbound {
                        Ok(Some(Ok(Message::Text(text)))) => {
                            awaiting_pong = false;
                            if text.contains("\"ping\"") {
                                outbox.push(self.id, ServerEvent::Pong);
                            } else if let Ok(frame) = serde_json::from_str::<ControlFrame>(&text) {
                                match frame {
                                    ControlFrame::Subscribe(filter) => hub.subscribe(self.id, filter).await,
                                    ControlFrame::Unsubscribe(filter) => hub.unsubscribe(self.id, filter).await,
                                }
                            }
                        }
                        Ok(Some(Ok(Message::Pong(_)))) => {
                            awaiting_pong = false;
                        }
                        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => {
                            warn!(session_id = %self.id, error = %e, "websocket read error");
                            break;
                        }
                        Err(_) => {
                            // Read deadline elapsed with no inbound frame: send a control
                            // ping and require either a pong or any frame within the next
                            // 5s grace window (spec §4.5), else close.
                            if awaiting_pong {
                                debug!(session_id = %self.id, "no pong within grace window, closing");
                                break;
                            }
                            awaiting_pong = true;
                            outbox.push(self.id, ServerEvent::Ping);

                            match timeout(Duration::from_secs(PONG_GRACE_SECONDS), stream.next()).await {
                                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                                Ok(Some(Ok(_))) => {
                                    awaiting_pong = false;
                                }
                                Ok(Some(Err(e))) => {
                                    warn!(session_id = %self.id, error = %e, "websocket read error during grace window");
                                    break;
                                }
                                Err(_) => {
                                    debug!(session_id = %self.id, "no pong within grace window, closing");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        hub.unregister(self.id).await;
    }
}
