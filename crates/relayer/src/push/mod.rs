//! Push / subscription fabric (spec §4.5). "One writer per session, period" — every
//! event source (the lifecycle state machine, pong replies, server-initiated pings)
//! funnels into a session's private `Outbox`; nothing else ever touches the socket.

pub mod hub;
pub mod outbox;
pub mod session;

use payment_core::UniversalAddress;
use serde::{Deserialize, Serialize};

pub use hub::Hub;
pub use outbox::Outbox;
pub use session::Session;

/// Per-session send buffer bound (spec §4.5 backpressure: "e.g. 256 messages").
pub const SESSION_BUFFER_SIZE: usize = 256;

/// Read-deadline / keepalive cadence (spec §4.5 liveness).
pub const READ_DEADLINE_SECONDS: u64 = 60;
pub const PING_INTERVAL_SECONDS: u64 = 54;
pub const PONG_GRACE_SECONDS: u64 = 5;

/// A committed state transition, fanned out to matching sessions (spec §4.1 "push after
/// commit", §4.5 subscription filter).
#[derive(Clone, Debug, Serialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub owner: UniversalAddress,
    pub status: String,
    pub asset_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Deposits,
    Checkbooks,
    Withdraws,
    Prices,
}

/// Inbound control frame (spec §6 `/ws`).
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlFrame {
    Subscribe(SubscriptionFilter),
    Unsubscribe(SubscriptionFilter),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(rename = "type")]
    pub entity_kind: EntityKind,
    pub address: Option<String>,
    pub asset_ids: Option<Vec<String>>,
}

/// Frame the server ever writes to a socket. `Ping` is its own variant so the single
/// writer task can distinguish "plain keepalive" from a normal push payload without
/// reparsing JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Push(PushEvent),
    Pong,
    Ping,
}
