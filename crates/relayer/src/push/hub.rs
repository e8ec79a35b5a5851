use std::collections::HashMap;
use std::sync::Arc;

use payment_core::UniversalAddress;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::session::SessionHandle;
use super::{EntityKind, PushEvent, ServerEvent, SubscriptionFilter};

struct Registered {
    handle: SessionHandle,
    filters: Vec<SubscriptionFilter>,
}

/// Registration/lookup is guarded by a single mutex; message delivery itself is
/// mutex-free (channel sends only), matching spec §5's "session maps are protected by
/// a single mutex guarding registration/lookup only".
#[derive(Clone)]
pub struct Hub {
    sessions: Arc<Mutex<HashMap<Uuid, Registered>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn register(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            handle.id,
            Registered {
                handle,
                filters: Vec::new(),
            },
        );
    }

    pub async fn unregister(&self, id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&id);
    }

    pub async fn subscribe(&self, id: Uuid, filter: SubscriptionFilter) {
        let mut sessions = self.sessions.lock().await;
        if let Some(registered) = sessions.get_mut(&id) {
            registered.filters.push(filter);
        }
    }

    pub async fn unsubscribe(&self, id: Uuid, filter: SubscriptionFilter) {
        let mut sessions = self.sessions.lock().await;
        if let Some(registered) = sessions.get_mut(&id) {
            registered.filters.retain(|f| {
                !(f.entity_kind == filter.entity_kind && f.address == filter.address)
            });
        }
    }

    /// Fans `event` out to every session with a matching filter. Called only after the
    /// originating DB transaction has committed (spec §4.1 P7). Never blocks: a full
    /// session buffer evicts its oldest queued event rather than refusing this one
    /// (spec §4.5 backpressure — the newest event always reaches the client).
    pub async fn broadcast(&self, event: PushEvent) {
        let sessions = self.sessions.lock().await;
        for registered in sessions.values() {
            if !matches(&registered.filters, &event) {
                continue;
            }
            registered
                .handle
                .outbox
                .push(registered.handle.id, ServerEvent::Push(event.clone()));
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(filters: &[SubscriptionFilter], event: &PushEvent) -> bool {
    filters.iter().any(|f| {
        if f.entity_kind != event.entity_kind {
            return false;
        }
        if let Some(address) = &f.address {
            if !address_matches(address, &event.owner) {
                return false;
            }
        }
        if let (Some(asset_ids), Some(asset_id)) = (&f.asset_ids, &event.asset_id) {
            if !asset_ids.iter().any(|a| a == asset_id) {
                return false;
            }
        }
        true
    })
}

fn address_matches(filter_address: &str, owner: &UniversalAddress) -> bool {
    owner.to_hex().eq_ignore_ascii_case(filter_address) || owner.to_hex() == filter_address
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_same_entity_kind_and_no_address() {
        let filter = SubscriptionFilter {
            entity_kind: EntityKind::Checkbooks,
            address: None,
            asset_ids: None,
        };
        let event = PushEvent {
            entity_kind: EntityKind::Checkbooks,
            entity_id: "x".into(),
            owner: UniversalAddress::from_evm_address(714, &[0x01u8; 20]),
            status: "with_checkbook".into(),
            asset_id: None,
        };
        assert!(matches(&[filter], &event));
    }

    #[test]
    fn filter_rejects_mismatched_entity_kind() {
        let filter = SubscriptionFilter {
            entity_kind: EntityKind::Withdraws,
            address: None,
            asset_ids: None,
        };
        let event = PushEvent {
            entity_kind: EntityKind::Checkbooks,
            entity_id: "x".into(),
            owner: UniversalAddress::from_evm_address(714, &[0x01u8; 20]),
            status: "with_checkbook".into(),
            asset_id: None,
        };
        assert!(!matches(&[filter], &event));
    }
}
