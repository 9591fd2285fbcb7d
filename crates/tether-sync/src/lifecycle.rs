//! Translates upstream signals into status transitions and bus events.
//!
//! Rejected transitions are expected (a second `connected` while already
//! syncing, for instance) and only logged.

use std::sync::Arc;

use tether_shared::jid::normalize_jid;
use tether_shared::{Bus, ContactUpdate, EventPayload, State, StatusMachine};
use tracing::{debug, info, warn};

use crate::upstream::{IdentityCache, UpstreamSignal};

pub struct Lifecycle {
    status: Arc<StatusMachine>,
    bus: Bus,
    identities: Arc<IdentityCache>,
}

impl Lifecycle {
    pub fn new(status: Arc<StatusMachine>, bus: Bus, identities: Arc<IdentityCache>) -> Self {
        Self {
            status,
            bus,
            identities,
        }
    }

    pub fn handle(&self, signal: UpstreamSignal) {
        match signal {
            UpstreamSignal::Connected => {
                info!("upstream connected");
                if matches!(
                    self.status.current(),
                    State::Booting | State::AuthRequired | State::Reconnecting | State::Degraded
                ) {
                    self.transition(State::Connecting);
                }
                self.transition(State::Syncing);
                self.bus.publish(EventPayload::Connected);
            }
            UpstreamSignal::Disconnected => {
                warn!("upstream disconnected");
                self.transition(State::Reconnecting);
                self.bus.publish(EventPayload::Disconnected);
            }
            UpstreamSignal::LoggedOut { reason } => {
                warn!(reason = %reason, "upstream logged out");
                self.transition(State::AuthRequired);
                self.bus.publish(EventPayload::LoggedOut { reason });
            }
            UpstreamSignal::Message(message) => {
                // The first live message proves the session is fully up.
                if self.status.current() == State::Syncing {
                    self.transition(State::Ready);
                }
                self.bus
                    .publish(EventPayload::UpstreamMessage(message.normalized()));
            }
            UpstreamSignal::HistorySync { messages, contacts } => {
                debug!(
                    messages = messages.len(),
                    contacts = contacts.len(),
                    "history sync received"
                );
                if !messages.is_empty() {
                    let messages = messages.into_iter().map(|m| m.normalized()).collect();
                    self.bus.publish(EventPayload::UpstreamHistoryBatch(messages));
                }
                if !contacts.is_empty() {
                    self.bus.publish(EventPayload::UpstreamContactBatch(contacts));
                }
            }
            UpstreamSignal::PushName { jid, push_name } => {
                self.bus.publish(EventPayload::UpstreamContact(ContactUpdate {
                    jid: normalize_jid(&jid),
                    name: String::new(),
                    push_name,
                }));
            }
            UpstreamSignal::IdentityMap { mappings } => {
                debug!(count = mappings.len(), "identity mapping updated");
                self.identities.replace(mappings);
            }
        }
    }

    fn transition(&self, to: State) {
        if let Err(e) = self.status.transition(to) {
            debug!(error = %e, "ignoring transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shared::constants::{NS_SESSION, NS_SYNC, NS_UPSTREAM};
    use tether_shared::InboundMessage;
    use tether_store::IdentityMapping;

    fn setup() -> (Lifecycle, Arc<StatusMachine>, Bus, Arc<IdentityCache>) {
        let bus = Bus::new();
        let status = Arc::new(StatusMachine::new(bus.clone()));
        let cache = Arc::new(IdentityCache::new());
        let lifecycle = Lifecycle::new(status.clone(), bus.clone(), cache.clone());
        (lifecycle, status, bus, cache)
    }

    fn live(id: &str) -> UpstreamSignal {
        UpstreamSignal::Message(InboundMessage {
            chat_jid: "1:3@s.whatsapp.net".into(),
            msg_id: id.into(),
            sender_jid: String::new(),
            sender_name: String::new(),
            body: "hey".into(),
            message_type: "text".into(),
            from_me: false,
            timestamp: 1,
        })
    }

    #[test]
    fn test_connect_then_first_message_reaches_ready() {
        let (lifecycle, status, bus, _) = setup();
        let (mut sync_rx, _s1) = bus.subscribe(NS_SYNC, 8);
        let (mut up_rx, _s2) = bus.subscribe(NS_UPSTREAM, 8);

        lifecycle.handle(UpstreamSignal::Connected);
        assert_eq!(status.current(), State::Syncing);
        assert_eq!(sync_rx.try_recv().unwrap().payload, EventPayload::Connected);

        lifecycle.handle(live("m1"));
        assert_eq!(status.current(), State::Ready);
        match up_rx.try_recv().unwrap().payload {
            EventPayload::UpstreamMessage(m) => assert_eq!(m.chat_jid, "1@s.whatsapp.net"),
            other => panic!("unexpected {other:?}"),
        }

        lifecycle.handle(live("m2"));
        assert_eq!(status.current(), State::Ready);
    }

    #[test]
    fn test_reconnect_cycle() {
        let (lifecycle, status, _bus, _) = setup();
        lifecycle.handle(UpstreamSignal::Connected);
        lifecycle.handle(live("m1"));

        lifecycle.handle(UpstreamSignal::Disconnected);
        assert_eq!(status.current(), State::Reconnecting);

        lifecycle.handle(UpstreamSignal::Connected);
        assert_eq!(status.current(), State::Syncing);
    }

    #[test]
    fn test_logged_out_requires_auth_and_login_goes_through_connecting() {
        let (lifecycle, status, bus, _) = setup();
        let (mut rx, _sub) = bus.subscribe(NS_SESSION, 16);
        lifecycle.handle(UpstreamSignal::Connected);
        lifecycle.handle(live("m1"));

        lifecycle.handle(UpstreamSignal::LoggedOut {
            reason: "device removed".into(),
        });
        assert_eq!(status.current(), State::AuthRequired);
        let logged_out = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|e| e.kind() == "session.logged_out")
            .unwrap();
        assert_eq!(
            logged_out.payload,
            EventPayload::LoggedOut {
                reason: "device removed".into()
            }
        );

        lifecycle.handle(UpstreamSignal::Connected);
        assert_eq!(status.current(), State::Syncing);
    }

    #[test]
    fn test_history_sync_splits_into_batches() {
        let (lifecycle, _status, bus, _) = setup();
        let (mut rx, _sub) = bus.subscribe(NS_UPSTREAM, 8);

        lifecycle.handle(UpstreamSignal::HistorySync {
            messages: Vec::new(),
            contacts: vec![ContactUpdate {
                jid: "a@s".into(),
                name: "Ann".into(),
                push_name: String::new(),
            }],
        });
        assert_eq!(rx.try_recv().unwrap().kind(), "upstream.contact_batch");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_identity_map_fills_cache() {
        let (lifecycle, _status, bus, cache) = setup();
        lifecycle.handle(UpstreamSignal::IdentityMap {
            mappings: vec![IdentityMapping {
                alternate_jid: "1@lid".into(),
                canonical_jid: "1@s.whatsapp.net".into(),
            }],
        });
        assert_eq!(cache.len(), 1);
        assert_eq!(bus.dropped(), 0);
    }
}
