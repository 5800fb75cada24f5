//! Presence roster: who is online right now, reconciled from the presence
//! channel's membership events.
//!
//! `Unsubscribed -> Subscribing -> Synced(ids)`. The snapshot delivered with
//! `subscription_succeeded` replaces the roster wholesale; after that single
//! adds/removes are applied. Incremental events that arrive before the
//! snapshot are ignored, the snapshot supersedes them. Nothing is persisted:
//! every new subscription starts over.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::bus::{BusClient, ChannelHandle};
use crate::models::channel::PRESENCE_ONLINE;
use crate::models::event::protocol;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RosterState {
    #[default]
    Unsubscribed,
    Subscribing,
    Synced(HashSet<String>),
}

#[derive(Clone)]
pub struct PresenceRoster {
    state: Arc<watch::Sender<RosterState>>,
}

impl Default for PresenceRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRoster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RosterState::Unsubscribed);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn state(&self) -> RosterState {
        self.state.borrow().clone()
    }

    /// A subscription was requested; any previous roster is discarded.
    pub fn begin_subscribe(&self) {
        self.state.send_replace(RosterState::Subscribing);
    }

    /// Replace the roster with the subscription snapshot. Ignored when not
    /// subscribed (a late handshake after teardown).
    pub fn apply_snapshot<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let ids: HashSet<String> = ids.into_iter().collect();
        self.state.send_if_modified(|state| {
            if *state == RosterState::Unsubscribed {
                return false;
            }
            *state = RosterState::Synced(ids);
            true
        });
    }

    /// Idempotent: adding a present id changes nothing.
    pub fn member_added(&self, user_id: &str) {
        self.state.send_if_modified(|state| match state {
            RosterState::Synced(ids) => ids.insert(user_id.to_string()),
            _ => false,
        });
    }

    /// Idempotent: removing an absent id changes nothing.
    pub fn member_removed(&self, user_id: &str) {
        self.state.send_if_modified(|state| match state {
            RosterState::Synced(ids) => ids.remove(user_id),
            _ => false,
        });
    }

    /// Back to `Unsubscribed` with an empty roster.
    pub fn clear(&self) {
        self.state.send_replace(RosterState::Unsubscribed);
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        match &*self.state.borrow() {
            RosterState::Synced(ids) => ids.contains(user_id),
            _ => false,
        }
    }

    /// Sorted ids currently online.
    pub fn online_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match &*self.state.borrow() {
            RosterState::Synced(ids) => ids.iter().cloned().collect(),
            _ => Vec::new(),
        };
        ids.sort();
        ids
    }

    pub fn subscribe(&self) -> watch::Receiver<RosterState> {
        self.state.subscribe()
    }
}

/// Member ids from a `subscription_succeeded` payload. Accepts the server's
/// `{"presence": {"ids": [...]}}` and the `{"members": {id: info}}` shape.
fn snapshot_ids(data: &Value) -> Option<Vec<String>> {
    if let Some(ids) = data.pointer("/presence/ids").and_then(Value::as_array) {
        return Some(
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        );
    }
    data.get("members")
        .and_then(Value::as_object)
        .map(|members| members.keys().cloned().collect())
}

fn member_id(data: &Value) -> Option<&str> {
    data.get("user_id").and_then(Value::as_str)
}

/// Binding of the shared presence channel to a roster. Dropping it unbinds
/// and clears the roster.
pub struct PresenceChannel {
    handle: ChannelHandle,
    roster: PresenceRoster,
}

impl PresenceChannel {
    pub fn join(bus: &BusClient, roster: PresenceRoster) -> Self {
        roster.begin_subscribe();
        let mut handle = bus.subscribe(PRESENCE_ONLINE);

        let r = roster.clone();
        handle.bind(protocol::CLIENT_SUBSCRIPTION_SUCCEEDED, move |data| {
            match snapshot_ids(data) {
                Some(ids) => {
                    info!(online = ids.len(), "presence roster synced");
                    r.apply_snapshot(ids);
                }
                None => warn!("presence snapshot without member list"),
            }
        });

        let r = roster.clone();
        handle.bind(protocol::CLIENT_MEMBER_ADDED, move |data| match member_id(data) {
            Some(id) => r.member_added(id),
            None => warn!("member_added without user_id"),
        });

        let r = roster.clone();
        handle.bind(protocol::CLIENT_MEMBER_REMOVED, move |data| match member_id(data) {
            Some(id) => r.member_removed(id),
            None => warn!("member_removed without user_id"),
        });

        handle.bind(protocol::CLIENT_SUBSCRIPTION_ERROR, |data| {
            warn!(error = %data, "presence subscription refused");
        });

        Self { handle, roster }
    }

    pub fn roster(&self) -> &PresenceRoster {
        &self.roster
    }
}

impl Drop for PresenceChannel {
    fn drop(&mut self) {
        self.handle.unbind_all();
        self.roster.clear();
        debug!("presence channel left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn synced(ids: &[&str]) -> PresenceRoster {
        let roster = PresenceRoster::new();
        roster.begin_subscribe();
        roster.apply_snapshot(ids.iter().map(|s| s.to_string()));
        roster
    }

    #[test]
    fn snapshot_then_incremental_updates() {
        let roster = synced(&["u1", "u3"]);
        roster.member_added("u2");
        assert_eq!(roster.online_ids(), vec!["u1", "u2", "u3"]);
        roster.member_removed("u1");
        assert_eq!(roster.online_ids(), vec!["u2", "u3"]);
        assert!(!roster.is_online("u1"));
        assert!(roster.is_online("u2"));
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let roster = synced(&["u1"]);
        roster.member_added("u1");
        roster.member_removed("u9");
        roster.member_removed("u9");
        assert_eq!(roster.online_ids(), vec!["u1"]);
    }

    #[test]
    fn disjoint_updates_commute() {
        let a = synced(&["u1"]);
        a.member_added("u2");
        a.member_removed("u1");
        a.member_added("u3");

        let b = synced(&["u1"]);
        b.member_added("u3");
        b.member_removed("u1");
        b.member_added("u2");

        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn incremental_events_before_snapshot_are_ignored() {
        let roster = PresenceRoster::new();
        roster.begin_subscribe();
        roster.member_added("u5");
        assert_eq!(roster.state(), RosterState::Subscribing);
        roster.apply_snapshot(vec!["u1".to_string()]);
        assert!(!roster.is_online("u5"));
    }

    #[test]
    fn resync_replaces_wholesale_and_clear_unsubscribes() {
        let roster = synced(&["u1", "u2"]);
        roster.apply_snapshot(vec!["u3".to_string()]);
        assert_eq!(roster.online_ids(), vec!["u3"]);

        roster.clear();
        assert_eq!(roster.state(), RosterState::Unsubscribed);
        roster.apply_snapshot(vec!["u4".to_string()]);
        assert_eq!(roster.state(), RosterState::Unsubscribed);
    }

    #[test]
    fn snapshot_ids_accepts_both_shapes() {
        let server = json!({ "presence": { "ids": ["u1", "u3"], "hash": {}, "count": 2 } });
        assert_eq!(snapshot_ids(&server).unwrap(), vec!["u1", "u3"]);

        let members = json!({ "members": { "u7": {} } });
        assert_eq!(snapshot_ids(&members).unwrap(), vec!["u7"]);

        assert!(snapshot_ids(&json!({})).is_none());
    }

    #[test]
    fn channel_binding_drives_roster_and_drop_clears_it() {
        let bus = BusClient::new();
        let roster = PresenceRoster::new();
        let channel = PresenceChannel::join(&bus, roster.clone());
        assert_eq!(roster.state(), RosterState::Subscribing);

        bus.dispatch(
            PRESENCE_ONLINE,
            "pusher:subscription_succeeded",
            &json!({ "presence": { "ids": ["u1", "u3"] } }),
        );
        bus.dispatch(PRESENCE_ONLINE, "pusher:member_added", &json!({ "user_id": "u2" }));
        assert_eq!(roster.online_ids(), vec!["u1", "u2", "u3"]);

        drop(channel);
        assert_eq!(roster.state(), RosterState::Unsubscribed);
        assert!(!bus.is_subscribed(PRESENCE_ONLINE));
        assert_eq!(
            bus.dispatch(PRESENCE_ONLINE, "pusher:member_added", &json!({ "user_id": "u4" })),
            0
        );
    }
}
