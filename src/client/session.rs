//! Session lifecycle: what a signed-in tab runs, started and ended as a unit.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::bus::BusClient;
use super::dispatcher::{NotificationDispatcher, NotificationUi};
use super::presence::{PresenceChannel, PresenceRoster};
use super::unread::UnreadCounter;

/// Who is signed in, as reported by the auth collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionInfo {
    pub user_id: Option<String>,
    #[serde(default)]
    pub profile_complete: bool,
}

impl SessionInfo {
    /// The user id when private/presence subscriptions are allowed.
    pub fn active_user(&self) -> Option<&str> {
        match self.user_id.as_deref() {
            Some(id) if !id.is_empty() && self.profile_complete => Some(id),
            _ => None,
        }
    }
}

/// State containers built once per tab and shared with the views.
#[derive(Clone, Default)]
pub struct ClientStores {
    pub unread: UnreadCounter,
    pub roster: PresenceRoster,
}

/// Dispatcher plus presence for one signed-in session.
pub struct NotificationSession {
    stores: ClientStores,
    dispatcher: Option<NotificationDispatcher>,
    presence: Option<PresenceChannel>,
}

impl NotificationSession {
    /// Subscribes nothing for an anonymous or incomplete session; the stores
    /// are still usable.
    pub fn start(
        bus: &BusClient,
        session: &SessionInfo,
        stores: ClientStores,
        ui: Arc<dyn NotificationUi>,
    ) -> Self {
        let dispatcher =
            NotificationDispatcher::attach(bus, session, stores.unread.clone(), ui);
        let presence = dispatcher
            .as_ref()
            .map(|_| PresenceChannel::join(bus, stores.roster.clone()));

        if let Some(user_id) = session.active_user() {
            info!(user_id = %user_id, "notification session started");
        }
        Self {
            stores,
            dispatcher,
            presence,
        }
    }

    pub fn is_active(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn stores(&self) -> &ClientStores {
        &self.stores
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.stores.roster.is_online(user_id)
    }

    /// Sign-out: unbind everything, clear the roster, zero the counter.
    pub fn end(mut self) {
        self.dispatcher.take();
        self.presence.take();
        self.stores.roster.clear();
        self.stores.unread.reset_messages();
        info!("notification session ended");
    }
}
