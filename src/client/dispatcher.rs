//! Per-session notification dispatcher bound to the user's private channel.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::bus::{BusClient, ChannelHandle};
use super::session::SessionInfo;
use super::unread::UnreadCounter;
use crate::models::channel::private_channel;
use crate::models::event::names;
use crate::models::notification::NotificationEvent;

/// The view the user is looking at, as far as refresh decisions care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveView {
    /// The conversations list (`/messages...`).
    Messages,
    /// Likes / matches lists (`/lists...`).
    Lists,
    Other,
}

impl ActiveView {
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/messages") {
            Self::Messages
        } else if path.starts_with("/lists") {
            Self::Lists
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
    pub auto_close: Duration,
}

impl Toast {
    pub fn message_from(sender: &str) -> Self {
        Self {
            kind: ToastKind::Info,
            text: format!("New message from {sender}"),
            auto_close: Duration::from_secs(3),
        }
    }

    pub fn liked_by(name: &str) -> Self {
        Self {
            kind: ToastKind::Success,
            text: format!("{name} liked you!"),
            auto_close: Duration::from_secs(5),
        }
    }

    pub fn matched_with(name: &str) -> Self {
        Self {
            kind: ToastKind::Success,
            text: format!("It's a match with {name}!"),
            auto_close: Duration::from_secs(5),
        }
    }
}

/// What the dispatcher needs from the rendering layer.
pub trait NotificationUi: Send + Sync {
    fn active_view(&self) -> ActiveView;

    /// Refetch server data for the current view.
    fn refresh(&self);

    fn toast(&self, toast: Toast);

    /// Whether the thread with `other_user_id` is open and focused. A focused
    /// thread already shows the message, so no toast and no unread bump.
    fn is_viewing_thread(&self, _other_user_id: &str) -> bool {
        false
    }
}

/// Binds `message:new`, `like:new` and `match:new` on `private-{user}` for as
/// long as it lives.
pub struct NotificationDispatcher {
    handle: ChannelHandle,
    user_id: String,
}

impl NotificationDispatcher {
    /// `None` (nothing subscribed) when there is no user or the profile is
    /// incomplete.
    pub fn attach(
        bus: &BusClient,
        session: &SessionInfo,
        unread: UnreadCounter,
        ui: Arc<dyn NotificationUi>,
    ) -> Option<Self> {
        let user_id = session.active_user()?.to_string();
        let channel = private_channel(&user_id);
        let mut handle = bus.subscribe(&channel);

        for event in [names::MESSAGE_NEW, names::LIKE_NEW, names::MATCH_NEW] {
            let unread = unread.clone();
            let ui = ui.clone();
            handle.bind(event, move |data| {
                match NotificationEvent::parse(event, data) {
                    Ok(Some(notification)) => handle_notification(notification, &unread, ui.as_ref()),
                    Ok(None) => {}
                    Err(e) => warn!(event = %event, error = %e, "dropping malformed notification"),
                }
            });
        }

        info!(channel = %channel, "notifications attached");
        Some(Self { handle, user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.handle.unbind_all();
        debug!(user_id = %self.user_id, "notifications detached");
    }
}

fn handle_notification(event: NotificationEvent, unread: &UnreadCounter, ui: &dyn NotificationUi) {
    match event {
        NotificationEvent::MessageNew(message) => {
            if ui.is_viewing_thread(&message.sender_id) {
                debug!(sender = %message.sender_id, "thread focused, suppressing toast");
                return;
            }
            unread.update_unread_count(1);
            ui.toast(Toast::message_from(&message.sender_name));
            if ui.active_view() == ActiveView::Messages {
                ui.refresh();
            }
        }
        NotificationEvent::LikeNew(like) => {
            ui.toast(Toast::liked_by(&like.name));
            if ui.active_view() == ActiveView::Lists {
                ui.refresh();
            }
        }
        NotificationEvent::MatchNew(matched) => {
            ui.toast(Toast::matched_with(&matched.name));
            if ui.active_view() == ActiveView::Lists {
                ui.refresh();
            }
        }
        // Read receipts travel on conversation channels only.
        NotificationEvent::MessagesRead(_) => {}
    }
}
