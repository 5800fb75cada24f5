//! Open chat thread bound to its conversation channel.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::bus::{BusClient, ChannelHandle};
use crate::models::channel::conversation_id;
use crate::models::event::names;
use crate::models::notification::{MessageDto, NotificationEvent};

/// Rendering hook for the thread view.
pub trait ThreadView: Send + Sync {
    fn scroll_to_latest(&self);
}

/// Messages of one conversation in receipt order. Appends `message:new`,
/// applies `messages:read` locally. Unbinds on drop.
pub struct ChatThread {
    handle: ChannelHandle,
    messages: Arc<Mutex<Vec<MessageDto>>>,
}

impl ChatThread {
    pub fn open(
        bus: &BusClient,
        user_a: &str,
        user_b: &str,
        initial: Vec<MessageDto>,
        view: Arc<dyn ThreadView>,
    ) -> Self {
        let channel = conversation_id(user_a, user_b);
        let messages = Arc::new(Mutex::new(initial));
        let mut handle = bus.subscribe(&channel);

        let list = messages.clone();
        handle.bind(names::MESSAGE_NEW, move |data| {
            match NotificationEvent::parse(names::MESSAGE_NEW, data) {
                Ok(Some(NotificationEvent::MessageNew(message))) => {
                    {
                        let mut list = list.lock();
                        // Redelivery after a reconnect.
                        if list.iter().any(|m| m.id == message.id) {
                            return;
                        }
                        list.push(message);
                    }
                    view.scroll_to_latest();
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "dropping malformed message"),
            }
        });

        let list = messages.clone();
        handle.bind(names::MESSAGES_READ, move |data| {
            match NotificationEvent::parse(names::MESSAGES_READ, data) {
                Ok(Some(NotificationEvent::MessagesRead(ids))) => {
                    let now = Utc::now();
                    let mut list = list.lock();
                    for message in list.iter_mut().filter(|m| ids.contains(&m.id)) {
                        if message.date_read.is_none() {
                            message.date_read = Some(now);
                        }
                    }
                    debug!(read = ids.len(), "read markers applied");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "dropping malformed read receipt"),
            }
        });

        Self { handle, messages }
    }

    pub fn channel(&self) -> &str {
        self.handle.name()
    }

    /// Snapshot of the thread.
    pub fn messages(&self) -> Vec<MessageDto> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Drop for ChatThread {
    fn drop(&mut self) {
        self.handle.unbind_all();
    }
}
