//! Test doubles for driving the client core without a network.

use std::sync::Arc;

use parking_lot::Mutex;

use super::dispatcher::{ActiveView, NotificationUi, Toast};
use super::thread::ThreadView;
use super::Transport;

/// Transport that records join/leave calls.
#[derive(Default)]
pub struct RecordingTransport {
    joins: Mutex<Vec<String>>,
    leaves: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().clone()
    }

    pub fn leaves(&self) -> Vec<String> {
        self.leaves.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn join(&self, channel: &str) {
        self.joins.lock().push(channel.to_string());
    }

    fn leave(&self, channel: &str) {
        self.leaves.lock().push(channel.to_string());
    }
}

/// UI double: configurable active view and focused thread, records toasts,
/// refreshes and scrolls.
#[derive(Default)]
pub struct RecordingUi {
    view: Mutex<Option<ActiveView>>,
    focused_thread: Mutex<Option<String>>,
    toasts: Mutex<Vec<Toast>>,
    refreshes: Mutex<usize>,
    scrolls: Mutex<usize>,
}

impl RecordingUi {
    pub fn new(view: ActiveView) -> Arc<Self> {
        let ui = Self::default();
        *ui.view.lock() = Some(view);
        Arc::new(ui)
    }

    pub fn set_view(&self, view: ActiveView) {
        *self.view.lock() = Some(view);
    }

    pub fn focus_thread(&self, other_user_id: Option<&str>) {
        *self.focused_thread.lock() = other_user_id.map(str::to_string);
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock()
    }

    pub fn scrolls(&self) -> usize {
        *self.scrolls.lock()
    }
}

impl NotificationUi for RecordingUi {
    fn active_view(&self) -> ActiveView {
        self.view.lock().unwrap_or(ActiveView::Other)
    }

    fn refresh(&self) {
        *self.refreshes.lock() += 1;
    }

    fn toast(&self, toast: Toast) {
        self.toasts.lock().push(toast);
    }

    fn is_viewing_thread(&self, other_user_id: &str) -> bool {
        self.focused_thread.lock().as_deref() == Some(other_user_id)
    }
}

impl ThreadView for RecordingUi {
    fn scroll_to_latest(&self) {
        *self.scrolls.lock() += 1;
    }
}
