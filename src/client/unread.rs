//! Unread message counter.
//!
//! Never negative. Seeded from the server's authoritative count on every
//! page load that shows it, so drift from missed events heals on the next
//! seed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

#[derive(Clone)]
pub struct UnreadCounter {
    count: Arc<watch::Sender<u32>>,
}

impl Default for UnreadCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl UnreadCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    pub fn get(&self) -> u32 {
        *self.count.borrow()
    }

    /// Absolute set from the server-computed count.
    pub fn set_unread_count(&self, n: u32) {
        self.count.send_replace(n);
        debug!(unread = n, "unread count seeded");
    }

    /// Relative adjustment, clamped at zero. Returns the new value.
    pub fn update_unread_count(&self, delta: i64) -> u32 {
        let mut result = 0;
        self.count.send_if_modified(|n| {
            let next = (i64::from(*n) + delta).clamp(0, i64::from(u32::MAX)) as u32;
            result = next;
            if next == *n {
                return false;
            }
            *n = next;
            true
        });
        result
    }

    /// Back to zero (sign-out).
    pub fn reset_messages(&self) {
        self.count.send_replace(0);
    }

    /// Change notifications for views rendering the badge.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.count.subscribe()
    }
}
