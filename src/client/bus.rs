//! Subscribe-side bus client: a reference-counted channel registry with
//! per-event callback bindings.
//!
//! Several views may subscribe to the same channel. Each gets its own
//! [`ChannelHandle`]; the network join happens on the first handle and the
//! leave on the last, so one view unsubscribing never breaks another.
//! Dropping a handle unbinds everything it bound and releases its reference.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::Transport;

/// Callback invoked with the event payload.
pub type EventCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Token returned by [`ChannelHandle::bind`], used to unbind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

struct Binding {
    id: BindingId,
    event: String,
    callback: EventCallback,
}

#[derive(Default)]
struct ChannelEntry {
    refs: usize,
    bindings: Vec<Binding>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, ChannelEntry>,
    next_binding: u64,
    transport: Option<Arc<dyn Transport>>,
}

/// Shared handle to the registry. Cheap to clone.
#[derive(Clone, Default)]
pub struct BusClient {
    registry: Arc<Mutex<Registry>>,
}

/// Non-owning reference held by transports, so bus and transport don't keep
/// each other alive.
#[derive(Clone)]
pub struct WeakBusClient {
    registry: Weak<Mutex<Registry>>,
}

impl WeakBusClient {
    pub fn upgrade(&self) -> Option<BusClient> {
        self.registry.upgrade().map(|registry| BusClient { registry })
    }
}

impl BusClient {
    /// A bus with no transport yet: subscriptions and bindings are recorded
    /// but nothing arrives until [`BusClient::attach_transport`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakBusClient {
        WeakBusClient {
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Install the network transport and join every channel already referenced.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        let mut registry = self.registry.lock();
        for channel in registry.channels.keys() {
            transport.join(channel);
        }
        registry.transport = Some(transport);
    }

    /// Drop the transport; later joins/leaves are local only.
    pub fn detach_transport(&self) {
        self.registry.lock().transport = None;
    }

    pub fn has_transport(&self) -> bool {
        self.registry.lock().transport.is_some()
    }

    /// Take a reference on `channel`.
    ///
    /// Joins and leaves reach the transport while the registry is locked, so
    /// the transport sees them in the same order as the refcount changes.
    pub fn subscribe(&self, channel: &str) -> ChannelHandle {
        {
            let mut registry = self.registry.lock();
            let registry = &mut *registry;
            let entry = registry.channels.entry(channel.to_string()).or_default();
            entry.refs += 1;
            debug!(channel = %channel, refs = entry.refs, "channel referenced");
            if entry.refs == 1 {
                if let Some(transport) = &registry.transport {
                    transport.join(channel);
                }
            }
        }
        ChannelHandle {
            bus: self.clone(),
            channel: channel.to_string(),
            owned: Vec::new(),
        }
    }

    /// Deliver an incoming event to every callback bound for it, in bind
    /// order. Callbacks run outside the registry lock. Returns how many ran.
    pub fn dispatch(&self, channel: &str, event: &str, data: &serde_json::Value) -> usize {
        let callbacks: Vec<EventCallback> = {
            let registry = self.registry.lock();
            match registry.channels.get(channel) {
                Some(entry) => entry
                    .bindings
                    .iter()
                    .filter(|b| b.event == event)
                    .map(|b| b.callback.clone())
                    .collect(),
                None => Vec::new(),
            }
        };
        trace!(channel = %channel, event = %event, handlers = callbacks.len(), "dispatch");
        for callback in &callbacks {
            callback(data);
        }
        callbacks.len()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.registry.lock().channels.contains_key(channel)
    }

    /// Channels with at least one live handle.
    pub fn subscribed_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn binding_count(&self, channel: &str) -> usize {
        self.registry
            .lock()
            .channels
            .get(channel)
            .map(|e| e.bindings.len())
            .unwrap_or(0)
    }

    fn add_binding(&self, channel: &str, event: &str, callback: EventCallback) -> BindingId {
        let mut registry = self.registry.lock();
        registry.next_binding += 1;
        let id = BindingId(registry.next_binding);
        if let Some(entry) = registry.channels.get_mut(channel) {
            entry.bindings.push(Binding {
                id,
                event: event.to_string(),
                callback,
            });
        }
        id
    }

    fn remove_bindings(&self, channel: &str, ids: &[BindingId]) {
        let mut registry = self.registry.lock();
        if let Some(entry) = registry.channels.get_mut(channel) {
            entry.bindings.retain(|b| !ids.contains(&b.id));
        }
    }

    fn release(&self, channel: &str, owned: &[BindingId]) {
        let mut registry = self.registry.lock();
        let Some(entry) = registry.channels.get_mut(channel) else {
            return;
        };
        entry.bindings.retain(|b| !owned.contains(&b.id));
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return;
        }
        // Dropped after the lock so binding closures never run under it.
        let released = registry.channels.remove(channel);
        debug!(channel = %channel, "channel released");
        if let Some(transport) = &registry.transport {
            transport.leave(channel);
        }
        drop(registry);
        drop(released);
    }
}

/// One consumer's reference to a channel. Unbinds and releases on drop.
pub struct ChannelHandle {
    bus: BusClient,
    channel: String,
    owned: Vec<BindingId>,
}

impl ChannelHandle {
    pub fn name(&self) -> &str {
        &self.channel
    }

    pub fn bind<F>(&mut self, event: &str, callback: F) -> BindingId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let id = self.bus.add_binding(&self.channel, event, Arc::new(callback));
        self.owned.push(id);
        id
    }

    /// Remove one binding made through this handle. Returns whether it existed.
    pub fn unbind(&mut self, id: BindingId) -> bool {
        let Some(pos) = self.owned.iter().position(|b| *b == id) else {
            return false;
        };
        self.owned.swap_remove(pos);
        self.bus.remove_bindings(&self.channel, &[id]);
        true
    }

    /// Remove every binding made through this handle; the reference stays.
    pub fn unbind_all(&mut self) {
        let owned = std::mem::take(&mut self.owned);
        self.bus.remove_bindings(&self.channel, &owned);
    }

    /// Release this reference (same as dropping the handle).
    pub fn unsubscribe(self) {}
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        let owned = std::mem::take(&mut self.owned);
        self.bus.release(&self.channel, &owned);
    }
}
