// Hidscan Event Dispatcher
// Fans classifier, registry and engine output out to subscribers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::input::DeviceId;
use crate::state::RegistryDiff;

/// One keystroke accepted from a scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharEvent {
    /// Printable character, `None` for control keys
    pub character: Option<char>,
    pub key_code: u32,
}

/// One completed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Scanned text
    pub code: String,
    /// Timestamp (ms) of the last character of the scan
    pub timestamp: u64,
}

/// Scanner attach/detach notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub device_id: DeviceId,
    pub connected: bool,
}

/// Handle returned by the `subscribe_*` methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Channel<T> {
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Channel<T> {
    fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: SubscriptionId, listener: Listener<T>) {
        self.listeners.write().push((id, listener));
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    fn emit(&self, value: &T) {
        // Snapshot so listeners may (un)subscribe while being called
        let listeners: Vec<Listener<T>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    fn len(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Routes events to zero or more subscribers per channel
pub struct EventDispatcher {
    next_id: AtomicU64,
    chars: Channel<CharEvent>,
    scans: Channel<ScanResult>,
    connections: Channel<ConnectionEvent>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("chars", &self.chars.len())
            .field("scans", &self.scans.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            chars: Channel::new(),
            scans: Channel::new(),
            connections: Channel::new(),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe_chars<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CharEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.chars.add(id, Arc::new(listener));
        id
    }

    pub fn subscribe_scans<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ScanResult) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.scans.add(id, Arc::new(listener));
        id
    }

    pub fn subscribe_connections<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.connections.add(id, Arc::new(listener));
        id
    }

    /// Remove a listener from whichever channel holds it
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.chars.remove(id) || self.scans.remove(id) || self.connections.remove(id)
    }

    pub fn emit_char(&self, event: &CharEvent) {
        self.chars.emit(event);
    }

    pub fn emit_scan(&self, result: &ScanResult) {
        self.scans.emit(result);
    }

    pub fn emit_connection(&self, event: &ConnectionEvent) {
        self.connections.emit(event);
    }

    /// Emit one connection event per entry of a registry diff.
    ///
    /// Disconnects go first so an id reused within one refresh reads as
    /// gone-then-back.
    pub fn emit_diff(&self, diff: &RegistryDiff) {
        for id in &diff.disconnected {
            log::info!("scanner {} disconnected", id);
            self.emit_connection(&ConnectionEvent {
                device_id: *id,
                connected: false,
            });
        }
        for device in &diff.connected {
            log::info!(
                "scanner {} connected: '{}' ({:04x}:{:04x})",
                device.id,
                device.name,
                device.vendor_id,
                device.product_id
            );
            self.emit_connection(&ConnectionEvent {
                device_id: device.id,
                connected: true,
            });
        }
    }

    pub fn char_listener_count(&self) -> usize {
        self.chars.len()
    }

    pub fn scan_listener_count(&self) -> usize {
        self.scans.len()
    }
}
