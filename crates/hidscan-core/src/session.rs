// Hidscan Scanner Session
// Facade wiring the registry, dispatcher and scan engine together

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{CharEvent, EventDispatcher, ScanResult, SubscriptionId};
use crate::input::{Classifier, DeviceDescriptor, DeviceId, DeviceSource, KeyEvent};
use crate::scan::{IdleTimer, ScanConfig, ScanEngine, ThreadTimer};
use crate::settings::{Settings, SettingsError};
use crate::state::{DeviceRegistry, RegistryDiff};

#[derive(Debug, Default)]
struct ScanListeners {
    scan: Option<SubscriptionId>,
    chars: Option<SubscriptionId>,
}

/// Entry point for hosts: feed device lists and key events in, receive
/// scans and connection changes out.
#[derive(Debug)]
pub struct ScannerSession {
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<EventDispatcher>,
    engine: ScanEngine,
    listeners: Mutex<ScanListeners>,
}

impl Default for ScannerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerSession {
    /// Session with the default classifier, default configuration and a
    /// background timer thread
    pub fn new() -> Self {
        Self::with_timer(ThreadTimer::new())
    }

    pub fn with_timer<T: IdleTimer + 'static>(timer: T) -> Self {
        Self::with_parts(Classifier::default(), ScanConfig::default(), timer)
    }

    pub fn with_parts<T: IdleTimer + 'static>(
        classifier: Classifier,
        config: ScanConfig,
        timer: T,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new(classifier));
        let dispatcher = Arc::new(EventDispatcher::new());
        let engine = ScanEngine::with_parts(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::new(config),
            Box::new(timer),
        );

        Self {
            registry,
            dispatcher,
            engine,
            listeners: Mutex::new(ScanListeners::default()),
        }
    }

    /// Session configured from loaded settings
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Self::from_settings_with_timer(settings, ThreadTimer::new())
    }

    pub fn from_settings_with_timer<T: IdleTimer + 'static>(
        settings: &Settings,
        timer: T,
    ) -> Result<Self, SettingsError> {
        let classifier = Classifier::new(&settings.classifier_policy()?);
        Ok(Self::with_parts(classifier, settings.scan_config(), timer))
    }

    pub fn engine(&self) -> &ScanEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    fn publish(&self, diff: RegistryDiff) -> RegistryDiff {
        self.dispatcher.emit_diff(&diff);
        diff
    }

    /// Replace the known device list and report what changed
    pub fn sync_devices(&self, descriptors: &[DeviceDescriptor]) -> RegistryDiff {
        self.publish(self.registry.refresh(descriptors))
    }

    pub fn sync_from<S: DeviceSource + ?Sized>(&self, source: &S) -> RegistryDiff {
        self.publish(self.registry.refresh_from(source))
    }

    pub fn device_added(&self, descriptor: DeviceDescriptor) -> RegistryDiff {
        self.publish(self.registry.device_added(descriptor))
    }

    pub fn device_removed(&self, id: DeviceId) -> RegistryDiff {
        self.publish(self.registry.device_removed(id))
    }

    pub fn device_changed(&self, descriptor: DeviceDescriptor) -> RegistryDiff {
        self.publish(self.registry.device_changed(descriptor))
    }

    pub fn has_external_scanner(&self) -> bool {
        self.registry.has_external_scanner()
    }

    /// Scanners currently connected, in attach order
    pub fn connected_devices(&self) -> Vec<DeviceDescriptor> {
        self.registry.snapshot()
    }

    /// Log every device with its verdict and deciding rule at debug level
    pub fn log_devices(&self, descriptors: &[DeviceDescriptor]) {
        for device in descriptors {
            let classification = self.registry.classifier().explain(device);
            log::debug!(
                "device {} '{}' ({:04x}:{:04x}) virtual={} sources={:?} keyboard={}: {} [{}]",
                device.id,
                device.name,
                device.vendor_id,
                device.product_id,
                device.is_virtual,
                device.sources,
                device.keyboard_type,
                classification.verdict,
                classification.rule
            );
        }
    }

    /// Listen for scanner attach/detach
    pub fn on_connection_changed<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(DeviceId, bool) + Send + Sync + 'static,
    {
        self.dispatcher
            .subscribe_connections(move |event| listener(event.device_id, event.connected))
    }

    /// Listen for the "any scanner present" flag flipping.
    ///
    /// Called once per change, not once per connection event.
    pub fn on_scanner_presence_changed<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let registry = Arc::clone(&self.registry);
        let present = AtomicBool::new(registry.has_external_scanner());
        self.dispatcher.subscribe_connections(move |_| {
            let now = registry.has_external_scanner();
            if present.swap(now, Ordering::AcqRel) != now {
                listener(now);
            }
        })
    }

    /// Start intercepting scanner input.
    ///
    /// Listeners from an earlier call are replaced.
    pub fn start_scanning<S, C>(&self, on_scan: S, on_char: Option<C>)
    where
        S: Fn(&ScanResult) + Send + Sync + 'static,
        C: Fn(&CharEvent) + Send + Sync + 'static,
    {
        {
            let mut listeners = self.listeners.lock();
            self.drop_listeners(&mut listeners);
            listeners.scan = Some(self.dispatcher.subscribe_scans(on_scan));
            listeners.chars = on_char.map(|c| self.dispatcher.subscribe_chars(c));
        }
        self.engine.start();
    }

    /// Stop intercepting, discard any partial scan and drop the listeners
    pub fn stop_scanning(&self) {
        self.engine.stop();
        let mut listeners = self.listeners.lock();
        self.drop_listeners(&mut listeners);
    }

    fn drop_listeners(&self, listeners: &mut ScanListeners) {
        for id in [listeners.scan.take(), listeners.chars.take()]
            .into_iter()
            .flatten()
        {
            self.dispatcher.unsubscribe(id);
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.engine.is_intercepting()
    }

    pub fn set_scan_timeout(&self, timeout_ms: i64) {
        self.engine.set_scan_timeout(timeout_ms);
    }

    pub fn set_min_scan_length(&self, length: i64) {
        self.engine.set_min_scan_length(length);
    }

    pub fn set_terminator_keys(&self, keys: &[u32]) {
        self.engine.set_terminator_keys(keys);
    }

    /// Feed a key event; true means the host should swallow it
    pub fn on_key_event(&self, event: &KeyEvent) -> bool {
        self.engine.on_key_event(event)
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        self.engine.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ManualTimer;
    use std::sync::atomic::AtomicUsize;

    fn scanner(id: DeviceId) -> DeviceDescriptor {
        DeviceDescriptor::new(id, "Honeywell Scanner").with_keyboard()
    }

    fn no_chars() -> Option<fn(&CharEvent)> {
        None
    }

    #[test]
    fn test_start_replaces_listeners() {
        let session = ScannerSession::with_timer(ManualTimer::new());
        session.start_scanning(|_| {}, Some(|_: &CharEvent| {}));
        session.start_scanning(|_| {}, no_chars());

        assert_eq!(session.dispatcher().scan_listener_count(), 1);
        assert_eq!(session.dispatcher().char_listener_count(), 0);
        assert!(session.is_scanning());

        session.stop_scanning();
        assert_eq!(session.dispatcher().scan_listener_count(), 0);
        assert!(!session.is_scanning());
    }

    #[test]
    fn test_presence_reported_on_change_only() {
        let session = ScannerSession::with_timer(ManualTimer::new());
        let flips = Arc::new(Mutex::new(Vec::new()));
        let f = Arc::clone(&flips);
        session.on_scanner_presence_changed(move |present| f.lock().push(present));

        session.sync_devices(&[scanner(1), scanner(2)]);
        session.device_removed(1);
        session.device_removed(2);

        assert_eq!(*flips.lock(), vec![true, false]);
    }

    #[test]
    fn test_connection_listener() {
        let session = ScannerSession::with_timer(ManualTimer::new());
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        session.on_connection_changed(move |id, connected| {
            assert_eq!(id, 7);
            assert!(connected);
            c.fetch_add(1, Ordering::SeqCst);
        });

        session.device_added(scanner(7));
        session.device_added(scanner(7));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(session.connected_devices().len(), 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::from_toml(
            "[engine]\nmin_scan_length = 5\n[classifier]\nallow = [\"wand\"]\n",
        )
        .unwrap();
        let session = ScannerSession::from_settings_with_timer(&settings, ManualTimer::new())
            .unwrap();

        assert_eq!(session.engine().config().min_scan_length(), 5);
        session.sync_devices(&[DeviceDescriptor::new(1, "Wand 3000").with_keyboard()]);
        assert!(session.has_external_scanner());
    }
}
