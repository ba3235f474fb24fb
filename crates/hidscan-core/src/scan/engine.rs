// Hidscan Scan Assembly Engine
// Segments scanner keystrokes into scans by idle gap or terminator key
//
// All buffer and timer state lives behind one mutex. Each armed timer
// carries a generation number; an expiry whose generation is stale, or
// that runs after stop(), does nothing. Paths that emit take a reentrant
// delivery lock before the state lock and hold it until listeners return,
// which keeps char/scan ordering across the key thread and the timer thread.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, ReentrantMutex};
use smallvec::SmallVec;

use super::buffer::ScanBuffer;
use super::config::ScanConfig;
use super::timer::{IdleTimer, ThreadTimer, TimerError};
use crate::event::{CharEvent, EventDispatcher, ScanResult};
use crate::input::{KeyAction, KeyEvent};
use crate::state::DeviceRegistry;

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum EngineState {
    /// Not intercepting
    Idle,
    /// Intercepting, nothing buffered
    InterceptingEmpty,
    /// Intercepting, characters buffered and idle timer running
    InterceptingBuffering,
}

#[derive(Debug)]
enum Output {
    Char(CharEvent),
    Scan(ScanResult),
}

type Outputs = SmallVec<[Output; 2]>;

#[derive(Debug, Default)]
struct Core {
    intercepting: bool,
    buffer: ScanBuffer,
    timer_generation: u64,
}

struct Inner {
    config: Arc<ScanConfig>,
    core: Mutex<Core>,
    delivery: ReentrantMutex<()>,
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<EventDispatcher>,
    timer: Box<dyn IdleTimer>,
}

/// Scan assembly engine.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct ScanEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ScanEngine {
    /// Engine with default configuration and a background timer thread
    pub fn new(registry: Arc<DeviceRegistry>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self::with_timer(registry, dispatcher, ThreadTimer::new())
    }

    /// Engine driven by the given timer
    pub fn with_timer<T>(
        registry: Arc<DeviceRegistry>,
        dispatcher: Arc<EventDispatcher>,
        timer: T,
    ) -> Self
    where
        T: IdleTimer + 'static,
    {
        Self::with_parts(registry, dispatcher, Arc::new(ScanConfig::default()), Box::new(timer))
    }

    pub fn with_parts(
        registry: Arc<DeviceRegistry>,
        dispatcher: Arc<EventDispatcher>,
        config: Arc<ScanConfig>,
        timer: Box<dyn IdleTimer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                core: Mutex::new(Core::default()),
                delivery: ReentrantMutex::new(()),
                registry,
                dispatcher,
                timer,
            }),
        }
    }

    pub fn config(&self) -> &Arc<ScanConfig> {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// Begin intercepting; no-op if already intercepting
    pub fn start(&self) {
        let mut core = self.inner.core.lock();
        if core.intercepting {
            return;
        }
        core.intercepting = true;
        core.buffer.clear();
        log::debug!("scan engine started");
    }

    /// Stop intercepting, discarding any partial scan.
    ///
    /// Waits for in-flight deliveries, so no scan reaches listeners after
    /// this returns.
    pub fn stop(&self) {
        let _delivery = self.inner.delivery.lock();
        let mut core = self.inner.core.lock();
        if !core.intercepting {
            return;
        }
        core.intercepting = false;
        if !core.buffer.is_empty() {
            log::debug!("stop discarded {} buffered character(s)", core.buffer.len());
        }
        core.buffer.clear();
        self.inner.cancel_timer(&mut core);
        log::debug!("scan engine stopped");
    }

    pub fn is_intercepting(&self) -> bool {
        self.inner.core.lock().intercepting
    }

    pub fn state(&self) -> EngineState {
        let core = self.inner.core.lock();
        match (core.intercepting, core.buffer.is_empty()) {
            (false, _) => EngineState::Idle,
            (true, true) => EngineState::InterceptingEmpty,
            (true, false) => EngineState::InterceptingBuffering,
        }
    }

    /// Characters currently buffered
    pub fn buffered_len(&self) -> usize {
        self.inner.core.lock().buffer.len()
    }

    pub fn set_scan_timeout(&self, timeout_ms: i64) {
        self.inner.config.set_scan_timeout(timeout_ms);
    }

    pub fn set_min_scan_length(&self, length: i64) {
        self.inner.config.set_min_scan_length(length);
    }

    pub fn set_terminator_keys(&self, keys: &[u32]) {
        self.inner.config.set_terminator_keys(keys);
    }

    /// Feed one key event.
    ///
    /// Returns true when the event belongs to a scanner and the engine is
    /// intercepting, i.e. the host should not forward it elsewhere.
    pub fn on_key_event(&self, event: &KeyEvent) -> bool {
        self.inner.on_key_event(event)
    }
}

impl Inner {
    fn on_key_event(self: &Arc<Self>, event: &KeyEvent) -> bool {
        if !self.registry.is_scanner(event.device_id) {
            log::trace!("ignoring key {} from non-scanner device {}", event.key_code, event.device_id);
            return false;
        }

        let _delivery = self.delivery.lock();
        let mut core = self.core.lock();
        if !core.intercepting {
            return false;
        }
        if event.action != KeyAction::Down {
            return true;
        }

        let mut outputs = Outputs::new();

        // Enter-style keys carry no printable character; a letter whose code
        // collides with a terminator is still scan text
        if event.printable().is_none() && self.config.is_terminator(event.key_code) {
            self.cancel_timer(&mut core);
            if let Some(result) = core.buffer.flush() {
                outputs.push(Output::Scan(result));
            }
            self.deliver(core, outputs);
            return true;
        }

        let Some(character) = event.printable() else {
            outputs.push(Output::Char(CharEvent {
                character: None,
                key_code: event.key_code,
            }));
            self.deliver(core, outputs);
            return true;
        };

        // The idle gap already ran out: this character opens a new scan
        if core.buffer.is_expired_at(event.timestamp_ms) {
            if let Some(result) = core.buffer.flush() {
                outputs.push(Output::Scan(result));
            }
        }

        let snapshot = self.config.snapshot();
        core.buffer.push(character, event.timestamp_ms, snapshot);
        outputs.push(Output::Char(CharEvent {
            character: Some(character),
            key_code: event.key_code,
        }));

        let delay = self.idle_delay(event.timestamp_ms, snapshot.scan_timeout());
        if let Err(e) = self.arm_timer(&mut core, delay) {
            log::error!("idle timer unavailable, dropping scan and going idle: {}", e);
            core.intercepting = false;
            core.buffer.clear();
            self.cancel_timer(&mut core);
        }

        self.deliver(core, outputs);
        true
    }

    /// Delay until `timestamp_ms + timeout`.
    ///
    /// Only timers on the event clock can place the deadline relative to the
    /// character's timestamp; others measure from now.
    fn idle_delay(&self, timestamp_ms: u64, timeout: Duration) -> Duration {
        match self.timer.clock_ms() {
            Some(now) => {
                let deadline = timestamp_ms.saturating_add(timeout.as_millis() as u64);
                Duration::from_millis(deadline.saturating_sub(now))
            }
            None => timeout,
        }
    }

    fn arm_timer(self: &Arc<Self>, core: &mut Core, delay: Duration) -> Result<(), TimerError> {
        core.timer_generation = core.timer_generation.wrapping_add(1);
        let generation = core.timer_generation;
        let weak: Weak<Inner> = Arc::downgrade(self);

        self.timer.arm(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timer_expired(generation);
                }
            }),
        )
    }

    fn cancel_timer(&self, core: &mut Core) {
        core.timer_generation = core.timer_generation.wrapping_add(1);
        self.timer.cancel();
    }

    fn on_timer_expired(&self, generation: u64) {
        let _delivery = self.delivery.lock();
        let mut core = self.core.lock();
        if !core.intercepting || core.timer_generation != generation {
            log::trace!("stale idle timer {} ignored", generation);
            return;
        }

        let mut outputs = Outputs::new();
        if let Some(result) = core.buffer.flush() {
            outputs.push(Output::Scan(result));
        }
        self.deliver(core, outputs);
    }

    /// Hand outputs to listeners after releasing the state lock.
    ///
    /// Callers hold the delivery lock.
    fn deliver(&self, core: MutexGuard<'_, Core>, outputs: Outputs) {
        drop(core);

        for output in &outputs {
            match output {
                Output::Char(event) => self.dispatcher.emit_char(event),
                Output::Scan(result) => {
                    log::debug!("scan complete: {:?} at {}", result.code, result.timestamp);
                    self.dispatcher.emit_scan(result);
                }
            }
        }
    }
}
