// Hidscan Idle Timer
// Single-slot timer drivers used to detect the end of a scan

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Work run when an armed timer expires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors arming a timer
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("Failed to start timer thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Timer is shut down")]
    ShutDown,
}

/// A one-slot timer: arming replaces whatever was pending.
pub trait IdleTimer: Send + Sync {
    /// Run `callback` once `delay` has elapsed, replacing any pending callback
    fn arm(&self, delay: Duration, callback: TimerCallback) -> Result<(), TimerError>;

    /// Drop the pending callback, if any
    fn cancel(&self);

    /// Current time (ms) if this timer runs on the key event clock
    fn clock_ms(&self) -> Option<u64> {
        None
    }
}

struct Slot {
    pending: Option<(Instant, TimerCallback)>,
    shutdown: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    wakeup: Condvar,
}

/// Timer backed by one lazily spawned worker thread.
///
/// The worker sleeps on a condition variable until the pending deadline and
/// runs the callback without holding the slot lock.
pub struct ThreadTimer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self::with_name("hidscan-idle-timer")
    }

    /// Name the worker thread
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    pending: None,
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
            name: name.into(),
        }
    }

    fn ensure_worker(&self) -> Result<(), TimerError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_worker(&shared))?;
        *worker = Some(handle);
        Ok(())
    }
}

fn run_worker(shared: &Shared) {
    let mut slot = shared.slot.lock();
    loop {
        if slot.shutdown {
            return;
        }

        let deadline = match slot.pending.as_ref() {
            Some((deadline, _)) => *deadline,
            None => {
                shared.wakeup.wait(&mut slot);
                continue;
            }
        };

        if Instant::now() >= deadline {
            if let Some((_, callback)) = slot.pending.take() {
                drop(slot);
                callback();
                slot = shared.slot.lock();
            }
        } else {
            // Re-armed or cancelled slots are picked up on wakeup
            shared.wakeup.wait_until(&mut slot, deadline);
        }
    }
}

impl IdleTimer for ThreadTimer {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> Result<(), TimerError> {
        {
            let mut slot = self.shared.slot.lock();
            if slot.shutdown {
                return Err(TimerError::ShutDown);
            }
            slot.pending = Some((Instant::now() + delay, callback));
        }
        self.ensure_worker()?;
        self.shared.wakeup.notify_one();
        Ok(())
    }

    fn cancel(&self) {
        self.shared.slot.lock().pending = None;
        self.shared.wakeup.notify_one();
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        {
            let mut slot = self.shared.slot.lock();
            slot.shutdown = true;
            slot.pending = None;
        }
        self.shared.wakeup.notify_one();

        if let Some(handle) = self.worker.lock().take() {
            // A callback dropping the last engine handle ends up here on
            // the worker itself; joining would deadlock.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Timer driven by a virtual millisecond clock.
///
/// For hosts that run their own loop (poll, then `advance_to(now)`) and
/// for deterministic tests.
pub struct ManualTimer {
    now_ms: Mutex<u64>,
    pending: Mutex<Option<(u64, TimerCallback)>>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now_ms: Mutex::new(now_ms),
            pending: Mutex::new(None),
        }
    }

    pub fn now_ms(&self) -> u64 {
        *self.now_ms.lock()
    }

    /// Deadline of the pending callback
    pub fn deadline(&self) -> Option<u64> {
        self.pending.lock().as_ref().map(|(deadline, _)| *deadline)
    }

    /// Move the clock forward and fire the pending callback if it is due.
    ///
    /// The clock never goes backwards. Returns true if a callback ran.
    pub fn advance_to(&self, now_ms: u64) -> bool {
        let now = {
            let mut clock = self.now_ms.lock();
            *clock = (*clock).max(now_ms);
            *clock
        };

        let due = {
            let mut pending = self.pending.lock();
            match pending.as_ref() {
                Some((deadline, _)) if *deadline <= now => pending.take(),
                _ => None,
            }
        };

        match due {
            Some((_, callback)) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Advance by `delta_ms`
    pub fn advance(&self, delta_ms: u64) -> bool {
        let target = self.now_ms().saturating_add(delta_ms);
        self.advance_to(target)
    }
}

impl IdleTimer for ManualTimer {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> Result<(), TimerError> {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let deadline = self.now_ms().saturating_add(delay_ms);
        *self.pending.lock() = Some((deadline, callback));
        Ok(())
    }

    fn cancel(&self) {
        self.pending.lock().take();
    }

    fn clock_ms(&self) -> Option<u64> {
        Some(self.now_ms())
    }
}

/// Shared timers can be handed to an engine while the host keeps a handle
impl<T: IdleTimer + ?Sized> IdleTimer for Arc<T> {
    fn arm(&self, delay: Duration, callback: TimerCallback) -> Result<(), TimerError> {
        (**self).arm(delay, callback)
    }

    fn cancel(&self) {
        (**self).cancel()
    }

    fn clock_ms(&self) -> Option<u64> {
        (**self).clock_ms()
    }
}
