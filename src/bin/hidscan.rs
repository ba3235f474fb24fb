// Hidscan CLI
// Reads barcode scans from external scanners on Linux and prints one per line

#![cfg_attr(feature = "cli", allow(dead_code))]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
use hidscan_core::event::EventLoop;
#[cfg(feature = "cli")]
use hidscan_core::input::keymap::EVDEV_TERMINATORS;
#[cfg(feature = "cli")]
use hidscan_core::scan::config::DEFAULT_TERMINATOR_KEYS;
#[cfg(feature = "cli")]
use hidscan_core::{CharEvent, Classifier, ScannerSession, Settings};

/// How often `--watch` re-enumerates input devices
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Poll timeout of the main loop
const POLL_TIMEOUT_MS: i32 = 100;

/// Barcode scanner reader for Linux input devices
#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "hidscan")]
#[command(author = "hidscan contributors")]
#[command(version = "0.3.0")]
#[command(about = "Read barcode scans from external HID scanners", long_about = None)]
struct Args {
    /// TOML settings file (default: ~/.config/hidscan/settings.toml)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// List input devices with their classification and exit
    #[arg(long)]
    list_devices: bool,

    /// Grab scanner devices exclusively
    #[arg(short, long)]
    grab: bool,

    /// Watch for hot-plugged scanners
    #[arg(short, long)]
    watch: bool,

    /// Idle gap in milliseconds that ends a scan
    #[arg(short, long, value_name = "MS", allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Minimum characters for a scan
    #[arg(short, long, value_name = "N", allow_negative_numbers = true)]
    min_length: Option<i64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Main application state
#[cfg(feature = "cli")]
struct Application {
    settings: Settings,
    args: Args,
    /// Flag to signal event loop to stop
    running: Arc<AtomicBool>,
}

/// Resolve settings: file (explicit or default location), then CLI overrides
#[cfg(feature = "cli")]
fn resolve_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load_default()?,
    };

    if let Some(timeout) = args.timeout {
        settings.set_scan_timeout(timeout);
    }
    if let Some(length) = args.min_length {
        settings.set_min_scan_length(length);
    }
    // Built-in terminators are mobile key codes; evdev reports Enter differently
    if settings.terminator_keys() == DEFAULT_TERMINATOR_KEYS {
        settings.set_terminator_keys(EVDEV_TERMINATORS.to_vec());
    }

    Ok(settings)
}

#[cfg(feature = "cli")]
impl Application {
    fn new(args: Args) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = resolve_settings(&args)?;
        Ok(Self {
            settings,
            args,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Print every input device with its verdict
    fn list_devices(&self) -> Result<(), Box<dyn std::error::Error>> {
        let classifier = Classifier::new(&self.settings.classifier_policy()?);
        let devices = EventLoop::enumerate();
        if devices.is_empty() {
            return Err("No input devices readable (check permissions on /dev/input)".into());
        }

        println!("Found {} input device(s):", devices.len());
        for device in &devices {
            let d = &device.descriptor;
            let classification = classifier.explain(d);
            println!(
                "  event{}: {} [{:04x}:{:04x}] {} ({}, rule: {})",
                d.id,
                d.name,
                d.vendor_id,
                d.product_id,
                device.path.display(),
                classification.verdict,
                classification.rule
            );
        }
        Ok(())
    }

    fn install_signal_handler(&self) {
        use signal_hook::iterator::Signals;
        let running = self.running.clone();

        std::thread::spawn(move || {
            if let Ok(mut signals) =
                Signals::new([signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM])
            {
                if signals.forever().next().is_some() {
                    log::info!("received signal, shutting down");
                    running.store(false, Ordering::SeqCst);
                }
            }
        });
    }

    /// Re-enumerate and (re)open the scanner devices when the set changed
    fn sync(
        &self,
        session: &ScannerSession,
        event_loop: &mut Option<EventLoop>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let descriptors = EventLoop::descriptors();
        session.log_devices(&descriptors);
        let diff = session.sync_devices(&descriptors);

        if !diff.is_empty() || event_loop.is_none() {
            // Release grabs before reopening
            *event_loop = None;
            let ids: Vec<_> = session.connected_devices().iter().map(|d| d.id).collect();
            if !ids.is_empty() {
                *event_loop = Some(EventLoop::open(&ids, self.args.grab)?);
            }
        }
        Ok(())
    }

    fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let session = ScannerSession::from_settings(&self.settings)?;
        session.on_connection_changed(|id, connected| {
            if connected {
                eprintln!("scanner event{} connected", id);
            } else {
                eprintln!("scanner event{} disconnected", id);
            }
        });

        let mut event_loop: Option<EventLoop> = None;
        self.sync(&session, &mut event_loop)?;
        if event_loop.is_none() && !self.args.watch {
            return Err("No external scanner found (use --list-devices or --watch)".into());
        }

        session.start_scanning(
            |scan| println!("{}", scan.code),
            Some(|c: &CharEvent| log::trace!("char {:?} (key {})", c.character, c.key_code)),
        );
        self.install_signal_handler();

        let mut last_sync = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            if self.args.watch && last_sync.elapsed() >= WATCH_INTERVAL {
                if let Err(e) = self.sync(&session, &mut event_loop) {
                    log::warn!("device refresh failed: {}", e);
                }
                last_sync = Instant::now();
            }

            let Some(active) = event_loop.as_mut() else {
                std::thread::sleep(Duration::from_millis(POLL_TIMEOUT_MS as u64));
                continue;
            };

            for event in active.poll_key_events(POLL_TIMEOUT_MS)? {
                session.on_key_event(&event);
            }
        }

        session.stop_scanning();
        Ok(())
    }
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let app = Application::new(args)?;
    if app.args.list_devices {
        return app.list_devices();
    }
    app.run()
}

// Stub for when cli feature is not enabled
#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("Error: hidscan binary requires the 'cli' feature to be enabled.");
    eprintln!("Please build with: cargo build --release --features cli --bin hidscan");
    std::process::exit(1);
}
