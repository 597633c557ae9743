use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dcap_core::cursor::CursorChanged;
use dcap_core::Shutdown;
use dcap_desktop::config::DesktopConfig;
use dcap_desktop::session::CaptureSession;
use dcap_desktop::{backend, logging};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dcap-desktop")]
#[command(about = "Desktop capture session - screen grabbing and cursor tracking")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides the config)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Frames per second (1-60)
    #[arg(long)]
    fps: Option<u32>,

    /// Capture the whole virtual screen instead of the primary display
    #[arg(long)]
    all_displays: bool,

    /// Write the first captured frame to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Cover the local screen while capturing (Windows)
    #[arg(long)]
    privacy_screen: bool,
}

impl Args {
    fn apply(&self, config: &mut DesktopConfig) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(fps) = self.fps {
            config.capture_fps = fps;
        }
        if self.all_displays {
            config.capture_all_displays = true;
        }
        if let Some(path) = &self.snapshot {
            config.snapshot_path = Some(path.clone());
        }
    }
}

async fn log_cursor_events(mut events: mpsc::Receiver<CursorChanged>) {
    while let Some(event) = events.recv().await {
        info!(
            cursor = ?event.cursor,
            hotspot_x = event.hotspot_x,
            hotspot_y = event.hotspot_y,
            image_len = event.image_base64.as_ref().map_or(0, |s| s.len()),
            "cursor changed"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        DesktopConfig::load_from_file(config_path)?
    } else {
        DesktopConfig::load_from_env()
    };
    args.apply(&mut config);
    config.validate()?;

    // Initialize tracing
    let _log_guard = logging::init_tracing(&config.log_level, config.log_file.as_deref(), config.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting dcap-desktop");

    let (shutdown_handle, shutdown) = Shutdown::new();
    let shutdown_handle = Arc::new(shutdown_handle);
    let signal_handle = Arc::clone(&shutdown_handle);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_handle.trigger();
            }
            Err(err) => error!(error = %err, "failed to listen for Ctrl-C"),
        }
    });

    let mut backend = backend::start(&config, &shutdown)?;
    if let Some(events) = backend.cursor_events.take() {
        backend.tasks.push(tokio::spawn(log_cursor_events(events)));
    }

    let outcome = match backend.capture {
        Some(capture) => {
            if args.privacy_screen {
                if let Err(err) = capture.displays.set_privacy_screen(true).await {
                    warn!(error = %err, "privacy screen unavailable");
                }
            }

            let mut session = CaptureSession::new(
                capture.displays.clone(),
                capture.grabber.clone(),
                &config,
            );
            let outcome = session.run(shutdown.clone(), backend.reloads).await;

            if args.privacy_screen {
                let _ = capture.displays.set_privacy_screen(false).await;
            }
            capture.grabber.dispose().await;
            outcome
        }
        None => {
            warn!("no capture backend for this session; tracking cursor only");
            shutdown.triggered().await;
            Ok(Default::default())
        }
    };

    // Stop watchers as well when the session ended on its own.
    shutdown_handle.trigger();
    for task in backend.tasks {
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            warn!("background task did not stop in time");
        }
    }

    match outcome {
        Ok(stats) => {
            info!(frames = stats.frames, failures = stats.failures, "dcap-desktop stopped");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
