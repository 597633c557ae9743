//! Per-OS selection of display manager, grabber and cursor source.

use std::sync::Arc;

use dcap_core::cursor::{CursorChanged, CursorSource, CursorWatcher};
use dcap_core::{DisplayManager, ScreenGrabber, Shutdown};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::DesktopConfig;
use crate::session::ReloadDisplays;

pub struct CaptureBackend {
    pub displays: Arc<dyn DisplayManager>,
    pub grabber: Arc<dyn ScreenGrabber>,
}

/// Everything the session binary runs. `capture` is `None` where this
/// session type has no capture backend; cursor tracking may still run.
pub struct Backend {
    pub capture: Option<CaptureBackend>,
    pub reloads: mpsc::Receiver<ReloadDisplays>,
    pub cursor_events: Option<mpsc::Receiver<CursorChanged>>,
    pub tasks: Vec<JoinHandle<()>>,
}

fn spawn_cursor_watcher<S>(
    source: S,
    config: &DesktopConfig,
    shutdown: &Shutdown,
    tasks: &mut Vec<JoinHandle<()>>,
) -> mpsc::Receiver<CursorChanged>
where
    S: CursorSource + 'static,
    S::Key: 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let mut watcher = CursorWatcher::new(source, config.timeouts.cursor_poll(), tx);
    let shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move { watcher.run(shutdown).await }));
    rx
}

#[cfg(target_os = "linux")]
pub fn start(config: &DesktopConfig, shutdown: &Shutdown) -> anyhow::Result<Backend> {
    use dcap_platform_linux::desktop_env::DesktopEnvironmentInfo;
    use dcap_platform_linux::X11CursorSource;
    use tracing::warn;

    let env = DesktopEnvironmentInfo::detect();
    info!(desktop = ?env.de, session = ?env.session_type, "desktop session detected");

    let mut tasks = Vec::new();
    let (reload_tx, reloads) = mpsc::channel(4);

    let cursor_events = if env.can_track_cursor() {
        Some(spawn_cursor_watcher(X11CursorSource::new(None), config, shutdown, &mut tasks))
    } else {
        warn!("no X display reachable; cursor shape tracking disabled");
        None
    };

    let capture = if env.requires_portal() {
        wayland::start(config, shutdown, reload_tx, &mut tasks)
    } else {
        warn!("screen capture is only available in Wayland sessions");
        None
    };

    Ok(Backend {
        capture,
        reloads,
        cursor_events,
        tasks,
    })
}

#[cfg(all(target_os = "linux", feature = "pipewire"))]
mod wayland {
    use super::*;
    use dcap_core::buffers::BufferPool;
    use dcap_platform_linux::pipewire::GstStreamFactory;
    use dcap_platform_linux::xdg_portal::XdgScreenCastPortal;
    use dcap_platform_linux::{
        WaylandDisplayManager, WaylandDisplaySettingsWatcher, WaylandScreenGrabber,
    };

    pub fn start(
        config: &DesktopConfig,
        shutdown: &Shutdown,
        reload_tx: mpsc::Sender<ReloadDisplays>,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> Option<CaptureBackend> {
        let manager = Arc::new(WaylandDisplayManager::new(
            Arc::new(XdgScreenCastPortal::new()),
            Arc::new(GstStreamFactory::new(BufferPool::default())),
            config.timeouts.clone(),
        ));
        let grabber = Arc::new(WaylandScreenGrabber::new(
            Arc::clone(&manager),
            config.timeouts.clone(),
        ));

        let (settings_tx, mut settings_rx) = mpsc::channel(4);
        let mut watcher = WaylandDisplaySettingsWatcher::new(
            Arc::clone(&manager),
            config.timeouts.settings_poll(),
            settings_tx,
        );
        let watcher_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move { watcher.run(watcher_shutdown).await }));
        tasks.push(tokio::spawn(async move {
            while settings_rx.recv().await.is_some() {
                if reload_tx.send(ReloadDisplays).await.is_err() {
                    break;
                }
            }
        }));

        info!("Wayland PipeWire capture selected");
        Some(CaptureBackend {
            displays: manager,
            grabber,
        })
    }
}

#[cfg(all(target_os = "linux", not(feature = "pipewire")))]
mod wayland {
    use super::*;

    pub fn start(
        _config: &DesktopConfig,
        _shutdown: &Shutdown,
        _reload_tx: mpsc::Sender<ReloadDisplays>,
        _tasks: &mut Vec<JoinHandle<()>>,
    ) -> Option<CaptureBackend> {
        tracing::warn!("built without the `pipewire` feature; Wayland capture unavailable");
        None
    }
}

#[cfg(target_os = "macos")]
pub fn start(config: &DesktopConfig, shutdown: &Shutdown) -> anyhow::Result<Backend> {
    use dcap_platform_mac::{MacCursorSource, MacDisplayManager, MacScreenGrabber};

    let mut tasks = Vec::new();
    let (_reload_tx, reloads) = mpsc::channel(1);

    let manager = Arc::new(MacDisplayManager::new(&config.timeouts));
    let grabber = Arc::new(MacScreenGrabber::new(Arc::clone(&manager)));
    let cursor_events = spawn_cursor_watcher(
        MacCursorSource::new(Arc::clone(&manager)),
        config,
        shutdown,
        &mut tasks,
    );
    info!("CoreGraphics capture selected");

    Ok(Backend {
        capture: Some(CaptureBackend {
            displays: manager,
            grabber,
        }),
        reloads,
        cursor_events: Some(cursor_events),
        tasks,
    })
}

#[cfg(windows)]
pub fn start(config: &DesktopConfig, shutdown: &Shutdown) -> anyhow::Result<Backend> {
    use dcap_platform_win::{GdiScreenGrabber, WinCursorSource, WinDisplayManager};

    let mut tasks = Vec::new();
    let (_reload_tx, reloads) = mpsc::channel(1);

    let manager = Arc::new(WinDisplayManager::new(&config.timeouts));
    let grabber = Arc::new(GdiScreenGrabber::new(Arc::clone(&manager)));
    let cursor_events = spawn_cursor_watcher(WinCursorSource::new(), config, shutdown, &mut tasks);
    info!("GDI capture selected");

    Ok(Backend {
        capture: Some(CaptureBackend {
            displays: manager,
            grabber,
        }),
        reloads,
        cursor_events: Some(cursor_events),
        tasks,
    })
}

#[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
pub fn start(_config: &DesktopConfig, _shutdown: &Shutdown) -> anyhow::Result<Backend> {
    anyhow::bail!("screen capture is not supported on this platform")
}
