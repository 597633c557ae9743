//! Capture loop driving a display manager and screen grabber pair.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dcap_core::bitmap::Bitmap;
use dcap_core::{CaptureError, CaptureResult, DisplayManager, ScreenGrabber, Shutdown};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::DesktopConfig;

/// Request to re-enumerate displays before the next capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadDisplays;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub unchanged: u64,
    pub failures: u64,
    pub reloads: u64,
}

pub struct CaptureSession {
    displays: Arc<dyn DisplayManager>,
    grabber: Arc<dyn ScreenGrabber>,
    capture_cursor: bool,
    capture_all: bool,
    frame_period: Duration,
    snapshot_path: Option<PathBuf>,
    force_key_frame: bool,
    stats: SessionStats,
}

impl CaptureSession {
    pub fn new(displays: Arc<dyn DisplayManager>, grabber: Arc<dyn ScreenGrabber>, config: &DesktopConfig) -> Self {
        Self {
            displays,
            grabber,
            capture_cursor: config.capture_cursor,
            capture_all: config.capture_all_displays,
            frame_period: Duration::from_millis(1000 / u64::from(config.capture_fps.max(1))),
            snapshot_path: config.snapshot_path.clone(),
            force_key_frame: true,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub async fn capture_once(&mut self) -> CaptureResult {
        if self.capture_all {
            return self.grabber.capture_all_displays(self.capture_cursor).await;
        }
        let primary = match self.displays.primary_display().await {
            Ok(Some(primary)) => primary,
            Ok(None) => return CaptureResult::fail(CaptureError::DisplayNotFound("primary".to_string())),
            Err(err) => return CaptureResult::fail(err),
        };
        let force = std::mem::take(&mut self.force_key_frame);
        self.grabber
            .capture_display(&primary, self.capture_cursor, force)
            .await
    }

    async fn write_snapshot(&mut self, bitmap: &Bitmap) {
        let Some(path) = self.snapshot_path.take() else {
            return;
        };
        let png = match bitmap.encode_png() {
            Ok(png) => png,
            Err(err) => {
                warn!(error = %err, "snapshot encoding failed");
                return;
            }
        };
        match tokio::fs::write(&path, &png).await {
            Ok(()) => info!(path = %path.display(), width = bitmap.width(), height = bitmap.height(), "snapshot written"),
            Err(err) => warn!(path = %path.display(), error = %err, "snapshot write failed"),
        }
    }

    /// Account for one capture. Returns the error when the session cannot
    /// continue.
    async fn handle(&mut self, result: CaptureResult, shutdown: &Shutdown) -> Result<(), CaptureError> {
        match result {
            CaptureResult::Ok { bitmap, mode } => {
                self.stats.frames += 1;
                debug!(width = bitmap.width(), height = bitmap.height(), ?mode, "frame captured");
                self.write_snapshot(&bitmap).await;
            }
            CaptureResult::NoChanges { .. } => self.stats.unchanged += 1,
            CaptureResult::Fail(err) => {
                self.stats.failures += 1;
                match err {
                    CaptureError::NotInitialized => {
                        info!("grabber not initialized; initializing");
                        self.grabber.initialize(shutdown).await?;
                        self.force_key_frame = true;
                    }
                    err if err.is_fatal() => return Err(err),
                    err if err.is_retryable() => debug!(error = %err, "capture skipped"),
                    err => warn!(error = %err, "capture failed"),
                }
            }
        }
        Ok(())
    }

    async fn reload(&mut self) {
        self.stats.reloads += 1;
        match self.displays.reload_displays().await {
            Ok(()) => {
                let count = self.displays.displays().await.map(|d| d.len()).unwrap_or(0);
                info!(count, "displays reloaded");
            }
            Err(err) => warn!(error = %err, "display reload failed"),
        }
        self.force_key_frame = true;
    }

    /// Capture at the configured rate until shutdown or a fatal error.
    pub async fn run(
        &mut self,
        shutdown: Shutdown,
        mut reloads: mpsc::Receiver<ReloadDisplays>,
    ) -> Result<SessionStats, CaptureError> {
        match self.grabber.initialize(&shutdown).await {
            Ok(()) => {}
            Err(CaptureError::Cancelled) => return Ok(self.stats),
            Err(err) => {
                error!(error = %err, "screen grabber failed to initialize");
                return Err(err);
            }
        }
        info!(
            period_ms = self.frame_period.as_millis() as u64,
            all_displays = self.capture_all,
            "capture session started"
        );

        let mut interval = tokio::time::interval(self.frame_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                Some(ReloadDisplays) = reloads.recv() => self.reload().await,
                _ = interval.tick() => {
                    let result = self.capture_once().await;
                    if let Err(err) = self.handle(result, &shutdown).await {
                        if err == CaptureError::Cancelled {
                            break;
                        }
                        error!(error = %err, "capture session stopped");
                        return Err(err);
                    }
                }
            }
        }

        info!(
            frames = self.stats.frames,
            unchanged = self.stats.unchanged,
            failures = self.stats.failures,
            "capture session finished"
        );
        Ok(self.stats)
    }
}
