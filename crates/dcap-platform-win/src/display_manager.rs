#![allow(unsafe_code)] // Windows API calls require unsafe.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use dcap_core::config::CaptureTimeouts;
use dcap_core::display::virtual_screen_bounds;
use dcap_core::lock::TimedMutex;
use dcap_core::{CaptureError, CoordinateSpace, DisplayInfo, DisplayManager};
use tracing::{debug, info};
use windows::Win32::UI::HiDpi::{SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2};

use crate::monitor;
use crate::privacy::PrivacyScreen;

static DPI_AWARENESS: Once = Once::new();

/// Opt the process into per-monitor DPI so GDI reports physical pixels.
pub fn ensure_dpi_awareness() {
    DPI_AWARENESS.call_once(|| {
        if let Err(err) = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) } {
            // Already set by the manifest or an earlier call.
            debug!(error = %err, "SetProcessDpiAwarenessContext");
        }
    });
}

/// `EnumDisplayMonitors` layout, cached until the next reload.
pub struct WinDisplayManager {
    displays: TimedMutex<Vec<DisplayInfo>>,
    privacy: Arc<PrivacyScreen>,
}

impl WinDisplayManager {
    pub fn new(timeouts: &CaptureTimeouts) -> Self {
        ensure_dpi_awareness();
        Self {
            displays: TimedMutex::new(Vec::new(), timeouts.display_lock(), "display lock"),
            privacy: Arc::new(PrivacyScreen::new()),
        }
    }

    async fn enumerate() -> Result<Vec<DisplayInfo>, CaptureError> {
        let displays = tokio::task::spawn_blocking(monitor::enumerate_displays)
            .await
            .map_err(|e| CaptureError::native(format!("display enumeration task: {e}")))?
            .map_err(|e| CaptureError::native(e.to_string()))?;
        info!(count = displays.len(), "Windows displays loaded");
        Ok(displays)
    }
}

#[async_trait]
impl DisplayManager for WinDisplayManager {
    async fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        let mut displays = self.displays.lock().await?;
        if displays.is_empty() {
            *displays = Self::enumerate().await?;
        }
        Ok(displays.clone())
    }

    async fn reload_displays(&self) -> Result<(), CaptureError> {
        let mut displays = self.displays.lock().await?;
        *displays = Self::enumerate().await?;
        Ok(())
    }

    /// SendInput absolute coordinates are virtual-desktop pixels.
    fn input_coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Physical
    }

    async fn set_privacy_screen(&self, enabled: bool) -> Result<(), CaptureError> {
        let privacy = Arc::clone(&self.privacy);
        if enabled {
            let displays = self.displays().await?;
            let bounds = virtual_screen_bounds(&displays)
                .ok_or_else(|| CaptureError::native("No displays found."))?;
            tokio::task::spawn_blocking(move || privacy.show(bounds))
                .await
                .map_err(|e| CaptureError::native(format!("privacy screen task: {e}")))??;
        } else {
            tokio::task::spawn_blocking(move || privacy.hide())
                .await
                .map_err(|e| CaptureError::native(format!("privacy screen task: {e}")))??;
        }
        Ok(())
    }
}
