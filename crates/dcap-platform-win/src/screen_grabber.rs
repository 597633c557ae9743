use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dcap_core::bitmap::Bitmap;
use dcap_core::composite::Compositor;
use dcap_core::display::virtual_screen_bounds;
use dcap_core::{
    CaptureError, CaptureMode, CaptureResult, DisplayInfo, DisplayManager, Rect, ScreenGrabber,
    Shutdown,
};
use tracing::{debug, warn};

use crate::capture_gdi::GdiCapturer;
use crate::display_manager::WinDisplayManager;

const MODE: CaptureMode = CaptureMode::Gdi;

type CapturerSlot = Arc<Mutex<Option<GdiCapturer>>>;

fn capture_area(slot: &CapturerSlot, area: Rect, capture_cursor: bool) -> Result<Bitmap, CaptureError> {
    let mut guard = slot
        .lock()
        .map_err(|_| CaptureError::native("GDI capturer lock poisoned"))?;
    if guard.is_none() {
        *guard = Some(GdiCapturer::new()?);
    }
    match guard.as_mut() {
        Some(capturer) => Ok(capturer.capture(area, capture_cursor)?),
        None => Err(CaptureError::NotInitialized),
    }
}

fn capture_composite(slot: &CapturerSlot, bounds: Rect, displays: &[DisplayInfo], capture_cursor: bool) -> CaptureResult {
    let mut compositor = match Compositor::new(bounds) {
        Ok(compositor) => compositor,
        Err(err) => return CaptureResult::fail(err),
    };
    for display in displays {
        match capture_area(slot, display.monitor_area, capture_cursor) {
            Ok(bitmap) => compositor.place(display, &bitmap),
            Err(err) => warn!(device_name = %display.device_name, error = %err, "skipping display"),
        }
    }
    CaptureResult::ok(compositor.finish(), MODE)
}

/// BitBlt capture from the screen DC.
///
/// The DCs are created on `initialize` or on first capture and reused; the
/// memory bitmap follows the size of the requested area.
pub struct GdiScreenGrabber {
    displays: Arc<WinDisplayManager>,
    capturer: CapturerSlot,
}

impl GdiScreenGrabber {
    pub fn new(displays: Arc<WinDisplayManager>) -> Self {
        Self {
            displays,
            capturer: Arc::new(Mutex::new(None)),
        }
    }

    async fn run<F>(&self, job: F) -> CaptureResult
    where
        F: FnOnce(&CapturerSlot) -> CaptureResult + Send + 'static,
    {
        let slot = Arc::clone(&self.capturer);
        tokio::task::spawn_blocking(move || job(&slot))
            .await
            .unwrap_or_else(|e| CaptureResult::fail(CaptureError::native(format!("capture task: {e}"))))
    }
}

#[async_trait]
impl ScreenGrabber for GdiScreenGrabber {
    async fn initialize(&self, _shutdown: &Shutdown) -> Result<(), CaptureError> {
        let slot = Arc::clone(&self.capturer);
        tokio::task::spawn_blocking(move || -> Result<(), CaptureError> {
            let mut guard = slot
                .lock()
                .map_err(|_| CaptureError::native("GDI capturer lock poisoned"))?;
            if guard.is_none() {
                *guard = Some(GdiCapturer::new()?);
                debug!("GDI capturer created");
            }
            Ok(())
        })
        .await
        .map_err(|e| CaptureError::native(format!("initialize task: {e}")))?
    }

    async fn capture_display(
        &self,
        target: &DisplayInfo,
        capture_cursor: bool,
        _force_key_frame: bool,
    ) -> CaptureResult {
        let area = target.monitor_area;
        let device_name = target.device_name.clone();
        self.run(move |slot| match capture_area(slot, area, capture_cursor) {
            Ok(bitmap) => CaptureResult::ok(bitmap, MODE),
            Err(err) => {
                warn!(%device_name, error = %err, "display capture failed");
                CaptureResult::fail(err)
            }
        })
        .await
    }

    async fn capture_all_displays(&self, capture_cursor: bool) -> CaptureResult {
        let displays = match self.displays.displays().await {
            Ok(displays) => displays,
            Err(err) => return CaptureResult::fail(err),
        };
        let bounds = virtual_screen_bounds(&displays).unwrap_or_default();
        if displays.is_empty() || bounds.is_empty() {
            return CaptureResult::fail(CaptureError::native("No displays found."));
        }
        self.run(move |slot| {
            if displays.len() == 1 {
                match capture_area(slot, displays[0].monitor_area, capture_cursor) {
                    Ok(bitmap) => CaptureResult::ok(bitmap, MODE),
                    Err(err) => CaptureResult::fail(err),
                }
            } else {
                capture_composite(slot, bounds, &displays, capture_cursor)
            }
        })
        .await
    }

    async fn dispose(&self) {
        if let Ok(mut guard) = self.capturer.lock() {
            if guard.take().is_some() {
                debug!("GDI capturer released");
            }
        }
    }
}
