use async_trait::async_trait;
use dcap_core::config::CaptureTimeouts;
use dcap_core::display::find_display;
use dcap_core::lock::TimedMutex;
use dcap_core::{CaptureError, CoordinateSpace, DisplayInfo, DisplayManager};
use tracing::info;

use crate::{cg, monitor};

/// CoreGraphics display layout, cached until the next reload.
pub struct MacDisplayManager {
    displays: TimedMutex<Vec<DisplayInfo>>,
}

impl MacDisplayManager {
    pub fn new(timeouts: &CaptureTimeouts) -> Self {
        Self {
            displays: TimedMutex::new(Vec::new(), timeouts.display_lock(), "display lock"),
        }
    }

    async fn enumerate() -> Result<Vec<DisplayInfo>, CaptureError> {
        let displays = tokio::task::spawn_blocking(monitor::enumerate_displays)
            .await
            .map_err(|e| CaptureError::native(format!("display enumeration task: {e}")))?;
        info!(count = displays.len(), "macOS displays loaded");
        Ok(displays)
    }

    /// Backing scale of the display under the pointer, 1.0 when unknown.
    pub async fn scale_under_pointer(&self) -> f64 {
        let id = tokio::task::spawn_blocking(|| cg::cursor_location().and_then(cg::display_at_point))
            .await
            .ok()
            .flatten();
        let Some(id) = id else {
            return 1.0;
        };
        match self.displays().await {
            Ok(displays) => scale_for_device(&displays, &id.to_string()),
            Err(_) => 1.0,
        }
    }
}

pub fn scale_for_device(displays: &[DisplayInfo], device_name: &str) -> f64 {
    find_display(displays, device_name)
        .map(|d| d.scale_factor)
        .unwrap_or(1.0)
}

#[async_trait]
impl DisplayManager for MacDisplayManager {
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

    /// Input is posted in global display points.
    fn input_coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Logical
    }
}
