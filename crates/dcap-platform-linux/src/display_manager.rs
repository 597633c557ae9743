//! Display layout on Wayland, derived from ScreenCast portal streams.
//!
//! The portal only reports logical geometry. Physical pixel sizes come from
//! the capture streams themselves: whatever the grabber last saw, or a short
//! probe of the stream's negotiated caps when nothing has been seen yet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dcap_core::config::CaptureTimeouts;
use dcap_core::display::normalize_displays;
use dcap_core::lock::TimedMutex;
use dcap_core::{CaptureError, CoordinateSpace, DisplayInfo, DisplayManager, Rect, Size};
use tracing::{debug, error, info, warn};

use crate::portal::{ScreenCastPortal, ScreenCastStream};
use crate::stream::{CaptureStream, CaptureStreamFactory};

/// Logical size assumed when a stream omits its `size` property.
pub const DEFAULT_STREAM_SIZE: Size = Size::new(1920, 1080);

/// Bounds reported when the layout cannot be determined.
pub const FALLBACK_BOUNDS: Rect = Rect::new(0, 0, 1920, 1080);

#[derive(Debug, Default)]
struct LayoutState {
    displays: Vec<DisplayInfo>,
    node_ids: HashMap<String, u32>,
}

pub struct WaylandDisplayManager {
    portal: Arc<dyn ScreenCastPortal>,
    factory: Arc<dyn CaptureStreamFactory>,
    capture_sizes: DashMap<String, Size>,
    state: TimedMutex<LayoutState>,
    timeouts: CaptureTimeouts,
}

impl WaylandDisplayManager {
    pub fn new(
        portal: Arc<dyn ScreenCastPortal>,
        factory: Arc<dyn CaptureStreamFactory>,
        timeouts: CaptureTimeouts,
    ) -> Self {
        Self {
            portal,
            factory,
            capture_sizes: DashMap::new(),
            state: TimedMutex::new(LayoutState::default(), timeouts.display_lock(), "display lock"),
            timeouts,
        }
    }

    pub fn portal(&self) -> &Arc<dyn ScreenCastPortal> {
        &self.portal
    }

    /// Record the pixel size a stream actually delivered.
    ///
    /// Blank names and non-positive sizes are ignored.
    pub fn update_capture_size(&self, device_name: &str, width: i32, height: i32) {
        if device_name.trim().is_empty() || width <= 0 || height <= 0 {
            return;
        }
        let size = Size::new(width, height);
        let previous = self.capture_sizes.insert(device_name.to_string(), size);
        if previous != Some(size) {
            debug!(device_name, width, height, "capture size updated");
        }
    }

    pub fn try_get_capture_size(&self, device_name: &str) -> Option<Size> {
        self.capture_sizes.get(device_name).map(|entry| *entry.value())
    }

    pub fn has_any_capture_sizes(&self) -> bool {
        !self.capture_sizes.is_empty()
    }

    /// PipeWire node backing a display.
    pub async fn try_get_node_id(&self, device_name: &str) -> Result<Option<u32>, CaptureError> {
        let mut state = self.state.lock().await?;
        if state.displays.is_empty() {
            self.load(&mut state).await?;
        }
        Ok(state.node_ids.get(device_name).copied())
    }

    /// Start one capture stream per portal stream, keyed by device name.
    ///
    /// Streams that fail to start are logged and skipped. Any other failure
    /// yields an empty list.
    pub async fn create_pipewire_streams(&self) -> Vec<(String, Box<dyn CaptureStream>)> {
        match self.open_streams().await {
            Ok(streams) => streams,
            Err(err) => {
                debug!(error = %err, "could not create PipeWire streams");
                Vec::new()
            }
        }
    }

    async fn open_streams(&self) -> Result<Vec<(String, Box<dyn CaptureStream>)>, CaptureError> {
        let Some(fd) = self.portal.pipewire_connection().await? else {
            return Ok(Vec::new());
        };
        let mut streams = self.portal.screencast_streams().await?;
        streams.sort_by_key(|s| s.stream_index);

        let mut opened = Vec::with_capacity(streams.len());
        for stream in &streams {
            let size = stream
                .size()
                .map(|(w, h)| Size::new(w, h))
                .unwrap_or(DEFAULT_STREAM_SIZE);
            match self.factory.create(stream.node_id, &fd, size.width, size.height) {
                Ok(capture) => opened.push((stream.stream_index.to_string(), capture)),
                Err(err) => warn!(
                    stream_index = stream.stream_index,
                    node_id = stream.node_id,
                    error = %err,
                    "failed to start capture stream"
                ),
            }
        }
        Ok(opened)
    }

    /// Briefly run a stream to learn its negotiated pixel size.
    async fn probe_physical_size(&self, stream: &ScreenCastStream, logical: Size) -> Option<Size> {
        if stream.node_id == 0 {
            return None;
        }
        let fd = match self.portal.pipewire_connection().await {
            Ok(Some(fd)) => fd,
            Ok(None) => return None,
            Err(err) => {
                debug!(error = %err, "no PipeWire connection for size probe");
                return None;
            }
        };
        let capture = match self.factory.create(stream.node_id, &fd, logical.width, logical.height) {
            Ok(capture) => capture,
            Err(err) => {
                debug!(node_id = stream.node_id, error = %err, "size probe stream failed to start");
                return None;
            }
        };

        let poll = self.timeouts.size_probe_poll();
        let probed = tokio::time::timeout(self.timeouts.size_probe(), async {
            loop {
                if let Some(size) = capture.negotiated_size().filter(Size::is_positive) {
                    return size;
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await
        .ok();

        // Pipeline teardown blocks on the streaming thread.
        let _ = tokio::task::spawn_blocking(move || drop(capture));
        probed
    }

    async fn load(&self, state: &mut LayoutState) -> Result<(), CaptureError> {
        state.displays.clear();
        state.node_ids.clear();

        let mut streams = match self.portal.screencast_streams().await {
            Ok(streams) => streams,
            Err(err) => {
                error!(error = %err, "failed to load Wayland displays");
                return Err(err);
            }
        };

        if streams.is_empty() {
            warn!("portal reported no streams; using a single fallback display");
            state.displays = vec![DisplayInfo {
                is_primary: true,
                ..DisplayInfo::unscaled("0", 0, FALLBACK_BOUNDS)
            }];
            return Ok(());
        }

        streams.sort_by_key(|s| s.stream_index);
        let has_any_positions = streams.iter().any(|s| s.position().is_some());
        let primary_index = streams[0].stream_index;
        let mut next_x = 0;
        let mut displays = Vec::with_capacity(streams.len());

        for stream in &streams {
            let device_name = stream.stream_index.to_string();
            let logical = stream
                .size()
                .map(|(w, h)| Size::new(w, h))
                .unwrap_or(DEFAULT_STREAM_SIZE);
            let (lx, ly) = stream.position().unwrap_or((0, 0));

            let physical = match self.try_get_capture_size(&device_name) {
                Some(size) => size,
                None => match self.probe_physical_size(stream, logical).await {
                    Some(size) => {
                        self.update_capture_size(&device_name, size.width, size.height);
                        size
                    }
                    None => logical,
                },
            };

            let scale = if logical.width > 0 {
                physical.width as f64 / logical.width as f64
            } else {
                1.0
            };

            let (x, y) = if has_any_positions {
                ((lx as f64 * scale).round() as i32, (ly as f64 * scale).round() as i32)
            } else {
                let x = next_x;
                next_x += physical.width;
                (x, 0)
            };

            let monitor_area = Rect::new(x, y, physical.width, physical.height);
            displays.push(DisplayInfo {
                device_name: device_name.clone(),
                display_name: format!("Display {}", stream.stream_index + 1),
                index: stream.stream_index as usize,
                is_primary: stream.stream_index == primary_index,
                logical_monitor_area: Rect::new(lx, ly, logical.width, logical.height),
                monitor_area,
                scale_factor: scale,
                work_area: monitor_area,
            });

            if stream.node_id != 0 {
                state.node_ids.insert(device_name, stream.node_id);
            }
        }

        state.displays = normalize_displays(displays);
        info!(
            count = state.displays.len(),
            positioned = has_any_positions,
            "Wayland displays loaded"
        );
        Ok(())
    }
}

#[async_trait]
impl DisplayManager for WaylandDisplayManager {
    async fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        let mut state = self.state.lock().await?;
        if state.displays.is_empty() {
            self.load(&mut state).await?;
        }
        Ok(state.displays.clone())
    }

    async fn reload_displays(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().await?;
        self.load(&mut state).await
    }

    fn input_coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Logical
    }

    async fn virtual_screen_bounds(&self) -> Result<Rect, CaptureError> {
        match self.displays().await {
            Ok(displays) => Ok(dcap_core::display::virtual_screen_bounds(&displays).unwrap_or_default()),
            Err(err) => {
                error!(error = %err, "failed to compute virtual screen bounds");
                Ok(FALLBACK_BOUNDS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{PROP_POSITION, PROP_SIZE};
    use crate::testing::{FakePortal, FakeStreamFactory};
    use crate::tuple::PortalValue;
    use dcap_core::Point;

    fn manager(portal: FakePortal, factory: FakeStreamFactory) -> WaylandDisplayManager {
        WaylandDisplayManager::new(Arc::new(portal), Arc::new(factory), CaptureTimeouts::default())
    }

    fn stream(index: u32, node: u32, size: (i32, i32), position: Option<(i32, i32)>) -> ScreenCastStream {
        let s = ScreenCastStream::new(index, node).with_property(PROP_SIZE, PortalValue::TupleI32(size.0, size.1));
        match position {
            Some((x, y)) => s.with_property(PROP_POSITION, PortalValue::TupleI32(x, y)),
            None => s,
        }
    }

    #[tokio::test]
    async fn no_streams_yields_fallback_display() {
        let m = manager(FakePortal::with_streams(Vec::new()), FakeStreamFactory::default());
        let displays = m.displays().await.unwrap();
        assert_eq!(displays.len(), 1);
        let d = &displays[0];
        assert_eq!(d.device_name, "0");
        assert_eq!(d.display_name, "Display 1");
        assert_eq!(d.monitor_area, Rect::new(0, 0, 1920, 1080));
        assert!(d.is_primary);
        assert_eq!(d.scale_factor, 1.0);
    }

    #[tokio::test]
    async fn positioned_streams_scale_origins_by_probed_size() {
        let portal = FakePortal::with_streams(vec![
            stream(1, 41, (1280, 720), Some((1920, 0))),
            stream(0, 40, (1920, 1080), Some((0, 0))),
        ]);
        let factory = FakeStreamFactory::default()
            .negotiates(40, Size::new(3840, 2160))
            .negotiates(41, Size::new(2560, 1440));
        let m = manager(portal, factory);

        let displays = m.displays().await.unwrap();
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].device_name, "0");
        assert!(displays[0].is_primary);
        assert_eq!(displays[0].monitor_area, Rect::new(0, 0, 3840, 2160));
        assert_eq!(displays[0].scale_factor, 2.0);
        assert_eq!(displays[1].monitor_area, Rect::new(3840, 0, 2560, 1440));
        assert_eq!(displays[1].logical_monitor_area, Rect::new(1920, 0, 1280, 720));
        assert_eq!(displays[1].work_area, displays[1].monitor_area);
        assert_eq!(m.try_get_capture_size("1"), Some(Size::new(2560, 1440)));
        assert_eq!(m.try_get_node_id("1").await.unwrap(), Some(41));
    }

    #[tokio::test]
    async fn unpositioned_streams_are_laid_out_left_to_right() {
        let portal = FakePortal::with_streams(vec![
            stream(0, 0, (1920, 1080), None),
            stream(1, 0, (1280, 1024), None),
        ]);
        let m = manager(portal, FakeStreamFactory::default());
        m.update_capture_size("0", 1920, 1080);

        let displays = m.displays().await.unwrap();
        assert_eq!(displays[0].monitor_area, Rect::new(0, 0, 1920, 1080));
        assert_eq!(displays[1].monitor_area, Rect::new(1920, 0, 1280, 1024));
        assert_eq!(m.try_get_node_id("0").await.unwrap(), None);
        assert_eq!(
            m.virtual_screen_bounds().await.unwrap(),
            Rect::new(0, 0, 3200, 1080)
        );
    }

    #[tokio::test]
    async fn cached_capture_size_wins_over_probe() {
        let portal = FakePortal::with_streams(vec![stream(0, 9, (1000, 500), Some((0, 0)))]);
        let factory = FakeStreamFactory::default().negotiates(9, Size::new(4000, 2000));
        let m = manager(portal, factory);
        m.update_capture_size("0", 1500, 750);

        let d = &m.displays().await.unwrap()[0];
        assert_eq!(d.monitor_area.size(), Size::new(1500, 750));
        assert_eq!(d.scale_factor, 1.5);
    }

    #[tokio::test]
    async fn percentage_uses_logical_area() {
        let portal = FakePortal::with_streams(vec![
            stream(0, 1, (1920, 1080), Some((0, 0))),
            stream(1, 2, (1920, 1080), Some((1920, 0))),
        ]);
        let factory = FakeStreamFactory::default()
            .negotiates(1, Size::new(3840, 2160))
            .negotiates(2, Size::new(3840, 2160));
        let m = manager(portal, factory);
        let p = m
            .convert_percentage_location_to_absolute("1", 0.5, 0.5)
            .await
            .unwrap();
        assert_eq!(p, Point::new(2880, 540));
        assert!(m.convert_percentage_location_to_absolute("5", 0.5, 0.5).await.is_err());
    }

    #[tokio::test]
    async fn portal_failure_falls_back_for_bounds() {
        let m = manager(FakePortal::failing(), FakeStreamFactory::default());
        assert!(m.displays().await.is_err());
        assert_eq!(m.virtual_screen_bounds().await.unwrap(), FALLBACK_BOUNDS);
    }

    #[test]
    fn capture_size_ignores_bad_input() {
        let m = manager(FakePortal::with_streams(Vec::new()), FakeStreamFactory::default());
        m.update_capture_size("  ", 100, 100);
        m.update_capture_size("0", 0, 100);
        m.update_capture_size("0", 100, -1);
        assert!(!m.has_any_capture_sizes());
        m.update_capture_size("0", 100, 100);
        assert!(m.has_any_capture_sizes());
    }

    #[tokio::test]
    async fn failing_stream_is_skipped() {
        let portal = FakePortal::with_streams(vec![
            stream(0, 5, (800, 600), None),
            stream(1, 6, (800, 600), None),
        ]);
        let factory = FakeStreamFactory::default().fails_for(5);
        let m = manager(portal, factory);
        let streams = m.create_pipewire_streams().await;
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].0, "1");
        assert_eq!(streams[0].1.node_id(), 6);
    }

    #[tokio::test]
    async fn names_and_indices_follow_stream_index() {
        let portal = FakePortal::with_streams(vec![
            stream(4, 0, (800, 600), None),
            stream(2, 0, (1024, 768), None),
        ]);
        let m = manager(portal, FakeStreamFactory::default());

        let displays = m.displays().await.unwrap();
        assert_eq!(displays[0].device_name, "2");
        assert_eq!(displays[0].index, 2);
        assert_eq!(displays[0].display_name, "Display 3");
        assert!(displays[0].is_primary);
        assert_eq!(displays[1].device_name, "4");
        assert_eq!(displays[1].index, 4);
        assert_eq!(displays[1].display_name, "Display 5");
        assert_eq!(displays[1].monitor_area, Rect::new(1024, 0, 800, 600));
    }

    #[tokio::test]
    async fn cached_capture_size_scales_unpositioned_stream() {
        let portal = FakePortal::with_streams(vec![stream(0, 0, (1920, 1080), None)]);
        let m = manager(portal, FakeStreamFactory::default());
        m.update_capture_size("0", 3840, 2160);

        let d = &m.displays().await.unwrap()[0];
        assert_eq!(d.scale_factor, 2.0);
        assert_eq!(d.monitor_area, Rect::new(0, 0, 3840, 2160));
        assert_eq!(d.logical_monitor_area, Rect::new(0, 0, 1920, 1080));
    }
}
