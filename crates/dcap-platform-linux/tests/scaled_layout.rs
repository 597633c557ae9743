#![cfg(target_os = "linux")]

use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use async_trait::async_trait;
use dcap_core::buffers::BufferPool;
use dcap_core::config::CaptureTimeouts;
use dcap_core::frame::FrameData;
use dcap_core::{CaptureError, DisplayManager, Point, Rect, ScreenGrabber, Shutdown, Size};
use dcap_platform_linux::portal::{PipeWireFd, ScreenCastPortal, ScreenCastStream, PROP_POSITION, PROP_SIZE};
use dcap_platform_linux::stream::{CaptureStream, CaptureStreamFactory, FrameSink, StreamState};
use dcap_platform_linux::tuple::PortalValue;
use dcap_platform_linux::{WaylandDisplayManager, WaylandScreenGrabber};

/// Two 1280x720 logical monitors side by side on a 2x compositor.
struct HiDpiPortal {
    fd: PipeWireFd,
}

#[async_trait]
impl ScreenCastPortal for HiDpiPortal {
    async fn screencast_streams(&self) -> Result<Vec<ScreenCastStream>, CaptureError> {
        Ok((0..2)
            .map(|i| {
                ScreenCastStream::new(i, 40 + i)
                    .with_property(PROP_POSITION, PortalValue::TupleI32(1280 * i as i32, 0))
                    .with_property(PROP_SIZE, PortalValue::TupleI32(1280, 720))
            })
            .collect())
    }

    async fn pipewire_connection(&self) -> Result<Option<PipeWireFd>, CaptureError> {
        Ok(Some(self.fd.clone()))
    }

    async fn remote_desktop_session_handle(&self) -> Result<Option<String>, CaptureError> {
        Ok(None)
    }
}

struct SolidStream(Arc<FrameSink>);

impl CaptureStream for SolidStream {
    fn node_id(&self) -> u32 {
        self.0.node_id()
    }
    fn width(&self) -> i32 {
        self.0.width()
    }
    fn height(&self) -> i32 {
        self.0.height()
    }
    fn negotiated_size(&self) -> Option<Size> {
        self.0.negotiated_size()
    }
    fn state(&self) -> StreamState {
        self.0.state()
    }
    fn frames_received(&self) -> u64 {
        self.0.frames_received()
    }
    fn try_latest_frame(&self) -> Option<FrameData> {
        self.0.latest()
    }
}

/// Delivers one double-resolution frame per stream, red on node 40, blue on 41.
#[derive(Default)]
struct DoubleScaleFactory {
    pool: BufferPool,
}

impl CaptureStreamFactory for DoubleScaleFactory {
    fn create(
        &self,
        node_id: u32,
        _fd: &PipeWireFd,
        expected_width: i32,
        expected_height: i32,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let sink = Arc::new(FrameSink::new(node_id, expected_width, expected_height, self.pool.clone())?);
        let (w, h) = (expected_width * 2, expected_height * 2);
        let color = if node_id == 40 { [0, 0, 255, 255] } else { [255, 0, 0, 255] };
        sink.ingest(&color.repeat((w * h) as usize), Some(w), Some(h));
        Ok(Box::new(SolidStream(sink)))
    }
}

fn setup() -> (Arc<WaylandDisplayManager>, WaylandScreenGrabber) {
    let fd = PipeWireFd::new(OwnedFd::from(File::open("/dev/null").unwrap()));
    let timeouts = CaptureTimeouts {
        stream_start_ms: 200,
        stream_start_poll_ms: 5,
        size_probe_ms: 200,
        size_probe_poll_ms: 5,
        ..CaptureTimeouts::default()
    };
    let manager = Arc::new(WaylandDisplayManager::new(
        Arc::new(HiDpiPortal { fd }),
        Arc::new(DoubleScaleFactory::default()),
        timeouts.clone(),
    ));
    let grabber = WaylandScreenGrabber::new(Arc::clone(&manager), timeouts);
    (manager, grabber)
}

#[tokio::test]
async fn physical_layout_follows_negotiated_scale() {
    let (manager, _) = setup();
    let displays = manager.displays().await.unwrap();
    assert_eq!(displays.len(), 2);
    assert_eq!(displays[0].monitor_area, Rect::new(0, 0, 2560, 1440));
    assert_eq!(displays[1].monitor_area, Rect::new(2560, 0, 2560, 1440));
    assert_eq!(displays[1].logical_monitor_area, Rect::new(1280, 0, 1280, 720));
    assert_eq!(displays[1].scale_factor, 2.0);
    assert!(displays[0].is_primary);
    assert_eq!(manager.try_get_node_id("1").await.unwrap(), Some(41));
    assert_eq!(
        manager.virtual_screen_bounds().await.unwrap(),
        Rect::new(0, 0, 5120, 1440)
    );
}

#[tokio::test]
async fn input_maps_into_logical_space() {
    let (manager, _) = setup();
    let p = manager
        .convert_percentage_location_to_absolute("1", 0.5, 0.5)
        .await
        .unwrap();
    assert_eq!(p, Point::new(1920, 360));
}

#[tokio::test]
async fn composite_places_each_display_at_its_physical_origin() {
    let (_, grabber) = setup();
    let (_handle, shutdown) = Shutdown::new();
    grabber.initialize(&shutdown).await.unwrap();

    let result = grabber.capture_all_displays(false).await;
    let bitmap = result.bitmap().expect("composite");
    assert_eq!((bitmap.width(), bitmap.height()), (5120, 1440));
    assert_eq!(bitmap.pixel(100, 100), Some([0, 0, 255, 255]));
    assert_eq!(bitmap.pixel(3000, 100), Some([255, 0, 0, 255]));

    grabber.dispose().await;
}
