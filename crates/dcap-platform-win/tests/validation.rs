#![cfg(windows)]

//! Smoke tests against the live desktop session.

use std::sync::Arc;

use dcap_core::config::CaptureTimeouts;
use dcap_core::{CoordinateSpace, DisplayManager, ScreenGrabber, Shutdown};
use dcap_platform_win::capture_gdi::GdiCapturer;
use dcap_platform_win::{GdiScreenGrabber, WinDisplayManager};

#[test]
fn test_monitor_enumeration() {
    let displays = dcap_platform_win::monitor::enumerate_displays().expect("enumerate");
    assert!(!displays.is_empty(), "at least one monitor");
    assert_eq!(displays.iter().filter(|d| d.is_primary).count(), 1);
    for d in &displays {
        assert!(d.device_name.starts_with("\\\\.\\"), "GDI device name: {}", d.device_name);
        assert!(d.scale_factor >= 1.0);
    }
}

#[test]
fn test_gdi_capture_of_primary_monitor() {
    let displays = dcap_platform_win::monitor::enumerate_displays().unwrap();
    let primary = displays.iter().find(|d| d.is_primary).unwrap();
    let mut capturer = GdiCapturer::new().expect("GDI capturer should be creatable");
    let bitmap = capturer.capture(primary.monitor_area, true).expect("capture");
    assert_eq!(bitmap.width() as i32, primary.monitor_area.width);
    assert_eq!(bitmap.height() as i32, primary.monitor_area.height);
    assert!(bitmap.as_bytes().chunks_exact(4).all(|px| px[3] == 255));
}

#[tokio::test]
async fn test_grabber_captures_virtual_screen() {
    let manager = Arc::new(WinDisplayManager::new(&CaptureTimeouts::default()));
    assert_eq!(manager.input_coordinate_space(), CoordinateSpace::Physical);
    let bounds = manager.virtual_screen_bounds().await.unwrap();

    let grabber = GdiScreenGrabber::new(Arc::clone(&manager));
    let (_handle, shutdown) = Shutdown::new();
    grabber.initialize(&shutdown).await.unwrap();
    let result = grabber.capture_all_displays(false).await;
    let bitmap = result.bitmap().expect("virtual screen capture");
    assert_eq!(bitmap.width() as i32, bounds.width);
    assert_eq!(bitmap.height() as i32, bounds.height);
    grabber.dispose().await;
    grabber.dispose().await;
}
