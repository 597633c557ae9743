//! Detects Wayland layout changes by polling the portal stream set.

use std::sync::Arc;
use std::time::Duration;

use dcap_core::{CaptureError, Shutdown};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::display_manager::WaylandDisplayManager;
use crate::portal::{ScreenCastStream, PROP_POSITION, PROP_SIZE};
use crate::tuple::format_tuple2;

/// Sent when the stream layout or a delivered capture size changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettingsChanged;

pub struct WaylandDisplaySettingsWatcher {
    displays: Arc<WaylandDisplayManager>,
    period: Duration,
    events: mpsc::Sender<DisplaySettingsChanged>,
    last_snapshot: Option<String>,
}

impl WaylandDisplaySettingsWatcher {
    pub fn new(
        displays: Arc<WaylandDisplayManager>,
        period: Duration,
        events: mpsc::Sender<DisplaySettingsChanged>,
    ) -> Self {
        Self {
            displays,
            period,
            events,
            last_snapshot: None,
        }
    }

    fn snapshot(&self, streams: &mut [ScreenCastStream]) -> String {
        streams.sort_by_key(|s| s.stream_index);
        streams
            .iter()
            .map(|s| {
                let index = s.stream_index.to_string();
                let capture = self
                    .displays
                    .try_get_capture_size(&index)
                    .map(|size| format!("{}x{}", size.width, size.height))
                    .unwrap_or_default();
                format!(
                    "{index}:{}:{}:{}:{capture}",
                    s.node_id,
                    format_tuple2(s.properties.get(PROP_POSITION)),
                    format_tuple2(s.properties.get(PROP_SIZE)),
                )
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    /// One comparison. Returns true when a change was reported.
    ///
    /// Nothing is compared until the grabber has recorded a capture size.
    pub async fn poll_once(&mut self) -> Result<bool, CaptureError> {
        if !self.displays.has_any_capture_sizes() {
            return Ok(false);
        }
        let mut streams = self.displays.portal().screencast_streams().await?;
        let snapshot = self.snapshot(&mut streams);

        match self.last_snapshot.replace(snapshot.clone()) {
            None => Ok(false),
            Some(previous) if previous == snapshot => Ok(false),
            Some(previous) => {
                info!(%previous, current = %snapshot, "Wayland display settings changed");
                let _ = self.events.send(DisplaySettingsChanged).await;
                Ok(true)
            }
        }
    }

    pub async fn run(&mut self, shutdown: Shutdown) {
        debug!(period_ms = self.period.as_millis() as u64, "display settings watcher started");
        while shutdown.sleep(self.period).await {
            if let Err(err) = self.poll_once().await {
                debug!(error = %err, "display settings poll failed");
            }
            if self.events.is_closed() {
                break;
            }
        }
        debug!("display settings watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePortal, FakeStreamFactory};
    use crate::tuple::PortalValue;
    use dcap_core::config::CaptureTimeouts;

    fn stream(index: u32, node: u32, x: i32) -> ScreenCastStream {
        ScreenCastStream::new(index, node)
            .with_property(PROP_SIZE, PortalValue::TupleI32(1920, 1080))
            .with_property(PROP_POSITION, PortalValue::TupleI32(x, 0))
    }

    type Setup = (
        WaylandDisplaySettingsWatcher,
        Arc<WaylandDisplayManager>,
        mpsc::Receiver<DisplaySettingsChanged>,
    );

    fn setup(portal: Arc<FakePortal>) -> Setup {
        let manager = Arc::new(WaylandDisplayManager::new(
            portal,
            Arc::new(FakeStreamFactory::default()),
            CaptureTimeouts::default(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let watcher = WaylandDisplaySettingsWatcher::new(Arc::clone(&manager), Duration::from_secs(1), tx);
        (watcher, manager, rx)
    }

    #[tokio::test]
    async fn snapshot_format() {
        let portal = Arc::new(FakePortal::with_streams(Vec::new()));
        let (watcher, manager, _rx) = setup(portal);
        manager.update_capture_size("0", 3840, 2160);
        let mut streams = vec![stream(1, 8, 1920), stream(0, 7, 0), ScreenCastStream::new(2, 9)];
        assert_eq!(
            watcher.snapshot(&mut streams),
            "0:7:0,0:1920,1080:3840x2160|1:8:1920,0:1920,1080:|2:9:::"
        );
    }

    #[tokio::test]
    async fn silent_until_capture_size_known_then_reports_changes() {
        let portal = Arc::new(FakePortal::with_streams(vec![stream(0, 7, 0)]));
        let (mut watcher, manager, mut rx) = setup(Arc::clone(&portal));

        assert!(!watcher.poll_once().await.unwrap());
        manager.update_capture_size("0", 1920, 1080);
        assert!(!watcher.poll_once().await.unwrap());
        assert!(!watcher.poll_once().await.unwrap());

        portal.set_streams(vec![stream(0, 7, 0), stream(1, 8, 1920)]);
        assert!(watcher.poll_once().await.unwrap());
        assert_eq!(rx.try_recv().unwrap(), DisplaySettingsChanged);

        manager.update_capture_size("0", 3840, 2160);
        assert!(watcher.poll_once().await.unwrap());
    }
}
