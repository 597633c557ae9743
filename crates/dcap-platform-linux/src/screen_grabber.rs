//! Screen capture on Wayland via PipeWire streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use dcap_core::bitmap::Bitmap;
use dcap_core::composite::Compositor;
use dcap_core::config::CaptureTimeouts;
use dcap_core::{
    CaptureError, CaptureMode, CaptureResult, DisplayInfo, DisplayManager, ScreenGrabber, Shutdown,
};
use tracing::{debug, error, info, warn};

use crate::display_manager::WaylandDisplayManager;
use crate::stream::{CaptureStream, StreamState};

const MODE: CaptureMode = CaptureMode::WaylandPipeWire;

type StreamMap = Vec<(String, Arc<dyn CaptureStream>)>;

/// Captures displays from the PipeWire streams granted by the portal.
///
/// The cursor is embedded by the compositor, so `capture_cursor` has no
/// effect here.
pub struct WaylandScreenGrabber {
    displays: Arc<WaylandDisplayManager>,
    streams: RwLock<StreamMap>,
    last_sequence: Mutex<HashMap<String, u64>>,
    init_lock: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
    timeouts: CaptureTimeouts,
}

impl WaylandScreenGrabber {
    pub fn new(displays: Arc<WaylandDisplayManager>, timeouts: CaptureTimeouts) -> Self {
        Self {
            displays,
            streams: RwLock::new(Vec::new()),
            last_sequence: Mutex::new(HashMap::new()),
            init_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            timeouts,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn stream_snapshot(&self) -> StreamMap {
        self.streams.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn take_streams(&self) -> StreamMap {
        std::mem::take(&mut *self.streams.write().unwrap_or_else(|e| e.into_inner()))
    }

    async fn wait_for_first_frame(
        &self,
        name: &str,
        stream: &dyn CaptureStream,
        shutdown: &Shutdown,
    ) -> Result<bool, CaptureError> {
        let poll = self.timeouts.stream_start_poll();
        let attempts = (self.timeouts.stream_start().as_millis() / poll.as_millis().max(1)).max(1);
        for _ in 0..attempts {
            if stream.is_streaming() && stream.frames_received() > 0 {
                return Ok(true);
            }
            if !shutdown.sleep(poll).await {
                return Err(CaptureError::Cancelled);
            }
        }
        warn!(
            device_name = name,
            node_id = stream.node_id(),
            "stream produced no frame before timeout"
        );
        Ok(false)
    }

    fn capture_stream(&self, device_name: &str, stream: &dyn CaptureStream) -> CaptureResult {
        let Some(frame) = stream.try_latest_frame() else {
            return CaptureResult::NoChanges { mode: MODE };
        };
        match Bitmap::from_frame(&frame) {
            Ok(bitmap) => {
                self.displays
                    .update_capture_size(device_name, bitmap.width() as i32, bitmap.height() as i32);
                CaptureResult::ok(bitmap, MODE)
            }
            Err(err) => {
                error!(device_name, error = %err, "failed to convert PipeWire frame");
                CaptureResult::fail(err)
            }
        }
    }

    /// True when `stream` has ended. The grabber then reports itself
    /// uninitialized so the next capture reopens the portal streams.
    fn stream_ended(&self, device_name: &str, stream: &dyn CaptureStream) -> bool {
        if stream.state() != StreamState::Ended {
            return false;
        }
        if self.initialized.swap(false, Ordering::AcqRel) {
            warn!(device_name, node_id = stream.node_id(), "PipeWire stream ended; reinitializing");
        }
        true
    }

    /// True when no frame arrived since the previous read of `device_name`.
    fn unchanged_since_last_read(&self, device_name: &str, stream: &dyn CaptureStream) -> bool {
        let current = stream.frames_received();
        let mut seen = self.last_sequence.lock().unwrap_or_else(|e| e.into_inner());
        let previous = seen.insert(device_name.to_string(), current);
        previous == Some(current)
    }
}

#[async_trait]
impl ScreenGrabber for WaylandScreenGrabber {
    async fn initialize(&self, shutdown: &Shutdown) -> Result<(), CaptureError> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = tokio::select! {
            guard = self.init_lock.lock() => guard,
            _ = shutdown.triggered() => return Err(CaptureError::Cancelled),
        };
        if self.is_initialized() {
            return Ok(());
        }

        let created = self.displays.create_pipewire_streams().await;
        if created.is_empty() {
            error!("failed to get portal streams or connection");
            return Err(CaptureError::NoStreamsAvailable);
        }
        info!(count = created.len(), "PipeWire streams created");

        let fresh: StreamMap = created
            .into_iter()
            .map(|(name, stream)| (name, Arc::from(stream)))
            .collect();
        let previous = {
            let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *streams, fresh.clone())
        };
        if !previous.is_empty() {
            let _ = tokio::task::spawn_blocking(move || drop(previous));
        }
        self.last_sequence.lock().unwrap_or_else(|e| e.into_inner()).clear();

        for (name, stream) in &fresh {
            if self.wait_for_first_frame(name, stream.as_ref(), shutdown).await? {
                if let Some(size) = stream.negotiated_size() {
                    self.displays.update_capture_size(name, size.width, size.height);
                }
            }
        }

        self.initialized.store(true, Ordering::Release);
        info!(streams = fresh.len(), "Wayland screen grabber initialized");
        Ok(())
    }

    async fn capture_display(
        &self,
        target: &DisplayInfo,
        _capture_cursor: bool,
        force_key_frame: bool,
    ) -> CaptureResult {
        if !self.is_initialized() {
            return CaptureResult::fail(CaptureError::NotInitialized);
        }
        let streams = self.stream_snapshot();
        let stream = match streams.iter().find(|(name, _)| *name == target.device_name) {
            Some((_, stream)) => Arc::clone(stream),
            None => match streams.first() {
                Some((name, stream)) => {
                    debug!(requested = %target.device_name, using = %name, "no stream for display; using first");
                    Arc::clone(stream)
                }
                None => return CaptureResult::fail(CaptureError::NoStreamsAvailable),
            },
        };

        if self.stream_ended(&target.device_name, stream.as_ref()) {
            return CaptureResult::fail(CaptureError::NotInitialized);
        }
        if self.unchanged_since_last_read(&target.device_name, stream.as_ref()) && !force_key_frame {
            return CaptureResult::NoChanges { mode: MODE };
        }
        self.capture_stream(&target.device_name, stream.as_ref())
    }

    async fn capture_all_displays(&self, _capture_cursor: bool) -> CaptureResult {
        if !self.is_initialized() {
            return CaptureResult::fail(CaptureError::NotInitialized);
        }
        let streams = self.stream_snapshot();
        if streams
            .iter()
            .any(|(name, stream)| self.stream_ended(name, stream.as_ref()))
        {
            return CaptureResult::fail(CaptureError::NotInitialized);
        }
        match streams.as_slice() {
            [] => return CaptureResult::fail(CaptureError::NoStreamsAvailable),
            [(name, stream)] => return self.capture_stream(name, stream.as_ref()),
            _ => {}
        }

        let bounds = match self.displays.virtual_screen_bounds().await {
            Ok(bounds) => bounds,
            Err(err) => return CaptureResult::fail(err),
        };
        let displays = match self.displays.displays().await {
            Ok(displays) => displays,
            Err(err) => return CaptureResult::fail(err),
        };
        let mut compositor = match Compositor::new(bounds) {
            Ok(compositor) => compositor,
            Err(err) => return CaptureResult::fail(err),
        };

        for disp in &displays {
            let Some((_, stream)) = streams.iter().find(|(name, _)| *name == disp.device_name) else {
                warn!(device_name = %disp.device_name, "no stream for display");
                continue;
            };
            match self.capture_stream(&disp.device_name, stream.as_ref()) {
                CaptureResult::Ok { bitmap, .. } => compositor.place(disp, &bitmap),
                other => {
                    warn!(device_name = %disp.device_name, result = ?other.error(), "display capture failed");
                }
            }
        }
        CaptureResult::ok(compositor.finish(), MODE)
    }

    async fn dispose(&self) {
        self.initialized.store(false, Ordering::Release);
        let streams = self.take_streams();
        if streams.is_empty() {
            return;
        }
        debug!(count = streams.len(), "disposing PipeWire streams");
        let _ = tokio::task::spawn_blocking(move || drop(streams)).await;
    }
}
