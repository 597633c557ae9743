//! In-memory portal and stream doubles.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dcap_core::buffers::BufferPool;
use dcap_core::frame::FrameData;
use dcap_core::{CaptureError, Size};

use crate::portal::{PipeWireFd, ScreenCastPortal, ScreenCastStream};
use crate::stream::{CaptureStream, CaptureStreamFactory, FrameSink, StreamState};

pub struct FakePortal {
    streams: Mutex<Vec<ScreenCastStream>>,
    fd: PipeWireFd,
    failing: bool,
}

impl FakePortal {
    pub fn with_streams(streams: Vec<ScreenCastStream>) -> Self {
        let fd = File::open("/dev/null").unwrap();
        Self {
            streams: Mutex::new(streams),
            fd: PipeWireFd::new(OwnedFd::from(fd)),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::with_streams(Vec::new())
        }
    }

    pub fn set_streams(&self, streams: Vec<ScreenCastStream>) {
        *self.streams.lock().unwrap() = streams;
    }
}

#[async_trait]
impl ScreenCastPortal for FakePortal {
    async fn screencast_streams(&self) -> Result<Vec<ScreenCastStream>, CaptureError> {
        if self.failing {
            return Err(CaptureError::native("portal unavailable"));
        }
        Ok(self.streams.lock().unwrap().clone())
    }

    async fn pipewire_connection(&self) -> Result<Option<PipeWireFd>, CaptureError> {
        if self.failing {
            return Err(CaptureError::native("portal unavailable"));
        }
        Ok(Some(self.fd.clone()))
    }

    async fn remote_desktop_session_handle(&self) -> Result<Option<String>, CaptureError> {
        Ok(None)
    }
}

pub struct FakeStream {
    sink: Arc<FrameSink>,
}

impl CaptureStream for FakeStream {
    fn node_id(&self) -> u32 {
        self.sink.node_id()
    }

    fn width(&self) -> i32 {
        self.sink.width()
    }

    fn height(&self) -> i32 {
        self.sink.height()
    }

    fn negotiated_size(&self) -> Option<Size> {
        self.sink.negotiated_size()
    }

    fn state(&self) -> StreamState {
        self.sink.state()
    }

    fn frames_received(&self) -> u64 {
        self.sink.frames_received()
    }

    fn try_latest_frame(&self) -> Option<FrameData> {
        if !self.is_streaming() {
            return None;
        }
        self.sink.latest()
    }
}

/// Streams that deliver one solid frame of the configured size on start.
#[derive(Default, Clone)]
pub struct FakeStreamFactory {
    sizes: HashMap<u32, Size>,
    colors: HashMap<u32, [u8; 4]>,
    failing: HashSet<u32>,
    pool: BufferPool,
    sinks: Arc<Mutex<HashMap<u32, Arc<FrameSink>>>>,
}

impl FakeStreamFactory {
    pub fn negotiates(mut self, node_id: u32, size: Size) -> Self {
        self.sizes.insert(node_id, size);
        self
    }

    pub fn color(mut self, node_id: u32, bgra: [u8; 4]) -> Self {
        self.colors.insert(node_id, bgra);
        self
    }

    pub fn fails_for(mut self, node_id: u32) -> Self {
        self.failing.insert(node_id);
        self
    }

    /// Sink of the most recently started stream for `node_id`.
    pub fn sink(&self, node_id: u32) -> Option<Arc<FrameSink>> {
        self.sinks.lock().unwrap().get(&node_id).cloned()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

pub fn solid_frame(size: Size, bgra: [u8; 4]) -> Vec<u8> {
    bgra.repeat((size.width * size.height) as usize)
}

impl CaptureStreamFactory for FakeStreamFactory {
    fn create(
        &self,
        node_id: u32,
        _fd: &PipeWireFd,
        expected_width: i32,
        expected_height: i32,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if self.failing.contains(&node_id) {
            return Err(CaptureError::native(format!("node {node_id} refused")));
        }
        let sink = Arc::new(FrameSink::new(
            node_id,
            expected_width,
            expected_height,
            self.pool.clone(),
        )?);
        if let Some(size) = self.sizes.get(&node_id) {
            let color = self.colors.get(&node_id).copied().unwrap_or([0x40, 0x40, 0x40, 0xFF]);
            sink.ingest(&solid_frame(*size, color), Some(size.width), Some(size.height));
        }
        self.sinks.lock().unwrap().insert(node_id, Arc::clone(&sink));
        Ok(Box::new(FakeStream { sink }))
    }
}
