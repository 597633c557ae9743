//! PipeWire capture through a GStreamer `pipewiresrc ! appsink` pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use dcap_core::buffers::BufferPool;
use dcap_core::frame::FrameData;
use dcap_core::{CaptureError, Size};
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::portal::PipeWireFd;
use crate::stream::{CaptureStream, CaptureStreamFactory, FrameSink, StreamState};

const BUS_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum PipeWireError {
    #[error(
        "GStreamer libraries not found. Please install them with: sudo apt install \
         libgstreamer1.0-0 gstreamer1.0-plugins-base gstreamer1.0-plugins-good ({0})"
    )]
    Init(String),
    #[error("failed to build pipeline: {0}")]
    Launch(#[from] gstreamer::glib::Error),
    #[error("pipeline description did not produce a pipeline")]
    NotAPipeline,
    #[error("pipeline has no appsink named 'sink'")]
    MissingAppSink,
    #[error("failed to start pipeline: {0}")]
    StateChange(#[from] gstreamer::StateChangeError),
}

impl From<PipeWireError> for CaptureError {
    fn from(err: PipeWireError) -> Self {
        CaptureError::NativeCallFailure(err.to_string())
    }
}

fn ensure_gstreamer() -> Result<(), PipeWireError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| gstreamer::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(PipeWireError::Init)
}

/// Pipeline description for one node on the portal's PipeWire remote.
pub fn pipeline_description(fd: i32, node_id: u32) -> String {
    format!(
        "pipewiresrc fd={fd} path={node_id} always-copy=true \
         ! appsink name=sink max-buffers=1 drop=true sync=false caps=video/x-raw,format=BGRA"
    )
}

/// Outcome of one pipeline bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BusEvent {
    EndOfStream,
    Error(String),
}

/// Ends `sink` on the first end-of-stream or error reported on `bus`.
/// Returns when that happens or once `stop` is set.
fn watch_bus(bus: gstreamer::Bus, sink: Arc<FrameSink>, stop: Arc<AtomicBool>) {
    let poll = gstreamer::ClockTime::from_mseconds(BUS_POLL.as_millis() as u64);
    while !stop.load(Ordering::Acquire) {
        let Some(message) = bus.timed_pop_filtered(
            poll,
            &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
        ) else {
            continue;
        };
        let event = match message.view() {
            gstreamer::MessageView::Eos(_) => BusEvent::EndOfStream,
            gstreamer::MessageView::Error(err) => BusEvent::Error(err.error().to_string()),
            _ => continue,
        };
        apply_bus_event(&sink, &event);
        return;
    }
}

pub(crate) fn apply_bus_event(sink: &FrameSink, event: &BusEvent) {
    match event {
        BusEvent::EndOfStream => info!(node_id = sink.node_id(), "PipeWire stream reached end of stream"),
        BusEvent::Error(err) => warn!(node_id = sink.node_id(), error = %err, "PipeWire pipeline error"),
    }
    sink.end();
}

/// Live capture of one PipeWire node. Stops the pipeline when dropped.
pub struct PipeWireStream {
    sink: Arc<FrameSink>,
    pipeline: gstreamer::Pipeline,
    disposed: Arc<AtomicBool>,
    bus_watch: Mutex<Option<JoinHandle<()>>>,
}

impl PipeWireStream {
    pub fn start(
        node_id: u32,
        fd: &PipeWireFd,
        expected_width: i32,
        expected_height: i32,
        pool: BufferPool,
    ) -> Result<Self, CaptureError> {
        let sink = Arc::new(FrameSink::new(node_id, expected_width, expected_height, pool)?);
        ensure_gstreamer()?;

        let desc = pipeline_description(fd.raw(), node_id);
        info!(node_id, pipeline = %desc, "starting PipeWire capture");

        let pipeline = gstreamer::parse::launch(&desc)
            .map_err(PipeWireError::from)?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| PipeWireError::NotAPipeline)?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or(PipeWireError::MissingAppSink)?
            .downcast::<AppSink>()
            .map_err(|_| PipeWireError::MissingAppSink)?;

        let frames = Arc::clone(&sink);
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    let (caps_width, caps_height) = sample
                        .caps()
                        .and_then(|caps| caps.structure(0))
                        .map(|s| (s.get::<i32>("width").ok(), s.get::<i32>("height").ok()))
                        .unwrap_or((None, None));
                    let Some(buffer) = sample.buffer() else {
                        debug!(node_id, "sample without buffer");
                        return Ok(gstreamer::FlowSuccess::Ok);
                    };
                    match buffer.map_readable() {
                        Ok(map) => frames.ingest(map.as_slice(), caps_width, caps_height),
                        Err(err) => warn!(node_id, error = %err, "failed to map buffer"),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        let disposed = Arc::new(AtomicBool::new(false));
        let bus_watch = pipeline.bus().map(|bus| {
            let sink = Arc::clone(&sink);
            let stop = Arc::clone(&disposed);
            std::thread::spawn(move || watch_bus(bus, sink, stop))
        });
        let stream = Self {
            sink,
            pipeline,
            disposed,
            bus_watch: Mutex::new(bus_watch),
        };

        stream
            .pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(PipeWireError::from)?;
        Ok(stream)
    }

    fn stop(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(node_id = self.sink.node_id(), error = %err, "failed to stop pipeline");
        }
        let watcher = self.bus_watch.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(watcher) = watcher {
            let _ = watcher.join();
        }
        self.sink.end();
        self.sink.clear();
        debug!(node_id = self.sink.node_id(), "PipeWire capture stopped");
    }
}

impl CaptureStream for PipeWireStream {
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
        if self.disposed.load(Ordering::Acquire) {
            return StreamState::Ended;
        }
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

impl Drop for PipeWireStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts [`PipeWireStream`]s sharing one buffer pool.
#[derive(Debug, Clone, Default)]
pub struct GstStreamFactory {
    pool: BufferPool,
}

impl GstStreamFactory {
    pub fn new(pool: BufferPool) -> Self {
        Self { pool }
    }
}

impl CaptureStreamFactory for GstStreamFactory {
    fn create(
        &self,
        node_id: u32,
        fd: &PipeWireFd,
        expected_width: i32,
        expected_height: i32,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let stream =
            PipeWireStream::start(node_id, fd, expected_width, expected_height, self.pool.clone())?;
        Ok(Box::new(stream))
    }
}
