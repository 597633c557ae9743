//! Per-node capture streams and the frame hand-off they share.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use dcap_core::buffers::BufferPool;
use dcap_core::frame::{FrameData, LatestFrame};
use dcap_core::{CaptureError, Size};
use tracing::{info, warn};

use crate::portal::PipeWireFd;

/// SPA video format code for BGRA.
pub const SPA_VIDEO_FORMAT_BGRA: u32 = 12;

/// Lifecycle of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Started, no frame delivered yet.
    Negotiating,
    Streaming,
    /// End of stream, a pipeline error or disposal. Terminal.
    Ended,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Negotiating,
            1 => StreamState::Streaming,
            _ => StreamState::Ended,
        }
    }
}

/// A running capture of one PipeWire node.
pub trait CaptureStream: Send + Sync {
    fn node_id(&self) -> u32;

    /// Current frame width. The expected width until caps are negotiated.
    fn width(&self) -> i32;

    fn height(&self) -> i32;

    /// Size reported by the negotiated caps, `None` before the first frame.
    fn negotiated_size(&self) -> Option<Size>;

    fn state(&self) -> StreamState;

    fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Number of frames published so far.
    fn frames_received(&self) -> u64;

    /// Private copy of the newest frame.
    fn try_latest_frame(&self) -> Option<FrameData>;
}

/// Opens capture streams on a PipeWire remote.
pub trait CaptureStreamFactory: Send + Sync {
    fn create(
        &self,
        node_id: u32,
        fd: &PipeWireFd,
        expected_width: i32,
        expected_height: i32,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Receiving end of a capture pipeline.
///
/// The pipeline thread calls [`FrameSink::ingest`] for every buffer pulled
/// from the sink element; readers take copies through [`FrameSink::latest`].
/// The first ingested frame moves the sink to [`StreamState::Streaming`];
/// [`FrameSink::end`] moves it to [`StreamState::Ended`] for good.
#[derive(Debug)]
pub struct FrameSink {
    node_id: u32,
    expected_width: i32,
    expected_height: i32,
    /// Width in the high half, height in the low half.
    size: AtomicU64,
    negotiated: AtomicBool,
    state: AtomicU8,
    frames: AtomicU64,
    logged_size_mismatch: AtomicBool,
    logged_stride_fallback: AtomicBool,
    latest: LatestFrame,
    pool: BufferPool,
}

impl FrameSink {
    pub fn new(
        node_id: u32,
        expected_width: i32,
        expected_height: i32,
        pool: BufferPool,
    ) -> Result<Self, CaptureError> {
        if expected_width <= 0 || expected_height <= 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "expected stream size must be positive, got {expected_width}x{expected_height}"
            )));
        }
        Ok(Self {
            node_id,
            expected_width,
            expected_height,
            size: AtomicU64::new(pack_size(expected_width, expected_height)),
            negotiated: AtomicBool::new(false),
            state: AtomicU8::new(StreamState::Negotiating as u8),
            frames: AtomicU64::new(0),
            logged_size_mismatch: AtomicBool::new(false),
            logged_stride_fallback: AtomicBool::new(false),
            latest: LatestFrame::new(),
            pool,
        })
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn expected_size(&self) -> Size {
        Size::new(self.expected_width, self.expected_height)
    }

    /// Width and height read together.
    pub fn size(&self) -> Size {
        unpack_size(self.size.load(Ordering::Acquire))
    }

    pub fn width(&self) -> i32 {
        self.size().width
    }

    pub fn height(&self) -> i32 {
        self.size().height
    }

    pub fn negotiated_size(&self) -> Option<Size> {
        self.negotiated.load(Ordering::Acquire).then(|| self.size())
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark the stream finished. Later frames are dropped.
    pub fn end(&self) {
        let previous = self.state.swap(StreamState::Ended as u8, Ordering::AcqRel);
        if StreamState::from_u8(previous) != StreamState::Ended {
            info!(node_id = self.node_id, "capture stream ended");
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn latest(&self) -> Option<FrameData> {
        self.latest.snapshot()
    }

    /// Copy one mapped buffer and publish it as the newest frame.
    ///
    /// Caps dimensions override the expected size only when positive.
    pub fn ingest(&self, data: &[u8], caps_width: Option<i32>, caps_height: Option<i32>) {
        if self.state() == StreamState::Ended {
            return;
        }
        let current = self.size();
        let width = caps_width.filter(|w| *w > 0).unwrap_or(current.width);
        let height = caps_height.filter(|h| *h > 0).unwrap_or(current.height);
        self.size.store(pack_size(width, height), Ordering::Release);

        if (width != self.expected_width || height != self.expected_height)
            && !self.logged_size_mismatch.swap(true, Ordering::Relaxed)
        {
            info!(
                node_id = self.node_id,
                expected = %format!("{}x{}", self.expected_width, self.expected_height),
                actual = %format!("{width}x{height}"),
                "stream size differs from portal size"
            );
        }

        let min_stride = width * 4;
        let stride = match data.len() as i64 / height.max(1) as i64 {
            s if s >= min_stride as i64 => s as i32,
            s => {
                if !self.logged_stride_fallback.swap(true, Ordering::Relaxed) {
                    warn!(
                        node_id = self.node_id,
                        computed = s,
                        fallback = min_stride,
                        "buffer too small for frame width; assuming tight rows"
                    );
                }
                min_stride
            }
        };

        let buffer = self.pool.rent_copy(data);
        self.latest
            .publish(FrameData::new(buffer, width, height, stride, SPA_VIDEO_FORMAT_BGRA));
        self.negotiated.store(true, Ordering::Release);
        self.frames.fetch_add(1, Ordering::AcqRel);
        let _ = self.state.compare_exchange(
            StreamState::Negotiating as u8,
            StreamState::Streaming as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Release the held frame.
    pub fn clear(&self) {
        self.latest.clear();
    }
}

fn pack_size(width: i32, height: i32) -> u64 {
    (u64::from(width as u32) << 32) | u64::from(height as u32)
}

fn unpack_size(packed: u64) -> Size {
    Size::new((packed >> 32) as u32 as i32, packed as u32 as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn non_positive_expected_size_is_rejected() {
        let pool = BufferPool::new(2);
        assert!(FrameSink::new(1, 0, 1080, pool.clone()).is_err());
        assert!(FrameSink::new(1, 1920, -1, pool).is_err());
    }

    #[test]
    fn caps_override_expected_size() {
        let sink = FrameSink::new(7, 2, 2, BufferPool::new(2)).unwrap();
        assert_eq!((sink.width(), sink.height()), (2, 2));
        assert!(sink.negotiated_size().is_none());

        sink.ingest(&[0u8; 4 * 4 * 3], Some(4), Some(3));
        assert_eq!(sink.negotiated_size(), Some(Size::new(4, 3)));
        let frame = sink.latest().unwrap();
        assert_eq!((frame.width(), frame.height(), frame.stride()), (4, 3, 16));
        assert_eq!(frame.pixel_format(), SPA_VIDEO_FORMAT_BGRA);
        assert_eq!(sink.frames_received(), 1);
    }

    #[test]
    fn missing_caps_keep_expected_size() {
        let sink = FrameSink::new(7, 2, 2, BufferPool::new(2)).unwrap();
        sink.ingest(&[0u8; 2 * 4 * 2], None, Some(0));
        assert_eq!(sink.negotiated_size(), Some(Size::new(2, 2)));
    }

    #[test]
    fn padded_rows_keep_their_stride() {
        let sink = FrameSink::new(1, 2, 2, BufferPool::new(2)).unwrap();
        sink.ingest(&[0u8; 12 * 2], Some(2), Some(2));
        assert_eq!(sink.latest().unwrap().stride(), 12);
    }

    #[test]
    fn short_buffer_falls_back_to_tight_stride() {
        let sink = FrameSink::new(1, 4, 4, BufferPool::new(2)).unwrap();
        sink.ingest(&[0u8; 10], Some(4), Some(4));
        let frame = sink.latest().unwrap();
        assert_eq!(frame.stride(), 16);
        assert_eq!(frame.len(), 10);
    }

    #[test]
    fn clear_returns_buffer_to_pool() {
        let pool = BufferPool::new(2);
        let sink = FrameSink::new(1, 1, 1, pool.clone()).unwrap();
        sink.ingest(&[1, 2, 3, 4], None, None);
        sink.ingest(&[5, 6, 7, 8], None, None);
        assert_eq!(pool.stats().outstanding(), 1);
        sink.clear();
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn first_frame_starts_streaming_and_end_is_final() {
        let sink = FrameSink::new(3, 1, 1, BufferPool::new(2)).unwrap();
        assert_eq!(sink.state(), StreamState::Negotiating);

        sink.ingest(&[1, 2, 3, 4], None, None);
        assert_eq!(sink.state(), StreamState::Streaming);

        sink.end();
        sink.end();
        assert_eq!(sink.state(), StreamState::Ended);
        sink.ingest(&[5, 6, 7, 8], None, None);
        assert_eq!(sink.state(), StreamState::Ended);
        assert_eq!(sink.frames_received(), 1);
    }

    #[test]
    fn end_before_first_frame_skips_streaming() {
        let sink = FrameSink::new(3, 1, 1, BufferPool::new(2)).unwrap();
        sink.end();
        sink.ingest(&[1, 2, 3, 4], None, None);
        assert_eq!(sink.state(), StreamState::Ended);
        assert!(sink.latest().is_none());
    }

    #[test]
    fn size_is_published_as_one_value() {
        assert_eq!(unpack_size(pack_size(3840, 2160)), Size::new(3840, 2160));

        let sink = Arc::new(FrameSink::new(1, 2, 2, BufferPool::new(4)).unwrap());
        let writer = {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let (w, h) = if i % 2 == 0 { (1, 4) } else { (4, 1) };
                    sink.ingest(&[0u8; 16], Some(w), Some(h));
                }
            })
        };
        for _ in 0..500 {
            let size = sink.size();
            assert!(
                [Size::new(2, 2), Size::new(1, 4), Size::new(4, 1)].contains(&size),
                "torn size {size:?}"
            );
        }
        writer.join().unwrap();
    }
}
