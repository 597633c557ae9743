//! Raw frames and the single-writer "latest frame" slot.

use std::sync::{Arc, Mutex};

use crate::buffers::PooledBuffer;

/// A raw 32-bit BGRA frame held in a pooled buffer.
///
/// `stride` is bytes per row and is always at least `width * 4`. The data
/// slice is sized exactly to the bytes produced by the source.
#[derive(Debug, Clone)]
pub struct FrameData {
    buffer: PooledBuffer,
    width: i32,
    height: i32,
    stride: i32,
    pixel_format: u32,
}

impl FrameData {
    pub fn new(buffer: PooledBuffer, width: i32, height: i32, stride: i32, pixel_format: u32) -> Self {
        Self {
            buffer,
            width,
            height,
            stride,
            pixel_format,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn stride(&self) -> i32 {
        self.stride
    }

    /// Source-specific pixel format code.
    pub fn pixel_format(&self) -> u32 {
        self.pixel_format
    }
}

/// Most recent frame produced by a capture thread.
///
/// The writer swaps in a new frame and the previous one is released once the
/// last reader holding it is done. Readers take a private copy and never
/// block the writer for longer than a pointer swap.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Arc<FrameData>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `frame`, releasing whatever was there before.
    pub fn publish(&self, frame: FrameData) {
        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.replace(Arc::new(frame))
        };
        drop(previous);
    }

    /// Private copy of the current frame, `None` before the first publish.
    pub fn snapshot(&self) -> Option<FrameData> {
        let current = {
            let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };
        current.map(|frame| FrameData::clone(&frame))
    }

    pub fn has_frame(&self) -> bool {
        self.slot
            .lock()
            .map(|s| s.is_some())
            .unwrap_or_else(|e| e.into_inner().is_some())
    }

    /// Drop the held frame, returning its buffer to the pool.
    pub fn clear(&self) {
        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        drop(previous);
    }
}
