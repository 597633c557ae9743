//! Cursor shape tracking.
//!
//! A [`CursorWatcher`] polls a platform [`CursorSource`] on a short fixed
//! period. Each tick compares a cheap identity key (XFixes serial, cursor
//! handle) with the previous one; only when it moves is the image fetched,
//! normalised to logical pixels and encoded as base64 PNG. Identical payloads
//! are never emitted twice in a row.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::bitmap::Bitmap;
use crate::errors::CaptureError;
use crate::shutdown::Shutdown;

/// Scale factors at or below this are treated as 1.0.
const SCALE_EPSILON: f64 = 1.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerCursor {
    /// Viewer falls back to its default arrow; no image attached.
    Default,
    /// Image attached as base64 PNG.
    Custom,
}

/// Emitted to the streaming layer when the cursor shape changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorChanged {
    pub cursor: PointerCursor,
    pub image_base64: Option<String>,
    pub hotspot_x: u16,
    pub hotspot_y: u16,
}

/// Native cursor image as handed over by a source.
#[derive(Debug, Clone)]
pub struct CursorImage {
    pub bitmap: Bitmap,
    pub hotspot_x: f64,
    pub hotspot_y: f64,
    /// Backing scale of the display under the pointer; 1.0 when unknown.
    pub scale_factor: f64,
}

#[async_trait]
pub trait CursorSource: Send {
    type Key: PartialEq + Debug + Send;

    /// Acquire native resources. An error here stops the watcher.
    async fn open(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Identity of the current shape, `None` if no cursor is available.
    async fn current_key(&mut self) -> Result<Option<Self::Key>, CaptureError>;

    /// Image for the shape last returned by `current_key`.
    async fn current_image(&mut self) -> Result<Option<CursorImage>, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Stopped,
}

/// Target size after dividing by `scale`, or `None` when no resize is needed.
pub fn normalized_size(width: u32, height: u32, scale: f64) -> Option<(u32, u32)> {
    if !(scale > SCALE_EPSILON) {
        return None;
    }
    let w = ((width as f64 / scale).round() as u32).max(1);
    let h = ((height as f64 / scale).round() as u32).max(1);
    if w == width && h == height {
        return None;
    }
    Some((w, h))
}

/// Downscale a backing-resolution cursor to logical pixels.
pub fn normalize_for_scale(bitmap: &Bitmap, scale: f64) -> Option<Bitmap> {
    normalized_size(bitmap.width(), bitmap.height(), scale).map(|(w, h)| bitmap.resized(w, h))
}

pub fn encode_base64_png(bitmap: &Bitmap) -> Result<String, CaptureError> {
    let png = bitmap.encode_png()?;
    Ok(STANDARD.encode(&png))
}

/// Round and clamp a hotspot coordinate into the wire range.
pub fn clamp_hotspot(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

/// Suppresses re-emission of a payload identical to the previous one.
///
/// Only the encoded image is compared. A shape whose hotspot moved but
/// whose pixels did not is not re-emitted.
#[derive(Debug, Default)]
pub struct CursorDeduper {
    last: Option<String>,
}

impl CursorDeduper {
    /// Records `payload` and returns true when it differs from the last one.
    pub fn should_emit(&mut self, payload: &Option<String>) -> bool {
        if *payload == self.last {
            return false;
        }
        self.last = payload.clone();
        true
    }
}

pub struct CursorWatcher<S: CursorSource> {
    source: S,
    period: Duration,
    events: mpsc::Sender<CursorChanged>,
    last_key: Option<S::Key>,
    deduper: CursorDeduper,
    state: WatcherState,
}

impl<S: CursorSource> CursorWatcher<S> {
    pub fn new(source: S, period: Duration, events: mpsc::Sender<CursorChanged>) -> Self {
        Self {
            source,
            period,
            events,
            last_key: None,
            deduper: CursorDeduper::default(),
            state: WatcherState::Idle,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// One poll. `Ok(None)` means unchanged.
    pub async fn tick(&mut self) -> Result<Option<CursorChanged>, CaptureError> {
        let Some(key) = self.source.current_key().await? else {
            return Ok(None);
        };
        if self.last_key.as_ref() == Some(&key) {
            return Ok(None);
        }
        self.last_key = Some(key);

        let event = match self.source.current_image().await? {
            Some(image) => {
                let normalized = normalize_for_scale(&image.bitmap, image.scale_factor);
                let bitmap = normalized.as_ref().unwrap_or(&image.bitmap);
                let payload = match encode_base64_png(bitmap) {
                    Ok(encoded) => Some(encoded),
                    Err(err) => {
                        warn!(error = %err, "failed to encode cursor image");
                        None
                    }
                };
                CursorChanged {
                    cursor: if payload.is_some() {
                        PointerCursor::Custom
                    } else {
                        PointerCursor::Default
                    },
                    image_base64: payload,
                    hotspot_x: clamp_hotspot(image.hotspot_x),
                    hotspot_y: clamp_hotspot(image.hotspot_y),
                }
            }
            None => CursorChanged {
                cursor: PointerCursor::Default,
                image_base64: None,
                hotspot_x: 0,
                hotspot_y: 0,
            },
        };

        if !self.deduper.should_emit(&event.image_base64) {
            return Ok(None);
        }
        Ok(Some(event))
    }

    /// Poll until shutdown, a fatal source error, or the receiver going away.
    pub async fn run(&mut self, shutdown: Shutdown) {
        if let Err(err) = self.source.open().await {
            error!(error = %err, "cursor watcher could not start");
            self.state = WatcherState::Stopped;
            return;
        }
        self.state = WatcherState::Watching;
        info!(period_ms = self.period.as_millis() as u64, "cursor watcher started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = interval.tick() => {}
            }
            match self.tick().await {
                Ok(Some(event)) => {
                    debug!(cursor = ?event.cursor, "cursor changed");
                    if self.events.send(event).await.is_err() {
                        debug!("cursor event receiver dropped");
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "cursor watcher lost its native connection");
                    break;
                }
                Err(err) => debug!(error = %err, "cursor poll failed"),
            }
        }

        self.state = WatcherState::Stopped;
        info!("cursor watcher stopped");
    }
}
