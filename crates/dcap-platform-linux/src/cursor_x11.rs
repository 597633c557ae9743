//! Cursor shape source backed by the X11 XFixes extension.
//!
//! Works on X11 sessions and on Wayland sessions through XWayland.

use std::sync::Arc;

use async_trait::async_trait;
use dcap_core::bitmap::Bitmap;
use dcap_core::cursor::{CursorImage, CursorSource};
use dcap_core::CaptureError;
use tracing::{debug, info};
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xfixes::{ConnectionExt as _, GetCursorImageReply};
use x11rb::rust_connection::RustConnection;

fn connection_error(err: ConnectionError) -> CaptureError {
    CaptureError::Disconnected(format!("X11 connection: {err}"))
}

fn reply_error(context: &str, err: ReplyError) -> CaptureError {
    match err {
        ReplyError::ConnectionError(err) => connection_error(err),
        ReplyError::X11Error(err) => CaptureError::NativeCallFailure(format!("{context}: {err:?}")),
    }
}

/// Run a blocking X11 round trip on the blocking thread pool.
async fn blocking<T, F>(op: &'static str, f: F) -> Result<T, CaptureError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CaptureError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CaptureError::NativeCallFailure(format!("{op} task failed: {e}")))?
}

/// Convert XFixes ARGB pixels (one per `u32`) to straight BGRA bytes.
///
/// Fully transparent pixels are zeroed.
pub fn argb_to_bgra(pixels: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 4);
    for &argb in pixels {
        let a = (argb >> 24) as u8;
        if a == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            out.extend_from_slice(&[argb as u8, (argb >> 8) as u8, (argb >> 16) as u8, a]);
        }
    }
    out
}

/// Build a cursor image from XFixes reply fields. `None` if there are no
/// usable pixels.
pub fn cursor_image_from_argb(
    width: u16,
    height: u16,
    xhot: u16,
    yhot: u16,
    pixels: &[u32],
) -> Option<CursorImage> {
    let (w, h) = (u32::from(width), u32::from(height));
    let count = (w * h) as usize;
    if count == 0 || pixels.len() < count {
        debug!(width = w, height = h, pixels = pixels.len(), "unusable cursor image");
        return None;
    }
    let bitmap = Bitmap::from_vec(w, h, argb_to_bgra(&pixels[..count])).ok()?;
    Some(CursorImage {
        bitmap,
        hotspot_x: f64::from(xhot),
        hotspot_y: f64::from(yhot),
        scale_factor: 1.0,
    })
}

/// Keyed by the XFixes cursor serial.
#[derive(Default)]
pub struct X11CursorSource {
    display: Option<String>,
    conn: Option<Arc<RustConnection>>,
    pending: Option<GetCursorImageReply>,
}

impl X11CursorSource {
    /// Connect to `display`, or to `$DISPLAY` when `None`.
    pub fn new(display: Option<String>) -> Self {
        Self {
            display,
            ..Self::default()
        }
    }

    fn conn(&self) -> Result<Arc<RustConnection>, CaptureError> {
        self.conn
            .clone()
            .ok_or_else(|| CaptureError::Disconnected("X11 display not open".to_string()))
    }
}

#[async_trait]
impl CursorSource for X11CursorSource {
    type Key = u32;

    async fn open(&mut self) -> Result<(), CaptureError> {
        let display = self.display.clone();
        let (conn, version) = blocking("XFixesQueryVersion", move || {
            let (conn, _screen) = RustConnection::connect(display.as_deref()).map_err(|e| {
                CaptureError::NativeCallFailure(format!("failed to open X display: {e}"))
            })?;
            let version = conn
                .xfixes_query_version(5, 0)
                .map_err(connection_error)?
                .reply()
                .map_err(|e| match e {
                    ReplyError::ConnectionError(err) => connection_error(err),
                    ReplyError::X11Error(_) => CaptureError::PlatformNotSupported(
                        "XFixes extension not available".to_string(),
                    ),
                })?;
            Ok((conn, version))
        })
        .await?;
        info!(
            major = version.major_version,
            minor = version.minor_version,
            "XFixes cursor tracking enabled"
        );
        self.conn = Some(Arc::new(conn));
        Ok(())
    }

    async fn current_key(&mut self) -> Result<Option<u32>, CaptureError> {
        let conn = self.conn()?;
        let reply = blocking("XFixesGetCursorImage", move || {
            conn.xfixes_get_cursor_image()
                .map_err(connection_error)?
                .reply()
                .map_err(|e| reply_error("XFixesGetCursorImage", e))
        })
        .await?;
        let serial = reply.cursor_serial;
        self.pending = Some(reply);
        Ok(Some(serial))
    }

    async fn current_image(&mut self) -> Result<Option<CursorImage>, CaptureError> {
        Ok(self.pending.take().and_then(|reply| {
            cursor_image_from_argb(
                reply.width,
                reply.height,
                reply.xhot,
                reply.yhot,
                &reply.cursor_image,
            )
        }))
    }
}
