//! Outcome of a single capture request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::errors::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureMode {
    Gdi,
    CoreGraphics,
    WaylandPipeWire,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Gdi => "Gdi",
            CaptureMode::CoreGraphics => "CoreGraphics",
            CaptureMode::WaylandPipeWire => "WaylandPipeWire",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged capture outcome.
///
/// `NoChanges` is not a failure: the source has nothing newer than the last
/// read and the caller should reuse its previous frame.
#[derive(Debug)]
pub enum CaptureResult {
    Ok { bitmap: Bitmap, mode: CaptureMode },
    NoChanges { mode: CaptureMode },
    Fail(CaptureError),
}

impl CaptureResult {
    pub fn ok(bitmap: Bitmap, mode: CaptureMode) -> Self {
        CaptureResult::Ok { bitmap, mode }
    }

    pub fn fail(err: impl Into<CaptureError>) -> Self {
        CaptureResult::Fail(err.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CaptureResult::Ok { .. })
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            CaptureResult::Ok { bitmap, .. } => Some(bitmap),
            _ => None,
        }
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        match self {
            CaptureResult::Ok { mode, .. } | CaptureResult::NoChanges { mode } => Some(*mode),
            CaptureResult::Fail(_) => None,
        }
    }

    /// Failure reason, if any.
    pub fn error(&self) -> Option<&CaptureError> {
        match self {
            CaptureResult::Fail(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse into a `Result`, mapping `NoChanges` to [`CaptureError::NoChangesAvailable`].
    pub fn into_bitmap(self) -> Result<Bitmap, CaptureError> {
        match self {
            CaptureResult::Ok { bitmap, .. } => Ok(bitmap),
            CaptureResult::NoChanges { .. } => Err(CaptureError::NoChangesAvailable),
            CaptureResult::Fail(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_are_stable() {
        assert_eq!(CaptureMode::WaylandPipeWire.to_string(), "WaylandPipeWire");
        assert_eq!(CaptureMode::CoreGraphics.as_str(), "CoreGraphics");
        assert_eq!(CaptureMode::Gdi.as_str(), "Gdi");
    }

    #[test]
    fn no_changes_is_not_a_failure() {
        let result = CaptureResult::NoChanges {
            mode: CaptureMode::WaylandPipeWire,
        };
        assert!(result.error().is_none());
        assert_eq!(result.mode(), Some(CaptureMode::WaylandPipeWire));
        assert_eq!(result.into_bitmap().unwrap_err(), CaptureError::NoChangesAvailable);
    }

    #[test]
    fn ok_exposes_bitmap() {
        let result = CaptureResult::ok(Bitmap::new(2, 2), CaptureMode::Gdi);
        assert!(result.is_ok());
        assert_eq!(result.bitmap().map(|b| b.width()), Some(2));
    }
}
