//! Seam to the XDG desktop portal.
//!
//! The portal session is negotiated elsewhere (user consent dialog, restore
//! tokens). Capture code only needs the granted streams, the PipeWire remote
//! and, for input injection, the RemoteDesktop session handle.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use async_trait::async_trait;
use dcap_core::CaptureError;

use crate::tuple::{try_parse_tuple2, PortalValue};

/// Property key of the logical stream size.
pub const PROP_SIZE: &str = "size";
/// Property key of the logical stream position.
pub const PROP_POSITION: &str = "position";

/// One ScreenCast stream granted by the portal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenCastStream {
    /// Order in which the portal listed the stream.
    pub stream_index: u32,
    pub node_id: u32,
    pub properties: HashMap<String, PortalValue>,
}

impl ScreenCastStream {
    pub fn new(stream_index: u32, node_id: u32) -> Self {
        Self {
            stream_index,
            node_id,
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PortalValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Logical size in compositor coordinates.
    pub fn size(&self) -> Option<(i32, i32)> {
        self.properties.get(PROP_SIZE).and_then(try_parse_tuple2)
    }

    /// Logical position in compositor coordinates.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.properties.get(PROP_POSITION).and_then(try_parse_tuple2)
    }
}

/// File descriptor of the PipeWire remote opened through the portal.
///
/// Shared by every stream of the session; closed when the last clone drops.
#[derive(Debug, Clone)]
pub struct PipeWireFd(Arc<OwnedFd>);

impl PipeWireFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self(Arc::new(fd))
    }

    pub fn raw(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

#[async_trait]
pub trait ScreenCastPortal: Send + Sync {
    /// Streams granted for the current session, in portal order.
    async fn screencast_streams(&self) -> Result<Vec<ScreenCastStream>, CaptureError>;

    /// PipeWire remote for the session, `None` before a session exists.
    async fn pipewire_connection(&self) -> Result<Option<PipeWireFd>, CaptureError>;

    /// RemoteDesktop session handle used by input injection.
    async fn remote_desktop_session_handle(&self) -> Result<Option<String>, CaptureError>;
}
