//! [`ScreenCastPortal`] backed by `org.freedesktop.portal.ScreenCast`.

use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
use ashpd::desktop::{PersistMode, Session};
use ashpd::enumflags2::BitFlags;
use ashpd::WindowIdentifier;
use async_trait::async_trait;
use dcap_core::CaptureError;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::portal::{PipeWireFd, ScreenCastPortal, ScreenCastStream, PROP_POSITION, PROP_SIZE};
use crate::tuple::PortalValue;

struct ActiveSession {
    _session: Session<'static, Screencast<'static>>,
    _proxy: Screencast<'static>,
    streams: Vec<ScreenCastStream>,
    fd: PipeWireFd,
}

/// Negotiates one ScreenCast session on first use and keeps it open.
///
/// All monitors are requested with the cursor embedded in the stream.
#[derive(Default)]
pub struct XdgScreenCastPortal {
    restore_token: Option<String>,
    session: Mutex<Option<ActiveSession>>,
}

fn portal_error(context: &str, err: ashpd::Error) -> CaptureError {
    CaptureError::NativeCallFailure(format!("{context}: {err}"))
}

impl XdgScreenCastPortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse a previous grant instead of prompting the user again.
    pub fn with_restore_token(token: impl Into<String>) -> Self {
        Self {
            restore_token: Some(token.into()),
            session: Mutex::new(None),
        }
    }

    async fn active(&self) -> Result<MutexGuard<'_, Option<ActiveSession>>, CaptureError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.start_session().await?);
        }
        Ok(guard)
    }

    async fn start_session(&self) -> Result<ActiveSession, CaptureError> {
        info!("creating ScreenCast portal session");
        let proxy = Screencast::new()
            .await
            .map_err(|e| portal_error("ScreenCast proxy", e))?;
        let session = proxy
            .create_session()
            .await
            .map_err(|e| portal_error("create_session", e))?;

        let sources: BitFlags<SourceType> = SourceType::Monitor.into();
        proxy
            .select_sources(
                &session,
                CursorMode::Embedded,
                sources,
                true,
                self.restore_token.as_deref(),
                PersistMode::DoNot,
            )
            .await
            .map_err(|e| portal_error("select_sources", e))?;

        let response = proxy
            .start(&session, &WindowIdentifier::default())
            .await
            .map_err(|e| portal_error("start", e))?
            .response()
            .map_err(|e| portal_error("start response", e))?;

        let streams: Vec<ScreenCastStream> = response
            .streams()
            .iter()
            .enumerate()
            .map(|(index, stream)| {
                let mut converted = ScreenCastStream::new(index as u32, stream.pipe_wire_node_id());
                if let Some((w, h)) = stream.size() {
                    converted = converted.with_property(PROP_SIZE, PortalValue::TupleI32(w, h));
                }
                if let Some((x, y)) = stream.position() {
                    converted = converted.with_property(PROP_POSITION, PortalValue::TupleI32(x, y));
                }
                converted
            })
            .collect();
        debug!(?streams, "portal granted streams");

        let fd = proxy
            .open_pipe_wire_remote(&session)
            .await
            .map_err(|e| portal_error("open_pipe_wire_remote", e))?;
        info!(streams = streams.len(), "ScreenCast portal session started");

        Ok(ActiveSession {
            _session: session,
            _proxy: proxy,
            streams,
            fd: PipeWireFd::new(fd),
        })
    }
}

#[async_trait]
impl ScreenCastPortal for XdgScreenCastPortal {
    async fn screencast_streams(&self) -> Result<Vec<ScreenCastStream>, CaptureError> {
        let guard = self.active().await?;
        Ok(guard.as_ref().map(|s| s.streams.clone()).unwrap_or_default())
    }

    async fn pipewire_connection(&self) -> Result<Option<PipeWireFd>, CaptureError> {
        let guard = self.active().await?;
        Ok(guard.as_ref().map(|s| s.fd.clone()))
    }

    /// Input injection negotiates its own RemoteDesktop session.
    async fn remote_desktop_session_handle(&self) -> Result<Option<String>, CaptureError> {
        Ok(None)
    }
}
