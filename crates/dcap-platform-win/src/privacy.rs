#![allow(unsafe_code)] // Windows API calls require unsafe.

//! Black overlay that hides the local screen but is skipped by capture.

use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle};

use dcap_core::{CaptureError, Rect};
use thiserror::Error;
use tracing::{debug, info, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Gdi::{GetStockObject, BLACK_BRUSH, HBRUSH};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::*;

const CLASS_NAME: PCWSTR = w!("DcapPrivacyScreen");

#[derive(Debug, Error)]
pub enum PrivacyError {
    #[error("privacy window creation failed: {0}")]
    Create(#[from] windows::core::Error),
    #[error("privacy window thread exited before reporting")]
    ThreadExited,
    #[error("privacy screen state lock poisoned")]
    Poisoned,
}

impl From<PrivacyError> for CaptureError {
    fn from(err: PrivacyError) -> Self {
        CaptureError::NativeCallFailure(err.to_string())
    }
}

struct Overlay {
    /// HWND value; window handles are process-global so passing it across
    /// threads as an integer is sound.
    hwnd: isize,
    thread: JoinHandle<()>,
}

/// Owns at most one overlay window and the thread pumping its messages.
#[derive(Default)]
pub struct PrivacyScreen {
    overlay: Mutex<Option<Overlay>>,
}

impl PrivacyScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shown(&self) -> bool {
        self.overlay.lock().map(|o| o.is_some()).unwrap_or(false)
    }

    /// Cover `bounds` (virtual-desktop pixels). No-op when already shown.
    pub fn show(&self, bounds: Rect) -> Result<(), PrivacyError> {
        let mut overlay = self.overlay.lock().map_err(|_| PrivacyError::Poisoned)?;
        if overlay.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("privacy-screen".into())
            .spawn(move || unsafe { run_overlay(bounds, tx) })
            .map_err(|_| PrivacyError::ThreadExited)?;

        match rx.recv() {
            Ok(Ok(hwnd)) => {
                info!(?bounds, "privacy screen shown");
                *overlay = Some(Overlay { hwnd, thread });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(PrivacyError::Create(err))
            }
            Err(_) => {
                let _ = thread.join();
                Err(PrivacyError::ThreadExited)
            }
        }
    }

    pub fn hide(&self) -> Result<(), PrivacyError> {
        let Some(overlay) = self.overlay.lock().map_err(|_| PrivacyError::Poisoned)?.take() else {
            return Ok(());
        };
        let hwnd = HWND(overlay.hwnd as *mut _);
        if let Err(err) = unsafe { PostMessageW(Some(hwnd), WM_CLOSE, WPARAM(0), LPARAM(0)) } {
            warn!(error = %err, "failed to close privacy window");
        }
        if overlay.thread.join().is_err() {
            warn!("privacy window thread panicked");
        }
        info!("privacy screen hidden");
        Ok(())
    }
}

impl Drop for PrivacyScreen {
    fn drop(&mut self) {
        let _ = self.hide();
    }
}

unsafe extern "system" fn overlay_wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_DESTROY => {
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

unsafe fn create_overlay(bounds: Rect) -> windows::core::Result<HWND> {
    let hinstance: HINSTANCE = GetModuleHandleW(None)?.into();

    let wc = WNDCLASSW {
        lpfnWndProc: Some(overlay_wnd_proc),
        hInstance: hinstance,
        lpszClassName: CLASS_NAME,
        hbrBackground: HBRUSH(GetStockObject(BLACK_BRUSH).0),
        ..Default::default()
    };
    // Zero on the second registration in the same process; creation still works.
    RegisterClassW(&wc);

    let hwnd = CreateWindowExW(
        WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_LAYERED | WS_EX_TRANSPARENT,
        CLASS_NAME,
        PCWSTR::null(),
        WS_POPUP,
        bounds.x,
        bounds.y,
        bounds.width,
        bounds.height,
        None,
        None,
        Some(hinstance),
        None,
    )?;

    let configured = SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA)
        .and_then(|_| SetWindowDisplayAffinity(hwnd, WDA_EXCLUDEFROMCAPTURE));
    if let Err(err) = configured {
        let _ = DestroyWindow(hwnd);
        return Err(err);
    }

    let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);
    Ok(hwnd)
}

unsafe fn run_overlay(bounds: Rect, ready: mpsc::Sender<windows::core::Result<isize>>) {
    let hwnd = match create_overlay(bounds) {
        Ok(hwnd) => hwnd,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(hwnd.0 as isize)).is_err() {
        let _ = DestroyWindow(hwnd);
        return;
    }

    let mut msg = MSG::default();
    while GetMessageW(&mut msg, None, 0, 0).as_bool() {
        let _ = TranslateMessage(&msg);
        DispatchMessageW(&msg);
    }
    debug!("privacy window message loop ended");
}
