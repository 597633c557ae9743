#![allow(unsafe_code)] // Windows API calls require unsafe.

use dcap_core::display::normalize_displays;
use dcap_core::geometry::logical_from_physical;
use dcap_core::{DisplayInfo, Rect};
use thiserror::Error;
use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::{Foundation::*, Graphics::Gdi::*};

/// Pixels per logical inch at 100% scaling.
pub const BASE_DPI: f64 = 96.0;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("EnumDisplayMonitors failed")]
    EnumerationFailed,
}

/// Raw facts gathered for one monitor during enumeration.
#[derive(Debug, Clone)]
pub struct MonitorRecord {
    pub device_name: String,
    pub bounds: Rect,
    pub work_area: Rect,
    pub is_primary: bool,
    /// `dmLogPixels` of the current display mode, 0 when unknown.
    pub log_pixels: u16,
}

impl MonitorRecord {
    pub fn scale_factor(&self) -> f64 {
        if self.log_pixels == 0 {
            1.0
        } else {
            f64::from(self.log_pixels) / BASE_DPI
        }
    }

    pub fn into_display(self, index: usize) -> DisplayInfo {
        let scale = self.scale_factor();
        DisplayInfo {
            logical_monitor_area: logical_from_physical(self.bounds, scale),
            display_name: format!("Display {}", index + 1),
            index,
            is_primary: self.is_primary,
            monitor_area: self.bounds,
            scale_factor: scale,
            work_area: self.work_area,
            device_name: self.device_name,
        }
    }
}

fn rect_from_win(rc: RECT) -> Rect {
    Rect::from_edges(rc.left, rc.top, rc.right, rc.bottom)
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

unsafe extern "system" fn enum_proc(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _lprect: *mut RECT,
    lparam: LPARAM,
) -> windows::core::BOOL {
    let records = &mut *(lparam.0 as *mut Vec<MonitorRecord>);

    let mut info = MONITORINFOEXW {
        monitorInfo: MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFOEXW>() as u32,
            ..Default::default()
        },
        szDevice: [0u16; 32],
    };

    if !GetMonitorInfoW(hmonitor, &mut info.monitorInfo).as_bool() {
        return windows::core::BOOL::from(true); // Continue enumeration
    }

    let mut mode = DEVMODEW {
        dmSize: std::mem::size_of::<DEVMODEW>() as u16,
        ..Default::default()
    };
    let log_pixels = if EnumDisplaySettingsW(
        PCWSTR(info.szDevice.as_ptr()),
        ENUM_CURRENT_SETTINGS,
        &mut mode,
    )
    .as_bool()
    {
        mode.dmLogPixels
    } else {
        0
    };

    records.push(MonitorRecord {
        device_name: wide_to_string(&info.szDevice),
        bounds: rect_from_win(info.monitorInfo.rcMonitor),
        work_area: rect_from_win(info.monitorInfo.rcWork),
        is_primary: (info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY) != 0,
        log_pixels,
    });

    windows::core::BOOL::from(true) // Continue enumeration
}

/// Enumerate attached monitors in system order.
pub fn enumerate_displays() -> Result<Vec<DisplayInfo>, MonitorError> {
    let mut records: Vec<MonitorRecord> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            None,
            None,
            Some(enum_proc),
            LPARAM(&mut records as *mut _ as isize),
        )
    };
    if !ok.as_bool() {
        return Err(MonitorError::EnumerationFailed);
    }
    debug!(count = records.len(), "monitors enumerated");
    let displays = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.into_display(index))
        .collect();
    Ok(normalize_displays(displays))
}
