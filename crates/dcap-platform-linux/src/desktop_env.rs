#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopEnvironment {
    GNOME,
    KDE,
    Sway,
    Hyprland,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    X11,
    Wayland,
    Headless,
}

/// Desktop session detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopEnvironmentInfo {
    pub de: DesktopEnvironment,
    pub session_type: SessionType,
    /// An X server (native or XWayland) is reachable for cursor tracking.
    pub has_x_display: bool,
}

impl DesktopEnvironmentInfo {
    /// Detect from the process environment
    pub fn detect() -> Self {
        Self::detect_with(|key| std::env::var(key).ok())
    }

    pub fn detect_with(var: impl Fn(&str) -> Option<String>) -> Self {
        let de = var("XDG_CURRENT_DESKTOP")
            .or_else(|| var("DESKTOP_SESSION"))
            .map(|s| {
                let s_lower = s.to_lowercase();
                if s_lower.contains("gnome") {
                    DesktopEnvironment::GNOME
                } else if s_lower.contains("kde") || s_lower.contains("plasma") {
                    DesktopEnvironment::KDE
                } else if s_lower.contains("sway") {
                    DesktopEnvironment::Sway
                } else if s_lower.contains("hyprland") {
                    DesktopEnvironment::Hyprland
                } else {
                    DesktopEnvironment::Unknown
                }
            })
            .unwrap_or(DesktopEnvironment::Unknown);

        let has_x_display = var("DISPLAY").is_some_and(|d| !d.is_empty());
        let declared = var("XDG_SESSION_TYPE").map(|s| s.to_lowercase());
        let session_type = match declared.as_deref() {
            Some("wayland") => SessionType::Wayland,
            Some("x11") => SessionType::X11,
            _ if var("WAYLAND_DISPLAY").is_some() => SessionType::Wayland,
            _ if has_x_display => SessionType::X11,
            _ => SessionType::Headless,
        };

        Self {
            de,
            session_type,
            has_x_display,
        }
    }

    /// Screen capture goes through the ScreenCast portal.
    pub fn requires_portal(&self) -> bool {
        self.session_type == SessionType::Wayland
    }

    pub fn can_track_cursor(&self) -> bool {
        self.has_x_display
    }
}
