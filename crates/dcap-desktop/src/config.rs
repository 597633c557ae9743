use std::path::{Path, PathBuf};

use dcap_core::config::CaptureTimeouts;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    // Capture settings
    pub capture_fps: u32,
    pub capture_cursor: bool,
    /// When false only the primary display is captured.
    pub capture_all_displays: bool,
    /// First successful capture is written here as PNG.
    pub snapshot_path: Option<PathBuf>,

    // Logging
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub log_json: bool,

    pub timeouts: CaptureTimeouts,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            capture_fps: 10,
            capture_cursor: true,
            capture_all_displays: false,
            snapshot_path: None,
            log_level: "info".to_string(),
            log_file: None,
            log_json: false,
            timeouts: CaptureTimeouts::default(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl DesktopConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {e}", path.display())))?;

        let config: DesktopConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        Self::load_from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whichever `DCAP_*` variables `var` yields.
    /// Unparseable values are ignored.
    pub fn load_from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(fps) = var("DCAP_CAPTURE_FPS").and_then(|v| v.parse::<u32>().ok()) {
            config.capture_fps = fps;
        }
        if let Some(cursor) = var("DCAP_CAPTURE_CURSOR").as_deref().and_then(parse_bool) {
            config.capture_cursor = cursor;
        }
        if let Some(all) = var("DCAP_CAPTURE_ALL").as_deref().and_then(parse_bool) {
            config.capture_all_displays = all;
        }
        if let Some(path) = var("DCAP_SNAPSHOT").filter(|p| !p.is_empty()) {
            config.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("DCAP_LOG_FILE").filter(|p| !p.is_empty()) {
            config.log_file = Some(PathBuf::from(path));
        }
        if let Some(level) = var("RUST_LOG") {
            config.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_fps == 0 || self.capture_fps > 60 {
            return Err(ConfigError::ValidationError(
                "capture_fps must be between 1 and 60".to_string(),
            ));
        }
        self.timeouts
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("timeouts: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> DesktopConfig {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DesktopConfig::load_from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let config = DesktopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture_fps, 10);
        assert!(config.capture_cursor);
        assert!(!config.capture_all_displays);
    }

    #[test]
    fn env_overrides_defaults() {
        let config = from_vars(&[
            ("DCAP_CAPTURE_FPS", "30"),
            ("DCAP_CAPTURE_CURSOR", "off"),
            ("DCAP_CAPTURE_ALL", "1"),
            ("DCAP_SNAPSHOT", "/tmp/shot.png"),
            ("RUST_LOG", "debug"),
        ]);
        assert_eq!(config.capture_fps, 30);
        assert!(!config.capture_cursor);
        assert!(config.capture_all_displays);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/shot.png")));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn garbage_env_values_are_ignored() {
        let config = from_vars(&[("DCAP_CAPTURE_FPS", "fast"), ("DCAP_CAPTURE_CURSOR", "maybe")]);
        assert_eq!(config, DesktopConfig::default());
    }

    #[test]
    fn fps_out_of_range_is_rejected() {
        for fps in [0, 61] {
            let config = DesktopConfig {
                capture_fps: fps,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
        }
    }

    #[test]
    fn partial_toml_with_timeouts_table() {
        let config: DesktopConfig = toml::from_str(
            r#"
            capture_fps = 5
            capture_all_displays = true

            [timeouts]
            stream_start_ms = 6000
            "#,
        )
        .unwrap();
        assert_eq!(config.capture_fps, 5);
        assert!(config.capture_all_displays);
        assert_eq!(config.timeouts.stream_start_ms, 6000);
        assert_eq!(config.timeouts.display_lock_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_timeouts_fail_validation() {
        let mut config = DesktopConfig::default();
        config.timeouts.settings_poll_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("settings_poll_ms"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = DesktopConfig::load_from_file(Path::new("/nonexistent/dcap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
