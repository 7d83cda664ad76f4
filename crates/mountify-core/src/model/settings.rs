/// Application settings. The core reads the timeout, default port,
/// notification toggle and autostart flag; the rest is carried for the front
/// end.
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub start_with_windows: bool,
    pub start_minimized: bool,
    pub minimize_to_tray: bool,
    pub show_notifications: bool,
    /// Connectivity probe bound in milliseconds.
    #[serde(rename = "connectionTimeout")]
    pub connection_timeout_ms: u64,
    pub default_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_with_windows: false,
            start_minimized: false,
            minimize_to_tray: true,
            show_notifications: true,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            default_port: 22,
        }
    }
}

impl Settings {
    /// Connectivity bound. Zero means "not set" and uses the default.
    pub fn connection_timeout(&self) -> Duration {
        match self.connection_timeout_ms {
            0 => Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }
}
