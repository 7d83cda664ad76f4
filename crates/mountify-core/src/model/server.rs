/// A configured remote SFTP share and the drive letter it maps to.
use serde::{Deserialize, Serialize};

/// Drive letter used when a profile leaves the field blank.
pub const DEFAULT_DRIVE_LETTER: char = 'S';
/// Standard SSH port.
pub const DEFAULT_PORT: u16 = 22;
/// Remote directory used when a profile leaves the field blank.
pub const DEFAULT_REMOTE_PATH: &str = "/";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProfile {
    /// Stable identifier, assigned once by the registry. Empty means "new".
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Opaque secret. Never logged; `Debug` prints a placeholder.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub drive_letter: String,
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    #[serde(default)]
    pub drive_label: String,
    #[serde(default)]
    pub auto_mount: bool,
    /// Last verified state. Only the mount controller writes this.
    #[serde(default)]
    pub is_mounted: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_remote_path() -> String {
    DEFAULT_REMOTE_PATH.to_string()
}

impl ServerProfile {
    /// Build a new, unsaved profile with defaults for the optional fields.
    pub fn new(name: &str, host: &str, username: &str) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            host: host.to_string(),
            port: DEFAULT_PORT,
            username: username.to_string(),
            password: String::new(),
            drive_letter: DEFAULT_DRIVE_LETTER.to_string(),
            remote_path: default_remote_path(),
            drive_label: String::new(),
            auto_mount: false,
            is_mounted: false,
        }
    }

    /// The configured drive letter, uppercased, or `S` when blank or invalid.
    pub fn effective_drive_letter(&self) -> char {
        self.drive_letter
            .trim()
            .trim_end_matches(':')
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or(DEFAULT_DRIVE_LETTER)
    }

    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_PORT
        } else {
            self.port
        }
    }

    pub fn effective_remote_path(&self) -> &str {
        if self.remote_path.is_empty() {
            DEFAULT_REMOTE_PATH
        } else {
            &self.remote_path
        }
    }
}

impl std::fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("drive_letter", &self.drive_letter)
            .field("remote_path", &self.remote_path)
            .field("auto_mount", &self.auto_mount)
            .field("is_mounted", &self.is_mounted)
            .finish()
    }
}
