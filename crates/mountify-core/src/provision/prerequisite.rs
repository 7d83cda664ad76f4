/// The two OS components a mapping needs: the WinFsp filesystem proxy and
/// the SSHFS-Win client shim.
///
/// Presence is a plain file-existence check on each package's main
/// executable. No registry or service probing.
use serde::Serialize;
use std::path::PathBuf;

pub const WINFSP_URL: &str =
    "https://github.com/winfsp/winfsp/releases/download/v2.0/winfsp-2.0.23075.msi";
pub const SSHFS_WIN_URL: &str =
    "https://github.com/winfsp/sshfs-win/releases/download/v3.7.21011/sshfs-win-3.7.21011-x64.msi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisite {
    /// Short machine key: `winfsp` or `sshfs`.
    pub key: &'static str,
    /// Product name as it appears in Add/Remove Programs.
    pub name: &'static str,
    pub url: String,
    /// File name of the downloaded installer in the temp directory.
    pub installer_file: &'static str,
    /// Executable whose existence means "installed".
    pub probe_path: PathBuf,
}

/// Result of one presence check. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyState {
    pub key: &'static str,
    pub name: &'static str,
    pub installed: bool,
}

impl Prerequisite {
    /// WinFsp installs under `Program Files (x86)` on 64-bit Windows.
    pub fn winfsp() -> Self {
        let root = env_dir("ProgramFiles(x86)")
            .or_else(|| env_dir("ProgramFiles"))
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
        Self {
            key: "winfsp",
            name: "WinFsp",
            url: WINFSP_URL.to_string(),
            installer_file: "winfsp.msi",
            probe_path: root.join("WinFsp").join("bin").join("launchctl-x64.exe"),
        }
    }

    pub fn sshfs_win() -> Self {
        let root =
            env_dir("ProgramFiles").unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
        Self {
            key: "sshfs",
            name: "SSHFS-Win",
            url: SSHFS_WIN_URL.to_string(),
            installer_file: "sshfs-win.msi",
            probe_path: root.join("SSHFS-Win").join("bin").join("sshfs-win.exe"),
        }
    }

    /// Both prerequisites, in install order (the driver before the shim).
    pub fn defaults() -> Vec<Self> {
        vec![Self::winfsp(), Self::sshfs_win()]
    }

    pub fn with_probe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.probe_path = path.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn is_installed(&self) -> bool {
        self.probe_path.exists()
    }

    pub fn state(&self) -> DependencyState {
        DependencyState {
            key: self.key,
            name: self.name,
            installed: self.is_installed(),
        }
    }

    /// Accepts either the product name or the short key, any case.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name) || self.key.eq_ignore_ascii_case(name)
    }
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
