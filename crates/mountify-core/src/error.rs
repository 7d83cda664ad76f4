/// Error taxonomy for the mount lifecycle and provisioning engine.
///
/// Every variant renders a user-readable message. Messages built from OS
/// command output are redacted before they reach these types, so a password
/// can never leak through `Display`.
use std::time::Duration;
use thiserror::Error;

/// Failures reading or writing the persisted server registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("registry document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no configuration directory available on this system")]
    NoConfigDir,
}

/// Failures spawning or waiting on an OS process.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with code {code}: {stderr}")]
    NonZero {
        program: String,
        code: i32,
        stderr: String,
    },
}

/// Failures of a mount or unmount operation.
#[derive(Debug, Error)]
pub enum MountError {
    /// Unknown server id. Terminal, never retried.
    #[error("Server not found")]
    NotFound,
    /// Another mount/unmount for the same server is already running.
    #[error("Another operation is already in progress for this server")]
    Busy,
    /// A profile field would corrupt the mapping target.
    #[error("Invalid server profile: {0}")]
    InvalidProfile(String),
    /// The OS command exited non-zero. The message is already redacted.
    #[error("{0}")]
    ExecFailure(String),
    /// The command claimed success but the follow-up query disagreed.
    #[error("{0}")]
    VerificationFailure(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failures downloading a prerequisite installer.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("download of {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("downloaded file from {0} is empty")]
    Empty(String),
}

/// Failures of the dependency provisioner.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to download {name}: {source}")]
    DownloadFailure {
        name: String,
        #[source]
        source: DownloadError,
    },
    #[error("Installation failed with code {code}. stderr: {stderr_tail}")]
    InstallFailure { code: i32, stderr_tail: String },
    #[error("Unknown dependency: {0}")]
    UnknownPrerequisite(String),
    #[error("Failed to uninstall {name}: {source}")]
    Uninstall {
        name: String,
        #[source]
        source: ExecError,
    },
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Failures of a TCP reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Connection timeout")]
    Timeout,
    #[error("Cannot reach server or port is not accessible")]
    Unreachable,
    #[error("Cannot resolve host {0}")]
    Resolve(String),
}
