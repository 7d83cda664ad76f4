/// Dependency provisioner: detects, installs and removes WinFsp and
/// SSHFS-Win.
///
/// Install is download-all-then-install-once: every missing package is
/// fetched first, then a single elevated PowerShell session runs `msiexec`
/// for each of them, so the user sees exactly one UAC prompt. Progress is
/// published on the `dependency-status` channel at every phase.
///
/// Install trusts the session's exit code. Uninstall deliberately does not:
/// native uninstallers often exit non-zero after removing the product, so a
/// finished uninstall is always reported as complete.
pub mod download;
pub mod prerequisite;
pub mod session;
pub mod uninstall;

pub use download::{Downloader, HttpDownloader};
pub use prerequisite::{DependencyState, Prerequisite};

use crate::error::{ExecError, ProvisionError};
use crate::events::{DependencyPhase, EventBus};
use crate::platform::{is_elevated, CommandRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bound on the whole elevated install session, UAC prompt included.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Bound on an uninstall session.
pub const UNINSTALL_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Bound on the uninstall-registry listing.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Lines of installer stderr kept in an `InstallFailure`.
const STDERR_TAIL_LINES: usize = 5;

/// File in the download directory the install session logs failures to.
pub const INSTALL_LOG_FILE: &str = "mountify-install.log";

pub struct DependencyProvisioner {
    prerequisites: Vec<Prerequisite>,
    downloader: Arc<dyn Downloader>,
    runner: Arc<dyn CommandRunner>,
    events: EventBus,
    download_dir: PathBuf,
    already_elevated: bool,
}

impl DependencyProvisioner {
    /// Provisioner for the standard prerequisites, downloading into the
    /// system temp directory.
    pub fn new(
        downloader: Arc<dyn Downloader>,
        runner: Arc<dyn CommandRunner>,
        events: EventBus,
    ) -> Self {
        Self {
            prerequisites: Prerequisite::defaults(),
            downloader,
            runner,
            events,
            download_dir: std::env::temp_dir(),
            already_elevated: is_elevated(),
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<Prerequisite>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Override the elevation state detected at construction.
    pub fn with_elevation(mut self, already_elevated: bool) -> Self {
        self.already_elevated = already_elevated;
        self
    }

    pub fn prerequisites(&self) -> &[Prerequisite] {
        &self.prerequisites
    }

    /// Probe every prerequisite now.
    pub fn check_all(&self) -> Vec<DependencyState> {
        let states: Vec<DependencyState> =
            self.prerequisites.iter().map(Prerequisite::state).collect();
        debug!("Dependency check: {:?}", states);
        states
    }

    pub fn all_installed(&self) -> bool {
        self.prerequisites.iter().all(Prerequisite::is_installed)
    }

    /// Download and install every missing prerequisite in one elevated
    /// session. Returns the names of the packages that were installed.
    pub fn install_missing(&self) -> Result<Vec<&'static str>, ProvisionError> {
        let result = self.try_install_missing();
        match &result {
            Ok(_) => self
                .events
                .dependency_status(DependencyPhase::Complete, "Installation complete!"),
            Err(e) => {
                error!("Dependency installation failed: {}", e);
                self.events
                    .dependency_status(DependencyPhase::Error, e.to_string());
            }
        }
        result
    }

    fn try_install_missing(&self) -> Result<Vec<&'static str>, ProvisionError> {
        let missing: Vec<&Prerequisite> = self
            .prerequisites
            .iter()
            .filter(|p| !p.is_installed())
            .collect();
        if missing.is_empty() {
            info!("All dependencies already installed");
            return Ok(Vec::new());
        }

        let mut installers: Vec<PathBuf> = Vec::with_capacity(missing.len());
        for prereq in &missing {
            info!("Downloading {} from {}", prereq.name, prereq.url);
            self.events.dependency_status(
                DependencyPhase::Downloading,
                format!("Downloading {}...", prereq.name),
            );
            let dest = self.download_dir.join(prereq.installer_file);
            self.downloader
                .download(&prereq.url, &dest)
                .map_err(|source| ProvisionError::DownloadFailure {
                    name: prereq.name.to_string(),
                    source,
                })?;
            installers.push(dest);
        }

        info!(
            "Installing {} package(s) in one elevated session",
            installers.len()
        );
        self.events.dependency_status(
            DependencyPhase::Installing,
            "Installing dependencies (approve UAC prompt)...",
        );
        let log = self.download_dir.join(INSTALL_LOG_FILE);
        remove_stale(&log);
        let paths: Vec<&Path> = installers.iter().map(PathBuf::as_path).collect();
        let cmd = session::elevated(
            &session::install_script(&paths, &log),
            self.already_elevated,
        );
        if let Some(script) = session::unwrap_script(&cmd) {
            debug!("Install session script:\n{}", script);
        }

        let out = self.runner.run(&cmd, INSTALL_TIMEOUT)?;
        if !out.success() {
            let logged = std::fs::read_to_string(&log).unwrap_or_default();
            let text = if logged.trim().is_empty() {
                &out.stderr
            } else {
                &logged
            };
            return Err(ProvisionError::InstallFailure {
                code: out.exit_code(),
                stderr_tail: stderr_tail(text),
            });
        }
        remove_stale(&log);

        for prereq in &missing {
            if !prereq.is_installed() {
                warn!(
                    "{} still not detected at {} after install",
                    prereq.name,
                    prereq.probe_path.display()
                );
            }
        }
        Ok(missing.iter().map(|p| p.name).collect())
    }

    /// Remove the named prerequisite via its registered MSI uninstaller.
    ///
    /// Succeeds whenever the uninstall session ran, whatever its exit code.
    /// Only failing to launch a process is an error.
    pub fn uninstall(&self, name: &str) -> Result<(), ProvisionError> {
        let prereq = self
            .prerequisites
            .iter()
            .find(|p| p.matches(name))
            .ok_or_else(|| ProvisionError::UnknownPrerequisite(name.to_string()))?;
        let name = prereq.name;

        info!("Uninstalling {}", name);
        self.events
            .dependency_status(DependencyPhase::Uninstalling, format!("Uninstalling {name}..."));

        if let Err(source) = self.run_uninstall(name) {
            error!("Uninstall of {} failed: {}", name, source);
            self.events
                .dependency_status(DependencyPhase::Error, format!("Failed to uninstall {name}"));
            return Err(ProvisionError::Uninstall {
                name: name.to_string(),
                source,
            });
        }

        self.events.dependency_status(
            DependencyPhase::UninstallComplete,
            format!("{name} uninstalled successfully"),
        );
        Ok(())
    }

    fn run_uninstall(&self, name: &str) -> Result<(), ExecError> {
        let listing = self.runner.run(&uninstall::query_command(), QUERY_TIMEOUT)?;
        let entries = uninstall::parse_entries(&listing.stdout);

        let Some(entry) = uninstall::select_entry(&entries, name) else {
            info!("No uninstall entry found for {}", name);
            return Ok(());
        };
        let code = match entry.uninstall_string.as_deref() {
            Some(s) if uninstall::is_msi(entry) => uninstall::product_code(s),
            _ => None,
        };
        let Some(code) = code else {
            info!("{} is not an MSI install, nothing to do", name);
            return Ok(());
        };

        let cmd = session::elevated(&session::uninstall_script(&code), self.already_elevated);
        let out = self.runner.run(&cmd, UNINSTALL_TIMEOUT)?;
        info!("Uninstall of {} ({}) exited with {:?}", name, code, out.code);
        Ok(())
    }
}

fn remove_stale(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
    }
}

/// Last few non-empty lines of installer stderr.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}
