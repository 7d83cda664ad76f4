/// Command surface for front ends: the single entry point a UI or CLI calls.
///
/// Long operations (mount, unmount, install) run on named background threads
/// and report through [`CoreEvent`](crate::events::CoreEvent)s; quick queries
/// answer directly. Every failure is converted to a [`CommandResult`] or an
/// event here, so nothing below this layer can take the process down.
use crate::allocator::{with_current_letter, DriveLetterAllocator};
use crate::error::{MountError, RegistryError};
use crate::events::{CoreEvent, EventBus};
use crate::model::{ServerProfile, Settings};
use crate::mount::{InFlight, MountController, MountOptions};
use crate::platform::{autostart, is_elevated, CommandRunner, DriveQuery, SystemDrives, SystemRunner};
use crate::probe::ConnectivityProber;
use crate::provision::{DependencyProvisioner, Downloader, HttpDownloader, Prerequisite};
use crate::registry::ServerRegistry;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay before auto-mounting at startup, giving the network stack and the
/// WinFsp launcher time to come up after login.
pub const AUTO_MOUNT_DELAY: Duration = Duration::from_secs(2);

/// Outcome of a request/response command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for CommandResult {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e),
        }
    }
}

/// Installed state of both prerequisites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyCheck {
    pub winfsp: bool,
    pub sshfs: bool,
}

/// Everything [`Mountify`] is assembled from. [`Components::system`] wires
/// the real OS; tests swap individual pieces.
pub struct Components {
    pub registry: Arc<dyn ServerRegistry>,
    pub runner: Arc<dyn CommandRunner>,
    pub downloader: Arc<dyn Downloader>,
    pub drives: Arc<dyn DriveQuery>,
    pub prober: ConnectivityProber,
    pub mount_options: MountOptions,
    pub prerequisites: Vec<Prerequisite>,
    pub download_dir: PathBuf,
    pub already_elevated: bool,
    pub auto_mount_delay: Duration,
    /// Executable registered for start with Windows. `None` disables
    /// autostart changes.
    pub launch_path: Option<PathBuf>,
}

impl Components {
    pub fn system(registry: Arc<dyn ServerRegistry>) -> Self {
        Self {
            registry,
            runner: Arc::new(SystemRunner),
            downloader: Arc::new(HttpDownloader::default()),
            drives: Arc::new(SystemDrives),
            prober: ConnectivityProber::new(),
            mount_options: MountOptions::default(),
            prerequisites: Prerequisite::defaults(),
            download_dir: std::env::temp_dir(),
            already_elevated: is_elevated(),
            auto_mount_delay: AUTO_MOUNT_DELAY,
            launch_path: std::env::current_exe().ok(),
        }
    }
}

/// Background work started by [`Mountify::startup`].
#[derive(Default)]
pub struct StartupHandle {
    pub install: Option<JoinHandle<()>>,
    pub auto_mount: Option<JoinHandle<()>>,
}

impl StartupHandle {
    /// Block until all startup work has finished.
    pub fn join(self) {
        for handle in [self.install, self.auto_mount].into_iter().flatten() {
            let _ = handle.join();
        }
    }
}

pub struct Mountify {
    registry: Arc<dyn ServerRegistry>,
    controller: Arc<MountController>,
    provisioner: Arc<DependencyProvisioner>,
    prober: ConnectivityProber,
    allocator: DriveLetterAllocator,
    runner: Arc<dyn CommandRunner>,
    events: EventBus,
    auto_mount_delay: Duration,
    launch_path: Option<PathBuf>,
}

impl Mountify {
    /// Wire the real system around `registry`. Returns the event receiver the
    /// front end drains.
    pub fn new(registry: Arc<dyn ServerRegistry>) -> (Self, Receiver<CoreEvent>) {
        let (events, rx) = EventBus::channel();
        (Self::from_components(Components::system(registry), events), rx)
    }

    pub fn from_components(c: Components, events: EventBus) -> Self {
        let controller = MountController::with_options(
            Arc::clone(&c.registry),
            Arc::clone(&c.runner),
            events.clone(),
            c.mount_options,
        );
        let provisioner =
            DependencyProvisioner::new(c.downloader, Arc::clone(&c.runner), events.clone())
            .with_prerequisites(c.prerequisites)
            .with_download_dir(c.download_dir)
            .with_elevation(c.already_elevated);
        Self {
            registry: c.registry,
            controller: Arc::new(controller),
            provisioner: Arc::new(provisioner),
            prober: c.prober,
            allocator: DriveLetterAllocator::new(c.drives),
            runner: c.runner,
            events,
            auto_mount_delay: c.auto_mount_delay,
            launch_path: c.launch_path,
        }
    }

    pub fn controller(&self) -> &MountController {
        &self.controller
    }

    pub fn provisioner(&self) -> &DependencyProvisioner {
        &self.provisioner
    }

    // ── Mount lifecycle ─────────────────────────────────────────────────────

    /// Start mounting `server_id` in the background. The outcome arrives as a
    /// `mount-result` event; unknown or busy ids are rejected immediately.
    ///
    /// The server's slot is taken before the worker starts, so a second call
    /// right behind this one gets `Busy` rather than a silent no-op.
    pub fn mount(&self, server_id: &str) -> Result<JoinHandle<()>, MountError> {
        let slot = self.reserve(server_id)?;
        let controller = Arc::clone(&self.controller);
        Ok(spawn_worker("mountify-mount", move || {
            if let Err(e) = controller.mount_reserved(&slot) {
                debug!("Mount of {} ended with {}", slot.id(), e);
            }
        }))
    }

    /// Start unmounting `server_id` in the background; see [`Self::mount`].
    pub fn unmount(&self, server_id: &str) -> Result<JoinHandle<()>, MountError> {
        let slot = self.reserve(server_id)?;
        let controller = Arc::clone(&self.controller);
        Ok(spawn_worker("mountify-unmount", move || {
            if let Err(e) = controller.unmount_reserved(&slot) {
                debug!("Unmount of {} ended with {}", slot.id(), e);
            }
        }))
    }

    fn reserve(&self, server_id: &str) -> Result<InFlight, MountError> {
        if self.registry.server(server_id)?.is_none() {
            return Err(MountError::NotFound);
        }
        self.controller.reserve(server_id)
    }

    // ── Dependencies ────────────────────────────────────────────────────────

    pub fn check_dependencies(&self) -> DependencyCheck {
        let states = self.provisioner.check_all();
        let installed = |key: &str| states.iter().any(|s| s.key == key && s.installed);
        DependencyCheck {
            winfsp: installed("winfsp"),
            sshfs: installed("sshfs"),
        }
    }

    /// Install whatever is missing in the background; progress arrives as
    /// `dependency-status` events.
    pub fn install_dependencies(&self) -> JoinHandle<()> {
        let provisioner = Arc::clone(&self.provisioner);
        spawn_worker("mountify-install", move || {
            if let Err(e) = provisioner.install_missing() {
                debug!("Install ended with {}", e);
            }
        })
    }

    pub fn uninstall_dependency(&self, name: &str) -> CommandResult {
        self.provisioner.uninstall(name).into()
    }

    // ── Connectivity and drives ─────────────────────────────────────────────

    /// TCP reachability of the profile's host within the configured timeout.
    pub fn test_connection(&self, profile: &ServerProfile) -> CommandResult {
        let settings = self.settings_or_default();
        let port = if profile.port == 0 {
            settings.default_port
        } else {
            profile.port
        };
        info!("Testing connection to {}:{}", profile.host, port);
        self.prober
            .test_connection(&profile.host, port, settings.connection_timeout())
            .into()
    }

    /// Free drive letters as `"A"`..`"Z"` strings.
    pub fn available_drives(&self) -> Vec<String> {
        self.available_drives_for(None)
    }

    /// Free drive letters plus `current`, so an edit form keeps the
    /// profile's own (possibly in-use) letter selectable.
    pub fn available_drives_for(&self, current: Option<char>) -> Vec<String> {
        with_current_letter(self.allocator.available_letters(), current)
            .into_iter()
            .map(String::from)
            .collect()
    }

    // ── Registry ────────────────────────────────────────────────────────────

    pub fn get_servers(&self) -> Result<Vec<ServerProfile>, RegistryError> {
        self.registry.servers()
    }

    /// Insert or replace a profile. New profiles get a fresh id and start
    /// unmounted; existing ones keep their stored `is_mounted`, which only
    /// the mount controller may change.
    ///
    /// An id that matches no stored profile is not trusted: the profile is
    /// inserted under a fresh id instead.
    pub fn save_server(&self, mut profile: ServerProfile) -> Result<ServerProfile, RegistryError> {
        let servers = self.registry.update_servers(&mut |servers: &mut Vec<ServerProfile>| {
            match servers.iter_mut().find(|s| !profile.id.is_empty() && s.id == profile.id) {
                Some(existing) => {
                    profile.is_mounted = existing.is_mounted;
                    *existing = profile.clone();
                }
                None => {
                    if !profile.id.is_empty() {
                        warn!("Unknown server id {}, saving as a new profile", profile.id);
                    }
                    profile.id = uuid::Uuid::new_v4().to_string();
                    profile.is_mounted = false;
                    servers.push(profile.clone());
                }
            }
            true
        })?;
        info!("Saved server {} ({})", profile.name, profile.id);
        self.publish_servers(servers);
        Ok(profile)
    }

    /// Remove a profile, unmounting it first if it is mounted. An unmount
    /// failure is logged and does not block the removal.
    ///
    /// Rejected with `Busy` while a mount or unmount of the same server is
    /// running; the slot is held until the profile is gone.
    pub fn delete_server(&self, server_id: &str) -> Result<(), MountError> {
        let slot = self.controller.reserve(server_id)?;
        if let Some(profile) = self.registry.server(server_id)? {
            if profile.is_mounted {
                if let Err(e) = self.controller.unmount_reserved(&slot) {
                    warn!("Unmount before delete of {} failed: {}", profile.name, e);
                }
            }
        }
        let servers = self.registry.update_servers(&mut |servers: &mut Vec<ServerProfile>| {
            let before = servers.len();
            servers.retain(|s| s.id != server_id);
            servers.len() != before
        })?;
        drop(slot);
        info!("Deleted server {}", server_id);
        self.publish_servers(servers);
        Ok(())
    }

    pub fn get_settings(&self) -> Result<Settings, RegistryError> {
        self.registry.settings()
    }

    /// Persist `settings`, registering or removing start with Windows when
    /// that flag changed. An autostart failure is logged; the settings are
    /// still saved.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), RegistryError> {
        let previous = self.registry.settings()?;
        self.registry.set_settings(settings)?;
        if previous.start_with_windows != settings.start_with_windows {
            self.apply_autostart(settings.start_with_windows);
        }
        Ok(())
    }

    fn apply_autostart(&self, enabled: bool) {
        let Some(exe) = &self.launch_path else {
            warn!("Executable path unknown, start with Windows not changed");
            return;
        };
        if let Err(e) = autostart::apply(self.runner.as_ref(), enabled, exe) {
            warn!("Cannot update start with Windows: {}", e);
        }
    }

    fn settings_or_default(&self) -> Settings {
        self.registry.settings().unwrap_or_else(|e| {
            warn!("Using default settings: {}", e);
            Settings::default()
        })
    }

    fn publish_servers(&self, servers: Vec<ServerProfile>) {
        self.events.publish(CoreEvent::ServersUpdated(servers));
        self.events.publish(CoreEvent::TrayRefresh);
    }

    // ── Startup ─────────────────────────────────────────────────────────────

    /// Install missing prerequisites without asking, then mount every
    /// `auto_mount` profile after [`AUTO_MOUNT_DELAY`].
    pub fn startup(&self) -> StartupHandle {
        let mut handle = StartupHandle::default();

        let deps = self.check_dependencies();
        info!("Dependency check: {:?}", deps);
        if !self.provisioner.all_installed() {
            info!("Starting automatic dependency installation");
            handle.install = Some(self.install_dependencies());
        }

        let auto: Vec<String> = match self.registry.servers() {
            Ok(servers) => servers
                .into_iter()
                .filter(|s| s.auto_mount)
                .map(|s| s.id)
                .collect(),
            Err(e) => {
                warn!("Cannot read servers for auto-mount: {}", e);
                Vec::new()
            }
        };
        if !auto.is_empty() {
            let controller = Arc::clone(&self.controller);
            let delay = self.auto_mount_delay;
            handle.auto_mount = Some(spawn_worker("mountify-automount", move || {
                thread::sleep(delay);
                for id in auto {
                    if let Err(e) = controller.mount(&id) {
                        debug!("Auto-mount of {} ended with {}", id, e);
                    }
                }
            }));
        }

        handle
    }
}

fn spawn_worker<F>(name: &str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .expect("failed to spawn worker thread")
}
