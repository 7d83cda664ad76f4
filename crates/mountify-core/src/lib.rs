/// Mountify Core: mount lifecycle and dependency provisioning.
///
/// This crate contains all business logic with zero UI dependencies. A front
/// end drives it through [`service::Mountify`] and listens on the event
/// channel for results.
///
/// # Modules
///
/// - [`model`] — Server profiles and settings.
/// - [`registry`] — Persisted profile list (in-memory and JSON-file backends).
/// - [`events`] — One-way event channel to the front end.
/// - [`mount`] — Per-server mount/unmount state machine over `net use`.
/// - [`provision`] — WinFsp / SSHFS-Win detection, install and uninstall.
/// - [`allocator`] — Free drive-letter computation.
/// - [`probe`] — Bounded-time TCP reachability checks.
/// - [`platform`] — Windows drive table, elevation, autostart and process execution.
/// - [`service`] — The command surface tying it all together.
pub mod allocator;
pub mod error;
pub mod events;
pub mod model;
pub mod mount;
pub mod platform;
pub mod probe;
pub mod provision;
pub mod redact;
pub mod registry;
pub mod service;

pub use error::{MountError, ProbeError, ProvisionError, RegistryError};
pub use events::{CoreEvent, DependencyPhase, EventBus};
pub use model::{ServerProfile, Settings};
pub use service::{CommandResult, Components, DependencyCheck, Mountify};
