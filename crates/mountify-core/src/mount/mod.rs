/// Mount controller: drives mount/unmount of one server's mapping.
///
/// Each operation walks a transient state machine:
///
/// ```text
/// mount:   Idle -> ForceUnmounting -> Mapping   -> Verifying -> Mounted | Failed
/// unmount: Idle -> Unmapping       -> Verifying -> Unmounted | Failed
/// ```
///
/// Nothing but the persisted `is_mounted` flag survives an operation. The
/// flag is only written after an independent `net use X:` query agrees with
/// the outcome, because `net use` exit codes are not trustworthy on their own.
///
/// Overlapping calls for the same server id are rejected with
/// [`MountError::Busy`] instead of racing on the registry. Callers that hand
/// the work to another thread take the slot first with
/// [`MountController::reserve`] and pass the [`InFlight`] along.
pub mod command;

use crate::error::{ExecError, MountError};
use crate::events::{CoreEvent, EventBus};
use crate::model::ServerProfile;
use crate::platform::{CommandOutput, CommandRunner, CommandSpec};
use crate::redact::sanitize_error;
use crate::registry::{update_server, ServerRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait between tearing a mapping down and reusing the letter. Remapping
/// immediately is often rejected as "still in use".
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on any single `net use` invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const MOUNT_VERIFY_FAILED: &str = "Mount verification failed - drive not accessible";
const UNMOUNT_VERIFY_FAILED: &str = "Drive still mounted after unmount attempt";

/// Where an in-flight operation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    Idle,
    ForceUnmounting,
    Mapping,
    Unmapping,
    Verifying,
}

#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    pub settle_delay: Duration,
    pub command_timeout: Duration,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
            command_timeout: COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Mount,
    Unmount,
}

pub struct MountController {
    registry: Arc<dyn ServerRegistry>,
    runner: Arc<dyn CommandRunner>,
    events: EventBus,
    options: MountOptions,
    /// Server ids with an operation in progress, and its phase.
    in_flight: Arc<Mutex<HashMap<String, MountPhase>>>,
}

/// A server's reserved slot in the in-flight set; released on drop.
///
/// Owns its handle on the set, so it can move to a worker thread.
pub struct InFlight {
    map: Arc<Mutex<HashMap<String, MountPhase>>>,
    id: String,
}

impl InFlight {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn set(&self, phase: MountPhase) {
        debug!("{} -> {:?}", self.id, phase);
        if let Some(slot) = self.map.lock().get_mut(&self.id) {
            *slot = phase;
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.map.lock().remove(&self.id);
    }
}

impl MountController {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        runner: Arc<dyn CommandRunner>,
        events: EventBus,
    ) -> Self {
        Self::with_options(registry, runner, events, MountOptions::default())
    }

    pub fn with_options(
        registry: Arc<dyn ServerRegistry>,
        runner: Arc<dyn CommandRunner>,
        events: EventBus,
        options: MountOptions,
    ) -> Self {
        Self {
            registry,
            runner,
            events,
            options,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current phase for `server_id`; `Idle` when nothing is running.
    pub fn phase(&self, server_id: &str) -> MountPhase {
        self.in_flight
            .lock()
            .get(server_id)
            .copied()
            .unwrap_or(MountPhase::Idle)
    }

    pub fn is_busy(&self, server_id: &str) -> bool {
        self.in_flight.lock().contains_key(server_id)
    }

    /// Take the in-flight slot for `server_id`, or `Busy` if it is taken.
    pub fn reserve(&self, server_id: &str) -> Result<InFlight, MountError> {
        let mut map = self.in_flight.lock();
        if map.contains_key(server_id) {
            warn!("Rejecting overlapping operation for {}", server_id);
            return Err(MountError::Busy);
        }
        map.insert(server_id.to_string(), MountPhase::Idle);
        Ok(InFlight {
            map: Arc::clone(&self.in_flight),
            id: server_id.to_string(),
        })
    }

    /// Map the server's drive letter to its SFTP share.
    ///
    /// `NotFound` and `Busy` are returned directly without an event. Every
    /// other outcome is also published as a `mount-result`.
    pub fn mount(&self, server_id: &str) -> Result<(), MountError> {
        let slot = self.reserve(server_id)?;
        self.mount_in(&slot, false)
    }

    /// Mount under a slot taken earlier with [`Self::reserve`].
    ///
    /// The request was already accepted, so every outcome is published,
    /// including a profile that disappeared in the meantime.
    pub fn mount_reserved(&self, slot: &InFlight) -> Result<(), MountError> {
        self.mount_in(slot, true)
    }

    /// Remove the server's mapping, by letter and by UNC target.
    pub fn unmount(&self, server_id: &str) -> Result<(), MountError> {
        let slot = self.reserve(server_id)?;
        self.unmount_in(&slot, false)
    }

    /// Unmount under a slot taken earlier; see [`Self::mount_reserved`].
    pub fn unmount_reserved(&self, slot: &InFlight) -> Result<(), MountError> {
        self.unmount_in(slot, true)
    }

    fn mount_in(&self, slot: &InFlight, report_missing: bool) -> Result<(), MountError> {
        let profile = self.lookup(slot.id(), Operation::Mount, report_missing)?;
        info!(
            "Mounting {} ({}) on {}:",
            profile.name,
            profile.id,
            profile.effective_drive_letter()
        );
        let result = self.run_mount(slot, &profile);
        self.finish(&profile, Operation::Mount, result)
    }

    fn unmount_in(&self, slot: &InFlight, report_missing: bool) -> Result<(), MountError> {
        let profile = self.lookup(slot.id(), Operation::Unmount, report_missing)?;
        info!(
            "Unmounting {} ({}) from {}:",
            profile.name,
            profile.id,
            profile.effective_drive_letter()
        );
        let result = self.run_unmount(slot, &profile);
        self.finish(&profile, Operation::Unmount, result)
    }

    fn lookup(
        &self,
        server_id: &str,
        op: Operation,
        report_missing: bool,
    ) -> Result<ServerProfile, MountError> {
        let err = match self.registry.server(server_id) {
            Ok(Some(profile)) => return Ok(profile),
            Ok(None) => {
                warn!("{:?} requested for unknown server {}", op, server_id);
                if !report_missing {
                    return Err(MountError::NotFound);
                }
                MountError::NotFound
            }
            Err(e) => {
                let err = MountError::from(e);
                error!("Registry read failed: {}", err);
                err
            }
        };
        self.publish_result(server_id, op, Some(err.to_string()));
        Err(err)
    }

    fn run_mount(
        &self,
        guard: &InFlight,
        profile: &ServerProfile,
    ) -> Result<Option<Vec<ServerProfile>>, MountError> {
        let letter = profile.effective_drive_letter();
        let unc = command::unc_target(profile)?;

        guard.set(MountPhase::ForceUnmounting);
        self.best_effort(&command::delete_drive(letter));
        thread::sleep(self.options.settle_delay);

        guard.set(MountPhase::Mapping);
        let map = command::map_drive(letter, &unc, &profile.password);
        match self.runner.run(&map, self.options.command_timeout) {
            Ok(out) if out.success() => {}
            Ok(out) => {
                return Err(MountError::ExecFailure(failure_message(
                    &map,
                    &out,
                    &profile.password,
                )))
            }
            Err(e) => {
                return Err(MountError::ExecFailure(sanitize_error(
                    &e.to_string(),
                    &profile.password,
                )))
            }
        }

        guard.set(MountPhase::Verifying);
        match self.letter_mapped(letter) {
            Ok(true) => {}
            Ok(false) => return Err(MountError::VerificationFailure(MOUNT_VERIFY_FAILED.into())),
            Err(e) => {
                warn!("Mount verification query failed: {}", e);
                return Err(MountError::VerificationFailure(MOUNT_VERIFY_FAILED.into()));
            }
        }

        self.persist_mounted(&profile.id, true)
    }

    fn run_unmount(
        &self,
        guard: &InFlight,
        profile: &ServerProfile,
    ) -> Result<Option<Vec<ServerProfile>>, MountError> {
        let letter = profile.effective_drive_letter();

        guard.set(MountPhase::Unmapping);
        self.best_effort(&command::delete_drive(letter));
        match command::unc_target(profile) {
            Ok(unc) => self.best_effort(&command::delete_unc(&unc)),
            Err(e) => debug!("Skipping removal by UNC target: {}", e),
        }
        thread::sleep(self.options.settle_delay);

        guard.set(MountPhase::Verifying);
        match self.letter_mapped(letter) {
            Ok(false) => {}
            Ok(true) => {
                return Err(MountError::VerificationFailure(UNMOUNT_VERIFY_FAILED.into()))
            }
            Err(e) => {
                return Err(MountError::VerificationFailure(format!(
                    "Could not verify unmount: {e}"
                )))
            }
        }

        self.persist_mounted(&profile.id, false)
    }

    /// Run a command whose outcome does not matter.
    fn best_effort(&self, cmd: &CommandSpec) {
        match self.runner.run(cmd, self.options.command_timeout) {
            Ok(out) if !out.success() => debug!("Ignored exit {:?}: {:?}", out.code, cmd),
            Ok(_) => {}
            Err(e) => debug!("Ignored failure of {:?}: {}", cmd, e),
        }
    }

    fn letter_mapped(&self, letter: char) -> Result<bool, ExecError> {
        self.runner
            .run(&command::query_drive(letter), self.options.command_timeout)
            .map(|out| out.success())
    }

    /// Re-read the registry and flip `is_mounted`. `None` means the profile
    /// was deleted while the operation ran, so nothing was written.
    fn persist_mounted(
        &self,
        server_id: &str,
        mounted: bool,
    ) -> Result<Option<Vec<ServerProfile>>, MountError> {
        let updated = update_server(self.registry.as_ref(), server_id, |p| {
            p.is_mounted = mounted
        })?;
        if updated.is_none() {
            warn!("Server {} was removed during the operation", server_id);
        }
        Ok(updated)
    }

    fn finish(
        &self,
        profile: &ServerProfile,
        op: Operation,
        result: Result<Option<Vec<ServerProfile>>, MountError>,
    ) -> Result<(), MountError> {
        match result {
            Ok(updated) => {
                info!("{:?} of {} succeeded", op, profile.name);
                self.publish_result(&profile.id, op, None);
                if let Some(servers) = updated {
                    self.events.publish(CoreEvent::ServersUpdated(servers));
                }
                self.events.publish(CoreEvent::TrayRefresh);
                let (title, body) = match op {
                    Operation::Mount => (
                        "Mounted Successfully",
                        format!(
                            "{} mounted as {}:",
                            profile.name,
                            profile.effective_drive_letter()
                        ),
                    ),
                    Operation::Unmount => {
                        ("Unmounted Successfully", format!("{} unmounted", profile.name))
                    }
                };
                self.notify(title, body);
                Ok(())
            }
            Err(err) => {
                error!("{:?} of {} failed: {}", op, profile.name, err);
                self.publish_result(&profile.id, op, Some(err.to_string()));
                let (title, verb) = match op {
                    Operation::Mount => ("Mount Failed", "mount"),
                    Operation::Unmount => ("Unmount Failed", "unmount"),
                };
                self.notify(title, format!("Failed to {verb} {}", profile.name));
                Err(err)
            }
        }
    }

    fn publish_result(&self, server_id: &str, op: Operation, error: Option<String>) {
        let server_id = server_id.to_string();
        let success = error.is_none();
        self.events.publish(match op {
            Operation::Mount => CoreEvent::MountResult {
                server_id,
                success,
                error,
            },
            Operation::Unmount => CoreEvent::UnmountResult {
                server_id,
                success,
                error,
            },
        });
    }

    fn notify(&self, title: &str, body: String) {
        let enabled = self
            .registry
            .settings()
            .map(|s| s.show_notifications)
            .unwrap_or(true);
        if enabled {
            self.events.publish(CoreEvent::Notification {
                title: title.to_string(),
                body,
            });
        }
    }
}

/// User-facing text for a mapping command that exited non-zero.
///
/// Prefers the command's own error output; falls back to the (masked)
/// command line. Either way the password is redacted and only the first
/// line is kept.
fn failure_message(cmd: &CommandSpec, out: &CommandOutput, password: &str) -> String {
    let stderr = out.stderr.trim_start();
    let raw = if !stderr.is_empty() {
        stderr.to_string()
    } else {
        format!(
            "Command failed: {} (exit code {})",
            cmd.display_redacted(),
            out.exit_code()
        )
    };
    sanitize_error(&raw, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_redacts_echoed_password() {
        let cmd = command::map_drive('S', "\\\\sshfs\\a@h!22/", "p@ss(w)rd");
        let out = CommandOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "System error 1326: bad password p@ss(w)rd\r\n\r\nMore help".into(),
        };
        let msg = failure_message(&cmd, &out, "p@ss(w)rd");
        assert_eq!(msg, "System error 1326: bad password ***");
    }

    #[test]
    fn failure_message_falls_back_to_command_line() {
        let cmd = command::map_drive('S', "\\\\sshfs\\a@h!22/", "s3cret");
        let msg = failure_message(&cmd, &CommandOutput::with_code(2), "s3cret");
        assert_eq!(
            msg,
            "Command failed: net use S: \\\\sshfs\\a@h!22/ *** (exit code 2)"
        );
    }
}
