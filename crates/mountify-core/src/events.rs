/// Events published from the core to the front end via a crossbeam channel.
///
/// The channel is one-directional: the core never waits on a receiver. If the
/// receiver has gone away or the queue is full, the event is dropped with a
/// warning rather than stalling a mount or install.
use crate::model::ServerProfile;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::warn;

/// Maximum number of events that may queue up before new ones are dropped.
///
/// A front end draining once per frame never gets near this; a detached
/// CLI that only reads at exit still has room for every event of a session.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// Phase reported on the `dependency-status` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyPhase {
    Downloading,
    Installing,
    Complete,
    Uninstalling,
    UninstallComplete,
    Error,
}

impl DependencyPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Installing => "installing",
            Self::Complete => "complete",
            Self::Uninstalling => "uninstalling",
            Self::UninstallComplete => "uninstall-complete",
            Self::Error => "error",
        }
    }
}

/// Everything the core tells the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    MountResult {
        server_id: String,
        success: bool,
        error: Option<String>,
    },
    UnmountResult {
        server_id: String,
        success: bool,
        error: Option<String>,
    },
    /// Full profile list after any registry change.
    ServersUpdated(Vec<ServerProfile>),
    DependencyStatus {
        status: DependencyPhase,
        message: String,
    },
    /// User-facing toast, only sent when notifications are enabled.
    Notification { title: String, body: String },
    /// The tray menu labels depend on `is_mounted`; re-render it.
    TrayRefresh,
}

impl CoreEvent {
    /// Channel name used by the front end for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MountResult { .. } => "mount-result",
            Self::UnmountResult { .. } => "unmount-result",
            Self::ServersUpdated(_) => "servers-updated",
            Self::DependencyStatus { .. } => "dependency-status",
            Self::Notification { .. } => "notification",
            Self::TrayRefresh => "tray-refresh",
        }
    }
}

/// Publishing half of the event channel. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<CoreEvent>,
}

impl EventBus {
    /// Create a bus and the receiver the front end drains.
    pub fn channel() -> (Self, Receiver<CoreEvent>) {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: CoreEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => warn!("Event queue full, dropping {}", ev.name()),
            // No listener is a normal state for headless use.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn dependency_status(&self, status: DependencyPhase, message: impl Into<String>) {
        self.publish(CoreEvent::DependencyStatus {
            status,
            message: message.into(),
        });
    }
}
