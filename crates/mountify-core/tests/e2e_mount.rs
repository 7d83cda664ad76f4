/// End-to-end tests for the mount controller.
///
/// These drive the real `MountController` against `FakeRunner`, a simulated
/// `net use` drive table, so every state transition (pre-clean, settle,
/// map, verify, persist, publish) is exercised without touching Windows.
mod common;

use common::{drain, names, FakeRunner};
use mountify_core::mount::{MountController, MountOptions, MountPhase};
use mountify_core::platform::CommandOutput;
use mountify_core::registry::{InMemoryRegistry, ServerRegistry};
use mountify_core::{CoreEvent, EventBus, MountError, ServerProfile, Settings};
use crossbeam_channel::Receiver;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ── Helpers ──────────────────────────────────────────────────────────────────

const ALICE_UNC: &str = "\\\\sshfs\\alice@203.0.113.5!22/home/alice";

fn alice() -> ServerProfile {
    let mut p = ServerProfile::new("Lab box", "203.0.113.5", "alice");
    p.id = "srv-1".into();
    p.port = 22;
    p.password = "c0rrect.h*rse$(battery)".into();
    p.drive_letter = "S".into();
    p.remote_path = "/home/alice".into();
    p
}

struct Harness {
    registry: Arc<InMemoryRegistry>,
    runner: Arc<FakeRunner>,
    controller: Arc<MountController>,
    rx: Receiver<CoreEvent>,
}

fn harness_with(profiles: Vec<ServerProfile>, settle: Duration) -> Harness {
    let registry = Arc::new(InMemoryRegistry::with_servers(profiles));
    let runner = Arc::new(FakeRunner::new());
    let (events, rx) = EventBus::channel();
    let controller = Arc::new(MountController::with_options(
        registry.clone(),
        runner.clone(),
        events,
        MountOptions {
            settle_delay: settle,
            command_timeout: Duration::from_secs(5),
        },
    ));
    Harness {
        registry,
        runner,
        controller,
        rx,
    }
}

fn harness() -> Harness {
    harness_with(vec![alice()], Duration::from_millis(10))
}

fn stored(h: &Harness, id: &str) -> ServerProfile {
    h.registry.server(id).unwrap().expect("profile must exist")
}

fn mount_result(events: &[CoreEvent]) -> (bool, Option<String>) {
    events
        .iter()
        .find_map(|e| match e {
            CoreEvent::MountResult { success, error, .. } => Some((*success, error.clone())),
            _ => None,
        })
        .expect("no mount-result published")
}

fn unmount_result(events: &[CoreEvent]) -> (bool, Option<String>) {
    events
        .iter()
        .find_map(|e| match e {
            CoreEvent::UnmountResult { success, error, .. } => Some((*success, error.clone())),
            _ => None,
        })
        .expect("no unmount-result published")
}

// ── Mount ────────────────────────────────────────────────────────────────────

/// The reference scenario: pre-clean S:, map it to the UNC target, verify it,
/// persist `is_mounted`, publish result + registry change + tray refresh.
#[test]
fn mount_maps_verifies_and_persists() {
    let h = harness();
    h.controller.mount("srv-1").unwrap();

    assert_eq!(
        h.runner.net_lines(),
        vec![
            "net use S: /delete /y".to_string(),
            format!("net use S: {ALICE_UNC} ***"),
            "net use S:".to_string(),
        ]
    );
    let map = &h.runner.calls()[1];
    assert_eq!(map.args[3], "c0rrect.h*rse$(battery)", "password passed as its own argument");

    assert!(h.runner.is_mapped('S'));
    assert!(stored(&h, "srv-1").is_mounted);

    let events = drain(&h.rx);
    assert_eq!(mount_result(&events), (true, None));
    assert_eq!(
        names(&events),
        vec!["mount-result", "servers-updated", "tray-refresh", "notification"]
    );
    match &events[1] {
        CoreEvent::ServersUpdated(list) => assert!(list[0].is_mounted),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.controller.phase("srv-1"), MountPhase::Idle);
}

/// An existing mapping on the letter is removed before the new one is made.
#[test]
fn mount_replaces_stale_mapping() {
    let h = harness();
    h.runner.premap('S', "\\\\server\\old-share");
    h.controller.mount("srv-1").unwrap();
    assert!(h.runner.is_mapped('S'));
    assert!(stored(&h, "srv-1").is_mounted);
}

/// The settle delay separates the pre-clean from the mapping command.
#[test]
fn mount_waits_settle_delay() {
    let h = harness_with(vec![alice()], Duration::from_millis(300));
    let start = Instant::now();
    h.controller.mount("srv-1").unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[test]
fn unknown_server_issues_nothing() {
    let h = harness();
    let err = h.controller.mount("abc").unwrap_err();
    assert!(matches!(err, MountError::NotFound));
    assert_eq!(err.to_string(), "Server not found");
    assert!(h.runner.calls().is_empty(), "no OS command may run");
    assert!(drain(&h.rx).is_empty(), "no event besides the direct error");
}

/// Exec failures are surfaced with the password redacted, first line only,
/// and `is_mounted` untouched.
#[test]
fn failed_mapping_redacts_password() {
    let h = harness();
    let pw = alice().password;
    h.runner.fail_map_with(CommandOutput {
        code: Some(2),
        stdout: String::new(),
        stderr: format!("System error 86 has occurred for {pw}.\r\n\r\nThe specified network password is not correct."),
    });

    let err = h.controller.mount("srv-1").unwrap_err();
    assert!(matches!(err, MountError::ExecFailure(_)));

    let events = drain(&h.rx);
    let (success, error) = mount_result(&events);
    assert!(!success);
    let error = error.unwrap();
    assert_eq!(error, "System error 86 has occurred for ***.");
    assert!(!error.contains(&pw));
    assert!(!stored(&h, "srv-1").is_mounted);
    assert!(!names(&events).contains(&"servers-updated"));
    assert!(events.contains(&CoreEvent::Notification {
        title: "Mount Failed".into(),
        body: "Failed to mount Lab box".into(),
    }));
}

/// Exit code zero is not enough; the follow-up query must see the drive.
#[test]
fn phantom_success_fails_verification() {
    let h = harness();
    h.runner.phantom_map.store(true, Ordering::SeqCst);

    let err = h.controller.mount("srv-1").unwrap_err();
    assert!(matches!(err, MountError::VerificationFailure(_)));
    let (success, error) = mount_result(&drain(&h.rx));
    assert!(!success);
    assert_eq!(
        error.as_deref(),
        Some("Mount verification failed - drive not accessible")
    );
    assert!(!stored(&h, "srv-1").is_mounted);
}

/// Unsafe host strings never reach `net use`.
#[test]
fn injected_host_is_rejected_before_any_command() {
    let mut p = alice();
    p.host = "host\" & calc & \"".into();
    let h = harness_with(vec![p], Duration::from_millis(10));

    let err = h.controller.mount("srv-1").unwrap_err();
    assert!(matches!(err, MountError::InvalidProfile(_)));
    assert!(h.runner.calls().is_empty());
    assert!(!mount_result(&drain(&h.rx)).0);
}

#[test]
fn notifications_respect_settings() {
    let h = harness();
    h.registry
        .set_settings(&Settings {
            show_notifications: false,
            ..Settings::default()
        })
        .unwrap();
    h.controller.mount("srv-1").unwrap();
    assert!(!names(&drain(&h.rx)).contains(&"notification"));
}

// ── Unmount ──────────────────────────────────────────────────────────────────

/// Mount then unmount restores the pre-mount absence of the drive.
#[test]
fn mount_unmount_round_trip() {
    let h = harness();
    assert!(!h.runner.is_mapped('S'));
    h.controller.mount("srv-1").unwrap();
    drain(&h.rx);
    h.runner.clear_calls();

    h.controller.unmount("srv-1").unwrap();

    assert_eq!(
        h.runner.net_lines(),
        vec![
            "net use S: /delete /y".to_string(),
            format!("net use {ALICE_UNC} /delete /y"),
            "net use S:".to_string(),
        ]
    );
    assert!(!h.runner.is_mapped('S'));
    assert!(!stored(&h, "srv-1").is_mounted);

    let events = drain(&h.rx);
    assert_eq!(unmount_result(&events), (true, None));
    assert!(names(&events).contains(&"servers-updated"));
}

/// A mapping that survives both removal attempts is a failed unmount.
#[test]
fn stuck_drive_fails_unmount() {
    let h = harness();
    h.controller.mount("srv-1").unwrap();
    drain(&h.rx);
    h.runner.sticky.store(true, Ordering::SeqCst);

    let err = h.controller.unmount("srv-1").unwrap_err();
    assert!(matches!(err, MountError::VerificationFailure(_)));
    let (success, error) = unmount_result(&drain(&h.rx));
    assert!(!success);
    assert_eq!(
        error.as_deref(),
        Some("Drive still mounted after unmount attempt")
    );
    assert!(stored(&h, "srv-1").is_mounted, "flag unchanged on failure");
}

#[test]
fn unmount_unknown_server() {
    let h = harness();
    assert!(matches!(
        h.controller.unmount("nope"),
        Err(MountError::NotFound)
    ));
    assert!(h.runner.calls().is_empty());
}

// ── Concurrency ──────────────────────────────────────────────────────────────

/// A second operation for the same id while one is in flight is rejected.
#[test]
fn overlapping_calls_for_same_server_are_rejected() {
    let h = harness_with(vec![alice()], Duration::from_millis(600));

    let controller = h.controller.clone();
    let first = thread::spawn(move || controller.mount("srv-1"));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !h.controller.is_busy("srv-1") {
        assert!(Instant::now() < deadline, "first mount never started");
        thread::sleep(Duration::from_millis(5));
    }
    assert_ne!(h.controller.phase("srv-1"), MountPhase::Idle);
    assert!(matches!(
        h.controller.unmount("srv-1"),
        Err(MountError::Busy)
    ));

    first.join().unwrap().unwrap();
    assert!(stored(&h, "srv-1").is_mounted);
    assert!(!h.controller.is_busy("srv-1"));
}

/// Different servers do not block each other.
#[test]
fn different_servers_run_concurrently() {
    let mut bob = alice();
    bob.id = "srv-2".into();
    bob.username = "bob".into();
    bob.drive_letter = "T".into();
    let h = harness_with(vec![alice(), bob], Duration::from_millis(200));

    let c1 = h.controller.clone();
    let c2 = h.controller.clone();
    let a = thread::spawn(move || c1.mount("srv-1"));
    let b = thread::spawn(move || c2.mount("srv-2"));
    a.join().unwrap().unwrap();
    b.join().unwrap().unwrap();

    assert!(h.runner.is_mapped('S'));
    assert!(h.runner.is_mapped('T'));
    assert!(stored(&h, "srv-1").is_mounted);
    assert!(stored(&h, "srv-2").is_mounted);
}

/// A profile deleted while its mount runs is not resurrected by the
/// `is_mounted` write.
#[test]
fn deleted_profile_is_not_rewritten() {
    let h = harness_with(vec![alice()], Duration::from_millis(400));

    let controller = h.controller.clone();
    let op = thread::spawn(move || controller.mount("srv-1"));
    while !h.controller.is_busy("srv-1") {
        thread::sleep(Duration::from_millis(5));
    }
    h.registry.set_servers(&[]).unwrap();

    op.join().unwrap().unwrap();
    assert!(h.registry.servers().unwrap().is_empty());
    let events = drain(&h.rx);
    assert!(!names(&events).contains(&"servers-updated"));
}
