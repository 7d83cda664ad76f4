//! Shared fakes for the end-to-end tests.
//!
//! `FakeRunner` simulates the slice of Windows the engine talks to: a
//! `net use` drive table, a PowerShell host and `reg.exe`. Every command is
//! recorded so tests can assert on exactly what would have been executed.
//!
//! Like the real `Start-Process -Verb RunAs`, an elevated session hands back
//! its exit code but not its stderr. A failing install script's text only
//! reaches the log file named in the script.
#![allow(dead_code)]

use mountify_core::error::{DownloadError, ExecError};
use mountify_core::platform::{CommandOutput, CommandRunner, CommandSpec};
use mountify_core::provision::session::{decode_script, install_log_path, unwrap_script};
use mountify_core::provision::Downloader;
use mountify_core::CoreEvent;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// ── Command runner ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    /// Letter -> UNC target currently mapped.
    mapped: Mutex<HashMap<char, String>>,
    /// When set, `net use X: <unc> <pw>` returns this instead of mapping.
    map_failure: Mutex<Option<CommandOutput>>,
    /// Map command reports success without creating the mapping.
    pub phantom_map: AtomicBool,
    /// Delete commands report success without removing anything.
    pub sticky: AtomicBool,
    /// Delay applied to every map command.
    map_delay: Mutex<Duration>,
    /// JSON returned for the uninstall-registry listing.
    listing: Mutex<String>,
    /// Output of any other PowerShell session (install / uninstall).
    session_output: Mutex<CommandOutput>,
    /// Files created when an install session succeeds.
    install_creates: Mutex<Vec<PathBuf>>,
    /// PowerShell cannot be started at all.
    pub powershell_missing: AtomicBool,
}

impl FakeRunner {
    pub fn new() -> Self {
        let runner = Self::default();
        *runner.session_output.lock() = CommandOutput::with_code(0);
        runner
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Rendered `net` command lines, in order, with the secret masked.
    pub fn net_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.program == "net")
            .map(CommandSpec::display_redacted)
            .collect()
    }

    /// Scripts of every PowerShell session, unwrapped from elevation.
    pub fn reg_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == "reg")
            .map(|c| c.args)
            .collect()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.program == "powershell.exe")
            .filter_map(unwrap_script)
            .collect()
    }

    pub fn is_mapped(&self, letter: char) -> bool {
        self.mapped.lock().contains_key(&letter)
    }

    pub fn premap(&self, letter: char, unc: &str) {
        self.mapped.lock().insert(letter, unc.to_string());
    }

    pub fn fail_map_with(&self, output: CommandOutput) {
        *self.map_failure.lock() = Some(output);
    }

    pub fn set_map_delay(&self, delay: Duration) {
        *self.map_delay.lock() = delay;
    }

    pub fn set_listing(&self, json: &str) {
        *self.listing.lock() = json.to_string();
    }

    pub fn set_session_output(&self, output: CommandOutput) {
        *self.session_output.lock() = output;
    }

    pub fn install_creates(&self, path: impl Into<PathBuf>) {
        self.install_creates.lock().push(path.into());
    }

    fn net(&self, args: &[String]) -> CommandOutput {
        let letter = |s: &str| s.strip_suffix(':').and_then(|l| l.chars().next());
        match args {
            [_, target, flag, _] if flag == "/delete" => {
                if !self.sticky.load(Ordering::SeqCst) {
                    let mut mapped = self.mapped.lock();
                    match letter(target.as_str()) {
                        Some(l) => {
                            mapped.remove(&l);
                        }
                        None => mapped.retain(|_, unc| unc.as_str() != target.as_str()),
                    }
                }
                CommandOutput::with_code(0)
            }
            [_, drive, unc, _password] => {
                std::thread::sleep(*self.map_delay.lock());
                if let Some(out) = self.map_failure.lock().clone() {
                    return out;
                }
                if !self.phantom_map.load(Ordering::SeqCst) {
                    if let Some(l) = letter(drive.as_str()) {
                        self.mapped.lock().insert(l, unc.clone());
                    }
                }
                CommandOutput::with_code(0)
            }
            [_, drive] => match letter(drive.as_str()) {
                Some(l) if self.is_mapped(l) => CommandOutput::with_code(0),
                _ => CommandOutput {
                    code: Some(2),
                    stderr: "The network connection could not be found.".into(),
                    ..CommandOutput::default()
                },
            },
            _ => CommandOutput::with_code(1),
        }
    }

    fn powershell(&self, cmd: &CommandSpec) -> Result<CommandOutput, ExecError> {
        if self.powershell_missing.load(Ordering::SeqCst) {
            return Err(ExecError::Spawn {
                program: cmd.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        let script = unwrap_script(cmd).unwrap_or_default();
        if script.contains("ConvertTo-Json") {
            return Ok(CommandOutput {
                code: Some(0),
                stdout: self.listing.lock().clone(),
                stderr: String::new(),
            });
        }
        let mut out = self.session_output.lock().clone();
        let elevated = cmd
            .args
            .last()
            .and_then(|a| decode_script(a))
            .is_some_and(|outer| outer.contains("-Verb RunAs"));
        if !out.success() && elevated && script.contains("'/i'") {
            if let Some(log) = install_log_path(&script) {
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log)
                    .unwrap();
                file.write_all(out.stderr.as_bytes()).unwrap();
            }
            out.stderr.clear();
        }
        if out.success() && script.contains("'/i'") {
            for path in self.install_creates.lock().iter() {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(path, b"MZ").unwrap();
            }
        }
        Ok(out)
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &CommandSpec, _timeout: Duration) -> Result<CommandOutput, ExecError> {
        self.calls.lock().push(cmd.clone());
        match cmd.program.as_str() {
            "net" => Ok(self.net(&cmd.args)),
            "powershell.exe" => self.powershell(cmd),
            "reg" => Ok(CommandOutput::with_code(0)),
            other => Err(ExecError::Spawn {
                program: other.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
        }
    }
}

// ── Downloader ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDownloader {
    urls: Mutex<Vec<String>>,
    count: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeDownloader {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl Downloader for FakeDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(DownloadError::Request {
                url: url.to_string(),
                message: "connection reset".into(),
            });
        }
        std::fs::write(dest, b"msi").map_err(|source| DownloadError::Write {
            path: dest.display().to_string(),
            source,
        })?;
        Ok(3)
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Everything currently queued.
pub fn drain(rx: &Receiver<CoreEvent>) -> Vec<CoreEvent> {
    rx.try_iter().collect()
}

/// Collect events until one matches `done`, panicking after `timeout`.
pub fn wait_for<F>(rx: &Receiver<CoreEvent>, timeout: Duration, done: F) -> Vec<CoreEvent>
where
    F: Fn(&CoreEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        assert!(!left.is_zero(), "expected event not seen; got {seen:?}");
        if let Ok(ev) = rx.recv_timeout(left) {
            let finished = done(&ev);
            seen.push(ev);
            if finished {
                return seen;
            }
        }
    }
}

pub fn names(events: &[CoreEvent]) -> Vec<&'static str> {
    events.iter().map(CoreEvent::name).collect()
}
