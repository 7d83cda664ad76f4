/// Start-with-Windows registration.
///
/// Autostart is a `Mountify` value under the per-user `Run` key whose data
/// launches this executable with the `startup` subcommand. Both directions go
/// through `reg.exe` on the command runner, so no admin token is needed and
/// the writes can be observed in tests.
use crate::error::ExecError;
use crate::platform::{CommandRunner, CommandSpec};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";
pub const VALUE_NAME: &str = "Mountify";

const REG: &str = "reg";
const REG_TIMEOUT: Duration = Duration::from_secs(10);

/// Value data for the `Run` entry: the quoted executable plus `startup`.
pub fn launch_command(exe: &Path) -> String {
    format!("\"{}\" startup", exe.display())
}

pub fn enable_command(exe: &Path) -> CommandSpec {
    CommandSpec::new(REG).args([
        "add",
        RUN_KEY,
        "/v",
        VALUE_NAME,
        "/t",
        "REG_SZ",
        "/d",
        &launch_command(exe),
        "/f",
    ])
}

pub fn disable_command() -> CommandSpec {
    CommandSpec::new(REG).args(["delete", RUN_KEY, "/v", VALUE_NAME, "/f"])
}

/// Add or remove the `Run` entry.
///
/// Removing an entry that is not there is not an error: `reg delete` exits
/// non-zero in that case and the result is the same.
pub fn apply(runner: &dyn CommandRunner, enabled: bool, exe: &Path) -> Result<(), ExecError> {
    if enabled {
        let out = runner.run(&enable_command(exe), REG_TIMEOUT)?;
        if !out.success() {
            return Err(ExecError::NonZero {
                program: REG.into(),
                code: out.exit_code(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        info!("Registered {} for start with Windows", exe.display());
    } else {
        let out = runner.run(&disable_command(), REG_TIMEOUT)?;
        if !out.success() {
            warn!("No start-with-Windows entry to remove (exit {})", out.exit_code());
        } else {
            info!("Removed start-with-Windows entry");
        }
    }
    Ok(())
}
