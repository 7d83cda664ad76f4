/// PowerShell session construction for installer work.
///
/// Scripts are handed to PowerShell through `-EncodedCommand` (base64 of
/// UTF-16LE), so paths and product codes never pass through a second round of
/// command-line quoting. When the process is not elevated the script is
/// wrapped in one `Start-Process -Verb RunAs` call: one UAC prompt per
/// session, however many packages it installs.
///
/// The elevated child's stderr does not reach us through `RunAs`, so install
/// scripts also append their failure text to a log file the caller reads back.
use crate::platform::CommandSpec;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use std::path::{Path, PathBuf};

const POWERSHELL: &str = "powershell.exe";

/// msiexec exit code meaning "installed, reboot required"; still a success
/// for our purposes since `/norestart` defers it.
const MSI_SUCCESS_REBOOT_REQUIRED: i32 = 3010;

/// Quote `value` as a PowerShell single-quoted literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Base64 of the UTF-16LE script, as `-EncodedCommand` expects.
pub fn encode_script(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

/// Inverse of [`encode_script`].
pub fn decode_script(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// `powershell.exe ... -EncodedCommand <script>` in the current session.
pub fn powershell(script: &str) -> CommandSpec {
    CommandSpec::new(POWERSHELL).args([
        "-NoProfile",
        "-NonInteractive",
        "-ExecutionPolicy",
        "Bypass",
        "-EncodedCommand",
        &encode_script(script),
    ])
}

/// Run `script` with admin rights: directly if `already_elevated`, otherwise
/// inside a single elevated child whose exit code is passed through.
pub fn elevated(script: &str, already_elevated: bool) -> CommandSpec {
    if already_elevated {
        return powershell(script);
    }
    let wrapper = format!(
        "$ErrorActionPreference = 'Stop'\n\
         $p = Start-Process -FilePath {} -Verb RunAs -Wait -PassThru -WindowStyle Hidden \
         -ArgumentList @('-NoProfile','-NonInteractive','-ExecutionPolicy','Bypass','-EncodedCommand',{})\n\
         exit $p.ExitCode\n",
        ps_quote(POWERSHELL),
        ps_quote(&encode_script(script)),
    );
    powershell(&wrapper)
}

/// Script that installs each MSI in order, silently and without reboot,
/// stopping at the first failure. Failure text goes to stderr and is
/// appended to `log`.
pub fn install_script(msi_paths: &[&Path], log: &Path) -> String {
    let mut script = format!(
        "$ErrorActionPreference = 'Stop'\n\
         $log = {}\n\
         function Fail($msg, $code) {{ Add-Content -LiteralPath $log -Value $msg; [Console]::Error.WriteLine($msg); exit $code }}\n\
         trap {{ Fail ('install session error: ' + $_) 1 }}\n",
        ps_quote(&log.display().to_string()),
    );
    for path in msi_paths {
        let path = path.display().to_string();
        // msiexec receives the joined argument string, so the path carries
        // its own double quotes.
        script.push_str(&format!(
            "$code = (Start-Process -FilePath 'msiexec.exe' -ArgumentList @('/i',{},'/qn','/norestart') -Wait -PassThru).ExitCode\n\
             if ($code -ne 0 -and $code -ne {MSI_SUCCESS_REBOOT_REQUIRED}) {{ Fail ({} + $code) $code }}\n",
            ps_quote(&format!("\"{path}\"")),
            ps_quote(&format!("msiexec failed for {path} with code ")),
        ));
    }
    script.push_str("exit 0\n");
    script
}

/// Log file an install script writes its failure text to.
pub fn install_log_path(script: &str) -> Option<PathBuf> {
    let re = Regex::new(r"(?m)^\$log = '((?:[^']|'')*)'$").ok()?;
    let caps = re.captures(script)?;
    Some(PathBuf::from(caps[1].replace("''", "'")))
}

/// Script that removes the MSI product `product_code` silently.
pub fn uninstall_script(product_code: &str) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'\n\
         $code = (Start-Process -FilePath 'msiexec.exe' -ArgumentList @('/x',{},'/qn','/norestart') -Wait -PassThru).ExitCode\n\
         exit $code\n",
        ps_quote(product_code)
    )
}

/// Recover the innermost script a session command will run, unwrapping the
/// elevation wrapper if present. Used for debug logging.
pub fn unwrap_script(cmd: &CommandSpec) -> Option<String> {
    let pos = cmd.args.iter().position(|a| a == "-EncodedCommand")?;
    let outer = decode_script(cmd.args.get(pos + 1)?)?;
    let nested = Regex::new(r"'-EncodedCommand','([A-Za-z0-9+/=]+)'").ok()?;
    match nested.captures(&outer) {
        Some(caps) => decode_script(&caps[1]),
        None => Some(outer),
    }
}

/// Number of `msiexec /i` directives in a script.
pub fn install_directive_count(script: &str) -> usize {
    script.matches("@('/i',").count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_round_trips_unicode() {
        let script = "Write-Host 'Grüße — ✓'";
        assert_eq!(decode_script(&encode_script(script)).unwrap(), script);
    }

    #[test]
    fn known_encoding_matches_powershell() {
        // [Convert]::ToBase64String([Text.Encoding]::Unicode.GetBytes('dir'))
        assert_eq!(encode_script("dir"), "ZABpAHIA");
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(ps_quote("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn two_packages_share_one_elevated_session() {
        let a = PathBuf::from(r"C:\Temp\winfsp.msi");
        let b = PathBuf::from(r"C:\Users\Jo O'Neil\Temp\sshfs-win.msi");
        let log = PathBuf::from(r"C:\Temp\mountify-install.log");
        let cmd = elevated(&install_script(&[&a, &b], &log), false);

        assert_eq!(cmd.program, "powershell.exe");
        let outer = decode_script(cmd.args.last().unwrap()).unwrap();
        assert_eq!(outer.matches("-Verb RunAs").count(), 1);

        let inner = unwrap_script(&cmd).unwrap();
        assert_eq!(install_directive_count(&inner), 2);
        assert!(inner.contains(r#"'"C:\Users\Jo O''Neil\Temp\sshfs-win.msi"'"#));
        assert_eq!(inner.matches("'/qn','/norestart'").count(), 2);
    }

    #[test]
    fn elevated_process_skips_runas() {
        let cmd = elevated(&uninstall_script("{ABC}"), true);
        let script = unwrap_script(&cmd).unwrap();
        assert!(!script.contains("RunAs"));
        assert!(script.contains("@('/x','{ABC}','/qn','/norestart')"));
    }

    #[test]
    fn install_failures_are_logged_for_the_caller() {
        let msi = PathBuf::from(r"C:\Temp\winfsp.msi");
        let log = PathBuf::from(r"C:\Users\Jo O'Neil\AppData\Local\Temp\mountify-install.log");
        let script = install_script(&[&msi], &log);

        assert_eq!(install_log_path(&script), Some(log));
        assert!(script.contains("Add-Content -LiteralPath $log"));
        assert!(script.contains("Fail ('msiexec failed for C:\\Temp\\winfsp.msi with code ' + $code) $code"));
        assert!(script.contains("trap {"));
    }
}
