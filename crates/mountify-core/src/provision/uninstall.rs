/// Uninstall-entry resolution from the Windows "Uninstall" registry trees.
///
/// Both the 32-bit (`Wow6432Node`) and native trees are listed through
/// PowerShell as JSON and matched here, so the selection rules are plain
/// Rust and testable off-Windows.
use super::session;
use crate::platform::CommandSpec;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::warn;

/// Uninstall trees, 32-bit view first.
pub const UNINSTALL_KEYS: [&str; 2] = [
    r"HKLM:\Software\Wow6432Node\Microsoft\Windows\CurrentVersion\Uninstall\*",
    r"HKLM:\Software\Microsoft\Windows\CurrentVersion\Uninstall\*",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UninstallEntry {
    #[serde(rename = "DisplayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "UninstallString", default)]
    pub uninstall_string: Option<String>,
}

/// `ConvertTo-Json` emits a bare object for a single result.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<UninstallEntry>),
    One(UninstallEntry),
}

/// Command listing `DisplayName`/`UninstallString` of every entry in both
/// trees as JSON.
pub fn query_command() -> CommandSpec {
    let keys = UNINSTALL_KEYS
        .iter()
        .map(|k| session::ps_quote(k))
        .collect::<Vec<_>>()
        .join(",");
    let script = format!(
        "$ErrorActionPreference = 'SilentlyContinue'\n\
         $entries = foreach ($k in @({keys})) {{ Get-ItemProperty $k | Where-Object {{ $_.DisplayName }} | Select-Object DisplayName, UninstallString }}\n\
         ConvertTo-Json -Compress -InputObject @($entries)\n"
    );
    session::powershell(&script)
}

/// Parse the query output. Anything unparseable reads as "no entries".
pub fn parse_entries(json: &str) -> Vec<UninstallEntry> {
    let json = json.trim();
    if json.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<OneOrMany>(json) {
        Ok(OneOrMany::Many(entries)) => entries,
        Ok(OneOrMany::One(entry)) => vec![entry],
        Err(e) => {
            warn!("Unreadable uninstall listing: {}", e);
            Vec::new()
        }
    }
}

/// Pick the entry for `name`: case-insensitive substring match on the
/// display name, preferring an exact name match, then an MSI-based entry,
/// then the first hit in tree order.
pub fn select_entry<'a>(entries: &'a [UninstallEntry], name: &str) -> Option<&'a UninstallEntry> {
    let needle = name.to_lowercase();
    let candidates: Vec<&UninstallEntry> = entries
        .iter()
        .filter(|e| {
            e.display_name
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .collect();

    candidates
        .iter()
        .find(|e| {
            e.display_name
                .as_deref()
                .is_some_and(|d| d.trim().eq_ignore_ascii_case(name))
        })
        .or_else(|| candidates.iter().find(|e| is_msi(e)))
        .or_else(|| candidates.first())
        .copied()
}

/// Whether the entry is removed through the Windows Installer.
pub fn is_msi(entry: &UninstallEntry) -> bool {
    entry
        .uninstall_string
        .as_deref()
        .is_some_and(|s| s.to_lowercase().contains("msiexec"))
}

/// The `{GUID}` product code embedded in an msiexec uninstall string.
pub fn product_code(uninstall_string: &str) -> Option<String> {
    static GUID: OnceLock<Option<Regex>> = OnceLock::new();
    GUID.get_or_init(|| {
        Regex::new(r"\{[0-9A-Fa-f]{8}(?:-[0-9A-Fa-f]{4}){3}-[0-9A-Fa-f]{12}\}").ok()
    })
    .as_ref()?
    .find(uninstall_string)
    .map(|m| m.as_str().to_string())
}
