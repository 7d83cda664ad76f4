/// `net use` command construction for SSHFS-Win mappings.
///
/// The mapping target is `\\sshfs\<user>@<host>!<port><remotePath>`. Profile
/// fields are checked before they are embedded: a stray `@`, `!` or `\` in the
/// user or host would silently retarget the mapping.
use crate::error::MountError;
use crate::model::ServerProfile;
use crate::platform::CommandSpec;

const NET: &str = "net";

/// Build the UNC mapping target for `profile`, rejecting unsafe fields.
pub fn unc_target(profile: &ServerProfile) -> Result<String, MountError> {
    validate_username(&profile.username)?;
    validate_host(&profile.host)?;
    let remote_path = profile.effective_remote_path();
    validate_remote_path(remote_path)?;
    Ok(format!(
        "\\\\sshfs\\{}@{}!{}{}",
        profile.username,
        profile.host,
        profile.effective_port(),
        remote_path
    ))
}

/// `net use S: <unc> <password>`
pub fn map_drive(letter: char, unc: &str, password: &str) -> CommandSpec {
    CommandSpec::new(NET)
        .args(["use", &drive(letter), unc, password])
        .with_secret(password)
}

/// `net use S: /delete /y`, idempotent removal by letter.
pub fn delete_drive(letter: char) -> CommandSpec {
    CommandSpec::new(NET).args(["use", &drive(letter), "/delete", "/y"])
}

/// `net use <unc> /delete /y`, removal by target, for mappings created in
/// another session where the letter form fails silently.
pub fn delete_unc(unc: &str) -> CommandSpec {
    CommandSpec::new(NET).args(["use", unc, "/delete", "/y"])
}

/// `net use S:` exits zero only when the letter is mapped.
pub fn query_drive(letter: char) -> CommandSpec {
    CommandSpec::new(NET).args(["use", &drive(letter)])
}

fn drive(letter: char) -> String {
    format!("{}:", letter.to_ascii_uppercase())
}

fn validate_username(username: &str) -> Result<(), MountError> {
    if username.is_empty() {
        return Err(invalid("username is empty"));
    }
    if let Some(c) = username
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '@' | '!' | '\\' | '/' | '"'))
    {
        return Err(invalid(&format!("username contains {c:?}")));
    }
    Ok(())
}

fn validate_host(host: &str) -> Result<(), MountError> {
    if host.is_empty() {
        return Err(invalid("host is empty"));
    }
    if let Some(c) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')))
    {
        return Err(invalid(&format!("host contains {c:?}")));
    }
    Ok(())
}

fn validate_remote_path(path: &str) -> Result<(), MountError> {
    if !path.starts_with('/') {
        return Err(invalid("remote path must start with '/'"));
    }
    if let Some(c) = path.chars().find(|c| c.is_control() || matches!(c, '"' | '\\')) {
        return Err(invalid(&format!("remote path contains {c:?}")));
    }
    Ok(())
}

fn invalid(reason: &str) -> MountError {
    MountError::InvalidProfile(reason.to_string())
}
