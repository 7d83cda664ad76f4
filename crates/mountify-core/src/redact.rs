/// Secret redaction for anything that may reach a log line or a user message.
use regex::{NoExpand, Regex};

/// Marker substituted for every occurrence of a secret.
pub const REDACTION_MARKER: &str = "***";

/// Replace every literal occurrence of `secret` in `text` with `***`.
///
/// The secret is regex-escaped first, so passwords full of metacharacters
/// (`.*+?^${}()|[]\`) are matched literally.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    match Regex::new(&regex::escape(secret)) {
        Ok(re) => re.replace_all(text, NoExpand(REDACTION_MARKER)).into_owned(),
        // An escaped literal only fails to compile past the size limit.
        Err(_) => text.replace(secret, REDACTION_MARKER),
    }
}

/// Redact `secret` and keep only the first line of the result.
pub fn sanitize_error(text: &str, secret: &str) -> String {
    let redacted = redact_secret(text, secret);
    redacted
        .lines()
        .next()
        .unwrap_or_default()
        .trim_end()
        .to_string()
}
