//! Validation and sanitization of untrusted text fields
//!
//! `validate` rejects input outright; `sanitize_for_display` strips it down
//! to a conservative whitelist before it is handed to the desktop notifier
//! or a realtime client. Arguments are never passed through a shell, the
//! whitelist is applied regardless.

use crate::error::ValidationError;
use regex::Regex;
use std::sync::OnceLock;

/// Maximum accepted length of a title or message, in characters
pub const MAX_TEXT_LEN: usize = 500;

fn dangerous_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Shell metacharacters
            Regex::new(r"[;&|><`$(){}\[\]\\]").expect("valid regex"),
            // Path traversal
            Regex::new(r"\.\./").expect("valid regex"),
            Regex::new(r"(?i)<script").expect("valid regex"),
        ]
    })
}

/// Check a text field against the length limit and the dangerous patterns.
///
/// The text is never modified.
pub fn validate(text: &str) -> Result<(), ValidationError> {
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong { max: MAX_TEXT_LEN });
    }

    if dangerous_patterns().iter().any(|p| p.is_match(text)) {
        return Err(ValidationError::InvalidCharacters);
    }

    Ok(())
}

fn is_display_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | '-' | '\'')
}

/// Strip everything outside the display whitelist, trim, and truncate.
pub fn sanitize_for_display(text: &str) -> String {
    let kept: String = text.chars().filter(|&c| is_display_safe(c)).collect();
    kept.trim().chars().take(MAX_TEXT_LEN).collect::<String>().trim_end().to_string()
}
