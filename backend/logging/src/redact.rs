//! Redaction helpers for log output.

use std::sync::LazyLock;

use regex::Regex;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+[1-9]\d{6,16}").unwrap());
static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Bearer\s+[A-Za-z0-9\-._~+/]+=*)|(?:xi-api-key:\s*\S+)|(?:AC[0-9a-f]{32})")
        .unwrap()
});

/// Mask an E.164 number for logging, keeping the country-code region and
/// the last two digits: "+15551234567" -> "+155•••••67".
pub fn mask_destination(number: &str) -> String {
    let Some(digits) = number.strip_prefix('+') else {
        return "[invalid-number]".into();
    };
    // Byte indexing below requires single-byte characters.
    if digits.len() < 6 || !digits.is_ascii() {
        return "[invalid-number]".into();
    }
    let head = &digits[..3];
    let tail = &digits[digits.len() - 2..];
    format!("+{head}{}{tail}", "•".repeat(digits.len() - 5))
}

/// Scrub phone numbers and credentials from free-form text before it is
/// logged (error messages from providers may echo either).
pub fn redact_text(input: &str) -> String {
    let pass = PHONE_RE.replace_all(input, "[redacted-number]");
    CREDENTIAL_RE.replace_all(&pass, "[redacted-credential]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_destination() {
        let masked = mask_destination("+15551234567");
        assert!(masked.starts_with("+155"));
        assert!(masked.ends_with("67"));
        assert!(!masked.contains("1234"));
    }

    #[test]
    fn short_or_malformed_numbers_are_not_leaked() {
        assert_eq!(mask_destination("5551234567"), "[invalid-number]");
        assert_eq!(mask_destination("+123"), "[invalid-number]");
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        assert_eq!(mask_destination("+ééééééé"), "[invalid-number]");
        assert_eq!(mask_destination("+555é234567"), "[invalid-number]");
    }

    #[test]
    fn scrubs_numbers_and_credentials_from_text() {
        let raw = "call to +15551234567 failed; auth Bearer abc.def.ghi rejected";
        let clean = redact_text(raw);
        assert!(!clean.contains("+15551234567"));
        assert!(!clean.contains("abc.def.ghi"));
        assert!(clean.contains("[redacted-number]"));
    }
}
