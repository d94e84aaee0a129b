//! Input sanitising and the fixed registration rules.

use regex::Regex;
use std::sync::LazyLock;

pub const MIN_EMAIL_LEN: usize = 6;
pub const MIN_PASSWORD_LEN: usize = 16;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const VERIFICATION_CODE_LEN: usize = 8;

const WEAK_PATTERNS: [&str; 5] = ["password", "123456", "qwerty", "admin", "letmein"];

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is valid")
});

/// Drops control characters other than tab, newline and carriage return, then
/// trims surrounding whitespace.
#[must_use]
pub fn sanitize_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    sanitize_input(email).to_lowercase()
}

/// Format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    email_normalized.len() >= MIN_EMAIL_LEN && EMAIL_RE.is_match(email_normalized)
}

/// Checks length, character classes and well-known weak substrings.
///
/// # Errors
/// Returns the message to show the user.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err("Password must be at least 16 characters long");
    }
    if len > MAX_PASSWORD_LEN {
        return Err("Password must be less than 128 characters long");
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control());

    if !(has_upper && has_lower && has_digit && has_symbol) {
        return Err(
            "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character",
        );
    }

    let lowered = password.to_lowercase();
    if WEAK_PATTERNS.iter().any(|weak| lowered.contains(weak)) {
        return Err("Password contains common patterns and is not secure");
    }

    Ok(())
}

#[must_use]
pub fn valid_verification_code(code: &str) -> bool {
    code.len() == VERIFICATION_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern_compiles() {
        assert!(EMAIL_RE.is_match("user@example.com"));
        assert!(!EMAIL_RE.is_match("user@localhost"));
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_input("  a\u{0}b\u{7}c  "), "abc");
        assert_eq!(sanitize_input("tab\there"), "tab\there");
        assert_eq!(sanitize_input("\r\nline\n"), "line");
    }

    #[test]
    fn normalize_email_lowercases() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn valid_email_accepts_common_shapes() {
        for email in [
            "user@example.com",
            "first.last+tag@sub.example.co",
            "a_b%c@x-y.io",
        ] {
            assert!(valid_email(email), "{email} should be valid");
        }
    }

    #[test]
    fn valid_email_rejects_bad_shapes() {
        for email in [
            "",
            "a@b.c",
            "no-at-sign.com",
            "user@domain",
            "user@domain.c",
            "user name@example.com",
            "user@@example.com",
        ] {
            assert!(!valid_email(email), "{email} should be invalid");
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("Correct-Horse-Battery-9").is_ok());
        assert!(validate_password("Short-1a").is_err());
        assert!(validate_password(&format!("Aa1!{}", "x".repeat(125))).is_err());
        assert!(validate_password("alllowercase-with-digit-1").is_err());
        assert!(validate_password("ALLUPPERCASE-WITH-DIGIT-1").is_err());
        assert!(validate_password("NoDigitsHere-AtAll").is_err());
        assert!(validate_password("NoSymbolsHere1234xyz").is_err());
    }

    #[test]
    fn password_rejects_weak_patterns() {
        for password in [
            "MyPassword-IsLong-1",
            "Abc-123456-LongEnough",
            "Qwerty-Keyboard-Row-9",
            "Super-Admin-Account-7",
            "LetMeIn-Please-Now-3",
        ] {
            assert_eq!(
                validate_password(password),
                Err("Password contains common patterns and is not secure"),
                "{password} should be rejected"
            );
        }
    }

    #[test]
    fn password_length_counts_characters() {
        // 16 characters, more than 16 bytes.
        assert!(validate_password("Ünïcødé-Pässw0rd").is_ok());
    }

    #[test]
    fn verification_code_format() {
        assert!(valid_verification_code("12345678"));
        assert!(!valid_verification_code("1234567"));
        assert!(!valid_verification_code("123456789"));
        assert!(!valid_verification_code("1234567a"));
        assert!(!valid_verification_code("１２３４５６７８"));
    }
}
