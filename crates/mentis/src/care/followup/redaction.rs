use std::sync::OnceLock;

use regex::Regex;

pub const EMAIL_PLACEHOLDER: &str = "[redacted-email]";
pub const PHONE_PLACEHOLDER: &str = "[redacted-phone]";
pub const NUMBER_PLACEHOLDER: &str = "[redacted-number]";

struct Patterns {
    email: Regex,
    phone: Regex,
    bracketed_phone: Regex,
    long_number: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email pattern compiles"),
        phone: Regex::new(r"\b(?:\+?\d{1,3}[-.\s]?)?(?:\d{3}[-.\s]?){2}\d{4}\b")
            .expect("phone pattern compiles"),
        bracketed_phone: Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(\d{3}\)[-.\s]?\d{3}[-.\s]?\d{4}\b")
            .expect("bracketed phone pattern compiles"),
        long_number: Regex::new(r"\b\d{5,}\b").expect("number pattern compiles"),
    })
}

/// Replace email addresses, phone numbers, and digit runs of five or more
/// with fixed placeholders. Emails go first so their digits are not split.
pub fn redact(text: &str) -> String {
    let patterns = patterns();
    let text = patterns.email.replace_all(text, EMAIL_PLACEHOLDER);
    let text = patterns.bracketed_phone.replace_all(&text, PHONE_PLACEHOLDER);
    let text = patterns.phone.replace_all(&text, PHONE_PLACEHOLDER);
    let text = patterns.long_number.replace_all(&text, NUMBER_PLACEHOLDER);
    text.trim().to_string()
}

pub fn redact_all(items: &[String]) -> Vec<String> {
    items.iter().map(|item| redact(item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_phone_and_email() {
        let redacted = redact("call me at 555-123-4567 or a@b.com");
        assert_eq!(
            redacted,
            "call me at [redacted-phone] or [redacted-email]"
        );
    }

    #[test]
    fn replaces_long_digit_runs_but_keeps_short_numbers() {
        assert_eq!(
            redact("my id is 4815162342 and I slept 7 hours"),
            "my id is [redacted-phone] and I slept 7 hours"
        );
        assert_eq!(
            redact("postcode 90210, room 12"),
            "postcode [redacted-number], room 12"
        );
    }

    #[test]
    fn handles_international_phone_format() {
        let redacted = redact("reach me on +44 207 946 0958 tonight");
        assert!(!redacted.contains("946"));
        assert!(redacted.contains(PHONE_PLACEHOLDER));
    }

    #[test]
    fn replaces_bracketed_area_codes() {
        assert_eq!(
            redact("call (555) 123-4567 please"),
            "call [redacted-phone] please"
        );
        assert_eq!(
            redact("office: +1 (555) 123.4567"),
            "office: [redacted-phone]"
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(redact("   nothing sensitive  "), "nothing sensitive");
        assert_eq!(redact(""), "");
    }
}
