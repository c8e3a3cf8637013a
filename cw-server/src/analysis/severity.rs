//! Severity extraction from analysis text
//!
//! The analysis service returns free text; parsing it is best-effort by
//! design. This extractor is deterministic and total: it always produces an
//! integer in 1..=10, preferring a plausible value over reporting failure.
//!
//! Stage order is part of the behavioral contract:
//! 1. case-insensitive `severity score: <digits>` marker, accepted only when
//!    the captured value is in range;
//! 2. first whitespace-delimited all-digit token with value in range;
//! 3. the fixed default (5).

use once_cell::sync::Lazy;
use regex::Regex;

/// Fallback severity when the text yields nothing usable
pub const DEFAULT_SEVERITY: u8 = 5;

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)severity\s*score:\s*(\d+)").expect("valid severity pattern"));

/// Parse an analysis text into a severity score in 1..=10
pub fn extract_severity(text: &str) -> u8 {
    if let Some(captures) = MARKER.captures(text) {
        if let Ok(value) = captures[1].parse::<u8>() {
            if (1..=10).contains(&value) {
                return value;
            }
        }
        // Out-of-range marker falls through to the token scan
    }

    for token in text.split_whitespace() {
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(value) = token.parse::<u8>() {
                if (1..=10).contains(&value) {
                    return value;
                }
            }
        }
    }

    DEFAULT_SEVERITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_match() {
        assert_eq!(extract_severity("Severity score: 9, details follow"), 9);
        assert_eq!(extract_severity("severity score: 3"), 3);
        assert_eq!(extract_severity("SEVERITY SCORE:10"), 10);
        assert_eq!(extract_severity("Severity  Score: 7 (moderate)"), 7);
    }

    #[test]
    fn test_marker_wins_over_earlier_token() {
        // Stage 1 runs before the token scan even when a plausible number
        // appears earlier in the text
        assert_eq!(extract_severity("3 people affected. Severity score: 9"), 9);
    }

    #[test]
    fn test_token_fallback() {
        assert_eq!(extract_severity("no marker here but 4 is notable"), 4);
        assert_eq!(extract_severity("risks: flooding 8 roads closed"), 8);
    }

    #[test]
    fn test_token_fallback_skips_out_of_range() {
        // 120 and 0 are not valid severities; 6 is the first in range
        assert_eq!(extract_severity("120 homes, 0 casualties, level 6 alert"), 6);
        // Numbers embedded in words are not whitespace-delimited tokens
        assert_eq!(extract_severity("category5 storm"), DEFAULT_SEVERITY);
    }

    #[test]
    fn test_default_when_nothing_numeric() {
        assert_eq!(extract_severity("nothing numeric at all"), DEFAULT_SEVERITY);
        assert_eq!(extract_severity(""), DEFAULT_SEVERITY);
    }

    #[test]
    fn test_out_of_range_marker_falls_through() {
        // Marker captured 15, out of range; token scan then skips "15" too
        assert_eq!(extract_severity("Severity score: 15"), DEFAULT_SEVERITY);
        // ...but an in-range token later still wins
        assert_eq!(extract_severity("Severity score: 15 revised to 8"), 8);
    }

    #[test]
    fn test_huge_numbers_do_not_panic() {
        assert_eq!(
            extract_severity("99999999999999999999 affected"),
            DEFAULT_SEVERITY
        );
    }

    #[test]
    fn test_idempotent() {
        let text = "Severity score: 6. Flooding expected across 3 districts.";
        let first = extract_severity(text);
        for _ in 0..10 {
            assert_eq!(extract_severity(text), first);
        }
    }
}
