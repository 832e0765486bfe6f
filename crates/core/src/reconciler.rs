//! Record Identity Reconciler.
//!
//! Proposes the identifier for the next record an identity uploads, given the identifiers
//! it already owns on the record manager.
//!
//! - No identifiers: `"1"`.
//! - Only decimal identifiers: one more than the largest of them. The arithmetic is done on
//!   the decimal strings, so identifiers longer than any machine integer still work and
//!   leading zeros are ignored when comparing.
//! - Any other identifier present: a time-derived fallback, see [`fallback_identifier`].

use crate::constants::FIRST_RECORD_ID;
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Last fallback value handed out in this process.
static LAST_FALLBACK: AtomicU64 = AtomicU64::new(0);

/// Computes the next record identifier to propose.
///
/// Never fails. Pure over `existing` apart from the process-wide fallback counter.
pub fn compute_next_identifier<S: AsRef<str>>(existing: &[S]) -> String {
    if existing.is_empty() {
        return FIRST_RECORD_ID.to_string();
    }

    if existing.iter().all(|id| is_decimal(id.as_ref())) {
        let max = existing
            .iter()
            .map(|id| strip_leading_zeros(id.as_ref()))
            .max_by(|a, b| compare_decimal(a, b))
            .unwrap_or("0");
        return increment_decimal(max);
    }

    let numeric_floor = existing
        .iter()
        .filter_map(|id| {
            let id: &str = id.as_ref();
            if is_decimal(id) { id.parse::<u64>().ok() } else { None }
        })
        .max()
        .map_or(0, |max| max.saturating_add(1));

    fallback_identifier(numeric_floor).to_string()
}

/// Time-derived identifier for identity sets that are not purely numeric.
///
/// The value is the current time in milliseconds, raised when needed so that it is
/// strictly greater than every value this process returned before and at least `floor`.
/// It therefore cannot repeat within one process run, and never equals a numeric
/// identifier below `floor`.
pub fn fallback_identifier(floor: u64) -> u64 {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);

    let previous = LAST_FALLBACK
        .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |last| {
            Some(next_fallback(last, now, floor))
        })
        .unwrap_or_else(|last| last);

    next_fallback(previous, now, floor)
}

fn next_fallback(last: u64, now: u64, floor: u64) -> u64 {
    now.max(last.saturating_add(1)).max(floor)
}

fn is_decimal(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

fn strip_leading_zeros(id: &str) -> &str {
    let trimmed = id.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

/// Compares two decimal strings without leading zeros.
fn compare_decimal(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn increment_decimal(value: &str) -> String {
    let mut digits = value.as_bytes().to_vec();

    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return String::from_utf8_lossy(&digits).into_owned();
        }
    }

    // Every digit carried.
    let mut carried = String::with_capacity(digits.len() + 1);
    carried.push('1');
    carried.push_str(&String::from_utf8_lossy(&digits));
    carried
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_empty_set_starts_at_one() {
        let existing: [&str; 0] = [];
        assert_eq!(compute_next_identifier(&existing), "1");
    }

    #[test]
    fn test_numeric_set_returns_max_plus_one() {
        assert_eq!(compute_next_identifier(&["3", "1", "5"]), "6");
    }

    #[test]
    fn test_numeric_order_is_not_lexicographic() {
        assert_eq!(compute_next_identifier(&["9", "10", "2"]), "11");
    }

    #[test]
    fn test_leading_zeros_are_ignored() {
        assert_eq!(compute_next_identifier(&["007"]), "8");
        assert_eq!(compute_next_identifier(&["0", "000"]), "1");
    }

    #[test]
    fn test_carry_extends_the_number() {
        assert_eq!(compute_next_identifier(&["99"]), "100");
        assert_eq!(
            compute_next_identifier(&["18446744073709551615"]),
            "18446744073709551616"
        );
        assert_eq!(
            compute_next_identifier(&["123456789012345678901234567890"]),
            "123456789012345678901234567891"
        );
    }

    #[test]
    fn test_mixed_set_falls_back_to_numeric_value() {
        let next = compute_next_identifier(&["3", "abc"]);

        assert!(next.bytes().all(|b| b.is_ascii_digit()));
        assert_ne!(next, "3");
        assert_ne!(next, "abc");
    }

    #[test]
    fn test_fallback_exceeds_large_numeric_identifiers() {
        // Well above the current time in milliseconds.
        let next = compute_next_identifier(&["90000000000000", "draft"]);

        let value: u64 = next.parse().expect("fallback should be numeric");
        assert!(value > 90_000_000_000_000);
    }

    #[test]
    fn test_empty_string_is_not_numeric() {
        let next = compute_next_identifier(&["1", ""]);

        assert_ne!(next, "2");
        assert!(next.parse::<u64>().is_ok());
    }

    #[test]
    fn test_fallback_is_unique_across_rapid_calls() {
        let seen: HashSet<String> = (0..1000)
            .map(|_| compute_next_identifier(&["3", "abc"]))
            .collect();

        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_fallback_is_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| (0..250).map(|_| fallback_identifier(0)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().expect("thread should finish") {
                assert!(seen.insert(value), "duplicate fallback {}", value);
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_next_fallback_rules() {
        assert_eq!(next_fallback(0, 100, 0), 100);
        assert_eq!(next_fallback(100, 100, 0), 101);
        assert_eq!(next_fallback(5, 100, 500), 500);
        assert_eq!(next_fallback(u64::MAX, 0, 0), u64::MAX);
    }
}
