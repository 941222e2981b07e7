//! Sequential invoice numbers.
//!
//! The next number continues from the largest trailing integer among a user's
//! existing invoice numbers. Gaps, other prefixes and non-numeric entries are
//! tolerated.

use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)$").expect("trailing digits pattern is valid"));

/// Minimum width of the numeric part. Longer numbers are never truncated.
const NUMBER_WIDTH: usize = 4;

/// Trailing integer of an invoice number, if any.
pub fn trailing_number(invoice_number: &str) -> Option<u64> {
    TRAILING_DIGITS
        .captures(invoice_number.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Next invoice number for `prefix` given the numbers already issued.
pub fn next_invoice_number<'a, I>(existing: I, prefix: &str) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let max = existing
        .into_iter()
        .flatten()
        .filter_map(trailing_number)
        .max()
        .unwrap_or(0);

    format_invoice_number(prefix, max.saturating_add(1))
}

pub fn format_invoice_number(prefix: &str, sequence: u64) -> String {
    format!("{prefix}{sequence:0width$}", width = NUMBER_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continues_from_largest_trailing_integer() {
        let existing = [Some("INV-1"), Some("INV-0007"), Some("INV-abc"), None];
        assert_eq!(next_invoice_number(existing, "INV-"), "INV-0008");
    }

    #[test]
    fn first_number_is_one() {
        assert_eq!(next_invoice_number(Vec::<Option<&str>>::new(), "INV-"), "INV-0001");
        assert_eq!(next_invoice_number([None, None], "INV-"), "INV-0001");
    }

    #[test]
    fn wide_numbers_are_not_truncated() {
        assert_eq!(next_invoice_number([Some("INV-9999")], "INV-"), "INV-10000");
    }

    #[test]
    fn gaps_are_not_filled() {
        let existing = [Some("INV-0001"), Some("INV-0042")];
        assert_eq!(next_invoice_number(existing, "INV-"), "INV-0043");
    }

    #[test]
    fn custom_prefix_is_applied_and_history_from_other_prefixes_counts() {
        let existing = [Some("OLD-0010"), Some("ACME/2024/0003")];
        assert_eq!(next_invoice_number(existing, "ACME/"), "ACME/0011");
    }

    #[test]
    fn trailing_number_ignores_non_numeric_suffix() {
        assert_eq!(trailing_number("INV-12"), Some(12));
        assert_eq!(trailing_number("INV-12a"), None);
        assert_eq!(trailing_number(""), None);
    }
}
