//! Time-text parsing
//!
//! Pulls `M:SS` / `H:MM:SS` tokens out of free text. A leading minus sign marks
//! a countdown ("remaining") display. Anything that doesn't look like a time is
//! skipped, never reported as an error.

use regex::Regex;
use std::sync::LazyLock;

/// Matches `M:SS`, `MM:SS` and `H:MM:SS`, optionally prefixed with `-` or `−`.
static TIME_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([-\u{2212}])?(\d+):(\d{2})(?::(\d{2}))?").unwrap());

/// A single time reading found in text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeValue {
    /// Absolute value in whole seconds
    pub seconds: u64,

    /// The token carried a leading minus sign (countdown display)
    pub negative: bool,
}

/// Extract every time token from `text`, in document order.
pub fn parse_time_tokens(text: &str) -> Vec<TimeValue> {
    TIME_TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let first: u64 = caps.get(2)?.as_str().parse().ok()?;
            let second: u64 = caps.get(3)?.as_str().parse().ok()?;
            let seconds = match caps.get(4) {
                Some(third) => {
                    let third: u64 = third.as_str().parse().ok()?;
                    first
                        .checked_mul(3600)?
                        .checked_add(second * 60)?
                        .checked_add(third)?
                }
                None => first.checked_mul(60)?.checked_add(second)?,
            };
            Some(TimeValue {
                seconds,
                negative: caps.get(1).is_some(),
            })
        })
        .collect()
}

/// Parse the first time token in `text`, if any.
pub fn parse_time(text: &str) -> Option<TimeValue> {
    parse_time_tokens(text).into_iter().next()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_parse_never_panics(s in ".*") {
            let _ = parse_time_tokens(&s);
        }

        #[test]
        fn prop_minutes_seconds_value(m in 0u64..1000, s in 0u64..60) {
            let text = format!("{m}:{s:02}");
            prop_assert_eq!(parse_time(&text).map(|t| t.seconds), Some(m * 60 + s));
        }

        #[test]
        fn prop_hours_form_value(h in 0u64..24, m in 0u64..60, s in 0u64..60) {
            let text = format!("-{h}:{m:02}:{s:02}");
            let t = parse_time(&text).unwrap();
            prop_assert_eq!(t.seconds, h * 3600 + m * 60 + s);
            prop_assert!(t.negative);
        }

        #[test]
        fn prop_no_digits_no_tokens(s in "[a-zA-Z ]{0,40}") {
            prop_assert!(parse_time_tokens(&s).is_empty());
        }
    }
}
