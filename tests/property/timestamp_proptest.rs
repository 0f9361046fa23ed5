//! Property-based tests for record date parsing

use chrono::{TimeZone, Utc};
use clubsync::shared::timestamp::parse_timestamp;
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_bare_dates_are_utc_midnight(year in 1970i32..2200, month in 1u32..=12, day in 1u32..=28) {
        let raw = format!("{year:04}-{month:02}-{day:02}");
        let expected = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single();
        prop_assert_eq!(parse_timestamp(&raw), expected);
    }

    #[test]
    fn test_rfc3339_matches_chrono(seconds in 0i64..8_000_000_000) {
        let instant = Utc.timestamp_opt(seconds, 0).single();
        prop_assume!(instant.is_some());
        let instant = instant.unwrap_or_default();
        prop_assert_eq!(parse_timestamp(&instant.to_rfc3339()), Some(instant));
    }

    #[test]
    fn test_parse_never_panics(raw in ".*") {
        let _ = parse_timestamp(&raw);
    }

    #[test]
    fn test_letters_are_rejected(raw in "[a-zA-Z ]{0,16}") {
        prop_assert!(parse_timestamp(&raw).is_none());
    }
}
