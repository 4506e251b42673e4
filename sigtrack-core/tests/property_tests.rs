//! Property tests for outcome arithmetic and input coercion.
//!
//! Uses proptest to verify:
//! 1. Percent change matches the rounded formula for any positive base
//! 2. Percent change is never produced for a non-positive base
//! 3. Score coercion never panics and round-trips integers
//! 4. Forward close mapping is index-based regardless of calendar gaps

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use serde_json::json;
use sigtrack_core::data::DailyBar;
use sigtrack_core::ingest::{coerce_score, parse_price};
use sigtrack_core::percent_change;
use sigtrack_core::resolver::forward_closes;

fn arb_price() -> impl Strategy<Value = f64> {
    (0.01..5000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

proptest! {
    #[test]
    fn percent_change_matches_formula(base in arb_price(), forward in arb_price()) {
        prop_assume!(base > 0.0);
        let expected = ((forward - base) / base * 100.0 * 100.0).round() / 100.0;
        prop_assert_eq!(percent_change(forward, base), Some(expected));
    }

    #[test]
    fn percent_change_requires_positive_base(base in -1000.0..=0.0_f64, forward in arb_price()) {
        prop_assert_eq!(percent_change(forward, base), None);
    }

    #[test]
    fn integer_scores_round_trip(score in -10_000i64..10_000) {
        prop_assert_eq!(coerce_score(&json!(score)), score);
        prop_assert_eq!(coerce_score(&json!(score.to_string())), score);
    }

    #[test]
    fn arbitrary_text_scores_never_panic(text in ".*") {
        let _ = coerce_score(&json!(text));
        let _ = parse_price(&json!(text));
    }

    #[test]
    fn offsets_follow_sessions_not_calendar(gaps in prop::collection::vec(1i64..5, 11..20)) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut date = start;
        let mut bars = Vec::new();
        for (i, gap) in gaps.iter().enumerate() {
            let close = 100.0 + i as f64;
            bars.push(DailyBar {
                date,
                open: close,
                high: close,
                low: close,
                close,
                volume: 0,
                adj_close: close,
            });
            date += Duration::days(*gap);
        }

        let closes = forward_closes(&bars, start).unwrap();
        prop_assert_eq!(closes, [Some(101.0), Some(103.0), Some(105.0), Some(110.0)]);
    }
}
