//! Trading-day arithmetic at day granularity.
//!
//! There is no holiday calendar: a weekday is always treated as a session.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::domain::AssetClass;

/// Today's date in UTC.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Collapse Saturday and Sunday back to the preceding Friday.
pub fn last_weekday_on_or_before(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

/// Last fully completed session as of `today`: yesterday, moved back to
/// Friday when it falls on a weekend.
pub fn last_completed_trading_day(today: NaiveDate) -> NaiveDate {
    last_weekday_on_or_before(today - Duration::days(1))
}

/// Most recent date an instrument of `class` can have complete data for.
pub fn sync_target(class: AssetClass, today: NaiveDate) -> NaiveDate {
    match class {
        AssetClass::Equity => last_completed_trading_day(today),
        AssetClass::Crypto => today - Duration::days(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekend_collapses_to_friday() {
        // 2024-03-01 is a Friday.
        assert_eq!(last_weekday_on_or_before(d(2024, 3, 2)), d(2024, 3, 1));
        assert_eq!(last_weekday_on_or_before(d(2024, 3, 3)), d(2024, 3, 1));
        assert_eq!(last_weekday_on_or_before(d(2024, 3, 4)), d(2024, 3, 4));
    }

    #[test]
    fn monday_and_weekend_runs_target_friday() {
        assert_eq!(last_completed_trading_day(d(2024, 3, 2)), d(2024, 3, 1));
        assert_eq!(last_completed_trading_day(d(2024, 3, 3)), d(2024, 3, 1));
        assert_eq!(last_completed_trading_day(d(2024, 3, 4)), d(2024, 3, 1));
        assert_eq!(last_completed_trading_day(d(2024, 3, 6)), d(2024, 3, 5));
    }

    #[test]
    fn crypto_targets_yesterday_even_on_weekends() {
        assert_eq!(sync_target(AssetClass::Crypto, d(2024, 3, 3)), d(2024, 3, 2));
        assert_eq!(sync_target(AssetClass::Equity, d(2024, 3, 3)), d(2024, 3, 1));
    }
}
