use crate::domain::TradingDate;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Utc, Weekday};

const KST_OFFSET_SECS: i64 = 9 * 3600;

// KRX regular session closes at 15:30 KST.
const CLOSE_CUTOFF_HOUR_KST: u32 = 15;
const CLOSE_CUTOFF_MINUTE_KST: u32 = 30;

const SESSION_POLL_SECS: u64 = 60;
const WEEKEND_POLL_SECS: u64 = 3600;

pub fn default_market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(CLOSE_CUTOFF_HOUR_KST, CLOSE_CUTOFF_MINUTE_KST, 0)
        .unwrap_or_default()
}

pub fn to_kst(now_utc: DateTime<Utc>) -> NaiveDateTime {
    now_utc.naive_utc() + Duration::seconds(KST_OFFSET_SECS)
}

/// Date whose session data should be requested at `now_utc`.
///
/// Weekends roll back to Friday. On weekdays the previous calendar day is used until
/// `market_close` (KST) has passed, since today's session is not final yet. Exchange
/// holidays are not modelled; the provider answers those with an empty result.
pub fn trading_date(now_utc: DateTime<Utc>, market_close: NaiveTime) -> TradingDate {
    trading_date_local(to_kst(now_utc), market_close)
}

/// Same as [`trading_date`] for a timestamp already expressed in market local time.
pub fn trading_date_local(now_kst: NaiveDateTime, market_close: NaiveTime) -> TradingDate {
    let today = now_kst.date();
    let date = match today.weekday() {
        Weekday::Sat => today - Duration::days(1),
        Weekday::Sun => today - Duration::days(2),
        _ if now_kst.time() < market_close => today - Duration::days(1),
        _ => today,
    };
    TradingDate::new(date)
}

pub fn session_poll_interval() -> std::time::Duration {
    std::time::Duration::from_secs(SESSION_POLL_SECS)
}

pub fn weekend_poll_interval() -> std::time::Duration {
    std::time::Duration::from_secs(WEEKEND_POLL_SECS)
}

/// Sleep between polls: once a minute on weekdays, hourly on weekends.
pub fn poll_interval(now_utc: DateTime<Utc>) -> std::time::Duration {
    if is_weekend_at(now_utc) {
        weekend_poll_interval()
    } else {
        session_poll_interval()
    }
}

pub fn is_weekend_at(now_utc: DateTime<Utc>) -> bool {
    matches!(to_kst(now_utc).weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn saturday_rolls_back_to_friday() {
        // 2025-10-18 is Saturday; 20:00 KST.
        let now = Utc.with_ymd_and_hms(2025, 10, 18, 11, 0, 0).unwrap();
        let td = trading_date(now, default_market_close());
        assert_eq!(td.date(), d(2025, 10, 17));
    }

    #[test]
    fn sunday_morning_rolls_back_to_friday() {
        // 2025-10-19 09:00 KST.
        let now = Utc.with_ymd_and_hms(2025, 10, 19, 0, 0, 0).unwrap();
        let td = trading_date(now, default_market_close());
        assert_eq!(td.date(), d(2025, 10, 17));
    }

    #[test]
    fn weekday_before_cutoff_uses_previous_day() {
        // 2025-10-21 (Tue) 06:00 UTC = 15:00 KST.
        let now = Utc.with_ymd_and_hms(2025, 10, 21, 6, 0, 0).unwrap();
        let td = trading_date(now, default_market_close());
        assert_eq!(td.date(), d(2025, 10, 20));
    }

    #[test]
    fn weekday_at_cutoff_uses_same_day() {
        // 2025-10-21 06:30 UTC = 15:30 KST exactly.
        let now = Utc.with_ymd_and_hms(2025, 10, 21, 6, 30, 0).unwrap();
        let td = trading_date(now, default_market_close());
        assert_eq!(td.date(), d(2025, 10, 21));
    }

    #[test]
    fn monday_before_cutoff_is_plain_calendar_minus_one() {
        // No holiday/weekend walk for weekdays: Monday morning asks for Sunday and the
        // provider reports "no data", which keeps the previous board on screen.
        let now_kst = d(2025, 10, 20).and_hms_opt(9, 0, 0).unwrap();
        let td = trading_date_local(now_kst, default_market_close());
        assert_eq!(td.date(), d(2025, 10, 19));
    }

    #[test]
    fn utc_midnight_crossing_uses_kst_calendar() {
        // 2025-10-20 23:00 UTC is Tuesday 08:00 KST, before cutoff -> Monday.
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 23, 0, 0).unwrap();
        let td = trading_date(now, default_market_close());
        assert_eq!(td.date(), d(2025, 10, 20));
    }

    #[test]
    fn custom_cutoff_is_respected() {
        let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let now_kst = d(2025, 10, 21).and_hms_opt(15, 45, 0).unwrap();
        assert_eq!(trading_date_local(now_kst, close).date(), d(2025, 10, 20));
    }

    #[test]
    fn polls_hourly_on_weekends() {
        let sat = Utc.with_ymd_and_hms(2025, 10, 18, 3, 0, 0).unwrap();
        let tue = Utc.with_ymd_and_hms(2025, 10, 21, 3, 0, 0).unwrap();
        assert_eq!(poll_interval(sat).as_secs(), 3600);
        assert_eq!(poll_interval(tue).as_secs(), 60);
    }
}
