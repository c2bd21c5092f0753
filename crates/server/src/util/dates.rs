use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// "YYYY-MM" bucket key for a timestamp.
pub fn month_key(ts: &DateTime<Utc>) -> String {
    format!("{:04}-{:02}", ts.year(), ts.month())
}

/// Inclusive list of "YYYY-MM" keys between two dates, for zero-filling
/// aggregation buckets.
pub fn month_range(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut keys = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    let (end_year, end_month) = (to.year(), to.month());

    while (year, month) <= (end_year, end_month) {
        keys.push(format!("{year:04}-{month:02}"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    keys
}

/// Parses an RFC 3339 timestamp as written by the persistence layer.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_range_spans_year_boundary() {
        let keys = month_range(date(2024, 11, 15), date(2025, 2, 1));
        assert_eq!(keys, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn month_range_single_month() {
        assert_eq!(month_range(date(2025, 6, 1), date(2025, 6, 30)), vec!["2025-06"]);
    }

    #[test]
    fn parse_ts_round_trips_utc_now() {
        let now = Utc::now();
        let parsed = parse_ts(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}
