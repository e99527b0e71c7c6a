//! Calendar-month buckets over an inclusive year range.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{Error, Result};

const MONTHS_PER_YEAR: u32 = 12;

/// Half-open interval `[start, start + 1 month)` tagged with its year and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| MonthBucket { year, month })
    }

    pub fn first_day(&self) -> NaiveDate {
        // month is validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Canonical timestamp of the bucket.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day().and_time(NaiveTime::MIN))
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start() + Months::new(1)
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        *time >= self.start() && *time < self.end()
    }

    pub fn iso_month(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Lazy sequence of month buckets. A clone iterates independently from the
/// position it was taken at, so a fresh [`month_buckets`] call or a clone
/// taken before iteration replays the whole range.
#[derive(Debug, Clone)]
pub struct MonthBuckets {
    next: u32,
    total: u32,
    start_year: i32,
}

impl Iterator for MonthBuckets {
    type Item = MonthBucket;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let year = self.start_year + (self.next / MONTHS_PER_YEAR) as i32;
        let month = self.next % MONTHS_PER_YEAR + 1;
        self.next += 1;

        Some(MonthBucket { year, month })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MonthBuckets {}

/// Buckets from January `start_year` through December `end_year`.
pub fn month_buckets(start_year: i32, end_year: i32) -> Result<MonthBuckets> {
    if start_year > end_year {
        return Err(Error::InvalidPeriod {
            start: start_year,
            end: end_year,
        });
    }
    if NaiveDate::from_ymd_opt(start_year, 1, 1).is_none()
        || NaiveDate::from_ymd_opt(end_year, 12, 1).is_none()
    {
        return Err(Error::Config(format!(
            "year range {}..={} is outside the supported calendar",
            start_year, end_year
        )));
    }

    let years = (end_year - start_year + 1) as u32;

    Ok(MonthBuckets {
        next: 0,
        total: years * MONTHS_PER_YEAR,
        start_year,
    })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn should_cover_every_month_of_range() {
        for (start, end) in [(2020, 2020), (2016, 2020), (1999, 2001)] {
            let buckets: Vec<_> = month_buckets(start, end).unwrap().collect();

            assert_eq!(buckets.len(), 12 * (end - start + 1) as usize);
            assert_eq!(buckets[0], MonthBucket { year: start, month: 1 });
            assert_eq!(
                *buckets.last().unwrap(),
                MonthBucket { year: end, month: 12 }
            );

            for pair in buckets.windows(2) {
                assert!(pair[0] < pair[1]);
                // no gaps, no overlaps
                assert_eq!(pair[0].end(), pair[1].start());
            }
        }
    }

    #[test]
    fn should_report_exact_size() {
        let buckets = month_buckets(2016, 2020).unwrap();
        assert_eq!(buckets.len(), 60);
    }

    #[test]
    fn should_restart_from_clone() {
        let buckets = month_buckets(2019, 2019).unwrap();
        let first: Vec<_> = buckets.clone().collect();
        let second: Vec<_> = buckets.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn should_reject_inverted_period() {
        let result = month_buckets(2021, 2020);
        assert!(matches!(
            result,
            Err(Error::InvalidPeriod {
                start: 2021,
                end: 2020
            })
        ));
    }

    #[test]
    fn should_use_half_open_interval() {
        let bucket = MonthBucket::new(2020, 2).unwrap();
        let start = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();

        assert_eq!(bucket.start(), start);
        assert_eq!(bucket.end(), end);
        assert!(bucket.contains(&start));
        assert!(bucket.contains(&Utc.with_ymd_and_hms(2020, 2, 29, 23, 59, 59).unwrap()));
        assert!(!bucket.contains(&end));
    }

    #[test]
    fn should_roll_december_into_next_year() {
        let bucket = MonthBucket::new(2019, 12).unwrap();
        assert_eq!(bucket.end(), Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn should_format_iso_month() {
        assert_eq!(MonthBucket::new(2020, 1).unwrap().iso_month(), "2020-01");
        assert_eq!(MonthBucket::new(2016, 11).unwrap().iso_month(), "2016-11");
    }

    #[test]
    fn should_reject_invalid_month() {
        assert!(MonthBucket::new(2020, 13).is_none());
        assert!(MonthBucket::new(2020, 0).is_none());
    }
}
