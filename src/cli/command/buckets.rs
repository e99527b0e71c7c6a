use anyhow::Result;

use crate::bucket::month_buckets;

/// One line per bucket: its `YYYY-MM` label and half-open interval.
pub fn buckets(start_year: i32, end_year: i32) -> Result<Vec<String>> {
    Ok(month_buckets(start_year, end_year)?
        .map(|b| {
            format!(
                "{}  [{}, {})",
                b.iso_month(),
                b.start().format("%Y-%m-%dT%H:%M:%SZ"),
                b.end().format("%Y-%m-%dT%H:%M:%SZ")
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_list_buckets_with_intervals() {
        let lines = buckets(2019, 2019).unwrap();

        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "2019-01  [2019-01-01T00:00:00Z, 2019-02-01T00:00:00Z)");
        assert_eq!(lines[11], "2019-12  [2019-12-01T00:00:00Z, 2020-01-01T00:00:00Z)");
    }

    #[test]
    fn should_reject_inverted_period() {
        assert!(buckets(2021, 2020).is_err());
    }
}
