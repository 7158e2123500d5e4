use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDate;

use crate::error::BudgetError;
use crate::error::BudgetResult;

/// An inclusive `[start, end]` date interval with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> BudgetResult<Self> {
        if start > end {
            return Err(BudgetError::validation("range start must not be after end"));
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The range covering a full calendar month.
    pub fn for_month(year: i32, month: u32) -> BudgetResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| BudgetError::validation_field("invalid year/month", "month"))?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let next_start = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .ok_or_else(|| BudgetError::validation_field("invalid year/month", "month"))?;
        let end = next_start - Duration::days(1);
        Self::new(start, end)
    }

    /// The range of the last `n` days ending today (inclusive).
    pub fn last_n_days(today: NaiveDate, n: i64) -> BudgetResult<Self> {
        if n <= 0 {
            return Err(BudgetError::validation_field(
                "n must be positive",
                "n",
            ));
        }
        let start = today - Duration::days(n - 1);
        Self::new(start, today)
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.start.year()
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.start.month()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_month_spans_full_month() {
        let range = DateRange::for_month(2026, 2).expect("range");
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"));
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2026, 2, 28).expect("date"));
    }

    #[test]
    fn for_month_handles_december_rollover() {
        let range = DateRange::for_month(2026, 12).expect("range");
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2026, 12, 31).expect("date"));
    }

    #[test]
    fn rejects_inverted_range() {
        let start = NaiveDate::from_ymd_opt(2026, 2, 10).expect("date");
        let end = NaiveDate::from_ymd_opt(2026, 2, 1).expect("date");
        assert!(DateRange::new(start, end).is_err());
    }

    #[test]
    fn last_n_days_is_inclusive() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).expect("date");
        let range = DateRange::last_n_days(today, 5).expect("range");
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2026, 2, 6).expect("date"));
        assert_eq!(range.end(), today);
    }
}
