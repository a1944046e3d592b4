use std::fmt::{Display, Formatter};

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};

/// Calendar position without a year. Ordering is (month, day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.month(), date.day())
    }

    /// Parses `MM/DD`. Only the shape is checked, so `02/30` is accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let (month, day) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| anyhow!("expected MM/DD, got '{}'", raw))?;
        let month = month
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid month in '{}'", raw))?;
        let day = day
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid day in '{}'", raw))?;
        Ok(Self::new(month, day))
    }
}

impl Display for MonthDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// `start <= end`, both inside one calendar year.
    Contiguous,
    /// `start > end`, runs across the new year.
    Wrapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackoutWindow {
    pub start: MonthDay,
    pub end: MonthDay,
    pub reason: String,
}

impl BlackoutWindow {
    pub fn new(start: MonthDay, end: MonthDay, reason: impl Into<String>) -> Self {
        Self {
            start,
            end,
            reason: reason.into(),
        }
    }

    pub fn parse(start: &str, end: &str, reason: &str) -> Result<Self> {
        Ok(Self::new(
            MonthDay::parse(start).context("invalid blackout start")?,
            MonthDay::parse(end).context("invalid blackout end")?,
            reason,
        ))
    }

    pub fn span(&self) -> Span {
        if self.start <= self.end {
            Span::Contiguous
        } else {
            Span::Wrapping
        }
    }

    /// Both bounds are inclusive. Time of day and year are ignored.
    pub fn contains(&self, date: NaiveDate) -> bool {
        let today = MonthDay::of(date);
        match self.span() {
            Span::Contiguous => self.start <= today && today <= self.end,
            Span::Wrapping => today >= self.start || today <= self.end,
        }
    }
}

/// First window, in declaration order, that covers `date`.
pub fn active_window(windows: &[BlackoutWindow], date: NaiveDate) -> Option<&BlackoutWindow> {
    windows.iter().find(|window| window.contains(date))
}

#[cfg(test)]
mod tests {
    use super::{active_window, BlackoutWindow, MonthDay, Span};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn window(start: &str, end: &str, reason: &str) -> BlackoutWindow {
        BlackoutWindow::parse(start, end, reason).expect("parse window")
    }

    #[test]
    fn month_day_parse_accepts_loose_day_values() {
        assert_eq!(MonthDay::parse("02/30").unwrap(), MonthDay::new(2, 30));
        assert_eq!(MonthDay::parse(" 7/4 ").unwrap(), MonthDay::new(7, 4));
    }

    #[test]
    fn month_day_parse_rejects_bad_shape() {
        assert!(MonthDay::parse("1215").is_err());
        assert!(MonthDay::parse("12/xx").is_err());
        assert!(MonthDay::parse("").is_err());
    }

    #[test]
    fn month_day_orders_by_month_then_day() {
        assert!(MonthDay::new(1, 31) < MonthDay::new(2, 1));
        assert!(MonthDay::new(12, 15) > MonthDay::new(12, 1));
    }

    #[test]
    fn contiguous_window_includes_bounds_for_any_year() {
        let w = window("07/01", "07/15", "summer freeze");
        assert_eq!(w.span(), Span::Contiguous);
        for year in [2019, 2024, 2031] {
            assert!(w.contains(date(year, 7, 1)));
            assert!(w.contains(date(year, 7, 8)));
            assert!(w.contains(date(year, 7, 15)));
            assert!(!w.contains(date(year, 6, 30)));
            assert!(!w.contains(date(year, 7, 16)));
        }
    }

    #[test]
    fn wrapping_window_spans_new_year() {
        let w = window("12/15", "01/10", "holidays");
        assert_eq!(w.span(), Span::Wrapping);
        assert!(w.contains(date(2024, 12, 15)));
        assert!(w.contains(date(2024, 12, 31)));
        assert!(w.contains(date(2025, 1, 1)));
        assert!(w.contains(date(2025, 1, 10)));
        assert!(!w.contains(date(2025, 1, 11)));
        assert!(!w.contains(date(2024, 12, 14)));
        assert!(!w.contains(date(2025, 6, 1)));
    }

    #[test]
    fn single_day_window() {
        let w = window("03/03", "03/03", "launch day");
        assert!(w.contains(date(2025, 3, 3)));
        assert!(!w.contains(date(2025, 3, 4)));
    }

    #[test]
    fn empty_window_list_is_never_active() {
        assert!(active_window(&[], date(2025, 12, 25)).is_none());
    }

    #[test]
    fn first_matching_window_wins() {
        let windows = vec![
            window("01/01", "01/31", "january"),
            window("12/20", "01/05", "holidays"),
            window("01/02", "01/03", "inner"),
        ];
        let hit = active_window(&windows, date(2025, 1, 2)).expect("active");
        assert_eq!(hit.reason, "january");

        let hit = active_window(&windows, date(2025, 12, 24)).expect("active");
        assert_eq!(hit.reason, "holidays");

        assert!(active_window(&windows, date(2025, 2, 1)).is_none());
    }
}
