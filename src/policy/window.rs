use anyhow::{Context, Result};
use chrono::NaiveTime;

/// Local time-of-day window `[start, end)`.
///
/// When `start > end` the window wraps across midnight. `start == end` is an
/// always-open window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `HH:MM` (or `HH:MM:SS`) bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
        })
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            self.start <= now && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .with_context(|| format!("invalid time of day '{}', expected HH:MM", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    #[test]
    fn daytime_window_is_half_open() -> Result<()> {
        let w = TimeWindow::parse("08:00", "17:30")?;
        assert!(w.contains(t(8, 0)));
        assert!(w.contains(t(12, 0)));
        assert!(!w.contains(t(17, 30)));
        assert!(!w.contains(t(7, 59)));
        Ok(())
    }

    #[test]
    fn overnight_window_wraps_midnight() -> Result<()> {
        let w = TimeWindow::parse("22:00", "06:00")?;
        assert!(w.contains(t(23, 30)));
        assert!(w.contains(t(2, 0)));
        assert!(w.contains(t(22, 0)));
        assert!(!w.contains(t(6, 0)));
        assert!(!w.contains(t(12, 0)));
        Ok(())
    }

    #[test]
    fn equal_bounds_are_always_open() -> Result<()> {
        let w = TimeWindow::parse("00:00", "00:00")?;
        assert!(w.contains(t(0, 0)));
        assert!(w.contains(t(13, 37)));
        Ok(())
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(TimeWindow::parse("25:00", "06:00").is_err());
        assert!(TimeWindow::parse("noon", "06:00").is_err());
        assert!(TimeWindow::parse("06:00:00", "07:15:30").is_ok());
    }
}
