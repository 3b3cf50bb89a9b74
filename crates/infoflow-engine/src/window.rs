//! Window scheduling for growing and moving series.

use chrono::{DateTime, Duration, Utc};
use infoflow_core::{TimeWindow, WindowMode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FlowError, FlowResult};

/// Parameters of a window series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSchedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub shift_days: u32,
    pub init_window_days: u32,
    pub mode: WindowMode,
}

impl WindowSchedule {
    /// Check bounds and step sizes.
    pub fn validate(&self) -> FlowResult<()> {
        if self.start >= self.end {
            return Err(FlowError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        if self.shift_days == 0 {
            return Err(FlowError::config("shift_days must be positive"));
        }
        if self.init_window_days == 0 {
            return Err(FlowError::config("init_window_days must be positive"));
        }
        Ok(())
    }

    /// The windows in order.
    ///
    /// Anchors are `start + k * shift` for every anchor before `end`. Growing
    /// windows keep `start`; moving windows start at the anchor. Both end at
    /// `anchor + init`, and a window is kept only while its end is before
    /// `end + shift`.
    pub fn windows(&self) -> FlowResult<Vec<TimeWindow>> {
        self.validate()?;

        let shift = Duration::days(i64::from(self.shift_days));
        let init = Duration::days(i64::from(self.init_window_days));
        let limit = self.end + shift;

        let mut windows = Vec::new();
        let mut anchor = self.start;
        while anchor < self.end {
            let window_end = anchor + init;
            if window_end < limit {
                let window_start = match self.mode {
                    WindowMode::Growing => self.start,
                    WindowMode::Moving => anchor,
                };
                windows.push(TimeWindow::new(window_start, window_end));
            }
            anchor += shift;
        }

        debug!(
            mode = %self.mode,
            count = windows.len(),
            shift_days = self.shift_days,
            init_window_days = self.init_window_days,
            "Generated windows"
        );
        Ok(windows)
    }
}

/// Windows for `[start, end)` anchors at `shift_days` with initial length
/// `init_window_days`.
pub fn generate_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    shift_days: u32,
    init_window_days: u32,
    mode: WindowMode,
) -> FlowResult<Vec<TimeWindow>> {
    WindowSchedule {
        start,
        end,
        shift_days,
        init_window_days,
        mode,
    }
    .windows()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, month, day, 0, 0, 0).unwrap()
    }

    fn pairs(windows: &[TimeWindow]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        windows.iter().map(|w| (w.start, w.end)).collect()
    }

    #[test]
    fn test_growing_windows() {
        let windows = generate_windows(d(1, 1), d(2, 1), 7, 7, WindowMode::Growing).unwrap();
        assert_eq!(
            pairs(&windows),
            vec![
                (d(1, 1), d(1, 8)),
                (d(1, 1), d(1, 15)),
                (d(1, 1), d(1, 22)),
                (d(1, 1), d(1, 29)),
                (d(1, 1), d(2, 5)),
            ]
        );
    }

    #[test]
    fn test_moving_windows() {
        let windows = generate_windows(d(1, 1), d(2, 1), 7, 7, WindowMode::Moving).unwrap();
        assert_eq!(
            pairs(&windows),
            vec![
                (d(1, 1), d(1, 8)),
                (d(1, 8), d(1, 15)),
                (d(1, 15), d(1, 22)),
                (d(1, 22), d(1, 29)),
                (d(1, 29), d(2, 5)),
            ]
        );
        assert!(windows.iter().all(|w| w.length() == Duration::days(7)));
    }

    #[test]
    fn test_boundary_is_strict() {
        // Anchors 01-01 and 01-08; the second ends at 01-22 which equals end + shift.
        let windows = generate_windows(d(1, 1), d(1, 15), 7, 14, WindowMode::Moving).unwrap();
        assert_eq!(pairs(&windows), vec![(d(1, 1), d(1, 15))]);
        assert!(windows.iter().all(|w| w.end < d(1, 22)));
    }

    #[test]
    fn test_long_initial_window_drops_everything() {
        let windows = generate_windows(d(1, 1), d(1, 10), 2, 30, WindowMode::Growing).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_invalid_schedules() {
        let err = generate_windows(d(2, 1), d(1, 1), 7, 7, WindowMode::Growing).unwrap_err();
        assert!(matches!(err, FlowError::InvalidWindow { .. }));
        assert!(generate_windows(d(1, 1), d(2, 1), 0, 7, WindowMode::Growing)
            .unwrap_err()
            .is_config());
        assert!(generate_windows(d(1, 1), d(2, 1), 7, 0, WindowMode::Moving)
            .unwrap_err()
            .is_config());
    }
}
