//! Sampling frequencies for activity series.
//!
//! Frequencies use offset strings: an optional positive multiplier followed by a
//! unit, e.g. `D`, `6H`, `12h`, `30min`, `15T`, `90S`, `2W`.
//!
//! Every unit is a fixed step counted from the window start. `W` is seven days
//! from that start; it is not anchored to a weekday the way pandas' `W`
//! (`W-SUN`) is, so weekly buckets begin on whatever day the window begins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// A fixed sampling step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    text: String,
    step: Duration,
}

impl Frequency {
    /// Parse an offset string.
    pub fn parse(value: &str) -> FlowResult<Self> {
        let text = value.trim();
        let invalid = |reason: &str| FlowError::InvalidFrequency {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let digits_end = text
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit"))?;
        let (digits, unit) = text.split_at(digits_end);

        let multiplier: i64 = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| invalid("multiplier out of range"))?
                .into()
        };
        if multiplier == 0 {
            return Err(invalid("multiplier must be positive"));
        }

        let unit_seconds: i64 = match unit {
            "S" | "s" => 1,
            "T" | "min" => 60,
            "H" | "h" => 3_600,
            "D" | "d" => 86_400,
            "W" | "w" => 604_800,
            _ => return Err(invalid("unknown unit")),
        };

        Ok(Self {
            text: text.to_string(),
            step: Duration::seconds(multiplier * unit_seconds),
        })
    }

    /// The sampling step.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// The offset string this frequency was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of grid points `start + k * step` that are not after `end`.
    pub fn grid_len(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        if end < start {
            return 0;
        }
        self.steps_between(start, end) + 1
    }

    /// Index of the bucket holding `instant` on a grid anchored at `start`,
    /// `None` before the anchor.
    pub fn bucket_of(&self, start: DateTime<Utc>, instant: DateTime<Utc>) -> Option<usize> {
        if instant < start {
            return None;
        }
        Some(self.steps_between(start, instant))
    }

    fn steps_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        let elapsed = (to - from).num_milliseconds();
        (elapsed / self.step.num_milliseconds()) as usize
    }
}

impl Default for Frequency {
    /// Six hours.
    fn default() -> Self {
        Self {
            text: "6H".to_string(),
            step: Duration::hours(6),
        }
    }
}

impl FromStr for Frequency {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Frequency {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.text
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_units() {
        assert_eq!(Frequency::parse("D").unwrap().step(), Duration::days(1));
        assert_eq!(Frequency::parse("6H").unwrap().step(), Duration::hours(6));
        assert_eq!(Frequency::parse("12h").unwrap().step(), Duration::hours(12));
        assert_eq!(Frequency::parse("30min").unwrap().step(), Duration::minutes(30));
        assert_eq!(Frequency::parse("15T").unwrap().step(), Duration::minutes(15));
        assert_eq!(Frequency::parse("2W").unwrap().step(), Duration::days(14));
        assert_eq!(Frequency::parse(" 90S ").unwrap().as_str(), "90S");
        assert_eq!(Frequency::parse("6H").unwrap(), Frequency::default());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "6", "0H", "6X", "M", "-1D", "H6", "99999999999D"] {
            let err = Frequency::parse(bad).unwrap_err();
            assert!(matches!(err, FlowError::InvalidFrequency { .. }), "{bad}");
            assert!(err.is_config());
        }
    }

    #[test]
    fn test_grid_len_and_buckets() {
        let freq = Frequency::parse("6H").unwrap();
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 1, 2, 0, 0, 0).unwrap();

        // 00, 06, 12, 18, 00(+1d)
        assert_eq!(freq.grid_len(start, end), 5);
        assert_eq!(freq.grid_len(start, end - Duration::seconds(1)), 4);
        assert_eq!(freq.grid_len(end, start), 0);

        let t = Utc.with_ymd_and_hms(2022, 1, 1, 13, 59, 59).unwrap();
        assert_eq!(freq.bucket_of(start, t), Some(2));
        assert_eq!(freq.bucket_of(start, end), Some(4));
        assert_eq!(freq.bucket_of(end, start), None);
    }

    #[test]
    fn test_weeks_count_from_grid_start() {
        // 2022-01-05 is a Wednesday.
        let wednesday = Utc.with_ymd_and_hms(2022, 1, 5, 0, 0, 0).unwrap();
        let weekly = Frequency::parse("W").unwrap();
        assert_eq!(weekly.step(), Duration::days(7));

        let sunday = Utc.with_ymd_and_hms(2022, 1, 9, 12, 0, 0).unwrap();
        assert_eq!(weekly.bucket_of(wednesday, sunday), Some(0));
        let next_wednesday = Utc.with_ymd_and_hms(2022, 1, 12, 0, 0, 0).unwrap();
        assert_eq!(weekly.bucket_of(wednesday, next_wednesday), Some(1));
    }

    #[test]
    fn test_serde_as_string() {
        let freq: Frequency = serde_json::from_str("\"12H\"").unwrap();
        assert_eq!(freq.step(), Duration::hours(12));
        assert_eq!(serde_json::to_string(&freq).unwrap(), "\"12H\"");
        assert!(serde_json::from_str::<Frequency>("\"fortnight\"").is_err());
    }
}
