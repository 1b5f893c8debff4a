//! Day count validation shared by the CLI and the socket protocol

use std::fmt::Display;
use std::num::IntErrorKind;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_DAYS: u8 = 1;
pub const MAX_DAYS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DayCountError {
    #[error("Error: Invalid number of days.")]
    InvalidDayCount,
    #[error("Error: Number of days should be between 1 and 10.")]
    OutOfRange,
}

/// A number of days in `MIN_DAYS..=MAX_DAYS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DayCount(u8);

impl DayCount {
    pub fn new(days: i64) -> Result<Self, DayCountError> {
        if days < MIN_DAYS as i64 || days > MAX_DAYS as i64 {
            return Err(DayCountError::OutOfRange);
        }
        Ok(DayCount(days as u8))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Offsets from today, most recent first.
    pub fn offsets(&self) -> impl Iterator<Item = u64> {
        0..self.0 as u64
    }
}

impl FromStr for DayCount {
    type Err = DayCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(days) => DayCount::new(days),
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                    Err(DayCountError::OutOfRange)
                }
                _ => Err(DayCountError::InvalidDayCount),
            },
        }
    }
}

impl Display for DayCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_bounds() {
        assert_eq!("1".parse::<DayCount>().unwrap().get(), 1);
        assert_eq!(" 10 ".parse::<DayCount>().unwrap().get(), 10);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!("0".parse::<DayCount>(), Err(DayCountError::OutOfRange));
        assert_eq!("11".parse::<DayCount>(), Err(DayCountError::OutOfRange));
        assert_eq!("-3".parse::<DayCount>(), Err(DayCountError::OutOfRange));
        assert_eq!(
            "99999999999999999999".parse::<DayCount>(),
            Err(DayCountError::OutOfRange)
        );
    }

    #[test]
    fn test_rejects_non_integer() {
        for input in ["abc", "", "2.5", "1e1"] {
            assert_eq!(
                input.parse::<DayCount>(),
                Err(DayCountError::InvalidDayCount),
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn test_error_texts() {
        assert_eq!(
            DayCountError::OutOfRange.to_string(),
            "Error: Number of days should be between 1 and 10."
        );
        assert_eq!(
            DayCountError::InvalidDayCount.to_string(),
            "Error: Invalid number of days."
        );
    }

    #[test]
    fn test_offsets() {
        let days = DayCount::new(3).unwrap();
        assert_eq!(days.offsets().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
