//! Difficulty level newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A difficulty level in `1..=10`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ts_rs::TS,
)]
#[serde(try_from = "u8", into = "u8")]
#[ts(export)]
pub struct Difficulty(u8);

/// Raised when a raw value falls outside `1..=10`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("difficulty {0} out of range 1..=10")]
pub struct InvalidDifficulty(pub i64);

impl Difficulty {
    pub const MIN: Difficulty = Difficulty(1);
    pub const MAX: Difficulty = Difficulty(10);

    /// Construct from a raw level, rejecting values outside `1..=10`.
    pub fn new(level: u8) -> Result<Self, InvalidDifficulty> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(InvalidDifficulty(i64::from(level)))
        }
    }

    /// Clamp an arbitrary integer into `1..=10`.
    pub fn clamped(level: i64) -> Self {
        Self(level.clamp(i64::from(Self::MIN.0), i64::from(Self::MAX.0)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// One level up, saturating at [`Difficulty::MAX`].
    pub fn harder(self) -> Self {
        Self::clamped(i64::from(self.0) + 1)
    }

    /// One level down, saturating at [`Difficulty::MIN`].
    pub fn easier(self) -> Self {
        Self::clamped(i64::from(self.0) - 1)
    }

    /// All levels in ascending order.
    pub fn all() -> impl Iterator<Item = Difficulty> {
        (Self::MIN.0..=Self::MAX.0).map(Difficulty)
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = InvalidDifficulty;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for Difficulty {
    type Error = InvalidDifficulty;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| InvalidDifficulty(value))
            .and_then(Self::new)
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(Difficulty::new(0).is_err());
        assert!(Difficulty::new(11).is_err());
        assert_eq!(Difficulty::new(7).expect("valid").get(), 7);
    }

    #[test]
    fn test_harder_and_easier_saturate() {
        assert_eq!(Difficulty::MAX.harder(), Difficulty::MAX);
        assert_eq!(Difficulty::MIN.easier(), Difficulty::MIN);
        assert_eq!(Difficulty::clamped(3).harder().get(), 4);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let parsed: Result<Difficulty, _> = serde_json::from_str("12");
        assert!(parsed.is_err());
        let ok: Difficulty = serde_json::from_str("4").expect("parse");
        assert_eq!(ok.get(), 4);
    }

    #[test]
    fn test_all_levels() {
        let levels: Vec<u8> = Difficulty::all().map(Difficulty::get).collect();
        assert_eq!(levels, (1..=10).collect::<Vec<u8>>());
    }
}
