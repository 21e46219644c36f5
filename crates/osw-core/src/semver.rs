use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseType {
    Patch,
    Minor,
    Major,
}

impl ReleaseType {
    pub fn parse(s: &str) -> Option<ReleaseType> {
        match s {
            "patch" => Some(ReleaseType::Patch),
            "minor" => Some(ReleaseType::Minor),
            "major" => Some(ReleaseType::Major),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("'{input}' is not a MAJOR.MINOR.PATCH version")]
pub struct SemVerParseError {
    pub input: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Increment the requested component, zeroing lower-order ones.
    pub fn bump(self, release: ReleaseType) -> SemVer {
        match release {
            ReleaseType::Patch => SemVer::new(self.major, self.minor, self.patch + 1),
            ReleaseType::Minor => SemVer::new(self.major, self.minor + 1, 0),
            ReleaseType::Major => SemVer::new(self.major + 1, 0, 0),
        }
    }
}

impl FromStr for SemVer {
    type Err = SemVerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SemVerParseError { input: s.to_string() };
        let mut parts = s.trim().splitn(3, '.');
        let mut next = || -> Result<u64, SemVerParseError> {
            parts
                .next()
                .ok_or_else(err)?
                .parse::<u64>()
                .map_err(|_| err())
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(SemVer { major, minor, patch })
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let v: SemVer = "0.1.26".parse().unwrap();
        assert_eq!(v, SemVer::new(0, 1, 26));
        assert_eq!(v.to_string(), "0.1.26");
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!("1.2".parse::<SemVer>().is_err());
        assert!("v1.2.3".parse::<SemVer>().is_err());
        assert!("1.2.x".parse::<SemVer>().is_err());
        assert!("".parse::<SemVer>().is_err());
    }

    #[test]
    fn bump_resets_lower_components() {
        let v = SemVer::new(0, 1, 26);
        assert_eq!(v.bump(ReleaseType::Patch), SemVer::new(0, 1, 27));
        assert_eq!(v.bump(ReleaseType::Minor), SemVer::new(0, 2, 0));
        assert_eq!(v.bump(ReleaseType::Major), SemVer::new(1, 0, 0));
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        let a: SemVer = "0.1.9".parse().unwrap();
        let b: SemVer = "0.1.10".parse().unwrap();
        assert!(a < b);
    }
}
