//! `MAJOR.MINOR.PATCH` version numbers.
//!
//! Only the strict three-component numeric form is accepted: no `v` prefix,
//! no pre-release or build suffix, no signs.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A parsed semantic version.  Ordering is numeric, component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticVersion {
    major: u64,
    minor: u64,
    patch: u64,
}

impl SemanticVersion {
    /// The version given to the first deployment of a function unit.
    pub const INITIAL: Self = Self::new(1, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a string of the exact form `\d+\.\d+\.\d+`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidVersion(raw.to_owned());

        let mut parts = raw.split('.');
        let mut component = || -> Result<u64, ValidationError> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let version = Self::new(component()?, component()?, component()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn compare_to(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    /// # Errors
    /// [`ValidationError::VersionOverflow`] if the major component is
    /// already `u64::MAX`.
    pub fn increment_major(&self) -> Result<Self, ValidationError> {
        let major = self.bump(self.major, ChangeType::Major)?;
        Ok(Self::new(major, 0, 0))
    }

    pub fn increment_minor(&self) -> Result<Self, ValidationError> {
        let minor = self.bump(self.minor, ChangeType::Minor)?;
        Ok(Self::new(self.major, minor, 0))
    }

    pub fn increment_patch(&self) -> Result<Self, ValidationError> {
        let patch = self.bump(self.patch, ChangeType::Patch)?;
        Ok(Self::new(self.major, self.minor, patch))
    }

    pub fn increment(&self, change: ChangeType) -> Result<Self, ValidationError> {
        match change {
            ChangeType::Major => self.increment_major(),
            ChangeType::Minor => self.increment_minor(),
            ChangeType::Patch => self.increment_patch(),
        }
    }

    fn bump(&self, component: u64, change: ChangeType) -> Result<u64, ValidationError> {
        component
            .checked_add(1)
            .ok_or_else(|| ValidationError::VersionOverflow {
                version: self.to_string(),
                change: change.to_string(),
            })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SemanticVersion> for String {
    fn from(v: SemanticVersion) -> Self {
        v.to_string()
    }
}

/// Which component a deployment bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Major,
    Minor,
    Patch,
}

impl FromStr for ChangeType {
    type Err = ValidationError;

    /// Case-sensitive: only `major`, `minor` and `patch` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other   => Err(ValidationError::InvalidChangeType(other.to_owned())),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_three_component_form() {
        let v = SemanticVersion::parse("10.20.30").expect("valid");
        assert_eq!((v.major(), v.minor(), v.patch()), (10, 20, 30));
        assert_eq!(v.to_string(), "10.20.30");
    }

    #[test]
    fn rejects_every_other_shape() {
        for raw in [
            "", "1", "1.0", "1.0.0.0", "v1.0.0", "1.0.0-rc1", "1.0.0+build",
            "-1.0.0", "1.-1.0", "+1.0.0", "a.b.c", "1..0", "1.0.", " 1.0.0",
            "99999999999999999999.0.0",
        ] {
            assert!(
                matches!(SemanticVersion::parse(raw), Err(ValidationError::InvalidVersion(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn comparison_is_numeric_not_lexical() {
        let v9 = SemanticVersion::parse("1.9.0").unwrap();
        let v10 = SemanticVersion::parse("1.10.0").unwrap();
        assert_eq!(v9.compare_to(&v10), Ordering::Less);
        assert!(SemanticVersion::parse("2.0.0").unwrap() > SemanticVersion::parse("1.99.99").unwrap());
        assert_eq!(
            SemanticVersion::parse("1.2.3").unwrap(),
            SemanticVersion::new(1, 2, 3)
        );
    }

    #[test]
    fn increments_reset_lower_components() {
        let v = SemanticVersion::new(1, 2, 3);
        assert_eq!(v.increment_major().unwrap().to_string(), "2.0.0");
        assert_eq!(v.increment_minor().unwrap().to_string(), "1.3.0");
        assert_eq!(v.increment_patch().unwrap().to_string(), "1.2.4");
        assert_eq!(v.increment(ChangeType::Minor), Ok(SemanticVersion::new(1, 3, 0)));
    }

    #[test]
    fn incrementing_a_maxed_component_is_rejected() {
        let v = SemanticVersion::parse("1.0.18446744073709551615").unwrap();
        assert!(matches!(
            v.increment_patch(),
            Err(ValidationError::VersionOverflow { ref change, .. }) if change == "patch"
        ));
        // Other components still move and reset the maxed one.
        assert_eq!(v.increment_minor().unwrap().to_string(), "1.1.0");

        let top = SemanticVersion::new(u64::MAX, u64::MAX, 0);
        assert!(top.increment(ChangeType::Major).is_err());
        assert!(top.increment(ChangeType::Minor).is_err());
        assert_eq!(top.increment_patch().unwrap().patch(), 1);
    }

    #[test]
    fn change_type_is_case_sensitive() {
        assert_eq!("patch".parse::<ChangeType>().unwrap(), ChangeType::Patch);
        for raw in ["", "MAJOR", "Minor", "hotfix"] {
            assert!(matches!(
                raw.parse::<ChangeType>(),
                Err(ValidationError::InvalidChangeType(_))
            ));
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let v = SemanticVersion::new(3, 0, 1);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"3.0.1\"");
        assert!(serde_json::from_str::<SemanticVersion>("\"3.0\"").is_err());
    }
}
