//! Unity engine version strings such as `2019.4.40f1`

use crate::error::{BinaryError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:([a-zA-Z])(\d+))?").expect("valid version regex")
});

/// Parsed Unity version. Ordering compares major, minor and build only.
#[derive(Debug, Clone, Default)]
pub struct UnityVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    /// Release channel letter (`f`, `p`, `b`, ...)
    pub channel: Option<char>,
    pub revision: u32,
    raw: String,
}

impl UnityVersion {
    pub fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
            channel: None,
            revision: 0,
            raw: format!("{}.{}.{}", major, minor, build),
        }
    }

    /// True when this version is at least `major.minor`
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Stripped builds write `0.0.0`
    pub fn is_stripped(&self) -> bool {
        self.major == 0
    }

    /// Original text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.build)
    }
}

impl FromStr for UnityVersion {
    type Err = BinaryError;

    fn from_str(text: &str) -> Result<Self> {
        let captures = VERSION_REGEX
            .captures(text.trim())
            .ok_or_else(|| BinaryError::invalid_data(format!("Invalid version format: {}", text)))?;
        let number = |idx: usize| -> u32 {
            captures
                .get(idx)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };
        Ok(Self {
            major: number(1),
            minor: number(2),
            build: number(3),
            channel: captures.get(4).and_then(|m| m.as_str().chars().next()),
            revision: number(5),
            raw: text.trim().to_string(),
        })
    }
}

impl PartialEq for UnityVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for UnityVersion {}

impl PartialOrd for UnityVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnityVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for UnityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let version: UnityVersion = "2019.4.40f1".parse().unwrap();
        assert_eq!((version.major, version.minor, version.build), (2019, 4, 40));
        assert_eq!(version.channel, Some('f'));
        assert_eq!(version.revision, 1);
        assert_eq!(version.to_string(), "2019.4.40f1");
    }

    #[test]
    fn test_parse_china_suffix() {
        let version: UnityVersion = "2020.3.1f1c1".parse().unwrap();
        assert!(version.at_least(2020, 3));
        assert!(!version.at_least(2021, 1));
    }

    #[test]
    fn test_ordering_and_stripped() {
        let old: UnityVersion = "5.1.0f3".parse().unwrap();
        let new = UnityVersion::new(5, 2, 0);
        assert!(old < new);
        assert!("0.0.0".parse::<UnityVersion>().unwrap().is_stripped());
        assert!("garbage".parse::<UnityVersion>().is_err());
    }
}
