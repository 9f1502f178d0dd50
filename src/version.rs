// SPDX-License-Identifier: MPL-2.0

//! Semantic versions as understood by the solver.
//!
//! A [`Version`] is a `major.minor.patch` triple with optional pre-release
//! identifiers. Ordering follows semver: numeric identifiers compare as
//! numbers, alphanumeric ones lexically, and a pre-release sorts before the
//! release it announces.

use std::fmt;
use std::str::FromStr;

/// A semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    /// Major version when you make incompatible API changes.
    pub major: u64,
    /// Minor version when you add functionality in a backwards-compatible manner.
    pub minor: u64,
    /// Patch version when you make backwards-compatible bug fixes.
    pub patch: u64,
    /// Pre-release identifiers, empty for a release version.
    pub pre: Vec<PreReleaseIdentifier>,
}

/// One dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PreReleaseIdentifier {
    /// Purely numeric identifiers compare numerically and sort before
    /// alphanumeric ones.
    Numeric(u64),
    /// Alphanumeric identifiers compare in ASCII order.
    Alphanumeric(String),
}

impl Version {
    /// A release version with no pre-release identifiers.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
        }
    }

    /// Version 1.0.0, used for the synthesized root package.
    pub fn one() -> Self {
        Self::new(1, 0, 0)
    }

    /// Whether this version carries pre-release identifiers.
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Whether both versions share the `major.minor.patch` triple.
    pub fn same_triple(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }

    /// The next major version, lower bound of the breaking-change region.
    pub fn next_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    /// The smallest version strictly greater than `self`.
    ///
    /// For a release `M.m.p` that is `M.m.(p+1)-0`, since every pre-release of
    /// `M.m.p` itself sorts *below* `M.m.p`. For a pre-release it is the same
    /// version with a `0` identifier appended. Used to treat an exact
    /// requirement as the half-open range `[v, successor(v))`.
    pub(crate) fn epsilon_successor(&self) -> Self {
        let mut next = self.clone();
        if next.pre.is_empty() {
            next.patch += 1;
        }
        next.pre.push(PreReleaseIdentifier::Numeric(0));
        next
    }
}

impl From<(u64, u64, u64)> for Version {
    fn from((major, minor, patch): (u64, u64, u64)) -> Self {
        Self::new(major, minor, patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, identifier) in self.pre.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { '-' } else { '.' }, identifier)?;
        }
        Ok(())
    }
}

impl fmt::Display for PreReleaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{}", n),
            Self::Alphanumeric(s) => write!(f, "{}", s),
        }
    }
}

/// Error raised when parsing an invalid version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version string {0:?}")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError(s.to_string());
        let (triple, pre) = match s.split_once('-') {
            Some((triple, pre)) => (triple, Some(pre)),
            None => (s, None),
        };
        let mut parts = triple.split('.');
        let mut component = || {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .ok_or_else(invalid)
        };
        let (major, minor, patch) = (component()?, component()?, component()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        let pre = match pre {
            None => Vec::new(),
            Some(pre) => pre
                .split('.')
                .map(|identifier| {
                    if identifier.is_empty() {
                        return Err(invalid());
                    }
                    Ok(match identifier.parse::<u64>() {
                        Ok(n) => PreReleaseIdentifier::Numeric(n),
                        Err(_) => PreReleaseIdentifier::Alphanumeric(identifier.to_string()),
                    })
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(Version {
            major,
            minor,
            patch,
            pre,
        })
    }
}

// The derived lexicographic order on `(major, minor, patch, pre)` would put
// releases *before* their pre-releases, so ordering is written out by hand.
impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let triple =
            (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch));
        if triple != Ordering::Equal {
            return triple;
        }
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        for s in ["0.0.0", "1.2.3", "10.0.4-alpha.1", "2.0.0-0"] {
            assert_eq!(v(s).to_string(), s);
        }
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("1.2.3-".parse::<Version>().is_err());
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
        assert!(v("1.0.0") < v("1.0.1-0"));
        assert!(v("1.9.0") < v("1.10.0"));
    }

    #[test]
    fn epsilon_successor_is_tight() {
        assert_eq!(v("1.2.3").epsilon_successor(), v("1.2.4-0"));
        assert_eq!(v("1.0.0-alpha").epsilon_successor(), v("1.0.0-alpha.0"));
    }

    #[test]
    fn next_major_resets_lower_components() {
        assert_eq!(v("1.2.3").next_major(), v("2.0.0"));
        assert_eq!(v("0.4.7").next_major(), v("1.0.0"));
    }
}
