//! Four-component dotted-integer versions and the match-rule predicate
//! used to check an import's requirement against an available version.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub [u32; 4]);

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32, build: u32) -> Self {
        Self([major, minor, micro, build])
    }

    pub fn major(&self) -> u32 {
        self.0[0]
    }

    pub fn minor(&self) -> u32 {
        self.0[1]
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,
    #[error("version has too many components (max 4): {0:?}")]
    TooManyComponents(String),
    #[error("version component {0:?} is not a valid non-negative integer")]
    InvalidComponent(String),
}

pub(crate) fn parse(s: &str) -> Result<Version, VersionParseError> {
    if s.is_empty() {
        return Err(VersionParseError::Empty);
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() > 4 {
        return Err(VersionParseError::TooManyComponents(s.to_string()));
    }
    let mut components = [0u32; 4];
    for (i, part) in parts.iter().enumerate() {
        components[i] = part
            .parse()
            .map_err(|_| VersionParseError::InvalidComponent((*part).to_string()))?;
    }
    Ok(Version(components))
}

/// Version-compatibility rule applied when checking an import's declared
/// version requirement against a candidate plug-in's actual version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchRule {
    /// No version requirement; any available version matches.
    #[default]
    None,
    /// All four components must match exactly.
    Perfect,
    /// Major and minor components must match exactly.
    Equivalent,
    /// Major component must match; minor.micro.build must be >= required.
    Compatible,
    /// Available version must be >= required, any major component.
    GreaterOrEqual,
}

impl MatchRule {
    pub fn matches(self, required: Version, available: Version) -> bool {
        match self {
            MatchRule::None => true,
            MatchRule::Perfect => required == available,
            MatchRule::Equivalent => {
                required.major() == available.major()
                    && required.minor() == available.minor()
                    && available.0[2..].cmp(&required.0[2..]) != Ordering::Less
            }
            MatchRule::Compatible => {
                required.major() == available.major()
                    && available.0[1..].cmp(&required.0[1..]) != Ordering::Less
            }
            MatchRule::GreaterOrEqual => available >= required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_components_as_zero() {
        assert_eq!(parse("1.2").unwrap(), Version::new(1, 2, 0, 0));
        assert_eq!(parse("1").unwrap(), Version::new(1, 0, 0, 0));
    }

    #[test]
    fn rejects_too_many_components() {
        assert!(matches!(
            parse("1.2.3.4.5"),
            Err(VersionParseError::TooManyComponents(_))
        ));
    }

    #[test]
    fn perfect_requires_exact_match() {
        let required = Version::new(1, 2, 3, 4);
        assert!(MatchRule::Perfect.matches(required, Version::new(1, 2, 3, 4)));
        assert!(!MatchRule::Perfect.matches(required, Version::new(1, 2, 3, 5)));
    }

    #[test]
    fn equivalent_ignores_micro_and_build() {
        let required = Version::new(1, 2, 0, 0);
        assert!(MatchRule::Equivalent.matches(required, Version::new(1, 2, 9, 9)));
        assert!(!MatchRule::Equivalent.matches(required, Version::new(1, 3, 0, 0)));
    }

    #[test]
    fn equivalent_rejects_older_tail() {
        let required = Version::new(1, 2, 9, 9);
        assert!(!MatchRule::Equivalent.matches(required, Version::new(1, 2, 0, 0)));
        assert!(MatchRule::Equivalent.matches(required, Version::new(1, 2, 9, 9)));
    }

    #[test]
    fn compatible_requires_same_major_and_greater_equal_tail() {
        let required = Version::new(1, 2, 0, 0);
        assert!(MatchRule::Compatible.matches(required, Version::new(1, 3, 0, 0)));
        assert!(!MatchRule::Compatible.matches(required, Version::new(1, 1, 9, 9)));
        assert!(!MatchRule::Compatible.matches(required, Version::new(2, 0, 0, 0)));
    }

    #[test]
    fn greater_or_equal_allows_any_major() {
        let required = Version::new(1, 0, 0, 0);
        assert!(MatchRule::GreaterOrEqual.matches(required, Version::new(2, 0, 0, 0)));
        assert!(!MatchRule::GreaterOrEqual.matches(required, Version::new(0, 9, 0, 0)));
    }
}
