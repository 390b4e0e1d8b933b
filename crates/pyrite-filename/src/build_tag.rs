use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum BuildTagError {
    #[error("must not be empty")]
    Empty,
    #[error("must start with a digit")]
    NoLeadingDigit,
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
}

/// The optional build tag for a wheel:
///
/// > Must start with a digit. Acts as a tie-breaker if two wheel file names
/// > are the same in all other respects (i.e. name, version, and other
/// > tags). Sort as an empty tuple if unspecified, else sort as a two-item
/// > tuple with the first item being the initial digits as an int, and the
/// > second item being the remainder of the tag as a str.
///
/// See: <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-name-convention>
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BuildTag(u64, Option<Arc<str>>);

impl BuildTag {
    /// The leading digits of the tag.
    pub fn number(&self) -> u64 {
        self.0
    }

    /// The remainder of the tag after the leading digits, if any.
    pub fn suffix(&self) -> Option<&str> {
        self.1.as_deref()
    }
}

impl FromStr for BuildTag {
    type Err = BuildTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A build tag must not be empty.
        if s.is_empty() {
            return Err(BuildTagError::Empty);
        }

        // A build tag must start with a digit.
        let (prefix, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
            // Ex) `abc`
            Some(0) => return Err(BuildTagError::NoLeadingDigit),
            // Ex) `123abc`
            Some(split) => {
                let (prefix, suffix) = s.split_at(split);
                (prefix, Some(suffix))
            }
            // Ex) `123`
            None => (s, None),
        };

        Ok(BuildTag(prefix.parse::<u64>()?, suffix.map(Arc::from)))
    }
}

impl fmt::Display for BuildTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.1 {
            Some(suffix) => write!(f, "{}{suffix}", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let tag = BuildTag::from_str("202206090410").unwrap();
        assert_eq!((tag.number(), tag.suffix()), (202_206_090_410, None));
        let tag = BuildTag::from_str("1linux").unwrap();
        assert_eq!((tag.number(), tag.suffix()), (1, Some("linux")));
        assert_eq!(tag.to_string(), "1linux");
    }

    #[test]
    fn tie_breaker_ordering() {
        // Absent sorts first, then by number, then by suffix
        assert!(None < Some(BuildTag::from_str("0").unwrap()));
        assert!(BuildTag::from_str("1").unwrap() < BuildTag::from_str("2").unwrap());
        assert!(BuildTag::from_str("2a").unwrap() < BuildTag::from_str("2b").unwrap());
        assert!(BuildTag::from_str("9z").unwrap() < BuildTag::from_str("10a").unwrap());
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(BuildTag::from_str(""), Err(BuildTagError::Empty)));
        assert!(matches!(
            BuildTag::from_str("abc"),
            Err(BuildTagError::NoLeadingDigit)
        ));
        assert!(matches!(
            BuildTag::from_str("99999999999999999999999999"),
            Err(BuildTagError::ParseInt(_))
        ));
    }
}
