//! Normalization of distribution, extra and dependency-group names per
//! [PEP 503](https://peps.python.org/pep-0503/#normalized-names):
//! lowercase, with every run of `-`, `_` and `.` collapsed to a single `-`.

use once_cell::sync::Lazy;
use regex::Regex;

pub use extra_name::ExtraName;
pub use group_name::GroupName;
pub use package_name::PackageName;

mod extra_name;
mod group_name;
mod package_name;

/// The strict shape a name must have before normalization, from the PEP 508
/// name grammar: start and end alphanumeric, `-`, `_` and `.` only in the
/// middle.
static NAME_VALIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$").unwrap());

/// One or more of the three separator characters, to be collapsed into a
/// single `-`.
static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").unwrap());

/// An invalid package, extra or dependency-group name.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error(
    "Not a valid name: `{0}`. Names must start and end with a letter or digit \
     and may only contain `-`, `_`, `.` and alphanumeric characters"
)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the name that failed validation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Normalize a name without validating it first.
///
/// Idempotent: `canonicalize_name(&canonicalize_name(s)) == canonicalize_name(s)`.
pub fn canonicalize_name(name: &str) -> String {
    if is_normalized(name) {
        return name.to_string();
    }
    NAME_SEPARATORS.replace_all(name, "-").to_lowercase()
}

/// Validate against the PEP 508 name grammar, then normalize.
pub(crate) fn validate_and_normalize(name: &str) -> Result<String, InvalidNameError> {
    if !NAME_VALIDATE.is_match(name) {
        return Err(InvalidNameError(name.to_string()));
    }
    Ok(canonicalize_name(name))
}

/// Whether the name is already in canonical form, so normalization can return
/// it unchanged.
fn is_normalized(name: &str) -> bool {
    let mut previous_dash = true;
    for char in name.chars() {
        match char {
            'a'..='z' | '0'..='9' => {
                previous_dash = false;
            }
            '-' if previous_dash => return false,
            '-' => {
                previous_dash = true;
            }
            _ => return false,
        }
    }
    !previous_dash || name.is_empty()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn normalize() {
        let inputs = [
            "friendly-bard",
            "Friendly-Bard",
            "FRIENDLY-BARD",
            "friendly.bard",
            "friendly_bard",
            "friendly--bard",
            "friendly-.bard",
            "FrIeNdLy-._.-bArD",
        ];
        for input in inputs {
            assert_eq!(canonicalize_name(input), "friendly-bard", "{input}");
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["friendly-bard", "FrIeNdLy-._.-bArD", "a", "A.B--C_D"] {
            let once = canonicalize_name(input);
            assert_eq!(canonicalize_name(&once), once, "{input}");
        }
    }

    #[test]
    fn valid_names() {
        for name in ["A", "z9", "pip", "typing_extensions", "ruff-lsp", "a.b-c_d"] {
            assert!(PackageName::from_str(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn invalid_names() {
        for name in [
            "",
            "-starts-with-dash",
            "ends-with-dash-",
            ".starts.with.dot",
            "contains!bang",
            "white space",
            "nul\0char",
        ] {
            assert!(PackageName::from_str(name).is_err(), "{name:?}");
            assert!(ExtraName::from_str(name).is_err(), "{name:?}");
            assert!(GroupName::from_str(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn dist_info_name() {
        assert_eq!(
            PackageName::from_str("friendly.bard")
                .unwrap()
                .as_dist_info_name(),
            "friendly_bard"
        );
        assert_eq!(
            PackageName::from_str("flask").unwrap().as_dist_info_name(),
            "flask"
        );
    }

    #[test]
    fn serde_round_trip() {
        let name = PackageName::from_str("Typing.Extensions").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, r#""typing-extensions""#);
        let back: PackageName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
