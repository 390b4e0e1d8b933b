//! Python version numbers and specifiers, implementing
//! [PEP 440](https://peps.python.org/pep-0440).
//!
//! ```rust
//! use std::str::FromStr;
//! use pyrite_pep440::{Version, VersionSpecifier, VersionSpecifiers};
//!
//! let version = Version::from_str("1.19").unwrap();
//! let version_specifier = VersionSpecifier::from_str("== 1.*").unwrap();
//! assert!(version_specifier.contains(&version));
//! let version_specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
//! assert!(version_specifiers.contains(&version));
//! ```
//!
//! PEP 440 has a lot of unintuitive features, including:
//!
//! * An epoch that you can prefix the version with, e.g. `1!1.2.3`. Lower
//!   epoch always means lower version (`1.0 <= 2!0.1`)
//! * post versions, which can be attached to both stable releases and
//!   pre-releases
//! * dev versions, which can be attached to both stable releases and
//!   pre-releases. When attached to a pre-release the dev version is ordered
//!   just below the normal pre-release, however when attached to a stable
//!   version, the dev version is sorted before any pre-release
//! * pre-release handling is a mess: "Pre-releases of any kind, including
//!   developmental releases, are implicitly excluded from all version
//!   specifiers, unless they are already present on the system, explicitly
//!   requested by the user, or if the only available version that satisfies
//!   the version specifier is a pre-release.". This is the tri-state
//!   [`PrereleasePolicy`] on specifiers and specifier sets
//! * local versions on top of all the others, with implicitly typed string
//!   and number segments
//! * no semver-caret (`^`), but a pseudo-semver tilde (`~=`)
//! * ordering contradicts matching: we have e.g. `1.0+local > 1.0` when
//!   sorting, but `==1.0` matches `1.0+local`. While the ordering of versions
//!   itself is a total order, the version matching needs to catch all sorts
//!   of special cases

#![deny(missing_docs)]

pub use version::{
    LocalSegment, Prerelease, PrereleaseKind, Version, VersionParseError, VersionPattern,
    VERSION_PATTERN,
};
pub use version_specifier::{
    CandidateVersion, Operator, OperatorParseError, PrereleasePolicy, SpecifiersCombinationError,
    VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers, VersionSpecifiersParseError,
};

mod version;
mod version_specifier;
