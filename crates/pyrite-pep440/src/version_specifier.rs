use std::fmt::{Display, Formatter};
use std::ops::{BitAnd, Deref};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use unicode_width::UnicodeWidthStr;

use crate::{Version, VersionPattern};

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ///
    /// "Use of this operator is heavily discouraged and tooling MAY display a warning when it is used"
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// Returns true if and only if this operator can be used in a version
    /// specifier with a version containing a non-empty local segment.
    ///
    /// Specifically, this comes from the "Local version identifiers are
    /// NOT permitted in this version specifier." phrasing in the version
    /// specifiers [spec].
    ///
    /// [spec]: https://packaging.python.org/en/latest/specifications/version-specifiers/
    pub(crate) fn is_local_compatible(self) -> bool {
        !matches!(
            self,
            Self::GreaterThan
                | Self::GreaterThanEqual
                | Self::LessThan
                | Self::LessThanEqual
                | Self::TildeEqual
                | Self::EqualStar
                | Self::NotEqualStar
        )
    }

    /// Returns `true` if this operator represents a wildcard.
    pub fn is_star(self) -> bool {
        matches!(self, Self::EqualStar | Self::NotEqualStar)
    }
}

impl FromStr for Operator {
    type Err = OperatorParseError;

    /// Notably, this does not know about star versions, it just assumes the base operator
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(OperatorParseError {
                    got: other.to_string(),
                })
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note that `EqualStar` and `NotEqualStar` print without the star; the
    /// star belongs to the operand.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        f.write_str(operator)
    }
}

/// An error that occurs when parsing an invalid version specifier operator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperatorParseError {
    pub(crate) got: String,
}

impl std::error::Error for OperatorParseError {}

impl Display for OperatorParseError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "no such comparison operator {:?}, must be one of ~= == != <= >= < > ===",
            self.got
        )
    }
}

/// Whether a specifier or specifier set admits pre-release versions.
///
/// `Auto` derives the answer from the shape of the operand (a specifier whose
/// operand is itself a pre-release admits pre-releases); the other two
/// variants are explicit overrides. This is a genuine three-state value, not
/// a nullable boolean.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PrereleasePolicy {
    /// Derive from the operand shape.
    #[default]
    Auto,
    /// Always admit pre-releases.
    Include,
    /// Never admit pre-releases.
    Exclude,
}

/// The operand of a specifier: a version for the PEP 440 operators, kept
/// verbatim for arbitrary equality.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum Operand {
    Version(Version),
    /// The `===` operand, compared as an opaque string.
    Arbitrary(String),
}

/// A version range such as `>1.2.3`, `<=4!5.6.7-a8.post9.dev0` or `== 4.1.*`.
/// Parse with [`VersionSpecifier::from_str`].
///
/// ```rust
/// use std::str::FromStr;
/// use pyrite_pep440::{Version, VersionSpecifier};
///
/// let version = Version::from_str("1.19").unwrap();
/// let version_specifier = VersionSpecifier::from_str("== 1.*").unwrap();
/// assert!(version_specifier.contains(&version));
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionSpecifier {
    /// ~=|==|!=|<=|>=|<|>|===, with the star folded in for `==`/`!=`
    operator: Operator,
    /// The whole operand behind the operator
    operand: Operand,
    /// Whether pre-release versions are admitted by [`VersionSpecifier::contains`]
    prereleases: PrereleasePolicy,
}

impl VersionSpecifier {
    /// Build from parts, validating that the operator is allowed with that
    /// operand shape.
    pub fn new(
        operator: Operator,
        pattern: VersionPattern,
    ) -> Result<Self, VersionSpecifierParseError> {
        // Check if there is a star and if so, switch to the star operator
        let operator = if pattern.is_wildcard() {
            match operator {
                Operator::Equal => Operator::EqualStar,
                Operator::NotEqual => Operator::NotEqualStar,
                other => {
                    return Err(VersionSpecifierParseError {
                        message: format!(
                            "Operator {other} must not be used in version ending with a star"
                        ),
                    })
                }
            }
        } else {
            operator
        };
        let version = pattern.into_version();

        // "Local version identifiers are NOT permitted in this version specifier."
        if version.is_local() && !operator.is_local_compatible() {
            let local = version
                .local()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(".");
            return Err(VersionSpecifierParseError {
                message: format!(
                    "You can't mix a {operator} operator with a local version (`+{local}`)"
                ),
            });
        }

        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(VersionSpecifierParseError {
                message: "The ~= operator requires at least two parts in the release version"
                    .to_string(),
            });
        }

        let operand = if operator == Operator::ExactEqual {
            Operand::Arbitrary(version.to_string())
        } else {
            Operand::Version(version)
        };
        Ok(Self {
            operator,
            operand,
            prereleases: PrereleasePolicy::Auto,
        })
    }

    /// `==<version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            operand: Operand::Version(version),
            prereleases: PrereleasePolicy::Auto,
        }
    }

    /// Get the operator, e.g. `>=` in `>= 2.0.0`
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Get the version operand, e.g. `2.0.0` in `<= 2.0.0`.
    ///
    /// `None` for arbitrary equality, whose operand is an opaque string.
    pub fn version(&self) -> Option<&Version> {
        match &self.operand {
            Operand::Version(version) => Some(version),
            Operand::Arbitrary(_) => None,
        }
    }

    /// Override the pre-release policy and return the updated specifier.
    #[must_use]
    pub fn with_prereleases(mut self, prereleases: PrereleasePolicy) -> Self {
        self.prereleases = prereleases;
        self
    }

    /// The pre-release policy of this specifier, unresolved.
    pub fn prereleases(&self) -> PrereleasePolicy {
        self.prereleases
    }

    /// Whether [`VersionSpecifier::contains`] will admit pre-release
    /// versions: an explicit override wins, otherwise the specifier admits
    /// pre-releases exactly when its operand is itself a pre-release.
    pub fn allows_prereleases(&self) -> bool {
        match self.prereleases {
            PrereleasePolicy::Include => true,
            PrereleasePolicy::Exclude => false,
            PrereleasePolicy::Auto => match self.operator {
                // `!= 2.0a1` does not opt in to pre-releases
                Operator::NotEqual | Operator::NotEqualStar => false,
                _ => match &self.operand {
                    Operand::Version(version) => version.any_prerelease(),
                    Operand::Arbitrary(text) => Version::from_str(text)
                        .map(|version| version.any_prerelease())
                        .unwrap_or(false),
                },
            },
        }
    }

    /// Whether the given version satisfies this specifier under the
    /// specifier's own pre-release policy.
    ///
    /// <https://peps.python.org/pep-0440/#version-specifiers>
    pub fn contains(&self, version: &Version) -> bool {
        self.contains_with(version, self.prereleases)
    }

    /// Like [`VersionSpecifier::contains`], with an explicit pre-release
    /// policy overriding the specifier's own.
    pub fn contains_with(&self, version: &Version, prereleases: PrereleasePolicy) -> bool {
        let allowed = match prereleases {
            PrereleasePolicy::Include => true,
            PrereleasePolicy::Exclude => false,
            PrereleasePolicy::Auto => self.allows_prereleases(),
        };
        if !allowed && version.any_prerelease() {
            return false;
        }
        self.matches(version)
    }

    /// Like [`VersionSpecifier::contains`], on an unparsed version. An
    /// invalid version string is simply not contained, it never errors.
    pub fn contains_str(&self, version: &str) -> bool {
        Version::from_str(version)
            .map(|version| self.contains(&version))
            .unwrap_or(false)
    }

    /// The raw operator comparison, with no pre-release filtering.
    ///
    /// This implementation is as close as possible to
    /// <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/packaging/specifiers.py#L362-L496>
    fn matches(&self, version: &Version) -> bool {
        let spec = match &self.operand {
            Operand::Version(spec) => spec,
            Operand::Arbitrary(text) => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                return version.to_string().eq_ignore_ascii_case(text);
            }
        };

        match self.operator {
            Operator::Equal => {
                // "Except where specifically noted below, local version
                // identifiers MUST NOT be permitted in version specifiers,
                // and local version labels MUST be ignored entirely when
                // checking if candidate versions match a given version
                // specifier."
                if spec.is_local() {
                    version == spec
                } else {
                    &version.public() == spec
                }
            }
            Operator::NotEqual => {
                if spec.is_local() {
                    version != spec
                } else {
                    &version.public() != spec
                }
            }
            Operator::EqualStar => {
                spec.epoch() == version.epoch()
                    && release_prefix_matches(spec.release(), version.release())
            }
            Operator::NotEqualStar => {
                spec.epoch() != version.epoch()
                    || !release_prefix_matches(spec.release(), version.release())
            }
            Operator::ExactEqual => unreachable!("arbitrary operand handled above"),
            Operator::TildeEqual => {
                // "For a given release identifier V.N, the compatible release
                // clause is approximately equivalent to the pair of
                // comparison clauses: `>= V.N, == V.*`"
                // The constructor guarantees at least two release segments.
                let prefix = &spec.release()[..spec.release().len() - 1];
                spec.epoch() == version.epoch()
                    && release_prefix_matches(prefix, version.release())
                    && version.public() >= *spec
            }
            Operator::GreaterThan => Self::greater_than(spec, version),
            Operator::GreaterThanEqual => version.public() >= *spec,
            Operator::LessThan => Self::less_than(spec, version),
            Operator::LessThanEqual => version.public() <= *spec,
        }
    }

    fn less_than(spec: &Version, version: &Version) -> bool {
        if !(version < spec) {
            return false;
        }
        // This special case is here so that, unless the specifier itself is a
        // pre-release version, we do not accept pre-release versions of the
        // version mentioned in the specifier (e.g. <3.1 should not match
        // 3.1.dev0, but should match 3.0.dev0).
        if !spec.any_prerelease()
            && version.any_prerelease()
            && version.base_version() == spec.base_version()
        {
            return false;
        }
        true
    }

    fn greater_than(spec: &Version, version: &Version) -> bool {
        if !(version > spec) {
            return false;
        }
        if version.base_version() == spec.base_version() {
            // This special case is here so that, unless the specifier itself
            // is a post-release version, we do not accept post-release
            // versions of the version mentioned in the specifier (e.g. >3.1
            // should not match 3.1.post0, but should match 3.2.post0).
            if !spec.is_post() && version.is_post() {
                return false;
            }

            // The specifier cannot have a local version itself here, so a
            // candidate that only exceeds it by a local label is out.
            if version.is_local() {
                return false;
            }
        }
        true
    }
}

/// Whether the release of a candidate version starts with the given prefix,
/// padding the candidate with zeros: `2` matches the prefix `2.0`, `2.1`
/// does not.
fn release_prefix_matches(prefix: &[u64], release: &[u64]) -> bool {
    prefix
        .iter()
        .enumerate()
        .all(|(index, expected)| release.get(index).copied().unwrap_or(0) == *expected)
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*`, `~=1.0+abc.5` or
    /// `<=1!2012.2`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let trimmed = spec.trim();
        // Arbitrary equality admits any operand, kept verbatim. Match it
        // before `==`, of which it is an extension.
        if let Some(operand) = trimmed.strip_prefix("===") {
            tracing::warn!("Using arbitrary equality (`===`) is discouraged");
            let operand = operand.trim();
            if operand.is_empty() {
                return Err(VersionSpecifierParseError::no_match(spec));
            }
            return Ok(Self {
                operator: Operator::ExactEqual,
                operand: Operand::Arbitrary(operand.to_string()),
                prereleases: PrereleasePolicy::Auto,
            });
        }

        let (operator, operator_len) = match trimmed.as_bytes() {
            [b'~', b'=', ..] => (Operator::TildeEqual, 2),
            [b'=', b'=', ..] => (Operator::Equal, 2),
            [b'!', b'=', ..] => (Operator::NotEqual, 2),
            [b'<', b'=', ..] => (Operator::LessThanEqual, 2),
            [b'>', b'=', ..] => (Operator::GreaterThanEqual, 2),
            [b'<', ..] => (Operator::LessThan, 1),
            [b'>', ..] => (Operator::GreaterThan, 1),
            _ => return Err(VersionSpecifierParseError::no_match(spec)),
        };
        let pattern =
            VersionPattern::from_str(&trimmed[operator_len..]).map_err(|err| {
                if err.is_generic() {
                    VersionSpecifierParseError::no_match(spec)
                } else {
                    VersionSpecifierParseError {
                        message: err.to_string(),
                    }
                }
            })?;
        Self::new(operator, pattern)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.operand {
            Operand::Arbitrary(text) => write!(f, "{}{text}", self.operator),
            Operand::Version(version) => {
                if self.operator.is_star() {
                    write!(f, "{}{version}.*", self.operator)
                } else {
                    write!(f, "{}{version}", self.operator)
                }
            }
        }
    }
}

/// <https://github.com/serde-rs/serde/issues/1316#issue-332908452>
impl<'de> Deserialize<'de> for VersionSpecifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// An error that occurs when a single version specifier fails to parse.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionSpecifierParseError {
    message: String,
}

impl VersionSpecifierParseError {
    fn no_match(spec: &str) -> Self {
        Self {
            message: format!("Version specifier `{spec}` doesn't match PEP 440 rules"),
        }
    }
}

impl std::error::Error for VersionSpecifierParseError {}

impl Display for VersionSpecifierParseError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// A set of specifiers, deduplicated by canonical textual form, such as
/// `>1.2,<2.0` being `[">1.2", "<2.0"]`.
///
/// Membership is the conjunction over all members; the set carries its own
/// pre-release policy.
///
/// ```rust
/// # use std::str::FromStr;
/// # use pyrite_pep440::{VersionSpecifiers, Version};
///
/// let version = Version::from_str("1.19").unwrap();
/// let version_specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
/// assert!(version_specifiers.contains(&version));
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionSpecifiers {
    /// Sorted by canonical display and deduplicated, so that member order is
    /// irrelevant for equality and serialization.
    specifiers: Vec<VersionSpecifier>,
    prereleases: PrereleasePolicy,
}

impl VersionSpecifiers {
    /// The empty set, which contains every version.
    pub fn empty() -> Self {
        Self {
            specifiers: Vec::new(),
            prereleases: PrereleasePolicy::Auto,
        }
    }

    /// Override the pre-release policy and return the updated set.
    #[must_use]
    pub fn with_prereleases(mut self, prereleases: PrereleasePolicy) -> Self {
        self.prereleases = prereleases;
        self
    }

    /// The pre-release policy of this set, unresolved.
    pub fn prereleases(&self) -> PrereleasePolicy {
        self.prereleases
    }

    /// Whether [`VersionSpecifiers::contains`] will admit pre-releases: an
    /// explicit override wins, otherwise pre-releases are admitted when any
    /// member admits them.
    pub fn allows_prereleases(&self) -> bool {
        match self.prereleases {
            PrereleasePolicy::Include => true,
            PrereleasePolicy::Exclude => false,
            PrereleasePolicy::Auto => self
                .specifiers
                .iter()
                .any(VersionSpecifier::allows_prereleases),
        }
    }

    /// Whether the version satisfies all members of the set, under the
    /// set-level pre-release policy.
    pub fn contains(&self, version: &Version) -> bool {
        self.contains_with(version, self.prereleases)
    }

    /// Like [`VersionSpecifiers::contains`], with an explicit pre-release
    /// policy overriding the set's own.
    pub fn contains_with(&self, version: &Version, prereleases: PrereleasePolicy) -> bool {
        let allowed = match prereleases {
            PrereleasePolicy::Include => true,
            PrereleasePolicy::Exclude => false,
            PrereleasePolicy::Auto => self.allows_prereleases(),
        };
        if !allowed && version.any_prerelease() {
            return false;
        }
        self.specifiers
            .iter()
            .all(|specifier| specifier.matches(version))
    }

    /// Like [`VersionSpecifiers::contains`], on an unparsed version. An
    /// invalid version string is simply not contained, it never errors.
    pub fn contains_str(&self, version: &str) -> bool {
        Version::from_str(version)
            .map(|version| self.contains(&version))
            .unwrap_or(false)
    }

    /// Filter the iterable down to the items whose version satisfies the
    /// set.
    ///
    /// Smarter than `contains` in a loop: when nothing passes under the
    /// default pre-release policy but some pre-releases match the operators,
    /// and the set does not explicitly exclude pre-releases, those
    /// pre-releases pass through instead of an empty result.
    ///
    /// Items without a parseable version are dropped, never an error;
    /// matching raw strings pass through unchanged.
    pub fn filter<I, T>(&self, iterable: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
        T: CandidateVersion,
    {
        let allowed = self.allows_prereleases();
        let mut filtered = Vec::new();
        let mut found_prereleases = Vec::new();
        for item in iterable {
            let Some(version) = item.candidate_version() else {
                continue;
            };
            if !self
                .specifiers
                .iter()
                .all(|specifier| specifier.matches(&version))
            {
                continue;
            }
            if version.any_prerelease() && !allowed {
                // Matched, but only as a pre-release; keep it around in case
                // nothing else matches.
                found_prereleases.push(item);
            } else {
                filtered.push(item);
            }
        }
        if filtered.is_empty() && matches!(self.prereleases, PrereleasePolicy::Auto) {
            found_prereleases
        } else {
            filtered
        }
    }

    /// Combine two sets into the conjunction of their members.
    ///
    /// Fails when one set explicitly includes pre-releases and the other
    /// explicitly excludes them.
    pub fn union(&self, other: &Self) -> Result<Self, SpecifiersCombinationError> {
        let prereleases = match (self.prereleases, other.prereleases) {
            (PrereleasePolicy::Auto, other) => other,
            (own, PrereleasePolicy::Auto) => own,
            (own, other) if own == other => own,
            _ => return Err(SpecifiersCombinationError),
        };
        let mut specifiers = self.specifiers.clone();
        specifiers.extend(other.specifiers.iter().cloned());
        Ok(Self::from_unsorted(specifiers, prereleases))
    }

    /// Returns the specifiers in canonical (sorted) order.
    pub fn iter(&self) -> std::slice::Iter<VersionSpecifier> {
        self.specifiers.iter()
    }

    fn from_unsorted(
        mut specifiers: Vec<VersionSpecifier>,
        prereleases: PrereleasePolicy,
    ) -> Self {
        // Deduplicate by the canonical textual form; arbitrary-equality
        // members are opaque strings and only collapse when identical.
        specifiers.sort_by_key(ToString::to_string);
        specifiers.dedup_by(|left, right| left.to_string() == right.to_string());
        Self {
            specifiers,
            prereleases,
        }
    }
}

impl Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.specifiers
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<I: IntoIterator<Item = VersionSpecifier>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect(), PrereleasePolicy::Auto)
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self {
            specifiers: vec![specifier],
            prereleases: PrereleasePolicy::Auto,
        }
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    /// Parses a comma-separated list of specifiers such as
    /// `>= 1.0, != 1.3.*, < 2.0`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        if spec.trim().is_empty() {
            return Ok(Self::empty());
        }
        let mut specifiers = Vec::new();
        let separator = ",";
        let mut start: usize = 0;
        for segment in spec.split(separator) {
            match VersionSpecifier::from_str(segment) {
                Ok(specifier) => specifiers.push(specifier),
                Err(err) => {
                    return Err(VersionSpecifiersParseError {
                        message: err.to_string(),
                        line: spec.to_string(),
                        start,
                        width: segment.width(),
                    });
                }
            }
            start += segment.width();
            start += separator.width();
        }
        Ok(Self::from_unsorted(specifiers, PrereleasePolicy::Auto))
    }
}

impl BitAnd for VersionSpecifiers {
    type Output = Result<VersionSpecifiers, SpecifiersCombinationError>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.union(&rhs)
    }
}

impl Display for VersionSpecifiers {
    /// The canonical form: members in sorted order, separated by `, `.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, specifier) in self.specifiers.iter().enumerate() {
            if idx == 0 {
                write!(f, "{specifier}")?;
            } else {
                write!(f, ", {specifier}")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// An item that [`VersionSpecifiers::filter`] can test: either an already
/// parsed [`Version`] or a raw string that may or may not parse as one.
pub trait CandidateVersion {
    /// The parsed version of this item, or `None` when it has none.
    fn candidate_version(&self) -> Option<Version>;
}

impl CandidateVersion for Version {
    fn candidate_version(&self) -> Option<Version> {
        Some(self.clone())
    }
}

impl CandidateVersion for &Version {
    fn candidate_version(&self) -> Option<Version> {
        Some((*self).clone())
    }
}

impl CandidateVersion for &str {
    fn candidate_version(&self) -> Option<Version> {
        Version::from_str(self).ok()
    }
}

impl CandidateVersion for String {
    fn candidate_version(&self) -> Option<Version> {
        Version::from_str(self).ok()
    }
}

/// An error that occurs when a comma-separated list of specifiers fails to
/// parse: the message for the offending segment plus its location in the
/// line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionSpecifiersParseError {
    /// The error for the offending specifier
    pub message: String,
    /// The whole input line, for underlining
    pub line: String,
    /// Column at which the offending specifier starts
    pub start: usize,
    /// Width of the offending specifier
    pub width: usize,
}

impl std::error::Error for VersionSpecifiersParseError {}

impl Display for VersionSpecifiersParseError {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Failed to parse version:")?;
        writeln!(f, "{}", self.line)?;
        writeln!(f, "{}{}", " ".repeat(self.start), "^".repeat(self.width))
    }
}

/// Combining two specifier sets whose explicit pre-release overrides
/// disagree is rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpecifiersCombinationError;

impl std::error::Error for SpecifiersCombinationError {}

impl Display for SpecifiersCombinationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(
            "Cannot combine specifier sets with True and False prerelease overrides",
        )
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn version(string: &str) -> Version {
        Version::from_str(string).unwrap()
    }

    fn specifier(string: &str) -> VersionSpecifier {
        VersionSpecifier::from_str(string).unwrap()
    }

    /// <https://peps.python.org/pep-0440/#version-matching>
    #[test]
    fn equal() {
        let v = version("1.1.post1");

        assert!(!specifier("== 1.1").contains(&v));
        assert!(specifier("== 1.1.post1").contains(&v));
        assert!(specifier("== 1.1.*").contains(&v));
    }

    /// <https://github.com/pypa/packaging/blob/237ff3aa348486cf835a980592af3a59fccd6101/tests/test_specifiers.py>
    ///
    /// The `contains_with(_, Include)` calls mirror upstream's
    /// `contains(..., prereleases=True)`: the tables exercise the operator
    /// semantics, not the pre-release filter.
    #[test]
    fn specifiers_true() {
        let pairs = [
            // Test the equality operation
            ("2.0", "==2"),
            ("2.0", "==2.0"),
            ("2.0", "==2.0.0"),
            ("2.0+deadbeef", "==2"),
            ("2.0+deadbeef", "==2.0"),
            ("2.0+deadbeef", "==2.0.0"),
            ("2.0+deadbeef", "==2+deadbeef"),
            ("2.0+deadbeef", "==2.0+deadbeef"),
            ("2.0+deadbeef", "==2.0.0+deadbeef"),
            ("2.0+deadbeef.0", "==2.0.0+deadbeef.00"),
            // Test the equality operation with a prefix
            ("2.dev1", "==2.*"),
            ("2a1", "==2.*"),
            ("2a1.post1", "==2.*"),
            ("2b1", "==2.*"),
            ("2b1.dev1", "==2.*"),
            ("2c1", "==2.*"),
            ("2c1.post1.dev1", "==2.*"),
            ("2c1.post1.dev1", "==2.0.*"),
            ("2rc1", "==2.*"),
            ("2rc1", "==2.0.*"),
            ("2", "==2.*"),
            ("2", "==2.0.*"),
            ("2", "==0!2.*"),
            ("0!2", "==2.*"),
            ("2.0", "==2.*"),
            ("2.0.0", "==2.*"),
            ("2.1+local.version", "==2.1.*"),
            // Test the in-equality operation
            ("2.1", "!=2"),
            ("2.1", "!=2.0"),
            ("2.0.1", "!=2"),
            ("2.0.1", "!=2.0"),
            ("2.0.1", "!=2.0.0"),
            ("2.0", "!=2.0+deadbeef"),
            // Test the in-equality operation with a prefix
            ("2.0", "!=3.*"),
            ("2.1", "!=2.0.*"),
            // Test the greater than equal operation
            ("2.0", ">=2"),
            ("2.0", ">=2.0"),
            ("2.0", ">=2.0.0"),
            ("2.0.post1", ">=2"),
            ("2.0.post1.dev1", ">=2"),
            ("3", ">=2"),
            // Test the less than equal operation
            ("2.0", "<=2"),
            ("2.0", "<=2.0"),
            ("2.0", "<=2.0.0"),
            ("2.0.dev1", "<=2"),
            ("2.0a1", "<=2"),
            ("2.0a1.dev1", "<=2"),
            ("2.0b1", "<=2"),
            ("2.0b1.post1", "<=2"),
            ("2.0c1", "<=2"),
            ("2.0c1.post1.dev1", "<=2"),
            ("2.0rc1", "<=2"),
            ("1", "<=2"),
            // Test the greater than operation
            ("3", ">2"),
            ("2.1", ">2.0"),
            ("2.0.1", ">2"),
            ("2.1.post1", ">2"),
            ("2.1+local.version", ">2"),
            // Test the less than operation
            ("1", "<2"),
            ("2.0", "<2.1"),
            ("2.0.dev0", "<2.1"),
            // Test the compatibility operation
            ("1", "~=1.0"),
            ("1.0.1", "~=1.0"),
            ("1.1", "~=1.0"),
            ("1.9999999", "~=1.0"),
            ("1.1", "~=1.0a1"),
            ("2022.01.01", "~=2022.01.01"),
            // Test that epochs are handled sanely
            ("2!1.0", "~=2!1.0"),
            ("2!1.0", "==2!1.*"),
            ("2!1.0", "==2!1.0"),
            ("2!1.0", "!=1.0"),
            ("1.0", "!=2!1.0"),
            ("1.0", "<=2!0.1"),
            ("2!1.0", ">=2.0"),
            ("1.0", "<2!0.1"),
            ("2!1.0", ">2.0"),
            // Test some normalization rules
            ("2.0.5", ">2.0dev"),
        ];

        for (version_str, specifier_str) in pairs {
            assert!(
                specifier(specifier_str)
                    .contains_with(&version(version_str), PrereleasePolicy::Include),
                "{version_str} {specifier_str}"
            );
        }
    }

    #[test]
    fn specifiers_false() {
        let pairs = [
            // Test the equality operation
            ("2.1", "==2"),
            ("2.1", "==2.0"),
            ("2.1", "==2.0.0"),
            ("2.0", "==2.0+deadbeef"),
            // Test the equality operation with a prefix
            ("2.0", "==3.*"),
            ("2.1", "==2.0.*"),
            ("2.1", "==2.0.0.*"),
            // Test the in-equality operation
            ("2.0", "!=2"),
            ("2.0", "!=2.0"),
            ("2.0", "!=2.0.0"),
            ("2.0+deadbeef", "!=2"),
            ("2.0+deadbeef", "!=2.0"),
            ("2.0+deadbeef", "!=2.0.0"),
            ("2.0+deadbeef", "!=2+deadbeef"),
            ("2.0+deadbeef", "!=2.0+deadbeef"),
            ("2.0+deadbeef", "!=2.0.0+deadbeef"),
            ("2.0+deadbeef.0", "!=2.0.0+deadbeef.00"),
            // Test the in-equality operation with a prefix
            ("2.dev1", "!=2.*"),
            ("2a1", "!=2.*"),
            ("2a1.post1", "!=2.*"),
            ("2rc1", "!=2.*"),
            ("2rc1", "!=2.0.*"),
            ("2", "!=2.*"),
            ("2", "!=2.0.*"),
            ("2.0", "!=2.*"),
            ("2.0.0", "!=2.*"),
            // Test the greater than equal operation
            ("2.0.dev1", ">=2"),
            ("2.0a1", ">=2"),
            ("2.0a1.dev1", ">=2"),
            ("2.0b1", ">=2"),
            ("2.0b1.post1", ">=2"),
            ("2.0c1", ">=2"),
            ("2.0c1.post1.dev1", ">=2"),
            ("2.0rc1", ">=2"),
            ("1", ">=2"),
            // Test the less than equal operation
            ("2.0.post1", "<=2"),
            ("2.0.post1.dev1", "<=2"),
            ("3", "<=2"),
            // Test the greater than operation
            ("1", ">2"),
            ("2.0.dev1", ">2"),
            ("2.0a1", ">2"),
            ("2.0a1.post1", ">2"),
            ("2.0b1", ">2"),
            ("2.0b1.dev1", ">2"),
            ("2.0c1", ">2"),
            ("2.0c1.post1.dev1", ">2"),
            ("2.0rc1", ">2"),
            ("2.0", ">2"),
            ("2.0.post1", ">2"),
            ("2.0.post1.dev1", ">2"),
            ("2.0+local.version", ">2"),
            // Test the less than operation
            ("2.0.dev1", "<2"),
            ("2.0a1", "<2"),
            ("2.0a1.post1", "<2"),
            ("2.0b1", "<2"),
            ("2.0b2.dev1", "<2"),
            ("2.0c1", "<2"),
            ("2.0c1.post1.dev1", "<2"),
            ("2.0rc1", "<2"),
            ("2.0", "<2"),
            ("2.post1", "<2"),
            ("2.post1.dev1", "<2"),
            ("3", "<2"),
            // Test the compatibility operation
            ("2.0", "~=1.0"),
            ("1.1.0", "~=1.0.0"),
            ("1.1.post1", "~=1.0.0"),
            // Test that epochs are handled sanely
            ("1.0", "~=2!1.0"),
            ("2!1.0", "~=1.0"),
            ("2!1.0", "==1.0"),
            ("1.0", "==2!1.0"),
            ("2!1.0", "==1.*"),
            ("1.0", "==2!1.*"),
            ("2!1.0", "!=2!1.0"),
        ];
        for (version_str, specifier_str) in pairs {
            assert!(
                !specifier(specifier_str)
                    .contains_with(&version(version_str), PrereleasePolicy::Include),
                "{version_str} {specifier_str}"
            );
        }
    }

    #[test]
    fn arbitrary_equality() {
        assert!(specifier("=== 1.2a1").contains(&version("1.2a1")));
        assert!(!specifier("=== 1.2a1").contains(&version("1.2a1+local")));
        // Opaque string comparison: no zero padding, no normalization
        assert!(!specifier("=== 1.0").contains(&version("1")));
        // Arbitrary operands that aren't versions at all parse fine
        let spec = specifier("===foobar");
        assert_eq!(spec.operator(), Operator::ExactEqual);
        assert_eq!(spec.version(), None);
        assert_eq!(spec.to_string(), "===foobar");
        assert!(!spec.contains_str("1.0"));
    }

    #[test]
    fn prerelease_rule() {
        // By default a specifier with a final operand rejects pre-releases
        assert!(!specifier(">=1.0").contains(&version("2.0a1")));
        // ... unless its operand is itself a pre-release
        assert!(specifier(">=1.0a1").contains(&version("2.0a1")));
        // ... or pre-releases were explicitly requested
        assert!(specifier(">=1.0")
            .with_prereleases(PrereleasePolicy::Include)
            .contains(&version("2.0a1")));
        // An explicit exclude beats a pre-release operand
        assert!(!specifier(">=1.0a1")
            .with_prereleases(PrereleasePolicy::Exclude)
            .contains(&version("2.0a1")));
        // `!=` does not opt in to pre-releases
        assert!(!specifier("!=2.0a1").contains(&version("1.0b1")));
    }

    #[test]
    fn contains_str_invalid_version_is_false() {
        assert!(!specifier(">=1.0").contains_str("french toast"));
        assert!(specifier(">=1.0").contains_str("1.4"));
    }

    /// <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/tests/test_specifiers.py#L44-L84>
    #[test]
    fn invalid_specifiers() {
        let specifiers = [
            // Operator-less specifier
            ("2.0", None),
            // Invalid operator
            ("=>2.0", None),
            // Version-less specifier
            ("==", None),
            // Local segment on operators which don't support them
            (
                "~=1.0+5",
                Some("You can't mix a ~= operator with a local version (`+5`)"),
            ),
            (
                ">=1.0+deadbeef",
                Some("You can't mix a >= operator with a local version (`+deadbeef`)"),
            ),
            (
                "<=1.0+abc123",
                Some("You can't mix a <= operator with a local version (`+abc123`)"),
            ),
            (
                ">1.0+watwat",
                Some("You can't mix a > operator with a local version (`+watwat`)"),
            ),
            (
                "<1.0+1.0",
                Some("You can't mix a < operator with a local version (`+1.0`)"),
            ),
            // Prefix matching on operators which don't support them
            (
                "~=1.0.*",
                Some("Operator ~= must not be used in version ending with a star"),
            ),
            (
                ">=1.0.*",
                Some("Operator >= must not be used in version ending with a star"),
            ),
            (
                "<=1.0.*",
                Some("Operator <= must not be used in version ending with a star"),
            ),
            (
                ">1.0.*",
                Some("Operator > must not be used in version ending with a star"),
            ),
            (
                "<1.0.*",
                Some("Operator < must not be used in version ending with a star"),
            ),
            // Combination of local and prefix matching on operators which do
            // support one or the other
            ("==1.0.*+5", None),
            ("!=1.0.*+deadbeef", None),
            // Prefix matching cannot be used with a pre-release, post-release,
            // dev or local version
            (
                "==2.0a1.*",
                Some("You can't have both a trailing `.*` and a prerelease version"),
            ),
            (
                "!=2.0a1.*",
                Some("You can't have both a trailing `.*` and a prerelease version"),
            ),
            (
                "==2.0.post1.*",
                Some("You can't have both a trailing `.*` and a post version"),
            ),
            (
                "!=2.0.post1.*",
                Some("You can't have both a trailing `.*` and a post version"),
            ),
            (
                "==2.0.dev1.*",
                Some("You can't have both a trailing `.*` and a dev version"),
            ),
            (
                "!=2.0.dev1.*",
                Some("You can't have both a trailing `.*` and a dev version"),
            ),
            (
                "==1.0+5.*",
                Some("You can't have both a trailing `.*` and a local version"),
            ),
            (
                "!=1.0+deadbeef.*",
                Some("You can't have both a trailing `.*` and a local version"),
            ),
            // Prefix matching must appear at the end
            ("==1.0.*.5", None),
            // Compatible operator requires 2 digits in the release operator
            (
                "~=1",
                Some("The ~= operator requires at least two parts in the release version"),
            ),
        ];
        for (input, error) in specifiers {
            let result = VersionSpecifier::from_str(input).unwrap_err().to_string();
            if let Some(error) = error {
                assert_eq!(result, error, "{input}");
            } else {
                assert_eq!(
                    result,
                    format!("Version specifier `{input}` doesn't match PEP 440 rules"),
                    "{input}"
                );
            }
        }
    }

    #[test]
    fn display_strips_whitespace() {
        assert_eq!(specifier("==     1.1.*").to_string(), "==1.1.*");
        assert_eq!(specifier("!=     1.1.*").to_string(), "!=1.1.*");
        assert_eq!(specifier(" >= 3.7 ").to_string(), ">=3.7");
    }

    #[test]
    fn specifiers_canonical_display() {
        assert_eq!(
            VersionSpecifiers::from_str(">= 3.7").unwrap().to_string(),
            ">=3.7"
        );
        // Members are sorted and deduplicated by canonical text
        assert_eq!(
            VersionSpecifiers::from_str(">=3.7, <      4.0, != 3.9.0, >=3.7")
                .unwrap()
                .to_string(),
            "!=3.9.0, <4.0, >=3.7"
        );
        assert_eq!(
            VersionSpecifiers::from_str(">=3.7"),
            VersionSpecifiers::from_str("  >= 3.7  "),
        );
    }

    /// These occur in the simple api, e.g.
    /// <https://pypi.org/simple/geopandas/?format=application/vnd.pypi.simple.v1+json>
    #[test]
    fn specifiers_empty() {
        let empty = VersionSpecifiers::from_str("").unwrap();
        assert_eq!(empty.to_string(), "");
        assert!(empty.contains(&version("1.0")));
        // An empty set still rejects pre-releases by default
        assert!(!empty.contains(&version("1.0a1")));
    }

    #[test]
    fn specifiers_parse_error() {
        let result = VersionSpecifiers::from_str("~= 0.9, %‍= 1.0, != 1.3.4.*");
        assert_eq!(
            result.unwrap_err().to_string(),
            indoc! {r"
                Failed to parse version:
                ~= 0.9, %‍= 1.0, != 1.3.4.*
                       ^^^^^^^
            "}
        );
    }

    #[test]
    fn specifiers_contains() {
        let specifiers = VersionSpecifiers::from_str("~=1.0, >=1.0, !=1.1").unwrap();
        assert!(specifiers.contains(&version("1.2")));
        assert!(!specifiers.contains(&version("1.1")));
        assert!(!specifiers.contains(&version("2.0")));
        assert!(!specifiers.contains(&version("1.0a5")));
    }

    #[test]
    fn combination() {
        let combined = (VersionSpecifiers::from_str("~=1.0").unwrap()
            & VersionSpecifiers::from_str(">=1.0").unwrap())
        .unwrap();
        let combined = (combined & VersionSpecifiers::from_str("!=1.1").unwrap()).unwrap();
        assert_eq!(combined.to_string(), "!=1.1, >=1.0, ~=1.0");
        assert!(combined.contains(&version("1.2")));
        assert!(!combined.contains(&version("1.1")));

        // Explicit pre-release overrides must agree
        let include = VersionSpecifiers::from_str(">=1.0")
            .unwrap()
            .with_prereleases(PrereleasePolicy::Include);
        let exclude = VersionSpecifiers::from_str("<2.0")
            .unwrap()
            .with_prereleases(PrereleasePolicy::Exclude);
        assert_eq!(include.union(&exclude), Err(SpecifiersCombinationError));
        // ... while an explicit override combined with auto is fine
        let auto = VersionSpecifiers::from_str("<2.0").unwrap();
        assert_eq!(
            include.union(&auto).unwrap().prereleases(),
            PrereleasePolicy::Include
        );
    }

    #[test]
    fn filter_mixed_items() {
        let specifiers = VersionSpecifiers::from_str("~=1.0, >=1.0, !=1.1").unwrap();
        // Raw strings pass through when they match and are dropped when they
        // don't parse
        assert_eq!(
            specifiers.filter(["1.0a5", "1.0", "1.4", "french toast"]),
            vec!["1.0", "1.4"]
        );
        assert_eq!(
            specifiers.filter([version("1.0a5"), version("1.0"), version("1.4")]),
            vec![version("1.0"), version("1.4")]
        );
    }

    #[test]
    fn filter_prerelease_fallthrough() {
        // Nothing final matches, so the matching pre-releases pass through
        let specifiers = VersionSpecifiers::from_str(">=2.0a1, <3").unwrap();
        assert!(specifiers.allows_prereleases());
        assert_eq!(specifiers.filter(["2.0a1", "1.0"]), vec!["2.0a1"]);

        let strict = VersionSpecifiers::from_str(">=1.0").unwrap();
        assert_eq!(strict.filter(["2.0a1"]), vec!["2.0a1"]);
        // ... unless pre-releases are explicitly excluded
        assert_eq!(
            strict
                .clone()
                .with_prereleases(PrereleasePolicy::Exclude)
                .filter(["2.0a1"]),
            Vec::<&str>::new()
        );
        // ... and never when a final release matches too
        assert_eq!(strict.filter(["2.0a1", "1.0"]), vec!["1.0"]);
    }

    #[test]
    fn arbitrary_equality_is_opaque_in_sets() {
        // `===1.0` and `===1.0.0` are different strings, so both survive
        let specifiers = VersionSpecifiers::from_str("===1.0, ===1.0.0").unwrap();
        assert_eq!(specifiers.len(), 2);
        // Whereas normalizing members deduplicate
        let specifiers = VersionSpecifiers::from_str("==1.0, == 1.0").unwrap();
        assert_eq!(specifiers.len(), 1);
    }

    #[test]
    fn serde_round_trip() {
        let specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
        let json = serde_json::to_string(&specifiers).unwrap();
        assert_eq!(json, r#""<2.0, >=1.16""#);
        let back: VersionSpecifiers = serde_json::from_str(&json).unwrap();
        assert_eq!(back, specifiers);
    }
}
