use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// The regular expression matching any valid PEP 440 version, from
/// [Appendix B](https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions)
/// of the spec.
///
/// Exposed verbatim (unanchored, without flags) so that downstream tooling
/// can embed it into larger grammars. It must be compiled with the `x`
/// (verbose) and `i` (case-insensitive) flags.
pub const VERSION_PATTERN: &str = r"
    v?
    (?:
        (?:(?P<epoch>[0-9]+)!)?                           # epoch
        (?P<release>[0-9]+(?:\.[0-9]+)*)                  # release segment
        (?P<pre>                                          # pre-release
            [-_\.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_\.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>                                         # post release
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:
                [-_\.]?
                (?P<post_l>post|rev|r)
                [-_\.]?
                (?P<post_n2>[0-9]+)?
            )
        )?
        (?P<dev>                                          # dev release
            [-_\.]?
            (?P<dev_l>dev)
            [-_\.]?
            (?P<dev_n>[0-9]+)?
        )?
    )
    (?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?       # local version
";

/// Matches a version anchored within optional surrounding whitespace.
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?xi)^\s*{VERSION_PATTERN}\s*$")).unwrap());

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// Values are constructed at parse time and never mutated afterwards;
/// equality, ordering and hashing all go through the canonical comparison
/// key, so `1.0 == 1.0.0` and `1.0+foo > 1.0`.
///
/// Parse with [`Version::from_str`]:
///
/// ```rust
/// use std::str::FromStr;
/// use pyrite_pep440::Version;
///
/// let version = Version::from_str("1.19").unwrap();
/// ```
#[derive(Clone)]
pub struct Version {
    inner: Arc<VersionInner>,
}

#[derive(Debug)]
struct VersionInner {
    /// The [versioning epoch](https://peps.python.org/pep-0440/#version-epochs).
    /// Normally just 0, but you can increment it if you switched the
    /// versioning scheme.
    epoch: u64,
    /// The normal number part of the version (["final
    /// release"](https://peps.python.org/pep-0440/#final-releases)), such as
    /// `1.2.3` in `4!1.2.3-a8.post9.dev1`.
    release: Vec<u64>,
    /// The [pre-release](https://peps.python.org/pep-0440/#pre-releases),
    /// i.e. alpha, beta or rc plus a number.
    pre: Option<Prerelease>,
    /// The [post release](https://peps.python.org/pep-0440/#post-releases),
    /// if any.
    post: Option<u64>,
    /// The [developmental release](https://peps.python.org/pep-0440/#developmental-releases),
    /// if any.
    dev: Option<u64>,
    /// The [local version identifier](https://peps.python.org/pep-0440/#local-version-identifiers),
    /// such as `deadbeef` in `1.2.3+deadbeef`. Empty when absent.
    local: Vec<LocalSegment>,
    /// The comparison key, computed on first use. Comparing versions is the
    /// hot path of every consumer, parsing must not pay for it up front.
    key: OnceCell<VersionKey>,
}

impl Version {
    /// Create a new version from an iterator of release segments.
    ///
    /// # Panics
    ///
    /// When the iterator yields no elements.
    pub fn new<I>(release: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let release: Vec<u64> = release.into_iter().collect();
        assert!(!release.is_empty(), "release must have non-zero size");
        Self::from_parts(0, release, None, None, None, Vec::new())
    }

    fn from_parts(
        epoch: u64,
        release: Vec<u64>,
        pre: Option<Prerelease>,
        post: Option<u64>,
        dev: Option<u64>,
        local: Vec<LocalSegment>,
    ) -> Self {
        Self {
            inner: Arc::new(VersionInner {
                epoch,
                release,
                pre,
                post,
                dev,
                local,
                key: OnceCell::new(),
            }),
        }
    }

    /// Returns the epoch of this version.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch
    }

    /// Returns the release segments of this version.
    pub fn release(&self) -> &[u64] {
        &self.inner.release
    }

    /// Returns the pre-release part of this version, if it exists.
    pub fn pre(&self) -> Option<Prerelease> {
        self.inner.pre
    }

    /// Returns the post-release part of this version, if it exists.
    pub fn post(&self) -> Option<u64> {
        self.inner.post
    }

    /// Returns the dev-release part of this version, if it exists.
    pub fn dev(&self) -> Option<u64> {
        self.inner.dev
    }

    /// Returns the local segments of this version, empty if there are none.
    pub fn local(&self) -> &[LocalSegment] {
        &self.inner.local
    }

    /// The first release segment, or 0 if unavailable.
    pub fn major(&self) -> u64 {
        self.release().first().copied().unwrap_or_default()
    }

    /// The second release segment, or 0 if unavailable.
    pub fn minor(&self) -> u64 {
        self.release().get(1).copied().unwrap_or_default()
    }

    /// The third release segment, or 0 if unavailable.
    pub fn micro(&self) -> u64 {
        self.release().get(2).copied().unwrap_or_default()
    }

    /// Whether this is an alpha, beta or rc version.
    pub fn is_pre(&self) -> bool {
        self.inner.pre.is_some()
    }

    /// Whether this is a post version.
    pub fn is_post(&self) -> bool {
        self.inner.post.is_some()
    }

    /// Whether this is a dev version.
    pub fn is_dev(&self) -> bool {
        self.inner.dev.is_some()
    }

    /// Whether this carries a local version identifier.
    ///
    /// When true, the slice returned by [`Version::local`] is non-empty.
    pub fn is_local(&self) -> bool {
        !self.inner.local.is_empty()
    }

    /// Whether this is an alpha/beta/rc *or* dev version. This is the
    /// "pre-release" notion that version specifiers filter on.
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    /// Whether this is a stable version, i.e. neither alpha/beta/rc nor dev.
    pub fn is_stable(&self) -> bool {
        !self.any_prerelease()
    }

    /// The version without its local segments. `1.2.3+deadbeef` -> `1.2.3`.
    ///
    /// "Local version labels MUST be ignored entirely when checking if
    /// candidate versions match a given version specifier."
    #[must_use]
    pub fn public(&self) -> Self {
        if !self.is_local() {
            return self.clone();
        }
        Self::from_parts(
            self.epoch(),
            self.release().to_vec(),
            self.pre(),
            self.post(),
            self.dev(),
            Vec::new(),
        )
    }

    /// The epoch and release only: `1!2.3rc1.post4+abc` -> `1!2.3`.
    #[must_use]
    pub fn base_version(&self) -> Self {
        Self::from_parts(
            self.epoch(),
            self.release().to_vec(),
            None,
            None,
            None,
            Vec::new(),
        )
    }

    /// Set the epoch and return the updated version.
    #[must_use]
    pub fn with_epoch(self, epoch: u64) -> Self {
        Self::from_parts(
            epoch,
            self.release().to_vec(),
            self.pre(),
            self.post(),
            self.dev(),
            self.local().to_vec(),
        )
    }

    /// Set the pre-release component and return the updated version.
    #[must_use]
    pub fn with_pre(self, pre: Option<Prerelease>) -> Self {
        Self::from_parts(
            self.epoch(),
            self.release().to_vec(),
            pre,
            self.post(),
            self.dev(),
            self.local().to_vec(),
        )
    }

    /// Set the post-release component and return the updated version.
    #[must_use]
    pub fn with_post(self, post: Option<u64>) -> Self {
        Self::from_parts(
            self.epoch(),
            self.release().to_vec(),
            self.pre(),
            post,
            self.dev(),
            self.local().to_vec(),
        )
    }

    /// Set the dev-release component and return the updated version.
    #[must_use]
    pub fn with_dev(self, dev: Option<u64>) -> Self {
        Self::from_parts(
            self.epoch(),
            self.release().to_vec(),
            self.pre(),
            self.post(),
            dev,
            self.local().to_vec(),
        )
    }

    /// Set the local segments and return the updated version.
    #[must_use]
    pub fn with_local(self, local: Vec<LocalSegment>) -> Self {
        Self::from_parts(
            self.epoch(),
            self.release().to_vec(),
            self.pre(),
            self.post(),
            self.dev(),
            local,
        )
    }

    /// The comparison key. Computed once per value; concurrent readers may
    /// race to initialize it, first write wins and duplicates are discarded.
    fn key(&self) -> &VersionKey {
        self.inner.key.get_or_init(|| VersionKey::new(self))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Hashes the comparison key, so that `1.0` and `1.0.0` collide the way
    /// they compare equal.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0b2-346 < 1.0c1.dev456 < 1.0c1 < 1.0rc2
    /// < 1.0c3 < 1.0 < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(other.key())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
    ///
    /// Wildcard versions are not allowed here; parse a [`VersionPattern`]
    /// when a trailing `.*` should be accepted.
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::new(version))?;
        parse_captures(&captures, version)
    }
}

/// Shows the normalized form: `[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`.
impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch() != 0 {
            write!(f, "{}!", self.epoch())?;
        }
        let release = self
            .release()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(".");
        f.write_str(&release)?;
        if let Some(Prerelease { kind, number }) = self.pre() {
            write!(f, "{kind}{number}")?;
        }
        if let Some(post) = self.post() {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev() {
            write!(f, ".dev{dev}")?;
        }
        if self.is_local() {
            let local = self
                .local()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(".");
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// <https://github.com/serde-rs/serde/issues/1316#issue-332908452>
impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

/// <https://github.com/serde-rs/serde/issues/1316#issue-332908452>
impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A version pattern: just like a version, except that it may end with a
/// trailing `.*` wildcard, as permitted in `==` and `!=` specifiers.
///
/// A `VersionPattern` cannot do any matching itself; it is paired with an
/// [`Operator`](crate::Operator) to form a
/// [`VersionSpecifier`](crate::VersionSpecifier).
///
/// * `1.2.3` -> verbatim pattern
/// * `1.2.3.*` -> wildcard pattern
/// * `1.2.*.4` -> invalid
/// * `1.0-dev1.*` -> invalid
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionPattern {
    version: Version,
    wildcard: bool,
}

impl VersionPattern {
    /// Creates a verbatim pattern matching the given version exactly.
    pub fn verbatim(version: Version) -> Self {
        Self {
            version,
            wildcard: false,
        }
    }

    /// Creates a wildcard pattern matching any version with the given prefix.
    pub fn wildcard(version: Version) -> Self {
        Self {
            version,
            wildcard: true,
        }
    }

    /// Returns the underlying version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Consumes this pattern and returns ownership of the underlying version.
    pub fn into_version(self) -> Version {
        self.version
    }

    /// Returns true if and only if this pattern contains a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

impl FromStr for VersionPattern {
    type Err = VersionParseError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        let trimmed = pattern.trim();
        if let Some(prefix) = trimmed.strip_suffix(".*") {
            let version = Version::from_str(prefix)
                .map_err(|_| VersionParseError::new(pattern))?;
            // The wildcard replaces everything after the release segment, so
            // nothing may follow the release in the prefix.
            if version.is_pre() {
                return Err(VersionParseError::message(
                    "You can't have both a trailing `.*` and a prerelease version",
                ));
            }
            if version.is_post() {
                return Err(VersionParseError::message(
                    "You can't have both a trailing `.*` and a post version",
                ));
            }
            if version.is_dev() {
                return Err(VersionParseError::message(
                    "You can't have both a trailing `.*` and a dev version",
                ));
            }
            if version.is_local() {
                return Err(VersionParseError::message(
                    "You can't have both a trailing `.*` and a local version",
                ));
            }
            Ok(Self::wildcard(version))
        } else {
            Version::from_str(trimmed).map(Self::verbatim)
        }
    }
}

impl std::fmt::Display for VersionPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.wildcard {
            write!(f, "{}.*", self.version)
        } else {
            self.version.fmt(f)
        }
    }
}

/// An optional pre-release modifier and number applied to a version.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Prerelease {
    /// The kind of pre-release.
    pub kind: PrereleaseKind,
    /// The number associated with the pre-release.
    pub number: u64,
}

/// Optional pre-release modifier (alpha, beta or release candidate) appended
/// to a version.
///
/// <https://peps.python.org/pep-0440/#pre-releases>
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PrereleaseKind {
    /// alpha pre-release
    Alpha,
    /// beta pre-release
    Beta,
    /// release candidate pre-release
    Rc,
}

impl std::fmt::Display for PrereleaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

impl std::fmt::Display for Prerelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// A part of the [local version identifier](https://peps.python.org/pep-0440/#local-version-identifiers).
///
/// > If a segment consists entirely of ASCII digits then that section should
/// > be considered an integer for comparison purposes and if a segment
/// > contains any ASCII letters then that segment is compared
/// > lexicographically with case insensitivity. When comparing a numeric and
/// > lexicographic segment, the numeric section always compares as greater
/// > than the lexicographic segment.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum LocalSegment {
    /// Not parseable as an integer segment of a local version
    String(String),
    /// Inferred integer segment of a local version
    Number(u64),
}

impl std::fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => string.fmt(f),
            Self::Number(number) => number.fmt(f),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// The total-order key of a version, following the [summary of permitted
/// suffixes and relative ordering][pep440-suffix-ordering].
///
/// The release has its trailing zeros stripped, making `1.0 == 1.0.0`. The
/// sentinels place a dev-only release below any pre-release of the same
/// base, a dev suffix below the corresponding non-dev release, an absent
/// post below any post, and an absent local below any local.
///
/// [pep440-suffix-ordering]: https://peps.python.org/pep-0440/#summary-of-permitted-suffixes-and-relative-ordering
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct VersionKey {
    epoch: u64,
    release: Vec<u64>,
    pre: PreKey,
    post: PostKey,
    dev: DevKey,
    local: LocalKey,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum PreKey {
    /// A dev release with neither pre nor post sorts before any pre-release.
    Min,
    Pre(Prerelease),
    /// No pre-release sorts after any pre-release.
    Max,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum PostKey {
    /// No post release sorts before any post release.
    Min,
    Post(u64),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum DevKey {
    Dev(u64),
    /// No dev release sorts after any dev release of the same base.
    Max,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum LocalKey {
    /// No local version sorts before any local version: `1.0+abc > 1.0`.
    Min,
    Segments(Vec<LocalSegment>),
}

impl VersionKey {
    fn new(version: &Version) -> Self {
        let mut release = version.release().to_vec();
        while release.len() > 1 && release.last() == Some(&0) {
            release.pop();
        }
        // Also a bare trailing zero such as `0.0.0` collapses to `[0]` via
        // the `len() > 1` guard above, never to an empty release.
        let pre = match (version.pre(), version.post(), version.dev()) {
            (Some(pre), _, _) => PreKey::Pre(pre),
            (None, None, Some(_)) => PreKey::Min,
            (None, _, _) => PreKey::Max,
        };
        let post = match version.post() {
            Some(post) => PostKey::Post(post),
            None => PostKey::Min,
        };
        let dev = match version.dev() {
            Some(dev) => DevKey::Dev(dev),
            None => DevKey::Max,
        };
        let local = if version.is_local() {
            LocalKey::Segments(version.local().to_vec())
        } else {
            LocalKey::Min
        };
        Self {
            epoch: version.epoch(),
            release,
            pre,
            post,
            dev,
            local,
        }
    }
}

/// Build a version from the named capture groups of [`VERSION_PATTERN`].
fn parse_captures(captures: &Captures, input: &str) -> Result<Version, VersionParseError> {
    let number = |name: &str| -> Result<Option<u64>, VersionParseError> {
        captures
            .name(name)
            .map(|m| {
                m.as_str()
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::new(input))
            })
            .transpose()
    };

    let epoch = number("epoch")?.unwrap_or_default();
    let release = captures
        .name("release")
        .ok_or_else(|| VersionParseError::new(input))?
        .as_str()
        .split('.')
        .map(|segment| {
            segment
                .parse::<u64>()
                .map_err(|_| VersionParseError::new(input))
        })
        .collect::<Result<Vec<u64>, VersionParseError>>()?;
    let pre = match captures.name("pre_l") {
        Some(label) => {
            let kind = match label.as_str().to_ascii_lowercase().as_str() {
                "a" | "alpha" => PrereleaseKind::Alpha,
                "b" | "beta" => PrereleaseKind::Beta,
                // All remaining spellings normalize to a release candidate
                _ => PrereleaseKind::Rc,
            };
            // A pre-release without an explicit number defaults to 0
            let number = number("pre_n")?.unwrap_or_default();
            Some(Prerelease { kind, number })
        }
        None => None,
    };
    let post = if captures.name("post_n1").is_some()
        || captures.name("post_l").is_some()
    {
        Some(
            number("post_n1")?
                .or(number("post_n2")?)
                .unwrap_or_default(),
        )
    } else {
        None
    };
    let dev = match captures.name("dev_l") {
        Some(_) => Some(number("dev_n")?.unwrap_or_default()),
        None => None,
    };
    let local = match captures.name("local") {
        Some(local) => local
            .as_str()
            .split(['-', '_', '.'])
            .map(|segment| {
                if segment.bytes().all(|byte| byte.is_ascii_digit()) {
                    segment
                        .parse::<u64>()
                        .map(LocalSegment::Number)
                        .map_err(|_| VersionParseError::new(input))
                } else {
                    Ok(LocalSegment::String(segment.to_ascii_lowercase()))
                }
            })
            .collect::<Result<Vec<LocalSegment>, VersionParseError>>()?,
        None => Vec::new(),
    };

    Ok(Version::from_parts(epoch, release, pre, post, dev, local))
}

/// An error that occurs when parsing a [`Version`] or [`VersionPattern`]
/// string fails.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionParseError {
    message: String,
    /// Whether this is the catch-all "doesn't match PEP 440 rules" error, as
    /// opposed to a specific complaint about an otherwise valid version. The
    /// specifier parser rewraps the generic case with its own input.
    generic: bool,
}

impl VersionParseError {
    fn new(version: &str) -> Self {
        Self {
            message: format!("Version `{version}` doesn't match PEP 440 rules"),
            generic: true,
        }
    }

    pub(crate) fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            generic: false,
        }
    }

    pub(crate) fn is_generic(&self) -> bool {
        self.generic
    }
}

impl std::error::Error for VersionParseError {}

impl std::fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
