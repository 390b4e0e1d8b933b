use std::collections::BTreeSet;
use std::fmt::Formatter;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::{cmp, fmt};

use rustc_hash::FxHashMap;

use crate::{Arch, IosSdk, Os, Platform, PlatformError};

#[derive(Debug, thiserror::Error)]
pub enum TagsError {
    #[error(transparent)]
    PlatformError(#[from] PlatformError),
    #[error("Unsupported implementation: `{0}`")]
    UnsupportedImplementation(String),
    #[error("Unknown implementation: `{0}`")]
    UnknownImplementation(String),
    #[error("Invalid priority: `{0}`")]
    InvalidPriority(usize, #[source] std::num::TryFromIntError),
    #[error("Only CPython can be freethreading, not: {0}")]
    GilIsACPythonProblem(String),
}

/// A tag that is not exactly three dash-separated fields.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("Invalid tag: `{0}`, must be of the form `<interpreter>-<abi>-<platform>`")]
pub struct ParseTagError(String);

/// A wheel tag triple: `(interpreter, abi, platform)`, such as
/// `cp39-none-manylinux_2_17_x86_64`.
///
/// All three fields are lowercase; a tag is totally determined by them.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag {
    interpreter: String,
    abi: String,
    platform: String,
}

impl Tag {
    /// Create a tag, lowercasing every field.
    pub fn new(
        interpreter: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into().to_lowercase(),
            abi: abi.into().to_lowercase(),
            platform: platform.into().to_lowercase(),
        }
    }

    /// The interpreter tag, e.g. `cp39` or `py3`.
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// The ABI tag, e.g. `cp39m`, `abi3` or `none`.
    pub fn abi(&self) -> &str {
        &self.abi
    }

    /// The platform tag, e.g. `manylinux_2_17_x86_64` or `any`.
    pub fn platform(&self) -> &str {
        &self.platform
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}

/// Parse a possibly compressed tag such as `py2.py3-none-any` into the
/// cartesian product of its dot-separated fields.
///
/// ```rust
/// use pyrite_platform_tags::{parse_tag, Tag};
///
/// let tags = parse_tag("py2.py3-none-any").unwrap();
/// assert_eq!(tags.len(), 2);
/// assert!(tags.contains(&Tag::new("py2", "none", "any")));
/// assert!(tags.contains(&Tag::new("py3", "none", "any")));
/// ```
pub fn parse_tag(tag: &str) -> Result<BTreeSet<Tag>, ParseTagError> {
    let mut parts = tag.split('-');
    let (Some(interpreters), Some(abis), Some(platforms), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseTagError(tag.to_string()));
    };
    let mut tags = BTreeSet::new();
    for interpreter in interpreters.split('.') {
        for abi in abis.split('.') {
            for platform in platforms.split('.') {
                tags.insert(Tag::new(interpreter, abi, platform));
            }
        }
    }
    Ok(tags)
}

/// The veto hook over individual manylinux tags, the `_manylinux` module
/// protocol of the Python ecosystem.
///
/// A probe may consult the environment (or a vendored `_manylinux` module)
/// to reject specific `manylinux_<major>_<minor>_<arch>` tags even though
/// the detected glibc version would allow them.
pub trait ManylinuxPolicy {
    /// Whether `manylinux_<major>_<minor>` wheels are installable for this
    /// architecture.
    fn manylinux_compatible(&self, major: u16, minor: u16, arch: Arch) -> bool;
}

/// The default policy: everything the glibc version allows is compatible.
#[derive(Clone, Copy, Debug, Default)]
pub struct Permissive;

impl ManylinuxPolicy for Permissive {
    fn manylinux_compatible(&self, _major: u16, _minor: u16, _arch: Arch) -> bool {
        true
    }
}

/// Returns the compatible tags for the given [`Platform`] (e.g.,
/// `manylinux_2_17`, `macosx_11_0_arm64`, or `win_amd64`), in order from
/// most-specific to least-specific.
pub fn compatible_platform_tags(
    platform: &Platform,
    policy: &dyn ManylinuxPolicy,
) -> Result<Vec<String>, PlatformError> {
    let os = platform.os();
    let arch = platform.arch();

    let platform_tags = match *os {
        Os::Manylinux { major, minor } => manylinux_platforms((major, minor), arch, policy),
        Os::Musllinux { major, minor } => musllinux_platforms((major, minor), arch),
        Os::Macos { major, minor } => mac_platforms((major, minor), arch)?,
        Os::Windows => windows_platforms(arch)?,
        Os::Ios { major, minor, sdk } => ios_platforms((major, minor), arch, sdk),
        Os::Android { api_level } => android_platforms(api_level, arch)
            .ok_or_else(|| PlatformError::UnsupportedPlatform(os.clone(), arch))?,
    };
    Ok(platform_tags)
}

/// Enumerate `manylinux_<major>_<minor>_<arch>` from the detected glibc
/// version downward, interleaving the legacy aliases where the PEP 600
/// mapping defines them, with plain `linux_<arch>` as the lowest priority.
///
/// <https://peps.python.org/pep-0600/#legacy-manylinux-tags>
pub fn manylinux_platforms(
    glibc: (u16, u16),
    arch: Arch,
    policy: &dyn ManylinuxPolicy,
) -> Vec<String> {
    let (major, max_minor) = glibc;
    let mut platform_tags = Vec::new();
    if let Some(min_minor) = arch.get_minimum_manylinux_minor() {
        for minor in (min_minor..=max_minor).rev() {
            if !policy.manylinux_compatible(major, minor, arch) {
                continue;
            }
            platform_tags.push(format!("manylinux_{major}_{minor}_{arch}"));
            // The legacy aliases are fixed (glibc major 2) mappings
            if major == 2 {
                if minor == 17 {
                    platform_tags.push(format!("manylinux2014_{arch}"));
                }
                if minor == 12 {
                    platform_tags.push(format!("manylinux2010_{arch}"));
                }
                if minor == 5 {
                    platform_tags.push(format!("manylinux1_{arch}"));
                }
            }
        }
    }
    // Non-manylinux is lowest priority
    platform_tags.push(format!("linux_{arch}"));
    platform_tags
}

/// Enumerate `musllinux_<major>_<minor>_<arch>` downward from the detected
/// musl version, with plain `linux_<arch>` last.
pub fn musllinux_platforms(musl: (u16, u16), arch: Arch) -> Vec<String> {
    let (major, max_minor) = musl;
    let mut platform_tags = Vec::new();
    for minor in (0..=max_minor).rev() {
        platform_tags.push(format!("musllinux_{major}_{minor}_{arch}"));
    }
    platform_tags.push(format!("linux_{arch}"));
    platform_tags
}

/// Enumerate the macOS platform tags for the given OS version and
/// architecture.
///
/// Before macOS 11, yearly releases bumped the minor version and the major
/// was always 10; the walk goes from the supplied minor down to `10_0`.
/// From macOS 11 on, the major counts up and the tag minor is always `0`;
/// additionally, binaries built for 10.x (or `universal2` slices on arm64)
/// remain loadable, so the `10_16` through `10_4` range is appended.
pub fn mac_platforms(version: (u16, u16), arch: Arch) -> Result<Vec<String>, PlatformError> {
    let mut platform_tags = Vec::new();
    match version.0 {
        10 => {
            for minor in (0..=version.1).rev() {
                for binary_format in mac_binary_formats((10, minor), arch) {
                    platform_tags.push(format!("macosx_10_{minor}_{binary_format}"));
                }
            }
        }
        major if major >= 11 => {
            for major in (11..=major).rev() {
                for binary_format in mac_binary_formats((major, 0), arch) {
                    platform_tags.push(format!("macosx_{major}_0_{binary_format}"));
                }
            }
            // The "universal2" binary format can have a macOS version earlier
            // than 11.0 when the x86_64 part of the binary supports that
            // version of macOS.
            for minor in (4..=16).rev() {
                if arch == Arch::X86_64 {
                    for binary_format in mac_binary_formats((10, minor), arch) {
                        platform_tags.push(format!("macosx_10_{minor}_{binary_format}"));
                    }
                } else {
                    platform_tags.push(format!("macosx_10_{minor}_universal2"));
                }
            }
        }
        major => {
            return Err(PlatformError::UnsupportedMacOsVersion(major));
        }
    }
    Ok(platform_tags)
}

/// Determine the appropriate binary formats for a macOS version.
fn mac_binary_formats(version: (u16, u16), arch: Arch) -> Vec<String> {
    let mut formats = vec![arch.mac_name().to_string()];

    if matches!(arch, Arch::X86_64) {
        if version < (10, 4) {
            return vec![];
        }
        formats.extend([
            "intel".to_string(),
            "fat64".to_string(),
            "fat32".to_string(),
        ]);
    }

    if matches!(arch, Arch::X86_64 | Arch::Aarch64) {
        formats.push("universal2".to_string());
    }

    if matches!(arch, Arch::X86_64) {
        formats.push("universal".to_string());
    }

    formats
}

/// The Windows platform tag for the machine ABI.
pub fn windows_platforms(arch: Arch) -> Result<Vec<String>, PlatformError> {
    match arch {
        Arch::X86 => Ok(vec!["win32".to_string()]),
        Arch::X86_64 => Ok(vec!["win_amd64".to_string()]),
        Arch::Aarch64 => Ok(vec!["win_arm64".to_string()]),
        _ => Err(PlatformError::UnsupportedPlatform(Os::Windows, arch)),
    }
}

/// Enumerate the iOS platform tags per PEP 730:
/// `ios_<major>_<minor>_<arch>_<sdk>`.
///
/// Walks from the supplied version down to iOS 12.0, the oldest release
/// able to run CPython. Minor versions of earlier majors are enumerated up
/// to `.9`; candidates that never shipped don't hurt and save us a table of
/// known iOS releases.
pub fn ios_platforms(version: (u16, u16), arch: Arch, sdk: IosSdk) -> Vec<String> {
    let multiarch = match arch {
        Arch::Aarch64 => format!("arm64_{sdk}"),
        arch => format!("{arch}_{sdk}"),
    };
    let mut platform_tags = Vec::new();
    if version.0 < 12 {
        return platform_tags;
    }
    for minor in (0..=version.1).rev() {
        platform_tags.push(format!("ios_{}_{minor}_{multiarch}", version.0));
    }
    for major in (12..version.0).rev() {
        for minor in (0..=9).rev() {
            platform_tags.push(format!("ios_{major}_{minor}_{multiarch}"));
        }
    }
    platform_tags
}

/// Enumerate the Android platform tags per PEP 738:
/// `android_<apilevel>_<abi>`, from the given API level down to 16, the
/// oldest level CPython supports.
///
/// Returns `None` when the architecture has no Android ABI.
pub fn android_platforms(api_level: u16, arch: Arch) -> Option<Vec<String>> {
    const MIN_API_LEVEL: u16 = 16;
    let abi = arch.android_abi()?;
    let mut platform_tags = Vec::new();
    for level in (MIN_API_LEVEL..=api_level).rev() {
        platform_tags.push(format!("android_{level}_{abi}"));
    }
    Some(platform_tags)
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Implementation {
    CPython { gil_disabled: bool },
    PyPy,
    GraalPy,
    Pyston,
}

impl Implementation {
    /// Returns the "language implementation and version tag" for the current
    /// implementation and Python version (e.g., `cp39` or `pp37`).
    pub(crate) fn language_tag(self, python_version: (u8, u8)) -> String {
        match self {
            // Ex) `cp39`
            Self::CPython { .. } => format!("cp{}{}", python_version.0, python_version.1),
            // Ex) `pp39`
            Self::PyPy => format!("pp{}{}", python_version.0, python_version.1),
            // Ex) `graalpy310`
            Self::GraalPy => format!("graalpy{}{}", python_version.0, python_version.1),
            // Ex) `pt38`
            Self::Pyston => format!("pt{}{}", python_version.0, python_version.1),
        }
    }

    pub(crate) fn abi_tag(self, python_version: (u8, u8), implementation_version: (u8, u8)) -> String {
        match self {
            // Ex) `cp39`
            Self::CPython { gil_disabled } => {
                if python_version.1 <= 7 {
                    format!("cp{}{}m", python_version.0, python_version.1)
                } else if gil_disabled {
                    // <https://peps.python.org/pep-0703/#build-configuration-changes>
                    format!("cp{}{}t", python_version.0, python_version.1)
                } else {
                    format!("cp{}{}", python_version.0, python_version.1)
                }
            }
            // Ex) `pypy39_pp73`
            Self::PyPy => format!(
                "pypy{}{}_pp{}{}",
                python_version.0,
                python_version.1,
                implementation_version.0,
                implementation_version.1
            ),
            // Ex) `graalpy310_graalpy240_310_native`
            Self::GraalPy => format!(
                "graalpy{}{}_graalpy{}{}_{}{}_native",
                python_version.0,
                python_version.1,
                implementation_version.0,
                implementation_version.1,
                python_version.0,
                python_version.1
            ),
            // Ex) `pyston38-pyston_23`
            Self::Pyston => format!(
                "pyston{}{}-pyston_{}{}",
                python_version.0,
                python_version.1,
                implementation_version.0,
                implementation_version.1
            ),
        }
    }

    pub(crate) fn parse(name: &str, gil_disabled: bool) -> Result<Self, TagsError> {
        if gil_disabled && name != "cpython" {
            return Err(TagsError::GilIsACPythonProblem(name.to_string()));
        }
        match name {
            // Known and supported implementations.
            "cpython" => Ok(Self::CPython { gil_disabled }),
            "pypy" => Ok(Self::PyPy),
            "graalpy" => Ok(Self::GraalPy),
            "pyston" => Ok(Self::Pyston),
            // Known but unsupported implementations.
            "python" | "ironpython" | "jython" => {
                Err(TagsError::UnsupportedImplementation(name.to_string()))
            }
            // Unknown implementations.
            _ => Err(TagsError::UnknownImplementation(name.to_string())),
        }
    }
}

/// The CPython tag sequence: the exact C ABI against every platform, then
/// the stable ABI (`abi3`) for the current and all older minors down to
/// 3.2, then the ABI-less build.
pub fn cpython_tags(
    python_version: (u8, u8),
    abis: &[String],
    platforms: &[String],
) -> Vec<Tag> {
    let interpreter = format!("cp{}{}", python_version.0, python_version.1);
    // Free-threaded builds have no stable ABI
    let threaded = abis
        .iter()
        .any(|abi| abi.starts_with("cp") && abi.ends_with('t'));

    let mut tags = Vec::new();
    for abi in abis {
        if abi == "abi3" || abi == "none" {
            continue;
        }
        for platform in platforms {
            tags.push(Tag::new(&interpreter, abi, platform));
        }
    }
    if !threaded && python_version >= (3, 2) {
        for platform in platforms {
            tags.push(Tag::new(&interpreter, "abi3", platform));
        }
    }
    for platform in platforms {
        tags.push(Tag::new(&interpreter, "none", platform));
    }
    // For some reason 3.2 is the minimum python for the cp abi
    if !threaded && python_version.0 == 3 {
        for minor in (2..python_version.1).rev() {
            for platform in platforms {
                tags.push(Tag::new(format!("cp3{minor}"), "abi3", platform));
            }
        }
    }
    tags
}

/// The tag sequence of a non-CPython interpreter: its own ABI against every
/// platform, then the ABI-less build.
pub fn generic_tags(interpreter: &str, abis: &[String], platforms: &[String]) -> Vec<Tag> {
    let mut tags = Vec::new();
    for abi in abis {
        if abi == "none" {
            continue;
        }
        for platform in platforms {
            tags.push(Tag::new(interpreter, abi, platform));
        }
    }
    for platform in platforms {
        tags.push(Tag::new(interpreter, "none", platform));
    }
    tags
}

/// The interpreter-independent fallback sequence: `py<M><m>-none-<plat>`
/// for the current minor, `py<M>`, and every older minor, then
/// `<interp>-none-any`, then the same `py` range against `any`.
pub fn compatible_tags(
    python_version: (u8, u8),
    interpreter: Option<&str>,
    platforms: &[String],
) -> Vec<Tag> {
    let mut versions = Vec::with_capacity(usize::from(python_version.1) + 2);
    versions.push(format!("py{}{}", python_version.0, python_version.1));
    versions.push(format!("py{}", python_version.0));
    for minor in (0..python_version.1).rev() {
        versions.push(format!("py{}{minor}", python_version.0));
    }

    let mut tags = Vec::new();
    for version in &versions {
        for platform in platforms {
            tags.push(Tag::new(version, "none", platform));
        }
    }
    if let Some(interpreter) = interpreter {
        tags.push(Tag::new(interpreter, "none", "any"));
    }
    for version in &versions {
        tags.push(Tag::new(version, "none", "any"));
    }
    tags
}

/// Returns the complete tag sequence for an interpreter on a platform,
/// ordered most-specific-to-least-specific: the implementation-specific
/// tags, then the compatible fallbacks.
pub fn sys_tags(
    platform: &Platform,
    python_version: (u8, u8),
    implementation_name: &str,
    implementation_version: (u8, u8),
    policy: &dyn ManylinuxPolicy,
    gil_disabled: bool,
) -> Result<Vec<Tag>, TagsError> {
    let implementation = Implementation::parse(implementation_name, gil_disabled)?;
    let platform_tags = compatible_platform_tags(platform, policy)?;
    let interpreter = implementation.language_tag(python_version);

    let mut tags = Vec::with_capacity(5 * platform_tags.len());
    let abis = vec![implementation.abi_tag(python_version, implementation_version)];
    match implementation {
        Implementation::CPython { .. } => {
            tags.extend(cpython_tags(python_version, &abis, &platform_tags));
        }
        Implementation::PyPy | Implementation::GraalPy | Implementation::Pyston => {
            tags.extend(generic_tags(&interpreter, &abis, &platform_tags));
        }
    }
    tags.extend(compatible_tags(
        python_version,
        Some(interpreter.as_str()),
        &platform_tags,
    ));
    Ok(tags)
}

#[derive(Debug, Eq, Ord, PartialEq, PartialOrd, Clone)]
pub enum IncompatibleTag {
    Invalid,
    Python,
    Abi,
    Platform,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TagCompatibility {
    Incompatible(IncompatibleTag),
    Compatible(TagPriority),
}

impl Ord for TagCompatibility {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (self, other) {
            (Self::Compatible(p_self), Self::Compatible(p_other)) => p_self.cmp(p_other),
            (Self::Incompatible(_), Self::Compatible(_)) => cmp::Ordering::Less,
            (Self::Compatible(_), Self::Incompatible(_)) => cmp::Ordering::Greater,
            (Self::Incompatible(t_self), Self::Incompatible(t_other)) => t_self.cmp(t_other),
        }
    }
}

impl PartialOrd for TagCompatibility {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(Self::cmp(self, other))
    }
}

impl TagCompatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible(_))
    }
}

/// A set of compatible tags for a given Python version and platform, ranked
/// by specificity.
///
/// Its principal function is to determine whether the tags for a particular
/// wheel are compatible with the current environment, and how well.
#[derive(Debug, Clone)]
pub struct Tags {
    /// `python_tag` |--> `abi_tag` |--> `platform_tag` |--> priority
    #[allow(clippy::type_complexity)]
    map: Arc<FxHashMap<String, FxHashMap<String, FxHashMap<String, TagPriority>>>>,
}

impl Tags {
    /// Create a new set of tags.
    ///
    /// Tags are prioritized based on their position in the given vector:
    /// tags that appear earlier are given higher priority than tags that
    /// appear later.
    pub fn new(tags: Vec<Tag>) -> Self {
        let mut map = FxHashMap::default();
        for (index, tag) in tags.into_iter().rev().enumerate() {
            map.entry(tag.interpreter)
                .or_insert(FxHashMap::default())
                .entry(tag.abi)
                .or_insert(FxHashMap::default())
                .entry(tag.platform)
                .or_insert(TagPriority::try_from(index).expect("valid tag priority"));
        }
        Self { map: Arc::new(map) }
    }

    /// Returns the compatible tags for the given Python implementation
    /// (e.g., `cpython`), version, and platform, ranked by specificity.
    pub fn from_env(
        platform: &Platform,
        python_version: (u8, u8),
        implementation_name: &str,
        implementation_version: (u8, u8),
        policy: &dyn ManylinuxPolicy,
        gil_disabled: bool,
    ) -> Result<Self, TagsError> {
        let tags = sys_tags(
            platform,
            python_version,
            implementation_name,
            implementation_version,
            policy,
            gil_disabled,
        )?;
        Ok(Self::new(tags))
    }

    /// Returns true when there exists at least one tag for this platform
    /// whose individual components all appear in each of the slices given.
    ///
    /// Like [`Tags::compatibility`], but short-circuits as soon as a
    /// compatible tag is found.
    pub fn is_compatible(
        &self,
        wheel_python_tags: &[String],
        wheel_abi_tags: &[String],
        wheel_platform_tags: &[String],
    ) -> bool {
        // NOTE: A typical work-load is a context in which the platform tags
        // are quite large, but the tags of a wheel are quite small. It is
        // common, for example, for the lengths of the slices given to all be
        // 1. So while the looping here might look slow, the key thing we want
        // to avoid is looping over all of the platform tags. We avoid that
        // with hashmap lookups.
        for wheel_py in wheel_python_tags {
            let Some(abis) = self.map.get(wheel_py) else {
                continue;
            };
            for wheel_abi in wheel_abi_tags {
                let Some(platforms) = abis.get(wheel_abi) else {
                    continue;
                };
                for wheel_platform in wheel_platform_tags {
                    if platforms.contains_key(wheel_platform) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Returns the [`TagCompatibility`] of the given wheel tag components.
    ///
    /// If compatible, includes the score of the most-compatible platform
    /// tag. If incompatible, includes the tag part which was the closest
    /// match.
    pub fn compatibility(
        &self,
        wheel_python_tags: &[String],
        wheel_abi_tags: &[String],
        wheel_platform_tags: &[String],
    ) -> TagCompatibility {
        let mut max_compatibility = TagCompatibility::Incompatible(IncompatibleTag::Invalid);

        for wheel_py in wheel_python_tags {
            let Some(abis) = self.map.get(wheel_py) else {
                max_compatibility =
                    max_compatibility.max(TagCompatibility::Incompatible(IncompatibleTag::Python));
                continue;
            };
            for wheel_abi in wheel_abi_tags {
                let Some(platforms) = abis.get(wheel_abi) else {
                    max_compatibility =
                        max_compatibility.max(TagCompatibility::Incompatible(IncompatibleTag::Abi));
                    continue;
                };
                for wheel_platform in wheel_platform_tags {
                    let priority = platforms.get(wheel_platform).copied();
                    if let Some(priority) = priority {
                        max_compatibility =
                            max_compatibility.max(TagCompatibility::Compatible(priority));
                    } else {
                        max_compatibility = max_compatibility
                            .max(TagCompatibility::Incompatible(IncompatibleTag::Platform));
                    }
                }
            }
        }
        max_compatibility
    }
}

impl fmt::Display for Tags {
    /// Display tags from high to low priority
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut tags = BTreeSet::new();
        for (python_tag, abi_tags) in self.map.iter() {
            for (abi_tag, platform_tags) in abi_tags {
                for (platform_tag, priority) in platform_tags {
                    tags.insert((priority, format!("{python_tag}-{abi_tag}-{platform_tag}")));
                }
            }
        }
        for (_, tag) in tags.iter().rev() {
            writeln!(f, "{tag}")?;
        }
        Ok(())
    }
}

/// The priority of a platform tag.
///
/// A wrapper around [`NonZeroU32`]. Higher values indicate higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TagPriority(NonZeroU32);

impl TryFrom<usize> for TagPriority {
    type Error = TagsError;

    /// Create a [`TagPriority`] from a `usize`, where higher `usize` values
    /// are given higher priority.
    fn try_from(priority: usize) -> Result<Self, TagsError> {
        match u32::try_from(priority).and_then(|priority| NonZeroU32::try_from(1 + priority)) {
            Ok(priority) => Ok(Self(priority)),
            Err(err) => Err(TagsError::InvalidPriority(priority, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::*;

    #[test]
    fn tag_fields_are_lowercased() {
        let tag = Tag::new("CP39", "None", "ANY");
        assert_eq!(tag.to_string(), "cp39-none-any");
    }

    #[test]
    fn parse_compressed_tag_set() {
        let tags = parse_tag("py2.py3-none-any").unwrap();
        assert_eq!(
            tags,
            BTreeSet::from([Tag::new("py2", "none", "any"), Tag::new("py3", "none", "any")])
        );

        let tags = parse_tag("cp39-cp39-manylinux_2_17_x86_64.manylinux2014_x86_64").unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn parse_tag_round_trips_a_plain_triple() {
        let tag = Tag::new("cp39", "abi3", "macosx_11_0_arm64");
        let parsed = parse_tag(&tag.to_string()).unwrap();
        assert_eq!(parsed, BTreeSet::from([tag]));
    }

    #[test]
    fn parse_tag_rejects_wrong_shape() {
        assert!(parse_tag("py3-none").is_err());
        assert!(parse_tag("py3-none-any-more").is_err());
    }

    /// Check platform tag ordering. The list is in decreasing priority.
    ///
    /// A reference list can be generated with:
    /// ```text
    /// $ python -c "from packaging import tags; [print(tag) for tag in tags.platform_tags()]"
    /// ```
    #[test]
    fn platform_tags_manylinux() {
        let tags = compatible_platform_tags(
            &Platform::new(
                Os::Manylinux {
                    major: 2,
                    minor: 20,
                },
                Arch::X86_64,
            ),
            &Permissive,
        )
        .unwrap();
        assert_debug_snapshot!(
            tags,
            @r###"
        [
            "manylinux_2_20_x86_64",
            "manylinux_2_19_x86_64",
            "manylinux_2_18_x86_64",
            "manylinux_2_17_x86_64",
            "manylinux2014_x86_64",
            "manylinux_2_16_x86_64",
            "manylinux_2_15_x86_64",
            "manylinux_2_14_x86_64",
            "manylinux_2_13_x86_64",
            "manylinux_2_12_x86_64",
            "manylinux2010_x86_64",
            "manylinux_2_11_x86_64",
            "manylinux_2_10_x86_64",
            "manylinux_2_9_x86_64",
            "manylinux_2_8_x86_64",
            "manylinux_2_7_x86_64",
            "manylinux_2_6_x86_64",
            "manylinux_2_5_x86_64",
            "manylinux1_x86_64",
            "linux_x86_64",
        ]
        "###
        );
    }

    #[test]
    fn manylinux_policy_vetoes_tags() {
        struct UpTo2014;
        impl ManylinuxPolicy for UpTo2014 {
            fn manylinux_compatible(&self, major: u16, minor: u16, _arch: Arch) -> bool {
                (major, minor) <= (2, 17)
            }
        }
        let tags = manylinux_platforms((2, 20), Arch::X86_64, &UpTo2014);
        assert_eq!(tags[0], "manylinux_2_17_x86_64");
        assert_eq!(tags[1], "manylinux2014_x86_64");
        assert!(!tags.iter().any(|tag| tag == "manylinux_2_18_x86_64"));
        assert_eq!(tags.last().unwrap(), "linux_x86_64");
    }

    #[test]
    fn platform_tags_musllinux() {
        let tags = musllinux_platforms((1, 2), Arch::X86_64);
        assert_eq!(
            tags,
            [
                "musllinux_1_2_x86_64",
                "musllinux_1_1_x86_64",
                "musllinux_1_0_x86_64",
                "linux_x86_64",
            ]
        );
    }

    #[test]
    fn platform_tags_macos_intel() {
        let tags = mac_platforms((10, 6), Arch::X86_64).unwrap();
        assert_eq!(
            &tags[..6],
            [
                "macosx_10_6_x86_64",
                "macosx_10_6_intel",
                "macosx_10_6_fat64",
                "macosx_10_6_fat32",
                "macosx_10_6_universal2",
                "macosx_10_6_universal",
            ]
        );
        // Down to 10_4 for x86_64 (no binary format predates it)
        assert_eq!(tags.last().unwrap(), "macosx_10_4_universal");
    }

    #[test]
    fn platform_tags_macos_apple_silicon() {
        let tags = mac_platforms((12, 3), Arch::Aarch64).unwrap();
        assert_eq!(
            &tags[..4],
            [
                "macosx_12_0_arm64",
                "macosx_12_0_universal2",
                "macosx_11_0_arm64",
                "macosx_11_0_universal2",
            ]
        );
        // The universal2 slice may target a 10.x deployment
        assert_eq!(tags[4], "macosx_10_16_universal2");
        assert_eq!(tags.last().unwrap(), "macosx_10_4_universal2");
    }

    #[test]
    fn platform_tags_macos_too_old() {
        assert!(mac_platforms((9, 6), Arch::X86_64).is_err());
    }

    #[test]
    fn platform_tags_windows() {
        assert_eq!(windows_platforms(Arch::X86).unwrap(), ["win32"]);
        assert_eq!(windows_platforms(Arch::X86_64).unwrap(), ["win_amd64"]);
        assert_eq!(windows_platforms(Arch::Aarch64).unwrap(), ["win_arm64"]);
        assert!(windows_platforms(Arch::S390X).is_err());
    }

    #[test]
    fn platform_tags_ios() {
        let tags = ios_platforms((13, 2), Arch::Aarch64, IosSdk::Iphoneos);
        assert_eq!(
            &tags[..4],
            [
                "ios_13_2_arm64_iphoneos",
                "ios_13_1_arm64_iphoneos",
                "ios_13_0_arm64_iphoneos",
                "ios_12_9_arm64_iphoneos",
            ]
        );
        assert_eq!(tags.last().unwrap(), "ios_12_0_arm64_iphoneos");
        // Nothing can run on iOS older than 12
        assert!(ios_platforms((11, 4), Arch::Aarch64, IosSdk::Iphoneos).is_empty());

        let simulator = ios_platforms((12, 0), Arch::X86_64, IosSdk::Iphonesimulator);
        assert_eq!(simulator, ["ios_12_0_x86_64_iphonesimulator"]);
    }

    #[test]
    fn platform_tags_android() {
        let tags = android_platforms(18, Arch::Aarch64).unwrap();
        assert_eq!(
            tags,
            [
                "android_18_arm64_v8a",
                "android_17_arm64_v8a",
                "android_16_arm64_v8a",
            ]
        );
        assert!(android_platforms(21, Arch::S390X).is_none());
    }

    #[test]
    fn cpython_tag_order() {
        let platforms = vec!["win_amd64".to_string()];
        let abis = vec!["cp39".to_string()];
        let tags = cpython_tags((3, 9), &abis, &platforms);
        let rendered: Vec<String> = tags.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "cp39-cp39-win_amd64",
                "cp39-abi3-win_amd64",
                "cp39-none-win_amd64",
                "cp38-abi3-win_amd64",
                "cp37-abi3-win_amd64",
                "cp36-abi3-win_amd64",
                "cp35-abi3-win_amd64",
                "cp34-abi3-win_amd64",
                "cp33-abi3-win_amd64",
                "cp32-abi3-win_amd64",
            ]
        );
    }

    #[test]
    fn cpython_freethreaded_has_no_stable_abi() {
        let platforms = vec!["win_amd64".to_string()];
        let abis = vec!["cp313t".to_string()];
        let tags = cpython_tags((3, 13), &abis, &platforms);
        assert!(!tags.iter().any(|tag| tag.abi() == "abi3"));
    }

    #[test]
    fn compatible_tag_order() {
        let platforms = vec!["win_amd64".to_string()];
        let tags = compatible_tags((3, 2), Some("cp32"), &platforms);
        let rendered: Vec<String> = tags.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "py32-none-win_amd64",
                "py3-none-win_amd64",
                "py31-none-win_amd64",
                "py30-none-win_amd64",
                "cp32-none-any",
                "py32-none-any",
                "py3-none-any",
                "py31-none-any",
                "py30-none-any",
            ]
        );
    }

    #[test]
    fn sys_tags_compose_most_to_least_specific() {
        let platform = Platform::new(
            Os::Manylinux {
                major: 2,
                minor: 17,
            },
            Arch::X86_64,
        );
        let tags = sys_tags(&platform, (3, 9), "cpython", (3, 9), &Permissive, false).unwrap();
        assert_eq!(
            tags.first().unwrap().to_string(),
            "cp39-cp39-manylinux_2_17_x86_64"
        );
        assert_eq!(tags.last().unwrap().to_string(), "py30-none-any");
        // The wheel-less fallbacks come after every binary tag
        let abi3_position = tags
            .iter()
            .position(|tag| tag.abi() == "abi3")
            .unwrap();
        let py3_any_position = tags
            .iter()
            .position(|tag| tag.interpreter() == "py3" && tag.platform() == "any")
            .unwrap();
        assert!(abi3_position < py3_any_position);
    }

    #[test]
    fn ranked_tags_compatibility() {
        let platform = Platform::new(
            Os::Manylinux {
                major: 2,
                minor: 17,
            },
            Arch::X86_64,
        );
        let tags =
            Tags::from_env(&platform, (3, 9), "cpython", (3, 9), &Permissive, false).unwrap();

        let exact = tags.compatibility(
            &["cp39".to_string()],
            &["cp39".to_string()],
            &["manylinux_2_17_x86_64".to_string()],
        );
        let fallback = tags.compatibility(
            &["py3".to_string()],
            &["none".to_string()],
            &["any".to_string()],
        );
        assert!(exact.is_compatible());
        assert!(fallback.is_compatible());
        assert!(exact > fallback);

        assert!(tags.is_compatible(
            &["py2".to_string(), "py3".to_string()],
            &["none".to_string()],
            &["any".to_string()],
        ));
        assert!(!tags.is_compatible(
            &["cp39".to_string()],
            &["cp39".to_string()],
            &["win_amd64".to_string()],
        ));
        assert_eq!(
            tags.compatibility(
                &["cp39".to_string()],
                &["cp39".to_string()],
                &["win_amd64".to_string()],
            ),
            TagCompatibility::Incompatible(IncompatibleTag::Platform)
        );
    }

    #[test]
    fn unknown_implementations() {
        let platform = Platform::new(Os::Windows, Arch::X86_64);
        assert!(matches!(
            sys_tags(&platform, (3, 9), "jython", (2, 7), &Permissive, false),
            Err(TagsError::UnsupportedImplementation(_))
        ));
        assert!(matches!(
            sys_tags(&platform, (3, 9), "riverpython", (3, 9), &Permissive, false),
            Err(TagsError::UnknownImplementation(_))
        ));
        assert!(matches!(
            sys_tags(&platform, (3, 13), "pypy", (7, 3), &Permissive, true),
            Err(TagsError::GilIsACPythonProblem(_))
        ));
    }
}
