//! The already-probed platform a tag set is computed for.
//!
//! This crate owns the tag *grammar*; figuring out what the current machine
//! is (reading `sysconfig`, inspecting the dynamic loader, parsing an ELF
//! header, querying the macOS or iOS SDK) is the platform probe's concern,
//! and its output is a [`Platform`] value.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Unsupported operating system and architecture combination: {0} {1}")]
    UnsupportedPlatform(Os, Arch),
    #[error("Unsupported macOS version: {0}")]
    UnsupportedMacOsVersion(u16),
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Platform {
    os: Os,
    arch: Arch,
}

impl Platform {
    /// Create a new platform from the given operating system and architecture.
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Return the platform's operating system.
    pub fn os(&self) -> &Os {
        &self.os
    }

    /// Return the platform's architecture.
    pub fn arch(&self) -> Arch {
        self.arch
    }
}

/// All supported operating systems, each carrying the version data its tag
/// grammar needs.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Os {
    /// A glibc Linux, tagged by the glibc version the probe detected.
    Manylinux { major: u16, minor: u16 },
    /// A musl Linux, tagged by the musl version the probe detected.
    Musllinux { major: u16, minor: u16 },
    Windows,
    Macos { major: u16, minor: u16 },
    /// iOS, per PEP 730. `sdk` is `iphoneos` or `iphonesimulator`.
    Ios { major: u16, minor: u16, sdk: IosSdk },
    /// Android, per PEP 738, tagged by API level.
    Android { api_level: u16 },
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Manylinux { .. } => write!(f, "Manylinux"),
            Self::Musllinux { .. } => write!(f, "Musllinux"),
            Self::Windows => write!(f, "Windows"),
            Self::Macos { .. } => write!(f, "MacOS"),
            Self::Ios { .. } => write!(f, "iOS"),
            Self::Android { .. } => write!(f, "Android"),
        }
    }
}

/// The iOS SDK a binary was built against, the last component of the PEP 730
/// multiarch.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IosSdk {
    Iphoneos,
    Iphonesimulator,
}

impl fmt::Display for IosSdk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Iphoneos => write!(f, "iphoneos"),
            Self::Iphonesimulator => write!(f, "iphonesimulator"),
        }
    }
}

/// All supported CPU architectures
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[serde(alias = "arm64")]
    Aarch64,
    Armv6L,
    Armv7L,
    #[serde(alias = "ppc64le")]
    Powerpc64Le,
    #[serde(alias = "ppc64")]
    Powerpc64,
    #[serde(alias = "i386", alias = "i686")]
    X86,
    #[serde(alias = "amd64")]
    X86_64,
    S390X,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Aarch64 => write!(f, "aarch64"),
            Self::Armv6L => write!(f, "armv6l"),
            Self::Armv7L => write!(f, "armv7l"),
            Self::Powerpc64Le => write!(f, "ppc64le"),
            Self::Powerpc64 => write!(f, "ppc64"),
            Self::X86 => write!(f, "i686"),
            Self::X86_64 => write!(f, "x86_64"),
            Self::S390X => write!(f, "s390x"),
        }
    }
}

impl Arch {
    /// Returns the oldest possible `manylinux` minor tag for this
    /// architecture, if it supports `manylinux`.
    pub fn get_minimum_manylinux_minor(self) -> Option<u16> {
        match self {
            // manylinux 2014
            Self::Aarch64 | Self::Armv7L | Self::Powerpc64 | Self::Powerpc64Le | Self::S390X => {
                Some(17)
            }
            // manylinux 1
            Self::X86 | Self::X86_64 => Some(5),
            // unsupported
            Self::Armv6L => None,
        }
    }

    /// The macOS spelling of this architecture.
    pub(crate) fn mac_name(self) -> &'static str {
        match self {
            Self::Aarch64 => "arm64",
            Self::Armv6L => "armv6l",
            Self::Armv7L => "armv7l",
            Self::Powerpc64Le => "ppc64le",
            Self::Powerpc64 => "ppc64",
            Self::X86 => "i686",
            Self::X86_64 => "x86_64",
            Self::S390X => "s390x",
        }
    }

    /// The Android ABI spelling of this architecture, per PEP 738.
    pub(crate) fn android_abi(self) -> Option<&'static str> {
        match self {
            Self::Aarch64 => Some("arm64_v8a"),
            Self::Armv7L => Some("armeabi_v7a"),
            Self::X86 => Some("x86"),
            Self::X86_64 => Some("x86_64"),
            _ => None,
        }
    }
}
