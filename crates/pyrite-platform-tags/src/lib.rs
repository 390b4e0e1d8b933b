//! Wheel tags and the platform tag grammar, implementing the relevant parts
//! of [PEP 425](https://peps.python.org/pep-0425/) (compatibility tags),
//! [PEP 600](https://peps.python.org/pep-0600/) (manylinux),
//! [PEP 656](https://peps.python.org/pep-0656/) (musllinux),
//! [PEP 730](https://peps.python.org/pep-0730/) (iOS) and
//! [PEP 738](https://peps.python.org/pep-0738/) (Android).
//!
//! The crate owns the tag *grammar* and the *enumeration order* of
//! compatible tags; probing the running system is a collaborator's job,
//! feeding a [`Platform`] value (and optionally a [`ManylinuxPolicy`] veto
//! hook) into the enumerators here.

pub use platform::{Arch, IosSdk, Os, Platform, PlatformError};
pub use tags::{
    android_platforms, compatible_platform_tags, compatible_tags, cpython_tags, generic_tags,
    ios_platforms, mac_platforms, manylinux_platforms, musllinux_platforms, parse_tag, sys_tags,
    windows_platforms, IncompatibleTag, ManylinuxPolicy, ParseTagError, Permissive, Tag,
    TagCompatibility, TagPriority, Tags, TagsError,
};

mod platform;
mod tags;
