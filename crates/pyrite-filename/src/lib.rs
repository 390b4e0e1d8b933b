//! Parsing and construction of the distribution filename conventions:
//! wheels (`<name>-<version>[-<build>]-<interp>-<abi>-<plat>.whl`, per
//! [PEP 427](https://peps.python.org/pep-0427/)) and source distributions
//! (`<name>-<version>.{tar.gz,zip}`).

pub use build_tag::{BuildTag, BuildTagError};
pub use source_dist::{SourceDistExtension, SourceDistFilename, SourceDistFilenameError};
pub use wheel::{WheelFilename, WheelFilenameError};

mod build_tag;
mod source_dist;
mod wheel;
