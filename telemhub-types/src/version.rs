//! Wire schema version carried by every snapshot.

use core::fmt;

use crate::SCHEMA_VERSION;

/// `major.minor` of the snapshot layout.
///
/// Readers accept any minor revision of the major they were built for;
/// adding a field bumps `minor`, renaming or removing one bumps `major`.
///
/// ```rust
/// use telemhub_types::SchemaVersion;
///
/// let seen = SchemaVersion::new(1, 3);
/// assert!(seen.is_compatible());
/// assert_eq!(seen.to_string(), "1.3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct SchemaVersion {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub major: u32,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Version written by this build.
    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, 0)
    }

    /// Whether this build can read a snapshot stamped with `self`.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::current().major
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
