//! Type definitions and enums.

use std::fmt;

use sha2::{Digest, Sha256};

/// Binary version of a component: `major.minor.micro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    /// Breaking changes.
    pub major: u32,
    /// Backwards-compatible additions.
    pub minor: u32,
    /// Fixes.
    pub micro: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    /// Check if a native binary of this version can serve bindings written
    /// against `binding`.
    ///
    /// Majors must match and the native minor must be at least the binding's.
    pub fn is_compatible_with(&self, binding: &Version) -> bool {
        self.major == binding.major && self.minor >= binding.minor
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Stable 64-bit identifier of a type.
///
/// Derived from the fully-qualified type name (`"Zoo::Tiger"`): the first
/// eight bytes of its SHA-256 digest, read big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(u64);

impl TypeTag {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Compute the tag of a fully-qualified type name.
    pub fn from_qualified_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// A prime and how often it divides the factorized value.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrimeFactor {
    pub prime: u64,
    pub multiplicity: u32,
}

/// Animal species known to the zoo component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Species {
    Giraffe = 0,
    Tiger = 1,
    Snake = 2,
    Turtle = 3,
    /// Has no dedicated wrapper type; resolves to `Animal` on the host.
    Axolotl = 4,
}

impl From<Species> for u32 {
    fn from(species: Species) -> u32 {
        species as u32
    }
}

impl TryFrom<u32> for Species {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, u32> {
        match value {
            0 => Ok(Species::Giraffe),
            1 => Ok(Species::Tiger),
            2 => Ok(Species::Snake),
            3 => Ok(Species::Turtle),
            4 => Ok(Species::Axolotl),
            other => Err(other),
        }
    }
}

/// Options for loading a component.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Reject native binaries whose version is incompatible with the bindings.
    pub verify_version: bool,
    /// How many times a variable-length fetch is restarted when the
    /// required size grows between the size query and the fill.
    pub fetch_attempts: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            verify_version: true,
            fetch_attempts: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let binding = Version::new(1, 1, 0);
        assert!(Version::new(1, 1, 0).is_compatible_with(&binding));
        assert!(Version::new(1, 3, 7).is_compatible_with(&binding));
        assert!(!Version::new(1, 0, 9).is_compatible_with(&binding));
        assert!(!Version::new(2, 1, 0).is_compatible_with(&binding));
        assert_eq!(binding.to_string(), "1.1.0");
    }

    #[test]
    fn test_type_tag_from_name() {
        assert_eq!(
            TypeTag::from_qualified_name("Zoo::Tiger"),
            TypeTag::new(0x6A71_D9E1_F3AF_A2F4)
        );
        assert_ne!(
            TypeTag::from_qualified_name("Zoo::Tiger"),
            TypeTag::from_qualified_name("Zoo::Animal")
        );
        assert_eq!(TypeTag::new(0xAB).to_string(), "0x00000000000000AB");
    }

    #[test]
    fn test_species_roundtrip() {
        for species in [
            Species::Giraffe,
            Species::Tiger,
            Species::Snake,
            Species::Turtle,
            Species::Axolotl,
        ] {
            assert_eq!(Species::try_from(u32::from(species)), Ok(species));
        }
        assert_eq!(Species::try_from(99), Err(99));
    }

    #[test]
    fn test_load_options_default() {
        let opts = LoadOptions::default();
        assert!(opts.verify_version);
        assert!(opts.fetch_attempts > 1);
    }
}
