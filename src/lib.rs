//! Runtime for handle-based bindings over a versioned C ABI.
//!
//! Native objects are reached through opaque handles. This crate implements
//! the contract every binding shares:
//!
//! - reference-counted handle lifetimes with release on drop ([`Instance`]);
//! - run-time type identification of returned handles and a polymorphic
//!   factory that builds the matching wrapper ([`dispatch`]);
//! - the two-call protocol for variable-length outputs ([`buffer`]);
//! - a status code plus last-error channel on every call ([`Error`]);
//! - name-based symbol lookup and registration ([`SymbolLookup`]).
//!
//! Three reference components live in [`native`]. Their bindings, [`zoo`],
//! [`calculator`] and [`primes`], reach them only through function pointers
//! looked up by name.
//!
//! # Example
//!
//! ```no_run
//! use cabi::{CalculatorLibrary, ZooLibrary};
//!
//! fn main() -> cabi::Result<()> {
//!     let zoo = ZooLibrary::load()?.create_zoo()?;
//!     for animal in zoo.iter()? {
//!         println!("{}", animal?.name()?);
//!     }
//!
//!     let library = CalculatorLibrary::load()?;
//!     let calculator = library.create_calculator()?;
//!     let two = library.create_variable(2.0)?;
//!     let three = library.create_variable(3.0)?;
//!     calculator.enlist_variable(&two)?;
//!     calculator.enlist_variable(&three)?;
//!     println!("2 * 3 = {}", calculator.multiply()?.value()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! Every boundary call returns a status code. On failure the bindings fetch
//! the message recorded for the object (or for the calling thread, when the
//! call had no object) and return it in [`Error::Native`].

pub mod buffer;
pub mod calculator;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod instance;
pub mod native;
pub mod primes;
pub mod symbols;
pub mod types;
pub mod zoo;

// Re-export main types at the crate root
pub use calculator::CalculatorLibrary;
pub use dispatch::{cast, classify, resolve, Class, Component, Object, RawHandle, Resolved};
pub use error::{Error, Result};
pub use ffi::{FatHandle, Handle};
pub use instance::{Borrowed, Instance};
pub use primes::PrimesLibrary;
pub use symbols::SymbolLookup;
pub use types::{LoadOptions, PrimeFactor, Species, TypeTag, Version};
pub use zoo::ZooLibrary;

/// Version constants of these bindings.
pub mod version {
    use crate::types::Version;

    /// Zoo binary version the bindings were written against.
    pub const ZOO: Version = crate::zoo::BINDING_VERSION;
    /// Calculator binary version the bindings were written against.
    pub const CALCULATOR: Version = crate::calculator::BINDING_VERSION;
    /// Primes binary version the bindings were written against.
    pub const PRIMES: Version = crate::primes::BINDING_VERSION;

    /// Version of this crate.
    pub const CRATE: &str = env!("CARGO_PKG_VERSION");
}

/// Check if a native binary of version `native` can serve bindings written
/// against `binding`.
pub fn binary_version_compatible(native: Version, binding: Version) -> bool {
    native.is_compatible_with(&binding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_versions() {
        assert_eq!(version::ZOO.to_string(), "1.0.0");
        assert_eq!(version::CALCULATOR.to_string(), "1.1.0");
        assert_eq!(version::PRIMES.to_string(), "1.2.0");
        assert_eq!(version::CRATE, "0.1.0");
    }

    #[test]
    fn test_wrappers_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<Instance<ZooLibrary>>();
        assert_send_sync::<zoo::Tiger>();
        assert_send_sync::<zoo::AnimalIterator>();
        assert_send_sync::<calculator::Calculator>();
        assert_send_sync::<primes::SieveCalculator>();
        assert_send_sync::<Borrowed<'static, zoo::Animal>>();
    }

    #[test]
    fn test_binary_version_compatible() {
        assert!(binary_version_compatible(Version::new(1, 0, 0), version::ZOO));
        assert!(binary_version_compatible(Version::new(1, 4, 2), version::CALCULATOR));
        assert!(!binary_version_compatible(Version::new(1, 0, 0), version::CALCULATOR));
        assert!(!binary_version_compatible(Version::new(2, 2, 0), version::PRIMES));
    }
}
