//! Bindings for the primes component.
//!
//! # Example
//!
//! ```no_run
//! use cabi::primes::PrimesLibrary;
//!
//! let library = PrimesLibrary::load()?;
//! let calculator = library.create_factorization_calculator()?;
//! calculator.set_value(360)?;
//! calculator.calculate()?;
//! for factor in calculator.prime_factors()? {
//!     println!("{}^{}", factor.prime, factor.multiplicity);
//! }
//! # Ok::<(), cabi::Error>(())
//! ```

use std::fmt;
use std::sync::Arc;

use crate::buffer::fetch_array;
use crate::dispatch::{self, declare_class, Class, Component, Object};
use crate::error::Result;
use crate::ffi::{BaseTable, GetSymbolLookupMethodFn, Handle, ProgressCallback, StatusCode};
use crate::instance::Instance;
use crate::symbols::SymbolLookup;
use crate::types::{LoadOptions, PrimeFactor, TypeTag, Version};

/// Version of the primes binary these bindings were written against.
pub const BINDING_VERSION: Version = Version::new(1, 2, 0);

/// Type tags of the primes classes.
pub mod tags {
    use crate::types::TypeTag;

    pub const BASE: TypeTag = TypeTag::new(0x01F3_6F43_FA0B_7BBF);
    pub const CALCULATOR: TypeTag = TypeTag::new(0xF0D1_4A0F_7122_C2CF);
    pub const FACTORIZATION_CALCULATOR: TypeTag = TypeTag::new(0x7235_4871_AC95_1A33);
    pub const SIEVE_CALCULATOR: TypeTag = TypeTag::new(0x7B3A_ACB9_1B9C_0812);
}

type CreateFn = unsafe extern "C" fn(*mut Handle) -> StatusCode;

/// The loaded primes component.
pub struct PrimesLibrary {
    base: BaseTable,
    create_factorization_calculator: CreateFn,
    create_sieve_calculator: CreateFn,
    get_value: unsafe extern "C" fn(Handle, *mut u64) -> StatusCode,
    set_value: unsafe extern "C" fn(Handle, u64) -> StatusCode,
    calculate: unsafe extern "C" fn(Handle) -> StatusCode,
    set_progress_callback: unsafe extern "C" fn(Handle, ProgressCallback) -> StatusCode,
    prime_factors: unsafe extern "C" fn(Handle, u64, *mut u64, *mut PrimeFactor) -> StatusCode,
    primes: unsafe extern "C" fn(Handle, u64, *mut u64, *mut u64) -> StatusCode,
}

impl PrimesLibrary {
    /// Load the in-process primes component with default options.
    pub fn load() -> Result<Arc<Self>> {
        Self::load_with(LoadOptions::default())
    }

    /// Load the in-process primes component.
    pub fn load_with(options: LoadOptions) -> Result<Arc<Self>> {
        unsafe {
            Self::load_from_entry_point(crate::native::primes::primes_getsymbollookupmethod, options)
        }
    }

    /// Load a primes component through its entry point.
    ///
    /// # Safety
    ///
    /// `entry` must be a primes `getsymbollookupmethod` whose symbols have
    /// the signatures these bindings expect.
    pub unsafe fn load_from_entry_point(
        entry: GetSymbolLookupMethodFn,
        options: LoadOptions,
    ) -> Result<Arc<Self>> {
        let symbols = SymbolLookup::from_entry_point(entry)?;
        let ns = Self::NAMESPACE;
        let base = BaseTable::load(symbols, ns, "Primes", BINDING_VERSION, options)?;
        Ok(Arc::new(Self {
            base,
            create_factorization_calculator: symbols
                .resolve_fn(ns, "createfactorizationcalculator")?,
            create_sieve_calculator: symbols.resolve_fn(ns, "createsievecalculator")?,
            get_value: symbols.resolve_fn(ns, "calculator_getvalue")?,
            set_value: symbols.resolve_fn(ns, "calculator_setvalue")?,
            calculate: symbols.resolve_fn(ns, "calculator_calculate")?,
            set_progress_callback: symbols.resolve_fn(ns, "calculator_setprogresscallback")?,
            prime_factors: symbols.resolve_fn(ns, "factorizationcalculator_getprimefactors")?,
            primes: symbols.resolve_fn(ns, "sievecalculator_getprimes")?,
        }))
    }

    /// Version of the native binary.
    pub fn version(&self) -> Result<Version> {
        self.base.version()
    }

    /// Last error of a failed call that had no object, on this thread.
    pub fn last_error(&self) -> Result<Option<String>> {
        crate::ffi::fetch_last_error(&self.base, Handle::null())
    }

    pub fn create_factorization_calculator(self: &Arc<Self>) -> Result<FactorizationCalculator> {
        self.create(self.create_factorization_calculator)
    }

    pub fn create_sieve_calculator(self: &Arc<Self>) -> Result<SieveCalculator> {
        self.create(self.create_sieve_calculator)
    }

    fn create<T: Class<Component = Self>>(self: &Arc<Self>, call: CreateFn) -> Result<T> {
        let mut calculator = Handle::null();
        let status = unsafe { call(&mut calculator) };
        crate::ffi::check_status(&self.base, Handle::null(), status)?;
        unsafe { dispatch::resolve(self, calculator) }
    }
}

impl fmt::Debug for PrimesLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimesLibrary")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Concrete primes wrappers.
#[derive(Debug)]
pub enum PrimesObject {
    FactorizationCalculator(FactorizationCalculator),
    SieveCalculator(SieveCalculator),
}

impl Object for PrimesObject {
    type Component = PrimesLibrary;

    fn type_tag(&self) -> TypeTag {
        match self {
            PrimesObject::FactorizationCalculator(_) => tags::FACTORIZATION_CALCULATOR,
            PrimesObject::SieveCalculator(_) => tags::SIEVE_CALCULATOR,
        }
    }

    fn into_instance(self) -> Instance<PrimesLibrary> {
        match self {
            PrimesObject::FactorizationCalculator(inner) => inner.into_instance(),
            PrimesObject::SieveCalculator(inner) => inner.into_instance(),
        }
    }
}

impl Component for PrimesLibrary {
    type Object = PrimesObject;

    const NAMESPACE: &'static str = "primes";

    fn base(&self) -> &BaseTable {
        &self.base
    }

    fn dispatch(
        tag: TypeTag,
        instance: Instance<Self>,
    ) -> std::result::Result<PrimesObject, Instance<Self>> {
        Ok(match tag {
            tags::FACTORIZATION_CALCULATOR => PrimesObject::FactorizationCalculator(
                FactorizationCalculator::from_instance(instance),
            ),
            tags::SIEVE_CALCULATOR => {
                PrimesObject::SieveCalculator(SieveCalculator::from_instance(instance))
            }
            _ => return Err(instance),
        })
    }
}

declare_class! {
    Base: root in PrimesLibrary => PrimesObject, "Primes::Base", tags::BASE,
    accepts [FactorizationCalculator, SieveCalculator]
}

declare_class! {
    /// A calculation over a single input value.
    Calculator: Base in PrimesLibrary => PrimesObject, "Primes::Calculator", tags::CALCULATOR,
    accepts [FactorizationCalculator, SieveCalculator]
}

declare_class! {
    /// Prime factorization of the value.
    FactorizationCalculator: Calculator in PrimesLibrary => PrimesObject,
    "Primes::FactorizationCalculator", tags::FACTORIZATION_CALCULATOR,
    accepts [FactorizationCalculator]
}

declare_class! {
    /// All primes up to and including the value.
    SieveCalculator: Calculator in PrimesLibrary => PrimesObject,
    "Primes::SieveCalculator", tags::SIEVE_CALCULATOR,
    accepts [SieveCalculator]
}

impl Base {
    pub fn class_type_id(&self) -> Result<TypeTag> {
        self.instance().class_type_id()
    }

    pub fn last_error(&self) -> Result<Option<String>> {
        self.instance().last_error()
    }
}

impl Calculator {
    pub fn value(&self) -> Result<u64> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut value = 0u64;
        let status = unsafe { (instance.library().get_value)(handle, &mut value) };
        instance.check(status)?;
        Ok(value)
    }

    /// Set the input. Discards any previous result.
    pub fn set_value(&self, value: u64) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let status = unsafe { (instance.library().set_value)(handle, value) };
        instance.check(status)
    }

    /// Run the calculation.
    ///
    /// The progress callback, if any, is called on this thread before this
    /// returns. Setting its `should_abort` flag fails the calculation with
    /// CALCULATIONABORTED. If the value is changed while the calculation
    /// runs, e.g. from the callback, the result is discarded and the call
    /// fails with a generic error.
    pub fn calculate(&self) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let status = unsafe { (instance.library().calculate)(handle) };
        instance.check(status)
    }

    /// Replace the progress callback. `None` removes it.
    pub fn set_progress_callback(&self, callback: ProgressCallback) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let status = unsafe { (instance.library().set_progress_callback)(handle, callback) };
        instance.check(status)
    }
}

impl FactorizationCalculator {
    /// Factors of the last calculated value, smallest prime first.
    pub fn prime_factors(&self) -> Result<Vec<PrimeFactor>> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let call = instance.library().prime_factors;
        fetch_array(instance.library().base().options().fetch_attempts, |capacity, needed, buffer| {
            let status = unsafe { call(handle, capacity, needed, buffer) };
            instance.check(status)
        })
    }
}

impl SieveCalculator {
    /// Primes up to the last calculated value.
    pub fn primes(&self) -> Result<Vec<u64>> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let call = instance.library().primes;
        fetch_array(instance.library().base().options().fetch_attempts, |capacity, needed, buffer| {
            let status = unsafe { call(handle, capacity, needed, buffer) };
            instance.check(status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_names() {
        assert_eq!(TypeTag::from_qualified_name("Primes::Base"), tags::BASE);
        assert_eq!(TypeTag::from_qualified_name("Primes::Calculator"), tags::CALCULATOR);
        assert_eq!(
            TypeTag::from_qualified_name("Primes::FactorizationCalculator"),
            tags::FACTORIZATION_CALCULATOR
        );
        assert_eq!(
            TypeTag::from_qualified_name("Primes::SieveCalculator"),
            tags::SIEVE_CALCULATOR
        );
    }
}
