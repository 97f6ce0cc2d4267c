//! Bindings for the calculator component.
//!
//! The calculator returns bare handles; every returned object costs one
//! extra `base_classtypeid` call to resolve its wrapper type.
//!
//! The calculator component can consume a loaded primes component, see
//! [`CalculatorLibrary::inject_primes`].

use std::ffi::{c_char, c_void, CString};
use std::fmt;
use std::sync::Arc;

use crate::dispatch::{self, declare_class, Class, Component, Object};
use crate::error::{Error, Result};
use crate::ffi::{BaseTable, GetSymbolLookupMethodFn, Handle, StatusCode, UnaryFn};
use crate::instance::Instance;
use crate::primes::{PrimesLibrary, SieveCalculator};
use crate::symbols::SymbolLookup;
use crate::types::{LoadOptions, TypeTag, Version};

/// Version of the calculator binary these bindings were written against.
pub const BINDING_VERSION: Version = Version::new(1, 1, 0);

/// Type tags of the calculator classes.
pub mod tags {
    use crate::types::TypeTag;

    pub const BASE: TypeTag = TypeTag::new(0x6EED_D775_CD31_7A3D);
    pub const VARIABLE: TypeTag = TypeTag::new(0x681C_EE87_8D15_BECC);
    pub const CALCULATOR: TypeTag = TypeTag::new(0x08F8_4794_9AA2_6FDF);
}

type ResultFn = unsafe extern "C" fn(Handle, *mut Handle) -> StatusCode;

/// The loaded calculator component.
pub struct CalculatorLibrary {
    base: BaseTable,
    create_variable: unsafe extern "C" fn(f64, *mut Handle) -> StatusCode,
    create_calculator: unsafe extern "C" fn(*mut Handle) -> StatusCode,
    variable_get_value: unsafe extern "C" fn(Handle, *mut f64) -> StatusCode,
    variable_set_value: unsafe extern "C" fn(Handle, f64) -> StatusCode,
    enlist_variable: unsafe extern "C" fn(Handle, Handle) -> StatusCode,
    enlisted_variable: unsafe extern "C" fn(Handle, u32, *mut Handle) -> StatusCode,
    clear_variables: unsafe extern "C" fn(Handle) -> StatusCode,
    add: ResultFn,
    multiply: ResultFn,
    apply: unsafe extern "C" fn(Handle, *const c_char, *const c_char) -> StatusCode,
    inject_component: unsafe extern "C" fn(*const c_char, *mut c_void) -> StatusCode,
    enlist_primes: unsafe extern "C" fn(Handle, Handle) -> StatusCode,
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("{:?} contains a null byte", value)))
}

impl CalculatorLibrary {
    /// Load the in-process calculator component with default options.
    pub fn load() -> Result<Arc<Self>> {
        Self::load_with(LoadOptions::default())
    }

    /// Load the in-process calculator component.
    pub fn load_with(options: LoadOptions) -> Result<Arc<Self>> {
        unsafe {
            Self::load_from_entry_point(
                crate::native::calculator::calculator_getsymbollookupmethod,
                options,
            )
        }
    }

    /// Load a calculator component through its entry point.
    ///
    /// # Safety
    ///
    /// `entry` must be a calculator `getsymbollookupmethod` whose symbols
    /// have the signatures these bindings expect.
    pub unsafe fn load_from_entry_point(
        entry: GetSymbolLookupMethodFn,
        options: LoadOptions,
    ) -> Result<Arc<Self>> {
        let symbols = SymbolLookup::from_entry_point(entry)?;
        let ns = Self::NAMESPACE;
        let base = BaseTable::load(symbols, ns, "Calculator", BINDING_VERSION, options)?;
        Ok(Arc::new(Self {
            base,
            create_variable: symbols.resolve_fn(ns, "createvariable")?,
            create_calculator: symbols.resolve_fn(ns, "createcalculator")?,
            variable_get_value: symbols.resolve_fn(ns, "variable_getvalue")?,
            variable_set_value: symbols.resolve_fn(ns, "variable_setvalue")?,
            enlist_variable: symbols.resolve_fn(ns, "calculator_enlistvariable")?,
            enlisted_variable: symbols.resolve_fn(ns, "calculator_getenlistedvariable")?,
            clear_variables: symbols.resolve_fn(ns, "calculator_clearvariables")?,
            add: symbols.resolve_fn(ns, "calculator_add")?,
            multiply: symbols.resolve_fn(ns, "calculator_multiply")?,
            apply: symbols.resolve_fn(ns, "calculator_apply")?,
            inject_component: symbols.resolve_fn(ns, "injectcomponent")?,
            enlist_primes: symbols.resolve_fn(ns, "calculator_enlistprimes")?,
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

    pub fn create_variable(self: &Arc<Self>, initial: f64) -> Result<Variable> {
        let mut variable = Handle::null();
        let status = unsafe { (self.create_variable)(initial, &mut variable) };
        crate::ffi::check_status(&self.base, Handle::null(), status)?;
        unsafe { dispatch::resolve(self, variable) }
    }

    pub fn create_calculator(self: &Arc<Self>) -> Result<Calculator> {
        let mut calculator = Handle::null();
        let status = unsafe { (self.create_calculator)(&mut calculator) };
        crate::ffi::check_status(&self.base, Handle::null(), status)?;
        unsafe { dispatch::resolve(self, calculator) }
    }

    /// Register a function that [`Calculator::apply`] can find as
    /// `(namespace, name)`. The first registration of a name wins.
    ///
    /// Component namespaces and `abi` are reserved and fail with
    /// INVALIDPARAM.
    pub fn register_function(&self, namespace: &str, name: &str, function: UnaryFn) -> Result<()> {
        unsafe {
            self.base
                .symbols()
                .register(namespace, name, function as *mut c_void)
        }
    }

    /// Let the calculator component call into `primes`, which
    /// [`Calculator::enlist_primes`] needs. The injection is process-wide.
    pub fn inject_primes(&self, primes: &PrimesLibrary) -> Result<()> {
        unsafe { self.inject_component(PrimesLibrary::NAMESPACE, *primes.base().symbols()) }
    }

    /// Hand the calculator component the lookup method of a component it
    /// consumes. Only `primes` is accepted.
    ///
    /// # Safety
    ///
    /// `symbols` must serve `namespace` with the signatures of that
    /// component's ABI.
    pub unsafe fn inject_component(&self, namespace: &str, symbols: SymbolLookup) -> Result<()> {
        let namespace_c = c_string(namespace)?;
        let lookup = symbols.as_fn() as *mut c_void;
        let status = (self.inject_component)(namespace_c.as_ptr(), lookup);
        crate::ffi::check_status(&self.base, Handle::null(), status)
    }
}

impl fmt::Debug for CalculatorLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorLibrary")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Concrete calculator wrappers.
#[derive(Debug)]
pub enum CalculatorObject {
    Variable(Variable),
    Calculator(Calculator),
}

impl Object for CalculatorObject {
    type Component = CalculatorLibrary;

    fn type_tag(&self) -> TypeTag {
        match self {
            CalculatorObject::Variable(_) => tags::VARIABLE,
            CalculatorObject::Calculator(_) => tags::CALCULATOR,
        }
    }

    fn into_instance(self) -> Instance<CalculatorLibrary> {
        match self {
            CalculatorObject::Variable(inner) => inner.into_instance(),
            CalculatorObject::Calculator(inner) => inner.into_instance(),
        }
    }
}

impl Component for CalculatorLibrary {
    type Object = CalculatorObject;

    const NAMESPACE: &'static str = "calculator";

    fn base(&self) -> &BaseTable {
        &self.base
    }

    fn dispatch(
        tag: TypeTag,
        instance: Instance<Self>,
    ) -> std::result::Result<CalculatorObject, Instance<Self>> {
        Ok(match tag {
            tags::VARIABLE => CalculatorObject::Variable(Variable::from_instance(instance)),
            tags::CALCULATOR => CalculatorObject::Calculator(Calculator::from_instance(instance)),
            _ => return Err(instance),
        })
    }
}

declare_class! {
    Base: root in CalculatorLibrary => CalculatorObject, "Calculator::Base", tags::BASE,
    accepts [Variable, Calculator]
}

declare_class! {
    /// A floating-point value.
    Variable: Base in CalculatorLibrary => CalculatorObject, "Calculator::Variable",
    tags::VARIABLE,
    accepts [Variable]
}

declare_class! {
    /// Combines the variables enlisted in it. Holds a reference to each.
    Calculator: Base in CalculatorLibrary => CalculatorObject, "Calculator::Calculator",
    tags::CALCULATOR,
    accepts [Calculator]
}

impl Base {
    pub fn class_type_id(&self) -> Result<TypeTag> {
        self.instance().class_type_id()
    }

    pub fn last_error(&self) -> Result<Option<String>> {
        self.instance().last_error()
    }
}

impl Variable {
    pub fn value(&self) -> Result<f64> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut value = 0.0;
        let status = unsafe { (instance.library().variable_get_value)(handle, &mut value) };
        instance.check(status)?;
        Ok(value)
    }

    pub fn set_value(&self, value: f64) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let status = unsafe { (instance.library().variable_set_value)(handle, value) };
        instance.check(status)
    }
}

impl Calculator {
    /// Enlist a variable. The calculator takes its own reference.
    pub fn enlist_variable(&self, variable: &Variable) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let variable = variable.instance().handle_checked()?;
        let status = unsafe { (instance.library().enlist_variable)(handle, variable) };
        instance.check(status)
    }

    /// The enlisted variable at `index`, as a new reference.
    pub fn enlisted_variable(&self, index: u32) -> Result<Variable> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut variable = Handle::null();
        let status =
            unsafe { (instance.library().enlisted_variable)(handle, index, &mut variable) };
        instance.check(status)?;
        unsafe { dispatch::resolve(instance.library(), variable) }
    }

    pub fn clear_variables(&self) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let status = unsafe { (instance.library().clear_variables)(handle) };
        instance.check(status)
    }

    /// Sum of the enlisted variables, as a new variable.
    pub fn add(&self) -> Result<Variable> {
        self.combine(self.instance().library().add)
    }

    /// Product of the enlisted variables, as a new variable.
    pub fn multiply(&self) -> Result<Variable> {
        self.combine(self.instance().library().multiply)
    }

    fn combine(&self, call: ResultFn) -> Result<Variable> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut result = Handle::null();
        let status = unsafe { call(handle, &mut result) };
        instance.check(status)?;
        unsafe { dispatch::resolve(instance.library(), result) }
    }

    /// Enlist one new variable per prime of a calculated sieve. The sieve
    /// is read through the injected primes component.
    pub fn enlist_primes(&self, sieve: &SieveCalculator) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let sieve = sieve.instance().handle_checked()?;
        let status = unsafe { (instance.library().enlist_primes)(handle, sieve) };
        instance.check(status)
    }

    /// Replace every enlisted variable's value with `f(value)`, where `f` is
    /// the function a host registered as `(namespace, name)`. Component
    /// exports cannot be applied; naming one fails with
    /// COULDNOTFINDLIBRARYEXPORT.
    pub fn apply(&self, namespace: &str, name: &str) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let namespace_c = c_string(namespace)?;
        let name_c = c_string(name)?;
        let status = unsafe {
            (instance.library().apply)(handle, namespace_c.as_ptr(), name_c.as_ptr())
        };
        instance.check(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_names() {
        assert_eq!(TypeTag::from_qualified_name("Calculator::Base"), tags::BASE);
        assert_eq!(TypeTag::from_qualified_name("Calculator::Variable"), tags::VARIABLE);
        assert_eq!(
            TypeTag::from_qualified_name("Calculator::Calculator"),
            tags::CALCULATOR
        );
    }
}
