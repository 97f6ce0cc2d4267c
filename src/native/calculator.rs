//! Native calculator component: variables and a calculator that co-owns them.
//!
//! Uses bare handles, so callers query type tags separately. A primes
//! component can be injected; the calculator then reads sieve results
//! through the primes lookup method and handles.

use std::ffi::{c_char, c_void, CString};
use std::mem;
use std::ptr;
use std::sync::Mutex;

use super::object::lock_state;
use super::{
    in_str, out_param, registry, symbol_lookup_method, NativeComponent, NativeError, NativeObject,
    NativeResult, ObjectTable,
};
use crate::ffi::raw::{
    GetLastErrorFn, GetVersionFn, SymbolLookupFn, UnaryFn, CABI_ERR_COULD_NOT_LOAD_LIBRARY,
    CABI_ERR_INCOMPATIBLE_VERSION, CABI_OK,
};
use crate::ffi::{Handle, StatusCode};
use crate::types::{TypeTag, Version};

const PRIMES_NAMESPACE: &str = "primes";

/// Oldest primes binary the calculator can consume.
const PRIMES_VERSION: Version = Version::new(1, 2, 0);

type GetPrimesFn = unsafe extern "C" fn(Handle, u64, *mut u64, *mut u64) -> StatusCode;

/// Lookup method of the injected primes component.
static INJECTED_PRIMES: Mutex<Option<SymbolLookupFn>> = Mutex::new(None);

pub(crate) enum CalculatorObject {
    Variable(Mutex<f64>),
    Calculator(Mutex<Vec<Handle>>),
}

impl NativeObject for CalculatorObject {
    fn type_tag(&self) -> TypeTag {
        match self {
            CalculatorObject::Variable(_) => TypeTag::from_qualified_name("Calculator::Variable"),
            CalculatorObject::Calculator(_) => {
                TypeTag::from_qualified_name("Calculator::Calculator")
            }
        }
    }

    fn owned_handles(&self) -> Vec<Handle> {
        match self {
            CalculatorObject::Variable(_) => Vec::new(),
            CalculatorObject::Calculator(enlisted) => lock_state(enlisted).clone(),
        }
    }
}

static OBJECTS: ObjectTable<CalculatorObject> = ObjectTable::new("Calculator");

pub(crate) struct CalculatorComponent;

impl NativeComponent for CalculatorComponent {
    type Object = CalculatorObject;

    const NAMESPACE: &'static str = "calculator";
    const VERSION: Version = Version::new(1, 1, 0);

    fn objects() -> &'static ObjectTable<CalculatorObject> {
        &OBJECTS
    }

    fn exports() -> Vec<(&'static str, usize)> {
        type EntryFn = unsafe extern "C" fn(*mut *mut c_void) -> StatusCode;
        type CreateVariableFn = unsafe extern "C" fn(f64, *mut Handle) -> StatusCode;
        type CreateFn = unsafe extern "C" fn(*mut Handle) -> StatusCode;
        type GetValueFn = unsafe extern "C" fn(Handle, *mut f64) -> StatusCode;
        type SetValueFn = unsafe extern "C" fn(Handle, f64) -> StatusCode;
        type PairFn = unsafe extern "C" fn(Handle, Handle) -> StatusCode;
        type IndexFn = unsafe extern "C" fn(Handle, u32, *mut Handle) -> StatusCode;
        type HandleFn = unsafe extern "C" fn(Handle) -> StatusCode;
        type ResultFn = unsafe extern "C" fn(Handle, *mut Handle) -> StatusCode;
        type ApplyFn = unsafe extern "C" fn(Handle, *const c_char, *const c_char) -> StatusCode;
        type InjectFn = unsafe extern "C" fn(*const c_char, *mut c_void) -> StatusCode;

        vec![
            (
                "getsymbollookupmethod",
                calculator_getsymbollookupmethod as EntryFn as usize,
            ),
            ("createvariable", create_variable as CreateVariableFn as usize),
            ("createcalculator", create_calculator as CreateFn as usize),
            ("variable_getvalue", variable_get_value as GetValueFn as usize),
            ("variable_setvalue", variable_set_value as SetValueFn as usize),
            ("calculator_enlistvariable", enlist_variable as PairFn as usize),
            ("calculator_getenlistedvariable", enlisted_variable as IndexFn as usize),
            ("calculator_clearvariables", clear_variables as HandleFn as usize),
            ("calculator_add", add as ResultFn as usize),
            ("calculator_multiply", multiply as ResultFn as usize),
            ("calculator_apply", apply as ApplyFn as usize),
            ("injectcomponent", inject_component as InjectFn as usize),
            ("calculator_enlistprimes", enlist_primes as PairFn as usize),
        ]
    }
}

/// Entry point of the calculator component.
///
/// # Safety
///
/// `address` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn calculator_getsymbollookupmethod(address: *mut *mut c_void) -> StatusCode {
    symbol_lookup_method::<CalculatorComponent>(address)
}

/// Current reference count of a calculator object, `None` once destroyed.
pub fn reference_count(handle: Handle) -> Option<u32> {
    OBJECTS.reference_count(handle)
}

fn finite(value: f64) -> NativeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NativeError::invalid_param(format!("{} is not a finite value", value)))
    }
}

fn with_variable<R>(handle: Handle, f: impl FnOnce(&mut f64) -> R) -> NativeResult<R> {
    let entry = OBJECTS.get(handle)?;
    let CalculatorObject::Variable(value) = &**entry else {
        return Err(NativeError::invalid_cast("not a variable"));
    };
    let mut value = lock_state(value);
    Ok(f(&mut value))
}

fn enlisted(calculator: Handle) -> NativeResult<Vec<Handle>> {
    with_enlisted(calculator, |enlisted| enlisted.clone())
}

fn with_enlisted<R>(calculator: Handle, f: impl FnOnce(&mut Vec<Handle>) -> R) -> NativeResult<R> {
    let entry = OBJECTS.get(calculator)?;
    let CalculatorObject::Calculator(enlisted) = &**entry else {
        return Err(NativeError::invalid_cast("not a calculator"));
    };
    let mut enlisted = lock_state(enlisted);
    Ok(f(&mut enlisted))
}

fn combine(calculator: Handle, initial: f64, op: fn(f64, f64) -> f64) -> NativeResult<Handle> {
    let mut result = initial;
    for variable in enlisted(calculator)? {
        let value = with_variable(variable, |value| *value)?;
        result = op(result, value);
    }
    Ok(OBJECTS.insert(CalculatorObject::Variable(Mutex::new(finite(result)?))))
}

unsafe extern "C" fn create_variable(initial: f64, variable: *mut Handle) -> StatusCode {
    OBJECTS.guard(Handle::null(), || {
        let out = out_param(variable)?;
        let initial = finite(initial)?;
        *out = OBJECTS.insert(CalculatorObject::Variable(Mutex::new(initial)));
        Ok(())
    })
}

unsafe extern "C" fn create_calculator(calculator: *mut Handle) -> StatusCode {
    OBJECTS.guard(Handle::null(), || {
        let out = out_param(calculator)?;
        *out = OBJECTS.insert(CalculatorObject::Calculator(Mutex::new(Vec::new())));
        Ok(())
    })
}

unsafe extern "C" fn variable_get_value(variable: Handle, value: *mut f64) -> StatusCode {
    OBJECTS.guard(variable, || {
        let out = out_param(value)?;
        *out = with_variable(variable, |value| *value)?;
        Ok(())
    })
}

unsafe extern "C" fn variable_set_value(variable: Handle, value: f64) -> StatusCode {
    OBJECTS.guard(variable, || {
        let value = finite(value)?;
        with_variable(variable, |current| *current = value)
    })
}

/// The calculator takes its own reference to the variable.
unsafe extern "C" fn enlist_variable(calculator: Handle, variable: Handle) -> StatusCode {
    OBJECTS.guard(calculator, || {
        with_variable(variable, |_| ())?;
        OBJECTS.acquire(variable)?;
        if let Err(err) = with_enlisted(calculator, |enlisted| enlisted.push(variable)) {
            if let Err(undo) = OBJECTS.release(variable) {
                log::warn!(
                    "Calculator: rolling back handle {} failed: {}",
                    variable.as_raw(),
                    undo
                );
            }
            return Err(err);
        }
        Ok(())
    })
}

/// Hands the caller a fresh reference.
unsafe extern "C" fn enlisted_variable(
    calculator: Handle,
    index: u32,
    variable: *mut Handle,
) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let out = out_param(variable)?;
        let handle = with_enlisted(calculator, |enlisted| enlisted.get(index as usize).copied())?
            .ok_or_else(|| NativeError::invalid_param(format!("no variable at index {}", index)))?;
        OBJECTS.acquire(handle)?;
        *out = handle;
        Ok(())
    })
}

unsafe extern "C" fn clear_variables(calculator: Handle) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let released = with_enlisted(calculator, mem::take)?;
        for variable in released {
            OBJECTS.release(variable)?;
        }
        Ok(())
    })
}

unsafe extern "C" fn add(calculator: Handle, sum: *mut Handle) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let out = out_param(sum)?;
        *out = combine(calculator, 0.0, |a, b| a + b)?;
        Ok(())
    })
}

unsafe extern "C" fn multiply(calculator: Handle, product: *mut Handle) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let out = out_param(product)?;
        *out = combine(calculator, 1.0, |a, b| a * b)?;
        Ok(())
    })
}

/// Map every enlisted variable through the callable a host registered as
/// `(namespace, name)`. Component exports are not callables. No lock is
/// held while the callable runs.
unsafe extern "C" fn apply(
    calculator: Handle,
    namespace: *const c_char,
    name: *const c_char,
) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let namespace = in_str(namespace)?;
        let name = in_str(name)?;
        let address = registry::find_host_callable(namespace, name)
            .ok_or_else(|| NativeError::symbol_not_found(namespace, name))?;
        let function = mem::transmute::<*const (), UnaryFn>(address as *const ());

        for variable in enlisted(calculator)? {
            let input = with_variable(variable, |value| *value)?;
            let output = finite(function(input))?;
            with_variable(variable, |value| *value = output)?;
        }
        Ok(())
    })
}

unsafe fn injected_symbol<F: Copy>(lookup: SymbolLookupFn, name: &str) -> NativeResult<F> {
    let namespace = CString::new(PRIMES_NAMESPACE)
        .map_err(|_| NativeError::invalid_param("namespace contains a null byte"))?;
    let symbol =
        CString::new(name).map_err(|_| NativeError::invalid_param("name contains a null byte"))?;

    let mut address: *mut c_void = ptr::null_mut();
    let status = lookup(namespace.as_ptr(), symbol.as_ptr(), &mut address);
    if status != CABI_OK || address.is_null() {
        return Err(NativeError::symbol_not_found(PRIMES_NAMESPACE, name));
    }
    Ok(mem::transmute_copy::<*mut c_void, F>(&address))
}

/// Turn a failed primes call into an error carrying the primes message.
unsafe fn injected_error(lookup: SymbolLookupFn, sieve: Handle, status: StatusCode) -> NativeError {
    let fallback = || NativeError::new(status, format!("Primes Error {}", status));
    let Ok(get_last_error) = injected_symbol::<GetLastErrorFn>(lookup, "getlasterror") else {
        return fallback();
    };

    let mut needed = 0u32;
    let mut has_error = false;
    if get_last_error(sieve, 0, &mut needed, ptr::null_mut(), &mut has_error) != CABI_OK
        || !has_error
    {
        return fallback();
    }
    let mut message = vec![0u8; needed as usize];
    let filled = get_last_error(
        sieve,
        needed,
        &mut needed,
        message.as_mut_ptr().cast::<c_char>(),
        &mut has_error,
    );
    if filled != CABI_OK || !has_error {
        return fallback();
    }
    if let Some(nul) = message.iter().position(|&byte| byte == 0) {
        message.truncate(nul);
    }
    NativeError::new(status, String::from_utf8_lossy(&message))
}

unsafe fn read_primes(lookup: SymbolLookupFn, sieve: Handle) -> NativeResult<Vec<u64>> {
    let get_primes: GetPrimesFn = injected_symbol(lookup, "sievecalculator_getprimes")?;

    let mut needed = 0u64;
    let status = get_primes(sieve, 0, &mut needed, ptr::null_mut());
    if status != CABI_OK {
        return Err(injected_error(lookup, sieve, status));
    }
    let capacity = needed;
    let mut primes = vec![0u64; capacity as usize];
    let status = get_primes(sieve, capacity, &mut needed, primes.as_mut_ptr());
    if status != CABI_OK {
        return Err(injected_error(lookup, sieve, status));
    }
    if needed > capacity {
        return Err(NativeError::generic("sieve result changed while being read"));
    }
    primes.truncate(needed as usize);
    Ok(primes)
}

/// Accept the lookup method of a component this one consumes. Only
/// `primes` is known; its binary version is checked before it is kept.
unsafe extern "C" fn inject_component(namespace: *const c_char, lookup: *mut c_void) -> StatusCode {
    OBJECTS.guard(Handle::null(), || {
        let namespace = in_str(namespace)?;
        if namespace != PRIMES_NAMESPACE {
            return Err(NativeError::invalid_param(format!(
                "cannot inject component {}",
                namespace
            )));
        }
        if lookup.is_null() {
            return Err(NativeError::invalid_param("null symbol lookup method"));
        }
        let lookup = mem::transmute::<*mut c_void, SymbolLookupFn>(lookup);

        let get_version: GetVersionFn = injected_symbol(lookup, "getversion")?;
        let mut version = Version::default();
        let status = get_version(&mut version.major, &mut version.minor, &mut version.micro);
        if status != CABI_OK {
            return Err(NativeError::new(status, "could not query the primes version"));
        }
        if !version.is_compatible_with(&PRIMES_VERSION) {
            return Err(NativeError::new(
                CABI_ERR_INCOMPATIBLE_VERSION,
                format!("primes {} is not compatible with {}", version, PRIMES_VERSION),
            ));
        }

        *lock_state(&INJECTED_PRIMES) = Some(lookup);
        log::debug!("Calculator: injected primes {}", version);
        Ok(())
    })
}

/// Enlist one new variable per prime of a calculated sieve. The sieve
/// handle belongs to the injected primes component; the calculator holds
/// the only reference to each new variable.
unsafe extern "C" fn enlist_primes(calculator: Handle, sieve: Handle) -> StatusCode {
    OBJECTS.guard(calculator, || {
        with_enlisted(calculator, |_| ())?;
        let injected = *lock_state(&INJECTED_PRIMES);
        let lookup = injected.ok_or_else(|| {
            NativeError::new(
                CABI_ERR_COULD_NOT_LOAD_LIBRARY,
                "no primes component has been injected",
            )
        })?;

        let variables: Vec<Handle> = read_primes(lookup, sieve)?
            .into_iter()
            .map(|prime| OBJECTS.insert(CalculatorObject::Variable(Mutex::new(prime as f64))))
            .collect();
        if let Err(err) = with_enlisted(calculator, |enlisted| enlisted.extend(&variables)) {
            for variable in variables {
                if let Err(undo) = OBJECTS.release(variable) {
                    log::warn!(
                        "Calculator: rolling back handle {} failed: {}",
                        variable.as_raw(),
                        undo
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    })
}
