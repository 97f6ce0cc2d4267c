//! Process-wide symbol registry behind every component's lookup method.
//!
//! Entries map `(namespace, name)` to a function address. Registration is
//! first-wins: registering an existing name fails with DUPLICATESYMBOL and
//! leaves the entry untouched. All access goes through one mutex.
//!
//! Component exports and host registrations never share a namespace: the
//! namespaces in [`RESERVED_NAMESPACES`] only ever hold component exports,
//! and native code that calls host callables only sees host entries.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::calculator::CalculatorComponent;
use super::primes::PrimesComponent;
use super::zoo::ZooComponent;
use super::NativeComponent;
use crate::ffi::raw::{
    RegisterSymbolFn, StatusCode, SymbolLookupFn, ABI_NAMESPACE, CABI_ERR_DUPLICATE_SYMBOL,
    CABI_ERR_INVALID_PARAM, CABI_ERR_SYMBOL_NOT_FOUND, CABI_OK,
};

/// Namespaces hosts cannot register into, loaded or not.
pub const RESERVED_NAMESPACES: [&str; 4] = [
    ABI_NAMESPACE,
    <ZooComponent as NativeComponent>::NAMESPACE,
    <CalculatorComponent as NativeComponent>::NAMESPACE,
    <PrimesComponent as NativeComponent>::NAMESPACE,
];

/// Check if `namespace` belongs to a component or the registry.
pub fn is_reserved(namespace: &str) -> bool {
    RESERVED_NAMESPACES.contains(&namespace)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Export,
    Host,
}

struct Symbol {
    address: usize,
    origin: Origin,
}

struct Registry {
    symbols: BTreeMap<(String, String), Symbol>,
    installed: BTreeSet<&'static str>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    symbols: BTreeMap::new(),
    installed: BTreeSet::new(),
});

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    fn insert(&mut self, namespace: &str, name: &str, address: usize, origin: Origin) -> StatusCode {
        let key = (namespace.to_string(), name.to_string());
        if self.symbols.contains_key(&key) {
            return CABI_ERR_DUPLICATE_SYMBOL;
        }
        self.symbols.insert(key, Symbol { address, origin });
        CABI_OK
    }

    fn get(&self, namespace: &str, name: &str) -> Option<&Symbol> {
        self.symbols.get(&(namespace.to_string(), name.to_string()))
    }

    fn install_abi(&mut self) {
        if !self.installed.insert(ABI_NAMESPACE) {
            return;
        }
        let lookup: SymbolLookupFn = lookup_symbol;
        let register: RegisterSymbolFn = register_symbol;
        self.insert(ABI_NAMESPACE, "lookupsymbol", lookup as usize, Origin::Export);
        self.insert(ABI_NAMESPACE, "registersymbol", register as usize, Origin::Export);
    }
}

/// Install the functions of component `C`, once per process.
pub(crate) fn install<C: NativeComponent>() {
    let mut registry = registry();
    registry.install_abi();
    if !registry.installed.insert(C::NAMESPACE) {
        return;
    }

    let exports = C::all_exports();
    let count = exports.len();
    for (name, address) in exports {
        if registry.insert(C::NAMESPACE, name, address, Origin::Export) != CABI_OK {
            log::warn!("{}::{} is exported twice, keeping the first", C::NAMESPACE, name);
        }
    }
    log::debug!("installed {} symbols for {}", count, C::NAMESPACE);
}

/// Address registered under `(namespace, name)`.
pub fn find(namespace: &str, name: &str) -> Option<usize> {
    registry().get(namespace, name).map(|symbol| symbol.address)
}

/// Address a host registered under `(namespace, name)`. Component exports
/// are never returned.
pub fn find_host_callable(namespace: &str, name: &str) -> Option<usize> {
    registry()
        .get(namespace, name)
        .filter(|symbol| symbol.origin == Origin::Host)
        .map(|symbol| symbol.address)
}

unsafe fn read_name<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    CStr::from_ptr(value).to_str().ok()
}

/// `abi::lookupsymbol`: write the address registered under the name.
///
/// # Safety
///
/// `namespace` and `name` must be null or NUL-terminated strings; `address`
/// must be null or writable.
pub unsafe extern "C" fn lookup_symbol(
    namespace: *const c_char,
    name: *const c_char,
    address: *mut *mut c_void,
) -> StatusCode {
    if address.is_null() {
        return CABI_ERR_INVALID_PARAM;
    }
    *address = ptr::null_mut();

    let (Some(namespace), Some(name)) = (read_name(namespace), read_name(name)) else {
        return CABI_ERR_INVALID_PARAM;
    };

    match find(namespace, name) {
        Some(found) => {
            *address = found as *mut c_void;
            CABI_OK
        }
        None => CABI_ERR_SYMBOL_NOT_FOUND,
    }
}

/// `abi::registersymbol`: register an address under the name, first-wins.
///
/// Reserved namespaces are rejected with INVALIDPARAM.
///
/// # Safety
///
/// `namespace` and `name` must be null or NUL-terminated strings. The
/// address must stay callable for the rest of the process.
pub unsafe extern "C" fn register_symbol(
    namespace: *const c_char,
    name: *const c_char,
    address: *mut c_void,
) -> StatusCode {
    let (Some(namespace), Some(name)) = (read_name(namespace), read_name(name)) else {
        return CABI_ERR_INVALID_PARAM;
    };
    if address.is_null() || namespace.is_empty() || name.is_empty() {
        return CABI_ERR_INVALID_PARAM;
    }
    if is_reserved(namespace) {
        log::warn!("refusing to register {}::{}: namespace is reserved", namespace, name);
        return CABI_ERR_INVALID_PARAM;
    }

    let status = registry().insert(namespace, name, address as usize, Origin::Host);
    if status == CABI_OK {
        log::debug!("registered {}::{}", namespace, name);
    }
    status
}
