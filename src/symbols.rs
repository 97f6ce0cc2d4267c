//! Symbol lookup and registration through a component's entry point.
//!
//! A component exposes exactly one fixed symbol, its
//! `getsymbollookupmethod`. Everything else, including the registration
//! function, is found through the lookup function it returns.

use std::ffi::{c_void, CString};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use crate::error::{Error, Result};
use crate::ffi::raw::{
    GetSymbolLookupMethodFn, RegisterSymbolFn, SymbolLookupFn, ABI_NAMESPACE, CABI_ERR_DUPLICATE_SYMBOL,
    CABI_ERR_SYMBOL_NOT_FOUND, CABI_OK,
};

/// Resolved symbol lookup function of a component.
#[derive(Clone, Copy)]
pub struct SymbolLookup {
    lookup: SymbolLookupFn,
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("{:?} contains a null byte", value)))
}

impl SymbolLookup {
    /// Call a component's entry point and keep the lookup function it returns.
    ///
    /// # Safety
    ///
    /// `entry` must be a `getsymbollookupmethod` implementation that writes
    /// the address of a function matching [`SymbolLookupFn`].
    pub unsafe fn from_entry_point(entry: GetSymbolLookupMethodFn) -> Result<Self> {
        let mut address: *mut c_void = ptr::null_mut();
        let status = entry(&mut address);
        if status != CABI_OK || address.is_null() {
            return Err(Error::Native {
                component: "abi",
                code: if status != CABI_OK {
                    status
                } else {
                    CABI_ERR_SYMBOL_NOT_FOUND
                },
                message: Some("symbol lookup method unavailable".to_string()),
            });
        }

        let lookup = mem::transmute::<*mut c_void, SymbolLookupFn>(address);
        Ok(Self { lookup })
    }

    /// Wrap an already resolved lookup function.
    pub fn from_fn(lookup: SymbolLookupFn) -> Self {
        Self { lookup }
    }

    /// The resolved lookup function, e.g. to hand to another component.
    pub fn as_fn(&self) -> SymbolLookupFn {
        self.lookup
    }

    /// Look up a symbol. Returns `Ok(None)` when nothing is registered.
    pub fn find(&self, namespace: &str, name: &str) -> Result<Option<NonNull<c_void>>> {
        let namespace_c = c_string(namespace)?;
        let name_c = c_string(name)?;

        let mut address: *mut c_void = ptr::null_mut();
        let status = unsafe { (self.lookup)(namespace_c.as_ptr(), name_c.as_ptr(), &mut address) };
        match status {
            CABI_OK => Ok(NonNull::new(address)),
            CABI_ERR_SYMBOL_NOT_FOUND => Ok(None),
            code => Err(Error::Native {
                component: "abi",
                code,
                message: Some(format!("lookup of {}::{} failed", namespace, name)),
            }),
        }
    }

    /// Look up a symbol that must exist.
    pub fn resolve(&self, namespace: &str, name: &str) -> Result<NonNull<c_void>> {
        self.find(namespace, name)?
            .ok_or_else(|| Error::SymbolNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    /// Look up a symbol and reinterpret it as the function pointer type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the
    /// registered function's signature.
    pub unsafe fn resolve_fn<F: Copy>(&self, namespace: &str, name: &str) -> Result<F> {
        debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());
        let address = self.resolve(namespace, name)?.as_ptr();
        Ok(mem::transmute_copy::<*mut c_void, F>(&address))
    }

    /// Register `address` under `(namespace, name)`.
    ///
    /// Registration is first-wins: an existing entry is kept and
    /// [`Error::DuplicateSymbol`] is returned.
    ///
    /// # Safety
    ///
    /// `address` must stay valid for the rest of the process and match the
    /// signature consumers of the name expect.
    pub unsafe fn register(&self, namespace: &str, name: &str, address: *mut c_void) -> Result<()> {
        let register: RegisterSymbolFn = self.resolve_fn(ABI_NAMESPACE, "registersymbol")?;
        let namespace_c = c_string(namespace)?;
        let name_c = c_string(name)?;

        match register(namespace_c.as_ptr(), name_c.as_ptr(), address) {
            CABI_OK => {
                log::debug!("registered symbol {}::{}", namespace, name);
                Ok(())
            }
            CABI_ERR_DUPLICATE_SYMBOL => Err(Error::DuplicateSymbol {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            code => Err(Error::Native {
                component: "abi",
                code,
                message: Some(format!("registration of {}::{} failed", namespace, name)),
            }),
        }
    }
}

impl fmt::Debug for SymbolLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolLookup")
            .field("lookup", &(self.lookup as *const c_void))
            .finish()
    }
}
