//! Reference native components.
//!
//! These play the native library side of the boundary. Each component keeps
//! its objects in an [`ObjectTable`], exposes one fixed
//! `<namespace>_getsymbollookupmethod` entry point, and is otherwise reached
//! only through addresses in the process-wide [`registry`].

use std::ffi::{c_char, c_void, CStr};

pub mod buffer;
pub mod calculator;
pub mod error;
pub mod object;
pub mod primes;
pub mod registry;
pub mod zoo;

pub use error::{NativeError, NativeResult};
pub use object::{Entry, NativeObject, ObjectTable};

use crate::ffi::raw::{
    ClassTypeIdFn, GetLastErrorFn, GetVersionFn, InstanceFn, StatusCode, SymbolLookupFn,
    CABI_ERR_INVALID_PARAM, CABI_OK,
};
use crate::ffi::Handle;
use crate::types::Version;

/// A native component: its namespace, version, objects and exports.
pub trait NativeComponent: Sized + 'static {
    type Object: NativeObject;

    const NAMESPACE: &'static str;
    const VERSION: Version;

    fn objects() -> &'static ObjectTable<Self::Object>;

    /// Component-specific `(name, address)` pairs, including the entry point.
    fn exports() -> Vec<(&'static str, usize)>;

    /// All exports: the fixed cross-component operations and [`NativeComponent::exports`].
    fn all_exports() -> Vec<(&'static str, usize)> {
        let get_version: GetVersionFn = get_version::<Self>;
        let get_last_error: GetLastErrorFn = get_last_error::<Self>;
        let acquire: InstanceFn = acquire_instance::<Self>;
        let release: InstanceFn = release_instance::<Self>;
        let class_type_id: ClassTypeIdFn = class_type_id::<Self>;

        let mut exports = vec![
            ("getversion", get_version as usize),
            ("getlasterror", get_last_error as usize),
            ("acquireinstance", acquire as usize),
            ("releaseinstance", release as usize),
            ("base_classtypeid", class_type_id as usize),
        ];
        exports.extend(Self::exports());
        exports
    }
}

/// Out-parameter as a mutable reference.
pub(crate) unsafe fn out_param<'a, T>(ptr: *mut T) -> NativeResult<&'a mut T> {
    ptr.as_mut()
        .ok_or_else(|| NativeError::invalid_param("null out-parameter"))
}

/// NUL-terminated UTF-8 in-parameter.
pub(crate) unsafe fn in_str<'a>(ptr: *const c_char) -> NativeResult<&'a str> {
    if ptr.is_null() {
        return Err(NativeError::invalid_param("null string parameter"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| NativeError::invalid_param("string parameter is not UTF-8"))
}

/// Shared body of every `<namespace>_getsymbollookupmethod`.
pub(crate) unsafe fn symbol_lookup_method<C: NativeComponent>(
    address: *mut *mut c_void,
) -> StatusCode {
    if address.is_null() {
        return CABI_ERR_INVALID_PARAM;
    }
    registry::install::<C>();
    let lookup: SymbolLookupFn = registry::lookup_symbol;
    *address = lookup as *mut c_void;
    CABI_OK
}

unsafe extern "C" fn get_version<C: NativeComponent>(
    major: *mut u32,
    minor: *mut u32,
    micro: *mut u32,
) -> StatusCode {
    C::objects().guard(Handle::null(), || {
        *out_param(major)? = C::VERSION.major;
        *out_param(minor)? = C::VERSION.minor;
        *out_param(micro)? = C::VERSION.micro;
        Ok(())
    })
}

unsafe extern "C" fn get_last_error<C: NativeComponent>(
    handle: Handle,
    capacity: u32,
    needed: *mut u32,
    buffer: *mut c_char,
    has_error: *mut bool,
) -> StatusCode {
    // Not guarded: a failure here must not overwrite the error being read.
    let result = C::objects().last_error(handle).and_then(|message| {
        if !has_error.is_null() {
            *has_error = message.is_some();
        }
        buffer::write_string(message.as_deref().unwrap_or(""), capacity, needed, buffer)
    });
    match result {
        Ok(()) => CABI_OK,
        Err(err) => err.code,
    }
}

unsafe extern "C" fn acquire_instance<C: NativeComponent>(handle: Handle) -> StatusCode {
    C::objects().guard(handle, || C::objects().acquire(handle))
}

unsafe extern "C" fn release_instance<C: NativeComponent>(handle: Handle) -> StatusCode {
    C::objects().guard(handle, || C::objects().release(handle))
}

unsafe extern "C" fn class_type_id<C: NativeComponent>(
    handle: Handle,
    type_tag: *mut u64,
) -> StatusCode {
    C::objects().guard(handle, || {
        let entry = C::objects().get(handle)?;
        *out_param(type_tag)? = entry.type_tag().value();
        Ok(())
    })
}
