//! Raw ABI definitions shared by every component.
//!
//! Every boundary function returns a [`StatusCode`]. Functions are never
//! linked directly; they are resolved by `(namespace, name)` through the
//! component's symbol lookup method.

use std::ffi::{c_char, c_void};

use super::handles::Handle;

/// Result of every boundary call. Zero is success.
pub type StatusCode = i32;

// Status codes
pub const CABI_OK: StatusCode = 0;
pub const CABI_ERR_NOT_IMPLEMENTED: StatusCode = 1;
pub const CABI_ERR_INVALID_PARAM: StatusCode = 2;
pub const CABI_ERR_INVALID_CAST: StatusCode = 3;
pub const CABI_ERR_BUFFER_TOO_SMALL: StatusCode = 4;
pub const CABI_ERR_GENERIC: StatusCode = 5;
pub const CABI_ERR_COULD_NOT_LOAD_LIBRARY: StatusCode = 6;
pub const CABI_ERR_SYMBOL_NOT_FOUND: StatusCode = 7;
pub const CABI_ERR_INCOMPATIBLE_VERSION: StatusCode = 8;
pub const CABI_ERR_NO_RESULT: StatusCode = 9;
pub const CABI_ERR_ABORTED: StatusCode = 10;
pub const CABI_ERR_DUPLICATE_SYMBOL: StatusCode = 11;

/// Namespace of the lookup and registration functions themselves.
pub const ABI_NAMESPACE: &str = "abi";

/// `getversion(major*, minor*, micro*)`
pub type GetVersionFn = unsafe extern "C" fn(*mut u32, *mut u32, *mut u32) -> StatusCode;

/// `getlasterror(handle, capacity, needed*, buffer*, has_error*)`
pub type GetLastErrorFn =
    unsafe extern "C" fn(Handle, u32, *mut u32, *mut c_char, *mut bool) -> StatusCode;

/// `acquireinstance(handle)` / `releaseinstance(handle)`
pub type InstanceFn = unsafe extern "C" fn(Handle) -> StatusCode;

/// `base_classtypeid(handle, tag*)`
pub type ClassTypeIdFn = unsafe extern "C" fn(Handle, *mut u64) -> StatusCode;

/// The one fixed entry point of a component.
pub type GetSymbolLookupMethodFn = unsafe extern "C" fn(*mut *mut c_void) -> StatusCode;

/// `lookupsymbol(namespace, name, address*)`
pub type SymbolLookupFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *mut *mut c_void) -> StatusCode;

/// `registersymbol(namespace, name, address)`
pub type RegisterSymbolFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void) -> StatusCode;

/// Progress callback: `(progress, should_abort*)`.
pub type ProgressCallback = Option<unsafe extern "C" fn(f32, *mut bool)>;

/// Extension callable applied by the calculator component.
pub type UnaryFn = unsafe extern "C" fn(f64) -> f64;
