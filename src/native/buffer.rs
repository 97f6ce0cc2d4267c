//! Callee side of the two-call buffer exchange.

use std::ffi::c_char;
use std::ptr;

use super::error::{NativeError, NativeResult};

/// Serve `data` to a caller.
///
/// Writes `min(capacity, data.len())` elements and always reports the full
/// length through `needed`. A zero capacity writes nothing.
///
/// # Safety
///
/// `needed` must be null or writable; `buffer` must be null or valid for
/// `capacity` writes of `T`.
pub unsafe fn write_array<T: Copy>(
    data: &[T],
    capacity: u64,
    needed: *mut u64,
    buffer: *mut T,
) -> NativeResult<()> {
    if capacity > 0 && buffer.is_null() {
        return Err(NativeError::invalid_param("null buffer with non-zero capacity"));
    }
    if needed.is_null() && buffer.is_null() {
        return Err(NativeError::invalid_param("no size or buffer out-parameter"));
    }

    let required = data.len() as u64;
    if !needed.is_null() {
        *needed = required;
    }
    if capacity > 0 {
        let count = capacity.min(required) as usize;
        ptr::copy_nonoverlapping(data.as_ptr(), buffer, count);
    }
    Ok(())
}

/// Serve a string with a trailing NUL. Sizes are in bytes and include the NUL.
///
/// # Safety
///
/// Same contract as [`write_array`].
pub unsafe fn write_string(
    value: &str,
    capacity: u32,
    needed: *mut u32,
    buffer: *mut c_char,
) -> NativeResult<()> {
    let mut bytes = Vec::with_capacity(value.len() + 1);
    bytes.extend_from_slice(value.as_bytes());
    bytes.push(0u8);

    let required = u32::try_from(bytes.len())
        .map_err(|_| NativeError::invalid_param("string too long for the boundary"))?;

    let mut wide = 0u64;
    let needed_wide = if needed.is_null() {
        ptr::null_mut()
    } else {
        &mut wide as *mut u64
    };
    write_array(&bytes, u64::from(capacity), needed_wide, buffer.cast::<u8>())?;
    if !needed.is_null() {
        *needed = required;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_query_writes_nothing() {
        let data = [1u64, 2, 3];
        let mut needed = 0u64;
        unsafe { write_array(&data, 0, &mut needed, ptr::null_mut()) }
            .expect("size query should succeed");
        assert_eq!(needed, 3);
    }

    #[test]
    fn test_short_capacity_fills_partially() {
        let data = [1u64, 2, 3, 4];
        let mut buffer = [0u64; 2];
        let mut needed = 0u64;
        unsafe { write_array(&data, 2, &mut needed, buffer.as_mut_ptr()) }
            .expect("partial fill should succeed");
        assert_eq!(buffer, [1, 2]);
        assert_eq!(needed, 4, "the true length must still be reported");
    }

    #[test]
    fn test_exact_capacity_fills_everything() {
        let data = [7u32, 8, 9];
        let mut buffer = [0u32; 3];
        let mut needed = 0u64;
        unsafe { write_array(&data, 3, &mut needed, buffer.as_mut_ptr()) }
            .expect("fill should succeed");
        assert_eq!(buffer, data);
        assert_eq!(needed, 3);
    }

    #[test]
    fn test_null_buffer_with_capacity_is_rejected() {
        let err = unsafe { write_array(&[1u8], 4, ptr::null_mut(), ptr::null_mut()) }
            .expect_err("null buffer should be rejected");
        assert_eq!(err.code, crate::ffi::CABI_ERR_INVALID_PARAM);
    }

    #[test]
    fn test_string_includes_sentinel() {
        let mut needed = 0u32;
        unsafe { write_string("Tony", 0, &mut needed, ptr::null_mut()) }
            .expect("size query should succeed");
        assert_eq!(needed, 5);

        let mut buffer = [0x55 as c_char; 5];
        unsafe { write_string("Tony", 5, &mut needed, buffer.as_mut_ptr()) }
            .expect("fill should succeed");
        let bytes: Vec<u8> = buffer.iter().map(|&b| b as u8).collect();
        assert_eq!(bytes, b"Tony\0");
    }
}
