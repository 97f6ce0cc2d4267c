//! Two-call buffer exchange for variable-length outputs.
//!
//! Every variable-length out-parameter follows the same shape: call once with
//! capacity 0 to learn the required element count, allocate exactly that,
//! call again to fill. The count reported by the second call is
//! authoritative. If it grew past the allocation the exchange starts over;
//! if it shrank the result is truncated to it.

use std::ffi::c_char;
use std::ptr;

use crate::error::{Error, Result};

/// Fetch an array of `T` through the two-call protocol.
///
/// `fill(capacity, needed, buffer)` performs one boundary call. It is called
/// with `capacity == 0` and a null buffer for the size query.
pub fn fetch_array<T, F>(max_attempts: usize, mut fill: F) -> Result<Vec<T>>
where
    T: Copy + Default,
    F: FnMut(u64, &mut u64, *mut T) -> Result<()>,
{
    let attempts = max_attempts.max(1);

    for attempt in 1..=attempts {
        let mut required = 0u64;
        fill(0, &mut required, ptr::null_mut())?;
        if required == 0 {
            return Ok(Vec::new());
        }

        let len = usize::try_from(required).map_err(|_| {
            Error::InvalidArgument(format!("buffer of {} elements does not fit", required))
        })?;
        let mut buffer = vec![T::default(); len];

        let mut reported = 0u64;
        fill(required, &mut reported, buffer.as_mut_ptr())?;

        if reported <= required {
            // reported <= len, so the cast cannot truncate
            buffer.truncate(reported as usize);
            log::trace!("fetched {} elements", reported);
            return Ok(buffer);
        }

        log::debug!(
            "required size grew from {} to {} elements (attempt {}/{})",
            required,
            reported,
            attempt,
            attempts
        );
    }

    Err(Error::CapacityRace { attempts })
}

/// Fetch a UTF-8 string through the two-call protocol.
///
/// Sizes are counted in bytes and include the trailing NUL the callee
/// appends. Trailing NUL bytes are trimmed from the result.
pub fn fetch_string<F>(max_attempts: usize, mut fill: F) -> Result<String>
where
    F: FnMut(u32, &mut u32, *mut c_char) -> Result<()>,
{
    let mut bytes = fetch_array::<u8, _>(max_attempts, |capacity, needed, buffer| {
        let capacity = u32::try_from(capacity).map_err(|_| {
            Error::InvalidArgument(format!("string of {} bytes is too long", capacity))
        })?;
        let mut reported = 0u32;
        fill(capacity, &mut reported, buffer.cast::<c_char>())?;
        *needed = u64::from(reported);
        Ok(())
    })?;

    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simulates a callee serving `data`, following the fill rules.
    fn serve<T: Copy>(data: &[T], capacity: u64, needed: &mut u64, buffer: *mut T) {
        *needed = data.len() as u64;
        let count = (capacity as usize).min(data.len());
        if count > 0 {
            unsafe { ptr::copy_nonoverlapping(data.as_ptr(), buffer, count) };
        }
    }

    #[test]
    fn test_fetch_exact() {
        let data = [2u64, 3, 5, 7, 11];
        let mut calls = Vec::new();
        let result = fetch_array(4, |capacity, needed, buffer| {
            calls.push(capacity);
            serve(&data, capacity, needed, buffer);
            Ok(())
        })
        .expect("fetch should succeed");

        assert_eq!(result, data);
        assert_eq!(calls, vec![0, 5], "expected one size query and one fill");
    }

    #[test]
    fn test_fetch_empty_skips_fill() {
        let mut calls = 0;
        let result: Vec<u32> = fetch_array(4, |capacity, needed, _| {
            calls += 1;
            assert_eq!(capacity, 0);
            *needed = 0;
            Ok(())
        })
        .expect("fetch should succeed");

        assert!(result.is_empty());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_fetch_retries_when_source_grows() {
        let mut source = vec![1u32, 2, 3];
        let mut fills = 0;
        let result = fetch_array(4, |capacity, needed, buffer| {
            if capacity > 0 {
                fills += 1;
                if fills == 1 {
                    // grows between the size query and the fill
                    source.push(4);
                }
            }
            serve(&source, capacity, needed, buffer);
            Ok(())
        })
        .expect("fetch should succeed after a retry");

        assert_eq!(result, vec![1, 2, 3, 4]);
        assert_eq!(fills, 2);
    }

    #[test]
    fn test_fetch_truncates_when_source_shrinks() {
        let mut source = vec![9u8, 8, 7];
        let result = fetch_array(4, |capacity, needed, buffer| {
            if capacity > 0 {
                source.pop();
            }
            serve(&source, capacity, needed, buffer);
            Ok(())
        })
        .expect("fetch should succeed");

        assert_eq!(result, vec![9, 8]);
    }

    #[test]
    fn test_fetch_gives_up_after_attempts() {
        let mut source: Vec<u16> = vec![1];
        let err = fetch_array(3, |capacity, needed, buffer| {
            if capacity > 0 {
                source.push(0);
            }
            serve(&source, capacity, needed, buffer);
            Ok(())
        })
        .expect_err("a source that always grows should fail");

        assert!(matches!(err, Error::CapacityRace { attempts: 3 }));
    }

    #[test]
    fn test_fetch_propagates_call_errors() {
        let err = fetch_array::<u8, _>(4, |_, _, _| Err(Error::InvalidHandle))
            .expect_err("errors should propagate");
        assert!(matches!(err, Error::InvalidHandle));
    }

    #[test]
    fn test_fetch_string_trims_sentinel() {
        let text = b"Gerald\0";
        let result = fetch_string(4, |capacity, needed, buffer| {
            let mut wide = 0u64;
            serve(text, u64::from(capacity), &mut wide, buffer.cast::<u8>());
            *needed = wide as u32;
            Ok(())
        })
        .expect("fetch should succeed");

        assert_eq!(result, "Gerald");
        assert_eq!(result.len(), 6, "last byte must not be lost");
    }

    #[test]
    fn test_fetch_string_rejects_invalid_utf8() {
        let text = [0xFFu8, 0xFE, 0];
        let err = fetch_string(4, |capacity, needed, buffer| {
            let mut wide = 0u64;
            serve(&text, u64::from(capacity), &mut wide, buffer.cast::<u8>());
            *needed = wide as u32;
            Ok(())
        })
        .expect_err("invalid UTF-8 should fail");

        assert!(matches!(err, Error::InvalidString(_)));
    }
}
