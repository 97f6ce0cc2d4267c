//! Status code checking and last-error retrieval.

use super::handles::Handle;
use super::raw::{StatusCode, CABI_OK};
use super::table::BaseTable;
use crate::buffer::fetch_string;
use crate::error::{Error, Result};

/// Fetch the last error message recorded for `handle`.
///
/// A null handle asks for the calling thread's component-level error.
/// Returns `Ok(None)` when nothing is recorded.
pub fn fetch_last_error(base: &BaseTable, handle: Handle) -> Result<Option<String>> {
    let mut has_error = false;
    let message = fetch_string(base.options().fetch_attempts, |capacity, needed, buffer| {
        let status =
            unsafe { (base.get_last_error)(handle, capacity, needed, buffer, &mut has_error) };
        if status == CABI_OK {
            Ok(())
        } else {
            Err(Error::Native {
                component: base.component(),
                code: status,
                message: None,
            })
        }
    })?;

    Ok(has_error.then_some(message))
}

/// Check a status code and convert to Result.
///
/// On failure the message is fetched from the component. If that fetch
/// fails too, the error carries only the component name and the code.
pub fn check_status(base: &BaseTable, handle: Handle, status: StatusCode) -> Result<()> {
    if status == CABI_OK {
        return Ok(());
    }

    let message = match fetch_last_error(base, handle) {
        Ok(message) => message,
        Err(err) => {
            log::warn!(
                "could not fetch {} error message for status {}: {}",
                base.component(),
                status,
                err
            );
            None
        }
    };

    Err(Error::Native {
        component: base.component(),
        code: status,
        message,
    })
}
