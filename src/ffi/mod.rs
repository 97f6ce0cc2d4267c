//! Low-level ABI definitions.
//!
//! This module contains the raw boundary types and the function table every
//! component shares. Users should prefer the wrappers in the component
//! modules.

pub mod error;
pub mod handles;
pub mod raw;
pub mod table;

pub use error::{check_status, fetch_last_error};
pub use handles::*;
pub use raw::*;
pub use table::BaseTable;
