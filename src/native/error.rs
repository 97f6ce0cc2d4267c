//! Errors raised inside native component functions.

use thiserror::Error;

use crate::ffi::raw::{
    StatusCode, CABI_ERR_ABORTED, CABI_ERR_GENERIC, CABI_ERR_INVALID_CAST, CABI_ERR_INVALID_PARAM,
    CABI_ERR_NO_RESULT, CABI_ERR_SYMBOL_NOT_FOUND,
};

/// A failure to be reported through a status code and the last-error slot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NativeError {
    pub code: StatusCode,
    pub message: String,
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

impl NativeError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(CABI_ERR_INVALID_PARAM, message)
    }

    pub fn invalid_cast(message: impl Into<String>) -> Self {
        Self::new(CABI_ERR_INVALID_CAST, message)
    }

    pub fn no_result(message: impl Into<String>) -> Self {
        Self::new(CABI_ERR_NO_RESULT, message)
    }

    pub fn aborted() -> Self {
        Self::new(CABI_ERR_ABORTED, "calculation aborted")
    }

    pub fn symbol_not_found(namespace: &str, name: &str) -> Self {
        Self::new(
            CABI_ERR_SYMBOL_NOT_FOUND,
            format!("no symbol registered as {}::{}", namespace, name),
        )
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(CABI_ERR_GENERIC, message)
    }
}
