//! Error types for the cabi crate.

use thiserror::Error;

use crate::ffi::raw::{
    StatusCode, CABI_ERR_ABORTED, CABI_ERR_BUFFER_TOO_SMALL, CABI_ERR_DUPLICATE_SYMBOL,
    CABI_ERR_INCOMPATIBLE_VERSION, CABI_ERR_INVALID_CAST, CABI_ERR_INVALID_PARAM,
    CABI_ERR_NO_RESULT, CABI_ERR_SYMBOL_NOT_FOUND,
};
use crate::types::{TypeTag, Version};

/// Result type alias for cabi operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cabi operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Handle is null (placeholder wrapper) or was already released.
    #[error("invalid handle")]
    InvalidHandle,

    /// Function argument cannot be passed across the boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A boundary call returned a non-zero status.
    #[error("{component} Error {code}{}", detail(.message))]
    Native {
        /// Component name, e.g. `"Zoo"`.
        component: &'static str,
        /// Status code returned by the call.
        code: StatusCode,
        /// Message fetched from the component, if any.
        message: Option<String>,
    },

    /// The required buffer size kept growing between the size query and the fill.
    #[error("buffer size changed on every attempt ({attempts} attempts)")]
    CapacityRace {
        /// Number of attempts made.
        attempts: usize,
    },

    /// A handle resolved to a type incompatible with the requested wrapper.
    #[error("invalid cast: {actual} is not a {expected}")]
    InvalidCast {
        /// Requested wrapper type.
        expected: &'static str,
        /// Type tag reported for the object.
        actual: TypeTag,
    },

    /// The native binary is not compatible with these bindings.
    #[error("{component} binary version {native} is incompatible with bindings {binding}")]
    IncompatibleVersion {
        /// Component name.
        component: &'static str,
        /// Version reported by the native side.
        native: Version,
        /// Version the bindings were written against.
        binding: Version,
    },

    /// No symbol is registered under the name.
    #[error("symbol not found: {namespace}::{name}")]
    SymbolNotFound {
        /// Symbol namespace.
        namespace: String,
        /// Symbol name.
        name: String,
    },

    /// A symbol is already registered under the name.
    #[error("duplicate symbol: {namespace}::{name}")]
    DuplicateSymbol {
        /// Symbol namespace.
        namespace: String,
        /// Symbol name.
        name: String,
    },

    /// A string payload was not valid UTF-8.
    #[error("invalid string: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(" ({})", message),
        None => String::new(),
    }
}

impl Error {
    /// The status code this error corresponds to, if any.
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            Error::InvalidHandle | Error::InvalidArgument(_) => Some(CABI_ERR_INVALID_PARAM),
            Error::Native { code, .. } => Some(*code),
            Error::CapacityRace { .. } => Some(CABI_ERR_BUFFER_TOO_SMALL),
            Error::InvalidCast { .. } => Some(CABI_ERR_INVALID_CAST),
            Error::IncompatibleVersion { .. } => Some(CABI_ERR_INCOMPATIBLE_VERSION),
            Error::SymbolNotFound { .. } => Some(CABI_ERR_SYMBOL_NOT_FOUND),
            Error::DuplicateSymbol { .. } => Some(CABI_ERR_DUPLICATE_SYMBOL),
            Error::InvalidString(_) => None,
        }
    }

    /// The message fetched from the component, if this is a boundary failure.
    pub fn native_message(&self) -> Option<&str> {
        match self {
            Error::Native { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Check if this error came back from a boundary call.
    pub fn is_native(&self) -> bool {
        matches!(self, Error::Native { .. })
    }

    /// Check if this is a type mismatch, on either side of the boundary.
    pub fn is_invalid_cast(&self) -> bool {
        self.code() == Some(CABI_ERR_INVALID_CAST)
    }

    /// Check if the component had no result to return.
    pub fn is_no_result(&self) -> bool {
        self.code() == Some(CABI_ERR_NO_RESULT)
    }

    /// Check if a calculation was aborted from a progress callback.
    pub fn is_aborted(&self) -> bool {
        self.code() == Some(CABI_ERR_ABORTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        let err = Error::Native {
            component: "Calculator",
            code: 2,
            message: Some("initial value must be finite".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Calculator Error 2 (initial value must be finite)"
        );

        let bare = Error::Native {
            component: "Zoo",
            code: 5,
            message: None,
        };
        assert_eq!(bare.to_string(), "Zoo Error 5");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidHandle.code(), Some(CABI_ERR_INVALID_PARAM));
        assert!(Error::InvalidCast {
            expected: "Zoo::Tiger",
            actual: TypeTag::new(1),
        }
        .is_invalid_cast());
        assert!(Error::Native {
            component: "Primes",
            code: CABI_ERR_ABORTED,
            message: None,
        }
        .is_aborted());
        assert!(!Error::CapacityRace { attempts: 4 }.is_native());
    }
}
