//! Handle types for opaque references to native objects.
//!
//! A [`Handle`] is a plain 64-bit value passed by value across the boundary.
//! Zero is reserved for "absent" and never names a live object.

use crate::types::TypeTag;

/// Opaque handle to a native object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Handle(u64);

impl Handle {
    /// Create a null handle.
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Wrap a raw handle value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    #[inline]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Check if this handle is null (zero).
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Handle with the type tag of its object carried inline.
///
/// Only the callee writes a fat handle (through an out-pointer). The tag is a
/// cache valid right after the producing call; a zero tag means the callee
/// did not fill it in and it has to be queried.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FatHandle {
    handle: Handle,
    type_tag: u64,
}

impl FatHandle {
    /// Create a null fat handle.
    #[inline]
    pub const fn null() -> Self {
        Self {
            handle: Handle::null(),
            type_tag: 0,
        }
    }

    #[inline]
    pub(crate) const fn new(handle: Handle, type_tag: TypeTag) -> Self {
        Self {
            handle,
            type_tag: type_tag.value(),
        }
    }

    /// The object handle.
    #[inline]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// The cached type tag, if the callee provided one.
    #[inline]
    pub const fn type_tag(&self) -> Option<TypeTag> {
        if self.type_tag == 0 {
            None
        } else {
            Some(TypeTag::new(self.type_tag))
        }
    }

    /// Check if the wrapped handle is null.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.handle.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        assert!(Handle::null().is_null());
        assert!(Handle::default().is_null());
        assert!(!Handle::from_raw(7).is_null());
        assert_eq!(Handle::from_raw(7), Handle::from_raw(7));
        assert_ne!(Handle::from_raw(7), Handle::from_raw(8));

        let fat = FatHandle::null();
        assert!(fat.is_null());
        assert_eq!(fat.type_tag(), None);
    }

    #[test]
    fn test_fat_handle_carries_tag() {
        let tag = TypeTag::new(0x6A71_D9E1_F3AF_A2F4);
        let fat = FatHandle::new(Handle::from_raw(3), tag);
        assert_eq!(fat.handle(), Handle::from_raw(3));
        assert_eq!(fat.type_tag(), Some(tag));
    }

    #[test]
    fn test_layout_matches_abi() {
        assert_eq!(std::mem::size_of::<Handle>(), 8);
        assert_eq!(std::mem::size_of::<FatHandle>(), 16);
    }
}
