//! Owned and borrowed references to native objects.

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::sync::Arc;

use crate::dispatch::{Class, Component};
use crate::error::{Error, Result};
use crate::ffi::{check_status, fetch_last_error, Handle, StatusCode};
use crate::types::TypeTag;

/// One owned reference to a native object.
///
/// The reference is released exactly once: on drop, or earlier through
/// [`Instance::release`]. An instance over a null handle is a placeholder;
/// its operations fail with [`Error::InvalidHandle`] and dropping it does
/// nothing.
pub struct Instance<C: Component> {
    handle: Handle,
    library: Arc<C>,
}

impl<C: Component> Instance<C> {
    /// Adopt one reference to `handle`.
    pub(crate) fn new(library: Arc<C>, handle: Handle) -> Self {
        Self { handle, library }
    }

    /// The raw handle. Null once released.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Check if this is a placeholder or an already released instance.
    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// The component library this object belongs to.
    pub fn library(&self) -> &Arc<C> {
        &self.library
    }

    pub(crate) fn handle_checked(&self) -> Result<Handle> {
        if self.handle.is_null() {
            return Err(Error::InvalidHandle);
        }
        Ok(self.handle)
    }

    /// Convert the status of a call made on this object.
    pub(crate) fn check(&self, status: StatusCode) -> Result<()> {
        check_status(self.library.base(), self.handle, status)
    }

    /// The last error recorded on this object, if any.
    pub fn last_error(&self) -> Result<Option<String>> {
        let handle = self.handle_checked()?;
        fetch_last_error(self.library.base(), handle)
    }

    /// Query the concrete type of the object.
    pub fn class_type_id(&self) -> Result<TypeTag> {
        self.library.base().class_type_id(self.handle_checked()?)
    }

    /// Take one more reference to the same object.
    pub fn acquire(&self) -> Result<Self> {
        let handle = self.handle_checked()?;
        let status = unsafe { (self.library.base().acquire_instance)(handle) };
        self.check(status)?;
        log::trace!("acquired {} handle {}", C::NAMESPACE, handle.as_raw());
        Ok(Self::new(Arc::clone(&self.library), handle))
    }

    /// Release the reference now.
    ///
    /// The handle is nulled first, so the later drop is a no-op. Releasing a
    /// placeholder is a no-op.
    pub fn release(&mut self) -> Result<()> {
        let handle = mem::replace(&mut self.handle, Handle::null());
        if handle.is_null() {
            return Ok(());
        }

        let status = unsafe { (self.library.base().release_instance)(handle) };
        log::trace!("released {} handle {}", C::NAMESPACE, handle.as_raw());
        // The handle may be gone now; its error lands in the global slot.
        check_status(self.library.base(), Handle::null(), status)
    }

    /// Give up the reference without releasing it.
    pub(crate) fn detach(mut self) -> Handle {
        mem::replace(&mut self.handle, Handle::null())
    }
}

impl<C: Component> Drop for Instance<C> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("failed to release {} object: {}", C::NAMESPACE, err);
        }
    }
}

impl<C: Component> fmt::Debug for Instance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("component", &self.library.base().component())
            .field("handle", &self.handle)
            .finish()
    }
}

/// A wrapper lent by another object, valid while the lender is borrowed.
///
/// Dropping it does not release anything. Use [`Borrowed::acquire`] to keep
/// the object beyond the borrow.
pub struct Borrowed<'a, T: Class> {
    inner: ManuallyDrop<T>,
    _lender: PhantomData<&'a ()>,
}

impl<'a, T: Class> Borrowed<'a, T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner: ManuallyDrop::new(inner),
            _lender: PhantomData,
        }
    }

    /// Take an owned reference to the borrowed object.
    pub fn acquire(&self) -> Result<T> {
        let instance = self.inner.instance().acquire()?;
        Ok(T::from_instance(instance))
    }
}

impl<'a, T: Class> Deref for Borrowed<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<'a, T: Class> Drop for Borrowed<'a, T> {
    fn drop(&mut self) {
        // SAFETY: `inner` is not used again after this.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        inner.into_instance().detach();
    }
}

impl<'a, T: Class + fmt::Debug> fmt::Debug for Borrowed<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Borrowed").field(&*self.inner).finish()
    }
}
