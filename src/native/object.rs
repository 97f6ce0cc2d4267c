//! Reference-counted object table of a native component.
//!
//! Every live object has a slot with its reference count. Counts change only
//! under the table lock. When a count reaches zero the slot is removed, and
//! the handles the object co-owns are released after the lock is dropped.
//! Handle values come from one process-wide counter and are never reused.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::{NativeError, NativeResult};
use crate::ffi::{Handle, StatusCode, CABI_ERR_GENERIC, CABI_OK};
use crate::types::TypeTag;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Errors of calls that had no live object to attach them to, per component.
    static GLOBAL_ERRORS: RefCell<BTreeMap<&'static str, String>> =
        const { RefCell::new(BTreeMap::new()) };
}

/// An object stored in an [`ObjectTable`].
pub trait NativeObject: Send + Sync + 'static {
    fn type_tag(&self) -> TypeTag;

    /// Handles this object holds a reference to.
    fn owned_handles(&self) -> Vec<Handle> {
        Vec::new()
    }
}

/// A live object and its last error.
pub struct Entry<O> {
    object: O,
    last_error: Mutex<Option<String>>,
}

impl<O> Deref for Entry<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.object
    }
}

struct Slot<O> {
    refcount: u32,
    entry: Arc<Entry<O>>,
}

pub struct ObjectTable<O> {
    component: &'static str,
    slots: Mutex<BTreeMap<Handle, Slot<O>>>,
}

pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic in native call".to_string()
    }
}

impl<O> ObjectTable<O> {
    pub const fn new(component: &'static str) -> Self {
        Self {
            component,
            slots: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<O: NativeObject> ObjectTable<O> {
    /// Name used in diagnostics, e.g. `"Zoo"`.
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Store a new object with a reference count of 1.
    pub fn insert(&self, object: O) -> Handle {
        let handle = Handle::from_raw(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(Entry {
            object,
            last_error: Mutex::new(None),
        });
        lock_state(&self.slots).insert(handle, Slot { refcount: 1, entry });
        log::trace!("{}: created handle {}", self.component, handle.as_raw());
        handle
    }

    pub fn get(&self, handle: Handle) -> NativeResult<Arc<Entry<O>>> {
        if handle.is_null() {
            return Err(NativeError::invalid_param("null handle"));
        }
        lock_state(&self.slots)
            .get(&handle)
            .map(|slot| Arc::clone(&slot.entry))
            .ok_or_else(|| {
                NativeError::invalid_param(format!("unknown handle {}", handle.as_raw()))
            })
    }

    pub fn acquire(&self, handle: Handle) -> NativeResult<()> {
        let mut slots = lock_state(&self.slots);
        let slot = slots
            .get_mut(&handle)
            .ok_or_else(|| NativeError::invalid_param(format!("unknown handle {}", handle.as_raw())))?;
        slot.refcount = slot
            .refcount
            .checked_add(1)
            .ok_or_else(|| NativeError::generic("reference count overflow"))?;
        Ok(())
    }

    /// Drop one reference. Releasing the null handle is a no-op.
    pub fn release(&self, handle: Handle) -> NativeResult<()> {
        if handle.is_null() {
            return Ok(());
        }

        let destroyed = {
            let mut slots = lock_state(&self.slots);
            let slot = slots.get_mut(&handle).ok_or_else(|| {
                NativeError::invalid_param(format!("unknown handle {}", handle.as_raw()))
            })?;
            slot.refcount -= 1;
            if slot.refcount == 0 {
                slots.remove(&handle).map(|slot| slot.entry)
            } else {
                None
            }
        };

        if let Some(entry) = destroyed {
            log::debug!("{}: destroyed handle {}", self.component, handle.as_raw());
            for owned in entry.object.owned_handles() {
                if let Err(err) = self.release(owned) {
                    log::warn!(
                        "{}: releasing handle {} owned by {} failed: {}",
                        self.component,
                        owned.as_raw(),
                        handle.as_raw(),
                        err
                    );
                }
            }
        }
        Ok(())
    }

    /// Current reference count, or `None` once the object is destroyed.
    pub fn reference_count(&self, handle: Handle) -> Option<u32> {
        lock_state(&self.slots).get(&handle).map(|slot| slot.refcount)
    }

    /// Record a failure on the object, or in the calling thread's global slot
    /// if `handle` names no live object.
    pub fn record_error(&self, handle: Handle, message: &str) {
        match self.get(handle) {
            Ok(entry) => *lock_state(&entry.last_error) = Some(message.to_string()),
            Err(_) => GLOBAL_ERRORS.with(|errors| {
                errors
                    .borrow_mut()
                    .insert(self.component, message.to_string());
            }),
        }
    }

    /// The last recorded failure. The null handle reads the global slot.
    pub fn last_error(&self, handle: Handle) -> NativeResult<Option<String>> {
        if handle.is_null() {
            return Ok(GLOBAL_ERRORS.with(|errors| errors.borrow().get(self.component).cloned()));
        }
        let entry = self.get(handle)?;
        let message = lock_state(&entry.last_error).clone();
        Ok(message)
    }

    /// Run one exported operation and turn its outcome into a status code.
    ///
    /// Failures, panics included, are recorded against `handle`.
    pub fn guard<F>(&self, handle: Handle, op: F) -> StatusCode
    where
        F: FnOnce() -> NativeResult<()>,
    {
        let result = panic::catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|payload| {
            Err(NativeError::new(CABI_ERR_GENERIC, panic_message(payload)))
        });

        match result {
            Ok(()) => CABI_OK,
            Err(err) => {
                log::debug!("{}: call failed with {}: {}", self.component, err.code, err);
                self.record_error(handle, &err.message);
                err.code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        children: Vec<Handle>,
    }

    impl NativeObject for Node {
        fn type_tag(&self) -> TypeTag {
            TypeTag::from_qualified_name("Test::Node")
        }

        fn owned_handles(&self) -> Vec<Handle> {
            self.children.clone()
        }
    }

    #[test]
    fn test_acquire_release_counts() {
        let table = ObjectTable::new("Test");
        let h = table.insert(Node { children: vec![] });
        assert_eq!(table.reference_count(h), Some(1));

        table.acquire(h).expect("acquire should succeed");
        assert_eq!(table.reference_count(h), Some(2));

        table.release(h).expect("release should succeed");
        assert_eq!(table.reference_count(h), Some(1));

        table.release(h).expect("release should succeed");
        assert_eq!(table.reference_count(h), None);
        assert!(table.get(h).is_err(), "destroyed handle must be invalid");
    }

    #[test]
    fn test_destroy_releases_owned_handles() {
        let table = ObjectTable::new("Test");
        let child = table.insert(Node { children: vec![] });
        table.acquire(child).expect("acquire should succeed");
        let parent = table.insert(Node {
            children: vec![child],
        });

        table.release(parent).expect("release should succeed");
        assert_eq!(table.reference_count(child), Some(1));
        table.release(child).expect("release should succeed");
        assert_eq!(table.reference_count(child), None);
    }

    #[test]
    fn test_handles_are_not_reused() {
        let table = ObjectTable::new("Test");
        let first = table.insert(Node { children: vec![] });
        table.release(first).expect("release should succeed");
        let second = table.insert(Node { children: vec![] });
        assert_ne!(first, second);
    }

    #[test]
    fn test_null_release_is_noop() {
        let table: ObjectTable<Node> = ObjectTable::new("Test");
        table.release(Handle::null()).expect("null release is a no-op");
    }

    #[test]
    fn test_guard_records_errors() {
        let table = ObjectTable::new("Test");
        let h = table.insert(Node { children: vec![] });
        assert_eq!(table.last_error(h).expect("query should succeed"), None);

        let status = table.guard(h, || Err(NativeError::invalid_param("bad value")));
        assert_eq!(status, crate::ffi::CABI_ERR_INVALID_PARAM);
        assert_eq!(
            table.last_error(h).expect("query should succeed").as_deref(),
            Some("bad value")
        );

        let status = table.guard(Handle::null(), || panic!("boom"));
        assert_eq!(status, CABI_ERR_GENERIC);
        assert_eq!(
            table
                .last_error(Handle::null())
                .expect("query should succeed")
                .as_deref(),
            Some("boom")
        );
    }
}
