//! Run-time type identification and polymorphic wrapper construction.
//!
//! Each component has a closed table mapping type tags of its concrete
//! classes to wrapper constructors ([`Component::dispatch`]). The generic
//! factory [`resolve`] turns a handle returned by a boundary call into the
//! wrapper the caller asked for:
//!
//! - a null handle gives a placeholder `T`;
//! - a known tag gives the concrete wrapper, cast to `T` if compatible, or
//!   [`Error::InvalidCast`] if not;
//! - an unknown tag gives `T` itself, so types added to the native side
//!   later degrade to the interface the caller asked for.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ffi::{BaseTable, FatHandle, Handle};
use crate::instance::{Borrowed, Instance};
use crate::types::TypeTag;

/// A loaded native component.
pub trait Component: Sized + Send + Sync + 'static {
    /// Untyped union of the component's concrete wrappers.
    type Object: Object<Component = Self>;

    /// Symbol namespace, e.g. `"zoo"`.
    const NAMESPACE: &'static str;

    /// The fixed cross-component operations.
    fn base(&self) -> &BaseTable;

    /// Build the concrete wrapper for `tag`, or hand the instance back if the
    /// tag is not a known concrete class.
    fn dispatch(
        tag: TypeTag,
        instance: Instance<Self>,
    ) -> std::result::Result<Self::Object, Instance<Self>>;
}

/// A host wrapper class.
pub trait Class: Sized {
    type Component: Component;

    /// Fully-qualified name, e.g. `"Zoo::Tiger"`.
    const NAME: &'static str;

    /// Tag of the class, derived from [`Class::NAME`].
    const TYPE_TAG: TypeTag;

    /// Wrap an instance without checking its type.
    fn from_instance(instance: Instance<Self::Component>) -> Self;

    fn instance(&self) -> &Instance<Self::Component>;

    fn into_instance(self) -> Instance<Self::Component>;

    /// Convert a concrete wrapper to this class if it is one, else give it back.
    fn from_object(
        object: <Self::Component as Component>::Object,
    ) -> std::result::Result<Self, <Self::Component as Component>::Object>;

    /// The handle of the wrapped object. Null for placeholders.
    fn handle(&self) -> Handle {
        self.instance().handle()
    }

    /// Check if this wrapper is a placeholder.
    fn is_null(&self) -> bool {
        self.instance().is_null()
    }
}

/// Union of a component's concrete wrappers.
pub trait Object: Sized {
    type Component: Component;

    fn type_tag(&self) -> TypeTag;

    fn into_instance(self) -> Instance<Self::Component>;
}

/// A handle as it came back from a boundary call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Type tag must be queried.
    Bare(Handle),
    /// Type tag cached by the callee.
    Fat(FatHandle),
}

impl RawHandle {
    pub fn handle(&self) -> Handle {
        match self {
            RawHandle::Bare(handle) => *handle,
            RawHandle::Fat(fat) => fat.handle(),
        }
    }

    pub fn cached_tag(&self) -> Option<TypeTag> {
        match self {
            RawHandle::Bare(_) => None,
            RawHandle::Fat(fat) => fat.type_tag(),
        }
    }
}

impl From<Handle> for RawHandle {
    fn from(handle: Handle) -> Self {
        RawHandle::Bare(handle)
    }
}

impl From<FatHandle> for RawHandle {
    fn from(fat: FatHandle) -> Self {
        RawHandle::Fat(fat)
    }
}

/// Result of [`classify`].
pub enum Resolved<C: Component> {
    /// The most-derived known wrapper.
    Known(C::Object),
    /// The tag matched no known class.
    Unknown(Instance<C>),
}

type Resolution<T> = std::result::Result<T, (Error, Instance<<T as Class>::Component>)>;

fn resolve_instance<T: Class>(
    instance: Instance<T::Component>,
    cached: Option<TypeTag>,
) -> Resolution<T> {
    if instance.is_null() {
        return Ok(T::from_instance(instance));
    }

    let tag = match cached {
        Some(tag) => tag,
        None => match instance.class_type_id() {
            Ok(tag) => tag,
            Err(err) => return Err((err, instance)),
        },
    };

    match <T::Component as Component>::dispatch(tag, instance) {
        Ok(object) => T::from_object(object).map_err(|object| {
            (
                Error::InvalidCast {
                    expected: T::NAME,
                    actual: tag,
                },
                object.into_instance(),
            )
        }),
        Err(instance) => {
            log::debug!("unknown type tag {} resolved as {}", tag, T::NAME);
            Ok(T::from_instance(instance))
        }
    }
}

/// Resolve a handle that carries one reference for the caller.
///
/// The returned wrapper adopts that reference. On error the reference is
/// released.
///
/// # Safety
///
/// `raw` must be null, or a live handle of `library`'s component carrying
/// one reference that nothing else will release. Use [`Instance::acquire`]
/// to get a second owner of an object that is already wrapped.
///
/// ```compile_fail,E0133
/// use cabi::zoo::Zoo;
/// use cabi::{resolve, Class, ZooLibrary};
///
/// let library = ZooLibrary::load()?;
/// let zoo = library.create_zoo()?;
/// let twin: Zoo = resolve(&library, zoo.handle())?;
/// # Ok::<(), cabi::Error>(())
/// ```
pub unsafe fn resolve<T: Class>(
    library: &Arc<T::Component>,
    raw: impl Into<RawHandle>,
) -> Result<T> {
    let raw = raw.into();
    let instance = Instance::new(Arc::clone(library), raw.handle());
    resolve_instance(instance, raw.cached_tag()).map_err(|(err, _released)| err)
}

/// Resolve a handle lent by another object. Nothing is released, ever.
///
/// # Safety
///
/// `raw` must be null, or a live handle of `library`'s component that stays
/// alive for `'a`.
pub unsafe fn resolve_borrowed<'a, T: Class>(
    library: &Arc<T::Component>,
    raw: impl Into<RawHandle>,
) -> Result<Borrowed<'a, T>> {
    let raw = raw.into();
    let instance = Instance::new(Arc::clone(library), raw.handle());
    match resolve_instance(instance, raw.cached_tag()) {
        Ok(value) => Ok(Borrowed::new(value)),
        Err((err, instance)) => {
            instance.detach();
            Err(err)
        }
    }
}

/// Re-resolve an owned wrapper as another class of the same component.
///
/// Follows the rules of [`resolve`]. On error the reference is released.
pub fn cast<T, U>(value: T) -> Result<U>
where
    T: Class,
    U: Class<Component = T::Component>,
{
    resolve_instance::<U>(value.into_instance(), None).map_err(|(err, _released)| err)
}

/// Find the most-derived known wrapper of an owned instance.
pub fn classify<C: Component>(instance: Instance<C>) -> Result<Resolved<C>> {
    let tag = instance.class_type_id()?;
    Ok(match C::dispatch(tag, instance) {
        Ok(object) => Resolved::Known(object),
        Err(instance) => Resolved::Unknown(instance),
    })
}

/// Declare a wrapper class.
///
/// Root classes own the instance; derived classes wrap their parent and
/// deref to it. `accepts` lists the variants of the component's object
/// union that convert to the class.
macro_rules! declare_class {
    (
        $(#[$meta:meta])*
        $name:ident : root in $component:ty => $object:ident,
        $qualified:literal, $tag:expr,
        accepts [$($variant:ident),* $(,)?]
    ) => {
        $(#[$meta])*
        pub struct $name {
            instance: $crate::instance::Instance<$component>,
        }

        impl $crate::dispatch::Class for $name {
            type Component = $component;
            const NAME: &'static str = $qualified;
            const TYPE_TAG: $crate::types::TypeTag = $tag;

            fn from_instance(instance: $crate::instance::Instance<$component>) -> Self {
                Self { instance }
            }

            fn instance(&self) -> &$crate::instance::Instance<$component> {
                &self.instance
            }

            fn into_instance(self) -> $crate::instance::Instance<$component> {
                self.instance
            }

            #[allow(unreachable_patterns)]
            fn from_object(object: $object) -> ::std::result::Result<Self, $object> {
                match object {
                    $($object::$variant(inner) => Ok(Self::from_instance(
                        $crate::dispatch::Class::into_instance(inner),
                    )),)*
                    other => Err(other),
                }
            }
        }

        $crate::dispatch::declare_class!(@debug $name);
    };
    (
        $(#[$meta:meta])*
        $name:ident : $parent:ident in $component:ty => $object:ident,
        $qualified:literal, $tag:expr,
        accepts [$($variant:ident),* $(,)?]
    ) => {
        $(#[$meta])*
        pub struct $name {
            parent: $parent,
        }

        impl ::std::ops::Deref for $name {
            type Target = $parent;

            fn deref(&self) -> &$parent {
                &self.parent
            }
        }

        impl $crate::dispatch::Class for $name {
            type Component = $component;
            const NAME: &'static str = $qualified;
            const TYPE_TAG: $crate::types::TypeTag = $tag;

            fn from_instance(instance: $crate::instance::Instance<$component>) -> Self {
                Self {
                    parent: <$parent as $crate::dispatch::Class>::from_instance(instance),
                }
            }

            fn instance(&self) -> &$crate::instance::Instance<$component> {
                $crate::dispatch::Class::instance(&self.parent)
            }

            fn into_instance(self) -> $crate::instance::Instance<$component> {
                $crate::dispatch::Class::into_instance(self.parent)
            }

            #[allow(unreachable_patterns)]
            fn from_object(object: $object) -> ::std::result::Result<Self, $object> {
                match object {
                    $($object::$variant(inner) => Ok(Self::from_instance(
                        $crate::dispatch::Class::into_instance(inner),
                    )),)*
                    other => Err(other),
                }
            }
        }

        $crate::dispatch::declare_class!(@debug $name);
    };
    (@debug $name:ident) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("handle", &$crate::dispatch::Class::handle(self))
                    .finish()
            }
        }
    };
}

pub(crate) use declare_class;
