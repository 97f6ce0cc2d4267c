//! Bindings for the zoo component.
//!
//! The zoo returns fat handles, so the type tag of every returned object
//! arrives with it. Class hierarchy:
//!
//! ```text
//! Base ─┬─ Animal ─┬─ Mammal ──┬─ Giraffe
//!       │          │           └─ Tiger
//!       │          └─ Reptile ─┬─ Snake
//!       │                      └─ Turtle
//!       ├─ AnimalIterator
//!       └─ Zoo
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cabi::zoo::{ZooLibrary, ZooObject};
//! use cabi::dispatch::{classify, Class, Resolved};
//!
//! let library = ZooLibrary::load()?;
//! let zoo = library.create_zoo()?;
//!
//! for animal in zoo.iter()? {
//!     let animal = animal?;
//!     println!("{}", animal.name()?);
//!     if let Resolved::Known(ZooObject::Tiger(tiger)) = classify(animal.into_instance())? {
//!         println!("{}", tiger.roar()?);
//!     }
//! }
//! # Ok::<(), cabi::Error>(())
//! ```

use std::ffi::{c_char, CString};
use std::fmt;
use std::sync::Arc;

use crate::buffer::fetch_string;
use crate::dispatch::{self, declare_class, Class, Component, Object};
use crate::error::{Error, Result};
use crate::ffi::{BaseTable, FatHandle, GetSymbolLookupMethodFn, Handle, StatusCode};
use crate::instance::{Borrowed, Instance};
use crate::symbols::SymbolLookup;
use crate::types::{LoadOptions, Species, TypeTag, Version};

/// Version of the zoo binary these bindings were written against.
pub const BINDING_VERSION: Version = Version::new(1, 0, 0);

/// Type tags of the zoo classes.
pub mod tags {
    use crate::types::TypeTag;

    pub const BASE: TypeTag = TypeTag::new(0x3C19_5753_813A_1A50);
    pub const ANIMAL: TypeTag = TypeTag::new(0xB342_5100_B630_BF10);
    pub const MAMMAL: TypeTag = TypeTag::new(0x6795_AC40_341A_432B);
    pub const REPTILE: TypeTag = TypeTag::new(0xC18F_AAAB_1BC6_65FD);
    pub const GIRAFFE: TypeTag = TypeTag::new(0x0F6C_EC4A_4F82_59F1);
    pub const TIGER: TypeTag = TypeTag::new(0x6A71_D9E1_F3AF_A2F4);
    pub const SNAKE: TypeTag = TypeTag::new(0x99DC_F8B2_9933_C611);
    pub const TURTLE: TypeTag = TypeTag::new(0xAA88_523B_E20F_3AB8);
    pub const ANIMAL_ITERATOR: TypeTag = TypeTag::new(0x8B70_0AF2_67CA_8598);
    pub const ZOO: TypeTag = TypeTag::new(0x32B4_1720_D111_13A4);
}

type StringFn = unsafe extern "C" fn(Handle, u32, *mut u32, *mut c_char) -> StatusCode;
type FatOutFn = unsafe extern "C" fn(Handle, *mut FatHandle) -> StatusCode;

/// The loaded zoo component.
pub struct ZooLibrary {
    base: BaseTable,
    create_zoo: unsafe extern "C" fn(*mut FatHandle) -> StatusCode,
    zoo_add_animal: unsafe extern "C" fn(Handle, u32, *const c_char) -> StatusCode,
    zoo_animal_count: unsafe extern "C" fn(Handle, *mut u32) -> StatusCode,
    zoo_animal_at: unsafe extern "C" fn(Handle, u32, *mut FatHandle) -> StatusCode,
    zoo_iterator: FatOutFn,
    animal_name: StringFn,
    tiger_roar: StringFn,
    iterator_next: unsafe extern "C" fn(Handle, *mut FatHandle, *mut bool) -> StatusCode,
    iterator_next_mandatory: FatOutFn,
}

impl ZooLibrary {
    /// Load the in-process zoo component with default options.
    pub fn load() -> Result<Arc<Self>> {
        Self::load_with(LoadOptions::default())
    }

    /// Load the in-process zoo component.
    pub fn load_with(options: LoadOptions) -> Result<Arc<Self>> {
        unsafe {
            Self::load_from_entry_point(crate::native::zoo::zoo_getsymbollookupmethod, options)
        }
    }

    /// Load a zoo component through its entry point.
    ///
    /// # Safety
    ///
    /// `entry` must be a zoo `getsymbollookupmethod` whose symbols have the
    /// signatures these bindings expect.
    pub unsafe fn load_from_entry_point(
        entry: GetSymbolLookupMethodFn,
        options: LoadOptions,
    ) -> Result<Arc<Self>> {
        Self::load_from_lookup(SymbolLookup::from_entry_point(entry)?, options)
    }

    /// Load a zoo component through a resolved lookup function.
    ///
    /// # Safety
    ///
    /// Same contract as [`ZooLibrary::load_from_entry_point`].
    pub unsafe fn load_from_lookup(symbols: SymbolLookup, options: LoadOptions) -> Result<Arc<Self>> {
        let ns = Self::NAMESPACE;
        let base = BaseTable::load(symbols, ns, "Zoo", BINDING_VERSION, options)?;
        Ok(Arc::new(Self {
            base,
            create_zoo: symbols.resolve_fn(ns, "createzoo")?,
            zoo_add_animal: symbols.resolve_fn(ns, "zoo_addanimal")?,
            zoo_animal_count: symbols.resolve_fn(ns, "zoo_animalcount")?,
            zoo_animal_at: symbols.resolve_fn(ns, "zoo_animalat")?,
            zoo_iterator: symbols.resolve_fn(ns, "zoo_iterator")?,
            animal_name: symbols.resolve_fn(ns, "animal_name")?,
            tiger_roar: symbols.resolve_fn(ns, "tiger_roar")?,
            iterator_next: symbols.resolve_fn(ns, "animaliterator_getnextanimal")?,
            iterator_next_mandatory: symbols
                .resolve_fn(ns, "animaliterator_getnextmandatoryanimal")?,
        }))
    }

    /// Version of the native binary.
    pub fn version(&self) -> Result<Version> {
        self.base.version()
    }

    /// Last error of a failed call that had no object, on this thread.
    pub fn last_error(&self) -> Result<Option<String>> {
        crate::ffi::fetch_last_error(&self.base, Handle::null())
    }

    /// Create a zoo populated with its default animals.
    pub fn create_zoo(self: &Arc<Self>) -> Result<Zoo> {
        let mut zoo = FatHandle::null();
        let status = unsafe { (self.create_zoo)(&mut zoo) };
        crate::ffi::check_status(&self.base, Handle::null(), status)?;
        unsafe { dispatch::resolve(self, zoo) }
    }
}

impl fmt::Debug for ZooLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZooLibrary")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Concrete zoo wrappers.
#[derive(Debug)]
pub enum ZooObject {
    Zoo(Zoo),
    AnimalIterator(AnimalIterator),
    Giraffe(Giraffe),
    Tiger(Tiger),
    Snake(Snake),
    Turtle(Turtle),
}

impl Object for ZooObject {
    type Component = ZooLibrary;

    fn type_tag(&self) -> TypeTag {
        match self {
            ZooObject::Zoo(_) => tags::ZOO,
            ZooObject::AnimalIterator(_) => tags::ANIMAL_ITERATOR,
            ZooObject::Giraffe(_) => tags::GIRAFFE,
            ZooObject::Tiger(_) => tags::TIGER,
            ZooObject::Snake(_) => tags::SNAKE,
            ZooObject::Turtle(_) => tags::TURTLE,
        }
    }

    fn into_instance(self) -> Instance<ZooLibrary> {
        match self {
            ZooObject::Zoo(inner) => inner.into_instance(),
            ZooObject::AnimalIterator(inner) => inner.into_instance(),
            ZooObject::Giraffe(inner) => inner.into_instance(),
            ZooObject::Tiger(inner) => inner.into_instance(),
            ZooObject::Snake(inner) => inner.into_instance(),
            ZooObject::Turtle(inner) => inner.into_instance(),
        }
    }
}

impl Component for ZooLibrary {
    type Object = ZooObject;

    const NAMESPACE: &'static str = "zoo";

    fn base(&self) -> &BaseTable {
        &self.base
    }

    fn dispatch(
        tag: TypeTag,
        instance: Instance<Self>,
    ) -> std::result::Result<ZooObject, Instance<Self>> {
        Ok(match tag {
            tags::ZOO => ZooObject::Zoo(Zoo::from_instance(instance)),
            tags::ANIMAL_ITERATOR => ZooObject::AnimalIterator(AnimalIterator::from_instance(instance)),
            tags::GIRAFFE => ZooObject::Giraffe(Giraffe::from_instance(instance)),
            tags::TIGER => ZooObject::Tiger(Tiger::from_instance(instance)),
            tags::SNAKE => ZooObject::Snake(Snake::from_instance(instance)),
            tags::TURTLE => ZooObject::Turtle(Turtle::from_instance(instance)),
            _ => return Err(instance),
        })
    }
}

declare_class! {
    /// Root of the zoo hierarchy.
    Base: root in ZooLibrary => ZooObject, "Zoo::Base", tags::BASE,
    accepts [Zoo, AnimalIterator, Giraffe, Tiger, Snake, Turtle]
}

declare_class! {
    /// Any animal.
    Animal: Base in ZooLibrary => ZooObject, "Zoo::Animal", tags::ANIMAL,
    accepts [Giraffe, Tiger, Snake, Turtle]
}

declare_class! {
    Mammal: Animal in ZooLibrary => ZooObject, "Zoo::Mammal", tags::MAMMAL,
    accepts [Giraffe, Tiger]
}

declare_class! {
    Reptile: Animal in ZooLibrary => ZooObject, "Zoo::Reptile", tags::REPTILE,
    accepts [Snake, Turtle]
}

declare_class! {
    Giraffe: Mammal in ZooLibrary => ZooObject, "Zoo::Giraffe", tags::GIRAFFE,
    accepts [Giraffe]
}

declare_class! {
    Tiger: Mammal in ZooLibrary => ZooObject, "Zoo::Tiger", tags::TIGER,
    accepts [Tiger]
}

declare_class! {
    Snake: Reptile in ZooLibrary => ZooObject, "Zoo::Snake", tags::SNAKE,
    accepts [Snake]
}

declare_class! {
    Turtle: Reptile in ZooLibrary => ZooObject, "Zoo::Turtle", tags::TURTLE,
    accepts [Turtle]
}

declare_class! {
    /// Iterator over a snapshot of a zoo's animals.
    ///
    /// Yields owned animals; each one resolves to its own wrapper type.
    AnimalIterator: Base in ZooLibrary => ZooObject, "Zoo::AnimalIterator",
    tags::ANIMAL_ITERATOR,
    accepts [AnimalIterator]
}

declare_class! {
    /// A zoo. Owns its animals.
    Zoo: Base in ZooLibrary => ZooObject, "Zoo::Zoo", tags::ZOO,
    accepts [Zoo]
}

impl Base {
    /// Query the concrete type of the object.
    pub fn class_type_id(&self) -> Result<TypeTag> {
        self.instance().class_type_id()
    }

    /// The last error recorded on this object.
    pub fn last_error(&self) -> Result<Option<String>> {
        self.instance().last_error()
    }
}

fn fetch_text(instance: &Instance<ZooLibrary>, call: StringFn) -> Result<String> {
    let handle = instance.handle_checked()?;
    let attempts = instance.library().base().options().fetch_attempts;
    fetch_string(attempts, |capacity, needed, buffer| {
        let status = unsafe { call(handle, capacity, needed, buffer) };
        instance.check(status)
    })
}

impl Animal {
    pub fn name(&self) -> Result<String> {
        fetch_text(self.instance(), self.instance().library().animal_name)
    }
}

impl Tiger {
    pub fn roar(&self) -> Result<String> {
        fetch_text(self.instance(), self.instance().library().tiger_roar)
    }
}

impl Zoo {
    /// Add an animal. The zoo holds the only reference to it.
    pub fn add_animal(&self, species: Species, name: &str) -> Result<()> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let name_c = CString::new(name)
            .map_err(|_| Error::InvalidArgument("name contains null byte".to_string()))?;
        let status = unsafe {
            (instance.library().zoo_add_animal)(handle, species.into(), name_c.as_ptr())
        };
        instance.check(status)
    }

    pub fn animal_count(&self) -> Result<u32> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut count = 0u32;
        let status = unsafe { (instance.library().zoo_animal_count)(handle, &mut count) };
        instance.check(status)?;
        Ok(count)
    }

    /// The animal at `index`, lent by the zoo.
    pub fn animal_at(&self, index: u32) -> Result<Borrowed<'_, Animal>> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut animal = FatHandle::null();
        let status = unsafe { (instance.library().zoo_animal_at)(handle, index, &mut animal) };
        instance.check(status)?;
        unsafe { dispatch::resolve_borrowed(instance.library(), animal) }
    }

    /// Iterate over the animals present now.
    pub fn iter(&self) -> Result<AnimalIterator> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut iterator = FatHandle::null();
        let status = unsafe { (instance.library().zoo_iterator)(handle, &mut iterator) };
        instance.check(status)?;
        unsafe { dispatch::resolve(instance.library(), iterator) }
    }
}

impl AnimalIterator {
    /// The next animal, or `None` once the iterator is exhausted.
    pub fn next_animal(&self) -> Result<Option<Animal>> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut animal = FatHandle::null();
        let mut has_animal = false;
        let status =
            unsafe { (instance.library().iterator_next)(handle, &mut animal, &mut has_animal) };
        instance.check(status)?;
        if !has_animal {
            return Ok(None);
        }
        unsafe { dispatch::resolve(instance.library(), animal).map(Some) }
    }

    /// The next animal. Fails with NORESULTAVAILABLE once exhausted.
    pub fn next_mandatory_animal(&self) -> Result<Animal> {
        let instance = self.instance();
        let handle = instance.handle_checked()?;
        let mut animal = FatHandle::null();
        let status = unsafe { (instance.library().iterator_next_mandatory)(handle, &mut animal) };
        instance.check(status)?;
        unsafe { dispatch::resolve(instance.library(), animal) }
    }
}

impl Iterator for AnimalIterator {
    type Item = Result<Animal>;

    fn next(&mut self) -> Option<Result<Animal>> {
        self.next_animal().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_names() {
        let classes = [
            ("Zoo::Base", tags::BASE),
            ("Zoo::Animal", tags::ANIMAL),
            ("Zoo::Mammal", tags::MAMMAL),
            ("Zoo::Reptile", tags::REPTILE),
            ("Zoo::Giraffe", tags::GIRAFFE),
            ("Zoo::Tiger", tags::TIGER),
            ("Zoo::Snake", tags::SNAKE),
            ("Zoo::Turtle", tags::TURTLE),
            ("Zoo::AnimalIterator", tags::ANIMAL_ITERATOR),
            ("Zoo::Zoo", tags::ZOO),
        ];
        for (name, tag) in classes {
            assert_eq!(TypeTag::from_qualified_name(name), tag, "tag of {}", name);
        }
        assert_eq!(Tiger::NAME, "Zoo::Tiger");
        assert_eq!(Tiger::TYPE_TAG, tags::TIGER);
    }
}
