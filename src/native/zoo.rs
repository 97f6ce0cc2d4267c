//! Native zoo component: an animal class hierarchy behind fat handles.
//!
//! The native side knows one class the host bindings do not
//! (`Zoo::Axolotl`), so hosts see it through their fallback type.

use std::ffi::{c_char, c_void};
use std::sync::Mutex;

use super::buffer::write_string;
use super::object::lock_state;
use super::{
    in_str, out_param, symbol_lookup_method, NativeComponent, NativeError, NativeObject,
    NativeResult, ObjectTable,
};
use crate::ffi::{FatHandle, Handle, StatusCode};
use crate::types::{Species, TypeTag, Version};

const DEFAULT_ANIMALS: [(Species, &str); 4] = [
    (Species::Giraffe, "Gerald Giraffe"),
    (Species::Tiger, "Tony Tiger"),
    (Species::Snake, "Sidney Snake"),
    (Species::Turtle, "Tina Turtle"),
];

pub(crate) enum ZooObject {
    Zoo { animals: Mutex<Vec<Handle>> },
    Iterator { animals: Vec<Handle>, position: Mutex<usize> },
    Animal { species: Species, name: String },
}

fn species_class(species: Species) -> &'static str {
    match species {
        Species::Giraffe => "Zoo::Giraffe",
        Species::Tiger => "Zoo::Tiger",
        Species::Snake => "Zoo::Snake",
        Species::Turtle => "Zoo::Turtle",
        Species::Axolotl => "Zoo::Axolotl",
    }
}

impl NativeObject for ZooObject {
    fn type_tag(&self) -> TypeTag {
        let name = match self {
            ZooObject::Zoo { .. } => "Zoo::Zoo",
            ZooObject::Iterator { .. } => "Zoo::AnimalIterator",
            ZooObject::Animal { species, .. } => species_class(*species),
        };
        TypeTag::from_qualified_name(name)
    }

    fn owned_handles(&self) -> Vec<Handle> {
        match self {
            ZooObject::Zoo { animals } => lock_state(animals).clone(),
            ZooObject::Iterator { animals, .. } => animals.clone(),
            ZooObject::Animal { .. } => Vec::new(),
        }
    }
}

static OBJECTS: ObjectTable<ZooObject> = ObjectTable::new("Zoo");

pub(crate) struct ZooComponent;

impl NativeComponent for ZooComponent {
    type Object = ZooObject;

    const NAMESPACE: &'static str = "zoo";
    const VERSION: Version = Version::new(1, 0, 0);

    fn objects() -> &'static ObjectTable<ZooObject> {
        &OBJECTS
    }

    fn exports() -> Vec<(&'static str, usize)> {
        type CreateFn = unsafe extern "C" fn(*mut FatHandle) -> StatusCode;
        type AddFn = unsafe extern "C" fn(Handle, u32, *const c_char) -> StatusCode;
        type CountFn = unsafe extern "C" fn(Handle, *mut u32) -> StatusCode;
        type AtFn = unsafe extern "C" fn(Handle, u32, *mut FatHandle) -> StatusCode;
        type FatOutFn = unsafe extern "C" fn(Handle, *mut FatHandle) -> StatusCode;
        type StringFn = unsafe extern "C" fn(Handle, u32, *mut u32, *mut c_char) -> StatusCode;
        type NextFn = unsafe extern "C" fn(Handle, *mut FatHandle, *mut bool) -> StatusCode;
        type EntryFn = unsafe extern "C" fn(*mut *mut c_void) -> StatusCode;

        vec![
            ("getsymbollookupmethod", zoo_getsymbollookupmethod as EntryFn as usize),
            ("createzoo", create_zoo as CreateFn as usize),
            ("zoo_addanimal", zoo_add_animal as AddFn as usize),
            ("zoo_animalcount", zoo_animal_count as CountFn as usize),
            ("zoo_animalat", zoo_animal_at as AtFn as usize),
            ("zoo_iterator", zoo_iterator as FatOutFn as usize),
            ("animal_name", animal_name as StringFn as usize),
            ("tiger_roar", tiger_roar as StringFn as usize),
            ("animaliterator_getnextanimal", iterator_next as NextFn as usize),
            (
                "animaliterator_getnextmandatoryanimal",
                iterator_next_mandatory as FatOutFn as usize,
            ),
        ]
    }
}

/// Entry point of the zoo component.
///
/// # Safety
///
/// `address` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn zoo_getsymbollookupmethod(address: *mut *mut c_void) -> StatusCode {
    symbol_lookup_method::<ZooComponent>(address)
}

/// Current reference count of a zoo object, `None` once destroyed.
pub fn reference_count(handle: Handle) -> Option<u32> {
    OBJECTS.reference_count(handle)
}

fn fat(handle: Handle) -> NativeResult<FatHandle> {
    let entry = OBJECTS.get(handle)?;
    Ok(FatHandle::new(handle, entry.type_tag()))
}

fn insert_animal(species: Species, name: &str) -> Handle {
    OBJECTS.insert(ZooObject::Animal {
        species,
        name: name.to_string(),
    })
}

unsafe extern "C" fn create_zoo(zoo: *mut FatHandle) -> StatusCode {
    OBJECTS.guard(Handle::null(), || {
        let out = out_param(zoo)?;
        let animals = DEFAULT_ANIMALS
            .iter()
            .map(|(species, name)| insert_animal(*species, name))
            .collect();
        let handle = OBJECTS.insert(ZooObject::Zoo {
            animals: Mutex::new(animals),
        });
        *out = fat(handle)?;
        Ok(())
    })
}

unsafe extern "C" fn zoo_add_animal(zoo: Handle, species: u32, name: *const c_char) -> StatusCode {
    OBJECTS.guard(zoo, || {
        let entry = OBJECTS.get(zoo)?;
        let ZooObject::Zoo { animals } = &**entry else {
            return Err(NativeError::invalid_cast("not a zoo"));
        };
        let species = Species::try_from(species)
            .map_err(|value| NativeError::invalid_param(format!("unknown species {}", value)))?;
        let name = in_str(name)?;
        if name.is_empty() {
            return Err(NativeError::invalid_param("animal name must not be empty"));
        }
        let animal = insert_animal(species, name);
        lock_state(animals).push(animal);
        Ok(())
    })
}

unsafe extern "C" fn zoo_animal_count(zoo: Handle, count: *mut u32) -> StatusCode {
    OBJECTS.guard(zoo, || {
        let entry = OBJECTS.get(zoo)?;
        let ZooObject::Zoo { animals } = &**entry else {
            return Err(NativeError::invalid_cast("not a zoo"));
        };
        let len = lock_state(animals).len();
        *out_param(count)? = u32::try_from(len)
            .map_err(|_| NativeError::generic("too many animals to count"))?;
        Ok(())
    })
}

/// Borrowing accessor: the caller gets no reference of its own.
unsafe extern "C" fn zoo_animal_at(zoo: Handle, index: u32, animal: *mut FatHandle) -> StatusCode {
    OBJECTS.guard(zoo, || {
        let out = out_param(animal)?;
        let entry = OBJECTS.get(zoo)?;
        let ZooObject::Zoo { animals } = &**entry else {
            return Err(NativeError::invalid_cast("not a zoo"));
        };
        let handle = lock_state(animals)
            .get(index as usize)
            .copied()
            .ok_or_else(|| NativeError::invalid_param(format!("no animal at index {}", index)))?;
        *out = fat(handle)?;
        Ok(())
    })
}

unsafe extern "C" fn zoo_iterator(zoo: Handle, iterator: *mut FatHandle) -> StatusCode {
    OBJECTS.guard(zoo, || {
        let out = out_param(iterator)?;
        let entry = OBJECTS.get(zoo)?;
        let ZooObject::Zoo { animals } = &**entry else {
            return Err(NativeError::invalid_cast("not a zoo"));
        };
        let snapshot = lock_state(animals).clone();

        // The iterator holds its own reference to every animal it will return.
        for (acquired, handle) in snapshot.iter().enumerate() {
            if let Err(err) = OBJECTS.acquire(*handle) {
                for taken in &snapshot[..acquired] {
                    if let Err(undo) = OBJECTS.release(*taken) {
                        log::warn!(
                            "Zoo: rolling back handle {} failed: {}",
                            taken.as_raw(),
                            undo
                        );
                    }
                }
                return Err(err);
            }
        }

        let handle = OBJECTS.insert(ZooObject::Iterator {
            animals: snapshot,
            position: Mutex::new(0),
        });
        *out = fat(handle)?;
        Ok(())
    })
}

unsafe extern "C" fn animal_name(
    animal: Handle,
    capacity: u32,
    needed: *mut u32,
    buffer: *mut c_char,
) -> StatusCode {
    OBJECTS.guard(animal, || {
        let entry = OBJECTS.get(animal)?;
        let ZooObject::Animal { name, .. } = &**entry else {
            return Err(NativeError::invalid_cast("not an animal"));
        };
        write_string(name, capacity, needed, buffer)
    })
}

unsafe extern "C" fn tiger_roar(
    tiger: Handle,
    capacity: u32,
    needed: *mut u32,
    buffer: *mut c_char,
) -> StatusCode {
    OBJECTS.guard(tiger, || {
        let entry = OBJECTS.get(tiger)?;
        match &**entry {
            ZooObject::Animal {
                species: Species::Tiger,
                name,
            } => write_string(&format!("{} roars!", name), capacity, needed, buffer),
            ZooObject::Animal { name, .. } => {
                Err(NativeError::invalid_cast(format!("{} is not a tiger", name)))
            }
            _ => Err(NativeError::invalid_cast("not an animal")),
        }
    })
}

/// Advance `iterator`, acquiring the returned animal for the caller.
fn advance(iterator: Handle) -> NativeResult<Option<FatHandle>> {
    let entry = OBJECTS.get(iterator)?;
    let ZooObject::Iterator { animals, position } = &**entry else {
        return Err(NativeError::invalid_cast("not an animal iterator"));
    };

    let mut position = lock_state(position);
    let Some(&handle) = animals.get(*position) else {
        return Ok(None);
    };
    let animal = fat(handle)?;
    OBJECTS.acquire(handle)?;
    *position += 1;
    Ok(Some(animal))
}

/// `has_animal` reports whether an animal was produced; exhaustion is not an error.
unsafe extern "C" fn iterator_next(
    iterator: Handle,
    animal: *mut FatHandle,
    has_animal: *mut bool,
) -> StatusCode {
    OBJECTS.guard(iterator, || {
        let out = out_param(animal)?;
        let has_animal = out_param(has_animal)?;
        match advance(iterator)? {
            Some(next) => {
                *out = next;
                *has_animal = true;
            }
            None => {
                *out = FatHandle::null();
                *has_animal = false;
            }
        }
        Ok(())
    })
}

unsafe extern "C" fn iterator_next_mandatory(iterator: Handle, animal: *mut FatHandle) -> StatusCode {
    OBJECTS.guard(iterator, || {
        let out = out_param(animal)?;
        *out = advance(iterator)?
            .ok_or_else(|| NativeError::no_result("the iterator has no more animals"))?;
        Ok(())
    })
}
