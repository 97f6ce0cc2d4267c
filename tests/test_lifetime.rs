//! Reference counting across the boundary.
//!
//! Native reference counts are read back through the components'
//! `reference_count` hooks.

use cabi::native::{calculator, zoo};
use cabi::zoo::Zoo;
use cabi::{Class, Error, ZooLibrary};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_create_acquire_release_scenario() {
    init_logging();

    let library = ZooLibrary::load().expect("zoo should load");
    let zoo_ref = library.create_zoo().expect("create_zoo should succeed");
    let handle = zoo_ref.handle();
    assert_eq!(zoo::reference_count(handle), Some(1));

    let mut second = zoo_ref.instance().acquire().expect("acquire should succeed");
    assert_eq!(second.handle(), handle, "acquire must return the same object");
    assert_eq!(zoo::reference_count(handle), Some(2));

    second.release().expect("release should succeed");
    assert!(second.is_null(), "released instance must be nulled");
    assert_eq!(zoo::reference_count(handle), Some(1));
    assert_eq!(zoo_ref.animal_count().expect("object must stay usable"), 4);

    // A second release of the same instance does nothing.
    second.release().expect("repeated release should be a no-op");
    assert_eq!(zoo::reference_count(handle), Some(1));

    drop(zoo_ref);
    assert_eq!(zoo::reference_count(handle), None);
}

#[test]
fn test_drop_releases_exactly_once() {
    init_logging();

    let library = ZooLibrary::load().expect("zoo should load");
    let first = library.create_zoo().expect("create_zoo should succeed");
    let handle = first.handle();

    let second = Zoo::from_instance(first.instance().acquire().expect("acquire should succeed"));
    assert_eq!(zoo::reference_count(handle), Some(2));

    drop(first);
    assert_eq!(zoo::reference_count(handle), Some(1));
    assert_eq!(second.animal_count().expect("count should succeed"), 4);

    drop(second);
    assert_eq!(zoo::reference_count(handle), None);
}

#[test]
fn test_released_wrapper_reports_invalid_handle() {
    init_logging();

    let library = ZooLibrary::load().expect("zoo should load");
    let zoo_ref = library.create_zoo().expect("create_zoo should succeed");
    let mut instance = zoo_ref.into_instance();
    instance.release().expect("release should succeed");

    let released = Zoo::from_instance(instance);
    assert!(released.is_null());
    let err = released
        .animal_count()
        .expect_err("calls on a released wrapper should fail");
    assert!(matches!(err, Error::InvalidHandle));
}

#[test]
fn test_borrowed_animal_takes_no_reference() {
    init_logging();

    let library = ZooLibrary::load().expect("zoo should load");
    let zoo_ref = library.create_zoo().expect("create_zoo should succeed");

    let animal = zoo_ref.animal_at(0).expect("animal_at should succeed");
    let animal_handle = animal.handle();
    assert_eq!(animal.name().expect("name should succeed"), "Gerald Giraffe");
    assert_eq!(zoo::reference_count(animal_handle), Some(1));

    drop(animal);
    assert_eq!(
        zoo::reference_count(animal_handle),
        Some(1),
        "dropping a borrowed view must not release"
    );
}

#[test]
fn test_acquired_animal_outlives_zoo() {
    init_logging();

    let library = ZooLibrary::load().expect("zoo should load");
    let zoo_ref = library.create_zoo().expect("create_zoo should succeed");

    let owned = {
        let borrowed = zoo_ref.animal_at(1).expect("animal_at should succeed");
        borrowed.acquire().expect("acquire should succeed")
    };
    let handle = owned.handle();
    assert_eq!(zoo::reference_count(handle), Some(2));

    let sibling = zoo_ref.animal_at(2).expect("animal_at should succeed").handle();
    drop(zoo_ref);

    assert_eq!(zoo::reference_count(handle), Some(1));
    assert_eq!(zoo::reference_count(sibling), None, "the zoo owned its animals");
    assert_eq!(owned.name().expect("name should succeed"), "Tony Tiger");

    drop(owned);
    assert_eq!(zoo::reference_count(handle), None);
}

#[test]
fn test_iterator_keeps_snapshot_alive() {
    init_logging();

    let library = ZooLibrary::load().expect("zoo should load");
    let zoo_ref = library.create_zoo().expect("create_zoo should succeed");
    let handles: Vec<_> = (0..4)
        .map(|index| zoo_ref.animal_at(index).expect("animal_at should succeed").handle())
        .collect();

    let iterator = zoo_ref.iter().expect("iter should succeed");
    for handle in &handles {
        assert_eq!(zoo::reference_count(*handle), Some(2));
    }

    drop(zoo_ref);
    for handle in &handles {
        assert_eq!(zoo::reference_count(*handle), Some(1));
    }

    let first = iterator
        .next_animal()
        .expect("next_animal should succeed")
        .expect("the snapshot has animals");
    assert_eq!(first.handle(), handles[0]);
    assert_eq!(zoo::reference_count(handles[0]), Some(2));
    assert_eq!(first.name().expect("name should succeed"), "Gerald Giraffe");

    drop(iterator);
    assert_eq!(zoo::reference_count(handles[0]), Some(1));
    assert_eq!(zoo::reference_count(handles[3]), None);

    drop(first);
    assert_eq!(zoo::reference_count(handles[0]), None);
}

#[test]
fn test_calculator_co_owns_enlisted_variables() {
    init_logging();

    let library = cabi::CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");
    let variable = library.create_variable(1.5).expect("create_variable should succeed");
    let handle = variable.handle();

    calc.enlist_variable(&variable).expect("enlist should succeed");
    assert_eq!(calculator::reference_count(handle), Some(2));

    let enlisted = calc.enlisted_variable(0).expect("enlisted_variable should succeed");
    assert_eq!(enlisted.handle(), handle);
    assert_eq!(calculator::reference_count(handle), Some(3));
    drop(enlisted);
    assert_eq!(calculator::reference_count(handle), Some(2));

    drop(variable);
    assert_eq!(calculator::reference_count(handle), Some(1));

    calc.clear_variables().expect("clear should succeed");
    assert_eq!(calculator::reference_count(handle), None);
}

#[test]
fn test_dropping_calculator_releases_variables() {
    init_logging();

    let library = cabi::CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");
    let variable = library.create_variable(3.0).expect("create_variable should succeed");
    let handle = variable.handle();
    calc.enlist_variable(&variable).expect("enlist should succeed");
    drop(variable);
    assert_eq!(calculator::reference_count(handle), Some(1));

    let calc_handle = calc.handle();
    drop(calc);
    assert_eq!(calculator::reference_count(calc_handle), None);
    assert_eq!(calculator::reference_count(handle), None);
}
