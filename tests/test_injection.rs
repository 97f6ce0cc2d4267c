//! One component consuming another through its lookup method and handles.
//!
//! Injection is process-wide, so this file holds a single test that walks
//! through the states in order.

use cabi::ffi::{CABI_ERR_COULD_NOT_LOAD_LIBRARY, CABI_ERR_INVALID_PARAM, CABI_ERR_NO_RESULT};
use cabi::{CalculatorLibrary, Class, Component, PrimesLibrary, ZooLibrary};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_calculator_reads_injected_primes() {
    init_logging();

    let calculators = CalculatorLibrary::load().expect("calculator should load");
    let primes = PrimesLibrary::load().expect("primes should load");
    let sieve = primes.create_sieve_calculator().expect("create should succeed");
    sieve.set_value(10).expect("set_value should succeed");
    sieve.calculate().expect("calculate should succeed");
    let calc = calculators
        .create_calculator()
        .expect("create_calculator should succeed");

    let err = calc
        .enlist_primes(&sieve)
        .expect_err("nothing has been injected yet");
    assert_eq!(err.code(), Some(CABI_ERR_COULD_NOT_LOAD_LIBRARY));
    assert_eq!(
        err.native_message(),
        Some("no primes component has been injected")
    );

    let zoo = ZooLibrary::load().expect("zoo should load");
    let err = unsafe { calculators.inject_component("zoo", *zoo.base().symbols()) }
        .expect_err("only primes can be injected");
    assert_eq!(err.code(), Some(CABI_ERR_INVALID_PARAM));
    assert_eq!(err.native_message(), Some("cannot inject component zoo"));

    calculators
        .inject_primes(&primes)
        .expect("inject_primes should succeed");
    calc.enlist_primes(&sieve).expect("enlist_primes should succeed");

    let sum = calc.add().expect("add should succeed");
    assert_eq!(sum.value().expect("value should succeed"), 17.0);
    let product = calc.multiply().expect("multiply should succeed");
    assert_eq!(product.value().expect("value should succeed"), 210.0);

    // The sieve is only read; the new variables belong to the calculator.
    assert_eq!(cabi::native::primes::reference_count(sieve.handle()), Some(1));
    let first = calc
        .enlisted_variable(0)
        .expect("enlisted_variable should succeed");
    assert_eq!(first.value().expect("value should succeed"), 2.0);
    assert_eq!(
        cabi::native::calculator::reference_count(first.handle()),
        Some(2)
    );

    // Failures inside primes surface with the primes message.
    let fresh = primes.create_sieve_calculator().expect("create should succeed");
    let err = calc
        .enlist_primes(&fresh)
        .expect_err("an uncalculated sieve has no primes");
    assert_eq!(err.code(), Some(CABI_ERR_NO_RESULT));
    assert_eq!(err.native_message(), Some("no primes have been calculated"));
    assert_eq!(
        calc.last_error()
            .expect("last_error should succeed")
            .as_deref(),
        Some("no primes have been calculated")
    );

    let first_handle = first.handle();
    drop(calc);
    assert_eq!(
        cabi::native::calculator::reference_count(first_handle),
        Some(1)
    );
}
