//! Calculator component: handle in-parameters and extension callables.
//!
//! The symbol registry is process-wide, so every test registers its
//! callables under its own names.

use cabi::ffi::{CABI_ERR_INVALID_PARAM, CABI_ERR_SYMBOL_NOT_FOUND};
use cabi::calculator::{Calculator, Variable};
use cabi::{CalculatorLibrary, Class};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

extern "C" fn square(value: f64) -> f64 {
    value * value
}

extern "C" fn overflow(_: f64) -> f64 {
    f64::INFINITY
}

#[test]
fn test_variable_value() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let variable = library.create_variable(2.5).expect("create_variable should succeed");
    assert_eq!(variable.value().expect("value should succeed"), 2.5);

    variable.set_value(-7.0).expect("set_value should succeed");
    assert_eq!(variable.value().expect("value should succeed"), -7.0);

    let err = variable
        .set_value(f64::INFINITY)
        .expect_err("non-finite values should be rejected");
    assert_eq!(err.code(), Some(CABI_ERR_INVALID_PARAM));
    assert_eq!(variable.value().expect("value should succeed"), -7.0);
    assert_eq!(
        variable.last_error().expect("last_error should succeed").as_deref(),
        Some("inf is not a finite value")
    );
}

#[test]
fn test_add_and_multiply() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");

    let empty_sum = calc.add().expect("add should succeed");
    assert_eq!(empty_sum.value().expect("value should succeed"), 0.0);
    let empty_product = calc.multiply().expect("multiply should succeed");
    assert_eq!(empty_product.value().expect("value should succeed"), 1.0);

    for value in [2.0, 3.0, 4.0] {
        let variable = library.create_variable(value).expect("create_variable should succeed");
        calc.enlist_variable(&variable).expect("enlist should succeed");
    }

    let sum = calc.add().expect("add should succeed");
    assert_eq!(sum.value().expect("value should succeed"), 9.0);
    let product = calc.multiply().expect("multiply should succeed");
    assert_eq!(product.value().expect("value should succeed"), 24.0);

    // Results are new objects owned by the caller.
    assert_eq!(cabi::native::calculator::reference_count(sum.handle()), Some(1));
    assert_ne!(sum.handle(), product.handle());
}

#[test]
fn test_enlisted_variable_shares_state() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");
    let variable = library.create_variable(1.0).expect("create_variable should succeed");
    calc.enlist_variable(&variable).expect("enlist should succeed");

    let enlisted = calc.enlisted_variable(0).expect("enlisted_variable should succeed");
    enlisted.set_value(10.0).expect("set_value should succeed");
    assert_eq!(variable.value().expect("value should succeed"), 10.0);

    let err = calc
        .enlisted_variable(1)
        .expect_err("an out of range index should fail");
    assert_eq!(err.code(), Some(CABI_ERR_INVALID_PARAM));
    assert_eq!(err.native_message(), Some("no variable at index 1"));
}

#[test]
fn test_enlisting_a_calculator_is_rejected() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");
    let other = library.create_calculator().expect("create_calculator should succeed");

    // Reinterpret the second calculator as a variable to get past the type system.
    let pretend = Variable::from_instance(other.into_instance());
    let err = calc
        .enlist_variable(&pretend)
        .expect_err("only variables can be enlisted");
    assert!(err.is_invalid_cast(), "expected INVALIDCAST, got {:?}", err);
    assert_eq!(cabi::native::calculator::reference_count(pretend.handle()), Some(1));
}

#[test]
fn test_apply_registered_function() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    library
        .register_function("calculator-test", "square", square)
        .expect("registration should succeed");

    let calc = library.create_calculator().expect("create_calculator should succeed");
    let three = library.create_variable(3.0).expect("create_variable should succeed");
    let minus_two = library.create_variable(-2.0).expect("create_variable should succeed");
    calc.enlist_variable(&three).expect("enlist should succeed");
    calc.enlist_variable(&minus_two).expect("enlist should succeed");

    calc.apply("calculator-test", "square")
        .expect("apply should succeed");
    assert_eq!(three.value().expect("value should succeed"), 9.0);
    assert_eq!(minus_two.value().expect("value should succeed"), 4.0);
}

#[test]
fn test_apply_unknown_function() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");

    let err = calc
        .apply("calculator-test", "never-registered")
        .expect_err("unknown callables should fail");
    assert_eq!(err.code(), Some(CABI_ERR_SYMBOL_NOT_FOUND));
    assert!(
        calc.last_error()
            .expect("last_error should succeed")
            .is_some(),
        "the failure should be recorded on the calculator"
    );

    let err = calc
        .apply("calculator-test", "bad\0name")
        .expect_err("names with null bytes should be rejected");
    assert!(matches!(err, cabi::Error::InvalidArgument(_)));
}

#[test]
fn test_apply_rejects_non_finite_results() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    library
        .register_function("calculator-test", "overflow", overflow)
        .expect("registration should succeed");

    let calc = library.create_calculator().expect("create_calculator should succeed");
    let variable = library.create_variable(5.0).expect("create_variable should succeed");
    calc.enlist_variable(&variable).expect("enlist should succeed");

    let err = calc
        .apply("calculator-test", "overflow")
        .expect_err("non-finite results should be rejected");
    assert_eq!(err.code(), Some(CABI_ERR_INVALID_PARAM));
    assert_eq!(variable.value().expect("value should succeed"), 5.0);
}

#[test]
fn test_failed_enlist_returns_the_reference() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let variable = library.create_variable(1.0).expect("create_variable should succeed");
    let other = library.create_variable(2.0).expect("create_variable should succeed");

    // The variable passes the native check and is acquired before the
    // target turns out not to be a calculator.
    let pretend = Calculator::from_instance(other.into_instance());
    let err = pretend
        .enlist_variable(&variable)
        .expect_err("a variable cannot enlist anything");
    assert!(err.is_invalid_cast(), "expected INVALIDCAST, got {:?}", err);
    assert_eq!(cabi::native::calculator::reference_count(variable.handle()), Some(1));
}

#[test]
fn test_apply_only_calls_host_functions() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    let calc = library.create_calculator().expect("create_calculator should succeed");
    let variable = library.create_variable(3.0).expect("create_variable should succeed");
    calc.enlist_variable(&variable).expect("enlist should succeed");

    for (namespace, name) in [
        ("calculator", "getversion"),
        ("calculator", "calculator_add"),
        ("abi", "lookupsymbol"),
        ("abi", "registersymbol"),
    ] {
        let err = calc
            .apply(namespace, name)
            .expect_err("component exports are not callables");
        assert_eq!(
            err.code(),
            Some(CABI_ERR_SYMBOL_NOT_FOUND),
            "{}::{} should not be applied",
            namespace,
            name
        );
    }
    assert_eq!(variable.value().expect("value should succeed"), 3.0);
}

#[test]
fn test_reserved_namespaces_cannot_be_registered() {
    init_logging();

    let library = CalculatorLibrary::load().expect("calculator should load");
    for namespace in ["abi", "zoo", "calculator", "primes"] {
        let err = library
            .register_function(namespace, "calculator_calculate", square)
            .expect_err("reserved namespaces should be rejected");
        assert_eq!(
            err.code(),
            Some(CABI_ERR_INVALID_PARAM),
            "{} should be reserved",
            namespace
        );
    }

    // Primes loads its own exports even when the host tried first.
    let primes = cabi::PrimesLibrary::load().expect("primes should load");
    let sieve = primes.create_sieve_calculator().expect("create should succeed");
    sieve.set_value(10).expect("set_value should succeed");
    sieve.calculate().expect("calculate should succeed");
    assert_eq!(sieve.primes().expect("primes should succeed"), vec![2, 3, 5, 7]);
}
