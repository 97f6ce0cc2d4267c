//! Native primes component: factorization and sieve calculators.
//!
//! Results are served as arrays of structs and of primitives. A progress
//! callback, if set, runs on the calling thread during `calculate` and can
//! abort it.

use std::ffi::c_void;
use std::sync::Mutex;

use super::buffer::write_array;
use super::object::lock_state;
use super::{
    out_param, symbol_lookup_method, NativeComponent, NativeError, NativeObject, NativeResult,
    ObjectTable,
};
use crate::ffi::raw::ProgressCallback;
use crate::ffi::{Handle, StatusCode};
use crate::types::{PrimeFactor, TypeTag, Version};

/// Sieve bounds above this are rejected instead of allocating the table.
const SIEVE_LIMIT: u64 = 1 << 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Factorization,
    Sieve,
}

enum Outcome {
    Factors(Vec<PrimeFactor>),
    Primes(Vec<u64>),
}

struct State {
    value: u64,
    callback: ProgressCallback,
    result: Option<Outcome>,
}

pub(crate) struct PrimesObject {
    kind: Kind,
    state: Mutex<State>,
}

impl NativeObject for PrimesObject {
    fn type_tag(&self) -> TypeTag {
        match self.kind {
            Kind::Factorization => TypeTag::from_qualified_name("Primes::FactorizationCalculator"),
            Kind::Sieve => TypeTag::from_qualified_name("Primes::SieveCalculator"),
        }
    }
}

static OBJECTS: ObjectTable<PrimesObject> = ObjectTable::new("Primes");

pub(crate) struct PrimesComponent;

impl NativeComponent for PrimesComponent {
    type Object = PrimesObject;

    const NAMESPACE: &'static str = "primes";
    const VERSION: Version = Version::new(1, 2, 0);

    fn objects() -> &'static ObjectTable<PrimesObject> {
        &OBJECTS
    }

    fn exports() -> Vec<(&'static str, usize)> {
        type EntryFn = unsafe extern "C" fn(*mut *mut c_void) -> StatusCode;
        type CreateFn = unsafe extern "C" fn(*mut Handle) -> StatusCode;
        type GetValueFn = unsafe extern "C" fn(Handle, *mut u64) -> StatusCode;
        type SetValueFn = unsafe extern "C" fn(Handle, u64) -> StatusCode;
        type HandleFn = unsafe extern "C" fn(Handle) -> StatusCode;
        type CallbackFn = unsafe extern "C" fn(Handle, ProgressCallback) -> StatusCode;
        type FactorsFn =
            unsafe extern "C" fn(Handle, u64, *mut u64, *mut PrimeFactor) -> StatusCode;
        type PrimesFn = unsafe extern "C" fn(Handle, u64, *mut u64, *mut u64) -> StatusCode;

        vec![
            ("getsymbollookupmethod", primes_getsymbollookupmethod as EntryFn as usize),
            (
                "createfactorizationcalculator",
                create_factorization_calculator as CreateFn as usize,
            ),
            ("createsievecalculator", create_sieve_calculator as CreateFn as usize),
            ("calculator_getvalue", get_value as GetValueFn as usize),
            ("calculator_setvalue", set_value as SetValueFn as usize),
            ("calculator_calculate", calculate as HandleFn as usize),
            ("calculator_setprogresscallback", set_progress_callback as CallbackFn as usize),
            (
                "factorizationcalculator_getprimefactors",
                prime_factors as FactorsFn as usize,
            ),
            ("sievecalculator_getprimes", primes as PrimesFn as usize),
        ]
    }
}

/// Entry point of the primes component.
///
/// # Safety
///
/// `address` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn primes_getsymbollookupmethod(address: *mut *mut c_void) -> StatusCode {
    symbol_lookup_method::<PrimesComponent>(address)
}

/// Current reference count of a primes object, `None` once destroyed.
pub fn reference_count(handle: Handle) -> Option<u32> {
    OBJECTS.reference_count(handle)
}

fn report(callback: ProgressCallback, progress: f32) -> NativeResult<()> {
    if let Some(callback) = callback {
        let mut abort = false;
        unsafe { callback(progress, &mut abort) };
        if abort {
            return Err(NativeError::aborted());
        }
    }
    Ok(())
}

fn factorize(
    value: u64,
    progress: &mut dyn FnMut(f32) -> NativeResult<()>,
) -> NativeResult<Vec<PrimeFactor>> {
    let mut factors = Vec::new();
    let mut rest = value;
    let mut divisor = 2u64;

    progress(0.0)?;
    while divisor <= rest / divisor {
        if rest % divisor == 0 {
            let mut multiplicity = 0u32;
            while rest % divisor == 0 {
                rest /= divisor;
                multiplicity += 1;
            }
            factors.push(PrimeFactor {
                prime: divisor,
                multiplicity,
            });
            progress(1.0 - rest as f32 / value as f32)?;
        }
        divisor += if divisor == 2 { 1 } else { 2 };
    }
    if rest > 1 {
        factors.push(PrimeFactor {
            prime: rest,
            multiplicity: 1,
        });
    }
    progress(1.0)?;
    Ok(factors)
}

fn sieve(limit: u64, progress: &mut dyn FnMut(f32) -> NativeResult<()>) -> NativeResult<Vec<u64>> {
    if limit > SIEVE_LIMIT {
        return Err(NativeError::invalid_param(format!(
            "sieve bound {} exceeds {}",
            limit, SIEVE_LIMIT
        )));
    }

    progress(0.0)?;
    let len = limit as usize + 1;
    let mut composite = vec![false; len];
    let mut candidate = 2usize;
    while candidate * candidate < len {
        if !composite[candidate] {
            for multiple in (candidate * candidate..len).step_by(candidate) {
                composite[multiple] = true;
            }
            progress((candidate * candidate) as f32 / len as f32)?;
        }
        candidate += 1;
    }
    progress(1.0)?;

    Ok((2..len)
        .filter(|&n| !composite[n])
        .map(|n| n as u64)
        .collect())
}

unsafe fn create(kind: Kind, out: *mut Handle) -> StatusCode {
    OBJECTS.guard(Handle::null(), || {
        let out = out_param(out)?;
        *out = OBJECTS.insert(PrimesObject {
            kind,
            state: Mutex::new(State {
                value: 0,
                callback: None,
                result: None,
            }),
        });
        Ok(())
    })
}

unsafe extern "C" fn create_factorization_calculator(calculator: *mut Handle) -> StatusCode {
    create(Kind::Factorization, calculator)
}

unsafe extern "C" fn create_sieve_calculator(calculator: *mut Handle) -> StatusCode {
    create(Kind::Sieve, calculator)
}

unsafe extern "C" fn get_value(calculator: Handle, value: *mut u64) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let out = out_param(value)?;
        let entry = OBJECTS.get(calculator)?;
        *out = lock_state(&entry.state).value;
        Ok(())
    })
}

unsafe extern "C" fn set_value(calculator: Handle, value: u64) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let entry = OBJECTS.get(calculator)?;
        let mut state = lock_state(&entry.state);
        state.value = value;
        state.result = None;
        Ok(())
    })
}

unsafe extern "C" fn set_progress_callback(
    calculator: Handle,
    callback: ProgressCallback,
) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let entry = OBJECTS.get(calculator)?;
        lock_state(&entry.state).callback = callback;
        Ok(())
    })
}

unsafe extern "C" fn calculate(calculator: Handle) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let entry = OBJECTS.get(calculator)?;
        let (value, callback) = {
            let state = lock_state(&entry.state);
            (state.value, state.callback)
        };

        // The state lock is not held while the callback runs.
        let mut progress = |fraction: f32| report(callback, fraction);
        let outcome = match entry.kind {
            Kind::Factorization => Outcome::Factors(factorize(value, &mut progress)?),
            Kind::Sieve => Outcome::Primes(sieve(value, &mut progress)?),
        };

        let mut state = lock_state(&entry.state);
        if state.value != value {
            return Err(NativeError::generic(format!(
                "value changed from {} to {} during the calculation",
                value, state.value
            )));
        }
        state.result = Some(outcome);
        Ok(())
    })
}

unsafe extern "C" fn prime_factors(
    calculator: Handle,
    capacity: u64,
    needed: *mut u64,
    buffer: *mut PrimeFactor,
) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let entry = OBJECTS.get(calculator)?;
        if entry.kind != Kind::Factorization {
            return Err(NativeError::invalid_cast("not a factorization calculator"));
        }
        let state = lock_state(&entry.state);
        let written = match &state.result {
            Some(Outcome::Factors(factors)) => write_array(factors, capacity, needed, buffer),
            _ => Err(NativeError::no_result("no factorization has been calculated")),
        };
        written
    })
}

unsafe extern "C" fn primes(
    calculator: Handle,
    capacity: u64,
    needed: *mut u64,
    buffer: *mut u64,
) -> StatusCode {
    OBJECTS.guard(calculator, || {
        let entry = OBJECTS.get(calculator)?;
        if entry.kind != Kind::Sieve {
            return Err(NativeError::invalid_cast("not a sieve calculator"));
        }
        let state = lock_state(&entry.state);
        let written = match &state.result {
            Some(Outcome::Primes(primes)) => write_array(primes, capacity, needed, buffer),
            _ => Err(NativeError::no_result("no primes have been calculated")),
        };
        written
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::ffi::{CABI_ERR_GENERIC, CABI_ERR_NO_RESULT, CABI_OK};

    fn no_progress(_: f32) -> NativeResult<()> {
        Ok(())
    }

    #[test]
    fn test_factorize() {
        let factors = factorize(360, &mut no_progress).expect("factorize should succeed");
        assert_eq!(
            factors,
            vec![
                PrimeFactor { prime: 2, multiplicity: 3 },
                PrimeFactor { prime: 3, multiplicity: 2 },
                PrimeFactor { prime: 5, multiplicity: 1 },
            ]
        );

        let large_prime = factorize(1_000_000_007, &mut no_progress).expect("should succeed");
        assert_eq!(large_prime, vec![PrimeFactor { prime: 1_000_000_007, multiplicity: 1 }]);

        assert!(factorize(1, &mut no_progress).expect("should succeed").is_empty());
    }

    #[test]
    fn test_sieve_is_inclusive() {
        let primes = sieve(29, &mut no_progress).expect("sieve should succeed");
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(sieve(1, &mut no_progress).expect("should succeed").is_empty());
    }

    #[test]
    fn test_sieve_rejects_huge_bounds() {
        let err = sieve(SIEVE_LIMIT + 1, &mut no_progress).expect_err("should be rejected");
        assert_eq!(err.code, crate::ffi::CABI_ERR_INVALID_PARAM);
    }

    static CHANGED_CALCULATOR: AtomicU64 = AtomicU64::new(0);

    unsafe extern "C" fn change_value(_progress: f32, _should_abort: *mut bool) {
        let calculator = Handle::from_raw(CHANGED_CALCULATOR.load(Ordering::SeqCst));
        set_value(calculator, 99);
    }

    #[test]
    fn test_value_changed_during_calculation_fails() {
        let mut calculator = Handle::null();
        unsafe {
            assert_eq!(create_factorization_calculator(&mut calculator), CABI_OK);
            CHANGED_CALCULATOR.store(calculator.as_raw(), Ordering::SeqCst);
            assert_eq!(set_value(calculator, 360), CABI_OK);
            assert_eq!(set_progress_callback(calculator, Some(change_value)), CABI_OK);

            assert_eq!(calculate(calculator), CABI_ERR_GENERIC);
            assert_eq!(
                OBJECTS.last_error(calculator).expect("last_error should succeed"),
                Some("value changed from 360 to 99 during the calculation".to_string())
            );

            let mut value = 0;
            assert_eq!(get_value(calculator, &mut value), CABI_OK);
            assert_eq!(value, 99);
            let mut needed = 0;
            assert_eq!(
                prime_factors(calculator, 0, &mut needed, std::ptr::null_mut()),
                CABI_ERR_NO_RESULT
            );
        }
        OBJECTS.release(calculator).expect("release should succeed");
    }

    #[test]
    fn test_progress_can_abort() {
        let mut calls = 0;
        let mut stop_after_first = |_: f32| {
            calls += 1;
            if calls > 1 {
                Err(NativeError::aborted())
            } else {
                Ok(())
            }
        };
        let err = factorize(360, &mut stop_after_first).expect_err("should abort");
        assert_eq!(err.code, crate::ffi::CABI_ERR_ABORTED);
    }
}
