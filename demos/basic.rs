//! Basic example driving the three reference components.
//!
//! Run with: cargo run --example basic

use cabi::dispatch::{classify, Resolved};
use cabi::zoo::ZooObject;
use cabi::{CalculatorLibrary, Class, PrimesLibrary, Species, ZooLibrary};

extern "C" fn cube(value: f64) -> f64 {
    value * value * value
}

unsafe extern "C" fn print_progress(progress: f32, _should_abort: *mut bool) {
    println!("  progress: {:.0}%", progress * 100.0);
}

fn main() -> cabi::Result<()> {
    env_logger::init();

    println!("--- Zoo ---");
    let zoo_library = ZooLibrary::load()?;
    println!("Binary version: {}", zoo_library.version()?);

    let zoo = zoo_library.create_zoo()?;
    zoo.add_animal(Species::Axolotl, "Axel Axolotl")?;
    println!("Animals: {}", zoo.animal_count()?);

    for animal in zoo.iter()? {
        let animal = animal?;
        let name = animal.name()?;
        match classify(animal.into_instance())? {
            Resolved::Known(ZooObject::Tiger(tiger)) => println!("  {}", tiger.roar()?),
            Resolved::Known(other) => println!("  {} ({:?})", name, other),
            Resolved::Unknown(instance) => {
                println!("  {} (unknown type {})", name, instance.class_type_id()?)
            }
        }
    }

    println!("\n--- Calculator ---");
    let calculator_library = CalculatorLibrary::load()?;
    calculator_library.register_function("demo", "cube", cube)?;

    let calculator = calculator_library.create_calculator()?;
    for value in [1.0, 2.0, 3.0] {
        let variable = calculator_library.create_variable(value)?;
        calculator.enlist_variable(&variable)?;
    }
    println!("Sum: {}", calculator.add()?.value()?);
    calculator.apply("demo", "cube")?;
    println!("Sum of cubes: {}", calculator.add()?.value()?);

    if let Err(err) = calculator_library.create_variable(f64::NAN) {
        println!("Expected failure: {}", err);
    }

    println!("\n--- Primes ---");
    let primes_library = PrimesLibrary::load()?;
    let factorization = primes_library.create_factorization_calculator()?;
    factorization.set_progress_callback(Some(print_progress))?;
    factorization.set_value(2 * 2 * 3 * 97)?;
    factorization.calculate()?;
    for factor in factorization.prime_factors()? {
        println!("  {}^{}", factor.prime, factor.multiplicity);
    }

    let sieve = primes_library.create_sieve_calculator()?;
    sieve.set_value(50)?;
    sieve.calculate()?;
    println!("Primes up to 50: {:?}", sieve.primes()?);

    Ok(())
}
