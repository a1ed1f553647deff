extern crate membrane_excitability;
use membrane_excitability::{
    error::MembraneSimulationError,
    integrator::{Method, SolverOptions},
    registry::ModelRegistry,
    simulation::{ModelConfig, SimulationDriver},
};


// Runs every cardiac variant in parallel with automatic stiffness switching
// and prints a summary of each action potential
fn main() -> Result<(), MembraneSimulationError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let driver = SimulationDriver::new();
    let configs: Vec<ModelConfig> = driver.registry()
        .variants()
        .skip(1)
        .map(|variant| ModelConfig {
            solver: SolverOptions { method: Method::Auto, ..SolverOptions::default() },
            ..ModelConfig::from_variant(variant.id)
        })
        .collect();

    println!("variant,peak_time,peak_voltage,upstrokes,final_voltage");
    for (config, result) in configs.iter().zip(driver.simulate_batch(&configs)) {
        let trajectory = result?;
        let (peak_time, peak_voltage) = trajectory.peak_voltage().unwrap_or((f64::NAN, f64::NAN));
        let final_voltage = trajectory.final_state().map_or(f64::NAN, |state| state.voltage());

        println!(
            "{},{},{},{},{}",
            config.variant,
            peak_time,
            peak_voltage,
            trajectory.spike_times(0.).len(),
            final_voltage,
        );
    }

    for variant in ModelRegistry::builtin().variants() {
        for note in variant.notes {
            eprintln!("note on {}: {}", variant.id, note);
        }
    }

    Ok(())
}
