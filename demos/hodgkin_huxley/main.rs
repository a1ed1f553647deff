use std::{
    env,
    io::{stdout, BufWriter, Write},
    process::ExitCode,
};
extern crate membrane_excitability;
use membrane_excitability::{
    config::from_toml_file,
    error::MembraneSimulationError,
    registry::VariantId,
    simulation::{ModelConfig, SimulationDriver},
    trajectory::Trajectory,
};


fn write_csv(trajectory: &Trajectory) -> std::io::Result<()> {
    let mut out = BufWriter::new(stdout().lock());

    writeln!(out, "t,{}", trajectory.labels().join(","))?;
    for (t, row) in trajectory.times().iter().zip(trajectory.states().rows()) {
        let values: Vec<String> = row.iter().map(|value| value.to_string()).collect();
        writeln!(out, "{},{}", t, values.join(","))?;
    }

    out.flush()
}

fn run() -> Result<Trajectory, MembraneSimulationError> {
    let config = match env::args().nth(1) {
        Some(path) => from_toml_file(path)?,
        None => ModelConfig { i_ext: 10., ..ModelConfig::from_variant(VariantId::HhClassic) },
    };

    SimulationDriver::new().simulate(&config)
}

// Simulates a Hodgkin-Huxley membrane under static current input, or the
// model described by a .toml file given as the first argument, and writes
// the trajectory as .csv to stdout
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let trajectory = match run() {
        Ok(trajectory) => trajectory,
        Err(e) => {
            eprintln!("simulation failed: {}", e);
            return ExitCode::FAILURE;
        },
    };

    tracing::info!(
        spikes = trajectory.spike_times(0.).len(),
        peaks = trajectory.find_peaks(0.01).len(),
        "simulation finished"
    );

    match write_csv(&trajectory) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("could not write trajectory: {}", e);
            ExitCode::FAILURE
        },
    }
}
