//! Validates a [`ModelConfig`], builds the membrane model and integrates it
//! over a uniform sample grid.

use std::collections::BTreeMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::{
    error::{InvalidParameterError, MembraneSimulationError},
    integrator::{CancelFlag, Integrator, SolverOptions},
    membrane::{MembraneModel, MembraneState},
    registry::{Channel, ModelRegistry, ModelVariant, VariantId},
    trajectory::Trajectory,
};


/// Everything needed to run one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub variant: VariantId,
    /// Conductance overrides (mS/cm^2), channels not listed use the variant default
    #[serde(default)]
    pub conductances: BTreeMap<Channel, f64>,
    /// External stimulus current (uA/cm^2)
    pub i_ext: f64,
    /// Initial `(V, gates...)`, the variant default when absent
    #[serde(default)]
    pub initial_state: Option<MembraneState>,
    /// End of the simulated span, which starts at 0 (ms)
    pub t_end: f64,
    /// Number of output samples including both endpoints
    pub samples: usize,
    #[serde(default)]
    pub solver: SolverOptions,
}

impl ModelConfig {
    /// Config holding the documented defaults of a built-in variant
    pub fn from_variant(id: VariantId) -> Self {
        let defaults = ModelRegistry::builtin().get(id).defaults;

        ModelConfig {
            variant: id,
            conductances: BTreeMap::new(),
            i_ext: defaults.i_ext,
            initial_state: None,
            t_end: defaults.t_end,
            samples: defaults.samples,
            solver: SolverOptions::default(),
        }
    }
}

/// Runs simulations against a model registry
#[derive(Debug, Clone, Copy)]
pub struct SimulationDriver {
    registry: &'static ModelRegistry,
}

impl Default for SimulationDriver {
    fn default() -> Self {
        SimulationDriver { registry: ModelRegistry::builtin() }
    }
}

impl SimulationDriver {
    /// Driver over the built-in variants
    pub fn new() -> Self {
        SimulationDriver::default()
    }

    pub fn registry(&self) -> &'static ModelRegistry {
        self.registry
    }

    fn validate(&self, config: &ModelConfig) -> Result<(&'static ModelVariant, MembraneState), InvalidParameterError> {
        for (channel, value) in &config.conductances {
            if !value.is_finite() {
                return Err(InvalidParameterError::NonFinite { name: "conductance", value: *value });
            }
            if *value < 0. {
                return Err(InvalidParameterError::NegativeConductance { channel: *channel, value: *value });
            }
        }

        if !config.t_end.is_finite() {
            return Err(InvalidParameterError::NonFinite { name: "t_end", value: config.t_end });
        }
        if config.t_end <= 0. {
            return Err(InvalidParameterError::NonPositiveTimeSpan(config.t_end));
        }
        if config.samples < 2 {
            return Err(InvalidParameterError::TooFewSamples(config.samples));
        }

        let variant = self.registry.get(config.variant);
        let initial_state = config.initial_state.clone()
            .unwrap_or_else(|| MembraneState::from(variant.defaults.initial_state));

        if initial_state.dimension() != variant.dimension() {
            return Err(InvalidParameterError::StateDimensionMismatch {
                expected: variant.dimension(),
                found: initial_state.dimension(),
            });
        }
        if !initial_state.voltage().is_finite() {
            return Err(InvalidParameterError::NonFinite { name: "V", value: initial_state.voltage() });
        }
        for (gate, value) in variant.gates.iter().zip(initial_state.gates()) {
            if !(0. ..=1.).contains(value) {
                return Err(InvalidParameterError::GateOutOfRange { gate: gate.name, value: *value });
            }
        }

        config.solver.validate()?;

        Ok((variant, initial_state))
    }

    fn run(&self, config: &ModelConfig, cancel: Option<&CancelFlag>) -> Result<Trajectory, MembraneSimulationError> {
        let (variant, initial_state) = self.validate(config)?;
        let model = MembraneModel::new(variant, &config.conductances, config.i_ext)?;

        let last = config.samples - 1;
        let times: Vec<f64> = (0..config.samples)
            .map(|k| if k == last { config.t_end } else { config.t_end * k as f64 / last as f64 })
            .collect();

        debug!(
            variant = variant.id.as_str(),
            i_ext = config.i_ext,
            t_end = config.t_end,
            samples = config.samples,
            "starting simulation"
        );

        let labels = variant.labels();
        let (trajectory, _) = Integrator::new(config.solver)
            .integrate(&model, initial_state.as_slice(), &times, cancel)
            .map_err(|err| match err {
                MembraneSimulationError::Integration(mut failure) => {
                    failure.partial = failure.partial.clone().with_labels(labels.clone());
                    MembraneSimulationError::Integration(failure)
                },
                other => other,
            })?;

        Ok(trajectory.with_labels(labels))
    }

    /// Simulates one configuration
    pub fn simulate(&self, config: &ModelConfig) -> Result<Trajectory, MembraneSimulationError> {
        self.run(config, None)
    }

    /// Simulates one configuration, giving up with `Cancelled` once `cancel` is set
    pub fn simulate_with_cancel(
        &self,
        config: &ModelConfig,
        cancel: &CancelFlag,
    ) -> Result<Trajectory, MembraneSimulationError> {
        self.run(config, Some(cancel))
    }

    /// Simulates independent configurations in parallel, results are in input order
    pub fn simulate_batch(&self, configs: &[ModelConfig]) -> Vec<Result<Trajectory, MembraneSimulationError>> {
        configs.par_iter()
            .map(|config| self.simulate(config))
            .collect()
    }
}

/// Simulates `config` against the built-in registry
pub fn simulate(config: &ModelConfig) -> Result<Trajectory, MembraneSimulationError> {
    SimulationDriver::new().simulate(config)
}
