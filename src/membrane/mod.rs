//! Conductance based membrane equations for any registry variant.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::{
    error::{InvalidParameterError, MembraneSimulationError, RateEvaluationError},
    integrator::{OdeSystem, QuasiLinearSystem},
    registry::{Channel, IonicCurrent, ModelVariant},
};


/// State vector `(V, gates...)` with the voltage (mV) first and gating values
/// in the variant's gate order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembraneState(Vec<f64>);

impl MembraneState {
    pub fn new(voltage: f64, gates: &[f64]) -> Self {
        MembraneState(std::iter::once(voltage).chain(gates.iter().copied()).collect())
    }

    /// Membrane potential (mV)
    pub fn voltage(&self) -> f64 {
        self.0.first().copied().unwrap_or(f64::NAN)
    }

    /// Gating values
    pub fn gates(&self) -> &[f64] {
        self.0.get(1..).unwrap_or(&[])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<f64>> for MembraneState {
    fn from(values: Vec<f64>) -> Self {
        MembraneState(values)
    }
}

impl From<&[f64]> for MembraneState {
    fn from(values: &[f64]) -> Self {
        MembraneState(values.to_vec())
    }
}

/// A variant bound to its conductances and external current
#[derive(Debug, Clone)]
pub struct MembraneModel {
    variant: &'static ModelVariant,
    /// Maximal conductance per variant current, in current order (mS/cm^2)
    conductances: Vec<f64>,
    /// External stimulus current (uA/cm^2)
    i_ext: f64,
}

impl MembraneModel {
    /// Binds `variant` to its default conductances with `overrides` applied,
    /// rejecting negative or non-finite conductances, channels the variant
    /// does not carry and a non-finite external current
    pub fn new(
        variant: &'static ModelVariant,
        overrides: &BTreeMap<Channel, f64>,
        i_ext: f64,
    ) -> Result<Self, InvalidParameterError> {
        if !i_ext.is_finite() {
            return Err(InvalidParameterError::NonFinite { name: "i_ext", value: i_ext });
        }

        for (channel, value) in overrides {
            if variant.current(*channel).is_none() {
                return Err(InvalidParameterError::ChannelNotInVariant {
                    variant: variant.id.as_str(),
                    channel: *channel,
                });
            }
            if !value.is_finite() {
                return Err(InvalidParameterError::NonFinite { name: "conductance", value: *value });
            }
            if *value < 0. {
                return Err(InvalidParameterError::NegativeConductance { channel: *channel, value: *value });
            }
        }

        let conductances: Vec<f64> = variant.currents.iter()
            .map(|current| overrides.get(&current.channel).copied().unwrap_or(current.default_conductance))
            .collect();

        for (current, g) in variant.currents.iter().zip(conductances.iter()) {
            let (low, high) = current.conductance_range;
            if *g < low || *g > high {
                warn!(
                    variant = variant.id.as_str(),
                    channel = current.channel.as_str(),
                    conductance = g,
                    "conductance outside documented range [{}, {}]", low, high
                );
            }
        }

        let (low, high) = variant.defaults.i_ext_range;
        if i_ext < low || i_ext > high {
            warn!(variant = variant.id.as_str(), i_ext, "external current outside documented range [{}, {}]", low, high);
        }

        Ok(MembraneModel { variant, conductances, i_ext })
    }

    pub fn variant(&self) -> &'static ModelVariant {
        self.variant
    }

    pub fn i_ext(&self) -> f64 {
        self.i_ext
    }

    /// Maximal conductance of a channel, `None` if the variant lacks it
    pub fn conductance(&self, channel: Channel) -> Option<f64> {
        self.variant.currents.iter()
            .position(|current| current.channel == channel)
            .map(|index| self.conductances[index])
    }

    fn check_dimension(&self, found: usize) -> Result<(), InvalidParameterError> {
        let expected = self.variant.dimension();
        if found != expected {
            return Err(InvalidParameterError::StateDimensionMismatch { expected, found });
        }

        Ok(())
    }

    // g * prod(gate^power), the open conductance of a current
    fn open_conductance(current: &IonicCurrent, g_max: f64, gates: &[f64]) -> f64 {
        current.gates.iter()
            .fold(g_max, |acc, term| acc * gates[term.gate].powi(term.power))
    }

    fn derivative_into(&self, y: &[f64], dydt: &mut [f64]) -> Result<(), RateEvaluationError> {
        let v = y[0];
        let gates = &y[1..];

        for (n, gate) in self.variant.gates.iter().enumerate() {
            dydt[n + 1] = gate.derivative(v, gates[n])?;
        }

        let ionic: f64 = self.variant.currents.iter()
            .zip(self.conductances.iter())
            .map(|(current, g_max)| Self::open_conductance(current, *g_max, gates) * (v - current.reversal))
            .sum();

        dydt[0] = (self.i_ext - ionic) / self.variant.c_m;

        Ok(())
    }

    fn split_into(&self, y: &[f64], a: &mut [f64], b: &mut [f64]) -> Result<(), RateEvaluationError> {
        let v = y[0];
        let gates = &y[1..];

        for (n, gate) in self.variant.gates.iter().enumerate() {
            let (alpha, beta) = gate.rates(v)?;
            a[n + 1] = alpha;
            b[n + 1] = alpha + beta;
        }

        let (mut total, mut driven) = (0., 0.);
        for (current, g_max) in self.variant.currents.iter().zip(self.conductances.iter()) {
            let open = Self::open_conductance(current, *g_max, gates);
            total += open;
            driven += open * current.reversal;
        }

        a[0] = (self.i_ext + driven) / self.variant.c_m;
        b[0] = total / self.variant.c_m;

        Ok(())
    }

    /// Time derivative of `state`, the system is autonomous so `t` only
    /// documents where the derivative is taken
    pub fn derivative(&self, _t: f64, state: &MembraneState) -> Result<MembraneState, MembraneSimulationError> {
        self.check_dimension(state.dimension())?;

        let mut dydt = vec![0.; state.dimension()];
        self.derivative_into(state.as_slice(), &mut dydt)?;

        Ok(MembraneState(dydt))
    }

    /// Ionic current carried by each channel at `state` (uA/cm^2)
    pub fn currents(&self, state: &MembraneState) -> Result<Vec<(Channel, f64)>, InvalidParameterError> {
        self.check_dimension(state.dimension())?;

        let v = state.voltage();
        let gates = state.gates();

        Ok(
            self.variant.currents.iter()
                .zip(self.conductances.iter())
                .map(|(current, g_max)| {
                    (current.channel, Self::open_conductance(current, *g_max, gates) * (v - current.reversal))
                })
                .collect()
        )
    }

    /// State with every gate at its steady state for voltage `v`
    pub fn steady_state(&self, v: f64) -> Result<MembraneState, RateEvaluationError> {
        let gates = self.variant.gates.iter()
            .map(|gate| gate.steady_state(v))
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(MembraneState::new(v, &gates))
    }
}

impl OdeSystem for MembraneModel {
    fn dimension(&self) -> usize {
        self.variant.dimension()
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), MembraneSimulationError> {
        Ok(self.derivative_into(y, dydt)?)
    }

    // gating variables are probabilities
    fn is_admissible(&self, y: &[f64]) -> bool {
        y.iter().skip(1).all(|g| (0. ..=1.).contains(g))
    }
}

impl QuasiLinearSystem for MembraneModel {
    fn split(&self, _t: f64, y: &[f64], a: &mut [f64], b: &mut [f64]) -> Result<(), MembraneSimulationError> {
        Ok(self.split_into(y, a, b)?)
    }
}
