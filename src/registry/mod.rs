//! Catalog of the built-in membrane model variants.
//!
//! Each [`ModelVariant`] is a complete, independently specified table of
//! constants, gates and currents. The catalog is a `'static` value so it can
//! be shared between threads without synchronization and cannot be mutated
//! after startup.

use std::{fmt::{Display, Formatter}, str::FromStr};
use serde::{Deserialize, Serialize};
use crate::{error::UnknownVariantError, rates::{GatingVariable, RateLaw}};


/// Ion channel kinds a variant may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "na")]
    Sodium,
    #[serde(rename = "k")]
    Potassium,
    #[serde(rename = "leak")]
    Leak,
    #[serde(rename = "ca_l")]
    CalciumL,
}

impl Channel {
    /// Identifier used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sodium => "na",
            Channel::Potassium => "k",
            Channel::Leak => "leak",
            Channel::CalciumL => "ca_l",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "na" => Ok(Channel::Sodium),
            "k" => Ok(Channel::Potassium),
            "leak" => Ok(Channel::Leak),
            "ca_l" => Ok(Channel::CalciumL),
            _ => Err(format!("unknown channel {:?}", s)),
        }
    }
}

/// Identifier of a built-in variant, discriminants index the registry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantId {
    HhClassic = 0,
    LuoRudyBasic = 1,
    LuoRudyCalcium = 2,
    NobleBasic = 3,
    NobleCalcium = 4,
    NobleCalciumSharedGating = 5,
}

impl VariantId {
    /// All identifiers in registry order
    pub const ALL: [VariantId; 6] = [
        VariantId::HhClassic,
        VariantId::LuoRudyBasic,
        VariantId::LuoRudyCalcium,
        VariantId::NobleBasic,
        VariantId::NobleCalcium,
        VariantId::NobleCalciumSharedGating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantId::HhClassic => "hh_classic",
            VariantId::LuoRudyBasic => "luo_rudy_basic",
            VariantId::LuoRudyCalcium => "luo_rudy_calcium",
            VariantId::NobleBasic => "noble_basic",
            VariantId::NobleCalcium => "noble_calcium",
            VariantId::NobleCalciumSharedGating => "noble_calcium_shared_gating",
        }
    }
}

impl Display for VariantId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VariantId {
    type Err = UnknownVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantId::ALL.iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownVariantError { identifier: s.to_string() })
    }
}

/// One factor of a current's gating product, `state[gate]^power`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateTerm {
    /// Index into the variant's gate list
    pub gate: usize,
    pub power: i32,
}

/// An ionic current `g * prod(gate^power) * (V - reversal)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IonicCurrent {
    pub channel: Channel,
    /// Reversal potential (mV)
    pub reversal: f64,
    /// Gating product factors, empty for a leak
    pub gates: &'static [GateTerm],
    /// Default maximal conductance (mS/cm^2)
    pub default_conductance: f64,
    /// Documented physiological conductance range (mS/cm^2)
    pub conductance_range: (f64, f64),
}

/// Defaults a collaborator falls back to when a value is not supplied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantDefaults {
    /// External current (uA/cm^2)
    pub i_ext: f64,
    /// Documented physiological range of the external current (uA/cm^2)
    pub i_ext_range: (f64, f64),
    /// Initial state `(V, gates...)`
    pub initial_state: &'static [f64],
    /// Simulated span (ms)
    pub t_end: f64,
    /// Number of output samples
    pub samples: usize,
}

/// A fully specified membrane model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelVariant {
    pub id: VariantId,
    /// Human readable name
    pub name: &'static str,
    /// Membrane capacitance (uF/cm^2)
    pub c_m: f64,
    /// Gating variables in state order (state index = gate index + 1)
    pub gates: &'static [GatingVariable],
    pub currents: &'static [IonicCurrent],
    pub defaults: VariantDefaults,
    /// Known discrepancies in the kinetics tables
    pub notes: &'static [&'static str],
}

impl ModelVariant {
    /// State dimension, voltage plus one entry per gate
    pub fn dimension(&self) -> usize {
        1 + self.gates.len()
    }

    /// Variable labels in state order
    pub fn labels(&self) -> Vec<String> {
        std::iter::once("V")
            .chain(self.gates.iter().map(|gate| gate.name))
            .map(String::from)
            .collect()
    }

    /// Current carried by a given channel, if present
    pub fn current(&self, channel: Channel) -> Option<&IonicCurrent> {
        self.currents.iter().find(|current| current.channel == channel)
    }

    /// Index of the named gate
    pub fn gate_index(&self, name: &str) -> Option<usize> {
        self.gates.iter().position(|gate| gate.name == name)
    }
}

/// Immutable lookup table of model variants
#[derive(Debug)]
pub struct ModelRegistry {
    variants: &'static [ModelVariant],
}

static BUILTIN: ModelRegistry = ModelRegistry { variants: &BUILTIN_VARIANTS };

impl ModelRegistry {
    /// Process-wide registry of the built-in variants
    pub fn builtin() -> &'static ModelRegistry {
        &BUILTIN
    }

    /// Resolves a variant by identifier
    pub fn get(&self, id: VariantId) -> &'static ModelVariant {
        &self.variants[id as usize]
    }

    /// Resolves a variant by its textual identifier
    pub fn lookup(&self, identifier: &str) -> Result<&'static ModelVariant, UnknownVariantError> {
        identifier.parse::<VariantId>().map(|id| self.get(id))
    }

    /// Iterates the catalog in identifier order
    pub fn variants(&self) -> impl Iterator<Item = &'static ModelVariant> {
        self.variants.iter()
    }
}

const M: usize = 0;
const H: usize = 1;
const N: usize = 2;
const D: usize = 3;

const SODIUM_TERMS: [GateTerm; 2] = [GateTerm { gate: M, power: 3 }, GateTerm { gate: H, power: 1 }];
const POTASSIUM_TERMS: [GateTerm; 1] = [GateTerm { gate: N, power: 4 }];
const CALCIUM_TERMS: [GateTerm; 1] = [GateTerm { gate: D, power: 1 }];

const fn current(
    channel: Channel,
    reversal: f64,
    gates: &'static [GateTerm],
    default_conductance: f64,
    conductance_range: (f64, f64),
) -> IonicCurrent {
    IonicCurrent { channel, reversal, gates, default_conductance, conductance_range }
}

// classic squid axon kinetics
const HH_GATES: [GatingVariable; 3] = [
    GatingVariable {
        name: "m",
        alpha: RateLaw::Linoid { a: 0.1, v0: -40., k: 10. },
        beta: RateLaw::Exponential { a: 4., slope: -0.0556, v0: -65. },
    },
    GatingVariable {
        name: "h",
        alpha: RateLaw::Exponential { a: 0.07, slope: -0.05, v0: -65. },
        beta: RateLaw::Sigmoid { a: 1., slope: -0.1, v0: -35. },
    },
    GatingVariable {
        name: "n",
        alpha: RateLaw::Linoid { a: 0.01, v0: -55., k: 10. },
        beta: RateLaw::Exponential { a: 0.125, slope: -0.0125, v0: -65. },
    },
];

const LUO_RUDY_BETA_H: [RateLaw; 2] = [
    RateLaw::Exponential { a: 3.56, slope: 0.079, v0: 0. },
    RateLaw::Exponential { a: 310000., slope: 0.35, v0: 0. },
];

const LUO_RUDY_M: GatingVariable = GatingVariable {
    name: "m",
    alpha: RateLaw::Linoid { a: 0.32, v0: -47.13, k: 5. },
    beta: RateLaw::Exponential { a: 0.08, slope: -1. / 11., v0: 0. },
};
const LUO_RUDY_H: GatingVariable = GatingVariable {
    name: "h",
    alpha: RateLaw::Exponential { a: 0.135, slope: -1. / 6.8, v0: -80. },
    beta: RateLaw::Sum(&LUO_RUDY_BETA_H),
};
const LUO_RUDY_N: GatingVariable = GatingVariable {
    name: "n",
    alpha: RateLaw::Linoid { a: 0.02, v0: -50., k: 10. },
    beta: RateLaw::Exponential { a: 0.5, slope: -1. / 40., v0: -55. },
};

// L-type calcium activation, written as a/(1 + exp(...)) which equals the
// exp(u)/(1 + exp(u)) form without overflowing for large |V|
const CALCIUM_D_ALPHA: RateLaw = RateLaw::Sigmoid { a: 0.095, slope: 0.1, v0: -50. };
const CALCIUM_D_BETA: RateLaw = RateLaw::Sigmoid { a: 0.07, slope: 0.05, v0: -70. };

const fn calcium_kinetics(name: &'static str) -> GatingVariable {
    GatingVariable { name, alpha: CALCIUM_D_ALPHA, beta: CALCIUM_D_BETA }
}

const NOBLE_M: GatingVariable = GatingVariable {
    name: "m",
    alpha: RateLaw::Linoid { a: 0.1, v0: -48., k: 15. },
    beta: RateLaw::Linoid { a: -0.12, v0: -8., k: -5. },
};
const NOBLE_H: GatingVariable = GatingVariable {
    name: "h",
    alpha: RateLaw::Exponential { a: 0.17, slope: -0.08, v0: -57. },
    beta: RateLaw::Sigmoid { a: 1., slope: -0.15, v0: -23. },
};
const NOBLE_N: GatingVariable = GatingVariable {
    name: "n",
    alpha: RateLaw::Linoid { a: 0.0001, v0: -50., k: 10. },
    beta: RateLaw::Exponential { a: 0.002, slope: -0.05, v0: -55. },
};

const LUO_RUDY_GATES: [GatingVariable; 3] = [LUO_RUDY_M, LUO_RUDY_H, LUO_RUDY_N];
const LUO_RUDY_CALCIUM_GATES: [GatingVariable; 4] = [LUO_RUDY_M, LUO_RUDY_H, LUO_RUDY_N, calcium_kinetics("d")];
const NOBLE_GATES: [GatingVariable; 3] = [NOBLE_M, NOBLE_H, NOBLE_N];
const NOBLE_CALCIUM_GATES: [GatingVariable; 4] = [NOBLE_M, NOBLE_H, NOBLE_N, calcium_kinetics("d")];
const NOBLE_SHARED_GATES: [GatingVariable; 4] = [
    calcium_kinetics("m"), calcium_kinetics("h"), calcium_kinetics("n"), calcium_kinetics("d"),
];

const HH_CURRENTS: [IonicCurrent; 3] = [
    current(Channel::Sodium, 50., &SODIUM_TERMS, 120., (0., 150.)),
    current(Channel::Potassium, -77., &POTASSIUM_TERMS, 36., (0., 50.)),
    current(Channel::Leak, -54.4, &[], 0.3, (0., 1.)),
];

const LUO_RUDY_CURRENTS: [IonicCurrent; 3] = [
    current(Channel::Sodium, 50., &SODIUM_TERMS, 120., (0., 150.)),
    current(Channel::Potassium, -85., &POTASSIUM_TERMS, 36., (0., 50.)),
    current(Channel::Leak, -60., &[], 0.3, (0., 1.)),
];
const LUO_RUDY_CALCIUM_CURRENTS: [IonicCurrent; 4] = [
    LUO_RUDY_CURRENTS[0],
    LUO_RUDY_CURRENTS[1],
    LUO_RUDY_CURRENTS[2],
    current(Channel::CalciumL, 120., &CALCIUM_TERMS, 0.09, (0., 1.)),
];

const NOBLE_CURRENTS: [IonicCurrent; 3] = [
    current(Channel::Sodium, 40., &SODIUM_TERMS, 70., (0., 100.)),
    current(Channel::Potassium, -100., &POTASSIUM_TERMS, 30., (0., 50.)),
    current(Channel::Leak, -60., &[], 0.1, (0., 1.)),
];
const NOBLE_CALCIUM_CURRENTS: [IonicCurrent; 4] = [
    NOBLE_CURRENTS[0],
    NOBLE_CURRENTS[1],
    NOBLE_CURRENTS[2],
    current(Channel::CalciumL, 120., &CALCIUM_TERMS, 0.09, (0., 1.)),
];

const CARDIAC_THREE_GATE_INIT: [f64; 4] = [-75., 0.02, 0.8, 0.1];
const CARDIAC_FOUR_GATE_INIT: [f64; 5] = [-75., 0.02, 0.8, 0.1, 0.01];

const NOBLE_CALCIUM_NOTE: &str = "one published formulation of the calcium Noble model drives m, h, n \
    and d with the d-gate kinetics; noble_calcium uses the Noble m/h/n table instead and \
    noble_calcium_shared_gating keeps the shared kinetics";

const BUILTIN_VARIANTS: [ModelVariant; 6] = [
    ModelVariant {
        id: VariantId::HhClassic,
        name: "Hodgkin-Huxley (1952)",
        c_m: 1.,
        gates: &HH_GATES,
        currents: &HH_CURRENTS,
        defaults: VariantDefaults {
            i_ext: 10.,
            i_ext_range: (0., 20.),
            initial_state: &[-65., 0.05, 0.6, 0.32],
            t_end: 50.,
            samples: 1000,
        },
        notes: &[],
    },
    ModelVariant {
        id: VariantId::LuoRudyBasic,
        name: "Luo-Rudy (1991)",
        c_m: 1.,
        gates: &LUO_RUDY_GATES,
        currents: &LUO_RUDY_CURRENTS,
        defaults: VariantDefaults {
            i_ext: 5.,
            i_ext_range: (-10., 20.),
            initial_state: &CARDIAC_THREE_GATE_INIT,
            t_end: 300.,
            samples: 5000,
        },
        notes: &[],
    },
    ModelVariant {
        id: VariantId::LuoRudyCalcium,
        name: "Luo-Rudy (1991) with L-type calcium current",
        c_m: 1.,
        gates: &LUO_RUDY_CALCIUM_GATES,
        currents: &LUO_RUDY_CALCIUM_CURRENTS,
        defaults: VariantDefaults {
            i_ext: 5.,
            i_ext_range: (-10., 20.),
            initial_state: &CARDIAC_FOUR_GATE_INIT,
            t_end: 300.,
            samples: 5000,
        },
        notes: &[],
    },
    ModelVariant {
        id: VariantId::NobleBasic,
        name: "Noble (1962)",
        c_m: 1.2,
        gates: &NOBLE_GATES,
        currents: &NOBLE_CURRENTS,
        defaults: VariantDefaults {
            i_ext: 5.,
            i_ext_range: (-10., 20.),
            initial_state: &CARDIAC_THREE_GATE_INIT,
            t_end: 100.,
            samples: 2000,
        },
        notes: &[],
    },
    ModelVariant {
        id: VariantId::NobleCalcium,
        name: "Noble (1962) with L-type calcium current",
        c_m: 1.2,
        gates: &NOBLE_CALCIUM_GATES,
        currents: &NOBLE_CALCIUM_CURRENTS,
        defaults: VariantDefaults {
            i_ext: 5.,
            i_ext_range: (-10., 20.),
            initial_state: &CARDIAC_FOUR_GATE_INIT,
            t_end: 100.,
            samples: 2000,
        },
        notes: &[NOBLE_CALCIUM_NOTE],
    },
    ModelVariant {
        id: VariantId::NobleCalciumSharedGating,
        name: "Noble (1962) with L-type calcium current, shared gate kinetics",
        c_m: 1.2,
        gates: &NOBLE_SHARED_GATES,
        currents: &NOBLE_CALCIUM_CURRENTS,
        defaults: VariantDefaults {
            i_ext: 5.,
            i_ext_range: (-10., 20.),
            initial_state: &CARDIAC_FOUR_GATE_INIT,
            t_end: 100.,
            samples: 2000,
        },
        notes: &[NOBLE_CALCIUM_NOTE],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_identifiers() {
        let registry = ModelRegistry::builtin();

        for id in VariantId::ALL {
            assert_eq!(registry.get(id).id, id);
        }
        assert_eq!(registry.variants().count(), VariantId::ALL.len());
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = ModelRegistry::builtin();

        for id in VariantId::ALL {
            assert_eq!(registry.lookup(id.as_str()).unwrap().id, id);
        }

        let err = registry.lookup("hh_modern").unwrap_err();
        assert_eq!(err.identifier, "hh_modern");
    }

    #[test]
    fn test_variant_shapes_are_consistent() {
        for variant in ModelRegistry::builtin().variants() {
            assert_eq!(variant.defaults.initial_state.len(), variant.dimension());
            assert_eq!(variant.labels().len(), variant.dimension());
            assert!(variant.c_m > 0.);

            for current in variant.currents {
                assert!(current.default_conductance >= 0.);
                for term in current.gates {
                    assert!(term.gate < variant.gates.len());
                    assert!(term.power > 0);
                }
            }
        }
    }

    #[test]
    fn test_calcium_variants_have_five_dimensional_state() {
        let registry = ModelRegistry::builtin();

        assert_eq!(registry.get(VariantId::HhClassic).dimension(), 4);
        assert_eq!(registry.get(VariantId::LuoRudyCalcium).dimension(), 5);
        assert_eq!(registry.get(VariantId::NobleCalcium).dimension(), 5);
        assert!(registry.get(VariantId::NobleBasic).current(Channel::CalciumL).is_none());
        assert_eq!(registry.get(VariantId::NobleCalcium).gate_index("d"), Some(3));
    }

    #[test]
    fn test_noble_calcium_discrepancy_is_flagged() {
        let registry = ModelRegistry::builtin();

        assert!(!registry.get(VariantId::NobleCalcium).notes.is_empty());
        assert!(!registry.get(VariantId::NobleCalciumSharedGating).notes.is_empty());
        assert!(registry.get(VariantId::HhClassic).notes.is_empty());
    }

    #[test]
    fn test_channel_names_round_trip() {
        for channel in [Channel::Sodium, Channel::Potassium, Channel::Leak, Channel::CalciumL] {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert!("cl".parse::<Channel>().is_err());
    }
}
