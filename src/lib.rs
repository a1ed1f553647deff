//! # Membrane Excitability
//!
//! `membrane_excitability` simulates conductance based (Hodgkin-Huxley style)
//! models of excitable membranes. A model is a membrane potential plus a set
//! of gating variables that open and close with voltage dependent rates,
//! ionic currents flow through channels whose conductance is the product of
//! their gates, and the membrane potential integrates the ionic and external
//! currents.
//!
//! The crate ships a catalog of variants, all driven by one generalized engine:
//!
//! - `hh_classic`, the squid giant axon model
//! - `luo_rudy_basic` and `luo_rudy_calcium`, ventricular myocyte kinetics
//!   without and with an L-type calcium current
//! - `noble_basic` and `noble_calcium`, Purkinje fibre kinetics
//! - `noble_calcium_shared_gating`, the calcium Noble model with every gate
//!   following the calcium activation kinetics
//!
//! Cardiac kinetics are very stiff during the upstroke, so integration
//! defaults to an adaptive exponential scheme that stays stable for any step
//! size and keeps every gating variable inside [0, 1]. An explicit
//! Dormand-Prince solver and an automatic mode that switches on detected
//! stiffness are also available, see [`integrator`].
//!
//! ## Example Code
//!
//! ### Hodgkin-Huxley model with static input
//!
//! ```rust
//! use membrane_excitability::{
//!     error::MembraneSimulationError,
//!     registry::VariantId,
//!     simulation::{ModelConfig, simulate},
//! };
//!
//! fn main() -> Result<(), MembraneSimulationError> {
//!     let config = ModelConfig {
//!         i_ext: 10.,
//!         t_end: 20.,
//!         samples: 400,
//!         ..ModelConfig::from_variant(VariantId::HhClassic)
//!     };
//!
//!     let trajectory = simulate(&config)?;
//!
//!     // first upward crossing of 0 mV is the first action potential
//!     let spikes = trajectory.spike_times(0.);
//!     assert!(!spikes.is_empty());
//!     assert!(trajectory.gating_within_bounds());
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Reading a configuration
//!
//! ```rust
//! use membrane_excitability::{config, simulation::SimulationDriver};
//!
//! let config = config::from_toml_str(r#"
//!     [simulation]
//!     variant = "noble_basic"
//!     i_ext = 0.0
//!     t_end = 10.0
//!     samples = 101
//!
//!     [simulation.solver]
//!     method = "auto"
//! "#).unwrap();
//!
//! let trajectory = SimulationDriver::new().simulate(&config).unwrap();
//! assert_eq!(trajectory.labels(), &["V", "m", "h", "n"]);
//! ```

pub mod config;
pub mod error;
pub mod integrator;
pub mod membrane;
pub mod rates;
pub mod registry;
pub mod simulation;
pub mod trajectory;

pub use error::MembraneSimulationError;
pub use integrator::{CancelFlag, Method, SolverOptions};
pub use membrane::{MembraneModel, MembraneState};
pub use registry::{Channel, ModelRegistry, ModelVariant, VariantId};
pub use simulation::{simulate, ModelConfig, SimulationDriver};
pub use trajectory::Trajectory;
