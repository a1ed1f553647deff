#[cfg(test)]
mod tests {
    use membrane_excitability::{
        error::MembraneSimulationError,
        integrator::{Method, SolverOptions},
        registry::VariantId,
        simulation::{simulate, ModelConfig},
        trajectory::Trajectory,
    };

    fn subthreshold(solver: SolverOptions) -> ModelConfig {
        ModelConfig {
            i_ext: 1.,
            t_end: 10.,
            samples: 101,
            solver,
            ..ModelConfig::from_variant(VariantId::HhClassic)
        }
    }

    fn tolerance(method: Method, rtol: f64) -> SolverOptions {
        SolverOptions { method, rtol, atol: rtol * 1e-2, ..SolverOptions::default() }
    }

    fn max_error(trajectory: &Trajectory, reference: &Trajectory) -> f64 {
        (trajectory.states() - reference.states())
            .iter()
            .fold(0., |acc: f64, diff| acc.max(diff.abs()))
    }

    fn reference() -> Result<Trajectory, MembraneSimulationError> {
        let solver = SolverOptions { method: Method::DormandPrince, rtol: 1e-12, atol: 1e-12, ..SolverOptions::default() };

        simulate(&subthreshold(solver))
    }

    #[test]
    pub fn test_halving_tolerance_reduces_error() -> Result<(), MembraneSimulationError> {
        let reference = reference()?;

        let mut previous = f64::INFINITY;
        for rtol in [1e-4, 5e-5, 2.5e-5] {
            let trajectory = simulate(&subthreshold(tolerance(Method::DormandPrince, rtol)))?;
            let error = max_error(&trajectory, &reference);

            assert!(error < previous, "error {} at rtol {} did not decrease from {}", error, rtol, previous);
            previous = error;
        }

        Ok(())
    }

    #[test]
    pub fn test_exponential_midpoint_converges() -> Result<(), MembraneSimulationError> {
        let reference = reference()?;

        let loose = simulate(&subthreshold(tolerance(Method::ExponentialMidpoint, 1e-4)))?;
        let tight = simulate(&subthreshold(tolerance(Method::ExponentialMidpoint, 1e-7)))?;

        let loose_error = max_error(&loose, &reference);
        let tight_error = max_error(&tight, &reference);

        assert!(tight_error < loose_error);
        assert!(tight_error < 1e-3);

        Ok(())
    }

    #[test]
    pub fn test_methods_agree_on_spiking_run() -> Result<(), MembraneSimulationError> {
        let spiking = |method| ModelConfig {
            i_ext: 10.,
            t_end: 20.,
            samples: 401,
            solver: tolerance(method, 1e-8),
            ..ModelConfig::from_variant(VariantId::HhClassic)
        };

        let explicit = simulate(&spiking(Method::DormandPrince))?;
        let exponential = simulate(&spiking(Method::ExponentialMidpoint))?;
        let auto = simulate(&spiking(Method::Auto))?;

        assert!(max_error(&exponential, &explicit) < 0.5);
        assert!(max_error(&auto, &explicit) < 0.5);

        let spikes = explicit.spike_times(0.);
        let other_spikes = exponential.spike_times(0.);
        assert_eq!(spikes.len(), other_spikes.len());
        for (a, b) in spikes.iter().zip(other_spikes.iter()) {
            assert!((a - b).abs() < 1e-2);
        }

        Ok(())
    }

    #[test]
    pub fn test_cardiac_variant_runs_with_every_method() -> Result<(), MembraneSimulationError> {
        for method in [Method::ExponentialMidpoint, Method::Auto] {
            let config = ModelConfig {
                t_end: 50.,
                samples: 501,
                solver: SolverOptions { method, rtol: 1e-5, atol: 1e-7, ..SolverOptions::default() },
                ..ModelConfig::from_variant(VariantId::LuoRudyCalcium)
            };

            let trajectory = simulate(&config)?;
            assert!(trajectory.gating_within_bounds());
        }

        Ok(())
    }
}
