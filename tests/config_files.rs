#[cfg(test)]
mod tests {
    use std::{env, fs};
    use membrane_excitability::{
        config::{from_toml_file, from_toml_str},
        error::{ConfigError, MembraneSimulationError},
        integrator::Method,
        registry::{Channel, VariantId},
        simulation::SimulationDriver,
    };

    #[test]
    pub fn test_config_file_runs() -> Result<(), MembraneSimulationError> {
        let path = env::temp_dir().join(format!("membrane_excitability_{}.toml", std::process::id()));
        fs::write(&path, r#"
            [simulation]
            variant = "luo_rudy_calcium"
            i_ext = 5.0
            t_end = 20.0
            samples = 201

            [simulation.conductances]
            ca_l = 0.09
            na = 100

            [simulation.solver]
            method = "exponential_midpoint"
            rtol = 1e-5
        "#).map_err(ConfigError::from)?;

        let config = from_toml_file(&path);
        fs::remove_file(&path).map_err(ConfigError::from)?;
        let config = config?;

        assert_eq!(config.variant, VariantId::LuoRudyCalcium);
        assert_eq!(config.conductances.get(&Channel::CalciumL), Some(&0.09));
        assert_eq!(config.conductances.get(&Channel::Sodium), Some(&100.));
        assert_eq!(config.solver.method, Method::ExponentialMidpoint);

        let trajectory = SimulationDriver::new().simulate(&config)?;
        assert_eq!(trajectory.labels(), &["V", "m", "h", "n", "d"]);
        assert_eq!(trajectory.len(), 201);

        Ok(())
    }

    #[test]
    pub fn test_range_problems_surface_when_simulating() {
        let config = from_toml_str("[simulation]\nvariant = \"hh_classic\"\nt_end = -5.0\n").unwrap();

        assert!(matches!(
            SimulationDriver::new().simulate(&config),
            Err(MembraneSimulationError::InvalidParameter(_))
        ));
    }

    #[test]
    pub fn test_channel_not_in_variant_is_rejected_when_simulating() {
        let config = from_toml_str(
            "[simulation]\nvariant = \"noble_basic\"\n[simulation.conductances]\nca_l = 0.09\n"
        ).unwrap();

        assert!(matches!(
            SimulationDriver::new().simulate(&config),
            Err(MembraneSimulationError::InvalidParameter(_))
        ));
    }
}
