//! Reads a [`ModelConfig`] from a TOML `[simulation]` table, every key other
//! than `variant` falls back to the variant's documented default.
//!
//! ```toml
//! [simulation]
//! variant = "hh_classic"
//! i_ext = 10.0
//! t_end = 50.0
//! samples = 1000
//! initial_state = [-65.0, 0.05, 0.6, 0.32]
//!
//! [simulation.conductances]
//! na = 120.0
//!
//! [simulation.solver]
//! method = "auto"
//! rtol = 1e-6
//! ```
//!
//! Only types are checked here, ranges are validated when simulating.

use std::{collections::BTreeMap, fs::read_to_string, path::Path};
use toml::{from_str, Value};
use crate::{
    error::{ConfigError, MembraneSimulationError},
    integrator::{Method, SolverOptions},
    membrane::MembraneState,
    registry::{Channel, VariantId},
    simulation::ModelConfig,
};


fn wrong_type(key: &str, expected: &'static str) -> ConfigError {
    ConfigError::WrongType { key: String::from(key), expected }
}

fn parse_f64(value: &Value, field_name: &str) -> Result<f64, ConfigError> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Integer(v) => Ok(*v as f64),
        _ => Err(wrong_type(field_name, "float")),
    }
}

fn parse_usize(value: &Value, field_name: &str) -> Result<usize, ConfigError> {
    value
        .as_integer()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| wrong_type(field_name, "unsigned integer"))
}

fn parse_string(value: &Value, field_name: &str) -> Result<String, ConfigError> {
    value
        .as_str()
        .ok_or_else(|| wrong_type(field_name, "string"))
        .map(String::from)
}

fn parse_state(value: &Value, field_name: &str) -> Result<Option<MembraneState>, ConfigError> {
    value
        .as_array()
        .ok_or_else(|| wrong_type(field_name, "array of floats"))?
        .iter()
        .map(|entry| parse_f64(entry, field_name))
        .collect::<Result<Vec<f64>, _>>()
        .map(|values| Some(MembraneState::from(values)))
}

fn parse_method(value: &Value, field_name: &str) -> Result<Method, ConfigError> {
    parse_string(value, field_name)?
        .parse::<Method>()
        .map_err(|_| wrong_type(field_name, "exponential_midpoint, dormand_prince or auto"))
}

fn parse_value_with_default<T>(
    table: &Value,
    key: &str,
    parser: impl Fn(&Value, &str) -> Result<T, ConfigError>,
    default: T,
) -> Result<T, ConfigError> {
    table
        .get(key)
        .map_or(Ok(default), |value| parser(value, key))
}

fn parse_conductances(table: &Value) -> Result<BTreeMap<Channel, f64>, ConfigError> {
    let conductances = match table.get("conductances") {
        Some(value) => value.as_table().ok_or_else(|| wrong_type("conductances", "table"))?,
        None => return Ok(BTreeMap::new()),
    };

    conductances.iter()
        .map(|(key, value)| -> Result<(Channel, f64), ConfigError> {
            let channel = key.parse::<Channel>().map_err(|_| ConfigError::UnknownChannel(key.clone()))?;
            Ok((channel, parse_f64(value, key)?))
        })
        .collect()
}

fn parse_solver(table: &Value) -> Result<SolverOptions, ConfigError> {
    let defaults = SolverOptions::default();
    let solver = match table.get("solver") {
        Some(value) if value.is_table() => value,
        Some(_) => return Err(wrong_type("solver", "table")),
        None => return Ok(defaults),
    };

    Ok(SolverOptions {
        method: parse_value_with_default(solver, "method", parse_method, defaults.method)?,
        rtol: parse_value_with_default(solver, "rtol", parse_f64, defaults.rtol)?,
        atol: parse_value_with_default(solver, "atol", parse_f64, defaults.atol)?,
        initial_step: parse_value_with_default(solver, "initial_step", parse_f64, defaults.initial_step)?,
        min_step: parse_value_with_default(solver, "min_step", parse_f64, defaults.min_step)?,
        max_step: parse_value_with_default(solver, "max_step", parse_f64, defaults.max_step)?,
        max_steps: parse_value_with_default(solver, "max_steps", parse_usize, defaults.max_steps)?,
    })
}

/// Parses a `[simulation]` table into a [`ModelConfig`], unknown variant
/// names are reported as `UnknownVariant`
pub fn from_toml_str(content: &str) -> Result<ModelConfig, MembraneSimulationError> {
    let config: Value = from_str(content).map_err(ConfigError::from)?;
    let table = config.get("simulation").ok_or(ConfigError::MissingTable("simulation"))?;

    let variant_name = match table.get("variant") {
        Some(value) => parse_string(value, "variant")?,
        None => return Err(ConfigError::MissingKey("variant").into()),
    };
    let variant = variant_name.parse::<VariantId>()?;
    let defaults = ModelConfig::from_variant(variant);

    Ok(ModelConfig {
        variant,
        conductances: parse_conductances(table)?,
        i_ext: parse_value_with_default(table, "i_ext", parse_f64, defaults.i_ext)?,
        initial_state: parse_value_with_default(table, "initial_state", parse_state, None)?,
        t_end: parse_value_with_default(table, "t_end", parse_f64, defaults.t_end)?,
        samples: parse_value_with_default(table, "samples", parse_usize, defaults.samples)?,
        solver: parse_solver(table)?,
    })
}

/// Reads and parses a TOML config file
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<ModelConfig, MembraneSimulationError> {
    let content = read_to_string(path).map_err(ConfigError::from)?;

    from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_table() {
        let config = from_toml_str(r#"
            [simulation]
            variant = "hh_classic"
            i_ext = 10
            t_end = 50.0
            samples = 1000
            initial_state = [-65.0, 0.05, 0.6, 0.32]

            [simulation.conductances]
            na = 100.0
            leak = 0.3

            [simulation.solver]
            method = "dormand_prince"
            rtol = 1e-7
            max_steps = 1000
        "#).unwrap();

        assert_eq!(config.variant, VariantId::HhClassic);
        assert_eq!(config.i_ext, 10.);
        assert_eq!(config.t_end, 50.);
        assert_eq!(config.samples, 1000);
        assert_eq!(config.initial_state, Some(MembraneState::new(-65., &[0.05, 0.6, 0.32])));
        assert_eq!(config.conductances, BTreeMap::from([(Channel::Sodium, 100.), (Channel::Leak, 0.3)]));
        assert_eq!(config.solver.method, Method::DormandPrince);
        assert_eq!(config.solver.rtol, 1e-7);
        assert_eq!(config.solver.atol, SolverOptions::default().atol);
        assert_eq!(config.solver.max_steps, 1000);
    }

    #[test]
    fn test_missing_keys_use_variant_defaults() {
        let config = from_toml_str("[simulation]\nvariant = \"noble_basic\"\n").unwrap();

        assert_eq!(config, ModelConfig::from_variant(VariantId::NobleBasic));
    }

    #[test]
    fn test_unknown_variant() {
        let result = from_toml_str("[simulation]\nvariant = \"hh_modern\"\n");

        assert!(matches!(
            result,
            Err(MembraneSimulationError::UnknownVariant(err)) if err.identifier == "hh_modern"
        ));
    }

    #[test]
    fn test_config_errors() {
        let cases = [
            "[simulation\n",
            "[other]\nvariant = \"hh_classic\"\n",
            "[simulation]\ni_ext = 1.0\n",
            "[simulation]\nvariant = \"hh_classic\"\ni_ext = \"ten\"\n",
            "[simulation]\nvariant = \"hh_classic\"\nsamples = -4\n",
            "[simulation]\nvariant = \"hh_classic\"\ninitial_state = [-65.0, \"m\"]\n",
            "[simulation]\nvariant = \"hh_classic\"\n[simulation.conductances]\ncl = 1.0\n",
            "[simulation]\nvariant = \"hh_classic\"\n[simulation.solver]\nmethod = \"rk4\"\n",
        ];

        for case in cases {
            assert!(
                matches!(from_toml_str(case), Err(MembraneSimulationError::Config(_))),
                "accepted {:?}", case
            );
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = from_toml_file("/nonexistent/membrane.toml");

        assert!(matches!(result, Err(MembraneSimulationError::Config(ConfigError::Io(_)))));
    }
}
