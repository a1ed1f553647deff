#[cfg(test)]
mod tests {
    use membrane_excitability::{
        error::RateEvaluationError,
        rates::RateLaw,
        registry::{ModelRegistry, VariantId},
    };

    fn gate_law(id: VariantId, gate: &str, alpha: bool) -> RateLaw {
        let variant = ModelRegistry::builtin().get(id);
        let gate = &variant.gates[variant.gate_index(gate).unwrap()];

        if alpha { gate.alpha } else { gate.beta }
    }

    fn assert_limit(law: RateLaw, voltage: f64, limit: f64) {
        let value = law.evaluate(voltage);
        assert!(value.is_finite());
        assert!((value - limit).abs() < 1e-12, "expected {} at {} mV, got {}", limit, voltage, value);

        for offset in [1e-10, 1e-8, 1e-6, 1e-4] {
            for sign in [-1., 1.] {
                let nearby = law.evaluate(voltage + sign * offset);
                assert!(nearby.is_finite());
                assert!((nearby - limit).abs() < 0.5 * offset + 1e-12, "discontinuous at {} mV", voltage);
            }
        }
    }

    #[test]
    pub fn test_classic_singular_limits() -> Result<(), RateEvaluationError> {
        assert_limit(gate_law(VariantId::HhClassic, "m", true), -40., 1.0);
        assert_limit(gate_law(VariantId::HhClassic, "n", true), -55., 0.1);

        let variant = ModelRegistry::builtin().get(VariantId::HhClassic);
        let (alpha_m, _) = variant.gates[0].rates(-40.)?;
        assert_eq!(alpha_m, 1.0);

        Ok(())
    }

    #[test]
    pub fn test_cardiac_singular_limits() -> Result<(), RateEvaluationError> {
        assert_limit(gate_law(VariantId::LuoRudyBasic, "m", true), -47.13, 1.6);
        assert_limit(gate_law(VariantId::LuoRudyBasic, "n", true), -50., 0.2);
        assert_limit(gate_law(VariantId::NobleBasic, "m", false), -8., 0.6);
        assert_limit(gate_law(VariantId::NobleBasic, "m", true), -48., 1.5);

        let variant = ModelRegistry::builtin().get(VariantId::NobleCalcium);
        let (_, beta_m) = variant.gates[0].rates(-8.)?;
        assert!((beta_m - 0.6).abs() < 1e-12);

        Ok(())
    }

    #[test]
    pub fn test_every_singular_rate_is_finite_at_its_singularity() -> Result<(), RateEvaluationError> {
        for variant in ModelRegistry::builtin().variants() {
            for gate in variant.gates {
                for law in [gate.alpha, gate.beta] {
                    if let (Some(voltage), Some(limit)) = (law.singular_voltage(), law.singular_limit()) {
                        assert_limit(law, voltage, limit);
                        gate.rates(voltage)?;
                    }
                }
            }
        }

        Ok(())
    }

    #[test]
    pub fn test_rates_are_non_negative_over_physiological_range() -> Result<(), RateEvaluationError> {
        for variant in ModelRegistry::builtin().variants() {
            for gate in variant.gates {
                for step in 0..=2000 {
                    let voltage = -120. + 0.1 * step as f64;
                    let (alpha, beta) = gate.rates(voltage)?;

                    assert!(alpha >= 0. && beta >= 0., "{} gate {} at {} mV", variant.id, gate.name, voltage);
                }
            }
        }

        Ok(())
    }
}
