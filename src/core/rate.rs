use super::types::CompoundingMethod;

pub const MONTHS_PER_YEAR: u32 = 12;

/// Monthly rate equivalent to `annual_rate` under `method`.
///
/// Geometric compounds back to the annual rate over twelve periods; arithmetic
/// is a straight proration and does not.
pub fn monthly_rate(annual_rate: f64, method: CompoundingMethod) -> f64 {
    match method {
        CompoundingMethod::Geometric => (1.0 + annual_rate).powf(1.0 / MONTHS_PER_YEAR as f64) - 1.0,
        CompoundingMethod::Arithmetic => annual_rate / MONTHS_PER_YEAR as f64,
    }
}

pub fn annual_from_monthly(monthly_rate: f64) -> f64 {
    (1.0 + monthly_rate).powi(MONTHS_PER_YEAR as i32) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::{prop_assert, proptest};

    #[test]
    fn geometric_rate_for_two_percent() {
        let r = monthly_rate(0.02, CompoundingMethod::Geometric);
        assert_relative_eq!(r, 0.001_651_6, epsilon = 1e-7);
    }

    #[test]
    fn arithmetic_rate_is_simple_proration() {
        assert_relative_eq!(monthly_rate(0.12, CompoundingMethod::Arithmetic), 0.01);
        assert_eq!(monthly_rate(0.0, CompoundingMethod::Arithmetic), 0.0);
        assert_eq!(monthly_rate(0.0, CompoundingMethod::Geometric), 0.0);
    }

    #[test]
    fn arithmetic_overstates_compounded_annual_rate() {
        let annual = 0.10;
        let compounded = annual_from_monthly(monthly_rate(annual, CompoundingMethod::Arithmetic));
        assert!(compounded > annual);
    }

    proptest! {
        #[test]
        fn prop_geometric_round_trips_through_annual(annual_bp in 0u32..5_000) {
            let annual = annual_bp as f64 / 10_000.0;
            let back = annual_from_monthly(monthly_rate(annual, CompoundingMethod::Geometric));
            prop_assert!((back - annual).abs() < 1e-12);
        }
    }
}
