//! General functions related to finance.

/// Calculates the capital recovery factor (CRF) for a given lifetime and discount rate.
///
/// The CRF is used to annualise capital costs over the lifetime of an asset. Lifetimes are given
/// in years and may be fractional, as they are in technology cost tables.
pub fn capital_recovery_factor(lifetime: f64, discount_rate: f64) -> f64 {
    if lifetime <= 0.0 {
        return 0.0;
    }
    if discount_rate == 0.0 {
        return 1.0 / lifetime;
    }
    let factor = (1.0 + discount_rate).powf(lifetime);
    (discount_rate * factor) / (factor - 1.0)
}

/// Calculates the annualised capital cost per unit of capacity, including fixed O&M.
///
/// `fom` is the fixed operation and maintenance cost as a percentage of the investment per year.
/// The result is scaled by `nyears`, the modelled fraction of a year.
pub fn annualised_capital_cost(
    investment: f64,
    lifetime: f64,
    discount_rate: f64,
    fom: f64,
    nyears: f64,
) -> f64 {
    (capital_recovery_factor(lifetime, discount_rate) + fom / 100.0) * investment * nyears
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.05, 0.0)] // Edge case: lifetime==0
    #[case(10.0, 0.0, 0.1)] // Other edge case: discount_rate==0
    #[case(10.0, 0.05, 0.1295045749654567)]
    #[case(5.0, 0.03, 0.2183545714005762)]
    fn test_capital_recovery_factor(
        #[case] lifetime: f64,
        #[case] discount_rate: f64,
        #[case] expected: f64,
    ) {
        let result = capital_recovery_factor(lifetime, discount_rate);
        assert_approx_eq!(f64, result, expected, epsilon = 1e-10);
    }

    #[rstest]
    #[case(1000.0, 10.0, 0.05, 0.0, 1.0, 129.5045749654567)]
    #[case(1000.0, 10.0, 0.05, 2.0, 1.0, 149.5045749654567)]
    #[case(2000.0, 20.0, 0.0, 0.0, 0.5, 50.0)] // Half a year modelled
    fn test_annualised_capital_cost(
        #[case] investment: f64,
        #[case] lifetime: f64,
        #[case] discount_rate: f64,
        #[case] fom: f64,
        #[case] nyears: f64,
        #[case] expected: f64,
    ) {
        let result = annualised_capital_cost(investment, lifetime, discount_rate, fom, nyears);
        assert_approx_eq!(f64, result, expected, epsilon = 1e-8);
    }
}
