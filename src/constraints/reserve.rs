//! Operational reserve requirements.
//!
//! Every generator gets a reserve variable per snapshot. Total reserve must cover a share of the
//! demand, a share of the variable renewable output and a fixed contingency. Reserve and dispatch
//! together may not exceed what a generator has available.
use super::{BuildContext, ConstraintBuilder};
use crate::config::OperationalReserveConfig;
use crate::formulation::{series, snapshot_key};
use crate::optimisation::{ConstraintSense, LinearExpression, Problem};
use anyhow::Result;

/// Adds reserve variables and the reserve margin
#[derive(Debug, Clone)]
pub struct OperationalReserve {
    config: OperationalReserveConfig,
}

impl OperationalReserve {
    /// Create the builder
    pub fn new(config: OperationalReserveConfig) -> Self {
        Self { config }
    }
}

impl ConstraintBuilder for OperationalReserve {
    fn name(&self) -> &'static str {
        "operational reserve"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        let vars = ctx.variables;
        let snapshots: Vec<_> = network.snapshots.iter().copied().collect();
        let n = snapshots.len();
        if network.generators.is_empty() {
            return Ok(());
        }

        let mut margin = vec![LinearExpression::new(); n];
        let mut rhs: Vec<f64> = network
            .total_demand()
            .into_iter()
            .map(|demand| self.config.epsilon_load * demand + self.config.contingency)
            .collect();

        for generator in network.generators.values() {
            let id = generator.id.as_str();
            let p = series(&vars.generator_p, id);
            let p_max_pu = network.generator_p_max_pu(generator);
            let p_nom = vars.generator_p_nom.get(id);
            let is_vres = network.generators_t.p_max_pu.contains(id);

            for (t, snapshot) in snapshots.iter().enumerate() {
                let r = problem.add_variable(
                    format!("Generator-r[{}]", snapshot_key(id, snapshot)),
                    0.0,
                    0.0,
                    f64::INFINITY,
                );
                margin[t].add_term(r, 1.0);

                // Variable renewables raise the requirement in proportion to what they can produce
                let potential = p_max_pu[t] * self.config.epsilon_vres;
                let mut capacity = LinearExpression::new();
                capacity.add_term(p[t], 1.0);
                capacity.add_term(r, 1.0);
                match p_nom {
                    Some(&p_nom) => {
                        if is_vres {
                            margin[t].add_term(p_nom, -potential);
                        }
                        capacity.add_term(p_nom, -p_max_pu[t]);
                    }
                    None => {
                        if is_vres {
                            rhs[t] += potential * generator.p_nom;
                        }
                        capacity.add_constant(-p_max_pu[t] * generator.p_nom);
                    }
                }
                problem.add_constraint(
                    "Generator-p-reserve-upper",
                    snapshot_key(id, snapshot),
                    &capacity,
                    ConstraintSense::Le,
                    0.0,
                );
            }
        }

        for ((lhs, rhs), snapshot) in margin.iter().zip(rhs).zip(&snapshots) {
            problem.add_constraint(
                "reserve_margin",
                snapshot_key("reserve", snapshot),
                lhs,
                ConstraintSense::Ge,
                rhs,
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{LOAD_P_SET, WIND_P_MAX_PU, two_bus_network};
    use crate::formulation::build;
    use crate::network::Network;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_operational_reserve(two_bus_network: Network) {
        let (mut problem, formulation) = build(&two_bus_network).unwrap();
        let columns = problem.num_columns();
        let ctx = BuildContext {
            network: &two_bus_network,
            variables: &formulation.variables,
            reference: None,
        };
        let config = OperationalReserveConfig {
            activate: true,
            epsilon_load: 0.02,
            epsilon_vres: 0.02,
            contingency: 10.0,
        };
        OperationalReserve::new(config).build(&ctx, &mut problem).unwrap();

        // One reserve variable per generator and snapshot
        assert_eq!(problem.num_columns(), columns + 8);
        assert_eq!(problem.rows_in_group("Generator-p-reserve-upper").count(), 8);

        // Wind is fixed, so its potential moves to the right-hand side
        let rows: Vec<_> = problem.rows_in_group("reserve_margin").collect();
        assert_eq!(rows.len(), 4);
        for ((_, row), (load, wind)) in rows.iter().zip(LOAD_P_SET.iter().zip(WIND_P_MAX_PU)) {
            let expected = 0.02 * load + 0.02 * wind * 100.0 + 10.0;
            assert_approx_eq!(f64, row.lower, expected, epsilon = 1e-9);
            assert_eq!(row.terms.len(), 2);
        }
    }
}
