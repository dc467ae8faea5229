//! Constraints on the share of demand met by local or renewable generation.
use super::{BuildContext, ConstraintBuilder, add_weighted, weighted_generation};
use crate::config::ElectricityConfig;
use crate::formulation::series;
use crate::network::{BusID, CarrierID};
use crate::optimisation::{ConstraintSense, LinearExpression, Problem};
use crate::opts::{EquityScope, EquityShare};
use anyhow::Result;
use indexmap::IndexMap;
use log::warn;

/// Both sides of the equity constraint are scaled by this factor
const EQUITY_SCALING: f64 = 0.1;

/// `EQ<level>[c]`: each node or country generates at least `level` of its own demand
#[derive(Debug, Clone, Copy)]
pub struct EquityShareBuilder {
    share: EquityShare,
}

impl EquityShareBuilder {
    /// Create the builder
    pub fn new(share: EquityShare) -> Self {
        Self { share }
    }
}

impl EquityShareBuilder {
    /// The group a bus belongs to: its country (falling back to its name) or the bus itself
    fn group_of(&self, ctx: &BuildContext, bus: &BusID) -> String {
        match self.share.scope {
            EquityScope::Country => ctx
                .network
                .bus_country(bus)
                .unwrap_or(bus.as_str())
                .to_string(),
            EquityScope::Node => bus.to_string(),
        }
    }
}

impl ConstraintBuilder for EquityShareBuilder {
    fn name(&self) -> &'static str {
        "equity share"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        let w_gen = ctx.generator_weightings();
        let w_sto = ctx.store_weightings();

        // Groups are those with demand
        let mut load: IndexMap<String, f64> = IndexMap::new();
        for item in network.loads.values() {
            let demand: f64 = network
                .load_p_set(item)
                .iter()
                .zip(&w_gen)
                .map(|(p, w)| p * w)
                .sum();
            *load.entry(self.group_of(ctx, &item.bus)).or_insert(0.0) += demand;
        }

        let mut inflow: IndexMap<String, f64> = IndexMap::new();
        let mut lhs: IndexMap<String, LinearExpression> = IndexMap::new();
        for generator in network.generators.values() {
            let p = series(&ctx.variables.generator_p, generator.id.as_str());
            let expr = lhs.entry(self.group_of(ctx, &generator.bus)).or_default();
            add_weighted(expr, p, &w_gen, EQUITY_SCALING);
        }
        for unit in network.storage_units.values() {
            let group = self.group_of(ctx, &unit.bus);
            if let Some(values) = network.storage_units_t.inflow.get(unit.id.as_str()) {
                let total: f64 = values.iter().zip(&w_sto).map(|(v, w)| v * w).sum();
                *inflow.entry(group.clone()).or_insert(0.0) += total;
            }
            let spill = series(&ctx.variables.storage_spill, unit.id.as_str());
            add_weighted(lhs.entry(group).or_default(), spill, &w_sto, -EQUITY_SCALING);
        }

        for (group, demand) in &load {
            let inflow = inflow.get(group).copied().unwrap_or(0.0);
            let rhs = EQUITY_SCALING * (self.share.level * demand - inflow);
            let expr = lhs.get(group).cloned().unwrap_or_default();
            problem.add_constraint("equity_min", group.clone(), &expr, ConstraintSense::Ge, rhs);
        }

        Ok(())
    }
}

/// `RES<share>`: renewable generation, net of storage, meets a share of total demand
#[derive(Debug, Clone)]
pub struct RenewableShare {
    share: f64,
    renewable_carriers: Vec<CarrierID>,
    charger_carriers: Vec<CarrierID>,
    discharger_carriers: Vec<CarrierID>,
}

impl RenewableShare {
    /// Create the builder, taking the carrier lists from the electricity configuration
    pub fn new(share: f64, config: &ElectricityConfig) -> Self {
        Self {
            share,
            renewable_carriers: config.renewable_carriers.clone(),
            charger_carriers: config.storage_charger_carriers.clone(),
            discharger_carriers: config.storage_discharger_carriers.clone(),
        }
    }
}

impl ConstraintBuilder for RenewableShare {
    fn name(&self) -> &'static str {
        "renewable share"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        warn!(
            "The renewable share constraint is still work in progress. Unexpected results might \
             be incurred, particularly if temporal clustering is applied."
        );

        let network = ctx.network;
        let vars = ctx.variables;
        let w_gen = ctx.generator_weightings();
        let w_sto = ctx.store_weightings();

        let mut lhs = weighted_generation(
            ctx,
            |g| self.renewable_carriers.contains(&g.carrier),
            &w_gen,
            1.0,
        );
        for unit in network
            .storage_units
            .values()
            .filter(|unit| self.renewable_carriers.contains(&unit.carrier))
        {
            let id = unit.id.as_str();
            add_weighted(&mut lhs, series(&vars.storage_p_dispatch, id), &w_sto, 1.0);
            add_weighted(&mut lhs, series(&vars.storage_p_store, id), &w_sto, -1.0);
        }
        for link in network.links.values() {
            let sign = if self.charger_carriers.contains(&link.carrier) {
                -1.0
            } else if self.discharger_carriers.contains(&link.carrier) {
                1.0
            } else {
                continue;
            };
            let p = series(&vars.link_p, link.id.as_str());
            add_weighted(&mut lhs, p, &w_sto, sign * link.efficiency);
        }

        let load: f64 = network
            .total_demand()
            .iter()
            .zip(&w_gen)
            .map(|(p, w)| p * w)
            .sum();
        problem.add_constraint(
            "res_share",
            "total".into(),
            &lhs,
            ConstraintSense::Eq,
            self.share * load,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{LOAD_P_SET, quiet_solver, two_bus_network};
    use crate::formulation::build;
    use crate::network::{Network, StorageUnit};
    use crate::optimisation::{HighsSolver, Solver, TerminationCondition};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn apply(network: &Network, builder: &dyn ConstraintBuilder) -> Problem {
        let (mut problem, formulation) = build(network).unwrap();
        let ctx = BuildContext {
            network,
            variables: &formulation.variables,
            reference: None,
        };
        builder.build(&ctx, &mut problem).unwrap();
        problem
    }

    #[rstest]
    fn test_equity_per_node(two_bus_network: Network) {
        let share = EquityShare {
            level: 0.7,
            scope: EquityScope::Node,
        };
        let problem = apply(&two_bus_network, &EquityShareBuilder::new(share));

        // Only bus1 has demand
        let rows: Vec<_> = problem.rows_in_group("equity_min").collect();
        assert_eq!(rows.len(), 1);
        let (_, row) = rows[0];
        assert_eq!(row.key, "bus1");
        let demand: f64 = LOAD_P_SET.iter().sum();
        assert_approx_eq!(f64, row.lower, 0.1 * 0.7 * demand, epsilon = 1e-9);
        // Gas dispatch in each snapshot
        assert_eq!(row.terms.len(), 4);
    }

    #[rstest]
    fn test_equity_subtracts_inflow(mut two_bus_network: Network) {
        let hydro = StorageUnit::new("hydro", "bus1", "hydro");
        two_bus_network.storage_units.insert(hydro.id.clone(), hydro);
        two_bus_network
            .storage_units_t
            .inflow
            .insert("hydro".into(), vec![5.0; 4]);
        let share = EquityShare {
            level: 1.0,
            scope: EquityScope::Country,
        };
        let problem = apply(&two_bus_network, &EquityShareBuilder::new(share));

        let (_, row) = problem.rows_in_group("equity_min").next().unwrap();
        assert_eq!(row.key, "FR");
        let demand: f64 = LOAD_P_SET.iter().sum();
        assert_approx_eq!(f64, row.lower, 0.1 * (demand - 20.0), epsilon = 1e-9);
        // Spill enters with a negative coefficient
        assert!(row.terms.iter().any(|&(_, coeff)| coeff < 0.0));
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    fn test_equity_levels_feasible(
        two_bus_network: Network,
        quiet_solver: HighsSolver,
        #[case] level: f64,
    ) {
        let share = EquityShare {
            level,
            scope: EquityScope::Node,
        };
        let problem = apply(&two_bus_network, &EquityShareBuilder::new(share));

        let rows: Vec<_> = problem.rows_in_group("equity_min").collect();
        assert!(!rows.is_empty());
        if level <= 0.0 {
            assert!(rows.iter().all(|(_, row)| row.lower <= 0.0));
        }

        let result = quiet_solver.solve(&problem).unwrap();
        assert_eq!(result.condition, TerminationCondition::Optimal);
    }

    #[rstest]
    fn test_renewable_share(two_bus_network: Network) {
        let config = ElectricityConfig::default();
        let problem = apply(&two_bus_network, &RenewableShare::new(0.3, &config));

        let (_, row) = problem.rows_in_group("res_share").next().unwrap();
        let demand: f64 = LOAD_P_SET.iter().sum();
        assert_approx_eq!(f64, row.lower, 0.3 * demand, epsilon = 1e-9);
        assert_approx_eq!(f64, row.upper, 0.3 * demand, epsilon = 1e-9);
        // Wind dispatch only
        assert_eq!(row.terms.len(), 4);
    }
}
