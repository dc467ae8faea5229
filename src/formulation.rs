//! The base linear optimal power flow with capacity expansion.
//!
//! [`build`] turns a network into a [`Problem`] along with the [`Variables`] needed to add further
//! constraints and to read the solution back into the network with [`write_back`].
use crate::network::{
    BusID, GeneratorID, GlobalConstraintID, LineID, LinkID, Network, Snapshot, StorageUnitID,
    StoreID, format_timestamp,
};
use crate::optimisation::{LinearExpression, Problem, Variable};
use anyhow::Result;
use indexmap::IndexMap;

mod constraints;
mod results;
mod variables;
pub use results::write_back;

/// One variable per component and snapshot
pub type SeriesVariables<ID> = IndexMap<ID, Vec<Variable>>;

/// One nominal capacity variable per extendable component
pub type CapacityVariables<ID> = IndexMap<ID, Variable>;

/// The decision variables of the base formulation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    /// Generator dispatch
    pub generator_p: SeriesVariables<GeneratorID>,
    /// Extendable generator capacity
    pub generator_p_nom: CapacityVariables<GeneratorID>,
    /// Line flow from `bus0` to `bus1`
    pub line_s: SeriesVariables<LineID>,
    /// Extendable line capacity
    pub line_s_nom: CapacityVariables<LineID>,
    /// Link flow drawn at `bus0`
    pub link_p: SeriesVariables<LinkID>,
    /// Extendable link capacity
    pub link_p_nom: CapacityVariables<LinkID>,
    /// Storage unit dispatch
    pub storage_p_dispatch: SeriesVariables<StorageUnitID>,
    /// Storage unit charging
    pub storage_p_store: SeriesVariables<StorageUnitID>,
    /// Storage unit state of charge
    pub storage_state_of_charge: SeriesVariables<StorageUnitID>,
    /// Spilled inflow (only units with an inflow series)
    pub storage_spill: SeriesVariables<StorageUnitID>,
    /// Extendable storage unit power capacity
    pub storage_p_nom: CapacityVariables<StorageUnitID>,
    /// Store energy level
    pub store_e: SeriesVariables<StoreID>,
    /// Store power injected into its bus
    pub store_p: SeriesVariables<StoreID>,
    /// Extendable store energy capacity
    pub store_e_nom: CapacityVariables<StoreID>,
    /// Voltage angle of buses connected to lines
    pub bus_theta: SeriesVariables<BusID>,
}

/// Row indices needed when reading duals back into the network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DualRows {
    /// Nodal balance rows per bus and snapshot
    pub nodal_balance: IndexMap<BusID, Vec<usize>>,
    /// Global constraint rows
    pub global_constraints: IndexMap<GlobalConstraintID, usize>,
}

/// The output of [`build`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Formulation {
    /// The variables of the problem
    pub variables: Variables,
    /// Rows whose duals are written back
    pub duals: DualRows,
}

/// The key of a per-snapshot row
pub fn snapshot_key(id: &str, snapshot: &Snapshot) -> String {
    format!("{id},{}", format_timestamp(&snapshot.snapshot))
}

/// The nominal capacity of a component: its variable if extendable, else the fixed value
pub fn nominal<ID: crate::id::IDLike>(
    capacity: &CapacityVariables<ID>,
    id: &str,
    fixed: f64,
) -> LinearExpression {
    let mut expr = LinearExpression::new();
    match capacity.get(id) {
        Some(&var) => expr.add_term(var, 1.0),
        None => expr.add_constant(fixed),
    }
    expr
}

/// The per-snapshot variables of a component, or an empty slice if it has none
pub fn series<'a, ID: crate::id::IDLike>(vars: &'a SeriesVariables<ID>, id: &str) -> &'a [Variable] {
    vars.get(id).map_or(&[], Vec::as_slice)
}

/// Build the base formulation for a network
pub fn build(network: &Network) -> Result<(Problem, Formulation)> {
    let mut problem = Problem::default();
    let variables = variables::add_variables(&mut problem, network)?;
    let duals = constraints::add_constraints(&mut problem, network, &variables);

    Ok((problem, Formulation { variables, duals }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{LOAD_P_SET, WIND_P_MAX_PU, quiet_solver, two_bus_network};
    use crate::optimisation::Solver;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_build_groups(two_bus_network: Network) {
        let (problem, formulation) = build(&two_bus_network).unwrap();
        let sizes = problem.group_sizes();
        assert_eq!(sizes["Bus-nodal_balance"], 8);
        assert_eq!(sizes["Line-kvl"], 4);
        assert_eq!(sizes["Generator-ext-p-upper"], 4);
        assert_eq!(formulation.variables.generator_p_nom.len(), 1);
        assert_eq!(formulation.variables.bus_theta.len(), 2);
    }

    #[rstest]
    fn test_solve_two_bus(mut two_bus_network: Network) {
        let (problem, formulation) = build(&two_bus_network).unwrap();
        let result = quiet_solver().solve(&problem).unwrap();
        assert!(result.is_ok());
        write_back(&mut two_bus_network, &result, &formulation);

        // Wind is free, so gas only covers what wind cannot
        let gas_p = two_bus_network.generators_t.p.get("gas").unwrap();
        for ((gas, wind), load) in gas_p.iter().zip(WIND_P_MAX_PU).zip(LOAD_P_SET) {
            let expected = (load - wind * 100.0).max(0.0);
            assert_approx_eq!(f64, *gas, expected, epsilon = 1e-6);
        }
        let gas_p_nom = two_bus_network.generators["gas"].p_nom_opt.unwrap();
        assert_approx_eq!(f64, gas_p_nom, 50.0, epsilon = 1e-6);

        // Flow on the line is what wind delivers to bus1
        let flow = two_bus_network.lines_t.p0.get("line0").unwrap();
        assert_approx_eq!(f64, flow[0], 50.0, epsilon = 1e-6);

        // Gas is marginal at bus1 when it runs below capacity
        let price = two_bus_network.buses_t.marginal_price.get("bus1").unwrap();
        assert_approx_eq!(f64, price[1], 50.0, epsilon = 1e-6);

        let objective = two_bus_network.objective.unwrap();
        let energy: f64 = gas_p.iter().sum();
        assert_approx_eq!(f64, objective, 50.0 * 10.0 + 50.0 * energy, epsilon = 1e-4);
    }
}
