//! Reading the solution of the base formulation back into the network.
use super::{CapacityVariables, Formulation, SeriesVariables};
use crate::id::IDLike;
use crate::network::{Network, TimeSeries};
use crate::optimisation::SolveResult;

/// Values of a component's per-snapshot variables
fn series_values<ID: IDLike>(result: &SolveResult, vars: &SeriesVariables<ID>) -> TimeSeries<ID> {
    vars.iter()
        .map(|(id, vars)| {
            let values = vars.iter().map(|var| result.columns[var.index()]).collect();
            (id.clone(), values)
        })
        .collect()
}

/// The optimised capacity of a component, falling back to its fixed capacity
fn optimal_capacity<ID: IDLike>(
    result: &SolveResult,
    vars: &CapacityVariables<ID>,
    id: &str,
    fixed: f64,
) -> f64 {
    vars.get(id)
        .map_or(fixed, |var| result.columns[var.index()])
}

/// Write optimal capacities, dispatch, nodal prices, constraint duals and the objective value into
/// the network.
///
/// Does nothing if the result carries no solution.
pub fn write_back(network: &mut Network, result: &SolveResult, formulation: &Formulation) {
    if !result.has_solution() {
        return;
    }
    let vars = &formulation.variables;

    for generator in network.generators.values_mut() {
        generator.p_nom_opt = Some(optimal_capacity(
            result,
            &vars.generator_p_nom,
            generator.id.as_str(),
            generator.p_nom,
        ));
    }
    network.generators_t.p = series_values(result, &vars.generator_p);

    for line in network.lines.values_mut() {
        line.s_nom_opt = Some(optimal_capacity(
            result,
            &vars.line_s_nom,
            line.id.as_str(),
            line.s_nom,
        ));
    }
    network.lines_t.p0 = series_values(result, &vars.line_s);

    for link in network.links.values_mut() {
        link.p_nom_opt = Some(optimal_capacity(
            result,
            &vars.link_p_nom,
            link.id.as_str(),
            link.p_nom,
        ));
    }
    let p0 = series_values(result, &vars.link_p);
    network.links_t.p1 = p0
        .iter()
        .map(|(id, values)| {
            let efficiency = network.links.get(id).map_or(1.0, |link| link.efficiency);
            (id.clone(), values.iter().map(|p| -efficiency * p).collect())
        })
        .collect();
    network.links_t.p0 = p0;

    for unit in network.storage_units.values_mut() {
        unit.p_nom_opt = Some(optimal_capacity(
            result,
            &vars.storage_p_nom,
            unit.id.as_str(),
            unit.p_nom,
        ));
    }
    let storage = &mut network.storage_units_t;
    storage.p_dispatch = series_values(result, &vars.storage_p_dispatch);
    storage.p_store = series_values(result, &vars.storage_p_store);
    storage.state_of_charge = series_values(result, &vars.storage_state_of_charge);
    storage.spill = series_values(result, &vars.storage_spill);

    for store in network.stores.values_mut() {
        store.e_nom_opt = Some(optimal_capacity(
            result,
            &vars.store_e_nom,
            store.id.as_str(),
            store.e_nom,
        ));
    }
    network.stores_t.e = series_values(result, &vars.store_e);
    network.stores_t.p = series_values(result, &vars.store_p);

    // Nodal prices are per unit of energy, so undo the objective weighting
    let w_obj = network.snapshots.objective_weightings();
    network.buses_t.marginal_price = formulation
        .duals
        .nodal_balance
        .iter()
        .map(|(bus, rows)| {
            let prices = rows
                .iter()
                .zip(&w_obj)
                .map(|(&row, &w)| if w == 0.0 { 0.0 } else { result.duals[row] / w })
                .collect();
            (bus.clone(), prices)
        })
        .collect();

    for (id, &row) in &formulation.duals.global_constraints {
        if let Some(gc) = network.global_constraints.get_mut(id) {
            gc.mu = Some(result.duals[row]);
        }
    }

    network.objective = result.objective;
}
