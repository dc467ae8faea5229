//! Adding the decision variables of the base formulation.
use super::{CapacityVariables, Variables, snapshot_key};
use crate::network::{Network, Snapshot};
use crate::optimisation::{Problem, Variable};
use anyhow::Result;

/// Add one variable per snapshot for a component.
///
/// `bounds` gives the (cost, lower, upper) of the variable for each snapshot index.
fn add_series(
    problem: &mut Problem,
    snapshots: &[Snapshot],
    name: &str,
    id: &str,
    mut bounds: impl FnMut(usize) -> (f64, f64, f64),
) -> Vec<Variable> {
    snapshots
        .iter()
        .enumerate()
        .map(|(t, snapshot)| {
            let (cost, lower, upper) = bounds(t);
            problem.add_variable(
                format!("{name}[{}]", snapshot_key(id, snapshot)),
                cost,
                lower,
                upper,
            )
        })
        .collect()
}

/// Add a nominal capacity variable for an extendable component
fn add_capacity<ID: crate::id::IDLike>(
    problem: &mut Problem,
    capacities: &mut CapacityVariables<ID>,
    name: &str,
    id: &ID,
    capital_cost: f64,
    lower: f64,
    upper: f64,
) {
    let var = problem.add_variable(format!("{name}[{id}]"), capital_cost, lower, upper);
    capacities.insert(id.clone(), var);
}

/// Add all variables of the base formulation to the problem.
///
/// Fixed components have their dispatch limits set as variable bounds; extendable components get
/// free-standing dispatch variables which are limited by constraints instead.
pub fn add_variables(problem: &mut Problem, network: &Network) -> Result<Variables> {
    let snapshots: Vec<Snapshot> = network.snapshots.iter().copied().collect();
    let w_obj = network.snapshots.objective_weightings();
    let mut vars = Variables::default();

    for generator in network.generators.values() {
        let p_max_pu = network.generator_p_max_pu(generator);
        let p_min_pu = network.generator_p_min_pu(generator);
        let extendable = generator.p_nom_extendable;
        let p = add_series(problem, &snapshots, "Generator-p", generator.id.as_str(), |t| {
            let cost = w_obj[t] * generator.marginal_cost;
            if extendable {
                (cost, f64::NEG_INFINITY, f64::INFINITY)
            } else {
                let lower = p_min_pu[t] * generator.p_nom;
                let upper = p_max_pu[t] * generator.p_nom;
                (cost, lower.min(upper), upper)
            }
        });
        vars.generator_p.insert(generator.id.clone(), p);
        if extendable {
            add_capacity(
                problem,
                &mut vars.generator_p_nom,
                "Generator-p_nom",
                &generator.id,
                generator.capital_cost,
                generator.p_nom_min,
                generator.p_nom_max,
            );
        }
    }

    for line in network.lines.values() {
        let extendable = line.s_nom_extendable;
        let limit = line.s_max_pu * line.s_nom;
        let s = add_series(problem, &snapshots, "Line-s", line.id.as_str(), |_| {
            if extendable {
                (0.0, f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (0.0, -limit, limit)
            }
        });
        vars.line_s.insert(line.id.clone(), s);
        if extendable {
            add_capacity(
                problem,
                &mut vars.line_s_nom,
                "Line-s_nom",
                &line.id,
                line.capital_cost,
                line.s_nom_min,
                line.s_nom_max,
            );
        }
    }

    for link in network.links.values() {
        let extendable = link.p_nom_extendable;
        let p = add_series(problem, &snapshots, "Link-p", link.id.as_str(), |t| {
            let cost = w_obj[t] * link.marginal_cost;
            if extendable {
                (cost, f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (cost, link.p_min_pu * link.p_nom, link.p_max_pu * link.p_nom)
            }
        });
        vars.link_p.insert(link.id.clone(), p);
        if extendable {
            add_capacity(
                problem,
                &mut vars.link_p_nom,
                "Link-p_nom",
                &link.id,
                link.capital_cost,
                link.p_nom_min,
                link.p_nom_max,
            );
        }
    }

    for unit in network.storage_units.values() {
        let id = unit.id.as_str();
        let extendable = unit.p_nom_extendable;
        let upper = |limit: f64| {
            if extendable {
                f64::INFINITY
            } else {
                limit
            }
        };
        let p_dispatch = add_series(problem, &snapshots, "StorageUnit-p_dispatch", id, |t| {
            (
                w_obj[t] * unit.marginal_cost,
                0.0,
                upper(unit.p_max_pu * unit.p_nom),
            )
        });
        let p_store = add_series(problem, &snapshots, "StorageUnit-p_store", id, |_| {
            (0.0, 0.0, upper(-unit.p_min_pu * unit.p_nom))
        });
        let soc = add_series(problem, &snapshots, "StorageUnit-state_of_charge", id, |_| {
            (0.0, 0.0, upper(unit.max_hours * unit.p_nom))
        });
        vars.storage_p_dispatch.insert(unit.id.clone(), p_dispatch);
        vars.storage_p_store.insert(unit.id.clone(), p_store);
        vars.storage_state_of_charge.insert(unit.id.clone(), soc);

        if let Some(inflow) = network.storage_units_t.inflow.get(id) {
            let spill = add_series(problem, &snapshots, "StorageUnit-spill", id, |t| {
                (0.0, 0.0, inflow[t].max(0.0))
            });
            vars.storage_spill.insert(unit.id.clone(), spill);
        }

        if extendable {
            add_capacity(
                problem,
                &mut vars.storage_p_nom,
                "StorageUnit-p_nom",
                &unit.id,
                unit.capital_cost,
                unit.p_nom_min,
                unit.p_nom_max,
            );
        }
    }

    for store in network.stores.values() {
        let id = store.id.as_str();
        let extendable = store.e_nom_extendable;
        let e = add_series(problem, &snapshots, "Store-e", id, |_| {
            if extendable {
                (0.0, f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (0.0, store.e_min_pu * store.e_nom, store.e_max_pu * store.e_nom)
            }
        });
        let p = add_series(problem, &snapshots, "Store-p", id, |t| {
            (w_obj[t] * store.marginal_cost, f64::NEG_INFINITY, f64::INFINITY)
        });
        vars.store_e.insert(store.id.clone(), e);
        vars.store_p.insert(store.id.clone(), p);
        if extendable {
            add_capacity(
                problem,
                &mut vars.store_e_nom,
                "Store-e_nom",
                &store.id,
                store.capital_cost,
                store.e_nom_min,
                store.e_nom_max,
            );
        }
    }

    // One reference angle per sub-network
    for buses in network.sub_networks()? {
        for (i, bus) in buses.iter().enumerate() {
            let theta = add_series(problem, &snapshots, "Bus-theta", bus.as_str(), |_| {
                if i == 0 {
                    (0.0, 0.0, 0.0)
                } else {
                    (0.0, f64::NEG_INFINITY, f64::INFINITY)
                }
            });
            vars.bus_theta.insert(bus.clone(), theta);
        }
    }

    Ok(vars)
}
