//! Core constraints of the base formulation.
use super::{DualRows, Variables, nominal, series, snapshot_key};
use crate::network::{BusID, CarrierID, GlobalConstraint, GlobalConstraintType, Network, Snapshot};
use crate::optimisation::{ConstraintSense, LinearExpression, Problem};
use indexmap::IndexMap;

/// Add all core constraints, returning the rows whose duals are read back
pub fn add_constraints(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
) -> DualRows {
    let snapshots: Vec<Snapshot> = network.snapshots.iter().copied().collect();

    add_generator_limits(problem, network, vars, &snapshots);
    add_line_limits(problem, network, vars, &snapshots);
    add_link_limits(problem, network, vars, &snapshots);
    add_storage_unit_limits(problem, network, vars, &snapshots);
    add_store_limits(problem, network, vars, &snapshots);
    let nodal_balance = add_nodal_balance(problem, network, vars, &snapshots);
    add_kirchhoff_voltage_law(problem, network, vars, &snapshots);
    add_state_of_charge(problem, network, vars, &snapshots);
    add_store_energy_balance(problem, network, vars, &snapshots);

    let mut global_constraints = IndexMap::new();
    for gc in network.global_constraints.values() {
        let row = add_global_constraint(problem, network, vars, gc);
        global_constraints.insert(gc.id.clone(), row);
    }

    DualRows {
        nodal_balance,
        global_constraints,
    }
}

/// Add `dispatch - factor * capacity <sense> 0`
fn add_capacity_row(
    problem: &mut Problem,
    group: &str,
    key: String,
    dispatch: crate::optimisation::Variable,
    capacity: &LinearExpression,
    factor: f64,
    sense: ConstraintSense,
) {
    let mut lhs = LinearExpression::new();
    lhs.add_term(dispatch, 1.0);
    lhs.add_expression(capacity, -factor);
    problem.add_constraint(group, key, &lhs, sense, 0.0);
}

fn add_generator_limits(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for generator in network.extendable_generators() {
        let id = generator.id.as_str();
        let p_nom = nominal(&vars.generator_p_nom, id, generator.p_nom);
        let p_max_pu = network.generator_p_max_pu(generator);
        let p_min_pu = network.generator_p_min_pu(generator);
        for (t, &p) in series(&vars.generator_p, id).iter().enumerate() {
            let key = snapshot_key(id, &snapshots[t]);
            add_capacity_row(
                problem,
                "Generator-ext-p-upper",
                key.clone(),
                p,
                &p_nom,
                p_max_pu[t],
                ConstraintSense::Le,
            );
            add_capacity_row(
                problem,
                "Generator-ext-p-lower",
                key,
                p,
                &p_nom,
                p_min_pu[t],
                ConstraintSense::Ge,
            );
        }
    }
}

fn add_line_limits(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for line in network.extendable_lines() {
        let id = line.id.as_str();
        let s_nom = nominal(&vars.line_s_nom, id, line.s_nom);
        for (t, &s) in series(&vars.line_s, id).iter().enumerate() {
            let key = snapshot_key(id, &snapshots[t]);
            add_capacity_row(
                problem,
                "Line-ext-s-upper",
                key.clone(),
                s,
                &s_nom,
                line.s_max_pu,
                ConstraintSense::Le,
            );
            add_capacity_row(
                problem,
                "Line-ext-s-lower",
                key,
                s,
                &s_nom,
                -line.s_max_pu,
                ConstraintSense::Ge,
            );
        }
    }
}

fn add_link_limits(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for link in network.extendable_links() {
        let id = link.id.as_str();
        let p_nom = nominal(&vars.link_p_nom, id, link.p_nom);
        for (t, &p) in series(&vars.link_p, id).iter().enumerate() {
            let key = snapshot_key(id, &snapshots[t]);
            add_capacity_row(
                problem,
                "Link-ext-p-upper",
                key.clone(),
                p,
                &p_nom,
                link.p_max_pu,
                ConstraintSense::Le,
            );
            add_capacity_row(
                problem,
                "Link-ext-p-lower",
                key,
                p,
                &p_nom,
                link.p_min_pu,
                ConstraintSense::Ge,
            );
        }
    }
}

fn add_storage_unit_limits(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for unit in network
        .storage_units
        .values()
        .filter(|unit| unit.p_nom_extendable)
    {
        let id = unit.id.as_str();
        let p_nom = nominal(&vars.storage_p_nom, id, unit.p_nom);
        let limits = [
            (
                "StorageUnit-ext-p_dispatch-upper",
                series(&vars.storage_p_dispatch, id),
                unit.p_max_pu,
            ),
            (
                "StorageUnit-ext-p_store-upper",
                series(&vars.storage_p_store, id),
                -unit.p_min_pu,
            ),
            (
                "StorageUnit-ext-state_of_charge-upper",
                series(&vars.storage_state_of_charge, id),
                unit.max_hours,
            ),
        ];
        for (group, dispatch, factor) in limits {
            for (t, &var) in dispatch.iter().enumerate() {
                let key = snapshot_key(id, &snapshots[t]);
                add_capacity_row(problem, group, key, var, &p_nom, factor, ConstraintSense::Le);
            }
        }
    }
}

fn add_store_limits(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for store in network.stores.values().filter(|store| store.e_nom_extendable) {
        let id = store.id.as_str();
        let e_nom = nominal(&vars.store_e_nom, id, store.e_nom);
        for (t, &e) in series(&vars.store_e, id).iter().enumerate() {
            let key = snapshot_key(id, &snapshots[t]);
            add_capacity_row(
                problem,
                "Store-ext-e-upper",
                key.clone(),
                e,
                &e_nom,
                store.e_max_pu,
                ConstraintSense::Le,
            );
            add_capacity_row(
                problem,
                "Store-ext-e-lower",
                key,
                e,
                &e_nom,
                store.e_min_pu,
                ConstraintSense::Ge,
            );
        }
    }
}

/// Power injected at each bus must equal the load there
fn add_nodal_balance(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) -> IndexMap<BusID, Vec<usize>> {
    let n = snapshots.len();
    let mut injections: IndexMap<BusID, Vec<LinearExpression>> = network
        .buses
        .keys()
        .map(|bus| (bus.clone(), vec![LinearExpression::new(); n]))
        .collect();
    let mut demand: IndexMap<BusID, Vec<f64>> = network
        .buses
        .keys()
        .map(|bus| (bus.clone(), vec![0.0; n]))
        .collect();

    let mut inject = |bus: &BusID, vars: &[crate::optimisation::Variable], coeff: f64| {
        if let Some(exprs) = injections.get_mut(bus) {
            for (expr, &var) in exprs.iter_mut().zip(vars) {
                expr.add_term(var, coeff);
            }
        }
    };

    for generator in network.generators.values() {
        let p = series(&vars.generator_p, generator.id.as_str());
        inject(&generator.bus, p, generator.sign);
    }
    for unit in network.storage_units.values() {
        let id = unit.id.as_str();
        inject(&unit.bus, series(&vars.storage_p_dispatch, id), 1.0);
        inject(&unit.bus, series(&vars.storage_p_store, id), -1.0);
    }
    for store in network.stores.values() {
        inject(&store.bus, series(&vars.store_p, store.id.as_str()), 1.0);
    }
    for link in network.links.values() {
        let p = series(&vars.link_p, link.id.as_str());
        inject(&link.bus0, p, -1.0);
        inject(&link.bus1, p, link.efficiency);
    }
    for line in network.lines.values() {
        let s = series(&vars.line_s, line.id.as_str());
        inject(&line.bus0, s, -1.0);
        inject(&line.bus1, s, 1.0);
    }
    for load in network.loads.values() {
        if let Some(bus_demand) = demand.get_mut(&load.bus) {
            for (total, value) in bus_demand.iter_mut().zip(network.load_p_set(load)) {
                *total += value;
            }
        }
    }

    let mut rows = IndexMap::new();
    for (bus, exprs) in &injections {
        let bus_rows = exprs
            .iter()
            .zip(&demand[bus])
            .zip(snapshots)
            .map(|((lhs, &rhs), snapshot)| {
                let key = snapshot_key(bus.as_str(), snapshot);
                problem.add_constraint("Bus-nodal_balance", key, lhs, ConstraintSense::Eq, rhs)
            })
            .collect();
        rows.insert(bus.clone(), bus_rows);
    }
    rows
}

/// Flow on each line is set by the angle difference across it
fn add_kirchhoff_voltage_law(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for line in network.lines.values() {
        let v_nom = network.buses.get(&line.bus0).map_or(1.0, |bus| bus.v_nom);
        let impedance = if line.is_dc() { line.r } else { line.x };
        let x_pu = impedance / (v_nom * v_nom);
        let s = series(&vars.line_s, line.id.as_str());
        let theta0 = series(&vars.bus_theta, line.bus0.as_str());
        let theta1 = series(&vars.bus_theta, line.bus1.as_str());
        for (t, snapshot) in snapshots.iter().enumerate() {
            let lhs: LinearExpression = [(s[t], x_pu), (theta0[t], -1.0), (theta1[t], 1.0)]
                .into_iter()
                .collect();
            let key = snapshot_key(line.id.as_str(), snapshot);
            problem.add_constraint("Line-kvl", key, &lhs, ConstraintSense::Eq, 0.0);
        }
    }
}

/// Energy carried over from the previous snapshot.
///
/// For the first snapshot this is the last one when cyclic, else a constant initial level.
fn carry_over(
    lhs: &mut LinearExpression,
    levels: &[crate::optimisation::Variable],
    t: usize,
    retained: f64,
    cyclic: bool,
    initial: f64,
) -> f64 {
    match (t, cyclic) {
        (0, false) => retained * initial,
        (0, true) => {
            lhs.add_term(levels[levels.len() - 1], -retained);
            0.0
        }
        _ => {
            lhs.add_term(levels[t - 1], -retained);
            0.0
        }
    }
}

fn add_state_of_charge(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for unit in network.storage_units.values() {
        let id = unit.id.as_str();
        let soc = series(&vars.storage_state_of_charge, id);
        let p_store = series(&vars.storage_p_store, id);
        let p_dispatch = series(&vars.storage_p_dispatch, id);
        let spill = series(&vars.storage_spill, id);
        let inflow = network.storage_units_t.inflow.get(id);
        for (t, snapshot) in snapshots.iter().enumerate() {
            let w = snapshot.weighting.stores;
            let retained = (1.0 - unit.standing_loss).powf(w);
            let mut lhs = LinearExpression::new();
            lhs.add_term(soc[t], 1.0);
            let mut rhs = carry_over(
                &mut lhs,
                soc,
                t,
                retained,
                unit.cyclic_state_of_charge,
                unit.state_of_charge_initial,
            );
            lhs.add_term(p_store[t], -w * unit.efficiency_store);
            lhs.add_term(p_dispatch[t], w / unit.efficiency_dispatch);
            if let Some(&var) = spill.get(t) {
                lhs.add_term(var, w);
            }
            if let Some(inflow) = inflow {
                rhs += w * inflow[t];
            }
            let key = snapshot_key(id, snapshot);
            problem.add_constraint("StorageUnit-soc", key, &lhs, ConstraintSense::Eq, rhs);
        }
    }
}

fn add_store_energy_balance(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    snapshots: &[Snapshot],
) {
    for store in network.stores.values() {
        let id = store.id.as_str();
        let e = series(&vars.store_e, id);
        let p = series(&vars.store_p, id);
        for (t, snapshot) in snapshots.iter().enumerate() {
            let w = snapshot.weighting.stores;
            let retained = (1.0 - store.standing_loss).powf(w);
            let mut lhs = LinearExpression::new();
            lhs.add_term(e[t], 1.0);
            let rhs = carry_over(&mut lhs, e, t, retained, store.e_cyclic, store.e_initial);
            lhs.add_term(p[t], w);
            let key = snapshot_key(id, snapshot);
            problem.add_constraint("Store-energy_balance", key, &lhs, ConstraintSense::Eq, rhs);
        }
    }
}

/// Primary energy used by the network, weighted by the given carrier attribute
fn primary_energy(network: &Network, vars: &Variables, attribute: &str) -> LinearExpression {
    let attribute_of = |carrier: &CarrierID| {
        network
            .carriers
            .get(carrier)
            .and_then(|c| c.attribute(attribute))
            .unwrap_or(0.0)
    };
    let w_gen = network.snapshots.generator_weightings();
    let mut lhs = LinearExpression::new();

    for generator in network.generators.values() {
        let value = attribute_of(&generator.carrier);
        if value == 0.0 {
            continue;
        }
        let p = series(&vars.generator_p, generator.id.as_str());
        for (&var, w) in p.iter().zip(&w_gen) {
            lhs.add_term(var, w * value / generator.efficiency);
        }
    }

    // Energy drawn down from storage over the horizon
    for unit in network
        .storage_units
        .values()
        .filter(|unit| !unit.cyclic_state_of_charge)
    {
        let value = attribute_of(&unit.carrier);
        let soc = series(&vars.storage_state_of_charge, unit.id.as_str());
        if let Some(&last) = soc.last()
            && value != 0.0
        {
            lhs.add_constant(value * unit.state_of_charge_initial);
            lhs.add_term(last, -value);
        }
    }
    for store in network.stores.values().filter(|store| !store.e_cyclic) {
        let value = attribute_of(&store.carrier);
        if let Some(&last) = series(&vars.store_e, store.id.as_str()).last()
            && value != 0.0
        {
            lhs.add_constant(value * store.e_initial);
            lhs.add_term(last, -value);
        }
    }

    lhs
}

/// Total transmission capacity weighted by length (volume) or capital cost
fn transmission_expansion(
    network: &Network,
    vars: &Variables,
    gc: &GlobalConstraint,
    by_cost: bool,
) -> LinearExpression {
    let carriers: Vec<&str> = gc.carriers().collect();
    let mut lhs = LinearExpression::new();
    for line in network
        .lines
        .values()
        .filter(|line| carriers.contains(&line.carrier.as_str()))
    {
        let weight = if by_cost { line.capital_cost } else { line.length };
        lhs.add_expression(
            &nominal(&vars.line_s_nom, line.id.as_str(), line.s_nom),
            weight,
        );
    }
    for link in network
        .links
        .values()
        .filter(|link| carriers.contains(&link.carrier.as_str()))
    {
        let weight = if by_cost { link.capital_cost } else { link.length };
        lhs.add_expression(
            &nominal(&vars.link_p_nom, link.id.as_str(), link.p_nom),
            weight,
        );
    }
    lhs
}

fn add_global_constraint(
    problem: &mut Problem,
    network: &Network,
    vars: &Variables,
    gc: &GlobalConstraint,
) -> usize {
    let lhs = match gc.kind {
        GlobalConstraintType::PrimaryEnergy => {
            primary_energy(network, vars, &gc.carrier_attribute)
        }
        GlobalConstraintType::TransmissionVolumeExpansionLimit => {
            transmission_expansion(network, vars, gc, false)
        }
        GlobalConstraintType::TransmissionExpansionCostLimit => {
            transmission_expansion(network, vars, gc, true)
        }
    };
    problem.add_constraint(
        "GlobalConstraint",
        gc.id.to_string(),
        &lhs,
        gc.sense.into(),
        gc.constant,
    )
}

#[cfg(test)]
mod tests {
    use super::super::build;
    use crate::fixture::two_bus_network;
    use crate::network::{GlobalConstraint, GlobalConstraintType, Network, Sense, Store};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_co2_limit_row(mut two_bus_network: Network) {
        two_bus_network.add_global_constraint(GlobalConstraint {
            id: "CO2Limit".into(),
            kind: GlobalConstraintType::PrimaryEnergy,
            carrier_attribute: "co2_emissions".into(),
            sense: Sense::LessEqual,
            constant: 10.0,
            mu: None,
        });
        let (problem, formulation) = build(&two_bus_network).unwrap();
        let row = formulation.duals.global_constraints["CO2Limit"];
        let row = &problem.rows()[row];

        // Only gas emits: 0.2 t/MWh over an efficiency of 0.5
        assert_eq!(row.terms.len(), 4);
        for (_, coeff) in &row.terms {
            assert_approx_eq!(f64, *coeff, 0.4);
        }
        assert_approx_eq!(f64, row.upper, 10.0);
    }

    #[rstest]
    fn test_store_balance_cyclic(mut two_bus_network: Network) {
        let mut store = Store::new("battery", "bus1", "battery");
        store.e_cyclic = true;
        store.e_nom = 10.0;
        two_bus_network.stores.insert(store.id.clone(), store);
        let (problem, _) = build(&two_bus_network).unwrap();

        let rows: Vec<_> = problem.rows_in_group("Store-energy_balance").collect();
        assert_eq!(rows.len(), 4);
        // The first snapshot links to the last one
        let (_, first) = rows[0];
        assert_eq!(first.terms.len(), 3);
        assert_approx_eq!(f64, first.lower, 0.0);
    }
}
