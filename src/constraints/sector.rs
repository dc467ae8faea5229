//! Couplings between sector components which are always enforced when present.
use super::{BuildContext, ConstraintBuilder};
use crate::formulation::{series, snapshot_key};
use crate::network::Link;
use crate::optimisation::{ConstraintSense, LinearExpression, Problem};
use anyhow::Result;

/// Carrier of battery buses
const BATTERY: &str = "battery";

/// Carrier of stores holding sequestered CO2
const CO2_STORED: &str = "co2 stored";

/// Mt per t
const TONNES_PER_MT: f64 = 1e6;

/// Battery chargers are sized to match their dischargers
#[derive(Debug, Clone, Copy)]
pub struct BatterySymmetry;

impl ConstraintBuilder for BatterySymmetry {
    fn name(&self) -> &'static str {
        "battery symmetry"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        let p_nom = &ctx.variables.link_p_nom;
        for bus in network
            .buses
            .values()
            .filter(|bus| bus.carrier.as_str() == BATTERY)
        {
            let charger = format!("{} charger", bus.id);
            let discharger = format!("{} discharger", bus.id);
            let (Some(&charger_var), Some(&discharger_var), Some(discharger_link)) = (
                p_nom.get(charger.as_str()),
                p_nom.get(discharger.as_str()),
                network.links.get(discharger.as_str()),
            ) else {
                continue;
            };

            let mut lhs = LinearExpression::new();
            lhs.add_term(charger_var, 1.0);
            lhs.add_term(discharger_var, -discharger_link.efficiency);
            problem.add_constraint(
                "link_charger_ratio",
                bus.id.to_string(),
                &lhs,
                ConstraintSense::Eq,
                0.0,
            );
        }
        Ok(())
    }
}

/// A combined heat and power plant, modelled as an electric and a heat link sharing a fuel input
struct ChpPair<'a> {
    electric: &'a Link,
    heat: &'a Link,
}

/// Find the CHP plants in a network.
///
/// Electric links are named `... urban central ... CHP electric` and their heat counterparts
/// have the same name with the last `electric` replaced by `heat`.
fn chp_pairs<'a>(ctx: &BuildContext<'a>) -> Vec<ChpPair<'a>> {
    let links = &ctx.network.links;
    links
        .values()
        .filter(|link| {
            let name = link.id.as_str();
            name.contains("urban central") && name.contains("CHP") && name.contains("electric")
        })
        .filter_map(|electric| {
            let (head, tail) = electric.id.as_str().rsplit_once("electric")?;
            let heat = links.get(format!("{head}heat{tail}").as_str())?;
            Some(ChpPair { electric, heat })
        })
        .collect()
}

/// Electric and heat output of CHP plants share a feasible operating region
#[derive(Debug, Clone, Copy)]
pub struct ChpCoupling;

impl ConstraintBuilder for ChpCoupling {
    fn name(&self) -> &'static str {
        "CHP coupling"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let vars = ctx.variables;
        let snapshots: Vec<_> = ctx.network.snapshots.iter().copied().collect();

        for ChpPair { electric, heat } in chp_pairs(ctx) {
            let e_id = electric.id.as_str();
            let p_nom_e = vars.link_p_nom.get(e_id).copied();
            let p_nom_h = vars.link_p_nom.get(heat.id.as_str()).copied();

            // Fixed ratio between the nominal capacities
            if let (Some(p_nom_e), Some(p_nom_h)) = (p_nom_e, p_nom_h) {
                let mut lhs = LinearExpression::new();
                lhs.add_term(p_nom_e, electric.efficiency * electric.p_nom_ratio);
                lhs.add_term(p_nom_h, -heat.efficiency);
                problem.add_constraint(
                    "chplink-fix_p_nom_ratio",
                    e_id.to_string(),
                    &lhs,
                    ConstraintSense::Eq,
                    0.0,
                );
            }

            let p_e = series(&vars.link_p, e_id);
            let p_h = series(&vars.link_p, heat.id.as_str());
            for ((&p_e, &p_h), snapshot) in p_e.iter().zip(p_h).zip(&snapshots) {
                let key = snapshot_key(e_id, snapshot);

                // Top iso fuel line
                let mut top = LinearExpression::new();
                top.add_term(p_h, 1.0);
                top.add_term(p_e, 1.0);
                let group = match p_nom_e {
                    Some(p_nom_e) => {
                        top.add_term(p_nom_e, -1.0);
                        "chplink-top_iso_fuel_line_ext"
                    }
                    None => {
                        top.add_constant(-electric.p_nom);
                        "chplink-top_iso_fuel_line_fix"
                    }
                };
                problem.add_constraint(group, key.clone(), &top, ConstraintSense::Le, 0.0);

                // Back-pressure line
                let mut backpressure = LinearExpression::new();
                backpressure.add_term(p_h, electric.c_b * heat.efficiency);
                backpressure.add_term(p_e, -electric.efficiency);
                let sense = ConstraintSense::Le;
                problem.add_constraint("chplink-backpressure", key, &backpressure, sense, 0.0);
            }
        }
        Ok(())
    }
}

/// Total sequestered CO2 at the end of the horizon is within the sequestration potential
#[derive(Debug, Clone, Copy)]
pub struct Co2Sequestration {
    potential: f64,
}

impl Co2Sequestration {
    /// Create the builder with a potential in Mt CO2
    pub fn new(potential: f64) -> Self {
        Self { potential }
    }
}

impl ConstraintBuilder for Co2Sequestration {
    fn name(&self) -> &'static str {
        "CO2 sequestration"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let lhs: LinearExpression = ctx
            .network
            .stores
            .values()
            .filter(|store| store.carrier.as_str() == CO2_STORED)
            .filter_map(|store| series(&ctx.variables.store_e, store.id.as_str()).last())
            .map(|&var| (var, 1.0))
            .collect();
        if lhs.is_empty() {
            return Ok(());
        }

        problem.add_constraint(
            "co2_sequestration_limit",
            CO2_STORED.into(),
            &lhs,
            ConstraintSense::Le,
            self.potential * TONNES_PER_MT,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::two_bus_network;
    use crate::formulation::build;
    use crate::network::{Bus, Network, Store};
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

    fn add_link(network: &mut Network, link: Link) {
        network.links.insert(link.id.clone(), link);
    }

    #[rstest]
    fn test_battery_symmetry(mut two_bus_network: Network) {
        let mut battery = Bus::new("bus0 battery");
        battery.carrier = BATTERY.into();
        two_bus_network.buses.insert(battery.id.clone(), battery);
        let mut charger = Link::new("bus0 battery charger", "bus0", "bus0 battery", "battery charger");
        charger.p_nom_extendable = true;
        let mut discharger = Link::new(
            "bus0 battery discharger",
            "bus0 battery",
            "bus0",
            "battery discharger",
        );
        discharger.p_nom_extendable = true;
        discharger.efficiency = 0.9;
        add_link(&mut two_bus_network, charger);
        add_link(&mut two_bus_network, discharger);

        let problem = apply(&two_bus_network, &BatterySymmetry);
        let (_, row) = problem.rows_in_group("link_charger_ratio").next().unwrap();
        assert_eq!(row.key, "bus0 battery");
        assert_approx_eq!(f64, row.terms[0].1, 1.0);
        assert_approx_eq!(f64, row.terms[1].1, -0.9);
        assert_approx_eq!(f64, row.lower, 0.0);
        assert_approx_eq!(f64, row.upper, 0.0);
    }

    #[rstest]
    fn test_chp_coupling(mut two_bus_network: Network) {
        let mut electric = Link::new(
            "bus1 urban central gas CHP electric",
            "bus0",
            "bus1",
            "urban central gas CHP electric",
        );
        electric.p_nom_extendable = true;
        electric.efficiency = 0.4;
        electric.c_b = 1.0;
        let mut heat = Link::new(
            "bus1 urban central gas CHP heat",
            "bus0",
            "bus1",
            "urban central gas CHP heat",
        );
        heat.p_nom_extendable = true;
        heat.efficiency = 0.5;
        add_link(&mut two_bus_network, electric);
        add_link(&mut two_bus_network, heat);

        let problem = apply(&two_bus_network, &ChpCoupling);
        let sizes = problem.group_sizes();
        assert_eq!(sizes.get("chplink-fix_p_nom_ratio"), Some(&1));
        assert_eq!(sizes.get("chplink-top_iso_fuel_line_ext"), Some(&4));
        assert_eq!(sizes.get("chplink-backpressure"), Some(&4));
        assert!(!sizes.contains_key("chplink-top_iso_fuel_line_fix"));

        let (_, row) = problem.rows_in_group("chplink-backpressure").next().unwrap();
        assert_approx_eq!(f64, row.terms[0].1, 0.5);
        assert_approx_eq!(f64, row.terms[1].1, -0.4);
    }

    #[rstest]
    fn test_chp_pairs_only_rename_suffix(mut two_bus_network: Network) {
        let name = "electricity urban central gas CHP";
        let electric = Link::new(&format!("{name} electric"), "bus0", "bus1", "CHP");
        let heat = Link::new(&format!("{name} heat"), "bus0", "bus1", "CHP");
        add_link(&mut two_bus_network, electric);
        add_link(&mut two_bus_network, heat);

        let problem = apply(&two_bus_network, &ChpCoupling);
        assert_eq!(problem.rows_in_group("chplink-backpressure").count(), 4);
    }

    #[rstest]
    fn test_chp_without_heat_link(mut two_bus_network: Network) {
        let electric = Link::new("urban central CHP electric", "bus0", "bus1", "CHP");
        add_link(&mut two_bus_network, electric);
        let problem = apply(&two_bus_network, &ChpCoupling);
        assert_eq!(problem.rows_in_group("chplink-backpressure").count(), 0);
    }

    #[rstest]
    fn test_co2_sequestration(mut two_bus_network: Network) {
        let mut store = Store::new("co2 stored", "bus0", CO2_STORED);
        store.e_nom_extendable = true;
        two_bus_network.stores.insert(store.id.clone(), store);

        let problem = apply(&two_bus_network, &Co2Sequestration::new(200.0));
        let rows: Vec<_> = problem.rows_in_group("co2_sequestration_limit").collect();
        assert_eq!(rows.len(), 1);
        let (_, row) = rows[0];
        assert_eq!(row.terms.len(), 1);
        assert_approx_eq!(f64, row.upper, 2e8);
    }
}
