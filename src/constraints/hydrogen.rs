//! Hydrogen network and production constraints.
use super::{BuildContext, ConstraintBuilder, add_weighted, weighted_generation};
use crate::formulation::series;
use crate::network::{CarrierID, HOURS_PER_YEAR, Network};
use crate::optimisation::{ConstraintSense, LinearExpression, Problem, Variable};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::warn;

/// Carrier of hydrogen pipelines
const H2_PIPELINE: &str = "H2 pipeline";

/// Name of the load representing hydrogen exports
const H2_EXPORT_LOAD: &str = "H2 export load";

/// Electrolysis efficiency assumed when the AC load is not matched
const DEFAULT_ELECTROLYSIS_EFFICIENCY: f64 = 0.7;

/// Load carriers whose static demand counts as hydrogen demand
const H2_DEMAND_CARRIERS: [&str; 3] = ["H2 for industry", "H2 for shipping", "H2"];

/// Load carrier of fuel cell vehicles, which has a time-varying demand
const FUEL_CELL_TRANSPORT: &str = "land transport fuel cell";

/// Whether a link performs electrolysis, judged by its name
fn is_electrolysis(name: &str) -> bool {
    name.contains("Electrolysis")
}

/// Total volume of new hydrogen pipelines is capped
#[derive(Debug, Clone, Copy)]
pub struct HydrogenNetworkLimit {
    limit: f64,
}

impl HydrogenNetworkLimit {
    /// Create the builder with a limit in GW·km
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }
}

impl ConstraintBuilder for HydrogenNetworkLimit {
    fn name(&self) -> &'static str {
        "H2 network limit"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let lhs: LinearExpression = ctx
            .network
            .extendable_links()
            .filter(|link| link.carrier.as_str() == H2_PIPELINE)
            .filter_map(|link| {
                let var = ctx.variables.link_p_nom.get(&link.id)?;
                Some((*var, link.length))
            })
            .collect();
        if lhs.is_empty() {
            return Ok(());
        }

        // The limit is in GW·km and capacities are in MW
        problem.add_constraint(
            "h2_network_limit",
            H2_PIPELINE.into(),
            &lhs,
            ConstraintSense::Le,
            self.limit * 1000.0,
        );
        Ok(())
    }
}

/// Annual renewable generation covers hydrogen exports
#[derive(Debug, Clone)]
pub struct YearlyMatching {
    re_country_load: bool,
    renewable_carriers: Vec<CarrierID>,
}

impl YearlyMatching {
    /// Create the builder.
    ///
    /// With `re_country_load`, renewables must also cover the AC load.
    pub fn new(re_country_load: bool, renewable_carriers: Vec<CarrierID>) -> Self {
        Self {
            re_country_load,
            renewable_carriers,
        }
    }
}

impl ConstraintBuilder for YearlyMatching {
    fn name(&self) -> &'static str {
        "H2 yearly matching"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        let Some(export_load) = network.loads.get(H2_EXPORT_LOAD) else {
            warn!("No load named '{H2_EXPORT_LOAD}' found; skipping yearly matching");
            return Ok(());
        };
        let h2_export = export_load.p_set * HOURS_PER_YEAR;
        let w_gen = ctx.generator_weightings();

        let rhs = if self.re_country_load {
            let efficiencies: Vec<f64> = network
                .links
                .values()
                .filter(|link| is_electrolysis(link.id.as_str()))
                .map(|link| link.efficiency)
                .collect();
            let efficiency = if efficiencies.is_empty() {
                warn!(
                    "No electrolysis links found; assuming an electrolysis efficiency of \
                     {DEFAULT_ELECTROLYSIS_EFFICIENCY}"
                );
                DEFAULT_ELECTROLYSIS_EFFICIENCY
            } else {
                efficiencies.iter().sum::<f64>() / efficiencies.len() as f64
            };
            let ac_load: f64 = network
                .loads
                .values()
                .filter(|load| load.carrier.as_str() == "AC")
                .flat_map(|load| network.load_p_set(load))
                .zip(w_gen.iter().cycle())
                .map(|(p, w)| p * w)
                .sum();
            h2_export / efficiency + ac_load
        } else {
            h2_export / DEFAULT_ELECTROLYSIS_EFFICIENCY
        };

        let lhs = weighted_generation(
            ctx,
            |g| self.renewable_carriers.contains(&g.carrier),
            &w_gen,
            1.0,
        );
        problem.add_constraint(
            "yearly_matching",
            "total".into(),
            &lhs,
            ConstraintSense::Ge,
            rhs,
        );
        Ok(())
    }
}

/// Per-month renewable generation minus electrolysis input in a solved network
fn monthly_surplus(network: &Network, renewable_carriers: &[CarrierID]) -> IndexMap<u32, f64> {
    let w_gen = network.snapshots.generator_weightings();
    let months = network.snapshots.months();
    let mut surplus: IndexMap<u32, f64> = months.iter().map(|&m| (m, 0.0)).collect();
    let mut add = |values: &[f64], sign: f64| {
        for ((value, w), month) in values.iter().zip(&w_gen).zip(&months) {
            *surplus.entry(*month).or_insert(0.0) += sign * w * value;
        }
    };

    for generator in network
        .generators
        .values()
        .filter(|g| renewable_carriers.contains(&g.carrier))
    {
        if let Some(p) = network.generators_t.p.get(generator.id.as_str()) {
            add(p, 1.0);
        }
    }
    for link in network
        .links
        .values()
        .filter(|link| link.id.as_str().contains("H2 Electrolysis"))
    {
        if let Some(p0) = network.links_t.p0.get(link.id.as_str()) {
            add(p0, -1.0);
        }
    }
    surplus
}

/// Monthly renewable generation covers electrolysis, optionally beyond a reference case
#[derive(Debug, Clone)]
pub struct MonthlyMatching {
    allowed_excess: f64,
    additionality: bool,
    renewable_carriers: Vec<CarrierID>,
}

impl MonthlyMatching {
    /// Create the builder
    pub fn new(allowed_excess: f64, additionality: bool, renewable_carriers: Vec<CarrierID>) -> Self {
        Self {
            allowed_excess,
            additionality,
            renewable_carriers,
        }
    }
}

impl ConstraintBuilder for MonthlyMatching {
    fn name(&self) -> &'static str {
        "H2 monthly matching"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        let vars = ctx.variables;
        let w_gen = ctx.generator_weightings();
        let months = network.snapshots.months();

        let reference = if self.additionality {
            let reference = ctx
                .reference
                .context("Additionality requires a solved reference network")?;
            Some(monthly_surplus(reference, &self.renewable_carriers))
        } else {
            None
        };

        let mut lhs: IndexMap<u32, LinearExpression> = IndexMap::new();
        let mut add = |vars: &[Variable], factor: f64| {
            for ((&var, w), month) in vars.iter().zip(&w_gen).zip(&months) {
                lhs.entry(*month).or_default().add_term(var, factor * w);
            }
        };
        for generator in network
            .generators
            .values()
            .filter(|g| self.renewable_carriers.contains(&g.carrier))
        {
            add(series(&vars.generator_p, generator.id.as_str()), 1.0);
        }
        for link in network
            .links
            .values()
            .filter(|link| link.id.as_str().contains("H2 Electrolysis"))
        {
            add(series(&vars.link_p, link.id.as_str()), -self.allowed_excess);
        }

        for (month, expr) in &lhs {
            let rhs = reference
                .as_ref()
                .and_then(|surplus| surplus.get(month).copied())
                .unwrap_or(0.0);
            problem.add_constraint(
                "monthly_matching",
                month.to_string(),
                expr,
                ConstraintSense::Ge,
                rhs,
            );
        }
        Ok(())
    }
}

/// Fixed shares of hydrogen demand come from blue and pink hydrogen
#[derive(Debug, Clone, Copy)]
pub struct HydrogenColourShares {
    blue_share: f64,
    pink_share: f64,
}

impl HydrogenColourShares {
    /// Create the builder
    pub fn new(blue_share: f64, pink_share: f64) -> Self {
        Self {
            blue_share,
            pink_share,
        }
    }

    /// Annual hydrogen demand
    fn h2_demand(network: &Network) -> f64 {
        let w_gen = network.snapshots.generator_weightings();
        let transport: f64 = network
            .loads
            .values()
            .filter(|load| load.carrier.as_str() == FUEL_CELL_TRANSPORT)
            .map(|load| {
                network
                    .load_p_set(load)
                    .iter()
                    .zip(&w_gen)
                    .map(|(p, w)| p * w)
                    .sum::<f64>()
            })
            .sum();
        let other: f64 = network
            .loads
            .values()
            .filter(|load| H2_DEMAND_CARRIERS.contains(&load.carrier.as_str()))
            .map(|load| load.p_set * HOURS_PER_YEAR)
            .sum();
        transport + other
    }
}

impl ConstraintBuilder for HydrogenColourShares {
    fn name(&self) -> &'static str {
        "H2 colour shares"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        let w_gen = ctx.generator_weightings();
        let demand = Self::h2_demand(network);

        for (colour, share) in [("blue", self.blue_share), ("pink", self.pink_share)] {
            let label = format!("{colour} H2");
            let mut lhs = LinearExpression::new();
            for link in network
                .links
                .values()
                .filter(|link| link.id.as_str().contains(&label))
            {
                add_weighted(&mut lhs, series(&ctx.variables.link_p, link.id.as_str()), &w_gen, 1.0);
            }
            if lhs.is_empty() {
                continue;
            }
            problem.add_constraint(
                &format!("{colour}_share"),
                "total".into(),
                &lhs,
                ConstraintSense::Eq,
                share * demand,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::two_bus_network;
    use crate::formulation::build;
    use crate::network::{Link, Load};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn apply(network: &Network, reference: Option<&Network>, builder: &dyn ConstraintBuilder) -> Result<Problem> {
        let (mut problem, formulation) = build(network).unwrap();
        let ctx = BuildContext {
            network,
            variables: &formulation.variables,
            reference,
        };
        builder.build(&ctx, &mut problem)?;
        Ok(problem)
    }

    fn with_electrolysis(mut network: Network) -> Network {
        network.buses.insert("h2".into(), crate::network::Bus::new("h2"));
        let mut link = Link::new("bus0 H2 Electrolysis", "bus0", "h2", "H2 electrolysis");
        link.efficiency = 0.8;
        link.p_nom = 50.0;
        network.links.insert(link.id.clone(), link);
        network
    }

    #[rstest]
    fn test_empty_network_is_no_op(two_bus_network: Network) {
        let limit = HydrogenNetworkLimit::new(1.0);
        let problem = apply(&two_bus_network, None, &limit).unwrap();
        assert_eq!(problem.rows_in_group("h2_network_limit").count(), 0);

        let shares = HydrogenColourShares::new(0.2, 0.1);
        let problem = apply(&two_bus_network, None, &shares).unwrap();
        assert_eq!(problem.group_sizes().get("blue_share"), None);
    }

    #[rstest]
    fn test_network_limit(mut two_bus_network: Network) {
        two_bus_network.buses.insert("h2".into(), crate::network::Bus::new("h2"));
        let mut pipe = Link::new("pipe", "h2", "h2", H2_PIPELINE);
        pipe.p_nom_extendable = true;
        pipe.length = 250.0;
        two_bus_network.links.insert(pipe.id.clone(), pipe);

        let problem = apply(&two_bus_network, None, &HydrogenNetworkLimit::new(2.0)).unwrap();
        let (_, row) = problem.rows_in_group("h2_network_limit").next().unwrap();
        assert_approx_eq!(f64, row.upper, 2000.0);
        assert_approx_eq!(f64, row.terms[0].1, 250.0);
    }

    #[rstest]
    fn test_yearly_matching(two_bus_network: Network) {
        let mut network = with_electrolysis(two_bus_network);
        let mut export = Load::new(H2_EXPORT_LOAD, "h2", 0.01);
        export.carrier = "H2".into();
        network.loads.insert(export.id.clone(), export);
        let renewables = vec![CarrierID::new("onwind")];

        let builder = YearlyMatching::new(false, renewables.clone());
        let problem = apply(&network, None, &builder).unwrap();
        let (_, row) = problem.rows_in_group("yearly_matching").next().unwrap();
        assert_approx_eq!(f64, row.lower, 0.01 * 8760.0 / 0.7, epsilon = 1e-9);

        let builder = YearlyMatching::new(true, renewables);
        let problem = apply(&network, None, &builder).unwrap();
        let (_, row) = problem.rows_in_group("yearly_matching").next().unwrap();
        let ac_load = 50.0 + 60.0 + 70.0 + 80.0;
        assert_approx_eq!(f64, row.lower, 0.01 * 8760.0 / 0.8 + ac_load, epsilon = 1e-9);
    }

    #[rstest]
    fn test_yearly_matching_country_load_without_electrolysis(two_bus_network: Network) {
        let mut network = two_bus_network;
        network.buses.insert("h2".into(), crate::network::Bus::new("h2"));
        let mut export = Load::new(H2_EXPORT_LOAD, "h2", 0.01);
        export.carrier = "H2".into();
        network.loads.insert(export.id.clone(), export);

        let builder = YearlyMatching::new(true, vec!["onwind".into()]);
        let problem = apply(&network, None, &builder).unwrap();
        let (_, row) = problem.rows_in_group("yearly_matching").next().unwrap();
        let ac_load = 50.0 + 60.0 + 70.0 + 80.0;
        assert_approx_eq!(f64, row.lower, 0.01 * 8760.0 / 0.7 + ac_load, epsilon = 1e-9);
    }

    #[rstest]
    fn test_yearly_matching_without_export(two_bus_network: Network) {
        let builder = YearlyMatching::new(false, vec!["onwind".into()]);
        let problem = apply(&two_bus_network, None, &builder).unwrap();
        assert_eq!(problem.rows_in_group("yearly_matching").count(), 0);
    }

    #[rstest]
    fn test_monthly_matching(two_bus_network: Network) {
        let network = with_electrolysis(two_bus_network);
        let builder = MonthlyMatching::new(1.0, false, vec!["onwind".into()]);
        let problem = apply(&network, None, &builder).unwrap();

        // All snapshots are in January
        let rows: Vec<_> = problem.rows_in_group("monthly_matching").collect();
        assert_eq!(rows.len(), 1);
        let (_, row) = rows[0];
        assert_eq!(row.key, "1");
        assert_eq!(row.terms.len(), 8);
        assert_approx_eq!(f64, row.lower, 0.0);
    }

    #[rstest]
    fn test_monthly_additionality(two_bus_network: Network) {
        let network = with_electrolysis(two_bus_network);
        let builder = MonthlyMatching::new(1.0, true, vec!["onwind".into()]);
        assert!(apply(&network, None, &builder).is_err());

        let mut reference = network.clone();
        reference
            .generators_t
            .p
            .insert("wind".into(), vec![10.0, 10.0, 10.0, 10.0]);
        reference
            .links_t
            .p0
            .insert("bus0 H2 Electrolysis".into(), vec![5.0, 0.0, 0.0, 0.0]);
        let problem = apply(&network, Some(&reference), &builder).unwrap();
        let (_, row) = problem.rows_in_group("monthly_matching").next().unwrap();
        assert_approx_eq!(f64, row.lower, 35.0);
    }

    #[rstest]
    fn test_colour_shares(mut two_bus_network: Network) {
        two_bus_network.buses.insert("h2".into(), crate::network::Bus::new("h2"));
        let blue = Link::new("bus0 SMR CC blue H2", "bus0", "h2", "SMR CC");
        two_bus_network.links.insert(blue.id.clone(), blue);
        let mut industry = Load::new("h2 industry", "h2", 2.0);
        industry.carrier = "H2 for industry".into();
        two_bus_network.loads.insert(industry.id.clone(), industry);

        let problem = apply(&two_bus_network, None, &HydrogenColourShares::new(0.25, 0.1)).unwrap();
        let (_, row) = problem.rows_in_group("blue_share").next().unwrap();
        assert_approx_eq!(f64, row.lower, 0.25 * 2.0 * HOURS_PER_YEAR, epsilon = 1e-9);
        assert_eq!(row.terms.len(), 4);
        // No pink hydrogen links
        assert_eq!(problem.rows_in_group("pink_share").count(), 0);
    }
}
