//! Constraints on the total capacity of extendable generators.
use super::{BuildContext, ConstraintBuilder};
use crate::input::CapacityLimits;
use crate::input::limits::read_capacity_limits;
use crate::network::{CarrierID, Generator};
use crate::optimisation::{ConstraintSense, LinearExpression, Problem};
use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, error, info};
use std::cell::OnceCell;
use std::path::PathBuf;

/// kW per MW
const KW_PER_MW: f64 = 1000.0;

/// Sum of the capacity variables of extendable generators matching `select`
fn extendable_capacity(
    ctx: &BuildContext,
    mut select: impl FnMut(&Generator) -> bool,
) -> LinearExpression {
    ctx.network
        .extendable_generators()
        .filter(|g| select(g))
        .filter_map(|g| ctx.variables.generator_p_nom.get(&g.id))
        .map(|&var| (var, 1.0))
        .collect()
}

/// `CCL`: total extendable capacity per country and carrier within configured bounds.
///
/// The limits file is read the first time there are extendable generators to constrain.
#[derive(Debug, Clone)]
pub struct CountryCarrierLimits {
    path: PathBuf,
    limits: OnceCell<CapacityLimits>,
}

impl CountryCarrierLimits {
    /// Create the builder from the path to the limits table
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            limits: OnceCell::new(),
        }
    }

    fn limits(&self) -> Result<&CapacityLimits> {
        if let Some(limits) = self.limits.get() {
            return Ok(limits);
        }

        let limits = read_capacity_limits(&self.path).inspect_err(|err| {
            error!(
                "Capacity limits could not be read from {}: {err:#}",
                self.path.display()
            );
        })?;
        Ok(self.limits.get_or_init(|| limits))
    }
}

impl ConstraintBuilder for CountryCarrierLimits {
    fn name(&self) -> &'static str {
        "country carrier limits"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        if !ctx.network.has_extendable_generators() {
            return Ok(());
        }

        let limits = self.limits()?;
        info!("Adding per carrier generation capacity constraints for individual countries");
        for (country, carrier, bounds) in limits.iter() {
            let lhs = extendable_capacity(ctx, |g| {
                g.carrier == *carrier && ctx.network.bus_country(&g.bus) == Some(country)
            });
            if lhs.is_empty() {
                debug!("No extendable {carrier} generators in {country}");
                continue;
            }

            let key = format!("{country},{carrier}");
            if let Some(min) = bounds.min {
                let sense = ConstraintSense::Ge;
                problem.add_constraint("agg_p_nom_min", key.clone(), &lhs, sense, min);
            }
            if let Some(max) = bounds.max {
                problem.add_constraint("agg_p_nom_max", key, &lhs, ConstraintSense::Le, max);
            }
        }

        Ok(())
    }
}

/// `BAU`: minimum total extendable capacity per carrier.
///
/// Minimum capacities are configured in kW.
#[derive(Debug, Clone)]
pub struct BauMinimumCapacity {
    mincaps: IndexMap<CarrierID, f64>,
}

impl BauMinimumCapacity {
    /// Create the builder from minimum capacities in kW
    pub fn new(mincaps: IndexMap<CarrierID, f64>) -> Self {
        Self { mincaps }
    }
}

impl ConstraintBuilder for BauMinimumCapacity {
    fn name(&self) -> &'static str {
        "BAU minimum capacity"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        if !ctx.network.has_extendable_generators() {
            return Ok(());
        }

        for (carrier, &mincap) in &self.mincaps {
            let lhs = extendable_capacity(ctx, |g| g.carrier == *carrier);
            if lhs.is_empty() {
                continue;
            }
            problem.add_constraint(
                "bau_mincaps",
                carrier.to_string(),
                &lhs,
                ConstraintSense::Ge,
                mincap / KW_PER_MW,
            );
        }

        Ok(())
    }
}

/// `SAFE`: conventional capacity must cover peak demand plus a reserve margin
#[derive(Debug, Clone)]
pub struct SafeReserveMargin {
    margin: f64,
    conventional_carriers: Vec<CarrierID>,
}

impl SafeReserveMargin {
    /// Create the builder
    pub fn new(margin: f64, conventional_carriers: Vec<CarrierID>) -> Self {
        Self {
            margin,
            conventional_carriers,
        }
    }
}

impl ConstraintBuilder for SafeReserveMargin {
    fn name(&self) -> &'static str {
        "SAFE reserve margin"
    }

    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        let network = ctx.network;
        if !network.has_extendable_generators() {
            return Ok(());
        }

        let is_conventional = |g: &Generator| self.conventional_carriers.contains(&g.carrier);
        let lhs = extendable_capacity(ctx, is_conventional);
        if lhs.is_empty() {
            debug!("No extendable conventional generators for the reserve margin");
            return Ok(());
        }

        let peak_demand = network
            .total_demand()
            .into_iter()
            .fold(0.0, f64::max);
        let existing: f64 = network
            .generators
            .values()
            .filter(|g| !g.p_nom_extendable && is_conventional(g))
            .map(|g| g.p_nom)
            .sum();
        let rhs = peak_demand * (1.0 + self.margin) - existing;
        problem.add_constraint(
            "safe_mintotalcap",
            "total".into(),
            &lhs,
            ConstraintSense::Ge,
            rhs,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{LOAD_P_SET, two_bus_network};
    use crate::formulation::build;
    use crate::network::Network;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

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
    fn test_bau_converts_kw(two_bus_network: Network) {
        let mincaps: IndexMap<CarrierID, f64> = [
            ("gas".into(), 150_000.0),
            ("nuclear".into(), 1000.0),
        ]
        .into_iter()
        .collect();
        let problem = apply(&two_bus_network, &BauMinimumCapacity::new(mincaps));

        let rows: Vec<_> = problem.rows_in_group("bau_mincaps").collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.key, "gas");
        assert_approx_eq!(f64, rows[0].1.lower, 150.0);
    }

    #[rstest]
    fn test_safe_rhs(mut two_bus_network: Network) {
        let mut coal = Generator::new("coal", "bus1", "coal");
        coal.p_nom = 20.0;
        two_bus_network.generators.insert(coal.id.clone(), coal);
        let builder = SafeReserveMargin::new(0.1, vec!["gas".into(), "coal".into()]);
        let problem = apply(&two_bus_network, &builder);

        let (_, row) = problem.rows_in_group("safe_mintotalcap").next().unwrap();
        let peak = LOAD_P_SET.into_iter().fold(0.0, f64::max);
        assert_approx_eq!(f64, row.lower, peak * 1.1 - 20.0);
        assert_eq!(row.terms.len(), 1);
    }

    #[rstest]
    fn test_no_extendable_generators(mut two_bus_network: Network) {
        for generator in two_bus_network.generators.values_mut() {
            generator.p_nom_extendable = false;
        }
        let builder = SafeReserveMargin::new(0.1, vec!["gas".into()]);
        let problem = apply(&two_bus_network, &builder);
        assert_eq!(problem.rows_in_group("safe_mintotalcap").count(), 0);
    }

    #[rstest]
    fn test_country_carrier_limits(two_bus_network: Network) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agg_p_nom_minmax.csv");
        fs::write(
            &path,
            "country,carrier,min,max\nFR,gas,10,\nDE,gas,,5\nFR,onwind,1,2\n",
        )
        .unwrap();
        let problem = apply(&two_bus_network, &CountryCarrierLimits::new(path));

        let sizes = problem.group_sizes();
        assert_eq!(sizes.get("agg_p_nom_min"), Some(&1));
        // Gas is only in FR and wind is not extendable
        assert!(!sizes.contains_key("agg_p_nom_max"));
    }

    #[rstest]
    fn test_country_carrier_limits_read_on_demand(mut two_bus_network: Network) {
        let dir = tempdir().unwrap();
        let builder = CountryCarrierLimits::new(dir.path().join("missing.csv"));
        let (mut problem, formulation) = build(&two_bus_network).unwrap();
        let ctx = BuildContext {
            network: &two_bus_network,
            variables: &formulation.variables,
            reference: None,
        };
        assert!(builder.build(&ctx, &mut problem).is_err());

        // Nothing extendable, so the file is never needed
        for generator in two_bus_network.generators.values_mut() {
            generator.p_nom_extendable = false;
        }
        let problem = apply(&two_bus_network, &builder);
        assert_eq!(problem.rows_in_group("agg_p_nom_min").count(), 0);
    }
}
