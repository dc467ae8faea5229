//! Side constraints added to the base formulation before each solve.
//!
//! Each kind of constraint is a [`ConstraintBuilder`]. The [`ConstraintAssembler`] works out once,
//! from the configuration and scenario options, which builders are active and then applies them
//! to every problem built during the run.
use crate::config::{Config, TemporalMatching};
use crate::formulation::{Variables, series};
use crate::network::{Generator, Network};
use crate::optimisation::{LinearExpression, Problem, Variable};
use crate::opts::ScenarioOptions;
use anyhow::{Context, Result};
use log::info;
use std::fmt;

pub mod capacity;
pub mod hydrogen;
pub mod reserve;
pub mod sector;
pub mod share;

use capacity::{BauMinimumCapacity, CountryCarrierLimits, SafeReserveMargin};
use hydrogen::{HydrogenColourShares, HydrogenNetworkLimit, MonthlyMatching, YearlyMatching};
use reserve::OperationalReserve;
use sector::{BatterySymmetry, ChpCoupling, Co2Sequestration};
use share::{EquityShareBuilder, RenewableShare};

/// Everything a builder may read while adding its constraints
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// The network being optimised
    pub network: &'a Network,
    /// Variables of the base formulation
    pub variables: &'a Variables,
    /// The solved reference network, when one is required
    pub reference: Option<&'a Network>,
}

impl BuildContext<'_> {
    /// Weightings used for generation (energy) sums
    pub fn generator_weightings(&self) -> Vec<f64> {
        self.network.snapshots.generator_weightings()
    }

    /// Weightings used for storage sums
    pub fn store_weightings(&self) -> Vec<f64> {
        self.network.snapshots.store_weightings()
    }
}

/// Adds a family of constraints to a problem
pub trait ConstraintBuilder: fmt::Debug {
    /// A short name for log messages
    fn name(&self) -> &'static str;

    /// Add this builder's constraints to `problem`.
    ///
    /// Builders with nothing to constrain (e.g. no matching components) add nothing.
    fn build(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()>;
}

/// Add `factor * weights[t] * vars[t]` for every snapshot to `expr`
pub(crate) fn add_weighted(expr: &mut LinearExpression, vars: &[Variable], weights: &[f64], factor: f64) {
    for (&var, w) in vars.iter().zip(weights) {
        expr.add_term(var, factor * w);
    }
}

/// Weighted total dispatch of the generators matching `select`
pub(crate) fn weighted_generation(
    ctx: &BuildContext,
    mut select: impl FnMut(&Generator) -> bool,
    weights: &[f64],
    factor: f64,
) -> LinearExpression {
    let mut expr = LinearExpression::new();
    for generator in ctx.network.generators.values().filter(|g| select(g)) {
        let p = series(&ctx.variables.generator_p, generator.id.as_str());
        add_weighted(&mut expr, p, weights, factor);
    }
    expr
}

/// The active side constraints of a run
#[derive(Debug, Default)]
pub struct ConstraintAssembler {
    builders: Vec<Box<dyn ConstraintBuilder>>,
}

impl ConstraintAssembler {
    /// Work out which builders are active for the given configuration and scenario options
    pub fn from_config(config: &Config, opts: &ScenarioOptions) -> Result<Self> {
        let mut builders: Vec<Box<dyn ConstraintBuilder>> = Vec::new();
        let electricity = &config.electricity;

        if opts.ccl {
            let path = electricity
                .agg_p_nom_limits
                .clone()
                .context("CCL requires electricity.agg_p_nom_limits to be set")?;
            builders.push(Box::new(CountryCarrierLimits::new(path)));
        }
        for share in &opts.equity {
            builders.push(Box::new(EquityShareBuilder::new(*share)));
        }
        if opts.bau {
            builders.push(Box::new(BauMinimumCapacity::new(
                electricity.bau_mincapacities.clone(),
            )));
        }
        if opts.safe {
            builders.push(Box::new(SafeReserveMargin::new(
                electricity.safe_reservemargin,
                electricity.conventional_carriers.clone(),
            )));
        }
        if electricity.operational_reserve.activate {
            builders.push(Box::new(OperationalReserve::new(
                electricity.operational_reserve.clone(),
            )));
        }
        builders.push(Box::new(BatterySymmetry));
        for &share in &opts.res_share {
            builders.push(Box::new(RenewableShare::new(share, electricity)));
        }

        let hydrogen = &config.sector.hydrogen;
        if hydrogen.network
            && let Some(limit) = hydrogen.network_limit
        {
            builders.push(Box::new(HydrogenNetworkLimit::new(limit)));
        }

        let policy = &config.policy_config.hydrogen;
        match policy.temporal_matching {
            TemporalMatching::Yearly => {
                if policy.additionality {
                    info!(
                        "additionality is currently not supported for yearly constraints, \
                         proceeding without additionality"
                    );
                }
                builders.push(Box::new(YearlyMatching::new(
                    config.policy_config.yearly.re_country_load,
                    electricity.renewable_carriers.clone(),
                )));
            }
            TemporalMatching::Monthly => {
                if policy.is_reference {
                    info!("preparing reference case for additionality constraint");
                } else {
                    builders.push(Box::new(MonthlyMatching::new(
                        policy.allowed_excess,
                        policy.additionality,
                        electricity.renewable_carriers.clone(),
                    )));
                }
            }
            TemporalMatching::NoResMatching => info!("no h2 export constraint set"),
        }

        builders.push(Box::new(ChpCoupling));
        builders.push(Box::new(Co2Sequestration::new(
            config.sector.co2_sequestration_potential,
        )));
        if hydrogen.set_color_shares {
            builders.push(Box::new(HydrogenColourShares::new(
                hydrogen.blue_share,
                hydrogen.pink_share,
            )));
        }

        Ok(Self { builders })
    }

    /// The names of the active builders, in the order they are applied
    pub fn names(&self) -> Vec<&'static str> {
        self.builders.iter().map(|builder| builder.name()).collect()
    }

    /// Apply every active builder to `problem`
    pub fn apply(&self, ctx: &BuildContext, problem: &mut Problem) -> Result<()> {
        for builder in &self.builders {
            let rows_before = problem.num_rows();
            builder.build(ctx, problem)?;
            log::debug!(
                "Constraint builder {} added {} rows",
                builder.name(),
                problem.num_rows() - rows_before
            );
        }
        Ok(())
    }
}
