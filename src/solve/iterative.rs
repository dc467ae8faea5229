//! Iterative transmission expansion.
//!
//! Line impedances depend on line capacity, which makes the problem non-linear. It is solved as a
//! sequence of LPs: after each solve the reactance (resistance for DC lines) of every extendable
//! line is scaled by its change in capacity, until capacities stop changing. A last solve with
//! all transmission capacity fixed at its optimum gives consistent prices.
use super::{SolveContext, SolvedProblem, optimise};
use crate::config::SolvingOptions;
use crate::network::{IterationRecord, LineID, LinkID, Network};
use anyhow::Result;
use indexmap::IndexMap;
use log::{info, warn};

/// Capacity of every line before a solve
type LineCapacities = IndexMap<LineID, f64>;

/// Current capacity of every line: the last optimum, else the nominal value
fn line_capacities(network: &Network) -> LineCapacities {
    network
        .lines
        .values()
        .map(|line| (line.id.clone(), line.s_nom_opt.unwrap_or(line.s_nom)))
        .collect()
}

/// Scale line impedances by the change in capacity since `previous`.
///
/// Lines whose capacity was or has become zero keep their impedance.
pub fn update_line_params(network: &mut Network, previous: &LineCapacities) {
    for (id, &s_nom_prev) in previous {
        let Some(line) = network.lines.get_mut(id) else {
            continue;
        };
        let Some(s_nom_opt) = line.s_nom_opt else {
            continue;
        };
        let factor = s_nom_opt / s_nom_prev;
        if !factor.is_finite() || factor <= 0.0 {
            continue;
        }

        if line.is_dc() {
            line.r /= factor;
        } else {
            line.x /= factor;
        }
    }
}

/// Relative root mean square change of the line capacities.
///
/// Fixed lines are included, so they dilute the change of the extendable ones.
pub fn msq_diff(network: &Network, previous: &LineCapacities) -> f64 {
    let pairs: Vec<(f64, f64)> = previous
        .iter()
        .filter_map(|(id, &s_nom_prev)| {
            let s_nom_opt = network.lines.get(id)?.s_nom_opt?;
            Some((s_nom_prev, s_nom_opt))
        })
        .collect();
    if pairs.is_empty() {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mean_square = pairs.iter().map(|(prev, opt)| (prev - opt).powi(2)).sum::<f64>() / n;
    let mean_opt = pairs.iter().map(|(_, opt)| opt).sum::<f64>() / n;
    if mean_opt == 0.0 {
        return 0.0;
    }

    mean_square.sqrt() / mean_opt
}

/// Record the outcome of an iteration
fn record_iteration(network: &mut Network, iteration: u32, solved: &SolvedProblem) {
    let s_nom_opt = network
        .extendable_lines()
        .map(|line| (line.id.clone(), line.s_nom_opt.unwrap_or(line.s_nom)))
        .collect();
    network.iterations.push(IterationRecord {
        iteration,
        status: solved.result.status.to_string(),
        condition: solved.result.condition.to_string(),
        objective: solved.result.objective.unwrap_or(f64::NAN),
        s_nom_opt,
    });
}

/// Transmission capacity which was fixed for the last solve
struct FixedBranches {
    lines: IndexMap<LineID, f64>,
    links: IndexMap<LinkID, f64>,
}

impl FixedBranches {
    /// Fix extendable lines and DC links at their optimal capacity
    fn fix(network: &mut Network) -> Self {
        let mut lines = IndexMap::new();
        for line in network.lines.values_mut().filter(|l| l.s_nom_extendable) {
            lines.insert(line.id.clone(), line.s_nom);
            line.s_nom = line.s_nom_opt.unwrap_or(line.s_nom);
            line.s_nom_extendable = false;
        }
        let mut links = IndexMap::new();
        for link in network
            .links
            .values_mut()
            .filter(|l| l.p_nom_extendable && l.is_dc())
        {
            links.insert(link.id.clone(), link.p_nom);
            link.p_nom = link.p_nom_opt.unwrap_or(link.p_nom);
            link.p_nom_extendable = false;
        }

        Self { lines, links }
    }

    /// Make the branches extendable again, with their original nominal capacity
    fn restore(self, network: &mut Network) {
        for (id, s_nom) in self.lines {
            if let Some(line) = network.lines.get_mut(&id) {
                line.s_nom = s_nom;
                line.s_nom_extendable = true;
            }
        }
        for (id, p_nom) in self.links {
            if let Some(link) = network.links.get_mut(&id) {
                link.p_nom = p_nom;
                link.p_nom_extendable = true;
            }
        }
    }
}

/// Solve a network with the sequential linear programming loop.
///
/// Iterates while the relative change in line capacity is at least `msq_threshold` or fewer than
/// `min_iterations` solves have been done, stopping after `max_iterations`. A solve which does
/// not succeed ends the loop and is returned for reporting.
pub fn optimise_transmission_expansion_iteratively(
    network: &mut Network,
    ctx: &SolveContext,
) -> Result<SolvedProblem> {
    let SolvingOptions {
        track_iterations,
        min_iterations,
        max_iterations,
        msq_threshold,
        ..
    } = ctx.config.solving.options;

    let mut iteration = 1;
    let mut diff = msq_threshold;
    while diff >= msq_threshold || iteration < min_iterations {
        if iteration > max_iterations {
            info!("Iteration {iteration} beyond max_iterations {max_iterations}. Stopping ...");
            break;
        }

        let previous = line_capacities(network);
        let solved = optimise(network, ctx)?;
        if track_iterations {
            record_iteration(network, iteration, &solved);
        }
        if !solved.result.is_ok() {
            warn!("Iteration {iteration} did not solve successfully; stopping iterations");
            return Ok(solved);
        }

        update_line_params(network, &previous);
        diff = msq_diff(network, &previous);
        info!("Mean square difference after iteration {iteration} is {diff}");
        iteration += 1;
    }

    info!("Running last lopf with fixed branches (HVDC links and HVAC lines)");
    let fixed = FixedBranches::fix(network);
    let solved = optimise(network, ctx);
    fixed.restore(network);

    solved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::constraints::ConstraintAssembler;
    use crate::fixture::{config, quiet_solver, two_bus_network};
    use crate::optimisation::HighsSolver;
    use crate::opts::ScenarioOptions;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(100.0, 200.0, 0.05)]
    #[case(200.0, 100.0, 0.2)]
    fn test_update_line_params(
        mut two_bus_network: Network,
        #[case] s_nom_prev: f64,
        #[case] s_nom_opt: f64,
        #[case] expected_x: f64,
    ) {
        two_bus_network.lines["line0"].s_nom_opt = Some(s_nom_opt);
        let previous = [("line0".into(), s_nom_prev)].into_iter().collect();
        update_line_params(&mut two_bus_network, &previous);
        assert_approx_eq!(f64, two_bus_network.lines["line0"].x, expected_x);
    }

    #[rstest]
    fn test_update_skips_unbuilt_lines(mut two_bus_network: Network) {
        two_bus_network.lines["line0"].s_nom_opt = Some(0.0);
        let previous = [("line0".into(), 100.0)].into_iter().collect();
        update_line_params(&mut two_bus_network, &previous);
        assert_approx_eq!(f64, two_bus_network.lines["line0"].x, 0.1);
    }

    #[rstest]
    fn test_msq_diff(mut two_bus_network: Network) {
        let mut line = two_bus_network.lines["line0"].clone();
        line.id = "line1".into();
        two_bus_network.lines.insert(line.id.clone(), line);
        two_bus_network.lines["line0"].s_nom_opt = Some(110.0);
        two_bus_network.lines["line1"].s_nom_opt = Some(90.0);
        let previous = [("line0".into(), 100.0), ("line1".into(), 100.0)]
            .into_iter()
            .collect();

        // RMS change of 10 over a mean of 100
        assert_approx_eq!(f64, msq_diff(&two_bus_network, &previous), 0.1);
    }

    #[rstest]
    fn test_msq_diff_includes_fixed_lines(mut two_bus_network: Network) {
        let mut line = two_bus_network.lines["line0"].clone();
        line.id = "line1".into();
        line.s_nom_extendable = true;
        two_bus_network.lines.insert(line.id.clone(), line);
        two_bus_network.lines["line0"].s_nom_opt = Some(200.0);
        two_bus_network.lines["line1"].s_nom_opt = Some(240.0);
        let previous = line_capacities(&two_bus_network);
        assert_eq!(previous.len(), 2);
        let previous = [("line0".into(), 200.0), ("line1".into(), 200.0)]
            .into_iter()
            .collect();

        let expected = (40.0_f64.powi(2) / 2.0).sqrt() / 220.0;
        assert_approx_eq!(f64, msq_diff(&two_bus_network, &previous), expected);
    }

    #[rstest]
    fn test_iterative_solve(
        mut two_bus_network: Network,
        mut config: Config,
        quiet_solver: HighsSolver,
    ) {
        // Make gas expensive to build so that importing wind is attractive
        let gas = &mut two_bus_network.generators["gas"];
        gas.capital_cost = 1000.0;
        let wind = &mut two_bus_network.generators["wind"];
        wind.p_nom = 300.0;
        let line = &mut two_bus_network.lines["line0"];
        line.s_nom = 10.0;
        line.s_nom_extendable = true;
        line.capital_cost = 1.0;

        config.solving.options.track_iterations = true;
        config.solving.options.min_iterations = 2;
        config.solving.options.max_iterations = 3;
        let assembler =
            ConstraintAssembler::from_config(&config, &ScenarioOptions::default()).unwrap();
        let ctx = SolveContext {
            config: &config,
            assembler: &assembler,
            solver: &quiet_solver,
            reference: None,
        };
        let solved =
            optimise_transmission_expansion_iteratively(&mut two_bus_network, &ctx).unwrap();
        assert!(solved.result.is_ok());

        let iterations = &two_bus_network.iterations;
        assert!((2..=3).contains(&iterations.len()));
        assert_eq!(iterations[0].iteration, 1);
        assert_eq!(iterations[0].status, "ok");

        // The fixed branches are made extendable again with their original capacity
        let line = &two_bus_network.lines["line0"];
        assert!(line.s_nom_extendable);
        assert_approx_eq!(f64, line.s_nom, 10.0);
        assert!(line.s_nom_opt.unwrap() > 10.0);
    }
}
