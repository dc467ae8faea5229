//! Preparing a network for optimisation.
//!
//! Scenario-level preparation ([`scenario`]) applies the scenario options to a base network.
//! Solve-level preparation ([`prepare_for_solve`]) applies the `solving.options` section just
//! before the network is optimised.
use crate::config::{Config, Foresight};
use crate::network::{BusID, Carrier, CarrierID, Generator, HOURS_PER_YEAR, Network};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub mod scenario;
pub use scenario::prepare_scenario;

/// Seed for the noise added to marginal costs
const MARGINAL_COST_SEED: u64 = 174;

/// Seed for the noise added to transmission capital costs
const CAPITAL_COST_SEED: u64 = 123;

/// Carrier of load shedding generators
const LOAD_SHEDDING_CARRIER: &str = "load";

/// Carriers whose potential is shared between generators built at different horizons
const LAND_USE_CARRIERS: [&str; 4] = ["solar", "onwind", "offwind-ac", "offwind-dc"];

/// Apply the solve-level options to a network
pub fn prepare_for_solve(network: &mut Network, config: &Config) -> Result<()> {
    let augmented = &config.augmented_line_connection;
    if augmented.add_to_snakefile {
        set_augmented_line_minimum(network, augmented.min_expansion);
    }

    let options = &config.solving.options;
    if let Some(threshold) = options.clip_p_max_pu {
        clip_p_max_pu(network, threshold);
    }
    if let Some(lv_limit) = network.global_constraints.get("lv_limit") {
        info!("Line volume limit: {}", lv_limit.constant);
    }
    if options.load_shedding {
        add_load_shedding(network)?;
    }
    if options.noisy_costs {
        add_cost_noise(network);
    }
    if let Some(nhours) = options.nhours {
        truncate_snapshots(network, nhours);
    }
    if config.foresight == Foresight::Myopic {
        let horizon = config
            .scenario
            .planning_horizon
            .context("Myopic foresight requires scenario.planning_horizon")?;
        reduce_land_use(network, horizon);
    }

    Ok(())
}

/// Give lines whose name contains "new" a minimum capacity
fn set_augmented_line_minimum(network: &mut Network, min_expansion: f64) {
    for line in network
        .lines
        .values_mut()
        .filter(|line| line.id.as_str().contains("new"))
    {
        line.s_nom_min = min_expansion;
    }
}

/// Set availability and inflow values at or below `threshold` to zero
pub fn clip_p_max_pu(network: &mut Network, threshold: f64) {
    let clip = |values: &mut Vec<f64>| {
        for value in values.iter_mut().filter(|value| **value <= threshold) {
            *value = 0.0;
        }
    };
    network.generators_t.p_max_pu.values_mut().for_each(clip);
    network.generators_t.p_min_pu.values_mut().for_each(clip);
    network.storage_units_t.inflow.values_mut().for_each(clip);
}

/// Add a very expensive generator to every bus, so that demand can always be met.
///
/// Dispatch and capacity of these generators are measured in kW.
pub fn add_load_shedding(network: &mut Network) -> Result<()> {
    network.add_carrier(Carrier::new(LOAD_SHEDDING_CARRIER));
    let buses: Vec<BusID> = network.buses.keys().cloned().collect();
    for bus in buses {
        let mut generator = Generator::new(
            &format!("{bus} load"),
            bus.as_str(),
            LOAD_SHEDDING_CARRIER,
        );
        generator.sign = 1e-3;
        // EUR/kWh
        generator.marginal_cost = 1e2;
        generator.p_nom = 1e9;
        network
            .add_generator(generator)
            .context("Could not add load shedding")?;
    }

    Ok(())
}

/// Draw one noise value per component in `0..1`, reseeding for every component kind
fn uniform_noise(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0.0..1.0)).collect()
}

/// Perturb costs slightly so that the optimum is unique
pub fn add_cost_noise(network: &mut Network) {
    let marginal = |u: f64| 1e-2 + 2e-3 * (u - 0.5);
    macro_rules! perturb_marginal_cost {
        ($components:expr) => {
            let noise = uniform_noise(MARGINAL_COST_SEED, $components.len());
            for (component, u) in $components.values_mut().zip(noise) {
                component.marginal_cost += marginal(u);
            }
        };
    }
    perturb_marginal_cost!(network.generators);
    perturb_marginal_cost!(network.links);
    perturb_marginal_cost!(network.storage_units);
    perturb_marginal_cost!(network.stores);

    let capital = |u: f64, length: f64| (1e-1 + 2e-2 * (u - 0.5)) * length;
    let noise = uniform_noise(CAPITAL_COST_SEED, network.lines.len());
    for (line, u) in network.lines.values_mut().zip(noise) {
        line.capital_cost += capital(u, line.length);
    }
    let noise = uniform_noise(CAPITAL_COST_SEED, network.links.len());
    for (link, u) in network.links.values_mut().zip(noise) {
        link.capital_cost += capital(u, link.length);
    }
}

/// Keep only the first `nhours` snapshots, each weighted to represent a full year
pub fn truncate_snapshots(network: &mut Network, nhours: usize) {
    network.set_snapshots(nhours);
    let kept = network.snapshots.len();
    if kept > 0 {
        network
            .snapshots
            .set_all_weightings(HOURS_PER_YEAR / kept as f64);
    }
}

/// The site a generator occupies: its own site, else its bus location, else the bus name
fn generator_site(network: &Network, generator: &Generator) -> String {
    generator
        .site
        .clone()
        .or_else(|| {
            network
                .buses
                .get(&generator.bus)
                .and_then(|bus| bus.location.clone())
        })
        .unwrap_or_else(|| generator.bus.to_string())
}

/// Subtract capacity built at earlier horizons from the potential of the current horizon.
///
/// For each land-using carrier and site, the capacity of generators with a build year before
/// `horizon` reduces the `p_nom_max` of the generator built at `horizon`. Potentials never go
/// below zero.
pub fn reduce_land_use(network: &mut Network, horizon: u32) {
    let mut existing: IndexMap<(CarrierID, String), f64> = IndexMap::new();
    for generator in network.generators.values() {
        if LAND_USE_CARRIERS.contains(&generator.carrier.as_str())
            && generator.build_year.is_some_and(|year| year < horizon)
        {
            let site = generator_site(network, generator);
            *existing
                .entry((generator.carrier.clone(), site))
                .or_insert(0.0) += generator.p_nom;
        }
    }

    let sites: Vec<_> = network
        .generators
        .values()
        .map(|generator| generator_site(network, generator))
        .collect();
    for (generator, site) in network.generators.values_mut().zip(sites) {
        if generator.build_year == Some(horizon)
            && let Some(capacity) = existing.get(&(generator.carrier.clone(), site))
        {
            debug!(
                "Reducing potential of {} by {capacity} MW of existing capacity",
                generator.id
            );
            generator.p_nom_max -= capacity;
        }
        generator.p_nom_max = generator.p_nom_max.max(0.0);
    }
}
