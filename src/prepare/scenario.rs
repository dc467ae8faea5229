//! Applying scenario options to a base network.
use crate::config::Config;
use crate::input::CostTable;
use crate::network::{BusID, CarrierID, GlobalConstraint, GlobalConstraintType, Network, Sense};
use crate::opts::{
    AdjustedAttribute, Autarky, CarrierAdjustment, LimitFactor, ScenarioOptions,
    TransmissionLimit, TransmissionLimitKind,
};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use log::info;

/// Carrier of DC links
const DC: &str = "DC";

/// Carriers whose fuel counts towards the gas limit
const GAS_CARRIERS: [&str; 3] = ["OCGT", "CCGT", "CHP"];

/// MWh per TWh
const MWH_PER_TWH: f64 = 1e6;

/// Apply the scenario options and the transmission limit wildcard to a network.
///
/// `costs` is needed only when `scenario.ll` is set.
pub fn prepare_scenario(
    network: &mut Network,
    config: &Config,
    opts: &ScenarioOptions,
    costs: Option<&CostTable>,
) -> Result<()> {
    let nyears = network.years();

    if let Some(s_max_pu) = config.lines.s_max_pu {
        set_line_s_max_pu(network, s_max_pu);
    }
    if let Some(hours) = opts.resample_hours {
        average_every_nhours(network, hours);
    }
    if let Some(segments) = opts.segments {
        bail!(
            "Time series segmentation ({segments}SEG) is not supported; use <n>H to resample \
             instead"
        );
    }

    if let Some(factor) = opts.co2_limit {
        let electricity = &config.electricity;
        let annual = match factor {
            Some(factor) => {
                let base = electricity
                    .co2base
                    .context("Co2L with a factor requires electricity.co2base")?;
                info!("Setting CO2 limit according to wildcard value.");
                factor * base
            }
            None => {
                info!("Setting CO2 limit according to config value.");
                electricity
                    .co2limit
                    .context("Co2L requires electricity.co2limit")?
            }
        };
        add_co2_limit(network, annual, nyears);
    }

    if let Some(factor) = opts.gas_limit {
        let annual = match factor {
            Some(twh) => {
                info!("Setting gas usage limit according to wildcard value.");
                twh * MWH_PER_TWH
            }
            None => {
                info!("Setting gas usage limit according to config value.");
                config
                    .electricity
                    .gaslimit
                    .context("CH4L requires electricity.gaslimit")?
            }
        };
        add_gas_limit(network, annual, nyears);
    }

    for adjustment in &opts.carrier_adjustments {
        adjust_carrier(network, adjustment);
    }

    if let Some(price) = opts.emission_price {
        let price = match price {
            Some(price) => {
                info!("Setting emission prices according to wildcard value.");
                price
            }
            None => {
                info!("Setting emission prices according to config value.");
                config.costs.emission_prices.co2
            }
        };
        add_emission_prices(network, price);
    }

    if let Some(ll) = &config.scenario.ll {
        let limit: TransmissionLimit = ll.parse()?;
        let costs = costs.context("A transmission limit requires a cost table (costs.path)")?;
        set_transmission_limit(network, limit, costs, config.costs.discountrate, nyears)?;
    }

    set_line_nom_max(network, config.lines.s_nom_max, config.links.p_nom_max);

    match opts.autarky {
        Some(Autarky::All) => enforce_autarky(network, false),
        Some(Autarky::CrossBorder) => enforce_autarky(network, true),
        None => {}
    }

    Ok(())
}

/// Set the usable share of every line's capacity
pub fn set_line_s_max_pu(network: &mut Network, s_max_pu: f64) {
    for line in network.lines.values_mut() {
        line.s_max_pu = s_max_pu;
    }
    info!("N-1 security margin of lines set to {s_max_pu}");
}

/// Average every time series over windows of `hours` hours, summing the weightings
pub fn average_every_nhours(network: &mut Network, hours: u32) {
    info!("Resampling the network to {hours}h");
    let (snapshots, groups) = network.snapshots.resample(hours);
    network.resample_snapshots(snapshots, &groups);
}

/// Limit total CO2 emissions to `annual` tonnes per year
pub fn add_co2_limit(network: &mut Network, annual: f64, nyears: f64) {
    network.add_global_constraint(GlobalConstraint {
        id: "CO2Limit".into(),
        kind: GlobalConstraintType::PrimaryEnergy,
        carrier_attribute: "co2_emissions".into(),
        sense: Sense::LessEqual,
        constant: annual * nyears,
        mu: None,
    });
}

/// Limit the fuel use of gas-fired carriers to `annual` MWh per year
pub fn add_gas_limit(network: &mut Network, annual: f64, nyears: f64) {
    for carrier in GAS_CARRIERS {
        if let Some(carrier) = network.carriers.get_mut(carrier) {
            carrier.gas_usage = 1.0;
        }
    }
    network.add_global_constraint(GlobalConstraint {
        id: "GasLimit".into(),
        kind: GlobalConstraintType::PrimaryEnergy,
        carrier_attribute: "gas_usage".into(),
        sense: Sense::LessEqual,
        constant: annual * nyears,
        mu: None,
    });
}

/// Scale an attribute of every component whose carrier contains the adjustment's carrier
pub fn adjust_carrier(network: &mut Network, adjustment: &CarrierAdjustment) {
    let CarrierAdjustment {
        carrier,
        attribute,
        factor,
    } = adjustment;
    let factor = *factor;

    // Lines have no carrier in the scenario sense and no potential
    if carrier == "AC" {
        for line in network.lines.values_mut() {
            match attribute {
                AdjustedAttribute::PotentialMax => line.s_nom_max *= factor,
                AdjustedAttribute::CapitalCost => line.capital_cost *= factor,
                AdjustedAttribute::MarginalCost => {}
            }
        }
        return;
    }

    let matches = |c: &CarrierID| c.as_str().contains(carrier.as_str());
    for generator in network.generators.values_mut().filter(|g| matches(&g.carrier)) {
        match attribute {
            AdjustedAttribute::PotentialMax => generator.p_nom_max *= factor,
            AdjustedAttribute::CapitalCost => generator.capital_cost *= factor,
            AdjustedAttribute::MarginalCost => generator.marginal_cost *= factor,
        }
    }
    for link in network.links.values_mut().filter(|l| matches(&l.carrier)) {
        match attribute {
            AdjustedAttribute::PotentialMax => link.p_nom_max *= factor,
            AdjustedAttribute::CapitalCost => link.capital_cost *= factor,
            AdjustedAttribute::MarginalCost => link.marginal_cost *= factor,
        }
    }
    for unit in network.storage_units.values_mut().filter(|u| matches(&u.carrier)) {
        match attribute {
            AdjustedAttribute::PotentialMax => unit.p_nom_max *= factor,
            AdjustedAttribute::CapitalCost => unit.capital_cost *= factor,
            AdjustedAttribute::MarginalCost => unit.marginal_cost *= factor,
        }
    }
    for store in network.stores.values_mut().filter(|s| matches(&s.carrier)) {
        match attribute {
            AdjustedAttribute::PotentialMax => store.e_nom_max *= factor,
            AdjustedAttribute::CapitalCost => store.capital_cost *= factor,
            AdjustedAttribute::MarginalCost => store.marginal_cost *= factor,
        }
    }
}

/// Add a CO2 price to the marginal costs of emitting generators and storage units
pub fn add_emission_prices(network: &mut Network, co2_price: f64) {
    let price = |carrier: &CarrierID| {
        network
            .carriers
            .get(carrier)
            .map_or(0.0, |c| c.co2_emissions * co2_price)
    };
    let generator_prices: Vec<f64> = network
        .generators
        .values()
        .map(|g| price(&g.carrier) / g.efficiency)
        .collect();
    let unit_prices: Vec<f64> = network
        .storage_units
        .values()
        .map(|u| price(&u.carrier) / u.efficiency_dispatch)
        .collect();

    for (generator, price) in network.generators.values_mut().zip(generator_prices) {
        generator.marginal_cost += price;
    }
    for (unit, price) in network.storage_units.values_mut().zip(unit_prices) {
        unit.marginal_cost += price;
    }
}

/// Recompute line and DC link capital costs from the cost table
pub fn update_transmission_costs(
    network: &mut Network,
    costs: &CostTable,
    discount_rate: f64,
    nyears: f64,
) -> Result<()> {
    if !network.lines.is_empty() {
        let hvac = costs.capital_cost("HVAC overhead", discount_rate, nyears)?;
        for line in network.lines.values_mut() {
            line.capital_cost = line.length * hvac;
        }
    }

    if network.links.values().any(|link| link.carrier.as_str() == DC) {
        let hvdc = costs.capital_cost("HVDC overhead", discount_rate, nyears)?;
        let inverters = costs.capital_cost("HVDC inverter pair", discount_rate, nyears)?;
        for link in network
            .links
            .values_mut()
            .filter(|link| link.carrier.as_str() == DC)
        {
            link.capital_cost = link.length * hvdc + inverters;
        }
    }

    Ok(())
}

/// Apply the transmission limit wildcard (`v|c` followed by a factor or "opt")
pub fn set_transmission_limit(
    network: &mut Network,
    limit: TransmissionLimit,
    costs: &CostTable,
    discount_rate: f64,
    nyears: f64,
) -> Result<()> {
    let weight_of = |length: f64, capital_cost: f64| match limit.kind {
        TransmissionLimitKind::Volume => length,
        TransmissionLimitKind::Cost => capital_cost,
    };
    let reference: f64 = network
        .lines
        .values()
        .map(|line| line.s_nom * weight_of(line.length, line.capital_cost))
        .chain(
            network
                .links
                .values()
                .filter(|link| link.carrier.as_str() == DC)
                .map(|link| link.p_nom * weight_of(link.length, link.capital_cost)),
        )
        .sum();

    update_transmission_costs(network, costs, discount_rate, nyears)?;

    let expand = match limit.factor {
        LimitFactor::Opt => true,
        LimitFactor::Factor(factor) => factor > 1.0,
    };
    if expand {
        for line in network.lines.values_mut() {
            line.s_nom_min = line.s_nom;
            line.s_nom_extendable = true;
        }
        for link in network
            .links
            .values_mut()
            .filter(|link| link.carrier.as_str() == DC)
        {
            link.p_nom_min = link.p_nom;
            link.p_nom_extendable = true;
        }
    }

    if let LimitFactor::Factor(factor) = limit.factor {
        let (id, kind) = match limit.kind {
            TransmissionLimitKind::Volume => (
                "lv_limit",
                GlobalConstraintType::TransmissionVolumeExpansionLimit,
            ),
            TransmissionLimitKind::Cost => (
                "lc_limit",
                GlobalConstraintType::TransmissionExpansionCostLimit,
            ),
        };
        network.add_global_constraint(GlobalConstraint {
            id: id.into(),
            kind,
            carrier_attribute: "AC, DC".into(),
            sense: Sense::LessEqual,
            constant: factor * reference,
            mu: None,
        });
    }

    Ok(())
}

/// Clip line and link capacity potentials
pub fn set_line_nom_max(network: &mut Network, s_nom_max: f64, p_nom_max: f64) {
    for line in network.lines.values_mut() {
        line.s_nom_max = line.s_nom_max.min(s_nom_max);
    }
    for link in network.links.values_mut() {
        link.p_nom_max = link.p_nom_max.min(p_nom_max);
    }
}

/// Remove transmission: every line and DC link, or only those crossing a country border
pub fn enforce_autarky(network: &mut Network, only_crossborder: bool) {
    let countries: IndexMap<_, _> = network
        .buses
        .values()
        .map(|bus| (bus.id.clone(), bus.country.clone()))
        .collect();
    let crosses_border = |bus0: &BusID, bus1: &BusID| countries.get(bus0) != countries.get(bus1);

    let (lines, links) = if only_crossborder {
        (
            network.remove_lines(|line| crosses_border(&line.bus0, &line.bus1)),
            network.remove_links(|link| crosses_border(&link.bus0, &link.bus1)),
        )
    } else {
        (
            network.remove_lines(|_| true),
            network.remove_links(|link| link.carrier.as_str() == DC),
        )
    };
    info!("Removed {lines} lines and {links} links to enforce autarky");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{LOAD_P_SET, two_bus_network};
    use crate::network::{HOURS_PER_YEAR, Link};
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn costs() -> CostTable {
        let mut costs = CostTable::default();
        for technology in ["HVAC overhead", "HVDC overhead", "HVDC inverter pair"] {
            costs.insert(technology, "investment", 100.0);
            costs.insert(technology, "lifetime", 10.0);
        }
        costs
    }

    fn prepare(network: &mut Network, config: &Config, opts: &str) -> Result<()> {
        prepare_scenario(network, config, &opts.parse()?, None)
    }

    #[rstest]
    fn test_co2_limit_from_factor(mut two_bus_network: Network) {
        let mut config = Config::default();
        config.electricity.co2base = Some(1000.0);
        prepare(&mut two_bus_network, &config, "Co2L0.5").unwrap();

        let gc = &two_bus_network.global_constraints["CO2Limit"];
        let nyears = 4.0 / HOURS_PER_YEAR;
        assert_approx_eq!(f64, gc.constant, 500.0 * nyears);
        assert_eq!(gc.sense, Sense::LessEqual);
    }

    #[rstest]
    fn test_co2_limit_requires_config(mut two_bus_network: Network) {
        let config = Config::default();
        assert!(prepare(&mut two_bus_network, &config, "Co2L").is_err());
    }

    #[rstest]
    fn test_gas_limit(mut two_bus_network: Network) {
        two_bus_network
            .carriers
            .insert("OCGT".into(), crate::network::Carrier::new("OCGT"));
        prepare(&mut two_bus_network, &Config::default(), "CH4L2").unwrap();
        assert_approx_eq!(f64, two_bus_network.carriers["OCGT"].gas_usage, 1.0);
        let gc = &two_bus_network.global_constraints["GasLimit"];
        assert_approx_eq!(f64, gc.constant, 2e6 * 4.0 / HOURS_PER_YEAR);
    }

    #[rstest]
    fn test_segmentation_rejected(mut two_bus_network: Network) {
        assert!(prepare(&mut two_bus_network, &Config::default(), "100SEG").is_err());
    }

    #[rstest]
    fn test_resample(mut two_bus_network: Network) {
        prepare(&mut two_bus_network, &Config::default(), "2H").unwrap();
        assert_eq!(two_bus_network.snapshots.len(), 2);
        assert_eq!(
            two_bus_network.loads_t.p_set.get("load0").unwrap(),
            [
                (LOAD_P_SET[0] + LOAD_P_SET[1]) / 2.0,
                (LOAD_P_SET[2] + LOAD_P_SET[3]) / 2.0
            ]
        );
        assert_eq!(two_bus_network.snapshots.objective_weightings(), [2.0, 2.0]);
    }

    #[rstest]
    fn test_carrier_adjustment(mut two_bus_network: Network) {
        prepare(&mut two_bus_network, &Config::default(), "gas+c2-AC+c0.5").unwrap();
        assert_approx_eq!(f64, two_bus_network.generators["gas"].capital_cost, 20.0);
        assert_approx_eq!(f64, two_bus_network.generators["wind"].capital_cost, 0.0);
    }

    #[rstest]
    fn test_emission_prices(mut two_bus_network: Network) {
        prepare(&mut two_bus_network, &Config::default(), "Ep10").unwrap();
        // 0.2 t/MWh of fuel at 10 per tonne over an efficiency of 0.5
        assert_approx_eq!(f64, two_bus_network.generators["gas"].marginal_cost, 54.0);
        assert_approx_eq!(f64, two_bus_network.generators["wind"].marginal_cost, 0.0);
    }

    #[rstest]
    #[case("v1.5", true, Some(200.0 * 100.0 * 1.5))]
    #[case("vopt", true, None)]
    #[case("v1.0", false, Some(200.0 * 100.0))]
    fn test_transmission_limit(
        mut two_bus_network: Network,
        costs: CostTable,
        #[case] ll: &str,
        #[case] extendable: bool,
        #[case] constant: Option<f64>,
    ) {
        let limit: TransmissionLimit = ll.parse().unwrap();
        set_transmission_limit(&mut two_bus_network, limit, &costs, 0.0, 1.0).unwrap();

        let line = &two_bus_network.lines["line0"];
        assert_eq!(line.s_nom_extendable, extendable);
        // Length of 100 at an annuity of 10 per year
        assert_approx_eq!(f64, line.capital_cost, 1000.0);
        let gc = two_bus_network.global_constraints.get("lv_limit");
        assert_eq!(gc.map(|gc| gc.constant), constant);
    }

    #[rstest]
    fn test_transmission_limit_needs_costs(mut two_bus_network: Network) {
        let mut config = Config::default();
        config.scenario.ll = Some("copt".into());
        assert!(prepare(&mut two_bus_network, &config, "").is_err());
    }

    #[rstest]
    fn test_autarky(mut two_bus_network: Network) {
        let dc = Link::new("dc", "bus0", "bus1", DC);
        two_bus_network.links.insert(dc.id.clone(), dc);
        let ac = Link::new("heat", "bus1", "bus1", "heat pump");
        two_bus_network.links.insert(ac.id.clone(), ac);

        let mut network = two_bus_network.clone();
        prepare(&mut network, &Config::default(), "ATK").unwrap();
        assert!(network.lines.is_empty());
        assert_eq!(network.links.keys().map(|id| id.as_str()).collect::<Vec<_>>(), ["heat"]);

        prepare(&mut two_bus_network, &Config::default(), "ATKc").unwrap();
        assert!(two_bus_network.lines.is_empty());
        assert_eq!(two_bus_network.links.len(), 1);
    }

    #[rstest]
    fn test_line_nom_max(mut two_bus_network: Network) {
        let mut config = Config::default();
        config.lines.s_nom_max = 500.0;
        prepare(&mut two_bus_network, &config, "").unwrap();
        assert_approx_eq!(f64, two_bus_network.lines["line0"].s_nom_max, 500.0);
    }
}
