//! Fixtures for tests
use crate::config::Config;
use crate::network::{
    Bus, Carrier, Generator, Line, Load, Network, Snapshots, TimeSeries,
};
use crate::optimisation::HighsSolver;
use chrono::NaiveDate;
use indexmap::indexmap;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Wind availability of the two-bus network
pub const WIND_P_MAX_PU: [f64; 4] = [0.8, 0.5, 0.2, 0.6];

/// Demand at `bus1` of the two-bus network
pub const LOAD_P_SET: [f64; 4] = [50.0, 60.0, 70.0, 80.0];

#[fixture]
pub fn snapshots() -> Snapshots {
    let start = NaiveDate::from_ymd_opt(2013, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Snapshots::hourly(start, 4)
}

/// Two buses joined by a line, with fixed wind at `bus0`, extendable gas and a load at `bus1`
#[fixture]
pub fn two_bus_network(snapshots: Snapshots) -> Network {
    let mut bus0 = Bus::new("bus0");
    bus0.country = Some("DE".into());
    let mut bus1 = Bus::new("bus1");
    bus1.country = Some("FR".into());

    let mut wind = Generator::new("wind", "bus0", "onwind");
    wind.p_nom = 100.0;
    let mut gas = Generator::new("gas", "bus1", "gas");
    gas.p_nom_extendable = true;
    gas.capital_cost = 10.0;
    gas.marginal_cost = 50.0;
    gas.efficiency = 0.5;

    let mut line = Line::new("line0", "bus0", "bus1");
    line.x = 0.1;
    line.s_nom = 200.0;
    line.length = 100.0;

    let mut gas_carrier = Carrier::new("gas");
    gas_carrier.co2_emissions = 0.2;

    let mut network = Network {
        snapshots,
        buses: indexmap! { bus0.id.clone() => bus0, bus1.id.clone() => bus1 },
        carriers: indexmap! {
            "onwind".into() => Carrier::new("onwind"),
            gas_carrier.id.clone() => gas_carrier,
            "AC".into() => Carrier::new("AC"),
        },
        generators: indexmap! { wind.id.clone() => wind, gas.id.clone() => gas },
        lines: indexmap! { line.id.clone() => line },
        loads: indexmap! { "load0".into() => Load::new("load0", "bus1", 0.0) },
        ..Network::default()
    };
    network.generators_t.p_max_pu =
        TimeSeries::from_iter([("wind".into(), WIND_P_MAX_PU.to_vec())]);
    network.loads_t.p_set = TimeSeries::from_iter([("load0".into(), LOAD_P_SET.to_vec())]);

    network
}

/// A configuration with every option at its default
#[fixture]
pub fn config() -> Config {
    Config::default()
}

/// HiGHS with its console output switched off
#[fixture]
pub fn quiet_solver() -> HighsSolver {
    let mut options = toml::Table::new();
    options.insert("output_flag".into(), false.into());
    HighsSolver::new(options)
}
