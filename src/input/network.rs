//! Code for reading a network from a folder of CSV files.
//!
//! Each component kind has a static table (e.g. `generators.csv`) with one row per component and
//! optional time series files in wide format (e.g. `generators-p_max_pu.csv`), whose first column
//! holds the snapshot and whose remaining columns are named after components.
use super::{input_err_msg, read_csv_optional, read_toml};
use crate::id::{HasID, IDLike};
use crate::network::{
    BusSeries, GeneratorSeries, LineSeries, LinkSeries, LoadSeries, Network, Snapshot,
    SnapshotWeighting, Snapshots, StorageUnitSeries, StoreSeries, TimeSeries, parse_timestamp,
};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The file containing snapshots and their weightings
pub const SNAPSHOTS_FILE_NAME: &str = "snapshots.csv";

/// The file containing network-level attributes (objective, metadata)
pub const NETWORK_ATTRIBUTES_FILE_NAME: &str = "network.toml";

/// The name of the snapshot column in snapshot and time series files
pub const SNAPSHOT_COLUMN: &str = "snapshot";

/// A row of the snapshots file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotRow {
    pub snapshot: String,
    #[serde(default = "default_weighting")]
    pub objective: f64,
    #[serde(default = "default_weighting")]
    pub generators: f64,
    #[serde(default = "default_weighting")]
    pub stores: f64,
}

fn default_weighting() -> f64 {
    1.0
}

/// Network-level attributes stored alongside the component tables
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct NetworkAttributes {
    #[serde(default)]
    pub objective: Option<f64>,
    #[serde(default)]
    pub meta: toml::Table,
}

/// Read a network from the given folder.
///
/// Only `snapshots.csv` and `buses.csv` are required; other component tables default to empty.
/// The network is validated before it is returned.
pub fn read_network(network_dir: &Path) -> Result<Network> {
    let snapshots = read_snapshots(&network_dir.join(SNAPSHOTS_FILE_NAME))?;
    let buses_path = network_dir.join("buses.csv");
    ensure!(
        buses_path.is_file(),
        "Network folder {} has no buses.csv",
        network_dir.display()
    );

    let mut network = Network {
        buses: read_components(&buses_path, "bus")?,
        carriers: read_components(&network_dir.join("carriers.csv"), "carrier")?,
        generators: read_components(&network_dir.join("generators.csv"), "generator")?,
        lines: read_components(&network_dir.join("lines.csv"), "line")?,
        links: read_components(&network_dir.join("links.csv"), "link")?,
        storage_units: read_components(&network_dir.join("storage_units.csv"), "storage unit")?,
        stores: read_components(&network_dir.join("stores.csv"), "store")?,
        loads: read_components(&network_dir.join("loads.csv"), "load")?,
        global_constraints: read_components(
            &network_dir.join("global_constraints.csv"),
            "global constraint",
        )?,
        ..Network::default()
    };

    macro_rules! read_all_series {
        ($field:ident, $series:ty, $list_name:literal) => {
            for &attr in <$series>::ATTRIBUTES {
                let path = network_dir.join(format!("{}-{attr}.csv", $list_name));
                if path.is_file() {
                    let series = read_series(&path, &snapshots)?;
                    if let Some(target) = network.$field.get_mut(attr) {
                        *target = series;
                    }
                }
            }
        };
    }
    read_all_series!(buses_t, BusSeries, "buses");
    read_all_series!(generators_t, GeneratorSeries, "generators");
    read_all_series!(lines_t, LineSeries, "lines");
    read_all_series!(links_t, LinkSeries, "links");
    read_all_series!(storage_units_t, StorageUnitSeries, "storage_units");
    read_all_series!(stores_t, StoreSeries, "stores");
    read_all_series!(loads_t, LoadSeries, "loads");

    let attributes_path = network_dir.join(NETWORK_ATTRIBUTES_FILE_NAME);
    if attributes_path.is_file() {
        let attributes: NetworkAttributes = read_toml(&attributes_path)?;
        network.objective = attributes.objective;
        network.meta = attributes.meta;
    }

    network.snapshots = snapshots;
    network
        .validate()
        .with_context(|| format!("Invalid network in {}", network_dir.display()))?;

    Ok(network)
}

/// Read the snapshots file
fn read_snapshots(file_path: &Path) -> Result<Snapshots> {
    ensure!(
        file_path.is_file(),
        "Snapshots file {} not found",
        file_path.display()
    );
    let rows: Vec<SnapshotRow> = read_csv_optional(file_path)?;
    let snapshots = rows
        .into_iter()
        .map(|row| {
            Ok(Snapshot {
                snapshot: parse_timestamp(&row.snapshot)?,
                weighting: SnapshotWeighting {
                    objective: row.objective,
                    generators: row.generators,
                    stores: row.stores,
                },
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(file_path))?;

    Snapshots::new(snapshots).with_context(|| input_err_msg(file_path))
}

/// Read a component table into a map keyed by ID, rejecting duplicate IDs
fn read_components<ID, T>(file_path: &Path, kind: &str) -> Result<IndexMap<ID, T>>
where
    ID: IDLike,
    T: HasID<ID> + DeserializeOwned,
{
    let mut map = IndexMap::new();
    for component in read_csv_optional::<T>(file_path)? {
        let id = component.get_id().clone();
        ensure!(
            map.insert(id.clone(), component).is_none(),
            "Duplicate {kind} ID {id} found in {}",
            file_path.display()
        );
    }

    Ok(map)
}

/// Read a wide-format time series file.
///
/// The snapshot column must list exactly the network's snapshots, in order.
fn read_series<ID: IDLike>(file_path: &Path, snapshots: &Snapshots) -> Result<TimeSeries<ID>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?;
    let headers = reader
        .headers()
        .with_context(|| input_err_msg(file_path))?
        .clone();
    ensure!(
        headers.get(0) == Some(SNAPSHOT_COLUMN),
        "First column of {} must be {SNAPSHOT_COLUMN}",
        file_path.display()
    );

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(snapshots.len()); headers.len() - 1];
    let mut expected = snapshots.iter();
    for record in reader.records() {
        let record = record.with_context(|| input_err_msg(file_path))?;
        let timestamp = parse_timestamp(&record[0]).with_context(|| input_err_msg(file_path))?;
        ensure!(
            expected.next().map(|s| s.snapshot) == Some(timestamp),
            "Snapshot {timestamp} in {} does not match the network's snapshots",
            file_path.display()
        );
        for (column, value) in columns.iter_mut().zip(record.iter().skip(1)) {
            let value: f64 = value
                .parse()
                .with_context(|| format!("Invalid value '{value}' in {}", file_path.display()))?;
            column.push(value);
        }
    }
    ensure!(
        expected.next().is_none(),
        "{} does not cover all snapshots",
        file_path.display()
    );

    Ok(headers
        .iter()
        .skip(1)
        .map(|id| ID::from(id.to_string()))
        .zip(columns)
        .collect())
}
