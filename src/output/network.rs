//! Code for writing a network to a folder of CSV files.
//!
//! The layout is the one read by [`read_network`](crate::input::read_network), so a solved
//! network can be loaded again (e.g. as the reference network for additionality).
use super::write_iterations;
use crate::id::IDLike;
use crate::input::network::{
    NETWORK_ATTRIBUTES_FILE_NAME, NetworkAttributes, SNAPSHOT_COLUMN, SNAPSHOTS_FILE_NAME,
    SnapshotRow,
};
use crate::network::{
    BusSeries, GeneratorSeries, LineSeries, LinkSeries, LoadSeries, Network, Snapshots,
    StorageUnitSeries, StoreSeries, TimeSeries, format_timestamp,
};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Write a network to `output_dir`.
///
/// Empty component tables and series are left out. `buses.csv` and `snapshots.csv` are always
/// written.
pub fn write_network(network: &Network, output_dir: &Path) -> Result<()> {
    write_snapshots(&output_dir.join(SNAPSHOTS_FILE_NAME), &network.snapshots)?;

    write_components(&output_dir.join("buses.csv"), &network.buses, true)?;
    macro_rules! write_table {
        ($field:ident, $list_name:literal) => {
            write_components(
                &output_dir.join(concat!($list_name, ".csv")),
                &network.$field,
                false,
            )?;
        };
    }
    write_table!(carriers, "carriers");
    write_table!(generators, "generators");
    write_table!(lines, "lines");
    write_table!(links, "links");
    write_table!(storage_units, "storage_units");
    write_table!(stores, "stores");
    write_table!(loads, "loads");
    write_table!(global_constraints, "global_constraints");

    macro_rules! write_all_series {
        ($field:ident, $series:ty, $list_name:literal) => {
            for &attr in <$series>::ATTRIBUTES {
                if let Some(series) = network.$field.get(attr)
                    && !series.is_empty()
                {
                    let path = output_dir.join(format!("{}-{attr}.csv", $list_name));
                    write_series(&path, series, &network.snapshots)?;
                }
            }
        };
    }
    write_all_series!(buses_t, BusSeries, "buses");
    write_all_series!(generators_t, GeneratorSeries, "generators");
    write_all_series!(lines_t, LineSeries, "lines");
    write_all_series!(links_t, LinkSeries, "links");
    write_all_series!(storage_units_t, StorageUnitSeries, "storage_units");
    write_all_series!(stores_t, StoreSeries, "stores");
    write_all_series!(loads_t, LoadSeries, "loads");

    let attributes = NetworkAttributes {
        objective: network.objective,
        meta: network.meta.clone(),
    };
    let attributes_path = output_dir.join(NETWORK_ATTRIBUTES_FILE_NAME);
    fs::write(&attributes_path, toml::to_string(&attributes)?)
        .with_context(|| format!("Could not write {}", attributes_path.display()))?;

    if !network.iterations.is_empty() {
        write_iterations(output_dir, &network.iterations)?;
    }

    Ok(())
}

/// Write the snapshots and their weightings
fn write_snapshots(file_path: &Path, snapshots: &Snapshots) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for snapshot in snapshots.iter() {
        writer.serialize(SnapshotRow {
            snapshot: format_timestamp(&snapshot.snapshot),
            objective: snapshot.weighting.objective,
            generators: snapshot.weighting.generators,
            stores: snapshot.weighting.stores,
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Write a component table, one row per component
fn write_components<ID, T>(
    file_path: &Path,
    components: &IndexMap<ID, T>,
    always: bool,
) -> Result<()>
where
    ID: IDLike,
    T: Serialize,
{
    if components.is_empty() && !always {
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for component in components.values() {
        writer.serialize(component)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write one attribute's series in wide format: a snapshot column then one column per component
fn write_series<ID: IDLike>(
    file_path: &Path,
    series: &TimeSeries<ID>,
    snapshots: &Snapshots,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;

    let mut header = vec![SNAPSHOT_COLUMN.to_string()];
    header.extend(series.iter().map(|(id, _)| id.to_string()));
    writer.write_record(&header)?;

    for (i, snapshot) in snapshots.iter().enumerate() {
        let mut record = vec![format_timestamp(&snapshot.snapshot)];
        record.extend(series.iter().map(|(_, values)| values[i].to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}
