//! Snapshots and their weightings.
use anyhow::{Context, Result, ensure};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The number of hours in a (non-leap) year
pub const HOURS_PER_YEAR: f64 = 8760.0;

/// Timestamp formats accepted in snapshot columns
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a snapshot timestamp (`2013-01-01 00:00:00`, ISO 8601 or a bare date)
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(timestamp);
        }
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid snapshot timestamp: {value}"))?;
    Ok(date.and_time(NaiveTime::MIN))
}

/// Format a snapshot timestamp for output
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMATS[0]).to_string()
}

/// How much each snapshot counts for in different parts of the problem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotWeighting {
    /// Weighting of the snapshot in the objective function
    pub objective: f64,
    /// Weighting used when summing generator dispatch (energy)
    pub generators: f64,
    /// Weighting used in storage state of charge equations
    pub stores: f64,
}

impl SnapshotWeighting {
    /// A weighting which is the same for all three uses
    pub fn uniform(value: f64) -> Self {
        Self {
            objective: value,
            generators: value,
            stores: value,
        }
    }
}

impl Default for SnapshotWeighting {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// A single snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// The timestamp of the snapshot
    pub snapshot: NaiveDateTime,
    /// The weightings of the snapshot
    pub weighting: SnapshotWeighting,
}

/// The ordered set of snapshots of a network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshots(Vec<Snapshot>);

impl Snapshots {
    /// Create snapshots from a list, checking timestamps are strictly increasing
    pub fn new(snapshots: Vec<Snapshot>) -> Result<Self> {
        ensure!(
            snapshots
                .iter()
                .tuple_windows()
                .all(|(a, b)| a.snapshot < b.snapshot),
            "Snapshots must be unique and in chronological order"
        );
        for snapshot in &snapshots {
            let w = snapshot.weighting;
            ensure!(
                w.objective >= 0.0 && w.generators >= 0.0 && w.stores >= 0.0,
                "Snapshot weightings must be non-negative (snapshot {})",
                snapshot.snapshot
            );
        }

        Ok(Self(snapshots))
    }

    /// `n` hourly snapshots starting at `start`, each with weighting 1
    pub fn hourly(start: NaiveDateTime, n: usize) -> Self {
        let mut snapshots = Vec::with_capacity(n);
        let mut timestamp = start;
        for _ in 0..n {
            snapshots.push(Snapshot {
                snapshot: timestamp,
                weighting: SnapshotWeighting::default(),
            });
            timestamp += TimeDelta::hours(1);
        }

        Self(snapshots)
    }

    /// The number of snapshots
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no snapshots
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over snapshots
    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.0.iter()
    }

    /// Mutably iterate over snapshots
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Snapshot> {
        self.0.iter_mut()
    }

    /// The last snapshot index, if any
    pub fn last_index(&self) -> Option<usize> {
        self.0.len().checked_sub(1)
    }

    /// Objective weightings in snapshot order
    pub fn objective_weightings(&self) -> Vec<f64> {
        self.0.iter().map(|s| s.weighting.objective).collect()
    }

    /// Generator weightings in snapshot order
    pub fn generator_weightings(&self) -> Vec<f64> {
        self.0.iter().map(|s| s.weighting.generators).collect()
    }

    /// Store weightings in snapshot order
    pub fn store_weightings(&self) -> Vec<f64> {
        self.0.iter().map(|s| s.weighting.stores).collect()
    }

    /// The modelled fraction of a year
    pub fn years(&self) -> f64 {
        self.0.iter().map(|s| s.weighting.objective).sum::<f64>() / HOURS_PER_YEAR
    }

    /// Calendar month (1-12) of each snapshot
    pub fn months(&self) -> Vec<u32> {
        self.0.iter().map(|s| s.snapshot.month()).collect()
    }

    /// Keep only the first `n` snapshots
    pub fn truncate(&mut self, n: usize) {
        self.0.truncate(n);
    }

    /// Set every weighting of every snapshot to `value`
    pub fn set_all_weightings(&mut self, value: f64) {
        for snapshot in &mut self.0 {
            snapshot.weighting = SnapshotWeighting::uniform(value);
        }
    }

    /// Group snapshots into consecutive windows of `hours` hours, starting from the first one.
    ///
    /// Returns the new snapshots (labelled with the window start, weightings summed) and, for each
    /// window, the indices of the original snapshots it contains.
    pub fn resample(&self, hours: u32) -> (Snapshots, Vec<Vec<usize>>) {
        let Some(first) = self.0.first() else {
            return (Snapshots::default(), Vec::new());
        };
        let window = TimeDelta::hours(i64::from(hours));
        let mut snapshots: Vec<Snapshot> = Vec::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, snapshot) in self.0.iter().enumerate() {
            let offset = snapshot.snapshot - first.snapshot;
            let bin = offset.num_seconds() / window.num_seconds();
            let start = first.snapshot + TimeDelta::seconds(bin * window.num_seconds());
            match (snapshots.last_mut(), groups.last_mut()) {
                (Some(last), Some(group)) if last.snapshot == start => {
                    last.weighting.objective += snapshot.weighting.objective;
                    last.weighting.generators += snapshot.weighting.generators;
                    last.weighting.stores += snapshot.weighting.stores;
                    group.push(i);
                }
                _ => {
                    snapshots.push(Snapshot {
                        snapshot: start,
                        weighting: snapshot.weighting,
                    });
                    groups.push(vec![i]);
                }
            }
        }

        (Snapshots(snapshots), groups)
    }
}

impl<'a> IntoIterator for &'a Snapshots {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
