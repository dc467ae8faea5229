//! Code for reading per-country capacity limits.
use super::{input_err_msg, read_csv};
use crate::network::CarrierID;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CapacityLimitRow {
    country: String,
    carrier: CarrierID,
    min: Option<f64>,
    max: Option<f64>,
}

/// Bounds on the total capacity of one carrier in one country (MW).
///
/// A missing bound means that side is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CapacityBounds {
    /// Lower bound
    pub min: Option<f64>,
    /// Upper bound
    pub max: Option<f64>,
}

/// Capacity limits keyed by (country, carrier)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapacityLimits(IndexMap<(String, CarrierID), CapacityBounds>);

impl CapacityLimits {
    /// Read capacity limits from a CSV file with columns `country,carrier,min,max`
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let mut limits = IndexMap::new();
        for row in read_csv::<CapacityLimitRow>(file_path)? {
            if let (Some(min), Some(max)) = (row.min, row.max) {
                ensure!(
                    min <= max,
                    "Minimum capacity {min} exceeds maximum {max} for {} in {}",
                    row.carrier,
                    row.country
                );
            }
            let key = (row.country, row.carrier);
            let bounds = CapacityBounds {
                min: row.min,
                max: row.max,
            };
            ensure!(
                limits.insert(key.clone(), bounds).is_none(),
                "Duplicate capacity limit for {} in {}",
                key.1,
                key.0
            );
        }

        Ok(Self(limits))
    }

    /// Iterate over (country, carrier) and their bounds
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CarrierID, &CapacityBounds)> {
        self.0
            .iter()
            .map(|((country, carrier), bounds)| (country.as_str(), carrier, bounds))
    }

    /// Whether there are no limits
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read capacity limits, adding the file path to any error
pub fn read_capacity_limits(file_path: &Path) -> Result<CapacityLimits> {
    CapacityLimits::from_path(file_path).with_context(|| input_err_msg(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_capacity_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("limits.csv");
        fs::write(&path, "country,carrier,min,max\nDE,onwind,10,\nFR,solar,,50\n").unwrap();
        let limits = read_capacity_limits(&path).unwrap();
        let rows: Vec<_> = limits.iter().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "DE");
        assert_eq!(
            *rows[0].2,
            CapacityBounds {
                min: Some(10.0),
                max: None
            }
        );
        assert_eq!(rows[1].2.max, Some(50.0));
    }

    #[test]
    fn test_read_capacity_limits_inverted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("limits.csv");
        fs::write(&path, "country,carrier,min,max\nDE,onwind,10,5\n").unwrap();
        assert!(read_capacity_limits(&path).is_err());
    }
}
