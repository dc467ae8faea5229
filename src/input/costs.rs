//! Code for reading the technology cost table.
use super::{input_err_msg, read_csv};
use crate::finance::annualised_capital_cost;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// A row of the cost table
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct CostRow {
    technology: String,
    parameter: String,
    value: f64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    source: String,
}

/// A single entry of the cost table
#[derive(Debug, Clone, PartialEq)]
pub struct CostEntry {
    /// The value of the parameter
    pub value: f64,
    /// The unit of the value
    pub unit: String,
    /// Where the value comes from
    pub source: String,
}

/// Technology costs keyed by (technology, parameter)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostTable(IndexMap<(String, String), CostEntry>);

impl CostTable {
    /// Read the cost table from a CSV file with columns `technology,parameter,value,unit,source`.
    ///
    /// Further columns are ignored. Each (technology, parameter) pair may only appear once.
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let mut table = IndexMap::new();
        for row in read_csv::<CostRow>(file_path)? {
            let key = (row.technology, row.parameter);
            let entry = CostEntry {
                value: row.value,
                unit: row.unit,
                source: row.source,
            };
            ensure!(
                table.insert(key.clone(), entry).is_none(),
                "Duplicate cost entry for technology {} and parameter {} in {}",
                key.0,
                key.1,
                file_path.display()
            );
        }

        Ok(Self(table))
    }

    /// Add or replace an entry
    pub fn insert(&mut self, technology: &str, parameter: &str, value: f64) {
        self.0.insert(
            (technology.to_string(), parameter.to_string()),
            CostEntry {
                value,
                unit: String::new(),
                source: String::new(),
            },
        );
    }

    /// The value of a parameter for a technology, if present
    pub fn get(&self, technology: &str, parameter: &str) -> Option<f64> {
        self.0
            .get(&(technology.to_string(), parameter.to_string()))
            .map(|entry| entry.value)
    }

    /// The value of a parameter for a technology, which must be present
    pub fn require(&self, technology: &str, parameter: &str) -> Result<f64> {
        self.get(technology, parameter).with_context(|| {
            format!("Cost table has no parameter {parameter} for technology {technology}")
        })
    }

    /// The annualised capital cost of a technology per unit of capacity.
    ///
    /// Requires `investment` and `lifetime`; fixed O&M (`FOM`, % of investment per year)
    /// defaults to zero.
    pub fn capital_cost(&self, technology: &str, discount_rate: f64, nyears: f64) -> Result<f64> {
        let investment = self.require(technology, "investment")?;
        let lifetime = self.require(technology, "lifetime")?;
        let fom = self.get(technology, "FOM").unwrap_or(0.0);

        Ok(annualised_capital_cost(
            investment,
            lifetime,
            discount_rate,
            fom,
            nyears,
        ))
    }
}

/// Read the cost table, adding the file path to any error
pub fn read_costs(file_path: &Path) -> Result<CostTable> {
    CostTable::from_path(file_path).with_context(|| input_err_msg(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use float_cmp::assert_approx_eq;
    use std::fs;
    use tempfile::tempdir;

    const COSTS: &str = "technology,parameter,value,unit,source,further description
HVAC overhead,investment,400,EUR/MW/km,DEA,
HVAC overhead,lifetime,40,years,DEA,
HVAC overhead,FOM,2,%/year,DEA,
onwind,investment,1000000,EUR/MW,DEA,note
";

    #[test]
    fn test_cost_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("costs.csv");
        fs::write(&path, COSTS).unwrap();
        let costs = read_costs(&path).unwrap();

        assert_eq!(costs.get("onwind", "investment"), Some(1_000_000.0));
        assert_eq!(costs.get("onwind", "lifetime"), None);
        let factor = 1.07f64.powf(40.0);
        let expected = (0.07 * factor / (factor - 1.0) + 0.02) * 400.0;
        assert_approx_eq!(
            f64,
            costs.capital_cost("HVAC overhead", 0.07, 1.0).unwrap(),
            expected,
            epsilon = 1e-9
        );
        assert_error!(
            costs.capital_cost("onwind", 0.07, 1.0),
            "Cost table has no parameter lifetime for technology onwind"
        );
    }

    #[test]
    fn test_cost_table_duplicate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("costs.csv");
        fs::write(
            &path,
            "technology,parameter,value\nsolar,lifetime,25\nsolar,lifetime,30\n",
        )
        .unwrap();
        assert!(read_costs(&path).is_err());
    }
}
