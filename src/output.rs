//! The module responsible for writing output data to disk.
use crate::network::{IterationRecord, LineID};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;
pub use metadata::write_metadata;
pub mod network;
pub use network::write_network;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "gridplan_results";

/// The output file name for the records of the iterative solve
pub const ITERATIONS_FILE_NAME: &str = "iterations.csv";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let model_dir = model_dir
        .canonicalize()
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model specified at `model_dir`.
///
/// A non-empty existing folder is only reused if `allow_overwrite` is set, in which case its
/// contents are deleted.
///
/// # Returns
///
/// Whether an existing folder was overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut entries) = fs::read_dir(output_dir) {
        if entries.next().is_none() {
            // Folder exists but is empty
            return Ok(false);
        }

        if !allow_overwrite {
            bail!(
                "Output folder already exists and is not empty. \
                 Please delete the folder or pass the --overwrite command-line option."
            );
        }

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// A row of the iterations file: the capacity of one line after one iteration
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct IterationRow {
    iteration: u32,
    status: String,
    condition: String,
    objective: f64,
    line: Option<LineID>,
    s_nom_opt: Option<f64>,
}

/// Flatten iteration records into rows. Records without extendable lines still get one row.
fn iteration_rows(records: &[IterationRecord]) -> Vec<IterationRow> {
    let mut rows = Vec::new();
    for record in records {
        let row = |line, s_nom_opt| IterationRow {
            iteration: record.iteration,
            status: record.status.clone(),
            condition: record.condition.clone(),
            objective: record.objective,
            line,
            s_nom_opt,
        };
        if record.s_nom_opt.is_empty() {
            rows.push(row(None, None));
        }
        for (line, &s_nom_opt) in &record.s_nom_opt {
            rows.push(row(Some(line.clone()), Some(s_nom_opt)));
        }
    }

    rows
}

/// Write the records of an iterative solve to `iterations.csv` in `output_path`
pub fn write_iterations(output_path: &Path, records: &[IterationRecord]) -> Result<()> {
    let file_path = output_path.join(ITERATIONS_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for row in iteration_rows(records) {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
