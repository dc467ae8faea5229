//! Common functionality for gridplan.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod constraints;
pub mod finance;
pub mod formulation;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod network;
pub mod optimisation;
pub mod opts;
pub mod output;
pub mod prepare;
pub mod settings;
pub mod solve;

#[cfg(test)]
mod fixture;

/// Get the path to the folder in which gridplan's own configuration files live.
///
/// Falls back to the current directory on platforms without a user configuration folder.
pub fn get_gridplan_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        return PathBuf::default();
    };
    config_dir.push("gridplan");

    config_dir
}
