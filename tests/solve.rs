//! Integration tests for the `solve` command.
use gridplan::cli::{SolveOpts, handle_solve_command};
use gridplan::input::read_network;
use gridplan::settings::Settings;
use std::path::PathBuf;
use tempfile::tempdir;

/// Get the path to the demo model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/two_bus")
}

/// An integration test for the `solve` command.
#[test]
fn test_handle_solve_command() {
    unsafe { std::env::set_var("GRIDPLAN_LOG_LEVEL", "off") };

    // Save results to non-existent directory to check that directory creation works
    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path().join("results");
    let opts = SolveOpts {
        output_dir: Some(output_dir.clone()),
        overwrite: false,
    };
    handle_solve_command(&get_model_dir(), &opts, Some(Settings::default())).unwrap();

    for file_name in [
        "buses.csv",
        "generators.csv",
        "generators-p.csv",
        "lines.csv",
        "lines-p0.csv",
        "network.toml",
        "meta.toml",
        "iterations.csv",
        "gridplan_info.log",
        "gridplan_error.log",
    ] {
        assert!(output_dir.join(file_name).is_file(), "{file_name} missing");
    }

    let solved = read_network(&output_dir).unwrap();
    assert!(solved.objective.is_some());
    // 2H resampling halves the number of snapshots
    assert_eq!(solved.snapshots.len(), 3);
    let line = &solved.lines["north-south"];
    assert!(line.s_nom_extendable);
    assert!(line.s_nom_opt.is_some());

    // Second time will fail because the output folder is not empty
    assert_eq!(
        handle_solve_command(&get_model_dir(), &opts, Some(Settings::default()))
            .unwrap_err()
            .chain()
            .next()
            .unwrap()
            .to_string(),
        format!("Failed to create output directory: {}", output_dir.display())
    );
}
