//! Scenario solves of the demo model with different side constraints switched on.
use gridplan::config::TemporalMatching;
use gridplan::input::read_network;
use gridplan::model::Model;
use gridplan::network::Network;
use gridplan::output::write_network;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

/// Get the path to the demo model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/two_bus")
}

/// Load the demo model with HiGHS output switched off
fn demo_model() -> Model {
    unsafe { std::env::set_var("GRIDPLAN_LOG_LEVEL", "off") };
    Model::from_path(&get_model_dir()).unwrap()
}

/// Solve a model, returning the solved network as written to disk
fn solve(model: Model) -> Network {
    let output_dir = tempdir().unwrap();
    let result = model.run(output_dir.path()).unwrap();
    assert!(result.is_ok());
    read_network(output_dir.path()).unwrap()
}

#[test]
fn test_bau_minimum_capacity() {
    let mut model = demo_model();
    model.opts.bau = true;
    model
        .config
        .electricity
        .bau_mincapacities
        .insert("solar".into(), 300_000.0);

    let solved = solve(model);
    let solar = solved.generators["north solar"].p_nom_opt.unwrap();
    assert!(solar >= 300.0 - 1e-6, "solar capacity {solar}");
}

#[test]
fn test_safe_reserve_margin() {
    let mut model = demo_model();
    model.opts.safe = true;
    model.config.electricity.conventional_carriers = vec!["gas".into()];
    model.config.electricity.safe_reservemargin = 0.1;

    let solved = solve(model);

    // Peak of the 2-hourly averaged demand
    let peak = solved
        .total_demand()
        .into_iter()
        .fold(0.0, f64::max);
    let gas = solved.generators["south gas"].p_nom_opt.unwrap();
    assert!(gas >= peak * 1.1 - 1e-6, "gas capacity {gas}, peak {peak}");
}

#[test]
fn test_infeasible_scenario() {
    let mut model = demo_model();
    // No emissions allowed and no new renewables, so dark hours cannot be covered
    model.opts.co2_limit = Some(Some(0.0));
    model.network.generators["north solar"].p_nom_max = 0.0;

    let output_dir = tempdir().unwrap();
    let err = model.run(output_dir.path()).unwrap_err();
    assert_eq!(err.to_string(), "Solving status 'infeasible'");
}

#[test]
fn test_hydrogen_constraints_without_hydrogen() {
    let mut model = demo_model();
    model.config.policy_config.hydrogen.temporal_matching = TemporalMatching::Yearly;
    let hydrogen = &mut model.config.sector.hydrogen;
    hydrogen.set_color_shares = true;
    hydrogen.blue_share = 0.2;
    hydrogen.pink_share = 0.1;

    let names = model.constraint_assembler().unwrap().names();
    assert!(names.contains(&"H2 yearly matching"));
    assert!(names.contains(&"H2 colour shares"));

    // Nothing to constrain, so the solve is unaffected
    let solved = solve(model);
    assert!(solved.objective.is_some());
}

#[test]
fn test_unknown_temporal_matching() {
    let dir = tempdir().unwrap();
    let model_dir = dir.path().join("model");
    fs::create_dir(&model_dir).unwrap();
    for entry in fs::read_dir(get_model_dir()).unwrap() {
        let path = entry.unwrap().path();
        fs::copy(&path, model_dir.join(path.file_name().unwrap())).unwrap();
    }
    fs::write(
        model_dir.join("config.toml"),
        "[policy_config.hydrogen]\ntemporal_matching = \"weekly\"\n",
    )
    .unwrap();

    assert!(Model::from_path(&model_dir).is_err());
}

#[test]
fn test_solved_network_round_trip() {
    let solved = solve(demo_model());
    let dir = tempdir().unwrap();
    write_network(&solved, dir.path()).unwrap();
    assert_eq!(read_network(dir.path()).unwrap(), solved);
}
