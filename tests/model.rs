use gridplan::model::Model;
use std::path::{Path, PathBuf};

/// Get the path to the demo model.
fn get_model_dir() -> PathBuf {
    Path::new(file!())
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("demos")
        .join("two_bus")
}

/// An integration test which attempts to load the demo model
#[test]
fn test_model_from_path() {
    let model = Model::from_path(&get_model_dir()).unwrap();
    assert_eq!(model.network.buses.len(), 2);
    assert_eq!(model.network.snapshots.len(), 6);
    assert_eq!(model.opts.resample_hours, Some(2));
    assert_eq!(model.opts.co2_limit, Some(Some(0.5)));
    assert!(model.network.has_extendable_lines());
}
