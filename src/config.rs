//! Code for reading the run configuration (`config.toml`) of a model.
//!
//! Every section and option has a default, so an empty file is a valid configuration. Options
//! which only matter when a feature is enabled (e.g. `co2limit` for a bare `Co2L` token) are
//! checked when the feature is applied.
use crate::input::{input_err_msg, read_toml};
use crate::network::CarrierID;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::{Path, PathBuf};

/// The name of the run configuration file in a model directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The only solver currently supported
pub const SUPPORTED_SOLVER: &str = "highs";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_solver_name, String, SUPPORTED_SOLVER.to_string());
define_param_default!(default_min_iterations, u32, 4);
define_param_default!(default_max_iterations, u32, 6);
define_param_default!(default_msq_threshold, f64, 0.05);
define_param_default!(default_safe_reservemargin, f64, 0.1);
define_param_default!(default_epsilon, f64, 0.02);
define_param_default!(default_contingency, f64, 4000.0);
define_param_default!(default_co2_sequestration_potential, f64, 5.0);
define_param_default!(default_allowed_excess, f64, 1.0);
define_param_default!(default_discount_rate, f64, 0.07);
define_param_default!(default_infinity, f64, f64::INFINITY);

fn carriers(names: &[&str]) -> Vec<CarrierID> {
    names.iter().map(|&name| name.into()).collect()
}

fn default_conventional_carriers() -> Vec<CarrierID> {
    carriers(&[
        "nuclear",
        "oil",
        "OCGT",
        "CCGT",
        "coal",
        "lignite",
        "geothermal",
        "biomass",
    ])
}

fn default_renewable_carriers() -> Vec<CarrierID> {
    carriers(&[
        "csp",
        "rooftop-solar",
        "solar",
        "onwind",
        "onwind2",
        "offwind",
        "offwind2",
        "ror",
    ])
}

fn default_charger_carriers() -> Vec<CarrierID> {
    carriers(&["H2 electrolysis", "battery charger"])
}

fn default_discharger_carriers() -> Vec<CarrierID> {
    carriers(&["H2 fuel cell", "battery discharger"])
}

/// The full run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Solver settings
    pub solving: SolvingConfig,
    /// Electricity sector settings
    pub electricity: ElectricityConfig,
    /// Sector-coupling settings
    pub sector: SectorConfig,
    /// Hydrogen policy settings
    pub policy_config: PolicyConfig,
    /// How planning horizons are linked
    pub foresight: Foresight,
    /// Scenario wildcards
    pub scenario: ScenarioConfig,
    /// Technology cost settings
    pub costs: CostsConfig,
    /// Line settings
    pub lines: LinesConfig,
    /// Link settings
    pub links: LinksConfig,
    /// Minimum expansion of newly added lines
    pub augmented_line_connection: AugmentedLineConfig,
}

/// Solver settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolvingConfig {
    /// Which solver to use and which option bundle to pass it
    pub solver: SolverConfig,
    /// Named bundles of solver options
    pub solver_options: IndexMap<String, toml::Table>,
    /// Options controlling preparation and iteration
    pub options: SolvingOptions,
}

/// Which solver to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// The solver name
    pub name: String,
    /// The name of a bundle in `solver_options`
    pub options: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            name: default_solver_name(),
            options: None,
        }
    }
}

/// Options controlling preparation and the iterative solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolvingOptions {
    /// Solve once, even if lines are extendable
    pub skip_iterations: bool,
    /// Record capacities and objective of every iteration
    pub track_iterations: bool,
    /// Minimum number of iterations
    pub min_iterations: u32,
    /// Maximum number of iterations
    pub max_iterations: u32,
    /// Convergence threshold on the relative change in line capacities
    pub msq_threshold: f64,
    /// Availability values at or below this threshold are set to zero
    pub clip_p_max_pu: Option<f64>,
    /// Add a load-shedding generator at every bus
    pub load_shedding: bool,
    /// Add small random perturbations to costs
    pub noisy_costs: bool,
    /// Only keep the first `nhours` snapshots
    pub nhours: Option<usize>,
}

impl Default for SolvingOptions {
    fn default() -> Self {
        Self {
            skip_iterations: false,
            track_iterations: false,
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            msq_threshold: default_msq_threshold(),
            clip_p_max_pu: None,
            load_shedding: false,
            noisy_costs: false,
            nhours: None,
        }
    }
}

/// Electricity sector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectricityConfig {
    /// Minimum total capacity per carrier in kW (`BAU` token)
    #[serde(rename = "BAU_mincapacities")]
    pub bau_mincapacities: IndexMap<CarrierID, f64>,
    /// Reserve margin above peak demand (`SAFE` token)
    #[serde(rename = "SAFE_reservemargin")]
    pub safe_reservemargin: f64,
    /// Carriers which count as conventional generation
    pub conventional_carriers: Vec<CarrierID>,
    /// Carriers which count as renewable generation
    pub renewable_carriers: Vec<CarrierID>,
    /// Link carriers which charge storage
    pub storage_charger_carriers: Vec<CarrierID>,
    /// Link carriers which discharge storage
    pub storage_discharger_carriers: Vec<CarrierID>,
    /// Path to the per-country capacity limits (`CCL` token)
    pub agg_p_nom_limits: Option<PathBuf>,
    /// Annual CO2 limit in tCO2 (bare `Co2L` token)
    pub co2limit: Option<f64>,
    /// Reference emissions in tCO2 (`Co2L<factor>`)
    pub co2base: Option<f64>,
    /// Annual gas usage limit in MWh (bare `CH4L` token)
    pub gaslimit: Option<f64>,
    /// Operational reserve margin
    pub operational_reserve: OperationalReserveConfig,
}

impl Default for ElectricityConfig {
    fn default() -> Self {
        Self {
            bau_mincapacities: IndexMap::new(),
            safe_reservemargin: default_safe_reservemargin(),
            conventional_carriers: default_conventional_carriers(),
            renewable_carriers: default_renewable_carriers(),
            storage_charger_carriers: default_charger_carriers(),
            storage_discharger_carriers: default_discharger_carriers(),
            agg_p_nom_limits: None,
            co2limit: None,
            co2base: None,
            gaslimit: None,
            operational_reserve: OperationalReserveConfig::default(),
        }
    }
}

/// Operational reserve margin settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationalReserveConfig {
    /// Whether to add the reserve margin
    pub activate: bool,
    /// Share of demand to hold in reserve
    pub epsilon_load: f64,
    /// Share of variable renewable output to hold in reserve
    pub epsilon_vres: f64,
    /// Fixed reserve requirement in MW
    pub contingency: f64,
}

impl Default for OperationalReserveConfig {
    fn default() -> Self {
        Self {
            activate: false,
            epsilon_load: default_epsilon(),
            epsilon_vres: default_epsilon(),
            contingency: default_contingency(),
        }
    }
}

/// Sector-coupling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    /// Maximum stored CO2 in MtCO2
    pub co2_sequestration_potential: f64,
    /// Hydrogen settings
    pub hydrogen: HydrogenSectorConfig,
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self {
            co2_sequestration_potential: default_co2_sequestration_potential(),
            hydrogen: HydrogenSectorConfig::default(),
        }
    }
}

/// Hydrogen sector settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrogenSectorConfig {
    /// Whether there is a hydrogen pipeline network
    pub network: bool,
    /// Maximum total pipeline capacity times length, in GW·km
    pub network_limit: Option<f64>,
    /// Whether to fix the shares of blue and pink hydrogen
    pub set_color_shares: bool,
    /// Share of hydrogen demand met by blue hydrogen
    pub blue_share: f64,
    /// Share of hydrogen demand met by pink hydrogen
    pub pink_share: f64,
}

/// How renewable generation is matched to hydrogen production
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum TemporalMatching {
    /// Annual renewable generation covers hydrogen exports
    #[string = "h2_yearly_matching"]
    Yearly,
    /// Monthly renewable generation covers electrolysis
    #[string = "h2_monthly_matching"]
    Monthly,
    /// No matching
    #[default]
    #[string = "no_res_matching"]
    NoResMatching,
}

/// Policy settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Hydrogen policy
    pub hydrogen: HydrogenPolicyConfig,
    /// Yearly matching settings
    pub yearly: YearlyPolicyConfig,
}

/// Hydrogen policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrogenPolicyConfig {
    /// How renewable generation is matched to hydrogen production
    pub temporal_matching: TemporalMatching,
    /// Whether renewable generation must be additional to a reference case
    pub additionality: bool,
    /// Whether this run is the reference case
    pub is_reference: bool,
    /// Path to the solved reference network
    pub path_to_ref: Option<PathBuf>,
    /// Allowed ratio of electrolysis input to renewable generation
    pub allowed_excess: f64,
}

impl Default for HydrogenPolicyConfig {
    fn default() -> Self {
        Self {
            temporal_matching: TemporalMatching::default(),
            additionality: false,
            is_reference: false,
            path_to_ref: None,
            allowed_excess: default_allowed_excess(),
        }
    }
}

/// Yearly matching settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearlyPolicyConfig {
    /// Whether renewables must also cover the AC load
    pub re_country_load: bool,
}

/// How planning horizons are linked
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum Foresight {
    /// A single horizon
    #[default]
    #[string = "overnight"]
    Overnight,
    /// Horizons solved in sequence, each building on the last
    #[string = "myopic"]
    Myopic,
    /// All horizons at once
    #[string = "perfect"]
    Perfect,
}

/// Scenario wildcards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Hyphen-separated scenario options (e.g. "Co2L-24H")
    pub opts: String,
    /// Transmission limit (e.g. "v1.25", "copt")
    pub ll: Option<String>,
    /// The planning horizon being solved
    pub planning_horizon: Option<u32>,
    /// All planning horizons
    pub planning_horizons: Vec<u32>,
    /// Years into which existing capacities are grouped
    pub grouping_years: Vec<u32>,
}

/// Technology cost settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostsConfig {
    /// Path to the cost table
    pub path: Option<PathBuf>,
    /// Discount rate used to annualise investments
    pub discountrate: f64,
    /// Emission prices per tonne (`Ep` token)
    pub emission_prices: EmissionPrices,
}

impl Default for CostsConfig {
    fn default() -> Self {
        Self {
            path: None,
            discountrate: default_discount_rate(),
            emission_prices: EmissionPrices::default(),
        }
    }
}

/// Emission prices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionPrices {
    /// Price per tCO2
    pub co2: f64,
}

/// Line settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinesConfig {
    /// Usable share of line capacity, applied to every line
    pub s_max_pu: Option<f64>,
    /// Upper limit on line capacity
    pub s_nom_max: f64,
}

impl Default for LinesConfig {
    fn default() -> Self {
        Self {
            s_max_pu: None,
            s_nom_max: default_infinity(),
        }
    }
}

/// Link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Upper limit on link capacity
    pub p_nom_max: f64,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            p_nom_max: default_infinity(),
        }
    }
}

/// Minimum expansion of lines whose name contains "new"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentedLineConfig {
    /// Whether to apply the minimum expansion
    pub add_to_snakefile: bool,
    /// Minimum capacity of new lines in MW
    pub min_expansion: f64,
}

impl Config {
    /// Read the configuration from a model directory.
    ///
    /// A missing `config.toml` means every option takes its default. Relative paths in the file
    /// are resolved against the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let file_path = model_dir.join(CONFIG_FILE_NAME);
        if !file_path.is_file() {
            return Ok(Self::default());
        }

        let raw: toml::Table = read_toml(&file_path)?;
        let mut config: Config = toml::Value::Table(raw)
            .try_into()
            .with_context(|| input_err_msg(&file_path))?;
        config.resolve_paths(model_dir);
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", file_path.display()))?;

        Ok(config)
    }

    /// Make relative paths relative to `base`
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut Option<PathBuf>| {
            if let Some(p) = path.as_mut()
                && p.is_relative()
            {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.electricity.agg_p_nom_limits);
        resolve(&mut self.policy_config.hydrogen.path_to_ref);
        resolve(&mut self.costs.path);
    }

    /// Check the configuration for invalid combinations of options
    pub fn validate(&self) -> Result<()> {
        let solving = &self.solving;
        ensure!(
            solving.solver.name == SUPPORTED_SOLVER,
            "Unsupported solver {}; only {SUPPORTED_SOLVER} is available",
            solving.solver.name
        );
        if let Some(bundle) = &solving.solver.options {
            ensure!(
                solving.solver_options.contains_key(bundle),
                "Solver option bundle {bundle} not found in solving.solver_options"
            );
        }

        let options = &solving.options;
        ensure!(
            options.min_iterations <= options.max_iterations,
            "min_iterations ({}) cannot exceed max_iterations ({})",
            options.min_iterations,
            options.max_iterations
        );
        ensure!(
            options.msq_threshold > 0.0,
            "msq_threshold must be positive"
        );
        if let Some(nhours) = options.nhours {
            ensure!(nhours > 0, "nhours must be positive");
        }

        let hydrogen = &self.sector.hydrogen;
        for (name, share) in [
            ("blue_share", hydrogen.blue_share),
            ("pink_share", hydrogen.pink_share),
        ] {
            ensure!(
                (0.0..=1.0).contains(&share),
                "sector.hydrogen.{name} must be between 0 and 1"
            );
        }

        let policy = &self.policy_config.hydrogen;
        ensure!(
            policy.allowed_excess > 0.0,
            "policy_config.hydrogen.allowed_excess must be positive"
        );
        if self.needs_reference_network() {
            ensure!(
                policy.path_to_ref.is_some(),
                "policy_config.hydrogen.path_to_ref is required for additionality"
            );
        }

        Ok(())
    }

    /// Whether a solved reference network is needed for the additionality constraint
    pub fn needs_reference_network(&self) -> bool {
        let policy = &self.policy_config.hydrogen;
        policy.additionality
            && !policy.is_reference
            && policy.temporal_matching == TemporalMatching::Monthly
    }

    /// The solver option bundle selected by `solving.solver.options`, if any
    pub fn solver_options(&self) -> Option<&toml::Table> {
        self.solving
            .solver
            .options
            .as_ref()
            .and_then(|bundle| self.solving.solver_options.get(bundle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use float_cmp::assert_approx_eq;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, contents: &str) {
        fs::write(dir.join(CONFIG_FILE_NAME), contents).unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::from_model_dir(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.solving.options.min_iterations, 4);
        assert_eq!(config.solving.options.max_iterations, 6);
        assert_approx_eq!(f64, config.solving.options.msq_threshold, 0.05);
        assert_eq!(
            config.policy_config.hydrogen.temporal_matching,
            TemporalMatching::NoResMatching
        );
        assert!(
            config
                .electricity
                .renewable_carriers
                .contains(&CarrierID::new("onwind"))
        );
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
foresight = "myopic"

[solving.solver]
name = "highs"
options = "fast"

[solving.solver_options.fast]
threads = 4
presolve = "on"

[electricity]
BAU_mincapacities = { gas = 150000.0 }
SAFE_reservemargin = 0.2
agg_p_nom_limits = "limits.csv"

[policy_config.hydrogen]
temporal_matching = "h2_monthly_matching"
"#,
        );
        let config = Config::from_model_dir(dir.path()).unwrap();
        assert_eq!(config.foresight, Foresight::Myopic);
        assert_approx_eq!(f64, config.electricity.bau_mincapacities["gas"], 150_000.0);
        assert_approx_eq!(f64, config.electricity.safe_reservemargin, 0.2);
        assert_eq!(
            config.electricity.agg_p_nom_limits,
            Some(dir.path().join("limits.csv"))
        );
        assert_eq!(config.solver_options().unwrap()["threads"].as_integer(), Some(4));
        assert_eq!(
            config.policy_config.hydrogen.temporal_matching,
            TemporalMatching::Monthly
        );
    }

    #[test]
    fn test_config_unknown_temporal_matching() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            "[policy_config.hydrogen]\ntemporal_matching = \"h2_weekly_matching\"\n",
        );
        assert!(Config::from_model_dir(dir.path()).is_err());
    }

    #[test]
    fn test_config_missing_bundle() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "[solving.solver]\noptions = \"nonexistent\"\n");
        assert_error!(
            Config::from_model_dir(dir.path()),
            format!(
                "Invalid configuration in {}",
                dir.path().join(CONFIG_FILE_NAME).display()
            )
        );
    }

    #[test]
    fn test_config_additionality_needs_reference() {
        let mut config = Config::default();
        config.policy_config.hydrogen.temporal_matching = TemporalMatching::Monthly;
        config.policy_config.hydrogen.additionality = true;
        assert!(config.needs_reference_network());
        assert!(config.validate().is_err());

        config.policy_config.hydrogen.path_to_ref = Some("ref".into());
        config.validate().unwrap();

        config.policy_config.hydrogen.is_reference = true;
        assert!(!config.needs_reference_network());
    }
}
