//! A model: a base network together with everything needed to solve it.
use crate::config::Config;
use crate::constraints::ConstraintAssembler;
use crate::input::costs::read_costs;
use crate::input::{CostTable, read_network};
use crate::network::Network;
use crate::optimisation::{HighsSolver, SolveResult};
use crate::opts::ScenarioOptions;
use crate::output::{write_metadata, write_network};
use crate::prepare::{prepare_for_solve, prepare_scenario};
use crate::solve::{SolveContext, solve_network};
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

/// Model definition
#[derive(Debug)]
pub struct Model {
    /// The folder the model was loaded from
    pub model_dir: PathBuf,
    /// The run configuration
    pub config: Config,
    /// The parsed `scenario.opts` wildcard
    pub opts: ScenarioOptions,
    /// The base network
    pub network: Network,
    /// Technology costs, if `costs.path` is set
    pub costs: Option<CostTable>,
    /// A solved reference network, if additionality requires one
    pub reference: Option<Network>,
}

impl Model {
    /// Load a model from a folder containing `config.toml` and the network's CSV files
    pub fn from_path(model_dir: &Path) -> Result<Self> {
        let config = Config::from_model_dir(model_dir)?;
        let opts: ScenarioOptions = config
            .scenario
            .opts
            .parse()
            .with_context(|| format!("Invalid scenario options '{}'", config.scenario.opts))?;
        let network = read_network(model_dir)?;

        let costs = config.costs.path.as_deref().map(read_costs).transpose()?;

        let reference = if config.needs_reference_network() {
            let path = config
                .policy_config
                .hydrogen
                .path_to_ref
                .as_deref()
                .context("policy_config.hydrogen.path_to_ref is required for additionality")?;
            info!("Loading reference network from {}", path.display());
            Some(read_network(path).context("Failed to load reference network")?)
        } else {
            None
        };

        Ok(Self {
            model_dir: model_dir.to_path_buf(),
            config,
            opts,
            network,
            costs,
            reference,
        })
    }

    /// The side constraints which will be added to every solve
    pub fn constraint_assembler(&self) -> Result<ConstraintAssembler> {
        ConstraintAssembler::from_config(&self.config, &self.opts)
    }

    /// Metadata stored with the solved network: the full configuration and the wildcards
    pub fn metadata(&self) -> Result<toml::Table> {
        let mut meta =
            toml::Table::try_from(&self.config).context("Could not convert configuration")?;
        let scenario = &self.config.scenario;
        meta.insert("opts".into(), scenario.opts.clone().into());
        if let Some(ll) = &scenario.ll {
            meta.insert("ll".into(), ll.clone().into());
        }
        if let Some(horizon) = scenario.planning_horizon {
            meta.insert("planning_horizon".into(), i64::from(horizon).into());
        }

        Ok(meta)
    }

    /// Prepare and solve the model, writing the solved network to `output_path`
    pub fn run(mut self, output_path: &Path) -> Result<SolveResult> {
        prepare_scenario(
            &mut self.network,
            &self.config,
            &self.opts,
            self.costs.as_ref(),
        )
        .context("Failed to prepare scenario")?;
        prepare_for_solve(&mut self.network, &self.config)?;

        let assembler = self.constraint_assembler()?;
        let solver = HighsSolver::new(self.config.solver_options().cloned().unwrap_or_default());
        let ctx = SolveContext {
            config: &self.config,
            assembler: &assembler,
            solver: &solver,
            reference: self.reference.as_ref(),
        };
        let result = solve_network(&mut self.network, &ctx)?;

        self.network.meta = self.metadata()?;
        write_network(&self.network, output_path).context("Failed to write solved network")?;
        write_metadata(output_path, &self.model_dir, &self.network.meta)?;
        info!("Solved network written to {}", output_path.display());

        Ok(result)
    }
}
