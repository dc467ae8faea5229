//! The in-memory network model: component tables, snapshots and time series.
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

pub mod components;
pub use components::*;
pub mod series;
pub use series::*;
pub mod snapshot;
pub use snapshot::*;

/// A map of buses, keyed by bus ID
pub type BusMap = IndexMap<BusID, Bus>;
/// A map of carriers, keyed by carrier ID
pub type CarrierMap = IndexMap<CarrierID, Carrier>;
/// A map of generators, keyed by generator ID
pub type GeneratorMap = IndexMap<GeneratorID, Generator>;
/// A map of lines, keyed by line ID
pub type LineMap = IndexMap<LineID, Line>;
/// A map of links, keyed by link ID
pub type LinkMap = IndexMap<LinkID, Link>;
/// A map of storage units, keyed by storage unit ID
pub type StorageUnitMap = IndexMap<StorageUnitID, StorageUnit>;
/// A map of stores, keyed by store ID
pub type StoreMap = IndexMap<StoreID, Store>;
/// A map of loads, keyed by load ID
pub type LoadMap = IndexMap<LoadID, Load>;
/// A map of global constraints, keyed by constraint ID
pub type GlobalConstraintMap = IndexMap<GlobalConstraintID, GlobalConstraint>;

/// The outcome of one pass of the iterative transmission expansion loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number (starting at 1)
    pub iteration: u32,
    /// Solver status of the pass
    pub status: String,
    /// Termination condition of the pass
    pub condition: String,
    /// Objective value of the pass
    pub objective: f64,
    /// Optimised capacity of every extendable line
    pub s_nom_opt: IndexMap<LineID, f64>,
}

/// An energy network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    /// The snapshots at which the network is optimised
    pub snapshots: Snapshots,
    /// Buses
    pub buses: BusMap,
    /// Carriers
    pub carriers: CarrierMap,
    /// Generators
    pub generators: GeneratorMap,
    /// Lines
    pub lines: LineMap,
    /// Links
    pub links: LinkMap,
    /// Storage units
    pub storage_units: StorageUnitMap,
    /// Stores
    pub stores: StoreMap,
    /// Loads
    pub loads: LoadMap,
    /// Global constraints
    pub global_constraints: GlobalConstraintMap,
    /// Time series for buses
    pub buses_t: BusSeries,
    /// Time series for generators
    pub generators_t: GeneratorSeries,
    /// Time series for lines
    pub lines_t: LineSeries,
    /// Time series for links
    pub links_t: LinkSeries,
    /// Time series for storage units
    pub storage_units_t: StorageUnitSeries,
    /// Time series for stores
    pub stores_t: StoreSeries,
    /// Time series for loads
    pub loads_t: LoadSeries,
    /// Objective value of the last solve
    pub objective: Option<f64>,
    /// Free-form metadata (run configuration and wildcards)
    pub meta: toml::Table,
    /// Records of iterative solves, if tracked
    pub iterations: Vec<IterationRecord>,
}

/// Check that `bus` exists, naming the offending component otherwise
fn check_bus(buses: &BusMap, bus: &BusID, kind: &str, id: &str) -> Result<()> {
    ensure!(
        buses.contains_key(bus),
        "{kind} {id} refers to unknown bus {bus}"
    );
    Ok(())
}

/// Check that every series of an attribute has one value per snapshot and belongs to a component
fn check_series<ID: crate::id::IDLike, T>(
    series: &TimeSeries<ID>,
    components: &IndexMap<ID, T>,
    n_snapshots: usize,
    name: &str,
) -> Result<()> {
    for (id, values) in series.iter() {
        ensure!(
            components.contains_key(id),
            "Time series {name} refers to unknown component {id}"
        );
        ensure!(
            values.len() == n_snapshots,
            "Time series {name} for {id} has {} values but there are {n_snapshots} snapshots",
            values.len()
        );
    }
    Ok(())
}

impl Network {
    /// Check the network's invariants.
    ///
    /// Every bus reference must exist and every time series must cover all snapshots.
    pub fn validate(&self) -> Result<()> {
        for generator in self.generators.values() {
            check_bus(&self.buses, &generator.bus, "Generator", generator.id.as_str())?;
        }
        for line in self.lines.values() {
            check_bus(&self.buses, &line.bus0, "Line", line.id.as_str())?;
            check_bus(&self.buses, &line.bus1, "Line", line.id.as_str())?;
        }
        for link in self.links.values() {
            check_bus(&self.buses, &link.bus0, "Link", link.id.as_str())?;
            check_bus(&self.buses, &link.bus1, "Link", link.id.as_str())?;
        }
        for unit in self.storage_units.values() {
            check_bus(&self.buses, &unit.bus, "StorageUnit", unit.id.as_str())?;
        }
        for store in self.stores.values() {
            check_bus(&self.buses, &store.bus, "Store", store.id.as_str())?;
        }
        for load in self.loads.values() {
            check_bus(&self.buses, &load.bus, "Load", load.id.as_str())?;
        }

        for gc in self.global_constraints.values() {
            if gc.kind == GlobalConstraintType::PrimaryEnergy {
                ensure!(
                    CARRIER_ATTRIBUTES.contains(&gc.carrier_attribute.as_str()),
                    "Global constraint {} uses unknown carrier attribute {}",
                    gc.id,
                    gc.carrier_attribute
                );
            }
        }

        let n = self.snapshots.len();
        let gens = &self.generators;
        check_series(&self.generators_t.p_max_pu, gens, n, "generators-p_max_pu")?;
        check_series(&self.generators_t.p_min_pu, gens, n, "generators-p_min_pu")?;
        check_series(&self.generators_t.p, gens, n, "generators-p")?;
        check_series(&self.lines_t.p0, &self.lines, n, "lines-p0")?;
        check_series(&self.links_t.p0, &self.links, n, "links-p0")?;
        check_series(&self.links_t.p1, &self.links, n, "links-p1")?;
        let units = &self.storage_units;
        check_series(&self.storage_units_t.inflow, units, n, "storage_units-inflow")?;
        check_series(&self.storage_units_t.p_dispatch, units, n, "storage_units-p_dispatch")?;
        check_series(&self.storage_units_t.p_store, units, n, "storage_units-p_store")?;
        check_series(
            &self.storage_units_t.state_of_charge,
            units,
            n,
            "storage_units-state_of_charge",
        )?;
        check_series(&self.storage_units_t.spill, units, n, "storage_units-spill")?;
        check_series(&self.stores_t.e, &self.stores, n, "stores-e")?;
        check_series(&self.stores_t.p, &self.stores, n, "stores-p")?;
        check_series(&self.loads_t.p_set, &self.loads, n, "loads-p_set")?;
        check_series(&self.buses_t.marginal_price, &self.buses, n, "buses-marginal_price")?;

        Ok(())
    }

    /// The modelled fraction of a year (`Nyears`)
    pub fn years(&self) -> f64 {
        self.snapshots.years()
    }

    /// Keep only the first `n` snapshots, truncating every time series to match
    pub fn set_snapshots(&mut self, n: usize) {
        self.snapshots.truncate(n);
        self.for_each_series(|series| series.truncate(n));
    }

    /// Replace the snapshots, averaging every time series over the given snapshot groups
    pub fn resample_snapshots(&mut self, snapshots: Snapshots, groups: &[Vec<usize>]) {
        self.snapshots = snapshots;
        self.for_each_series(|series| series.average_groups(groups));
    }

    /// Apply an operation to every time series of every component kind
    fn for_each_series(&mut self, mut f: impl FnMut(&mut dyn SeriesOps)) {
        self.buses_t.for_each_mut(|s| f(s));
        self.generators_t.for_each_mut(|s| f(s));
        self.lines_t.for_each_mut(|s| f(s));
        self.links_t.for_each_mut(|s| f(s));
        self.storage_units_t.for_each_mut(|s| f(s));
        self.stores_t.for_each_mut(|s| f(s));
        self.loads_t.for_each_mut(|s| f(s));
    }

    /// Generator availability per snapshot, falling back to the static value
    pub fn generator_p_max_pu(&self, generator: &Generator) -> Vec<f64> {
        self.generators_t
            .p_max_pu
            .get_or(generator.id.as_str(), generator.p_max_pu, self.snapshots.len())
    }

    /// Generator minimum output per snapshot, falling back to the static value
    pub fn generator_p_min_pu(&self, generator: &Generator) -> Vec<f64> {
        self.generators_t
            .p_min_pu
            .get_or(generator.id.as_str(), generator.p_min_pu, self.snapshots.len())
    }

    /// Load demand per snapshot, falling back to the static value
    pub fn load_p_set(&self, load: &Load) -> Vec<f64> {
        self.loads_t
            .p_set
            .get_or(load.id.as_str(), load.p_set, self.snapshots.len())
    }

    /// Total demand of all loads for each snapshot
    pub fn total_demand(&self) -> Vec<f64> {
        let mut demand = vec![0.0; self.snapshots.len()];
        for load in self.loads.values() {
            for (total, value) in demand.iter_mut().zip(self.load_p_set(load)) {
                *total += value;
            }
        }
        demand
    }

    /// The country of a bus, if known
    pub fn bus_country(&self, bus: &BusID) -> Option<&str> {
        self.buses.get(bus).and_then(|b| b.country.as_deref())
    }

    /// Iterate over extendable generators
    pub fn extendable_generators(&self) -> impl Iterator<Item = &Generator> {
        self.generators.values().filter(|g| g.p_nom_extendable)
    }

    /// Iterate over extendable lines
    pub fn extendable_lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values().filter(|l| l.s_nom_extendable)
    }

    /// Iterate over extendable links
    pub fn extendable_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values().filter(|l| l.p_nom_extendable)
    }

    /// Whether any generator has an extendable capacity
    pub fn has_extendable_generators(&self) -> bool {
        self.extendable_generators().next().is_some()
    }

    /// Whether any line has an extendable capacity
    pub fn has_extendable_lines(&self) -> bool {
        self.extendable_lines().next().is_some()
    }

    /// Add a carrier if it is not already present
    pub fn add_carrier(&mut self, carrier: Carrier) {
        self.carriers.entry(carrier.id.clone()).or_insert(carrier);
    }

    /// Add a generator, failing if the name is already taken
    pub fn add_generator(&mut self, generator: Generator) -> Result<()> {
        ensure!(
            !self.generators.contains_key(&generator.id),
            "Duplicate generator ID {}",
            generator.id
        );
        self.generators.insert(generator.id.clone(), generator);
        Ok(())
    }

    /// Add or replace a global constraint
    pub fn add_global_constraint(&mut self, gc: GlobalConstraint) {
        self.global_constraints.insert(gc.id.clone(), gc);
    }

    /// Remove the lines matching `remove`, along with their series
    pub fn remove_lines(&mut self, mut remove: impl FnMut(&Line) -> bool) -> usize {
        let ids: Vec<LineID> = self
            .lines
            .values()
            .filter(|l| remove(l))
            .map(|l| l.id.clone())
            .collect();
        for id in &ids {
            self.lines.shift_remove(id);
            self.lines_t.remove_component(id.as_str());
        }
        ids.len()
    }

    /// Remove the links matching `remove`, along with their series
    pub fn remove_links(&mut self, mut remove: impl FnMut(&Link) -> bool) -> usize {
        let ids: Vec<LinkID> = self
            .links
            .values()
            .filter(|l| remove(l))
            .map(|l| l.id.clone())
            .collect();
        for id in &ids {
            self.links.shift_remove(id);
            self.links_t.remove_component(id.as_str());
        }
        ids.len()
    }

    /// Group the buses connected by lines into sub-networks.
    ///
    /// Returns one group of buses per connected component, in bus order. Buses not touched by any
    /// line are not included.
    pub fn sub_networks(&self) -> Result<Vec<Vec<BusID>>> {
        let mut union_find = UnionFind::<usize>::new(self.buses.len());
        let mut connected = vec![false; self.buses.len()];
        for line in self.lines.values() {
            let a = self
                .buses
                .get_index_of(&line.bus0)
                .with_context(|| format!("Line {} refers to unknown bus {}", line.id, line.bus0))?;
            let b = self
                .buses
                .get_index_of(&line.bus1)
                .with_context(|| format!("Line {} refers to unknown bus {}", line.id, line.bus1))?;
            union_find.union(a, b);
            connected[a] = true;
            connected[b] = true;
        }

        let mut groups: IndexMap<usize, Vec<BusID>> = IndexMap::new();
        for (i, bus_id) in self.buses.keys().enumerate() {
            if connected[i] {
                groups
                    .entry(union_find.find(i))
                    .or_default()
                    .push(bus_id.clone());
            }
        }

        Ok(groups.into_values().collect())
    }
}

/// Operations that apply uniformly to time series regardless of component kind
trait SeriesOps {
    fn truncate(&mut self, n: usize);
    fn average_groups(&mut self, groups: &[Vec<usize>]);
}

impl<ID: crate::id::IDLike> SeriesOps for TimeSeries<ID> {
    fn truncate(&mut self, n: usize) {
        TimeSeries::truncate(self, n);
    }

    fn average_groups(&mut self, groups: &[Vec<usize>]) {
        TimeSeries::average_groups(self, groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, two_bus_network};
    use rstest::rstest;

    #[rstest]
    fn test_validate_ok(two_bus_network: Network) {
        two_bus_network.validate().unwrap();
    }

    #[rstest]
    fn test_validate_unknown_bus(mut two_bus_network: Network) {
        two_bus_network
            .generators
            .insert("bad".into(), Generator::new("bad", "nowhere", "gas"));
        assert_error!(
            two_bus_network.validate(),
            "Generator bad refers to unknown bus nowhere"
        );
    }

    #[rstest]
    fn test_validate_series_length(mut two_bus_network: Network) {
        two_bus_network
            .loads_t
            .p_set
            .insert("load0".into(), vec![1.0]);
        assert!(two_bus_network.validate().is_err());
    }

    #[rstest]
    fn test_set_snapshots(mut two_bus_network: Network) {
        two_bus_network.set_snapshots(2);
        assert_eq!(two_bus_network.snapshots.len(), 2);
        assert_eq!(
            two_bus_network.generators_t.p_max_pu.get("wind").unwrap().len(),
            2
        );
        two_bus_network.validate().unwrap();
    }

    #[rstest]
    fn test_sub_networks(mut two_bus_network: Network) {
        assert_eq!(two_bus_network.sub_networks().unwrap().len(), 1);
        two_bus_network.buses.insert("island".into(), Bus::new("island"));
        two_bus_network
            .buses
            .insert("island2".into(), Bus::new("island2"));
        two_bus_network
            .lines
            .insert("l2".into(), Line::new("l2", "island", "island2"));
        let groups = two_bus_network.sub_networks().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1], [BusID::new("island"), BusID::new("island2")]);
    }

    #[rstest]
    fn test_total_demand(two_bus_network: Network) {
        let demand = two_bus_network.total_demand();
        assert_eq!(demand.len(), two_bus_network.snapshots.len());
        assert!(demand.iter().all(|&d| d > 0.0));
    }
}
