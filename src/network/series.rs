//! Per-snapshot time series attached to network components.
use super::components::{BusID, GeneratorID, LineID, LinkID, LoadID, StorageUnitID, StoreID};
use crate::id::IDLike;
use indexmap::IndexMap;

/// Values of one attribute for a set of components, one value per snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<ID: IDLike>(IndexMap<ID, Vec<f64>>);

impl<ID: IDLike> Default for TimeSeries<ID> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

impl<ID: IDLike> TimeSeries<ID> {
    /// Whether no component has a series for this attribute
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of components with a series
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the series for a component
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.0.get(id).map(Vec::as_slice)
    }

    /// Whether the component has a series
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Insert or replace the series for a component
    pub fn insert(&mut self, id: ID, values: Vec<f64>) {
        self.0.insert(id, values);
    }

    /// Remove the series for a component
    pub fn remove(&mut self, id: &str) -> Option<Vec<f64>> {
        self.0.shift_remove(id)
    }

    /// The series for a component, or `fallback` repeated for every snapshot.
    ///
    /// This is how static attributes provide defaults for time-varying ones.
    pub fn get_or(&self, id: &str, fallback: f64, len: usize) -> Vec<f64> {
        self.get(id)
            .map_or_else(|| vec![fallback; len], <[f64]>::to_vec)
    }

    /// Iterate over components and their series
    pub fn iter(&self) -> indexmap::map::Iter<'_, ID, Vec<f64>> {
        self.0.iter()
    }

    /// Mutably iterate over every series
    pub fn values_mut(&mut self) -> indexmap::map::ValuesMut<'_, ID, Vec<f64>> {
        self.0.values_mut()
    }

    /// Keep only the series whose component matches `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&ID) -> bool) {
        self.0.retain(|id, _| keep(id));
    }

    /// Remove all series
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Keep only the first `n` values of every series
    pub fn truncate(&mut self, n: usize) {
        for values in self.0.values_mut() {
            values.truncate(n);
        }
    }

    /// Replace every series with the mean over each group of snapshot indices
    pub fn average_groups(&mut self, groups: &[Vec<usize>]) {
        for values in self.0.values_mut() {
            *values = groups
                .iter()
                .map(|group| group.iter().map(|&i| values[i]).sum::<f64>() / group.len() as f64)
                .collect();
        }
    }
}

impl<ID: IDLike> FromIterator<(ID, Vec<f64>)> for TimeSeries<ID> {
    fn from_iter<T: IntoIterator<Item = (ID, Vec<f64>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Define a struct holding the time series of one component kind.
///
/// The struct also gets `ATTRIBUTES` (the attribute names, which double as file name suffixes)
/// along with name-based accessors used when reading and writing networks.
macro_rules! define_series {
    ($(#[$meta:meta])* $name:ident, $id:ty, { $($(#[$attr_meta:meta])* $attr:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $($(#[$attr_meta])* pub $attr: TimeSeries<$id>,)+
        }

        impl $name {
            /// The names of the time-varying attributes
            pub const ATTRIBUTES: &[&str] = &[$(stringify!($attr)),+];

            /// Get an attribute's series by name
            pub fn get(&self, attribute: &str) -> Option<&TimeSeries<$id>> {
                match attribute {
                    $(stringify!($attr) => Some(&self.$attr),)+
                    _ => None,
                }
            }

            /// Mutably get an attribute's series by name
            pub fn get_mut(&mut self, attribute: &str) -> Option<&mut TimeSeries<$id>> {
                match attribute {
                    $(stringify!($attr) => Some(&mut self.$attr),)+
                    _ => None,
                }
            }

            /// Apply `f` to every attribute's series
            pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut TimeSeries<$id>)) {
                $(f(&mut self.$attr);)+
            }

            /// Drop every series belonging to `id`
            pub fn remove_component(&mut self, id: &str) {
                self.for_each_mut(|series| {
                    series.remove(id);
                });
            }
        }
    };
}

define_series! {
    /// Time series for generators
    GeneratorSeries, GeneratorID, {
        /// Availability per unit of `p_nom`
        p_max_pu,
        /// Minimum output per unit of `p_nom`
        p_min_pu,
        /// Dispatch (output)
        p,
    }
}

define_series! {
    /// Time series for lines
    LineSeries, LineID, {
        /// Flow from `bus0` to `bus1`
        p0,
    }
}

define_series! {
    /// Time series for links
    LinkSeries, LinkID, {
        /// Power drawn from `bus0`
        p0,
        /// Power withdrawn at `bus1` (negative when delivering)
        p1,
    }
}

define_series! {
    /// Time series for storage units
    StorageUnitSeries, StorageUnitID, {
        /// Natural inflow (e.g. hydro)
        inflow,
        /// Power dispatched
        p_dispatch,
        /// Power stored
        p_store,
        /// Energy level
        state_of_charge,
        /// Spilled inflow
        spill,
    }
}

define_series! {
    /// Time series for stores
    StoreSeries, StoreID, {
        /// Energy level
        e,
        /// Power injected into the bus
        p,
    }
}

define_series! {
    /// Time series for loads
    LoadSeries, LoadID, {
        /// Demand
        p_set,
    }
}

define_series! {
    /// Time series for buses
    BusSeries, BusID, {
        /// Shadow price of the nodal balance
        marginal_price,
    }
}
