//! Static component tables of a network.
//!
//! Each component is one row of its CSV table. Optional outputs written by the solver (e.g.
//! `p_nom_opt`) are `None` until the network has been solved.
use crate::id::{define_id_getter, define_id_type};
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

define_id_type! {BusID}
define_id_type! {CarrierID}
define_id_type! {GeneratorID}
define_id_type! {LineID}
define_id_type! {LinkID}
define_id_type! {StorageUnitID}
define_id_type! {StoreID}
define_id_type! {LoadID}
define_id_type! {GlobalConstraintID}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_one, f64, 1.0);
define_param_default!(default_minus_one, f64, -1.0);
define_param_default!(default_infinity, f64, f64::INFINITY);
define_param_default!(default_ac, CarrierID, CarrierID::new("AC"));

/// A node of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    /// Unique name of the bus
    #[serde(rename = "name")]
    pub id: BusID,
    /// Nominal voltage in kV
    #[serde(default = "default_one")]
    pub v_nom: f64,
    /// The energy carrier of the bus (e.g. "AC", "H2", "battery")
    #[serde(default = "default_ac")]
    pub carrier: CarrierID,
    /// The country the bus belongs to
    #[serde(default)]
    pub country: Option<String>,
    /// Stable location identifier (several buses of different carriers can share a location)
    #[serde(default)]
    pub location: Option<String>,
    /// Longitude
    #[serde(default)]
    pub x: f64,
    /// Latitude
    #[serde(default)]
    pub y: f64,
}
define_id_getter! {Bus, BusID}

impl Bus {
    /// Create a new AC bus with default attributes
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            v_nom: 1.0,
            carrier: default_ac(),
            country: None,
            location: None,
            x: 0.0,
            y: 0.0,
        }
    }
}

/// Carrier attributes which global constraints can refer to
pub const CARRIER_ATTRIBUTES: &[&str] = &["co2_emissions", "gas_usage"];

/// An energy carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    /// Name of the carrier
    #[serde(rename = "name")]
    pub id: CarrierID,
    /// Emissions in tCO2 per MWh of primary energy
    #[serde(default)]
    pub co2_emissions: f64,
    /// Whether the carrier counts towards a gas usage limit (0 or 1)
    #[serde(default)]
    pub gas_usage: f64,
}
define_id_getter! {Carrier, CarrierID}

impl Carrier {
    /// Create a new carrier with no emissions
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            co2_emissions: 0.0,
            gas_usage: 0.0,
        }
    }

    /// Look up a carrier attribute by name, as referenced by global constraints
    pub fn attribute(&self, name: &str) -> Option<f64> {
        match name {
            "co2_emissions" => Some(self.co2_emissions),
            "gas_usage" => Some(self.gas_usage),
            _ => None,
        }
    }
}

/// A generator attached to a single bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    /// Unique name of the generator
    #[serde(rename = "name")]
    pub id: GeneratorID,
    /// The bus the generator feeds into
    pub bus: BusID,
    /// The generator's carrier
    #[serde(default)]
    pub carrier: CarrierID,
    /// Nominal power (MW)
    #[serde(default)]
    pub p_nom: f64,
    /// Whether `p_nom` is a decision variable
    #[serde(default)]
    pub p_nom_extendable: bool,
    /// Lower bound for extendable `p_nom`
    #[serde(default)]
    pub p_nom_min: f64,
    /// Upper bound for extendable `p_nom`
    #[serde(default = "default_infinity")]
    pub p_nom_max: f64,
    /// Minimum output per unit of `p_nom` (static fallback)
    #[serde(default)]
    pub p_min_pu: f64,
    /// Maximum output per unit of `p_nom` (static fallback)
    #[serde(default = "default_one")]
    pub p_max_pu: f64,
    /// Cost per MWh of output
    #[serde(default)]
    pub marginal_cost: f64,
    /// Annualised cost per MW of `p_nom`
    #[serde(default)]
    pub capital_cost: f64,
    /// Ratio of output to primary energy
    #[serde(default = "default_one")]
    pub efficiency: f64,
    /// Multiplier applied to dispatch in the nodal balance
    #[serde(default = "default_one")]
    pub sign: f64,
    /// Stable site identifier shared by generators built at the same place in different years
    #[serde(default)]
    pub site: Option<String>,
    /// The planning horizon in which the generator was built
    #[serde(default)]
    pub build_year: Option<u32>,
    /// Optimised nominal power
    #[serde(default)]
    pub p_nom_opt: Option<f64>,
}
define_id_getter! {Generator, GeneratorID}

impl Generator {
    /// Create a fixed generator with default attributes
    pub fn new(id: &str, bus: &str, carrier: &str) -> Self {
        Self {
            id: id.into(),
            bus: bus.into(),
            carrier: carrier.into(),
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_min_pu: 0.0,
            p_max_pu: 1.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            efficiency: 1.0,
            sign: 1.0,
            site: None,
            build_year: None,
            p_nom_opt: None,
        }
    }
}

/// A passive AC (or DC) branch between two buses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Unique name of the line
    #[serde(rename = "name")]
    pub id: LineID,
    /// The bus at the start of the line
    pub bus0: BusID,
    /// The bus at the end of the line
    pub bus1: BusID,
    /// "AC" or "DC"
    #[serde(default = "default_ac")]
    pub carrier: CarrierID,
    /// Series reactance (Ohm)
    #[serde(default)]
    pub x: f64,
    /// Series resistance (Ohm)
    #[serde(default)]
    pub r: f64,
    /// Nominal apparent power (MVA)
    #[serde(default)]
    pub s_nom: f64,
    /// Whether `s_nom` is a decision variable
    #[serde(default)]
    pub s_nom_extendable: bool,
    /// Lower bound for extendable `s_nom`
    #[serde(default)]
    pub s_nom_min: f64,
    /// Upper bound for extendable `s_nom`
    #[serde(default = "default_infinity")]
    pub s_nom_max: f64,
    /// Usable share of `s_nom`
    #[serde(default = "default_one")]
    pub s_max_pu: f64,
    /// Length in km
    #[serde(default)]
    pub length: f64,
    /// Annualised cost per MVA of `s_nom`
    #[serde(default)]
    pub capital_cost: f64,
    /// Optimised nominal power
    #[serde(default)]
    pub s_nom_opt: Option<f64>,
}
define_id_getter! {Line, LineID}

impl Line {
    /// Create a fixed AC line with default attributes
    pub fn new(id: &str, bus0: &str, bus1: &str) -> Self {
        Self {
            id: id.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            carrier: default_ac(),
            x: 0.0,
            r: 0.0,
            s_nom: 0.0,
            s_nom_extendable: false,
            s_nom_min: 0.0,
            s_nom_max: f64::INFINITY,
            s_max_pu: 1.0,
            length: 0.0,
            capital_cost: 0.0,
            s_nom_opt: None,
        }
    }

    /// Whether this is a DC line
    pub fn is_dc(&self) -> bool {
        self.carrier.as_str() == "DC"
    }
}

/// A controllable branch converting power from `bus0` to `bus1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Unique name of the link
    #[serde(rename = "name")]
    pub id: LinkID,
    /// The input bus
    pub bus0: BusID,
    /// The output bus
    pub bus1: BusID,
    /// The link's carrier
    #[serde(default)]
    pub carrier: CarrierID,
    /// Output per unit of input
    #[serde(default = "default_one")]
    pub efficiency: f64,
    /// Nominal input power (MW)
    #[serde(default)]
    pub p_nom: f64,
    /// Whether `p_nom` is a decision variable
    #[serde(default)]
    pub p_nom_extendable: bool,
    /// Lower bound for extendable `p_nom`
    #[serde(default)]
    pub p_nom_min: f64,
    /// Upper bound for extendable `p_nom`
    #[serde(default = "default_infinity")]
    pub p_nom_max: f64,
    /// Minimum flow per unit of `p_nom`
    #[serde(default)]
    pub p_min_pu: f64,
    /// Maximum flow per unit of `p_nom`
    #[serde(default = "default_one")]
    pub p_max_pu: f64,
    /// Cost per MWh of input
    #[serde(default)]
    pub marginal_cost: f64,
    /// Annualised cost per MW of `p_nom`
    #[serde(default)]
    pub capital_cost: f64,
    /// Length in km
    #[serde(default)]
    pub length: f64,
    /// Ratio of heat to electric capacity for CHP pairs
    #[serde(default = "default_one")]
    pub p_nom_ratio: f64,
    /// CHP backpressure coefficient
    #[serde(default)]
    pub c_b: f64,
    /// Optimised nominal power
    #[serde(default)]
    pub p_nom_opt: Option<f64>,
}
define_id_getter! {Link, LinkID}

impl Link {
    /// Create a fixed link with default attributes
    pub fn new(id: &str, bus0: &str, bus1: &str, carrier: &str) -> Self {
        Self {
            id: id.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            carrier: carrier.into(),
            efficiency: 1.0,
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_min_pu: 0.0,
            p_max_pu: 1.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            length: 0.0,
            p_nom_ratio: 1.0,
            c_b: 0.0,
            p_nom_opt: None,
        }
    }

    /// Whether this is an HVDC link
    pub fn is_dc(&self) -> bool {
        self.carrier.as_str() == "DC"
    }
}

/// A storage unit with a fixed energy-to-power ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUnit {
    /// Unique name of the storage unit
    #[serde(rename = "name")]
    pub id: StorageUnitID,
    /// The bus the unit is attached to
    pub bus: BusID,
    /// The unit's carrier
    #[serde(default)]
    pub carrier: CarrierID,
    /// Nominal power (MW)
    #[serde(default)]
    pub p_nom: f64,
    /// Whether `p_nom` is a decision variable
    #[serde(default)]
    pub p_nom_extendable: bool,
    /// Lower bound for extendable `p_nom`
    #[serde(default)]
    pub p_nom_min: f64,
    /// Upper bound for extendable `p_nom`
    #[serde(default = "default_infinity")]
    pub p_nom_max: f64,
    /// Minimum power per unit (negative means storing)
    #[serde(default = "default_minus_one")]
    pub p_min_pu: f64,
    /// Maximum power per unit
    #[serde(default = "default_one")]
    pub p_max_pu: f64,
    /// Energy capacity in hours at full power
    #[serde(default = "default_one")]
    pub max_hours: f64,
    /// Efficiency of storing
    #[serde(default = "default_one")]
    pub efficiency_store: f64,
    /// Efficiency of dispatching
    #[serde(default = "default_one")]
    pub efficiency_dispatch: f64,
    /// Share of state of charge lost per hour
    #[serde(default)]
    pub standing_loss: f64,
    /// Whether the final state of charge must equal the initial one
    #[serde(default)]
    pub cyclic_state_of_charge: bool,
    /// State of charge before the first snapshot
    #[serde(default)]
    pub state_of_charge_initial: f64,
    /// Cost per MWh dispatched
    #[serde(default)]
    pub marginal_cost: f64,
    /// Annualised cost per MW of `p_nom`
    #[serde(default)]
    pub capital_cost: f64,
    /// Stable site identifier
    #[serde(default)]
    pub site: Option<String>,
    /// The planning horizon in which the unit was built
    #[serde(default)]
    pub build_year: Option<u32>,
    /// Optimised nominal power
    #[serde(default)]
    pub p_nom_opt: Option<f64>,
}
define_id_getter! {StorageUnit, StorageUnitID}

impl StorageUnit {
    /// Create a fixed storage unit with default attributes
    pub fn new(id: &str, bus: &str, carrier: &str) -> Self {
        Self {
            id: id.into(),
            bus: bus.into(),
            carrier: carrier.into(),
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_min_pu: -1.0,
            p_max_pu: 1.0,
            max_hours: 1.0,
            efficiency_store: 1.0,
            efficiency_dispatch: 1.0,
            standing_loss: 0.0,
            cyclic_state_of_charge: false,
            state_of_charge_initial: 0.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            site: None,
            build_year: None,
            p_nom_opt: None,
        }
    }
}

/// A store of energy with independently sized energy capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    /// Unique name of the store
    #[serde(rename = "name")]
    pub id: StoreID,
    /// The bus the store is attached to
    pub bus: BusID,
    /// The store's carrier
    #[serde(default)]
    pub carrier: CarrierID,
    /// Nominal energy capacity (MWh)
    #[serde(default)]
    pub e_nom: f64,
    /// Whether `e_nom` is a decision variable
    #[serde(default)]
    pub e_nom_extendable: bool,
    /// Lower bound for extendable `e_nom`
    #[serde(default)]
    pub e_nom_min: f64,
    /// Upper bound for extendable `e_nom`
    #[serde(default = "default_infinity")]
    pub e_nom_max: f64,
    /// Minimum energy level per unit of `e_nom`
    #[serde(default)]
    pub e_min_pu: f64,
    /// Maximum energy level per unit of `e_nom`
    #[serde(default = "default_one")]
    pub e_max_pu: f64,
    /// Energy before the first snapshot
    #[serde(default)]
    pub e_initial: f64,
    /// Whether the final energy level must equal the initial one
    #[serde(default)]
    pub e_cyclic: bool,
    /// Share of energy lost per hour
    #[serde(default)]
    pub standing_loss: f64,
    /// Cost per MWh withdrawn
    #[serde(default)]
    pub marginal_cost: f64,
    /// Annualised cost per MWh of `e_nom`
    #[serde(default)]
    pub capital_cost: f64,
    /// Optimised energy capacity
    #[serde(default)]
    pub e_nom_opt: Option<f64>,
}
define_id_getter! {Store, StoreID}

impl Store {
    /// Create a fixed store with default attributes
    pub fn new(id: &str, bus: &str, carrier: &str) -> Self {
        Self {
            id: id.into(),
            bus: bus.into(),
            carrier: carrier.into(),
            e_nom: 0.0,
            e_nom_extendable: false,
            e_nom_min: 0.0,
            e_nom_max: f64::INFINITY,
            e_min_pu: 0.0,
            e_max_pu: 1.0,
            e_initial: 0.0,
            e_cyclic: false,
            standing_loss: 0.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            e_nom_opt: None,
        }
    }
}

/// A fixed demand at a bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    /// Unique name of the load
    #[serde(rename = "name")]
    pub id: LoadID,
    /// The bus the load is attached to
    pub bus: BusID,
    /// The load's carrier
    #[serde(default = "default_ac")]
    pub carrier: CarrierID,
    /// Demand in MW (static fallback)
    #[serde(default)]
    pub p_set: f64,
}
define_id_getter! {Load, LoadID}

impl Load {
    /// Create a new AC load
    pub fn new(id: &str, bus: &str, p_set: f64) -> Self {
        Self {
            id: id.into(),
            bus: bus.into(),
            carrier: default_ac(),
            p_set,
        }
    }
}

/// The kind of quantity a global constraint restricts
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeLabeledStringEnum, SerializeLabeledStringEnum)]
pub enum GlobalConstraintType {
    /// Primary energy use weighted by a carrier attribute (e.g. CO2 emissions)
    #[string = "primary_energy"]
    PrimaryEnergy,
    /// Total line volume (length × capacity)
    #[string = "transmission_volume_expansion_limit"]
    TransmissionVolumeExpansionLimit,
    /// Total transmission capital cost
    #[string = "transmission_expansion_cost_limit"]
    TransmissionExpansionCostLimit,
}

/// The sense of a global constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeLabeledStringEnum, SerializeLabeledStringEnum)]
pub enum Sense {
    /// Less than or equal to
    #[string = "<="]
    LessEqual,
    /// Greater than or equal to
    #[string = ">="]
    GreaterEqual,
    /// Equal to
    #[string = "=="]
    Equal,
}

/// A network-wide linear restriction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConstraint {
    /// Unique name of the constraint
    #[serde(rename = "name")]
    pub id: GlobalConstraintID,
    /// What the constraint restricts
    #[serde(rename = "type")]
    pub kind: GlobalConstraintType,
    /// Carrier attribute (primary energy) or comma-separated carriers (transmission limits)
    pub carrier_attribute: String,
    /// The constraint sense
    pub sense: Sense,
    /// Right-hand side
    pub constant: f64,
    /// Shadow price after solving
    #[serde(default)]
    pub mu: Option<f64>,
}
define_id_getter! {GlobalConstraint, GlobalConstraintID}

impl GlobalConstraint {
    /// Carriers named by a transmission limit's `carrier_attribute` (e.g. "AC, DC")
    pub fn carriers(&self) -> impl Iterator<Item = &str> {
        self.carrier_attribute
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_attribute() {
        let mut carrier = Carrier::new("gas");
        carrier.co2_emissions = 0.2;
        assert_eq!(carrier.attribute("co2_emissions"), Some(0.2));
        assert_eq!(carrier.attribute("gas_usage"), Some(0.0));
        assert_eq!(carrier.attribute("nox"), None);
    }

    #[test]
    fn test_global_constraint_carriers() {
        let gc = GlobalConstraint {
            id: "lv_limit".into(),
            kind: GlobalConstraintType::TransmissionVolumeExpansionLimit,
            carrier_attribute: "AC, DC".into(),
            sense: Sense::LessEqual,
            constant: 1.0,
            mu: None,
        };
        assert_eq!(gc.carriers().collect::<Vec<_>>(), ["AC", "DC"]);
    }
}
