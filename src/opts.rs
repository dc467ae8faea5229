//! Scenario options: the hyphen-separated `opts` wildcard (e.g. "Co2L-CCL-EQ0.7c-24H").
//!
//! The string is parsed once into a [`ScenarioOptions`]. Each token is independent, so the order
//! of tokens does not matter. Tokens which are not recognised are ignored.
use anyhow::{Context, Result, bail, ensure};
use log::debug;
use std::fmt;
use std::str::FromStr;

/// Which group of buses an equity constraint applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquityScope {
    /// Each bus
    Node,
    /// Each country
    Country,
}

/// A minimum share of consumption which each node or country must generate itself (`EQ<level>[c]`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityShare {
    /// The required share (0 imposes nothing, 1 means self-sufficiency)
    pub level: f64,
    /// Whether the share applies per node or per country
    pub scope: EquityScope,
}

/// Which attribute a carrier adjustment scales
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustedAttribute {
    /// `p`: the capacity potential (`p_nom_max`)
    PotentialMax,
    /// `c`: the capital cost
    CapitalCost,
    /// `m`: the marginal cost
    MarginalCost,
}

/// Scale an attribute of every component whose carrier contains `carrier` (`<carrier>+<attr><factor>`)
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierAdjustment {
    /// Carrier name, matched as a substring ("AC" targets lines)
    pub carrier: String,
    /// The attribute to scale
    pub attribute: AdjustedAttribute,
    /// The scaling factor
    pub factor: f64,
}

/// Which transmission links to remove (`ATK` / `ATKc`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Autarky {
    /// Remove all lines and DC links
    All,
    /// Remove only lines and links crossing a country border
    CrossBorder,
}

/// A factor which is either a number or "opt"
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitFactor {
    /// Freely optimised
    Opt,
    /// A multiple of today's value
    Factor(f64),
}

/// What a transmission limit restricts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionLimitKind {
    /// `v`: total line volume (capacity × length)
    Volume,
    /// `c`: total line capital cost
    Cost,
}

/// The transmission limit wildcard (e.g. "v1.25", "copt")
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionLimit {
    /// What is restricted
    pub kind: TransmissionLimitKind,
    /// Allowed multiple of today's value
    pub factor: LimitFactor,
}

impl FromStr for TransmissionLimit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let kind = match chars.next() {
            Some('v') => TransmissionLimitKind::Volume,
            Some('c') => TransmissionLimitKind::Cost,
            _ => bail!("Invalid transmission limit '{s}': must start with 'v' or 'c'"),
        };
        let rest = chars.as_str();
        let factor = if rest == "opt" {
            LimitFactor::Opt
        } else {
            LimitFactor::Factor(parse_number(rest, s)?)
        };

        Ok(Self { kind, factor })
    }
}

impl fmt::Display for TransmissionLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransmissionLimitKind::Volume => 'v',
            TransmissionLimitKind::Cost => 'c',
        };
        match self.factor {
            LimitFactor::Opt => write!(f, "{kind}opt"),
            LimitFactor::Factor(factor) => write!(f, "{kind}{factor}"),
        }
    }
}

/// Typed scenario options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioOptions {
    /// `Co2L[factor]`: add a CO2 limit, optionally as a multiple of `co2base`
    pub co2_limit: Option<Option<f64>>,
    /// `CH4L[factor]`: add a gas usage limit, optionally in TWh
    pub gas_limit: Option<Option<f64>>,
    /// `Ep[price]`: add an emission price, optionally overriding the configured one
    pub emission_price: Option<Option<f64>>,
    /// `<n>H`: average every `n` hours
    pub resample_hours: Option<u32>,
    /// `<n>SEG`: segment the time series into `n` segments
    pub segments: Option<u32>,
    /// `BAU`: minimum capacity per carrier
    pub bau: bool,
    /// `SAFE`: capacity reserve margin above peak demand
    pub safe: bool,
    /// `CCL`: capacity limits per country and carrier
    pub ccl: bool,
    /// `EQ<level>[c]`: equity shares
    pub equity: Vec<EquityShare>,
    /// `RES<share>`: renewable shares
    pub res_share: Vec<f64>,
    /// `<carrier>+<attr><factor>`: carrier attribute adjustments
    pub carrier_adjustments: Vec<CarrierAdjustment>,
    /// `ATK` / `ATKc`: remove transmission
    pub autarky: Option<Autarky>,
}

/// Parse a numeric suffix, naming the token on failure
fn parse_number<T: FromStr>(value: &str, token: &str) -> Result<T> {
    value
        .parse()
        .ok()
        .with_context(|| format!("Invalid number in scenario option '{token}'"))
}

/// Parse an optional numeric suffix: empty means `None`
fn parse_optional_number(value: &str, token: &str) -> Result<Option<f64>> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_number(value, token).map(Some)
    }
}

/// Parse `<carrier>+<p|c|m><factor>`
fn parse_carrier_adjustment(token: &str) -> Result<Option<CarrierAdjustment>> {
    let Some((carrier, adjustment)) = token.split_once('+') else {
        return Ok(None);
    };
    let mut chars = adjustment.chars();
    let attribute = match chars.next() {
        Some('p') => AdjustedAttribute::PotentialMax,
        Some('c') => AdjustedAttribute::CapitalCost,
        Some('m') => AdjustedAttribute::MarginalCost,
        _ => bail!("Invalid attribute in scenario option '{token}': must be p, c or m"),
    };
    ensure!(!carrier.is_empty(), "Missing carrier in scenario option '{token}'");

    Ok(Some(CarrierAdjustment {
        carrier: carrier.to_string(),
        attribute,
        factor: parse_number(chars.as_str(), token)?,
    }))
}

/// Split a token into a non-empty run of leading digits and the remaining suffix
fn split_leading_digits(token: &str) -> Option<(&str, &str)> {
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    (end > 0).then(|| token.split_at(end))
}

impl ScenarioOptions {
    /// Apply a single token
    fn add_token(&mut self, token: &str) -> Result<()> {
        match token {
            "BAU" => self.bau = true,
            "SAFE" => self.safe = true,
            "CCL" => self.ccl = true,
            "ATK" => self.autarky = Some(Autarky::All),
            "ATKc" => {
                if self.autarky.is_none() {
                    self.autarky = Some(Autarky::CrossBorder);
                }
            }
            _ => return self.add_parameterised_token(token),
        }

        Ok(())
    }

    /// Apply a token carrying a numeric value
    fn add_parameterised_token(&mut self, token: &str) -> Result<()> {
        if let Some((digits, suffix)) = split_leading_digits(token) {
            if suffix.eq_ignore_ascii_case("h") {
                ensure!(
                    self.resample_hours.is_none(),
                    "Only one resampling option is allowed"
                );
                let hours = parse_number(digits, token)?;
                ensure!(hours > 0, "Resampling period in '{token}' must be positive");
                self.resample_hours = Some(hours);
                return Ok(());
            }
            if suffix.eq_ignore_ascii_case("seg") {
                self.segments = Some(parse_number(digits, token)?);
                return Ok(());
            }
        }

        if let Some(value) = token.strip_prefix("Co2L") {
            self.co2_limit = Some(parse_optional_number(value, token)?);
        } else if let Some(value) = token.strip_prefix("CH4L") {
            self.gas_limit = Some(parse_optional_number(value, token)?);
        } else if let Some(value) = token.strip_prefix("Ep") {
            self.emission_price = Some(parse_optional_number(value, token)?);
        } else if let Some(value) = token.strip_prefix("EQ") {
            let (value, scope) = match value.strip_suffix('c') {
                Some(value) => (value, EquityScope::Country),
                None => (value, EquityScope::Node),
            };
            let level = parse_number(value, token)?;
            self.equity.push(EquityShare { level, scope });
        } else if let Some(value) = token.strip_prefix("RES") {
            self.res_share.push(parse_number(value, token)?);
        } else if let Some(adjustment) = parse_carrier_adjustment(token)? {
            self.carrier_adjustments.push(adjustment);
        } else {
            debug!("Ignoring unrecognised scenario option '{token}'");
        }

        Ok(())
    }

    /// Whether any option adds a policy constraint at solve time
    pub fn has_policy_constraints(&self) -> bool {
        self.bau || self.safe || self.ccl || !self.equity.is_empty() || !self.res_share.is_empty()
    }
}

impl FromStr for ScenarioOptions {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut options = Self::default();
        for token in s.split('-').map(str::trim).filter(|t| !t.is_empty()) {
            options.add_token(token)?;
        }

        Ok(options)
    }
}
