//! Source metadata: the identity and physical/economic attributes of an
//! emissions source, independent of what it emits or when.
use std::collections::HashMap;
use std::fmt;

use crate::units::{self, Dimensions, Quantity};

/// Zero-pad (or truncate-warn-free widen) a numeric-ish code string to `width`
/// characters, matching the inventory convention that FIPS/SCC/SIC/NAICS codes
/// are always left-padded with zeros to a fixed width.
fn zero_pad(s: &str, width: usize) -> String {
    let s = s.trim();
    if s.len() >= width {
        s[s.len() - width..].to_string()
    } else {
        format!("{}{}", "0".repeat(width - s.len()), s)
    }
}

/// Normalize a raw FIPS code to the canonical 5-character zero-padded form.
///
/// Source files sometimes report FIPS with fewer digits (states without a
/// leading zero, e.g. county codes alone). This always returns exactly 5
/// characters.
pub fn normalize_fips(raw: &str) -> String {
    zero_pad(raw, 5)
}

/// Normalize a raw SCC to the canonical 10-character form.
///
/// - An 8-digit code gets `00` prepended (it is missing the 2-digit "reserved"
///   prefix EPA inventories implicitly assume for older SCCs).
/// - Any other code shorter than 10 characters is zero-padded on the left with
///   `00` and then zero-padded on the right to reach 10 characters, matching
///   the legacy convention that mid-length SCCs are left-anchored codes with
///   the remaining (more specific) digits defaulted to zero.
/// - A 10-character code passes through unchanged.
pub fn normalize_scc(raw: &str) -> String {
    let s = raw.trim();
    if s.len() == 10 {
        return s.to_string();
    }
    if s.len() == 8 {
        return format!("00{s}");
    }
    let with_prefix = format!("00{s}");
    if with_prefix.len() >= 10 {
        return with_prefix[..10].to_string();
    }
    format!("{}{}", with_prefix, "0".repeat(10 - with_prefix.len()))
}

/// Normalize a SIC code to 4 zero-filled characters.
pub fn normalize_sic(raw: &str) -> String {
    zero_pad(raw, 4)
}

/// Normalize a NAICS code to 6 zero-filled characters.
pub fn normalize_naics(raw: &str) -> String {
    zero_pad(raw, 6)
}

/// The broad kind of emissions source a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SourceType {
    Point,
    Area,
    Mobile,
    Nonroad,
    Onroad,
    Gridded,
}

/// Core identity shared by every record: location code, classification code,
/// source kind, and reporting country.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceData {
    /// 5-character zero-padded FIPS code.
    pub fips: String,
    /// 10-character normalized Source Classification Code.
    pub scc: String,
    pub source_type: SourceType,
    pub country: String,
}

impl SourceData {
    pub fn new(fips: &str, scc: &str, source_type: SourceType, country: &str) -> Self {
        Self {
            fips: normalize_fips(fips),
            scc: normalize_scc(scc),
            source_type,
            country: country.to_string(),
        }
    }

    /// The stable key that identifies a unique emissions source; two parsed
    /// records sharing this key are merged.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.fips, self.scc, self.country)
    }
}

impl fmt::Display for SourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.fips, self.scc, self.country)
    }
}

/// Stack and location parameters specific to point sources.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSourceData {
    pub source: SourceData,
    pub plant_id: String,
    pub point_id: String,
    pub stack_id: String,
    pub segment: String,
    pub plant_name: String,
    pub oris_facility_code: Option<String>,
    pub oris_boiler_code: Option<String>,
    /// meters
    pub stack_height: Quantity,
    /// meters
    pub stack_diameter: Quantity,
    /// kelvin
    pub stack_temperature: Quantity,
    /// m^3/s, `None` if not reported and not derivable
    pub stack_flow: Option<Quantity>,
    /// m/s, `None` if not reported and not derivable
    pub stack_velocity: Option<Quantity>,
    pub x: f64,
    pub y: f64,
    pub spatial_reference: String,
}

impl PointSourceData {
    /// Fill in a missing stack flow or velocity from the other, assuming a
    /// circular stack of the recorded diameter. If both or neither are
    /// present, this is a no-op.
    pub fn derive_flow_or_velocity(&mut self) {
        let area = std::f64::consts::PI * (self.stack_diameter.value / 2.0).powi(2);
        if area <= 0.0 {
            return;
        }
        match (self.stack_flow, self.stack_velocity) {
            (Some(flow), None) => {
                self.stack_velocity = Some(Quantity::new(flow.value / area, Dimensions::LENGTH_PER_TIME));
            }
            (None, Some(vel)) => {
                self.stack_flow = Some(Quantity::new(vel.value * area, Dimensions::VOLUME_PER_TIME));
            }
            _ => {}
        }
    }

    /// True iff the stack height and velocity are both (effectively) zero,
    /// indicating this source should be treated as emitting at ground level.
    pub fn is_ground_level(&self) -> bool {
        let vel = self.stack_velocity.map(|v| v.value).unwrap_or(0.0);
        self.stack_height.value == 0.0 && vel == 0.0
    }
}

/// Economic classification codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EconomicData {
    /// 4-character zero-filled SIC code.
    pub sic: String,
    /// 6-character zero-filled NAICS code.
    pub naics: String,
}

impl EconomicData {
    pub fn new(sic: &str, naics: &str) -> Self {
        Self { sic: normalize_sic(sic), naics: normalize_naics(naics) }
    }
}

/// A single control-device record: a scalar control/rule-effectiveness triple
/// applied uniformly to all pollutants of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlData {
    pub mact_code: String,
    /// Percent, 0-100.
    pub control_efficiency: f64,
    /// Percent, 0-100; defaults to 100 when not reported.
    pub rule_effectiveness: f64,
    /// Percent, 0-100; defaults to 0 when not reported.
    pub rule_penetration: f64,
}

impl Default for ControlData {
    fn default() -> Self {
        Self {
            mact_code: String::new(),
            control_efficiency: 0.0,
            rule_effectiveness: 100.0,
            rule_penetration: 0.0,
        }
    }
}

impl ControlData {
    /// Build a `ControlData`, applying the spec's default-filling rules:
    /// missing rule effectiveness defaults to 100, all other missing fields
    /// default to 0.
    pub fn from_optional(
        mact_code: Option<String>,
        control_efficiency: Option<f64>,
        rule_effectiveness: Option<f64>,
        rule_penetration: Option<f64>,
    ) -> Self {
        Self {
            mact_code: mact_code.unwrap_or_default(),
            control_efficiency: control_efficiency.unwrap_or(0.0),
            rule_effectiveness: rule_effectiveness.unwrap_or(100.0),
            rule_penetration: rule_penetration.unwrap_or(0.0),
        }
    }

    /// Net fraction of emissions actually controlled: efficiency * effectiveness
    /// * penetration, each a percentage, composed multiplicatively.
    pub fn net_control_fraction(&self) -> f64 {
        (self.control_efficiency / 100.0) * (self.rule_effectiveness / 100.0) * (self.rule_penetration / 100.0)
    }
}

/// IDA-style per-pollutant control data: each reported pollutant may carry its
/// own control record, rather than one control record applying to the whole
/// source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdaControlData {
    pub by_pollutant: HashMap<String, ControlData>,
}

impl IdaControlData {
    pub fn get(&self, pollutant: &str) -> ControlData {
        self.by_pollutant.get(pollutant).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, pollutant: &str, control: ControlData) {
        self.by_pollutant.insert(pollutant.to_string(), control);
    }
}

/// Convert a value in `unit` to kilograms.
pub fn mass_to_kg(value: f64, unit: units::MassUnit) -> f64 {
    value * unit.to_kg_factor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fips_round_trips_for_short_codes() {
        for raw in ["1", "37", "037", "00037", "37183"] {
            let norm = normalize_fips(raw);
            assert_eq!(norm.len(), 5);
            // Re-normalizing an already-normalized code is idempotent.
            assert_eq!(normalize_fips(&norm), norm);
        }
    }

    #[test]
    fn scc_normalizes_8_digit_with_leading_00() {
        assert_eq!(normalize_scc("10100602"), "0010100602");
    }

    #[test]
    fn scc_normalizes_various_lengths_to_10_chars() {
        for raw in ["1", "22", "101006", "2275020000", "101"] {
            let norm = normalize_scc(raw);
            assert_eq!(norm.len(), 10, "failed for input {raw}");
        }
    }

    #[test]
    fn scc_10_char_passes_through() {
        assert_eq!(normalize_scc("2275020000"), "2275020000");
    }

    #[test]
    fn source_key_concatenates_fips_scc_country() {
        let s = SourceData::new("37", "10100602", SourceType::Point, "US");
        assert_eq!(s.key(), format!("{}{}{}", "00037", "0010100602", "US"));
    }

    #[test]
    fn control_defaults_match_spec() {
        let c = ControlData::from_optional(None, None, None, None);
        assert_eq!(c.control_efficiency, 0.0);
        assert_eq!(c.rule_effectiveness, 100.0);
        assert_eq!(c.rule_penetration, 0.0);
    }

    #[test]
    fn derive_velocity_from_flow_assumes_circular_stack() {
        let mut pt = sample_point();
        pt.stack_flow = Some(Quantity::new(10.0, Dimensions::VOLUME_PER_TIME));
        pt.stack_velocity = None;
        pt.derive_flow_or_velocity();
        assert!(pt.stack_velocity.is_some());
    }

    fn sample_point() -> PointSourceData {
        PointSourceData {
            source: SourceData::new("37183", "10100602", SourceType::Point, "US"),
            plant_id: "1".into(),
            point_id: "1".into(),
            stack_id: "1".into(),
            segment: "1".into(),
            plant_name: "Test Plant".into(),
            oris_facility_code: None,
            oris_boiler_code: None,
            stack_height: Quantity::new(10.0, Dimensions::LENGTH),
            stack_diameter: Quantity::new(1.0, Dimensions::LENGTH),
            stack_temperature: Quantity::new(300.0, Dimensions::DIMENSIONLESS),
            stack_flow: None,
            stack_velocity: None,
            x: 0.0,
            y: 0.0,
            spatial_reference: "EPSG:4326".into(),
        }
    }
}
