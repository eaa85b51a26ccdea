//! The speciation reference: `(SCC, pollutant) -> profile code`, with the
//! `COMBO` sentinel deferring to a second, FIPS/period-aware fraction table.
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SpeciationError;
use crate::units::Period;

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    scc: String,
    pollutant: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct ComboRow {
    period: String,
    pollutant: String,
    fips: String,
    code: String,
    fraction: f64,
}

/// Sentinel profile code meaning "look up per-(period, pollutant, FIPS)
/// fractions across multiple codes instead of a single profile".
pub const COMBO: &str = "COMBO";

/// `(SCC, pollutant) -> profile code (or COMBO)`.
#[derive(Debug, Clone, Default)]
pub struct SpeciationReference {
    by_scc_pollutant: HashMap<(String, String), String>,
    combo_fractions: HashMap<(Period, String, String), HashMap<String, f64>>,
}

impl SpeciationReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `(scc, pollutant) -> code` entries from a CSV with columns
    /// `scc,pollutant,code`. A `code` of [`COMBO`] defers to
    /// [`SpeciationReference::load_combo`].
    pub fn load(path: &Path) -> Result<SpeciationReference, SpeciationError> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| SpeciationError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        let mut reference = SpeciationReference::new();
        for result in rdr.deserialize() {
            let row: ReferenceRow =
                result.map_err(|e| SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
            reference.insert(row.scc, row.pollutant, row.code);
        }
        Ok(reference)
    }

    /// Merge `(period, pollutant, fips) -> {code -> fraction}` combo entries
    /// from a CSV with columns `period,pollutant,fips,code,fraction`, grouping
    /// rows that share a `(period, pollutant, fips)` key.
    pub fn load_combo(&mut self, path: &Path) -> Result<(), SpeciationError> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| SpeciationError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        let mut grouped: HashMap<(Period, String, String), HashMap<String, f64>> = HashMap::new();
        for result in rdr.deserialize() {
            let row: ComboRow =
                result.map_err(|e| SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
            let period = Period::from_name(&row.period).ok_or_else(|| {
                SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), format!("unrecognized period '{}'", row.period))
            })?;
            grouped.entry((period, row.pollutant, row.fips)).or_default().insert(row.code, row.fraction);
        }
        for ((period, pollutant, fips), fractions) in grouped {
            self.insert_combo(period, pollutant, fips, fractions);
        }
        Ok(())
    }

    pub fn insert(&mut self, scc: impl Into<String>, pollutant: impl Into<String>, code: impl Into<String>) {
        self.by_scc_pollutant.insert((scc.into(), pollutant.into()), code.into());
    }

    /// Register one `(period, pollutant, fips) -> {code -> fraction}` combo
    /// entry. Fractions registered for the same key are expected by the
    /// caller to sum to 1; this type does not enforce that at insert time.
    pub fn insert_combo(&mut self, period: Period, pollutant: impl Into<String>, fips: impl Into<String>, fractions: HashMap<String, f64>) {
        self.combo_fractions.insert((period, pollutant.into(), fips.into()), fractions);
    }

    /// Resolve `(scc, pollutant)` to either a single profile code or a set of
    /// `(code, fraction)` pairs if the entry is `COMBO`.
    pub fn resolve(&self, scc: &str, pollutant: &str, period: Period, fips: &str) -> Option<ResolvedProfile> {
        let code = self.by_scc_pollutant.get(&(scc.to_string(), pollutant.to_string()))?;
        if code == COMBO {
            let fractions = self.combo_fractions.get(&(period, pollutant.to_string(), fips.to_string()))?;
            Some(ResolvedProfile::Combo(fractions.clone()))
        } else {
            Some(ResolvedProfile::Single(code.clone()))
        }
    }
}

/// The result of resolving a speciation reference lookup.
#[derive(Debug, Clone)]
pub enum ResolvedProfile {
    Single(String),
    Combo(HashMap<String, f64>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_code_resolves_directly() {
        let mut reference = SpeciationReference::new();
        reference.insert("10100602", "VOC", "1001");
        match reference.resolve("10100602", "VOC", Period::Annual, "37183").unwrap() {
            ResolvedProfile::Single(code) => assert_eq!(code, "1001"),
            _ => panic!("expected a single profile code"),
        }
    }

    #[test]
    fn combo_code_defers_to_fraction_table() {
        let mut reference = SpeciationReference::new();
        reference.insert("10100602", "VOC", COMBO);
        let mut fractions = HashMap::new();
        fractions.insert("1001".to_string(), 0.6);
        fractions.insert("1002".to_string(), 0.4);
        reference.insert_combo(Period::Annual, "VOC", "37183", fractions);

        match reference.resolve("10100602", "VOC", Period::Annual, "37183").unwrap() {
            ResolvedProfile::Combo(fractions) => {
                let sum: f64 = fractions.values().sum();
                assert!((sum - 1.0).abs() < 1e-12);
            }
            _ => panic!("expected a combo resolution"),
        }
    }
}
