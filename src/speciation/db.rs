//! SPECIATE-style species and profile tables, loaded from CSV exports.
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SpeciationError;

/// A single SPECIATE species: its canonical name and molecular weight.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeciesProperties {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "SPEC_MW")]
    pub molecular_weight: f64,
}

/// `ID -> SpeciesProperties`, loaded from a `SPECIES_PROPERTIES` CSV export.
#[derive(Debug, Clone, Default)]
pub struct SpeciesTable {
    by_id: HashMap<String, SpeciesProperties>,
}

impl SpeciesTable {
    #[cfg(test)]
    pub(crate) fn from_map_for_tests(by_id: HashMap<String, SpeciesProperties>) -> SpeciesTable {
        SpeciesTable { by_id }
    }

    pub fn load(path: &Path) -> Result<SpeciesTable, SpeciationError> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| SpeciationError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        let mut by_id = HashMap::new();
        for result in rdr.deserialize() {
            let row: SpeciesProperties = result
                .map_err(|e| SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
            by_id.insert(row.id.clone(), row);
        }
        Ok(SpeciesTable { by_id })
    }

    pub fn get(&self, id: &str) -> Option<&SpeciesProperties> {
        self.by_id.get(id)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GasProfileRow {
    #[serde(rename = "P_NUMBER")]
    p_number: String,
    #[serde(rename = "VOCtoTOG")]
    voc_to_tog: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct SpeciesWeightRow {
    #[serde(rename = "P_NUMBER")]
    p_number: String,
    #[serde(rename = "SPECIES_ID")]
    species_id: String,
    #[serde(rename = "WEIGHT_PER")]
    weight_per: f64,
}

/// A single profile's species fractions, normalized to sum to 1, plus the
/// VOC->TOG factor for VOC profiles (1.0 for non-VOC profile kinds).
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub voc_to_tog: f64,
    /// species id -> fraction of this profile's mass/moles.
    pub fractions: HashMap<String, f64>,
}

/// All profiles of one kind (VOC, other-gas, or PM), keyed by profile code.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    by_code: HashMap<String, Profile>,
}

impl ProfileTable {
    #[cfg(test)]
    pub(crate) fn from_map_for_tests(by_code: HashMap<String, Profile>) -> ProfileTable {
        ProfileTable { by_code }
    }

    pub fn get(&self, code: &str) -> Option<&Profile> {
        self.by_code.get(code)
    }

    /// Load a VOC profile table: a `GAS_PROFILE` CSV (P_NUMBER, VOCtoTOG) and
    /// a `GAS_SPECIES` CSV (P_NUMBER, SPECIES_ID, WEIGHT_PER), joined on
    /// P_NUMBER. Each profile's fractions are normalized to sum to 1.
    pub fn load_voc(profile_path: &Path, species_path: &Path) -> Result<ProfileTable, SpeciationError> {
        let voc_to_tog = load_voc_to_tog(profile_path)?;
        let mut table = load_species_weights(species_path)?;
        for (code, profile) in table.by_code.iter_mut() {
            profile.voc_to_tog = voc_to_tog.get(code).copied().unwrap_or(1.0);
        }
        Ok(table)
    }

    /// Load a non-VOC profile table (other-gas or PM): just a species-weight
    /// CSV, normalized per profile code; `voc_to_tog` is always 1.0.
    pub fn load_simple(species_path: &Path) -> Result<ProfileTable, SpeciationError> {
        load_species_weights(species_path)
    }
}

fn load_voc_to_tog(path: &Path) -> Result<HashMap<String, f64>, SpeciationError> {
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| SpeciationError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
    let mut out = HashMap::new();
    for result in rdr.deserialize() {
        let row: GasProfileRow =
            result.map_err(|e| SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        out.insert(row.p_number, row.voc_to_tog);
    }
    Ok(out)
}

fn load_species_weights(path: &Path) -> Result<ProfileTable, SpeciationError> {
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| SpeciationError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
    let mut raw: HashMap<String, Vec<(String, f64)>> = HashMap::new();
    for result in rdr.deserialize() {
        let row: SpeciesWeightRow =
            result.map_err(|e| SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        raw.entry(row.p_number).or_default().push((row.species_id, row.weight_per));
    }

    let mut by_code = HashMap::new();
    for (code, entries) in raw {
        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        let mut fractions = HashMap::new();
        if total > 0.0 {
            for (species_id, weight) in entries {
                *fractions.entry(species_id).or_insert(0.0) += weight / total;
            }
        }
        by_code.insert(code, Profile { voc_to_tog: 1.0, fractions });
    }
    Ok(ProfileTable { by_code })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_fractions_sum_to_one() {
        let mut entries = HashMap::new();
        entries.insert("100".to_string(), vec![("A".to_string(), 2.0), ("B".to_string(), 2.0)]);
        let mut by_code = HashMap::new();
        for (code, items) in entries {
            let total: f64 = items.iter().map(|(_, w)| w).sum();
            let fractions = items.into_iter().map(|(s, w)| (s, w / total)).collect();
            by_code.insert(code, Profile { voc_to_tog: 1.0, fractions });
        }
        let table = ProfileTable { by_code };
        let profile = table.get("100").unwrap();
        let sum: f64 = profile.fractions.values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
