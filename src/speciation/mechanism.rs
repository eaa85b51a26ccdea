//! Chemical-mechanism group factors: mapping a single SPECIATE species onto
//! the lumped species of a chemical-transport mechanism (e.g. SAPRC99,
//! CB6), with mass or mole conversion.
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SpeciationError;

/// `mechanism -> species_id -> {mechanism_group -> (factor, group_mw)}`.
#[derive(Debug, Clone, Default)]
pub struct MechanismTable {
    entries: HashMap<(String, String), HashMap<String, (f64, f64)>>,
}

#[derive(Debug, Deserialize)]
struct MechanismRow {
    species_id: String,
    group: String,
    factor: f64,
    group_mw: f64,
}

impl MechanismTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mechanism: impl Into<String>, species_id: impl Into<String>, group: impl Into<String>, factor: f64, group_mw: f64) {
        self.entries.entry((mechanism.into(), species_id.into())).or_default().insert(group.into(), (factor, group_mw));
    }

    /// Merge one mechanism's `species_id,group,factor,group_mw` rows from a
    /// CSV export into this table under `mechanism`.
    pub fn load(&mut self, mechanism: &str, path: &Path) -> Result<(), SpeciationError> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| SpeciationError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        for result in rdr.deserialize() {
            let row: MechanismRow =
                result.map_err(|e| SpeciationError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
            self.insert(mechanism, row.species_id, row.group, row.factor, row.group_mw);
        }
        Ok(())
    }

    /// Group factors for `species_id` under `mechanism`. In mass mode, each
    /// factor is `reactivity_fraction * group_mw / species_mw`, renormalized
    /// so the returned map sums to 1. In mole mode, each factor is divided by
    /// `species_mw` directly (no renormalization — mole-basis speciation is
    /// not required to sum to 1, since group moles aren't directly
    /// comparable across groups of different molecular weight).
    pub fn group_factors(
        &self,
        mechanism: &str,
        species_id: &str,
        species_mw: f64,
        mass_basis: bool,
    ) -> Result<HashMap<String, f64>, SpeciationError> {
        let groups = self
            .entries
            .get(&(mechanism.to_string(), species_id.to_string()))
            .ok_or_else(|| SpeciationError::UnknownSpecies(species_id.to_string(), mechanism.to_string()))?;

        if mass_basis {
            let raw: HashMap<String, f64> = groups.iter().map(|(group, (factor, group_mw))| (group.clone(), factor * group_mw / species_mw)).collect();
            let total: f64 = raw.values().sum();
            if total <= 0.0 {
                return Ok(raw);
            }
            Ok(raw.into_iter().map(|(group, v)| (group, v / total)).collect())
        } else {
            Ok(groups.iter().map(|(group, (factor, _group_mw))| (group.clone(), factor / species_mw)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_basis_factors_renormalize_to_one() {
        let mut table = MechanismTable::new();
        table.insert("SAPRC99", "S1", "ALK3", 0.5, 50.0);
        table.insert("SAPRC99", "S1", "ARO1", 0.5, 100.0);
        let factors = table.group_factors("SAPRC99", "S1", 60.0, true).unwrap();
        let sum: f64 = factors.values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mole_basis_divides_by_species_mw() {
        let mut table = MechanismTable::new();
        table.insert("SAPRC99", "S1", "ALK3", 1.0, 50.0);
        let factors = table.group_factors("SAPRC99", "S1", 60.0, false).unwrap();
        assert!((factors["ALK3"] - 1.0 / 60.0).abs() < 1e-12);
    }
}
