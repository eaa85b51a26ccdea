//! Dimensioned scalars and calendar periods.
//!
//! Every emission rate carried through this crate is tagged with a [`Dimensions`]
//! vector of integer exponents so that a unit mismatch (e.g. combining a mass rate
//! with a mass) is caught as a programming error rather than silently producing a
//! wrong number.
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Exponents of the fundamental dimensions this crate needs: mass, time, length.
/// A dimensionless quantity is all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub mass: i8,
    pub time: i8,
    pub length: i8,
}

impl Dimensions {
    pub const DIMENSIONLESS: Dimensions = Dimensions { mass: 0, time: 0, length: 0 };
    pub const MASS: Dimensions = Dimensions { mass: 1, time: 0, length: 0 };
    pub const LENGTH: Dimensions = Dimensions { mass: 0, time: 0, length: 1 };
    pub const TIME: Dimensions = Dimensions { mass: 0, time: 1, length: 0 };
    /// kg/s: the canonical dimensions for an emissions rate.
    pub const MASS_PER_TIME: Dimensions = Dimensions { mass: 1, time: -1, length: 0 };
    /// m^3/s: volumetric flow.
    pub const VOLUME_PER_TIME: Dimensions = Dimensions { mass: 0, time: -1, length: 3 };
    /// m/s: velocity.
    pub const LENGTH_PER_TIME: Dimensions = Dimensions { mass: 0, time: -1, length: 1 };
    /// kmol/g, used for mole-basis speciated output.
    pub const MOLES_PER_MASS: Dimensions = Dimensions { mass: -1, time: 0, length: 0 };

    fn mul(self, other: Dimensions) -> Dimensions {
        Dimensions {
            mass: self.mass + other.mass,
            time: self.time + other.time,
            length: self.length + other.length,
        }
    }

    fn div(self, other: Dimensions) -> Dimensions {
        Dimensions {
            mass: self.mass - other.mass,
            time: self.time - other.time,
            length: self.length - other.length,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kg^{} s^{} m^{}", self.mass, self.time, self.length)
    }
}

/// A scalar value carrying SI-base-unit dimensions.
///
/// All arithmetic that combines two [`Quantity`] values computes the resulting
/// dimensions; addition/subtraction additionally require the dimensions to
/// already match (this is how [`crate::emissions::EmissionsContainer::add`]
/// detects a unit mismatch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub dims: Dimensions,
}

impl Quantity {
    pub fn new(value: f64, dims: Dimensions) -> Self {
        Self { value, dims }
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::new(value, Dimensions::DIMENSIONLESS)
    }

    pub fn mass_kg(value: f64) -> Self {
        Self::new(value, Dimensions::MASS)
    }

    pub fn rate_kg_per_s(value: f64) -> Self {
        Self::new(value, Dimensions::MASS_PER_TIME)
    }

    /// True if `self` and `other` share identical dimensions.
    pub fn dims_match(&self, other: &Quantity) -> bool {
        self.dims == other.dims
    }
}

impl Mul for Quantity {
    type Output = Quantity;
    fn mul(self, rhs: Quantity) -> Quantity {
        Quantity { value: self.value * rhs.value, dims: self.dims.mul(rhs.dims) }
    }
}

impl Div for Quantity {
    type Output = Quantity;
    fn div(self, rhs: Quantity) -> Quantity {
        Quantity { value: self.value / rhs.value, dims: self.dims.div(rhs.dims) }
    }
}

impl Add for Quantity {
    type Output = Quantity;
    /// # Panics
    /// Panics (debug only) if the dimensions do not match; callers that expect
    /// mismatched units should check [`Quantity::dims_match`] first and surface a
    /// proper `UnitMismatch` error instead of relying on this operator.
    fn add(self, rhs: Quantity) -> Quantity {
        debug_assert_eq!(self.dims, rhs.dims, "cannot add quantities with different dimensions");
        Quantity { value: self.value + rhs.value, dims: self.dims }
    }
}

impl Sub for Quantity {
    type Output = Quantity;
    fn sub(self, rhs: Quantity) -> Quantity {
        debug_assert_eq!(self.dims, rhs.dims, "cannot subtract quantities with different dimensions");
        Quantity { value: self.value - rhs.value, dims: self.dims }
    }
}

/// Mass-unit conversions to kilograms, as reported by legacy inventory formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum MassUnit {
    #[strum(serialize = "TON", serialize = "ton")]
    Ton,
    #[strum(serialize = "TONNE", serialize = "tonne")]
    Tonne,
    #[strum(serialize = "KG", serialize = "kg")]
    Kg,
    #[strum(serialize = "G", serialize = "g")]
    G,
    #[strum(serialize = "LB", serialize = "lb")]
    Lb,
}

impl MassUnit {
    /// Multiplicative factor to convert a value in this unit to kilograms.
    pub fn to_kg_factor(&self) -> f64 {
        match self {
            MassUnit::Ton => short_ton_to_kg(1.0),
            MassUnit::Tonne => 1000.0,
            MassUnit::Kg => 1.0,
            MassUnit::G => 1e-3,
            MassUnit::Lb => pound_to_kg(1.0),
        }
    }
}

/// US short ton (2000 lb) to kilograms.
pub fn short_ton_to_kg(tons: f64) -> f64 {
    tons * 907.18474
}

/// Avoirdupois pound to kilograms.
pub fn pound_to_kg(lb: f64) -> f64 {
    lb * 0.45359237
}

/// Feet to meters.
pub fn foot_to_meter(ft: f64) -> f64 {
    ft * 0.3048
}

/// Degrees Fahrenheit to Kelvin.
pub fn fahrenheit_to_kelvin(deg_f: f64) -> f64 {
    (deg_f - 32.0) * 5.0 / 9.0 + 273.15
}

/// Cubic feet per second to cubic meters per second.
pub fn cfs_to_cms(cfs: f64) -> f64 {
    cfs * 0.028316846592
}

/// Feet per second to meters per second.
pub fn fps_to_mps(fps: f64) -> f64 {
    foot_to_meter(fps)
}

pub const SECONDS_PER_DAY: f64 = 86400.0;

/// One of the twelve calendar months, the annual aggregate period, or the
/// continuous-emissions-monitoring marker period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
pub enum Period {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
    Annual,
    Cem,
}

impl Period {
    pub fn month_number(&self) -> Option<u32> {
        match self {
            Period::Jan => Some(1),
            Period::Feb => Some(2),
            Period::Mar => Some(3),
            Period::Apr => Some(4),
            Period::May => Some(5),
            Period::Jun => Some(6),
            Period::Jul => Some(7),
            Period::Aug => Some(8),
            Period::Sep => Some(9),
            Period::Oct => Some(10),
            Period::Nov => Some(11),
            Period::Dec => Some(12),
            Period::Annual | Period::Cem => None,
        }
    }

    pub fn from_month_number(m: u32) -> Option<Period> {
        use Period::*;
        Some(match m {
            1 => Jan,
            2 => Feb,
            3 => Mar,
            4 => Apr,
            5 => May,
            6 => Jun,
            7 => Jul,
            8 => Aug,
            9 => Sep,
            10 => Oct,
            11 => Nov,
            12 => Dec,
            _ => return None,
        })
    }

    /// The `[begin, end)` UTC interval this period covers in calendar year `year`.
    ///
    /// # Panics
    /// Panics if called on [`Period::Cem`], which has no fixed calendar span.
    pub fn time_interval(&self, year: i32) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Period::Annual => {
                let begin = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().expect("valid date");
                let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single().expect("valid date");
                (begin, end)
            }
            Period::Cem => panic!("Period::Cem has no fixed time interval"),
            _ => {
                let month = self.month_number().expect("non-annual, non-cem period has a month");
                let begin = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().expect("valid date");
                let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).single().expect("valid date");
                (begin, end)
            }
        }
    }

    /// Parse a period name case-insensitively (`"annual"`, `"jan"`, `"Cem"`, ...).
    pub fn from_name(name: &str) -> Option<Period> {
        use strum::IntoEnumIterator;
        Period::iter().find(|p| p.to_string().eq_ignore_ascii_case(name))
    }

    /// Classify a `[begin, end)` duration back into a [`Period`].
    ///
    /// Mirrors `time_interval` in reverse: 8700-8800 hours is Annual, 24*27 to 24*32
    /// hours is whichever month contains `begin`. Any other span is not a recognized
    /// period.
    pub fn from_time_interval(begin: DateTime<Utc>, end: DateTime<Utc>) -> Option<Period> {
        let hours = (end - begin).num_seconds() as f64 / 3600.0;
        if (8700.0..=8800.0).contains(&hours) {
            return Some(Period::Annual);
        }
        if (24.0 * 27.0..=24.0 * 32.0).contains(&hours) {
            return Period::from_month_number(begin.month());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_per_time_round_trips_through_mul_div() {
        let mass = Quantity::mass_kg(10.0);
        let time = Quantity::new(2.0, Dimensions::TIME);
        let rate = mass / time;
        assert_eq!(rate.dims, Dimensions::MASS_PER_TIME);
        assert_eq!(rate.value, 5.0);

        let back = rate * time;
        assert_eq!(back.dims, Dimensions::MASS);
        assert!((back.value - mass.value).abs() < 1e-12);
    }

    #[test]
    fn period_time_interval_round_trips() {
        for period in [Period::Jan, Period::Feb, Period::Jun, Period::Dec, Period::Annual] {
            let (begin, end) = period.time_interval(2016);
            let recovered = Period::from_time_interval(begin, end).expect("recognized period");
            assert_eq!(recovered, period);
        }
    }

    #[test]
    fn annual_interval_is_full_year() {
        let (begin, end) = Period::Annual.time_interval(2016);
        assert_eq!(begin, Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn short_ton_conversion_matches_known_factor() {
        // 0.00426774 ton -> kg, used in the FF10 single-pollutant annual scenario.
        let kg = short_ton_to_kg(0.00426774);
        assert!((kg - 3.8716297118999994).abs() < 1e-9);
    }
}
