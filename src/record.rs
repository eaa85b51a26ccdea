//! The record model: a tagged enum over every shape an inventory entry can
//! take, plus a capability trait giving uniform access to the fields every
//! variant shares.
use chrono::{DateTime, Utc};
use geo::{Point, Polygon};

use crate::emissions::{EmissionsContainer, Pollutant};
use crate::source::{ControlData, EconomicData, IdaControlData, PointSourceData, SourceData};
use crate::units::{Period, Quantity};

/// A point source reporting economic and control data (ORL point-with-control).
#[derive(Debug, Clone, PartialEq)]
pub struct PointWithEconControl {
    pub point: PointSourceData,
    pub economic: EconomicData,
    pub control: ControlData,
    pub emissions: EmissionsContainer,
}

/// A polygon (area) source reporting economic data but no control record.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonWithoutControl {
    pub source: SourceData,
    pub economic: EconomicData,
    pub emissions: EmissionsContainer,
}

/// A polygon (area) source reporting neither economic nor control data
/// (bare ORL area record).
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonWithoutEcon {
    pub source: SourceData,
    pub emissions: EmissionsContainer,
}

/// A gridded cell source: emissions already attributed to a specific grid
/// cell rather than a geographic polygon (e.g. biogenic or already-allocated
/// input).
#[derive(Debug, Clone, PartialEq)]
pub struct BasicGriddedCell {
    pub source: SourceData,
    pub row: u32,
    pub col: u32,
    /// The cell's footprint, `[lon-dlon/2, lon+dlon/2] x [lat-dlat/2, lat+dlat/2]`.
    pub polygon: Polygon<f64>,
    pub emissions: EmissionsContainer,
}

/// An IDA-format point source, whose control data is reported per pollutant
/// rather than once for the whole source.
#[derive(Debug, Clone, PartialEq)]
pub struct IdaPoint {
    pub point: PointSourceData,
    pub control: IdaControlData,
    pub emissions: EmissionsContainer,
}

/// An IDA-format polygon (area) source, per-pollutant control data.
#[derive(Debug, Clone, PartialEq)]
pub struct IdaPolygon {
    pub source: SourceData,
    pub control: IdaControlData,
    pub emissions: EmissionsContainer,
}

/// An IDA-format mobile-source record (road link or similar linear source).
#[derive(Debug, Clone, PartialEq)]
pub struct IdaMobile {
    pub source: SourceData,
    pub link_id: String,
    /// meters
    pub length: Quantity,
    pub control: IdaControlData,
    pub emissions: EmissionsContainer,
}

/// A supplemental record reporting day-of-week or day-specific overrides for
/// an otherwise monthly/annual source (FF10 daily point).
#[derive(Debug, Clone, PartialEq)]
pub struct SupplementalDailyPoint {
    pub point: PointSourceData,
    pub day_of_year: u32,
    pub emissions: EmissionsContainer,
}

/// Every shape an inventory record can take, unified by the [`RecordOps`]
/// capability trait below rather than a shared base struct or trait-object
/// hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    PointWithEconControl(PointWithEconControl),
    PolygonWithoutControl(PolygonWithoutControl),
    PolygonWithoutEcon(PolygonWithoutEcon),
    BasicGriddedCell(BasicGriddedCell),
    IdaPoint(IdaPoint),
    IdaPolygon(IdaPolygon),
    IdaMobile(IdaMobile),
    SupplementalDailyPoint(SupplementalDailyPoint),
}

/// Where a record sits geographically. Point and IDA-point sources carry a
/// coordinate; gridded cells carry the polygon computed from their grid
/// spacing. Area/polygon and mobile sources carry no geometry anywhere in
/// the data model (`SourceData` has none), so they're located by FIPS code
/// alone — callers needing their extent resolve it via a surrogate instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
    Fips(String),
}

/// Uniform accessors over every [`Record`] variant, dispatched with a single
/// `match` rather than per-variant trait objects.
pub trait RecordOps {
    fn key(&self) -> String;
    fn fips(&self) -> &str;
    fn scc(&self) -> &str;
    fn country(&self) -> &str;
    fn emissions(&self) -> &EmissionsContainer;
    fn emissions_mut(&mut self) -> &mut EmissionsContainer;
    fn location(&self) -> Location;

    fn totals(&self, pollutant: &Pollutant) -> Option<Quantity> {
        self.emissions().totals(pollutant)
    }

    fn period_totals(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> indexmap::IndexMap<Pollutant, Quantity> {
        self.emissions().period_totals(begin, end)
    }

    /// Merge `other`'s emissions into `self`. Panics (debug only) if `other`
    /// is a different concrete variant or has a different source key; callers
    /// are expected to have grouped records by key before combining.
    fn combine(&mut self, other: &Record);
}

impl RecordOps for Record {
    fn key(&self) -> String {
        match self {
            Record::PointWithEconControl(r) => r.point.source.key(),
            Record::PolygonWithoutControl(r) => r.source.key(),
            Record::PolygonWithoutEcon(r) => r.source.key(),
            Record::BasicGriddedCell(r) => r.source.key(),
            Record::IdaPoint(r) => r.point.source.key(),
            Record::IdaPolygon(r) => r.source.key(),
            Record::IdaMobile(r) => r.source.key(),
            Record::SupplementalDailyPoint(r) => r.point.source.key(),
        }
    }

    fn fips(&self) -> &str {
        match self {
            Record::PointWithEconControl(r) => &r.point.source.fips,
            Record::PolygonWithoutControl(r) => &r.source.fips,
            Record::PolygonWithoutEcon(r) => &r.source.fips,
            Record::BasicGriddedCell(r) => &r.source.fips,
            Record::IdaPoint(r) => &r.point.source.fips,
            Record::IdaPolygon(r) => &r.source.fips,
            Record::IdaMobile(r) => &r.source.fips,
            Record::SupplementalDailyPoint(r) => &r.point.source.fips,
        }
    }

    fn scc(&self) -> &str {
        match self {
            Record::PointWithEconControl(r) => &r.point.source.scc,
            Record::PolygonWithoutControl(r) => &r.source.scc,
            Record::PolygonWithoutEcon(r) => &r.source.scc,
            Record::BasicGriddedCell(r) => &r.source.scc,
            Record::IdaPoint(r) => &r.point.source.scc,
            Record::IdaPolygon(r) => &r.source.scc,
            Record::IdaMobile(r) => &r.source.scc,
            Record::SupplementalDailyPoint(r) => &r.point.source.scc,
        }
    }

    fn country(&self) -> &str {
        match self {
            Record::PointWithEconControl(r) => &r.point.source.country,
            Record::PolygonWithoutControl(r) => &r.source.country,
            Record::PolygonWithoutEcon(r) => &r.source.country,
            Record::BasicGriddedCell(r) => &r.source.country,
            Record::IdaPoint(r) => &r.point.source.country,
            Record::IdaPolygon(r) => &r.source.country,
            Record::IdaMobile(r) => &r.source.country,
            Record::SupplementalDailyPoint(r) => &r.point.source.country,
        }
    }

    fn emissions(&self) -> &EmissionsContainer {
        match self {
            Record::PointWithEconControl(r) => &r.emissions,
            Record::PolygonWithoutControl(r) => &r.emissions,
            Record::PolygonWithoutEcon(r) => &r.emissions,
            Record::BasicGriddedCell(r) => &r.emissions,
            Record::IdaPoint(r) => &r.emissions,
            Record::IdaPolygon(r) => &r.emissions,
            Record::IdaMobile(r) => &r.emissions,
            Record::SupplementalDailyPoint(r) => &r.emissions,
        }
    }

    fn emissions_mut(&mut self) -> &mut EmissionsContainer {
        match self {
            Record::PointWithEconControl(r) => &mut r.emissions,
            Record::PolygonWithoutControl(r) => &mut r.emissions,
            Record::PolygonWithoutEcon(r) => &mut r.emissions,
            Record::BasicGriddedCell(r) => &mut r.emissions,
            Record::IdaPoint(r) => &mut r.emissions,
            Record::IdaPolygon(r) => &mut r.emissions,
            Record::IdaMobile(r) => &mut r.emissions,
            Record::SupplementalDailyPoint(r) => &mut r.emissions,
        }
    }

    fn combine(&mut self, other: &Record) {
        debug_assert_eq!(
            std::mem::discriminant(self),
            std::mem::discriminant(other),
            "combine requires matching record variants"
        );
        debug_assert_eq!(self.key(), other.key(), "combine requires matching source keys");
        self.emissions_mut().combine(other.emissions());
    }

    fn location(&self) -> Location {
        match self {
            Record::PointWithEconControl(r) => Location::Point(Point::new(r.point.x, r.point.y)),
            Record::PolygonWithoutControl(r) => Location::Fips(r.source.fips.clone()),
            Record::PolygonWithoutEcon(r) => Location::Fips(r.source.fips.clone()),
            Record::BasicGriddedCell(r) => Location::Polygon(r.polygon.clone()),
            Record::IdaPoint(r) => Location::Point(Point::new(r.point.x, r.point.y)),
            Record::IdaPolygon(r) => Location::Fips(r.source.fips.clone()),
            Record::IdaMobile(r) => Location::Fips(r.source.fips.clone()),
            Record::SupplementalDailyPoint(r) => Location::Point(Point::new(r.point.x, r.point.y)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceType;

    fn polygon(scc: &str, value: f64) -> Record {
        let mut emissions = EmissionsContainer::new(2016);
        emissions.add(Period::Annual, Pollutant::new("VOC"), Quantity::rate_kg_per_s(value));
        Record::PolygonWithoutEcon(PolygonWithoutEcon {
            source: SourceData::new("37183", scc, SourceType::Area, "US"),
            emissions,
        })
    }

    #[test]
    fn combine_sums_mass_conservatively() {
        let mut a = polygon("10100602", 1.0);
        let b = polygon("10100602", 2.0);
        a.combine(&b);
        let (begin, end) = Period::Annual.time_interval(2016);
        let seconds = (end - begin).num_seconds() as f64;
        assert_eq!(a.totals(&Pollutant::new("VOC")).unwrap().value, 3.0 * seconds);
    }

    #[test]
    fn key_matches_underlying_source() {
        let r = polygon("10100602", 1.0);
        assert_eq!(r.key(), SourceData::new("37183", "10100602", SourceType::Area, "US").key());
    }
}
