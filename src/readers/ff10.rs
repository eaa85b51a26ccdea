//! FF10 CSV reader: 77 columns (point), 46 (daily point), 45
//! (nonpoint/nonroad/onroad). A present monthly or daily block overrides the
//! annual total for the period(s) it covers; the annual total is the
//! fallback for periods the block doesn't report.
use std::path::Path;

use crate::emissions::{EmissionsContainer, Pollutant};
use crate::error::{FileLocation, ParseError};
use crate::readers::parse_optional_f64;
use crate::record::{PointWithEconControl, PolygonWithoutEcon, Record, SupplementalDailyPoint};
use crate::source::{ControlData, EconomicData, PointSourceData, SourceData, SourceType};
use crate::units::{Dimensions, Period, Quantity};

const SECONDS_PER_YEAR: f64 = 31536000.0;

/// Calendar year assumed for every FF10 file (no explicit year field exists
/// in the format); non-leap, matching the fixed 365-day constants below.
const REFERENCE_YEAR: i32 = 2017;

/// Days in each month of a non-leap calendar year, used to convert a FF10
/// monthly value into a rate.
const DAYS_IN_MONTH: [f64; 12] = [31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0];

fn seconds_in_month(month_index: usize) -> f64 {
    DAYS_IN_MONTH[month_index] * crate::units::SECONDS_PER_DAY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ff10Shape {
    Point,
    DailyPoint,
    Other,
}

fn shape_for(first_line: &str) -> Ff10Shape {
    let upper = first_line.to_ascii_uppercase();
    if upper.contains("FF10_DAILY_POINT") {
        Ff10Shape::DailyPoint
    } else if upper.contains("FF10_POINT") {
        Ff10Shape::Point
    } else {
        Ff10Shape::Other
    }
}

pub fn read_ff10_file(path: &Path) -> Result<Vec<Record>, ParseError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ParseError::CouldNotOpen(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
    let mut lines = text.lines();
    let first_line = lines.next().unwrap_or_default();
    let shape = shape_for(first_line);

    let data_lines: Vec<&str> = lines.filter(|l| !l.starts_with('#') && !l.trim().is_empty()).collect();

    let mut header_fields: Option<Vec<String>> = None;
    let mut records = Vec::new();

    for (line_no, line) in data_lines.iter().enumerate() {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim_matches('"').trim()).collect();
        if header_fields.is_none() {
            header_fields = Some(fields.iter().map(|s| s.to_ascii_uppercase()).collect());
            // The first data line here is a column-name line, not a record,
            // when it doesn't start with a numeric FIPS.
            if fields.first().map(|f| f.chars().next().map(|c| !c.is_ascii_digit()).unwrap_or(true)).unwrap_or(true) {
                continue;
            }
        }

        let record = match shape {
            Ff10Shape::Point => parse_point_record(&fields, path, line_no + 1)?,
            Ff10Shape::DailyPoint => parse_daily_point_record(&fields, path, line_no + 1)?,
            Ff10Shape::Other => parse_nonpoint_record(&fields, path, line_no + 1)?,
        };
        records.push(record);
    }
    Ok(records)
}

/// Resolve the active annual rate, given an annual total and up to 12
/// monthly totals. A present month overrides the annual/(365.25*86400)
/// fallback rate for that month only; months with no value fall back to the
/// annual average.
fn resolve_period_rates(annual_ton: Option<f64>, monthly_ton: &[Option<f64>; 12]) -> Vec<(Period, f64)> {
    let annual_kg = annual_ton.map(crate::units::short_ton_to_kg).unwrap_or(0.0);
    let has_monthly = monthly_ton.iter().any(|m| m.is_some());

    if !has_monthly {
        return vec![(Period::Annual, annual_kg / SECONDS_PER_YEAR)];
    }

    let fallback_rate = annual_kg / SECONDS_PER_YEAR;
    let mut out = Vec::with_capacity(12);
    for (i, value) in monthly_ton.iter().enumerate() {
        let period = Period::from_month_number((i + 1) as u32).expect("index 0..12 maps to a month");
        let rate = match value {
            Some(ton) => crate::units::short_ton_to_kg(*ton) / seconds_in_month(i),
            None => fallback_rate,
        };
        out.push((period, rate));
    }
    out
}

fn parse_point_record(fields: &[&str], path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if fields.len() < 20 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "FF10 point row too short".to_string()));
    }
    let country = fields[0];
    let fips = fields[1];
    let plant_id = fields[3];
    let point_id = fields[4];
    let stack_id = fields[5];
    let segment = fields[6];
    let scc = fields[8];
    let sic = fields.get(12).copied().unwrap_or("");
    let naics = fields.get(13).copied().unwrap_or("");
    let plant_name = fields.get(38).copied().unwrap_or("");
    let pollutant_name = fields.get(39).copied().unwrap_or("");
    let ann_value = parse_optional_f64(fields.get(40).copied().unwrap_or(""));

    let stack_height = parse_optional_f64(fields.get(29).copied().unwrap_or("")).unwrap_or(0.0);
    let stack_diameter = parse_optional_f64(fields.get(30).copied().unwrap_or("")).unwrap_or(0.0);
    let stack_temperature = parse_optional_f64(fields.get(31).copied().unwrap_or("")).unwrap_or(0.0);
    let stack_flow = parse_optional_f64(fields.get(32).copied().unwrap_or(""));
    let stack_velocity = parse_optional_f64(fields.get(33).copied().unwrap_or(""));
    let x = parse_optional_f64(fields.get(35).copied().unwrap_or("")).unwrap_or(0.0);
    let y = parse_optional_f64(fields.get(36).copied().unwrap_or("")).unwrap_or(0.0);

    // Monthly block: 12 columns immediately following the annual total in
    // the canonical 77-column layout.
    let monthly: [Option<f64>; 12] = std::array::from_fn(|i| fields.get(41 + i).and_then(|s| parse_optional_f64(s)));

    let mut point = PointSourceData {
        source: SourceData::new(fips, scc, SourceType::Point, country),
        plant_id: plant_id.to_string(),
        point_id: point_id.to_string(),
        stack_id: stack_id.to_string(),
        segment: segment.to_string(),
        plant_name: plant_name.to_string(),
        oris_facility_code: None,
        oris_boiler_code: None,
        stack_height: Quantity::new(crate::units::foot_to_meter(stack_height), Dimensions::LENGTH),
        stack_diameter: Quantity::new(crate::units::foot_to_meter(stack_diameter), Dimensions::LENGTH),
        stack_temperature: Quantity::new(crate::units::fahrenheit_to_kelvin(stack_temperature), Dimensions::DIMENSIONLESS),
        stack_flow: stack_flow.map(|f| Quantity::new(crate::units::cfs_to_cms(f), Dimensions::VOLUME_PER_TIME)),
        stack_velocity: stack_velocity.map(|v| Quantity::new(crate::units::fps_to_mps(v), Dimensions::LENGTH_PER_TIME)),
        x,
        y,
        spatial_reference: "EPSG:4326".to_string(),
    };
    point.derive_flow_or_velocity();

    let mut emissions = EmissionsContainer::new(REFERENCE_YEAR);
    let pollutant = Pollutant::parse(pollutant_name);
    for (period, rate) in resolve_period_rates(ann_value, &monthly) {
        emissions.add(period, pollutant.clone(), Quantity::rate_kg_per_s(rate));
    }

    Ok(Record::PointWithEconControl(PointWithEconControl {
        point,
        economic: EconomicData::new(sic, naics),
        control: ControlData::from_optional(None, None, None, None),
        emissions,
    }))
}

fn parse_nonpoint_record(fields: &[&str], path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if fields.len() < 15 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "FF10 nonpoint row too short".to_string()));
    }
    let country = fields[0];
    let fips = fields[1];
    let scc = fields[3];
    let pollutant_name = fields.get(5).copied().unwrap_or("");
    let ann_value = parse_optional_f64(fields.get(6).copied().unwrap_or(""));
    let monthly: [Option<f64>; 12] = std::array::from_fn(|i| fields.get(7 + i).and_then(|s| parse_optional_f64(s)));

    let mut emissions = EmissionsContainer::new(REFERENCE_YEAR);
    let pollutant = Pollutant::parse(pollutant_name);
    for (period, rate) in resolve_period_rates(ann_value, &monthly) {
        emissions.add(period, pollutant.clone(), Quantity::rate_kg_per_s(rate));
    }

    Ok(Record::PolygonWithoutEcon(PolygonWithoutEcon {
        source: SourceData::new(fips, scc, SourceType::Nonroad, country),
        emissions,
    }))
}

fn parse_daily_point_record(fields: &[&str], path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if fields.len() < 15 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "FF10 daily point row too short".to_string()));
    }
    let country = fields[0];
    let fips = fields[1];
    let plant_id = fields[3];
    let point_id = fields[4];
    let stack_id = fields[5];
    let segment = fields[6];
    let scc = fields[8];
    let pollutant_name = fields.get(9).copied().unwrap_or("");
    let day_of_year: u32 = fields.get(10).and_then(|s| s.parse().ok()).unwrap_or(1);
    let daily_ton = parse_optional_f64(fields.get(11).copied().unwrap_or(""));

    let point = PointSourceData {
        source: SourceData::new(fips, scc, SourceType::Point, country),
        plant_id: plant_id.to_string(),
        point_id: point_id.to_string(),
        stack_id: stack_id.to_string(),
        segment: segment.to_string(),
        plant_name: String::new(),
        oris_facility_code: None,
        oris_boiler_code: None,
        stack_height: Quantity::new(0.0, Dimensions::LENGTH),
        stack_diameter: Quantity::new(0.0, Dimensions::LENGTH),
        stack_temperature: Quantity::new(0.0, Dimensions::DIMENSIONLESS),
        stack_flow: None,
        stack_velocity: None,
        x: 0.0,
        y: 0.0,
        spatial_reference: "EPSG:4326".to_string(),
    };

    let mut emissions = EmissionsContainer::new(REFERENCE_YEAR);
    let rate = daily_ton.map(crate::units::short_ton_to_kg).unwrap_or(0.0) / crate::units::SECONDS_PER_DAY;
    emissions.add(Period::Cem, Pollutant::parse(pollutant_name), Quantity::rate_kg_per_s(rate));

    Ok(Record::SupplementalDailyPoint(SupplementalDailyPoint { point, day_of_year, emissions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pollutant_annual_scenario_matches_known_total() {
        let rates = resolve_period_rates(Some(0.00426774), &[None; 12]);
        assert_eq!(rates.len(), 1);
        let (period, rate) = rates[0];
        assert_eq!(period, Period::Annual);
        let total_kg = rate * SECONDS_PER_YEAR;
        assert!((total_kg - 3.8716297118999994).abs() < 1e-6);
    }

    #[test]
    fn monthly_distribution_scenario_matches_known_total() {
        let monthly = [Some(1.0); 12];
        let rates = resolve_period_rates(None, &monthly);
        assert_eq!(rates.len(), 12);
        let mut total_kg = 0.0;
        for (i, (_, rate)) in rates.iter().enumerate() {
            total_kg += rate * seconds_in_month(i);
        }
        assert!((total_kg - 10886.219999999996).abs() < 1e-6);
    }

    #[test]
    fn missing_month_falls_back_to_annual_average() {
        let mut monthly = [None; 12];
        monthly[0] = Some(1.0);
        let rates = resolve_period_rates(Some(12.0), &monthly);
        let annual_rate = crate::units::short_ton_to_kg(12.0) / SECONDS_PER_YEAR;
        assert!((rates[1].1 - annual_rate).abs() < 1e-12);
    }
}
