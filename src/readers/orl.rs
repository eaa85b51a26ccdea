//! ORL (one-record-per-line) CSV reader: 16/30/37/70-column legacy EPA
//! inventory format, re-detected per file from the field count of the first
//! non-comment line.
use std::path::Path;

use crate::emissions::{EmissionsContainer, Pollutant};
use crate::error::{FileLocation, ParseError};
use crate::readers::{detect_orl_subformat, parse_emis_rate_annual, parse_optional_f64, OrlSubformat};
use crate::record::{PointWithEconControl, PolygonWithoutControl, PolygonWithoutEcon, Record};
use crate::source::{ControlData, EconomicData, PointSourceData, SourceData, SourceType};
use crate::units::{Dimensions, Period, Quantity};

const SECONDS_PER_YEAR: f64 = 31536000.0;

/// The `#COUNTRY`/`#YEAR` header metadata ORL files carry alongside their
/// `#DATA`/`#POLID` marker line.
#[derive(Debug, Clone, Default)]
struct OrlHeader {
    country: String,
    year: i32,
}

fn parse_header(path: &Path) -> Result<(OrlHeader, Vec<String>), ParseError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ParseError::CouldNotOpen(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;

    let mut header = OrlHeader::default();
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("#COUNTRY") {
            header.country = rest.trim_start_matches(['=', ' ']).trim().to_string();
        } else if let Some(rest) = line.strip_prefix("#YEAR") {
            header.year = rest.trim_start_matches(['=', ' ']).trim().parse().unwrap_or(0);
        } else if line.starts_with('#') {
            continue;
        } else if line.trim().is_empty() {
            continue;
        } else {
            data_lines.push(line.to_string());
        }
    }
    Ok((header, data_lines))
}

pub fn read_orl_file(path: &Path) -> Result<Vec<Record>, ParseError> {
    let (header, data_lines) = parse_header(path)?;
    let mut records = Vec::new();

    for (line_no, line) in data_lines.iter().enumerate() {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim_matches('"').trim()).collect();
        let subformat = detect_orl_subformat(fields.len()).ok_or_else(|| {
            ParseError::Malformed(
                FileLocation::new(Some(path), Some(line_no + 1), None::<String>),
                format!("unrecognized ORL field count {}", fields.len()),
            )
        })?;

        let record = match subformat {
            OrlSubformat::Point => parse_point_record(&fields, &header, path, line_no + 1)?,
            OrlSubformat::Nonpoint => parse_nonpoint_record(&fields, &header, path, line_no + 1)?,
            OrlSubformat::Nonroad | OrlSubformat::Mobile => parse_area_record(&fields, &header, path, line_no + 1)?,
        };
        records.push(record);
    }
    Ok(records)
}

/// Every ORL row ends with a repeating `(pollutant, ann, avd, ...)` block;
/// `first_pollutant_field` is the index of the first such group.
fn parse_pollutant_block(fields: &[&str], first_pollutant_field: usize) -> Vec<(Pollutant, f64)> {
    let mut out = Vec::new();
    let mut i = first_pollutant_field;
    while i + 2 < fields.len() {
        let name = fields[i];
        if name.is_empty() {
            break;
        }
        let ann = parse_optional_f64(fields[i + 1]);
        let avd = parse_optional_f64(fields[i + 2]);
        let rate = parse_emis_rate_annual(ann, avd, SECONDS_PER_YEAR);
        out.push((Pollutant::parse(name), rate));
        i += 3;
    }
    out
}

fn parse_point_record(fields: &[&str], header: &OrlHeader, path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if fields.len() < 40 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "point row too short".to_string()));
    }
    let fips = fields[0];
    let plant_id = fields[2];
    let point_id = fields[3];
    let stack_id = fields[4];
    let segment = fields[5];
    let scc = fields[6];
    let plant_name = fields[7];
    let stack_height = parse_optional_f64(fields[12]).unwrap_or(0.0);
    let stack_diameter = parse_optional_f64(fields[13]).unwrap_or(0.0);
    let stack_temperature = parse_optional_f64(fields[14]).unwrap_or(0.0);
    let stack_flow = parse_optional_f64(fields[15]);
    let stack_velocity = parse_optional_f64(fields[16]);
    let x = parse_optional_f64(fields[17]).unwrap_or(0.0);
    let y = parse_optional_f64(fields[18]).unwrap_or(0.0);
    let sic = fields.get(19).copied().unwrap_or("");
    let naics = fields.get(23).copied().unwrap_or("");

    let mut point = PointSourceData {
        source: SourceData::new(fips, scc, SourceType::Point, &header.country),
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

    let mut emissions = EmissionsContainer::new(header.year);
    for (pollutant, rate) in parse_pollutant_block(fields, 26) {
        emissions.add(Period::Annual, pollutant, Quantity::rate_kg_per_s(rate));
    }

    Ok(Record::PointWithEconControl(PointWithEconControl {
        point,
        economic: EconomicData::new(sic, naics),
        control: ControlData::from_optional(None, None, None, None),
        emissions,
    }))
}

fn parse_nonpoint_record(fields: &[&str], header: &OrlHeader, path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if fields.len() < 6 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "nonpoint row too short".to_string()));
    }
    let fips = fields[0];
    let scc = fields[2];
    let sic = fields.get(4).copied().unwrap_or("");
    let naics = fields.get(5).copied().unwrap_or("");

    let mut emissions = EmissionsContainer::new(header.year);
    for (pollutant, rate) in parse_pollutant_block(fields, 8) {
        emissions.add(Period::Annual, pollutant, Quantity::rate_kg_per_s(rate));
    }

    Ok(Record::PolygonWithoutControl(PolygonWithoutControl {
        source: SourceData::new(fips, scc, SourceType::Area, &header.country),
        economic: EconomicData::new(sic, naics),
        emissions,
    }))
}

fn parse_area_record(fields: &[&str], header: &OrlHeader, path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if fields.len() < 4 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "area row too short".to_string()));
    }
    let fips = fields[0];
    let scc = fields[2];

    let mut emissions = EmissionsContainer::new(header.year);
    for (pollutant, rate) in parse_pollutant_block(fields, 4) {
        emissions.add(Period::Annual, pollutant, Quantity::rate_kg_per_s(rate));
    }

    Ok(Record::PolygonWithoutEcon(PolygonWithoutEcon {
        source: SourceData::new(fips, scc, SourceType::Nonroad, &header.country),
        emissions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordOps;

    #[test]
    fn pollutant_block_converts_average_day_rate_matching_mobile_scenario() {
        // NAPHTH_72 = 0.00022282850000000001 ton/day -> 73.78353556196251 kg/yr.
        let ton_per_day = 0.00022282850000000001_f64;
        let kg_per_day = crate::units::short_ton_to_kg(ton_per_day);
        let rate = parse_emis_rate_annual(None, Some(kg_per_day), SECONDS_PER_YEAR);
        let total_kg = rate * SECONDS_PER_YEAR;
        assert!((total_kg - 73.78353556196251).abs() < 1e-6);
    }

    #[test]
    fn area_record_builds_polygon_without_econ() {
        let fields = vec!["37183", "", "0010100602", "US_annual", "NAPHTH_72", "1000", "-9", ""];
        let header = OrlHeader { country: "US".to_string(), year: 2016 };
        let record = parse_area_record(&fields, &header, Path::new("test.csv"), 1).unwrap();
        assert_eq!(record.scc(), "0010100602");
        assert!(record.totals(&Pollutant::new("NAPHTH_72")).is_some());
    }
}
