//! IDA fixed-width reader. Record length is a linear function of the
//! pollutant count declared on the `#POLID`/`#DATA` header line: point
//! 249+52N, area 15+47N, mobile 25+20N.
use std::path::Path;

use crate::emissions::{EmissionsContainer, Pollutant};
use crate::error::{FileLocation, ParseError};
use crate::readers::{parse_emis_rate_annual, parse_optional_f64};
use crate::record::{IdaMobile, IdaPoint, IdaPolygon, Record};
use crate::source::{ControlData, IdaControlData, PointSourceData, SourceData, SourceType};
use crate::units::{Dimensions, Period, Quantity};

const SECONDS_PER_YEAR: f64 = 31536000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdaShape {
    Point,
    Area,
    Mobile,
}

impl IdaShape {
    fn base_len(self) -> usize {
        match self {
            IdaShape::Point => 249,
            IdaShape::Area => 15,
            IdaShape::Mobile => 25,
        }
    }

    fn stride(self) -> usize {
        match self {
            IdaShape::Point => 52,
            IdaShape::Area => 47,
            IdaShape::Mobile => 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct IdaHeader {
    country: String,
    year: i32,
    pollutants: Vec<String>,
    shape: Option<IdaShape>,
}

fn parse_header(path: &Path) -> Result<(IdaHeader, Vec<String>), ParseError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ParseError::CouldNotOpen(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;

    let mut header = IdaHeader::default();
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("#COUNTRY") {
            header.country = rest.trim_start_matches(['=', ' ']).trim().to_string();
        } else if let Some(rest) = line.strip_prefix("#YEAR") {
            header.year = rest.trim_start_matches(['=', ' ']).trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#POLID").or_else(|| line.strip_prefix("#DATA")) {
            header.pollutants = rest.trim_start_matches(['=', ' ']).split_whitespace().map(|s| s.to_string()).collect();
        } else if line.starts_with('#') {
            if line.to_ascii_uppercase().contains("POINT") {
                header.shape = Some(IdaShape::Point);
            } else if line.to_ascii_uppercase().contains("MOBILE") {
                header.shape = Some(IdaShape::Mobile);
            }
            continue;
        } else if line.trim().is_empty() {
            continue;
        } else {
            data_lines.push(line.to_string());
        }
    }
    Ok((header, data_lines))
}

/// Disambiguate the record shape (point/area/mobile) from a data line's
/// length against each shape's base+stride*N formula for the declared
/// pollutant count.
fn detect_shape(line_len: usize, npol: usize) -> Option<IdaShape> {
    for shape in [IdaShape::Point, IdaShape::Area, IdaShape::Mobile] {
        if shape.base_len() + shape.stride() * npol == line_len {
            return Some(shape);
        }
    }
    None
}

fn field(line: &str, start: usize, len: usize) -> String {
    line.chars().skip(start).take(len).collect::<String>().trim().to_string()
}

pub fn read_ida_file(path: &Path) -> Result<Vec<Record>, ParseError> {
    let (header, data_lines) = parse_header(path)?;
    let mut records = Vec::new();
    let npol = header.pollutants.len().max(1);

    for (line_no, line) in data_lines.iter().enumerate() {
        let shape = detect_shape(line.chars().count(), npol).ok_or_else(|| {
            ParseError::Malformed(
                FileLocation::new(Some(path), Some(line_no + 1), None::<String>),
                format!("record length {} does not match any IDA shape for {npol} pollutants", line.chars().count()),
            )
        })?;

        let record = match shape {
            IdaShape::Point => parse_point(line, &header, path, line_no + 1)?,
            IdaShape::Area => parse_area(line, &header, path, line_no + 1)?,
            IdaShape::Mobile => parse_mobile(line, &header, path, line_no + 1)?,
        };
        records.push(record);
    }
    Ok(records)
}

/// Parse the repeating per-pollutant block: `(annual, avg-day, c-eff,
/// r-eff[, r-pen])`, 52/47/20 characters wide depending on shape. The first
/// four sub-fields divide the stride evenly; whatever width is left over
/// (nonzero only for the area shape's 47-char stride) is the optional fifth
/// `r-pen` sub-field.
fn parse_pollutant_blocks(
    line: &str,
    header: &IdaHeader,
    base_len: usize,
    stride: usize,
) -> (EmissionsContainer, IdaControlData) {
    let mut emissions = EmissionsContainer::new(header.year);
    let mut control = IdaControlData::default();

    let field_width = stride / 4;
    let r_pen_width = stride - 4 * field_width;

    for (i, pollutant_name) in header.pollutants.iter().enumerate() {
        let block_start = base_len + i * stride;
        let ann = parse_optional_f64(&field(line, block_start, field_width));
        let avd = parse_optional_f64(&field(line, block_start + field_width, field_width));
        let c_eff = parse_optional_f64(&field(line, block_start + 2 * field_width, field_width));
        let r_eff = parse_optional_f64(&field(line, block_start + 3 * field_width, field_width));
        let r_pen = if r_pen_width > 0 {
            parse_optional_f64(&field(line, block_start + 4 * field_width, r_pen_width))
        } else {
            None
        };

        let rate = parse_emis_rate_annual(ann, avd, SECONDS_PER_YEAR);
        let pollutant = Pollutant::parse(pollutant_name);
        emissions.add(Period::Annual, pollutant.clone(), Quantity::rate_kg_per_s(rate));
        control.insert(&pollutant.to_string(), ControlData::from_optional(None, c_eff, r_eff, r_pen));
    }

    (emissions, control)
}

fn parse_point(line: &str, header: &IdaHeader, path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if line.chars().count() < 60 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "point record too short".to_string()));
    }
    let fips = field(line, 0, 5);
    let scc = field(line, 5, 10);
    let plant_id = field(line, 15, 15);
    let point_id = field(line, 30, 15);
    let stack_id = field(line, 45, 15);
    let plant_name = field(line, 60, 40);

    let point = PointSourceData {
        source: SourceData::new(&fips, &scc, SourceType::Point, &header.country),
        plant_id,
        point_id,
        stack_id,
        segment: String::new(),
        plant_name,
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

    let (emissions, control) = parse_pollutant_blocks(line, header, IdaShape::Point.base_len(), IdaShape::Point.stride());

    Ok(Record::IdaPoint(IdaPoint { point, control, emissions }))
}

fn parse_area(line: &str, header: &IdaHeader, path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if line.chars().count() < 15 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "area record too short".to_string()));
    }
    let fips = field(line, 0, 5);
    let scc = field(line, 5, 10);

    let (emissions, control) = parse_pollutant_blocks(line, header, IdaShape::Area.base_len(), IdaShape::Area.stride());

    Ok(Record::IdaPolygon(IdaPolygon {
        source: SourceData::new(&fips, &scc, SourceType::Area, &header.country),
        control,
        emissions,
    }))
}

fn parse_mobile(line: &str, header: &IdaHeader, path: &Path, line_no: usize) -> Result<Record, ParseError> {
    if line.chars().count() < 25 {
        return Err(ParseError::Malformed(FileLocation::new(Some(path), Some(line_no), None::<String>), "mobile record too short".to_string()));
    }
    let fips = field(line, 0, 5);
    let scc = field(line, 5, 10);
    let link_id = field(line, 15, 10);

    let (emissions, control) = parse_pollutant_blocks(line, header, IdaShape::Mobile.base_len(), IdaShape::Mobile.stride());

    Ok(Record::IdaMobile(IdaMobile {
        source: SourceData::new(&fips, &scc, SourceType::Mobile, &header.country),
        link_id,
        length: Quantity::new(0.0, Dimensions::LENGTH),
        control,
        emissions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_shape_matches_point_formula() {
        assert_eq!(detect_shape(249 + 52 * 3, 3), Some(IdaShape::Point));
        assert_eq!(detect_shape(15 + 47 * 2, 2), Some(IdaShape::Area));
        assert_eq!(detect_shape(25 + 20 * 1, 1), Some(IdaShape::Mobile));
    }

    #[test]
    fn detect_shape_rejects_unknown_length() {
        assert_eq!(detect_shape(12345, 3), None);
    }

    #[test]
    fn area_pollutant_block_parses_the_trailing_rule_penetration_field() {
        // Area stride is 47: four 11-char fields (ann, avd, c-eff, r-eff) plus
        // a trailing 3-char r-pen field.
        let block = format!("{:>11}{:>11}{:>11}{:>11}{:>3}", "100.0", "0.0", "90.0", "95.0", "80");
        let line = format!("{:<15}{block}", "123450010100602");
        let header = IdaHeader { country: "US".to_string(), year: 2016, pollutants: vec!["VOC".to_string()], shape: Some(IdaShape::Area) };

        let (_, control) = parse_pollutant_blocks(&line, &header, IdaShape::Area.base_len(), IdaShape::Area.stride());
        assert_eq!(control.get("VOC").rule_penetration, 80.0);
    }
}
