//! Multi-format inventory file readers: format auto-detection from the first
//! line, then dispatch to the ORL, IDA, FF10, or COARDS NetCDF parser.
pub mod ff10;
pub mod ida;
pub mod orl;

#[cfg(feature = "netcdf")]
pub mod coards;

use std::io::BufRead;
use std::path::Path;

use crate::error::ParseError;
use crate::record::Record;
use crate::utils::FileBuf;

/// The inventory format a file was detected as, by substring match on its
/// first line, per the legacy convention these formats share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryFormat {
    Orl,
    Ida,
    Ff10Point,
    Ff10DailyPoint,
    Ff10Nonpoint,
    Ff10Nonroad,
    Ff10Onroad,
    CoardsNetcdf,
}

/// Detect the format of an inventory file from its first line (or, for
/// NetCDF, its extension — NetCDF files are binary and carry no first-line
/// marker).
pub fn detect_format(path: &Path) -> Result<InventoryFormat, ParseError> {
    if path.extension().and_then(|e| e.to_str()) == Some("nc") {
        return Ok(InventoryFormat::CoardsNetcdf);
    }

    let mut f = FileBuf::open(path)?;
    let first_line = f.read_header_line()?;
    let upper = first_line.to_ascii_uppercase();

    if upper.contains("FF10_DAILY_POINT") {
        Ok(InventoryFormat::Ff10DailyPoint)
    } else if upper.contains("FF10_POINT") {
        Ok(InventoryFormat::Ff10Point)
    } else if upper.contains("FF10_NONPOINT") {
        Ok(InventoryFormat::Ff10Nonpoint)
    } else if upper.contains("FF10_NONROAD") {
        Ok(InventoryFormat::Ff10Nonroad)
    } else if upper.contains("FF10_ONROAD") {
        Ok(InventoryFormat::Ff10Onroad)
    } else if upper.contains("IDA") {
        Ok(InventoryFormat::Ida)
    } else if upper.contains("ORL") {
        Ok(InventoryFormat::Orl)
    } else {
        Err(ParseError::UnknownFormat(crate::error::FileLocation::new(Some(path), Some(1), None::<String>)))
    }
}

/// ORL sub-formats are re-detected from the field count of the first
/// non-comment data line, since the header line alone doesn't distinguish
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrlSubformat {
    Point,
    Nonpoint,
    Nonroad,
    Mobile,
}

pub fn detect_orl_subformat(field_count: usize) -> Option<OrlSubformat> {
    match field_count {
        70 => Some(OrlSubformat::Point),
        37 => Some(OrlSubformat::Nonpoint),
        30 => Some(OrlSubformat::Nonroad),
        16 => Some(OrlSubformat::Mobile),
        _ => None,
    }
}

/// Parse every record out of a single inventory file, dispatching on its
/// detected format.
pub fn read_records(path: &Path) -> Result<Vec<Record>, ParseError> {
    match detect_format(path)? {
        InventoryFormat::Orl => orl::read_orl_file(path),
        InventoryFormat::Ida => ida::read_ida_file(path),
        InventoryFormat::Ff10Point
        | InventoryFormat::Ff10DailyPoint
        | InventoryFormat::Ff10Nonpoint
        | InventoryFormat::Ff10Nonroad
        | InventoryFormat::Ff10Onroad => ff10::read_ff10_file(path),
        #[cfg(feature = "netcdf")]
        InventoryFormat::CoardsNetcdf => coards::read_coards_file(path),
        #[cfg(not(feature = "netcdf"))]
        InventoryFormat::CoardsNetcdf => Err(ParseError::UnknownFormat(crate::error::FileLocation::new(
            Some(path),
            None,
            Some("built without the netcdf feature"),
        ))),
    }
}

/// Shared rate-parsing rule: `ann / seconds_per_year` if `ann` is present and
/// positive, else `avd / seconds_per_day`, else 0. `-9` is the null token
/// used throughout ORL/IDA/FF10.
pub const NULL_TOKEN: &str = "-9";

pub fn parse_emis_rate_annual(ann: Option<f64>, avd: Option<f64>, seconds_per_year: f64) -> f64 {
    match (ann, avd) {
        (Some(ann), _) if ann > 0.0 => ann / seconds_per_year,
        (_, Some(avd)) if avd > 0.0 => avd / crate::units::SECONDS_PER_DAY,
        _ => 0.0,
    }
}

pub fn parse_optional_f64(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() || token == NULL_TOKEN {
        return None;
    }
    token.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orl_subformat_detects_point_by_field_count() {
        assert_eq!(detect_orl_subformat(70), Some(OrlSubformat::Point));
        assert_eq!(detect_orl_subformat(16), Some(OrlSubformat::Mobile));
        assert_eq!(detect_orl_subformat(99), None);
    }

    #[test]
    fn emis_rate_prefers_annual_over_average_day() {
        let rate = parse_emis_rate_annual(Some(31536.0), Some(1.0), 31536.0);
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn emis_rate_falls_back_to_average_day() {
        let rate = parse_emis_rate_annual(None, Some(86400.0), 31536000.0);
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn null_token_parses_as_none() {
        assert_eq!(parse_optional_f64("-9"), None);
        assert_eq!(parse_optional_f64("1.5"), Some(1.5));
    }
}
