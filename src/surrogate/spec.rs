//! Surrogate specification parsing: the SMOKE-format CSV and OSM-format JSON
//! shapes, their weight/filter/merge mini-expression languages, and the
//! FIPS+SCC -> surrogate-code grid reference lookup.
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SurrogateError;
use crate::source::{normalize_fips, normalize_scc};

/// One term of a weight or merge expression: an optional multiplicative
/// factor applied to a named column (weight expressions) or a named
/// surrogate (merge expressions).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTerm {
    pub factor: f64,
    pub name: String,
}

/// `(factor *)? column (+ (factor *)? column)*`
pub fn parse_weight_expr(expr: &str) -> Result<Vec<WeightedTerm>, SurrogateError> {
    parse_weighted_terms(expr)
}

/// `factor * name (+ factor * name)*`
pub fn parse_merge_expr(expr: &str) -> Result<Vec<WeightedTerm>, SurrogateError> {
    parse_weighted_terms(expr)
}

fn parse_weighted_terms(expr: &str) -> Result<Vec<WeightedTerm>, SurrogateError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(vec![]);
    }
    let mut terms = vec![];
    for part in expr.split('+') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        terms.push(match part.split_once('*') {
            Some((factor_str, name)) => {
                let factor = factor_str.trim().parse::<f64>().map_err(|_| {
                    SurrogateError::Malformed(
                        crate::error::FileLocation::default(),
                        format!("could not parse weight factor '{}'", factor_str.trim()),
                    )
                })?;
                WeightedTerm { factor, name: name.trim().to_string() }
            }
            None => WeightedTerm { factor: 1.0, name: part.to_string() },
        });
    }
    Ok(terms)
}

/// `column (= | !=) v1, v2, ...`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub column: String,
    pub negate: bool,
    pub values: Vec<String>,
}

impl FilterExpr {
    pub fn matches(&self, value: &str) -> bool {
        let found = self.values.iter().any(|v| v == value);
        found != self.negate
    }
}

pub fn parse_filter_expr(expr: &str) -> Result<Option<FilterExpr>, SurrogateError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(None);
    }
    let (column, rest, negate) = if let Some((c, r)) = expr.split_once("!=") {
        (c, r, true)
    } else if let Some((c, r)) = expr.split_once('=') {
        (c, r, false)
    } else {
        return Err(SurrogateError::Malformed(
            crate::error::FileLocation::default(),
            format!("filter expression '{expr}' has no = or !="),
        ));
    };
    let values = rest.split(',').map(|v| v.trim().to_string()).collect();
    Ok(Some(FilterExpr { column: column.trim().to_string(), negate, values }))
}

/// A SMOKE-format surrogate: a data shapefile (the source polygons) and a
/// weight shapefile (the features to overlay), with optional filter/weight
/// expressions.
#[derive(Debug, Clone)]
pub struct SmokeSurrogate {
    pub region: String,
    pub code: String,
    pub name: String,
    pub data_shapefile: PathBuf,
    pub data_attribute: String,
    pub weight_shapefile: PathBuf,
    pub weight_attribute: String,
    pub weight_expr: Vec<WeightedTerm>,
    pub filter_expr: Option<FilterExpr>,
    pub backup_names: Vec<String>,
    pub merge_names: Vec<String>,
    pub merge_multipliers: Vec<f64>,
    pub details: String,
}

/// An OSM-format surrogate: an extract file plus a tag filter selecting the
/// features to use as weights.
#[derive(Debug, Clone, Deserialize)]
pub struct OsmSurrogate {
    pub region: String,
    pub name: String,
    pub code: String,
    pub osm_file: PathBuf,
    pub tags: HashMap<String, String>,
    #[serde(default = "default_multiplier")]
    pub tag_multiplier: f64,
    #[serde(default)]
    pub backup_surrogate_names: Vec<String>,
    #[serde(default)]
    pub merge_names: Vec<String>,
    #[serde(default)]
    pub merge_multipliers: Vec<f64>,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Either concrete surrogate-spec shape, unified by the capability methods
/// below.
#[derive(Debug, Clone)]
pub enum SurrogateSpec {
    Smoke(SmokeSurrogate),
    Osm(OsmSurrogate),
}

impl SurrogateSpec {
    pub fn code(&self) -> &str {
        match self {
            SurrogateSpec::Smoke(s) => &s.code,
            SurrogateSpec::Osm(s) => &s.code,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            SurrogateSpec::Smoke(s) => &s.region,
            SurrogateSpec::Osm(s) => &s.region,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SurrogateSpec::Smoke(s) => &s.name,
            SurrogateSpec::Osm(s) => &s.name,
        }
    }

    pub fn backup_names(&self) -> &[String] {
        match self {
            SurrogateSpec::Smoke(s) => &s.backup_names,
            SurrogateSpec::Osm(s) => &s.backup_surrogate_names,
        }
    }

    pub fn merge_names(&self) -> &[String] {
        match self {
            SurrogateSpec::Smoke(s) => &s.merge_names,
            SurrogateSpec::Osm(s) => &s.merge_names,
        }
    }

    pub fn merge_multipliers(&self) -> &[f64] {
        match self {
            SurrogateSpec::Smoke(s) => &s.merge_multipliers,
            SurrogateSpec::Osm(s) => &s.merge_multipliers,
        }
    }

    /// True if this spec is a pure combinator (no weight feature acquisition
    /// of its own) deferring entirely to its merge list.
    pub fn is_merge_only(&self) -> bool {
        !self.merge_names().is_empty()
    }
}

/// Parse a SMOKE surrogate spec CSV: 14 fixed columns, `#`-comments,
/// trailing-comma tolerant.
pub fn parse_smoke_spec_file(path: &Path) -> Result<Vec<SurrogateSpec>, SurrogateError> {
    let file = File::open(path)
        .map_err(|e| SurrogateError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut specs = vec![];
    for (line_no, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            SurrogateError::Malformed(
                crate::error::FileLocation::new(Some(path), Some(line_no + 1), None::<String>),
                e.to_string(),
            )
        })?;
        if record.is_empty() {
            continue;
        }
        let get = |i: usize| record.get(i).unwrap_or("").trim().to_string();
        let backup_names: Vec<String> = (10..13).map(get).filter(|s| !s.is_empty()).collect();
        let weight_expr = parse_weight_expr(&get(6))?;
        let filter_expr = parse_filter_expr(&get(7))?;
        specs.push(SurrogateSpec::Smoke(SmokeSurrogate {
            region: get(0),
            name: get(1),
            code: get(2),
            data_shapefile: PathBuf::from(get(3)),
            data_attribute: get(4),
            weight_shapefile: PathBuf::from(get(5)),
            weight_attribute: get(6),
            weight_expr,
            filter_expr,
            backup_names,
            merge_names: vec![],
            merge_multipliers: vec![],
            details: get(13),
        }));
    }
    Ok(specs)
}

/// Parse an OSM surrogate spec JSON file: an array of surrogate objects.
pub fn parse_osm_spec_file(path: &Path) -> Result<Vec<SurrogateSpec>, SurrogateError> {
    let file = File::open(path)
        .map_err(|e| SurrogateError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
    let specs: Vec<OsmSurrogate> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| SurrogateError::Malformed(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
    Ok(specs.into_iter().map(SurrogateSpec::Osm).collect())
}

/// A loaded semicolon-delimited grid reference file: `FIPS;SCC;code` lines,
/// `#`/`!` comments. FIPS of length 6 carries a leading country digit.
#[derive(Debug, Clone, Default)]
pub struct GridReference {
    // (fips, scc) -> surrogate code
    entries: HashMap<(String, String), String>,
}

impl GridReference {
    pub fn load(path: &Path) -> Result<GridReference, SurrogateError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SurrogateError::CouldNotRead(crate::error::FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let parts: Vec<&str> = line.split(';').collect();
            if parts.len() < 3 {
                continue;
            }
            entries.insert((parts[0].trim().to_string(), parts[1].trim().to_string()), parts[2].trim().to_string());
        }
        Ok(GridReference { entries })
    }

    /// Look up `(scc, country, fips)`, relaxing SCC specificity in groups of
    /// three trailing zeroes, then relaxing FIPS, until a match is found —
    /// unless `require_full_scc` is set, in which case only FIPS is relaxed.
    pub fn lookup(&self, scc: &str, country: &str, fips: &str, require_full_scc: bool) -> Option<&str> {
        let fips = normalize_fips(fips);
        let fips_key = if fips.len() == 5 { format!("{country_digit}{fips}", country_digit = country_digit(country)) } else { fips.clone() };
        let scc = normalize_scc(scc);

        let scc_candidates: Vec<String> = if require_full_scc {
            vec![scc.clone()]
        } else {
            scc_relaxations(&scc)
        };

        for scc_candidate in &scc_candidates {
            for fips_candidate in fips_relaxations(&fips_key) {
                if let Some(code) = self.entries.get(&(fips_candidate.clone(), scc_candidate.clone())) {
                    return Some(code);
                }
            }
        }
        None
    }
}

fn country_digit(country: &str) -> &'static str {
    match country {
        "US" => "1",
        "CA" => "2",
        "MX" => "3",
        _ => "0",
    }
}

/// SCC progressively truncated in groups of three trailing zeros: full code,
/// then with the last 3 digits zeroed, and so on.
fn scc_relaxations(scc: &str) -> Vec<String> {
    let mut out = vec![scc.to_string()];
    let chars: Vec<char> = scc.chars().collect();
    let mut zeroed = chars.len();
    while zeroed >= 3 {
        zeroed -= 3;
        let mut relaxed: Vec<char> = chars[..zeroed].to_vec();
        relaxed.extend(std::iter::repeat('0').take(chars.len() - zeroed));
        out.push(relaxed.into_iter().collect());
    }
    out
}

/// FIPS progressively truncated from the right, replaced with zeros, down to
/// just the leading country digit + state.
fn fips_relaxations(fips: &str) -> Vec<String> {
    let mut out = vec![fips.to_string()];
    let chars: Vec<char> = fips.chars().collect();
    for keep in (1..chars.len()).rev() {
        let mut relaxed: Vec<char> = chars[..keep].to_vec();
        relaxed.extend(std::iter::repeat('0').take(chars.len() - keep));
        out.push(relaxed.into_iter().collect());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_expr_parses_single_column() {
        let terms = parse_weight_expr("POP2010").unwrap();
        assert_eq!(terms, vec![WeightedTerm { factor: 1.0, name: "POP2010".into() }]);
    }

    #[test]
    fn weight_expr_parses_factor_and_sum() {
        let terms = parse_weight_expr("0.5 * POP2010 + 2 * HOUSE2010").unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].factor, 0.5);
        assert_eq!(terms[1].name, "HOUSE2010");
    }

    #[test]
    fn filter_expr_parses_not_equal_list() {
        let f = parse_filter_expr("LANDUSE != WATER, WETLAND").unwrap().unwrap();
        assert!(f.negate);
        assert!(!f.matches("WATER"));
        assert!(f.matches("URBAN"));
    }

    #[test]
    fn scc_relaxations_strip_in_groups_of_three() {
        let r = scc_relaxations("2275020000");
        assert_eq!(r[0], "2275020000");
        assert!(r.contains(&"2275000000".to_string()));
    }
}
