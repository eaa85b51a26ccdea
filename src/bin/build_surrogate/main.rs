//! CLI entry point: build a single spatial surrogate from a SMOKE-format
//! shapefile pair (or an OSM spec, behind the `osm` feature) and print its
//! gridded weights.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use error_stack::ResultExt;
use geo::Polygon;
use thiserror::Error;

use emis_rs::grid::GridDefinition;
use emis_rs::logging::init_logging;
use emis_rs::surrogate::builder::{FeatureGeometry, SourceLocation, WeightFeature};
use emis_rs::surrogate::cache::SurrogateCache;
use emis_rs::surrogate::spec::{parse_smoke_spec_file, SurrogateSpec};
use emis_rs::surrogate::surrogate;

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to parse surrogate spec file {0}")]
    SpecParse(PathBuf),
    #[error("surrogate code {0} not found in spec file")]
    UnknownCode(String),
    #[error("failed to read shapefile {0}")]
    Shapefile(PathBuf),
    #[error("no source polygon found for attribute value {0}")]
    NoSourcePolygon(String),
    #[error("surrogate build failed")]
    Build,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Build one spatial surrogate and print its gridded weights")]
struct Args {
    /// SMOKE-format surrogate spec CSV.
    spec_file: PathBuf,

    /// Surrogate code to build (matches the `code` column of the spec file).
    #[arg(long)]
    code: String,

    /// Attribute value identifying the source polygon in the data shapefile.
    #[arg(long)]
    source_id: String,

    #[arg(long, default_value_t = 10)]
    nx: u32,
    #[arg(long, default_value_t = 10)]
    ny: u32,
    #[arg(long, default_value_t = 1.0)]
    dx: f64,
    #[arg(long, default_value_t = 1.0)]
    dy: f64,
    #[arg(long, default_value_t = 0.0)]
    origin_x: f64,
    #[arg(long, default_value_t = 0.0)]
    origin_y: f64,

    #[command(flatten)]
    verbosity: Verbosity<clap_verbosity_flag::InfoLevel>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbosity.log_level_filter());

    match driver(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn driver(args: Args) -> error_stack::Result<(), CliError> {
    let specs = parse_smoke_spec_file(&args.spec_file).change_context_lazy(|| CliError::SpecParse(args.spec_file.clone()))?;
    let spec = specs
        .into_iter()
        .find(|s| s.code() == args.code)
        .ok_or_else(|| CliError::UnknownCode(args.code.clone()))?;

    let grid = GridDefinition::regular("cli-grid", args.nx, args.ny, args.dx, args.dy, (args.origin_x, args.origin_y), "EPSG:4326");

    let source_polygon = load_source_polygon(&spec, &args.source_id)?;
    let source = SourceLocation { geometry: source_polygon, spatial_reference: "EPSG:4326".to_string(), name: args.source_id.clone() };

    let cache = SurrogateCache::new();
    let resolve_spec = |_name: &str| -> Option<SurrogateSpec> { None };
    let acquire = move |spec: &SurrogateSpec, _source: &SourceLocation| load_weight_features(spec);

    let result = surrogate(&spec, &grid, &source, &cache, &resolve_spec, &acquire)
        .map_err(|e| error_stack::Report::new(CliError::Build).attach_printable(e.to_string()))?;

    match result {
        None => println!("no surrogate cells for source {}", args.source_id),
        Some(data) => {
            for cell in data.normalized_cells() {
                println!("{},{},{:.8}", cell.row, cell.col, cell.weight);
            }
        }
    }

    Ok(())
}

/// Look up the source polygon from the SMOKE data shapefile by attribute
/// value, via a linear scan — the CLI is a one-off utility, not the hot path
/// the library's builder is optimized for.
fn load_source_polygon(spec: &SurrogateSpec, source_id: &str) -> error_stack::Result<Polygon<f64>, CliError> {
    let SurrogateSpec::Smoke(smoke) = spec else {
        return Err(error_stack::Report::new(CliError::NoSourcePolygon(source_id.to_string())));
    };

    let mut reader = shapefile::Reader::from_path(&smoke.data_shapefile).change_context_lazy(|| CliError::Shapefile(smoke.data_shapefile.clone()))?;

    for shape_record in reader.iter_shapes_and_records() {
        let (shape, record) = shape_record.change_context_lazy(|| CliError::Shapefile(smoke.data_shapefile.clone()))?;
        let Some(value) = record.get(&smoke.data_attribute) else { continue };
        if dbase_value_to_string(value) != source_id {
            continue;
        }
        if let Some(polygon) = shape_to_polygon(&shape) {
            return Ok(polygon);
        }
    }

    Err(error_stack::Report::new(CliError::NoSourcePolygon(source_id.to_string())))
}

fn load_weight_features(spec: &SurrogateSpec) -> Result<Vec<WeightFeature>, emis_rs::error::SurrogateError> {
    let SurrogateSpec::Smoke(smoke) = spec else {
        return Ok(vec![]);
    };

    let mut reader = shapefile::Reader::from_path(&smoke.weight_shapefile).map_err(|e| {
        emis_rs::error::SurrogateError::CouldNotRead(
            emis_rs::error::FileLocation::new(Some(smoke.weight_shapefile.as_path()), None, None::<String>),
            e.to_string(),
        )
    })?;

    let mut features = vec![];
    for shape_record in reader.iter_shapes_and_records() {
        let (shape, record) = shape_record.map_err(|e| {
            emis_rs::error::SurrogateError::Malformed(
                emis_rs::error::FileLocation::new(Some(smoke.weight_shapefile.as_path()), None, None::<String>),
                e.to_string(),
            )
        })?;

        if let Some(filter) = &smoke.filter_expr {
            let Some(value) = record.get(&filter.column) else { continue };
            if !filter.matches(&dbase_value_to_string(value)) {
                continue;
            }
        }

        let weight: f64 = smoke
            .weight_expr
            .iter()
            .map(|term| record.get(&term.name).map(|v| term.factor * dbase_value_to_f64(v)).unwrap_or(0.0))
            .sum::<f64>()
            .max(0.0);
        let weight = if smoke.weight_expr.is_empty() { 1.0 } else { weight };

        match &shape {
            shapefile::Shape::Polygon(_) => {
                if let Some(polygon) = shape_to_polygon(&shape) {
                    let area = geo::Area::unsigned_area(&polygon);
                    if area > 0.0 {
                        features.push(WeightFeature { geometry: FeatureGeometry::Polygon(polygon), density: weight / area });
                    }
                }
            }
            shapefile::Shape::Polyline(_) => {
                if let Some(line) = shape_to_line(&shape) {
                    let length = geo::EuclideanLength::euclidean_length(&line);
                    if length > 0.0 {
                        features.push(WeightFeature { geometry: FeatureGeometry::Line(line), density: weight / length });
                    }
                }
            }
            shapefile::Shape::Point(p) => {
                features.push(WeightFeature { geometry: FeatureGeometry::Point(geo::Point::new(p.x, p.y)), density: weight });
            }
            _ => continue,
        }
    }

    Ok(features)
}

fn shape_to_polygon(shape: &shapefile::Shape) -> Option<Polygon<f64>> {
    let shapefile::Shape::Polygon(poly) = shape else { return None };
    let ring = poly.rings().first()?;
    let coords: Vec<geo::Coord<f64>> = ring.points().iter().map(|p| geo::coord! { x: p.x, y: p.y }).collect();
    if coords.len() < 3 {
        return None;
    }
    Some(Polygon::new(coords.into(), vec![]))
}

fn shape_to_line(shape: &shapefile::Shape) -> Option<geo::LineString<f64>> {
    let shapefile::Shape::Polyline(line) = shape else { return None };
    let part = line.parts().first()?;
    let coords: Vec<geo::Coord<f64>> = part.iter().map(|p| geo::coord! { x: p.x, y: p.y }).collect();
    if coords.len() < 2 {
        return None;
    }
    Some(coords.into())
}

fn dbase_value_to_string(value: &shapefile::dbase::FieldValue) -> String {
    match value {
        shapefile::dbase::FieldValue::Character(Some(s)) => s.trim().to_string(),
        shapefile::dbase::FieldValue::Numeric(Some(n)) => n.to_string(),
        other => format!("{other:?}"),
    }
}

fn dbase_value_to_f64(value: &shapefile::dbase::FieldValue) -> f64 {
    match value {
        shapefile::dbase::FieldValue::Numeric(Some(n)) => *n,
        shapefile::dbase::FieldValue::Float(Some(f)) => *f as f64,
        shapefile::dbase::FieldValue::Character(Some(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
