//! OSM surrogate acquisition: extract features matching a tag set from a
//! `.osm.pbf` file, keep only the dominant geometry type among the matches,
//! and assign each a constant weight. Gated behind the `osm` Cargo feature
//! since it pulls in `osmpbf`.
use std::collections::HashMap;

use geo::{LineString, Point, Polygon};
use osmpbf::{Element, ElementReader};

use crate::error::{FileLocation, SurrogateError};
use crate::surrogate::builder::{FeatureGeometry, WeightFeature};
use crate::surrogate::spec::OsmSurrogate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Point,
    Line,
    Polygon,
}

fn matches_tags(spec: &OsmSurrogate, mut tags: impl Iterator<Item = (String, String)>) -> bool {
    if spec.tags.is_empty() {
        return true;
    }
    tags.any(|(k, v)| spec.tags.get(&k).is_some_and(|want| want == &v))
}

/// Extract weight features from `spec.osm_file`: every node, open way, and
/// closed way whose tags match `spec.tags`, classified as point/line/polygon
/// respectively. Only the most common of those three kinds among the matches
/// is kept (the spec's "dominant geometry type" rule); the rest are dropped.
pub fn acquire_features_osm(spec: &OsmSurrogate) -> Result<Vec<WeightFeature>, SurrogateError> {
    let open = || {
        ElementReader::from_path(&spec.osm_file)
            .map_err(|e| SurrogateError::CouldNotRead(FileLocation::new(Some(spec.osm_file.as_path()), None, None::<String>), e.to_string()))
    };

    // Pass 1: every node's coordinates, needed to resolve way geometries
    // regardless of whether the node itself carries matching tags.
    let mut node_coords: HashMap<i64, (f64, f64)> = HashMap::new();
    open()?
        .for_each(|el| match el {
            Element::Node(n) => {
                node_coords.insert(n.id(), (n.lon(), n.lat()));
            }
            Element::DenseNode(n) => {
                node_coords.insert(n.id(), (n.lon(), n.lat()));
            }
            _ => {}
        })
        .map_err(|e| SurrogateError::Malformed(FileLocation::new(Some(spec.osm_file.as_path()), None, None::<String>), e.to_string()))?;

    let mut points = Vec::new();
    let mut lines = Vec::new();
    let mut polygons = Vec::new();

    open()?
        .for_each(|el| match el {
            Element::Node(n) => {
                if matches_tags(spec, n.tags().map(|(k, v)| (k.to_string(), v.to_string()))) {
                    points.push(Point::new(n.lon(), n.lat()));
                }
            }
            Element::DenseNode(n) => {
                if matches_tags(spec, n.tags().map(|(k, v)| (k.to_string(), v.to_string()))) {
                    points.push(Point::new(n.lon(), n.lat()));
                }
            }
            Element::Way(w) => {
                if !matches_tags(spec, w.tags().map(|(k, v)| (k.to_string(), v.to_string()))) {
                    return;
                }
                let coords: Vec<(f64, f64)> = w.refs().filter_map(|id| node_coords.get(&id).copied()).collect();
                if coords.len() < 2 {
                    return;
                }
                if coords.len() >= 4 && coords.first() == coords.last() {
                    polygons.push(Polygon::new(coords.into(), vec![]));
                } else {
                    lines.push(LineString::from(coords));
                }
            }
            Element::Relation(_) => {}
        })
        .map_err(|e| SurrogateError::Malformed(FileLocation::new(Some(spec.osm_file.as_path()), None, None::<String>), e.to_string()))?;

    let dominant = [(Kind::Point, points.len()), (Kind::Line, lines.len()), (Kind::Polygon, polygons.len())]
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(kind, _)| kind)
        .unwrap_or(Kind::Point);

    let weight = spec.tag_multiplier;
    let features = match dominant {
        Kind::Point => points.into_iter().map(|p| WeightFeature { geometry: FeatureGeometry::Point(p), density: weight }).collect(),
        Kind::Line => lines.into_iter().map(|l| WeightFeature { geometry: FeatureGeometry::Line(l), density: weight }).collect(),
        Kind::Polygon => polygons.into_iter().map(|p| WeightFeature { geometry: FeatureGeometry::Polygon(p), density: weight }).collect(),
    };

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec_with_tags(tags: &[(&str, &str)]) -> OsmSurrogate {
        OsmSurrogate {
            region: "US".into(),
            name: "rail".into(),
            code: "200".into(),
            osm_file: PathBuf::new(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            tag_multiplier: 1.0,
            backup_surrogate_names: vec![],
            merge_names: vec![],
            merge_multipliers: vec![],
        }
    }

    #[test]
    fn empty_tag_filter_matches_everything() {
        let spec = spec_with_tags(&[]);
        assert!(matches_tags(&spec, std::iter::empty()));
    }

    #[test]
    fn matching_tag_value_passes_the_filter() {
        let spec = spec_with_tags(&[("railway", "rail")]);
        let tags = vec![("railway".to_string(), "rail".to_string())];
        assert!(matches_tags(&spec, tags.into_iter()));
    }

    #[test]
    fn mismatched_tag_value_fails_the_filter() {
        let spec = spec_with_tags(&[("railway", "rail")]);
        let tags = vec![("railway".to_string(), "subway".to_string())];
        assert!(!matches_tags(&spec, tags.into_iter()));
    }

    #[test]
    fn unrelated_keys_do_not_match() {
        let spec = spec_with_tags(&[("railway", "rail")]);
        let tags = vec![("highway".to_string(), "primary".to_string())];
        assert!(!matches_tags(&spec, tags.into_iter()));
    }
}
