//! Boundary Geometry Module
//! Postcode sector polygons read from a GeoJSON FeatureCollection.

use crate::data::loader::LoaderError;
use crate::data::model::PriceRecord;
use geojson::{Feature, FeatureCollection, GeoJson};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Sector polygons of one region keyed by sector name.
#[derive(Debug, Clone)]
pub struct BoundarySet {
    key: String,
    features: BTreeMap<String, Feature>,
}

impl BoundarySet {
    pub fn load(path: &Path, key: &str) -> Result<Self, LoaderError> {
        if !path.is_file() {
            return Err(LoaderError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| LoaderError::parse(path, e))?;
        let reader = BufReader::new(file);

        // Whole file in memory; regional sector files are small
        let geojson = GeoJson::from_reader(reader).map_err(|e| LoaderError::parse(path, e))?;

        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => {
                return Err(LoaderError::parse(
                    path,
                    "boundary file must be a FeatureCollection",
                ))
            }
        };

        Ok(Self::from_collection(collection, key))
    }

    /// Index features by the `key` property. Features without a usable
    /// name are skipped, and the first feature wins on duplicates.
    pub fn from_collection(collection: FeatureCollection, key: &str) -> Self {
        let mut features = BTreeMap::new();
        let mut skipped = 0usize;

        for feature in collection.features {
            let id_val = feature
                .properties
                .as_ref()
                .and_then(|props| props.get(key));

            let id = match id_val {
                Some(serde_json::Value::String(s)) => s.trim().to_string(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            if feature.geometry.is_none() || features.contains_key(&id) {
                skipped += 1;
                continue;
            }
            features.insert(id, feature);
        }

        if skipped > 0 {
            debug!("Skipped {} boundary features without a usable '{}'", skipped, key);
        }

        Self {
            key: key.to_string(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, sector: &str) -> bool {
        self.features.contains_key(sector)
    }

    /// Plotly-style path to the join property.
    pub fn feature_id_key(&self) -> String {
        format!("properties.{}", self.key)
    }

    /// Keep the records whose sector has a polygon; returns the kept rows
    /// and the number dropped.
    pub fn join<'a>(&self, records: &[&'a PriceRecord]) -> (Vec<&'a PriceRecord>, usize) {
        let (kept, dropped): (Vec<&PriceRecord>, Vec<&PriceRecord>) = records
            .iter()
            .copied()
            .partition(|r| self.contains(r.sector()));
        (kept, dropped.len())
    }

    /// FeatureCollection holding only the named sectors, in the order given.
    pub fn subset<'a>(&self, sectors: impl IntoIterator<Item = &'a str>) -> FeatureCollection {
        let mut seen = std::collections::BTreeSet::new();
        let features = sectors
            .into_iter()
            .filter(|s| seen.insert(*s))
            .filter_map(|s| self.features.get(s).cloned())
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// A square sector polygon around (lon, lat).
    pub(crate) fn square_feature(name: &str, lon: f64, lat: f64) -> String {
        let d = 0.01;
        format!(
            r#"{{"type":"Feature","properties":{{"name":"{name}"}},"geometry":{{"type":"Polygon","coordinates":[[[{a},{b}],[{c},{b}],[{c},{e}],[{a},{e}],[{a},{b}]]]}}}}"#,
            name = name,
            a = lon - d,
            b = lat - d,
            c = lon + d,
            e = lat + d,
        )
    }

    pub(crate) fn collection(features: &[String]) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    fn record(sector: &str) -> PriceRecord {
        PriceRecord {
            region: "London".into(),
            postcode_sector: Some(sector.into()),
            year: 2022,
            avg_price: Some(1.0),
            volume: None,
            property_type: None,
            delta: None,
        }
    }

    fn write(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("London_postcode_sectors.geojson");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_indexes_by_name() {
        let (_dir, path) = write(&collection(&[
            square_feature("E1 6", -0.07, 51.52),
            square_feature("E1 7", -0.06, 51.51),
        ]));
        let set = BoundarySet::load(&path, "name").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("E1 6"));
        assert!(!set.contains("E1 8"));
        assert_eq!(set.feature_id_key(), "properties.name");
    }

    #[test]
    fn test_join_drops_unmatched_sectors() {
        let (_dir, path) = write(&collection(&[square_feature("E1 6", -0.07, 51.52)]));
        let set = BoundarySet::load(&path, "name").unwrap();

        let rows = vec![record("E1 6"), record("ZZ9 9")];
        let refs: Vec<&PriceRecord> = rows.iter().collect();
        let (kept, dropped) = set.join(&refs);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sector(), "E1 6");
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_subset_keeps_order_and_skips_unknown() {
        let (_dir, path) = write(&collection(&[
            square_feature("A", 0.0, 51.0),
            square_feature("B", 0.1, 51.0),
        ]));
        let set = BoundarySet::load(&path, "name").unwrap();
        let fc = set.subset(["B", "missing", "A", "B"]);
        let names: Vec<String> = fc
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_non_collection_is_parse_error() {
        let (_dir, path) = write(&square_feature("A", 0.0, 51.0));
        let err = BoundarySet::load(&path, "name").unwrap_err();
        assert!(matches!(err, LoaderError::Parse { .. }));
    }

    #[test]
    fn test_missing_boundary_file() {
        let err = BoundarySet::load(Path::new("/nonexistent/x.geojson"), "name").unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }
}
