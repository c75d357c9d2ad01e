//! Catalog loading, normalization, and read-only queries.
//!
//! Three catalogs are loaded once at startup and are immutable afterwards:
//! campuses (campus -> building names), buildings (floor count, center
//! point, radius) and the flat restroom list. Field names in the JSON files
//! are an external contract with the data provider and are kept verbatim as
//! serde rename attributes.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Radius applied when a building record carries no usable radius.
pub const DEFAULT_BUILDING_RADIUS_M: f64 = 30.0;

/// Error type for catalog loading failures. Fatal to initialization: the
/// engine cannot operate without the catalogs.
#[derive(Debug)]
pub enum DataLoadError {
    FileRead(String),
    Parse(String),
    Validation(String),
}

impl std::fmt::Display for DataLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataLoadError::FileRead(msg) => write!(f, "Failed to read file: {}", msg),
            DataLoadError::Parse(msg) => write!(f, "Failed to parse JSON: {}", msg),
            DataLoadError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for DataLoadError {}

/// One campus with its ordered building list.
#[derive(Debug, Deserialize, Clone)]
pub struct CampusRecord {
    #[serde(rename = "校区")]
    pub campus: String,
    #[serde(rename = "楼宇")]
    pub buildings: Vec<String>,
}

/// Raw building record as found in the data feed. The center point is a
/// combined "lat, lng" string whose sub-parts may be swapped or padded with
/// whitespace; normalization happens at load time.
#[derive(Debug, Deserialize, Clone)]
pub struct BuildingRecord {
    #[serde(rename = "楼宇")]
    pub building: String,
    #[serde(rename = "总楼层数")]
    pub total_floors: u32,
    #[serde(rename = "中心经纬度", default)]
    pub center: Option<String>,
    #[serde(rename = "半径", default)]
    pub radius: Option<f64>,
}

/// Normalized building entry exposed by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub name: String,
    /// Defines the floor range `[1, total_floors]` offered for selection.
    /// Restroom records are allowed to carry floors outside this range.
    pub total_floors: u32,
    /// `(latitude, longitude)`; None when the source value was unusable.
    pub center: Option<(f64, f64)>,
    pub radius_m: f64,
}

/// One restroom record. Identity for matching and highlighting is the tuple
/// (campus, building, floor, attribute); there is no synthetic id.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Restroom {
    #[serde(rename = "校区")]
    pub campus: String,
    #[serde(rename = "楼宇")]
    pub building: String,
    #[serde(rename = "楼层")]
    pub floor: i32,
    #[serde(rename = "卫生间属性")]
    pub attribute: String,
    #[serde(rename = "附近的房间号", default)]
    pub nearby_room: Option<String>,
    #[serde(rename = "具体位置描述", default)]
    pub description: Option<String>,
    #[serde(rename = "备注", default)]
    pub notes: Option<String>,
    #[serde(rename = "经度", default)]
    pub longitude: Option<f64>,
    #[serde(rename = "纬度", default)]
    pub latitude: Option<f64>,
}

impl Restroom {
    /// `(latitude, longitude)` when both coordinates are present and finite.
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    /// Same (campus, building, floor) site; several records may share one.
    pub fn same_site(&self, other: &Restroom) -> bool {
        self.campus == other.campus && self.building == other.building && self.floor == other.floor
    }

    /// Full identity tuple including the attribute label.
    pub fn same_identity(&self, other: &Restroom) -> bool {
        self.same_site(other) && self.attribute == other.attribute
    }
}

/// In-memory, read-only snapshot of the three catalogs.
pub struct Catalog {
    campuses: Vec<CampusRecord>,
    buildings: Vec<Building>,
    restrooms: Vec<Restroom>,
}

impl Catalog {
    /// Load and normalize the three catalog files from a directory:
    /// `campuses.json`, `buildings.json`, `restrooms.json`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Catalog, DataLoadError> {
        let dir = dir.as_ref();
        let campuses: Vec<CampusRecord> = read_json(&dir.join("campuses.json"))?;
        let buildings: Vec<BuildingRecord> = read_json(&dir.join("buildings.json"))?;
        let restrooms: Vec<Restroom> = read_json(&dir.join("restrooms.json"))?;
        Catalog::from_records(campuses, buildings, restrooms)
    }

    /// Build a catalog from already-parsed records, applying the coordinate
    /// repair pass and validating structural invariants.
    pub fn from_records(
        campuses: Vec<CampusRecord>,
        buildings: Vec<BuildingRecord>,
        mut restrooms: Vec<Restroom>,
    ) -> Result<Catalog, DataLoadError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(buildings.len());
        for record in buildings {
            if !seen.insert(record.building.clone()) {
                return Err(DataLoadError::Validation(format!(
                    "Duplicate building name: {}",
                    record.building
                )));
            }
            if record.total_floors < 1 {
                return Err(DataLoadError::Validation(format!(
                    "Building {} has invalid floor count {}",
                    record.building, record.total_floors
                )));
            }

            let center = record.center.as_deref().and_then(parse_center);
            if center.is_none() {
                log::warn!("Building {} has no usable center point, excluded from proximity", record.building);
            }
            let radius_m = match record.radius {
                Some(r) if r.is_finite() && r > 0.0 => r,
                _ => DEFAULT_BUILDING_RADIUS_M,
            };

            normalized.push(Building {
                name: record.building,
                total_floors: record.total_floors,
                center,
                radius_m,
            });
        }

        // Soft invariant: campus lists may reference buildings the building
        // catalog does not know about. Tolerated, not an error.
        for campus in &campuses {
            for name in &campus.buildings {
                if !seen.contains(name) {
                    log::warn!("Campus {} references unknown building {}", campus.campus, name);
                }
            }
        }

        for restroom in &mut restrooms {
            repair_coordinates(restroom);
        }

        Ok(Catalog {
            campuses,
            buildings: normalized,
            restrooms,
        })
    }

    /// Ordered building names of a campus; empty for unknown campuses.
    pub fn buildings_of_campus(&self, campus: &str) -> &[String] {
        self.campuses
            .iter()
            .find(|c| c.campus == campus)
            .map(|c| c.buildings.as_slice())
            .unwrap_or(&[])
    }

    /// First campus (in catalog order) whose building list contains the name.
    pub fn campus_owning(&self, building: &str) -> Option<&str> {
        self.campuses
            .iter()
            .find(|c| c.buildings.iter().any(|b| b == building))
            .map(|c| c.campus.as_str())
    }

    pub fn building_info(&self, name: &str) -> Option<&Building> {
        self.buildings.iter().find(|b| b.name == name)
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    /// Restrooms of a building, optionally restricted to one floor,
    /// in catalog order.
    pub fn restrooms_on(&self, building: &str, floor: Option<i32>) -> Vec<&Restroom> {
        self.restrooms
            .iter()
            .filter(|r| r.building == building && floor.is_none_or(|f| r.floor == f))
            .collect()
    }

    pub fn all_restrooms(&self) -> &[Restroom] {
        &self.restrooms
    }

    /// First campus in catalog order, used by the manual-selection fallback.
    pub fn first_campus(&self) -> Option<&str> {
        self.campuses.first().map(|c| c.campus.as_str())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| DataLoadError::FileRead(e.to_string()))?;

    serde_json::from_str(&data)
        .with_context(|| format!("Invalid JSON in {}", path.display()))
        .map_err(|e| DataLoadError::Parse(e.to_string()))
}

/// Parse the combined center field. The canonical order is "lat, lng"; if
/// the first component cannot be a latitude while the second can, the pair
/// is treated as swapped (repairs known source inconsistencies).
fn parse_center(raw: &str) -> Option<(f64, f64)> {
    let mut parts = raw.split(',');
    let a: f64 = parts.next()?.trim().parse().ok()?;
    let b: f64 = parts.next()?.trim().parse().ok()?;
    if !a.is_finite() || !b.is_finite() {
        return None;
    }

    if !is_latitude(a) && is_latitude(b) {
        Some((b, a))
    } else {
        Some((a, b))
    }
}

fn is_latitude(value: f64) -> bool {
    (-90.0..=90.0).contains(&value)
}

/// Swap latitude/longitude on a restroom record when the stored latitude is
/// out of range while the longitude is not.
fn repair_coordinates(restroom: &mut Restroom) {
    if let (Some(lat), Some(lng)) = (restroom.latitude, restroom.longitude) {
        if !is_latitude(lat) && is_latitude(lng) {
            restroom.latitude = Some(lng);
            restroom.longitude = Some(lat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campus(name: &str, buildings: &[&str]) -> CampusRecord {
        CampusRecord {
            campus: name.to_string(),
            buildings: buildings.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn building(name: &str, floors: u32, center: Option<&str>, radius: Option<f64>) -> BuildingRecord {
        BuildingRecord {
            building: name.to_string(),
            total_floors: floors,
            center: center.map(|c| c.to_string()),
            radius,
        }
    }

    fn restroom(building: &str, floor: i32, attribute: &str, lat: Option<f64>, lng: Option<f64>) -> Restroom {
        Restroom {
            campus: "东区".to_string(),
            building: building.to_string(),
            floor,
            attribute: attribute.to_string(),
            nearby_room: None,
            description: None,
            notes: None,
            longitude: lng,
            latitude: lat,
        }
    }

    #[test]
    fn center_parsing_handles_whitespace_and_swapped_parts() {
        assert_eq!(parse_center(" 31.0263 , 121.4302 "), Some((31.0263, 121.4302)));
        // Swapped source value: longitude first.
        assert_eq!(parse_center("121.4302, 31.0263"), Some((31.0263, 121.4302)));
        assert_eq!(parse_center("garbage"), None);
        assert_eq!(parse_center("31.0"), None);
    }

    #[test]
    fn restroom_coordinate_repair_swaps_out_of_range_latitude() {
        let catalog = Catalog::from_records(
            vec![campus("东区", &["图书馆"])],
            vec![building("图书馆", 5, Some("31.0, 121.0"), None)],
            vec![restroom("图书馆", 2, "男厕", Some(121.5), Some(31.2))],
        )
        .unwrap();

        let r = &catalog.all_restrooms()[0];
        assert_eq!(r.latitude, Some(31.2));
        assert_eq!(r.longitude, Some(121.5));
        assert!(r.coords().is_some());
    }

    #[test]
    fn radius_defaults_when_missing_or_invalid() {
        let catalog = Catalog::from_records(
            vec![],
            vec![
                building("A", 3, Some("31.0,121.0"), None),
                building("B", 3, Some("31.0,121.0"), Some(-5.0)),
                building("C", 3, Some("31.0,121.0"), Some(45.0)),
            ],
            vec![],
        )
        .unwrap();

        assert_eq!(catalog.building_info("A").unwrap().radius_m, DEFAULT_BUILDING_RADIUS_M);
        assert_eq!(catalog.building_info("B").unwrap().radius_m, DEFAULT_BUILDING_RADIUS_M);
        assert_eq!(catalog.building_info("C").unwrap().radius_m, 45.0);
    }

    #[test]
    fn duplicate_building_names_are_rejected() {
        let result = Catalog::from_records(
            vec![],
            vec![building("A", 3, None, None), building("A", 4, None, None)],
            vec![],
        );
        assert!(matches!(result, Err(DataLoadError::Validation(_))));
    }

    #[test]
    fn zero_floor_building_is_rejected() {
        let result = Catalog::from_records(vec![], vec![building("A", 0, None, None)], vec![]);
        assert!(matches!(result, Err(DataLoadError::Validation(_))));
    }

    #[test]
    fn campus_queries_follow_catalog_order() {
        let catalog = Catalog::from_records(
            vec![campus("东区", &["图书馆", "一号楼"]), campus("西区", &["图书馆"])],
            vec![
                building("图书馆", 5, Some("31.0,121.0"), None),
                building("一号楼", 6, None, None),
            ],
            vec![
                restroom("图书馆", 2, "男厕", None, None),
                restroom("图书馆", 4, "女厕", None, None),
            ],
        )
        .unwrap();

        assert_eq!(catalog.buildings_of_campus("东区"), ["图书馆", "一号楼"]);
        assert!(catalog.buildings_of_campus("南区").is_empty());
        // First campus containing the building wins.
        assert_eq!(catalog.campus_owning("图书馆"), Some("东区"));
        assert_eq!(catalog.campus_owning("体育馆"), None);
        assert_eq!(catalog.restrooms_on("图书馆", None).len(), 2);
        assert_eq!(catalog.restrooms_on("图书馆", Some(4)).len(), 1);
        assert_eq!(catalog.first_campus(), Some("东区"));
    }
}
