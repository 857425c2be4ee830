//! Specification Normalizer — turns a loosely-typed design brief into a `DesignSpecification`.
//!
//! # Rules
//! - camelCase and snake_case keys are both accepted; output is always camelCase.
//! - Numeric strings are coerced (`"10"` → `10.0`).
//! - Missing optional fields get policy defaults (opening sizes, roof pitch, lock set).
//! - Implausible values are rejected; ALL problems are collected, not just the first.
//! - Unknown fields are kept in the `extensions` bag of the struct they appeared on.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::dna::hash::ContentHash;
use crate::dna::models::{
    DesignSpecification, Dimensions, Facade, Material, Opening, OpeningKind, Roof, RoofType, Room,
    DEFAULT_CONSISTENCY_RULES, LOCKABLE_PATHS,
};

const MIN_FLOOR_HEIGHT_M: f64 = 1.5;
const MAX_FLOOR_HEIGHT_M: f64 = 6.0;
const MAX_ROOF_PITCH_DEG: f64 = 75.0;
const DEFAULT_MIN_ROOM_WIDTH_M: f64 = 2.4;
const DEFAULT_HEX_COLOR: &str = "#808080";
const DEFAULT_APPLICATION: &str = "facade";
const DEFAULT_BUILDING_TYPE: &str = "residential";
const DEFAULT_STYLE: &str = "contemporary";
const MAX_DESIGN_ID_LEN: usize = 128;
/// Largest integer a JSON consumer can hold without precision loss.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A specification that failed validation. Always caller-recoverable.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid design specification: {}", issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

impl ValidationError {
    pub fn single(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

/// Normalizes a raw brief. Either every field is valid and defaulted, or every
/// problem found is reported.
pub fn normalize(raw: &Value) -> Result<DesignSpecification, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::single("specification must be a JSON object"))?;
    let raw_hash = ContentHash::of_value(raw);
    let mut issues = Vec::new();

    let id = match field(obj, &["id"]) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            issues.push("id must be a non-empty string".to_string());
            String::new()
        }
        None => format!("dna-{}", raw_hash.short()),
    };
    if !id.is_empty() && !is_valid_design_id(&id) {
        issues.push(format!(
            "id '{id}' may only contain letters, digits, '-', '_' and '.', must not start with '.' \
             and must be at most {MAX_DESIGN_ID_LEN} characters"
        ));
    }

    let seed = match field(obj, &["seed"]) {
        Some(v) => coerce_integer(v).unwrap_or_else(|| {
            issues.push("seed must be a non-negative integer".to_string());
            0
        }),
        None => seed_from_hash(&raw_hash),
    };

    let building_type = text_or(obj, &["buildingType", "building_type"], DEFAULT_BUILDING_TYPE);
    let style = text_or(obj, &["style"], DEFAULT_STYLE);

    let dimensions = normalize_dimensions(field(obj, &["dimensions"]), &mut issues);
    let materials = normalize_materials(field(obj, &["materials"]), &mut issues);
    let floors = dimensions.as_ref().map(|d| d.floors).unwrap_or(1);
    let rooms = normalize_rooms(field(obj, &["rooms"]), floors, &mut issues);
    let openings = normalize_openings(field(obj, &["openings"]), &mut issues);
    let default_roof_material = materials.first().map(|m| m.name.clone()).unwrap_or_default();
    let roof = normalize_roof(field(obj, &["roof"]), &default_roof_material, &mut issues);
    let consistency_rules = normalize_rules(
        field(obj, &["consistencyRules", "consistency_rules"]),
        &mut issues,
    );

    let extensions = collect_extensions(
        obj,
        &[
            "id",
            "seed",
            "buildingType",
            "building_type",
            "style",
            "dimensions",
            "materials",
            "rooms",
            "openings",
            "roof",
            "consistencyRules",
            "consistency_rules",
        ],
    );

    match (issues.is_empty(), dimensions) {
        (true, Some(dimensions)) => Ok(DesignSpecification {
            id,
            seed,
            building_type,
            style,
            dimensions,
            materials,
            rooms,
            openings,
            roof,
            consistency_rules,
            extensions,
        }),
        _ => Err(ValidationError { issues }),
    }
}

/// Design ids become one segment of a storage key, so separators and
/// dot-only names are refused.
pub fn is_valid_design_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_DESIGN_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Sets dotted-path overrides (`"roof.type"`, `"materials.0.hexColor"`) on a raw
/// specification object. Numeric segments index arrays.
pub fn apply_overrides(
    raw: &mut Value,
    overrides: &BTreeMap<String, Value>,
) -> Result<(), ValidationError> {
    let mut issues = Vec::new();
    for (path, value) in overrides {
        if let Err(issue) = set_path(raw, path, value.clone()) {
            issues.push(issue);
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Section normalizers
// ────────────────────────────────────────────────────────────────────────────

fn normalize_dimensions(value: Option<&Value>, issues: &mut Vec<String>) -> Option<Dimensions> {
    let Some(obj) = value.and_then(Value::as_object) else {
        issues.push("dimensions is required".to_string());
        return None;
    };

    let length = positive_number(obj, &["length"], "dimensions.length", issues);
    let width = positive_number(obj, &["width"], "dimensions.width", issues);
    let height = positive_number(obj, &["height"], "dimensions.height", issues);

    let floors = match field(obj, &["floors", "floorCount", "floor_count"]) {
        None => 1,
        Some(v) => match coerce_integer(v) {
            Some(f) if f >= 1 && f <= u32::MAX as u64 => f as u32,
            Some(_) => {
                issues.push("dimensions.floors must be >= 1".to_string());
                1
            }
            None => {
                issues.push("dimensions.floors must be an integer".to_string());
                1
            }
        },
    };

    if let Some(h) = height {
        let per_floor = h / floors as f64;
        if !(MIN_FLOOR_HEIGHT_M..=MAX_FLOOR_HEIGHT_M).contains(&per_floor) {
            issues.push(format!(
                "dimensions.height per floor is {} m; must be between {} and {} m",
                per_floor, MIN_FLOOR_HEIGHT_M, MAX_FLOOR_HEIGHT_M
            ));
        }
    }

    Some(Dimensions {
        length: length?,
        width: width?,
        height: height?,
        floors,
        extensions: collect_extensions(
            obj,
            &["length", "width", "height", "floors", "floorCount", "floor_count"],
        ),
    })
}

fn normalize_materials(value: Option<&Value>, issues: &mut Vec<String>) -> Vec<Material> {
    let items = match value.and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items,
        _ => {
            issues.push("materials must not be empty".to_string());
            return Vec::new();
        }
    };

    let mut materials = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            issues.push(format!("materials[{i}] must be an object"));
            continue;
        };
        let Some(name) = text(obj, &["name"]) else {
            issues.push(format!("materials[{i}].name is required"));
            continue;
        };
        let hex_color = match text(obj, &["hexColor", "hex_color", "hex", "color"]) {
            None => DEFAULT_HEX_COLOR.to_string(),
            Some(raw) => match normalize_hex(&raw) {
                Some(hex) => hex,
                None => {
                    issues.push(format!(
                        "materials[{i}].hexColor '{raw}' is not a valid hex colour"
                    ));
                    continue;
                }
            },
        };
        let application = text(obj, &["application", "use"])
            .unwrap_or_else(|| DEFAULT_APPLICATION.to_string());

        materials.push(Material {
            name,
            hex_color,
            application,
            extensions: collect_extensions(
                obj,
                &["name", "hexColor", "hex_color", "hex", "color", "application", "use"],
            ),
        });
    }
    materials
}

fn normalize_rooms(value: Option<&Value>, floors: u32, issues: &mut Vec<String>) -> Vec<Room> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        issues.push("rooms must be an array".to_string());
        return Vec::new();
    };

    let mut rooms = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            issues.push(format!("rooms[{i}] must be an object"));
            continue;
        };
        let Some(name) = text(obj, &["name"]) else {
            issues.push(format!("rooms[{i}].name is required"));
            continue;
        };
        let area_m2 = match field(obj, &["areaM2", "area_m2", "area"]) {
            None => None,
            Some(v) => match coerce_number(v) {
                Some(a) if a > 0.0 => Some(a),
                _ => {
                    issues.push(format!("rooms[{i}].areaM2 must be > 0"));
                    None
                }
            },
        };
        let floor = match field(obj, &["floor", "level"]) {
            None => 0,
            Some(v) => match coerce_integer(v) {
                Some(f) if f < floors as u64 => f as u32,
                _ => {
                    issues.push(format!(
                        "rooms[{i}].floor must be an integer below the floor count ({floors})"
                    ));
                    0
                }
            },
        };
        let min_width_m = match field(obj, &["minWidthM", "min_width_m"]) {
            None => DEFAULT_MIN_ROOM_WIDTH_M,
            Some(v) => match coerce_number(v) {
                Some(w) if w > 0.0 => w,
                _ => {
                    issues.push(format!("rooms[{i}].minWidthM must be > 0"));
                    DEFAULT_MIN_ROOM_WIDTH_M
                }
            },
        };

        rooms.push(Room {
            name,
            area_m2,
            floor,
            min_width_m,
            extensions: collect_extensions(
                obj,
                &[
                    "name",
                    "areaM2",
                    "area_m2",
                    "area",
                    "floor",
                    "level",
                    "minWidthM",
                    "min_width_m",
                ],
            ),
        });
    }
    rooms
}

fn normalize_openings(value: Option<&Value>, issues: &mut Vec<String>) -> Vec<Opening> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        issues.push("openings must be an array".to_string());
        return Vec::new();
    };

    let mut openings = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            issues.push(format!("openings[{i}] must be an object"));
            continue;
        };
        let Some(kind) = text(obj, &["kind", "type"]).and_then(|k| OpeningKind::parse(&k)) else {
            issues.push(format!(
                "openings[{i}].kind must be one of window, door, entrance, patio, french"
            ));
            continue;
        };
        let facade = match text(obj, &["facade", "wall"]) {
            None => Facade::South,
            Some(f) => Facade::parse(&f).unwrap_or_else(|| {
                issues.push(format!("openings[{i}].facade '{f}' must be N, S, E or W"));
                Facade::South
            }),
        };
        let count = match field(obj, &["count", "quantity"]) {
            None => 1,
            Some(v) => match coerce_integer(v) {
                Some(c) if c >= 1 && c <= u32::MAX as u64 => c as u32,
                _ => {
                    issues.push(format!("openings[{i}].count must be >= 1"));
                    1
                }
            },
        };

        let (default_w, default_h, default_sill) = kind.default_size();
        let prefix = format!("openings[{i}]");
        let width_m = sized(obj, &["widthM", "width_m", "width"], default_w, &prefix, "widthM", issues);
        let height_m =
            sized(obj, &["heightM", "height_m", "height"], default_h, &prefix, "heightM", issues);
        let sill_height_m = match field(obj, &["sillHeightM", "sill_height_m", "sill"]) {
            None => default_sill,
            Some(v) => match coerce_number(v) {
                Some(s) if s >= 0.0 => s,
                _ => {
                    issues.push(format!("{prefix}.sillHeightM must be >= 0"));
                    default_sill
                }
            },
        };

        openings.push(Opening {
            kind,
            facade,
            count,
            width_m,
            height_m,
            sill_height_m,
            extensions: collect_extensions(
                obj,
                &[
                    "kind",
                    "type",
                    "facade",
                    "wall",
                    "count",
                    "quantity",
                    "widthM",
                    "width_m",
                    "width",
                    "heightM",
                    "height_m",
                    "height",
                    "sillHeightM",
                    "sill_height_m",
                    "sill",
                ],
            ),
        });
    }
    openings
}

fn normalize_roof(value: Option<&Value>, default_material: &str, issues: &mut Vec<String>) -> Roof {
    let empty = Map::new();
    let obj = match value {
        None => &empty,
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            issues.push("roof must be an object".to_string());
            &empty
        }
    };

    let roof_type = match text(obj, &["type", "roofType", "roof_type"]) {
        None => RoofType::Gable,
        Some(t) => RoofType::parse(&t).unwrap_or_else(|| {
            issues.push(format!(
                "roof.type '{t}' must be one of gable, hip, flat, mono-pitch, mansard"
            ));
            RoofType::Gable
        }),
    };
    let pitch = match field(obj, &["pitch", "pitchDeg", "pitch_deg"]) {
        None => roof_type.default_pitch(),
        Some(v) => match coerce_number(v) {
            Some(p) if (0.0..=MAX_ROOF_PITCH_DEG).contains(&p) => p,
            _ => {
                issues.push(format!("roof.pitch must be between 0 and {MAX_ROOF_PITCH_DEG} degrees"));
                roof_type.default_pitch()
            }
        },
    };
    let material = text(obj, &["material"]).unwrap_or_else(|| default_material.to_string());

    Roof {
        roof_type,
        pitch,
        material,
        extensions: collect_extensions(
            obj,
            &["type", "roofType", "roof_type", "pitch", "pitchDeg", "pitch_deg", "material"],
        ),
    }
}

fn normalize_rules(value: Option<&Value>, issues: &mut Vec<String>) -> Vec<String> {
    let Some(value) = value else {
        return DEFAULT_CONSISTENCY_RULES.iter().map(|s| s.to_string()).collect();
    };
    let Some(items) = value.as_array() else {
        issues.push("consistencyRules must be an array of field paths".to_string());
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    let mut rules = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_str().map(str::trim) {
            Some(path) if LOCKABLE_PATHS.contains(&path) => {
                if seen.insert(path.to_string()) {
                    rules.push(path.to_string());
                }
            }
            Some(path) => issues.push(format!(
                "consistencyRules[{i}] '{path}' is not a lockable field"
            )),
            None => issues.push(format!("consistencyRules[{i}] must be a string")),
        }
    }
    rules
}

// ────────────────────────────────────────────────────────────────────────────
// Field helpers
// ────────────────────────────────────────────────────────────────────────────

/// First non-null value under any of `names`.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| obj.get(*n))
        .find(|v| !v.is_null())
}

fn text(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text_or(obj: &Map<String, Value>, names: &[&str], default: &str) -> String {
    text(obj, names).unwrap_or_else(|| default.to_string())
}

fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn coerce_integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let n = coerce_number(value)?;
    (n >= 0.0 && n.fract() == 0.0 && n <= MAX_SAFE_INTEGER).then_some(n as u64)
}

fn positive_number(
    obj: &Map<String, Value>,
    names: &[&str],
    label: &str,
    issues: &mut Vec<String>,
) -> Option<f64> {
    match field(obj, names) {
        None => {
            issues.push(format!("{label} is required"));
            None
        }
        Some(v) => match coerce_number(v) {
            Some(n) if n > 0.0 => Some(n),
            Some(_) => {
                issues.push(format!("{label} must be > 0"));
                None
            }
            None => {
                issues.push(format!("{label} must be a number"));
                None
            }
        },
    }
}

fn sized(
    obj: &Map<String, Value>,
    names: &[&str],
    default: f64,
    prefix: &str,
    label: &str,
    issues: &mut Vec<String>,
) -> f64 {
    match field(obj, names) {
        None => default,
        Some(v) => match coerce_number(v) {
            Some(n) if n > 0.0 => n,
            _ => {
                issues.push(format!("{prefix}.{label} must be > 0"));
                default
            }
        },
    }
}

/// `#abc` / `8b4513` / `#8B4513` → `#8B4513`.
fn normalize_hex(raw: &str) -> Option<String> {
    let digits = raw.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => digits.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_uppercase()))
}

fn seed_from_hash(hash: &ContentHash) -> u64 {
    // 13 hex digits = 52 bits, inside the JSON-safe integer range.
    u64::from_str_radix(&hash.as_str()[..13], 16).unwrap_or(0)
}

fn collect_extensions(obj: &Map<String, Value>, known: &[&str]) -> BTreeMap<String, Value> {
    obj.iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err("override path must not be empty".to_string());
    };

    let mut cursor = root;
    for segment in parents {
        cursor = match cursor {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let idx: usize = segment
                    .parse()
                    .map_err(|_| format!("override '{path}': '{segment}' is not an array index"))?;
                let len = items.len();
                items
                    .get_mut(idx)
                    .ok_or_else(|| format!("override '{path}': index {idx} out of range ({len})"))?
            }
            _ => return Err(format!("override '{path}': '{segment}' is not a container")),
        };
    }

    match cursor {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let idx: usize = last
                .parse()
                .map_err(|_| format!("override '{path}': '{last}' is not an array index"))?;
            let len = items.len();
            let slot = items
                .get_mut(idx)
                .ok_or_else(|| format!("override '{path}': index {idx} out of range ({len})"))?;
            *slot = value;
            Ok(())
        }
        _ => Err(format!("override '{path}': parent is not a container")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn brief() -> Value {
        json!({
            "id": "villa-7",
            "seed": 42,
            "dimensions": {"length": 10, "width": 8, "height": 6, "floors": 2},
            "materials": [{"name": "brick", "hexColor": "#8B4513"}]
        })
    }

    #[test]
    fn test_minimal_brief_gets_policy_defaults() {
        let spec = normalize(&brief()).unwrap();
        assert_eq!(spec.id, "villa-7");
        assert_eq!(spec.seed, 42);
        assert_eq!(spec.building_type, "residential");
        assert_eq!(spec.materials[0].application, "facade");
        assert_eq!(spec.roof.roof_type, RoofType::Gable);
        assert!((spec.roof.pitch - 35.0).abs() < f64::EPSILON);
        assert_eq!(spec.roof.material, "brick");
        assert_eq!(spec.consistency_rules, vec!["dimensions", "materials", "roof"]);
    }

    #[test]
    fn test_negative_length_is_rejected_with_message() {
        let raw = json!({
            "dimensions": {"length": -5, "width": 8, "height": 6},
            "materials": [{"name": "brick", "hexColor": "#8B4513"}]
        });
        let err = normalize(&raw).unwrap_err();
        assert!(
            err.issues.iter().any(|i| i.contains("length must be > 0")),
            "issues: {:?}",
            err.issues
        );
    }

    #[test]
    fn test_all_issues_are_collected() {
        let raw = json!({
            "dimensions": {"length": 0, "width": "abc", "height": 6},
            "materials": []
        });
        let err = normalize(&raw).unwrap_err();
        assert!(err.issues.iter().any(|i| i == "dimensions.length must be > 0"));
        assert!(err.issues.iter().any(|i| i == "dimensions.width must be a number"));
        assert!(err.issues.iter().any(|i| i == "materials must not be empty"));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let mut raw = brief();
        raw["dimensions"] = json!({"length": "10", "width": "8.5", "height": "6", "floors": "2"});
        raw["seed"] = json!("42");
        let spec = normalize(&raw).unwrap();
        assert!((spec.dimensions.width - 8.5).abs() < f64::EPSILON);
        assert_eq!(spec.dimensions.floors, 2);
        assert_eq!(spec.seed, 42);
    }

    #[test]
    fn test_fractional_seed_is_rejected() {
        let mut raw = brief();
        raw["seed"] = json!(4.5);
        let err = normalize(&raw).unwrap_err();
        assert!(err.issues.iter().any(|i| i.contains("seed")));
    }

    #[test]
    fn test_implausible_floor_height_is_rejected() {
        let mut raw = brief();
        raw["dimensions"] = json!({"length": 10, "width": 8, "height": 20, "floors": 2});
        let err = normalize(&raw).unwrap_err();
        assert!(err.issues[0].contains("per floor is 10 m"));

        raw["dimensions"] = json!({"length": 10, "width": 8, "height": 2, "floors": 2});
        assert!(normalize(&raw).is_err());
    }

    #[test]
    fn test_hex_colour_is_normalized() {
        let mut raw = brief();
        raw["materials"] = json!([{"name": "render", "hex_color": "fa0"}]);
        let spec = normalize(&raw).unwrap();
        assert_eq!(spec.materials[0].hex_color, "#FFAA00");
    }

    #[test]
    fn test_opening_defaults_follow_kind() {
        let mut raw = brief();
        raw["openings"] = json!([{"type": "window", "facade": "N", "count": 3}, {"kind": "entrance"}]);
        let spec = normalize(&raw).unwrap();
        assert_eq!(spec.openings[0].facade, Facade::North);
        assert_eq!(spec.openings[0].count, 3);
        assert!((spec.openings[0].sill_height_m - 0.9).abs() < f64::EPSILON);
        assert_eq!(spec.openings[1].facade, Facade::South);
        assert!((spec.openings[1].width_m - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_room_on_missing_floor_is_rejected() {
        let mut raw = brief();
        raw["rooms"] = json!([{"name": "loft", "floor": 2}]);
        let err = normalize(&raw).unwrap_err();
        assert!(err.issues[0].starts_with("rooms[0].floor"));
    }

    #[test]
    fn test_unknown_lock_path_is_rejected() {
        let mut raw = brief();
        raw["consistencyRules"] = json!(["dimensions", "landscaping"]);
        let err = normalize(&raw).unwrap_err();
        assert_eq!(err.issues, vec!["consistencyRules[1] 'landscaping' is not a lockable field"]);
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let mut raw = brief();
        raw["siteNotes"] = json!({"orientation": "south-facing"});
        raw["dimensions"]["plinth"] = json!(0.45);
        let spec = normalize(&raw).unwrap();
        assert_eq!(spec.extensions["siteNotes"]["orientation"], "south-facing");
        assert_eq!(spec.dimensions.extensions["plinth"], json!(0.45));
    }

    #[test]
    fn test_missing_id_and_seed_are_derived_deterministically() {
        let raw = json!({
            "dimensions": {"length": 10, "width": 8, "height": 3},
            "materials": [{"name": "timber", "hexColor": "#A0522D"}]
        });
        let a = normalize(&raw).unwrap();
        let b = normalize(&raw).unwrap();
        assert!(a.id.starts_with("dna-"));
        assert_eq!(a.id, b.id);
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn test_id_with_path_separator_is_rejected() {
        for bad in ["a/b", "..", ".hidden", "a b", "a\\b"] {
            let mut raw = brief();
            raw["id"] = json!(bad);
            let err = normalize(&raw).unwrap_err();
            assert!(err.issues[0].starts_with(&format!("id '{bad}'")), "{bad}: {:?}", err.issues);
        }
        let mut raw = brief();
        raw["id"] = json!("house_2.v-a");
        assert_eq!(normalize(&raw).unwrap().id, "house_2.v-a");
        assert!(!is_valid_design_id(&"x".repeat(129)));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let mut raw = brief();
        raw["extra"] = json!([1, 2, 3]);
        raw["openings"] = json!([{"type": "door", "facade": "east"}]);
        let first = normalize(&raw).unwrap();
        let serialized = serde_json::to_value(&first).unwrap();
        let second = normalize(&serialized).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_apply_overrides_sets_nested_paths() {
        let mut raw = brief();
        let overrides = BTreeMap::from([
            ("roof.type".to_string(), json!("flat")),
            ("materials.0.hexColor".to_string(), json!("#000000")),
        ]);
        apply_overrides(&mut raw, &overrides).unwrap();
        assert_eq!(raw["roof"]["type"], "flat");
        assert_eq!(raw["materials"][0]["hexColor"], "#000000");
    }

    #[test]
    fn test_apply_overrides_reports_bad_index() {
        let mut raw = brief();
        let overrides = BTreeMap::from([("materials.4.name".to_string(), json!("glass"))]);
        let err = apply_overrides(&mut raw, &overrides).unwrap_err();
        assert!(err.issues[0].contains("out of range"));
    }

    proptest! {
        #[test]
        fn prop_normalize_serialize_normalize_is_identity(
            length in 1.0f64..80.0,
            width in 1.0f64..80.0,
            floors in 1u32..5,
            per_floor in 2.0f64..5.5,
            seed in 0u64..1_000_000,
            hex in "[0-9a-fA-F]{6}",
            pitch in 0.0f64..75.0,
        ) {
            let raw = json!({
                "seed": seed,
                "dimensions": {"length": length, "width": width, "height": per_floor * floors as f64, "floors": floors},
                "materials": [{"name": "brick", "hexColor": hex}],
                "roof": {"type": "hip", "pitch": pitch},
            });
            if let Ok(first) = normalize(&raw) {
                let again = normalize(&serde_json::to_value(&first).unwrap()).unwrap();
                prop_assert_eq!(first, again);
            }
        }
    }
}
