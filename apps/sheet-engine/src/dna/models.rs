//! Typed design specification ("DNA").
//!
//! Every struct carries a flattened `extensions` bag so fields the normalizer
//! does not understand survive a serialise → normalise round trip untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field paths that a `consistencyRules` entry may lock.
pub const LOCKABLE_PATHS: &[&str] = &[
    "id",
    "seed",
    "buildingType",
    "style",
    "dimensions",
    "dimensions.length",
    "dimensions.width",
    "dimensions.height",
    "dimensions.floors",
    "materials",
    "rooms",
    "openings",
    "roof",
    "roof.type",
    "roof.pitch",
    "roof.material",
];

/// Lock set applied when the brief does not name its own.
pub const DEFAULT_CONSISTENCY_RULES: &[&str] = &["dimensions", "materials", "roof"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSpecification {
    pub id: String,
    pub seed: u64,
    pub building_type: String,
    pub style: String,
    pub dimensions: Dimensions,
    pub materials: Vec<Material>,
    pub rooms: Vec<Room>,
    pub openings: Vec<Opening>,
    pub roof: Roof,
    pub consistency_rules: Vec<String>,
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, Value>,
}

impl DesignSpecification {
    /// Openings placed on the given facade, in declaration order.
    pub fn openings_on(&self, facade: Facade) -> impl Iterator<Item = &Opening> {
        self.openings.iter().filter(move |o| o.facade == facade)
    }

    /// Rooms on the given floor (0 = ground).
    pub fn rooms_on(&self, floor: u32) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(move |r| r.floor == floor)
    }
}

/// Overall building envelope in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub floors: u32,
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, Value>,
}

impl Dimensions {
    /// Floor-to-floor height. `floors` is validated ≥ 1 before construction.
    pub fn floor_height(&self) -> f64 {
        self.height / self.floors.max(1) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: String,
    /// Upper-case `#RRGGBB`.
    pub hex_color: String,
    pub application: String,
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub name: String,
    pub area_m2: Option<f64>,
    pub floor: u32,
    pub min_width_m: f64,
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, Value>,
}

/// A group of identical openings on one facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opening {
    pub kind: OpeningKind,
    pub facade: Facade,
    pub count: u32,
    pub width_m: f64,
    pub height_m: f64,
    pub sill_height_m: f64,
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningKind {
    Window,
    Door,
    Entrance,
    Patio,
    French,
}

impl OpeningKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "window" => Some(Self::Window),
            "door" => Some(Self::Door),
            "entrance" => Some(Self::Entrance),
            "patio" => Some(Self::Patio),
            "french" => Some(Self::French),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Door => "door",
            Self::Entrance => "entrance",
            Self::Patio => "patio",
            Self::French => "french",
        }
    }

    /// Policy default `(width_m, height_m, sill_height_m)` for this opening kind.
    pub fn default_size(self) -> (f64, f64, f64) {
        match self {
            Self::Window => (1.2, 1.2, 0.9),
            Self::Door => (0.9, 2.1, 0.0),
            Self::Entrance => (1.0, 2.1, 0.0),
            Self::Patio => (2.4, 2.1, 0.0),
            Self::French => (1.8, 2.1, 0.0),
        }
    }
}

/// Compass facade an opening or elevation faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facade {
    North,
    South,
    East,
    West,
}

impl Facade {
    pub const ALL: [Facade; 4] = [Facade::North, Facade::South, Facade::East, Facade::West];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Some(Self::North),
            "s" | "south" => Some(Self::South),
            "e" | "east" => Some(Self::East),
            "w" | "west" => Some(Self::West),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoofType {
    Gable,
    Hip,
    Flat,
    MonoPitch,
    Mansard,
}

impl RoofType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "gable" | "gabled" => Some(Self::Gable),
            "hip" | "hipped" => Some(Self::Hip),
            "flat" => Some(Self::Flat),
            "mono-pitch" | "monopitch" | "shed" => Some(Self::MonoPitch),
            "mansard" => Some(Self::Mansard),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gable => "gable",
            Self::Hip => "hip",
            Self::Flat => "flat",
            Self::MonoPitch => "mono-pitch",
            Self::Mansard => "mansard",
        }
    }

    pub fn default_pitch(self) -> f64 {
        match self {
            Self::Flat => 0.0,
            _ => 35.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roof {
    #[serde(rename = "type")]
    pub roof_type: RoofType,
    /// Degrees from horizontal.
    pub pitch: f64,
    pub material: String,
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, Value>,
}
