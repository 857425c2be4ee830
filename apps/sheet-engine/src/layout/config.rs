//! Panel geometry types and the load-time invariant check.
//!
//! Rectangles are normalized to the sheet: `(0,0)` is the top-left corner and
//! `(1,1)` the bottom-right. A layout is valid when every rectangle lies in
//! [0,1]² and no two rectangles share more than `OVERLAP_TOLERANCE` of the sheet.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dna::Facade;
use crate::layout::sheets;

/// Maximum shared area between two panels, as a fraction of the sheet (0.1%).
pub const OVERLAP_TOLERANCE: f64 = 0.001;

/// Generated panel edges snap to this many pixels.
const PX_GRID: u32 = 64;
const MIN_PANEL_PX: u32 = 512;
const MAX_PANEL_PX: u32 = 2048;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SheetType {
    /// A1 presentation board: plan, hero perspective, elevation, section.
    #[default]
    Presentation,
    /// Full drawing set: plans, four elevations, two sections.
    Technical,
    /// Concept board: hero render, axonometric, street elevation.
    Concept,
}

impl SheetType {
    pub const ALL: [SheetType; 3] = [SheetType::Presentation, SheetType::Technical, SheetType::Concept];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::Technical => "technical",
            Self::Concept => "concept",
        }
    }
}

impl fmt::Display for SheetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionAxis {
    /// A-A, cut along the building length.
    Longitudinal,
    /// B-B, cut across the building width.
    Transverse,
}

/// What a panel depicts. Selects the prompt template and which spec facts are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PromptRole {
    FloorPlan { level: u32 },
    Elevation { facade: Facade },
    Section { axis: SectionAxis },
    Perspective,
    Axonometric,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    pub fn within_unit_square(&self) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.x + self.w <= 1.0 + f64::EPSILON
            && self.y + self.h <= 1.0 + f64::EPSILON
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let h = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSpec {
    pub id: String,
    pub label: String,
    pub prompt_role: PromptRole,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub sheet_type: SheetType,
    pub sheet_width_mm: f64,
    pub sheet_height_mm: f64,
    /// Full-sheet render resolution that panel pixel sizes are derived from.
    pub render_width_px: u32,
    pub render_height_px: u32,
    pub panels: Vec<PanelSpec>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("{sheet} layout has no panels")]
    Empty { sheet: SheetType },

    #[error("{sheet} layout: panel '{panel}' has a non-positive width or height")]
    Degenerate { sheet: SheetType, panel: String },

    #[error("{sheet} layout: panel '{panel}' lies outside the unit square")]
    OutOfBounds { sheet: SheetType, panel: String },

    #[error("{sheet} layout: panel id '{panel}' is used twice")]
    DuplicatePanel { sheet: SheetType, panel: String },

    #[error("{sheet} layout: panels '{a}' and '{b}' overlap by {area:.5} of the sheet")]
    Overlap {
        sheet: SheetType,
        a: String,
        b: String,
        area: f64,
    },
}

impl LayoutConfig {
    pub fn panel(&self, id: &str) -> Option<&PanelSpec> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn panel_ids(&self) -> impl Iterator<Item = &str> {
        self.panels.iter().map(|p| p.id.as_str())
    }

    /// Pixel size to request for a panel: its share of the sheet render,
    /// snapped to the generation grid and clamped to what the model accepts.
    pub fn size_px(&self, panel: &PanelSpec) -> (u32, u32) {
        let snap = |full: u32, frac: f64| {
            let raw = (full as f64 * frac / PX_GRID as f64).round() as u32 * PX_GRID;
            raw.clamp(MIN_PANEL_PX, MAX_PANEL_PX)
        };
        (
            snap(self.render_width_px, panel.rect.w),
            snap(self.render_height_px, panel.rect.h),
        )
    }

    /// Checks the geometry invariants. Run once at load time.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let sheet = self.sheet_type;
        if self.panels.is_empty() {
            return Err(LayoutError::Empty { sheet });
        }

        let mut seen = BTreeSet::new();
        for panel in &self.panels {
            if !seen.insert(panel.id.as_str()) {
                return Err(LayoutError::DuplicatePanel {
                    sheet,
                    panel: panel.id.clone(),
                });
            }
            if panel.rect.w <= 0.0 || panel.rect.h <= 0.0 {
                return Err(LayoutError::Degenerate {
                    sheet,
                    panel: panel.id.clone(),
                });
            }
            if !panel.rect.within_unit_square() {
                return Err(LayoutError::OutOfBounds {
                    sheet,
                    panel: panel.id.clone(),
                });
            }
        }

        for (i, a) in self.panels.iter().enumerate() {
            for b in &self.panels[i + 1..] {
                let area = a.rect.intersection_area(&b.rect);
                if area > OVERLAP_TOLERANCE {
                    return Err(LayoutError::Overlap {
                        sheet,
                        a: a.id.clone(),
                        b: b.id.clone(),
                        area,
                    });
                }
            }
        }
        Ok(())
    }
}

/// All sheet layouts, validated.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: BTreeMap<SheetType, LayoutConfig>,
}

impl LayoutRegistry {
    /// Builds and validates every built-in layout.
    pub fn load() -> Result<Self, LayoutError> {
        Self::from_layouts(SheetType::ALL.iter().map(|s| sheets::layout_for(*s)).collect())
    }

    pub fn from_layouts(layouts: Vec<LayoutConfig>) -> Result<Self, LayoutError> {
        let mut map = BTreeMap::new();
        for layout in layouts {
            layout.validate()?;
            map.insert(layout.sheet_type, layout);
        }
        Ok(Self { layouts: map })
    }

    pub fn get(&self, sheet: SheetType) -> Option<&LayoutConfig> {
        self.layouts.get(&sheet)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutConfig> {
        self.layouts.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn panel(id: &str, x: f64, y: f64, w: f64, h: f64) -> PanelSpec {
        PanelSpec {
            id: id.to_string(),
            label: id.to_string(),
            prompt_role: PromptRole::Perspective,
            rect: Rect { x, y, w, h },
        }
    }

    fn layout(panels: Vec<PanelSpec>) -> LayoutConfig {
        LayoutConfig {
            sheet_type: SheetType::Concept,
            sheet_width_mm: 841.0,
            sheet_height_mm: 594.0,
            render_width_px: 4096,
            render_height_px: 2896,
            panels,
        }
    }

    #[test]
    fn test_builtin_layouts_all_validate() {
        let registry = LayoutRegistry::load().unwrap();
        assert_eq!(registry.iter().count(), 3);
        for sheet in SheetType::ALL {
            assert!(registry.get(sheet).is_some(), "missing {sheet}");
        }
    }

    #[test]
    fn test_builtin_layouts_satisfy_geometry_invariant() {
        let registry = LayoutRegistry::load().unwrap();
        for layout in registry.iter() {
            for (i, a) in layout.panels.iter().enumerate() {
                assert!(a.rect.within_unit_square(), "{} out of bounds", a.id);
                for b in &layout.panels[i + 1..] {
                    assert!(a.rect.intersection_area(&b.rect) <= OVERLAP_TOLERANCE);
                }
            }
        }
    }

    #[test]
    fn test_overlapping_panels_are_rejected() {
        let l = layout(vec![panel("a", 0.0, 0.0, 0.5, 0.5), panel("b", 0.4, 0.4, 0.5, 0.5)]);
        assert!(matches!(l.validate(), Err(LayoutError::Overlap { .. })));
    }

    #[test]
    fn test_touching_panels_are_accepted() {
        let l = layout(vec![panel("a", 0.0, 0.0, 0.5, 1.0), panel("b", 0.5, 0.0, 0.5, 1.0)]);
        assert!(l.validate().is_ok());
    }

    #[test]
    fn test_out_of_bounds_and_duplicates_are_rejected() {
        let l = layout(vec![panel("a", 0.6, 0.0, 0.5, 0.5)]);
        assert!(matches!(l.validate(), Err(LayoutError::OutOfBounds { .. })));

        let l = layout(vec![panel("a", 0.0, 0.0, 0.2, 0.2), panel("a", 0.5, 0.5, 0.2, 0.2)]);
        assert!(matches!(l.validate(), Err(LayoutError::DuplicatePanel { .. })));

        assert!(matches!(layout(vec![]).validate(), Err(LayoutError::Empty { .. })));
    }

    #[test]
    fn test_size_px_snaps_and_clamps() {
        let l = layout(vec![panel("a", 0.0, 0.0, 0.3, 0.05)]);
        let (w, h) = l.size_px(&l.panels[0]);
        assert_eq!(w % 64, 0);
        assert_eq!(h, 512);
        assert!(w <= 2048);
    }

    #[test]
    fn test_prompt_role_serializes_tagged() {
        let role = PromptRole::Elevation {
            facade: Facade::North,
        };
        let json = serde_json::to_value(role).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "elevation", "facade": "north"}));
    }

    proptest! {
        #[test]
        fn prop_validated_layouts_never_overlap(
            rects in proptest::collection::vec((0.0f64..1.0, 0.0f64..1.0, 0.01f64..0.6, 0.01f64..0.6), 1..6)
        ) {
            let panels = rects
                .iter()
                .enumerate()
                .map(|(i, (x, y, w, h))| panel(&format!("p{i}"), *x, *y, *w, *h))
                .collect();
            let l = layout(panels);
            if l.validate().is_ok() {
                for (i, a) in l.panels.iter().enumerate() {
                    prop_assert!(a.rect.within_unit_square());
                    for b in &l.panels[i + 1..] {
                        prop_assert!(a.rect.intersection_area(&b.rect) <= OVERLAP_TOLERANCE);
                    }
                }
            }
        }
    }
}
