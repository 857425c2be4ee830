//! Built-in sheet layouts.
//!
//! Panels are drawn on an A1 landscape sheet (841 × 594 mm) with a 15 mm
//! margin, 8 mm gutters and a 40 mm title block along the bottom edge.
//! Positions are given in millimetres and normalized here.

use crate::dna::Facade;

use super::config::{LayoutConfig, PanelSpec, PromptRole, Rect, SectionAxis, SheetType};

const A1_WIDTH_MM: f64 = 841.0;
const A1_HEIGHT_MM: f64 = 594.0;

const MARGIN_MM: f64 = 15.0;
const GUTTER_MM: f64 = 8.0;
const TITLE_BLOCK_MM: f64 = 40.0;

/// A1 at roughly 125 dpi.
const RENDER_WIDTH_PX: u32 = 4096;
const RENDER_HEIGHT_PX: u32 = 2896;

pub fn layout_for(sheet: SheetType) -> LayoutConfig {
    let panels = match sheet {
        SheetType::Presentation => presentation(),
        SheetType::Technical => technical(),
        SheetType::Concept => concept(),
    };
    LayoutConfig {
        sheet_type: sheet,
        sheet_width_mm: A1_WIDTH_MM,
        sheet_height_mm: A1_HEIGHT_MM,
        render_width_px: RENDER_WIDTH_PX,
        render_height_px: RENDER_HEIGHT_PX,
        panels,
    }
}

fn mm(x: f64, y: f64, w: f64, h: f64) -> Rect {
    Rect {
        x: x / A1_WIDTH_MM,
        y: y / A1_HEIGHT_MM,
        w: w / A1_WIDTH_MM,
        h: h / A1_HEIGHT_MM,
    }
}

fn panel(id: &str, label: &str, prompt_role: PromptRole, rect: Rect) -> PanelSpec {
    PanelSpec {
        id: id.to_string(),
        label: label.to_string(),
        prompt_role,
        rect,
    }
}

/// Drawable height between the top margin and the gutter above the title block.
fn drawable_height() -> f64 {
    A1_HEIGHT_MM - 2.0 * MARGIN_MM - TITLE_BLOCK_MM - GUTTER_MM
}

// ────────────────────────────────────────────────────────────────────────────
// Presentation: large ground plan on the left, three stacked views on the right
// ────────────────────────────────────────────────────────────────────────────

fn presentation() -> Vec<PanelSpec> {
    let plan_w = 460.0;
    let right_x = MARGIN_MM + plan_w + GUTTER_MM;
    let right_w = A1_WIDTH_MM - MARGIN_MM - right_x;

    let hero_h = 200.0;
    let strip_h = 140.0;
    let elev_y = MARGIN_MM + hero_h + GUTTER_MM;
    let section_y = elev_y + strip_h + GUTTER_MM;

    vec![
        panel(
            "floor-plan-ground",
            "Ground Floor Plan",
            PromptRole::FloorPlan { level: 0 },
            mm(MARGIN_MM, MARGIN_MM, plan_w, 480.0),
        ),
        panel(
            "perspective-hero",
            "Perspective",
            PromptRole::Perspective,
            mm(right_x, MARGIN_MM, right_w, hero_h),
        ),
        panel(
            "elevation-north",
            "North Elevation",
            PromptRole::Elevation {
                facade: Facade::North,
            },
            mm(right_x, elev_y, right_w, strip_h),
        ),
        panel(
            "section-aa",
            "Section A-A",
            PromptRole::Section {
                axis: SectionAxis::Longitudinal,
            },
            mm(right_x, section_y, right_w, strip_h),
        ),
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// Technical: 4 × 2 grid of orthographic drawings
// ────────────────────────────────────────────────────────────────────────────

fn technical() -> Vec<PanelSpec> {
    let cols = 4.0;
    let rows = 2.0;
    let cell_w = (A1_WIDTH_MM - 2.0 * MARGIN_MM - (cols - 1.0) * GUTTER_MM) / cols;
    let cell_h = (drawable_height() - (rows - 1.0) * GUTTER_MM) / rows;
    let cell = |col: f64, row: f64| {
        mm(
            MARGIN_MM + col * (cell_w + GUTTER_MM),
            MARGIN_MM + row * (cell_h + GUTTER_MM),
            cell_w,
            cell_h,
        )
    };

    let mut panels = vec![
        panel(
            "floor-plan-ground",
            "Ground Floor Plan",
            PromptRole::FloorPlan { level: 0 },
            cell(0.0, 0.0),
        ),
        panel(
            "floor-plan-upper",
            "First Floor Plan",
            PromptRole::FloorPlan { level: 1 },
            cell(1.0, 0.0),
        ),
        panel(
            "section-aa",
            "Section A-A",
            PromptRole::Section {
                axis: SectionAxis::Longitudinal,
            },
            cell(2.0, 0.0),
        ),
        panel(
            "section-bb",
            "Section B-B",
            PromptRole::Section {
                axis: SectionAxis::Transverse,
            },
            cell(3.0, 0.0),
        ),
    ];
    for (i, facade) in Facade::ALL.iter().enumerate() {
        let name = facade.as_str();
        let mut label = name.to_string();
        label[..1].make_ascii_uppercase();
        panels.push(panel(
            &format!("elevation-{name}"),
            &format!("{label} Elevation"),
            PromptRole::Elevation { facade: *facade },
            cell(i as f64, 1.0),
        ));
    }
    panels
}

// ────────────────────────────────────────────────────────────────────────────
// Concept: hero render with an axonometric and the street elevation
// ────────────────────────────────────────────────────────────────────────────

fn concept() -> Vec<PanelSpec> {
    let hero_w = 520.0;
    let right_x = MARGIN_MM + hero_w + GUTTER_MM;
    let right_w = A1_WIDTH_MM - MARGIN_MM - right_x;
    let half_h = (drawable_height() - GUTTER_MM) / 2.0;

    vec![
        panel(
            "perspective-hero",
            "Perspective",
            PromptRole::Perspective,
            mm(MARGIN_MM, MARGIN_MM, hero_w, drawable_height()),
        ),
        panel(
            "axonometric",
            "Axonometric",
            PromptRole::Axonometric,
            mm(right_x, MARGIN_MM, right_w, half_h),
        ),
        panel(
            "elevation-south",
            "South Elevation",
            PromptRole::Elevation {
                facade: Facade::South,
            },
            mm(right_x, MARGIN_MM + half_h + GUTTER_MM, right_w, half_h),
        ),
    ]
}
