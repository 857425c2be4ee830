//! Canonical prompt assembly.
//!
//! Output layout, top to bottom:
//! - modify mode only: LOCKED clause, plus an escalation line when `lock_strength > 0`
//! - canonical body for the panel's role
//! - modify mode only: MODIFICATION clause (targeted panels) or a preserve line
//! - modify mode only: precedence line
//!
//! Identical arguments produce byte-identical output.

use serde::{Deserialize, Serialize};

use crate::baseline::SeedRecord;
use crate::dna::{content_hash, DesignSpecification, Dimensions, Material, Opening, Roof};
use crate::layout::{LayoutConfig, PanelSpec, PromptRole, SectionAxis};

use super::seed::derive_seed;
use super::templates::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBundle {
    pub panel_id: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: u32,
    pub size_px: SizePx,
    /// Content hash of the spec this prompt was rendered from.
    pub spec_hash: String,
    pub model_hint: String,
    /// Image-to-image strength for modify runs; `None` for fresh generation.
    pub strength: Option<f64>,
    pub lock_strength: u32,
}

/// Inputs that turn a plain render into a locked, delta-carrying one.
#[derive(Debug, Clone, Copy)]
pub struct ModifyDirectives<'a> {
    pub baseline: &'a DesignSpecification,
    /// Design id the baseline was stored under.
    pub design_id: &'a str,
    /// Seeds recorded with the baseline; panels missing from it derive from the record's base.
    pub seeds: &'a SeedRecord,
    pub lock_rules: &'a [String],
    pub delta: &'a str,
    pub targeted: bool,
    pub lock_strength: u32,
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub enum PromptMode<'a> {
    Generate,
    Modify(ModifyDirectives<'a>),
}

pub fn build_prompt(
    spec: &DesignSpecification,
    layout: &LayoutConfig,
    panel: &PanelSpec,
    mode: &PromptMode<'_>,
) -> PromptBundle {
    let body = render_body(spec, panel.prompt_role);
    let (width, height) = layout.size_px(panel);

    // Modify runs replay the stored seed so an untouched panel is requested
    // with exactly the seed that produced it.
    let seed = match mode {
        PromptMode::Generate => derive_seed(&spec.id, &panel.id, spec.seed),
        PromptMode::Modify(d) => d
            .seeds
            .per_panel
            .get(&panel.id)
            .copied()
            .unwrap_or_else(|| derive_seed(d.design_id, &panel.id, d.seeds.base)),
    };

    let (positive_prompt, strength, lock_strength) = match mode {
        PromptMode::Generate => (body, None, 0),
        PromptMode::Modify(d) => {
            let mut sections = Vec::with_capacity(5);
            sections.push(fill(
                LOCK_CLAUSE_TEMPLATE,
                &[("locked_facts", &locked_facts(d.baseline, d.lock_rules))],
            ));
            if d.lock_strength > 0 {
                sections.push(fill(LOCK_ESCALATION_TEMPLATE, &[("level", &d.lock_strength.to_string())]));
            }
            sections.push(body);
            if d.targeted {
                sections.push(fill(MODIFICATION_TEMPLATE, &[("delta", d.delta.trim())]));
            } else {
                sections.push(UNTARGETED_PANEL_LINE.to_string());
            }
            sections.push(PRECEDENCE_LINE.to_string());
            (sections.join("\n\n"), d.strength, d.lock_strength)
        }
    };

    PromptBundle {
        panel_id: panel.id.clone(),
        positive_prompt,
        negative_prompt: negative_prompt(layout.sheet_type),
        seed,
        size_px: SizePx { width, height },
        spec_hash: content_hash(spec).as_str().to_string(),
        model_hint: model_hint(panel.prompt_role).to_string(),
        strength,
        lock_strength,
    }
}

/// Formats a quantity without trailing zeros: 10.0 → "10", 2.750 → "2.75".
pub(crate) fn fmt_num(value: f64) -> String {
    let s = format!("{value:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn model_hint(role: PromptRole) -> &'static str {
    match role {
        PromptRole::FloorPlan { .. } | PromptRole::Elevation { .. } | PromptRole::Section { .. } => {
            "technical-linework"
        }
        PromptRole::Perspective | PromptRole::Axonometric => "photoreal-render",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Canonical body
// ────────────────────────────────────────────────────────────────────────────

fn render_body(spec: &DesignSpecification, role: PromptRole) -> String {
    let facts = fill(
        FACTS_TEMPLATE,
        &[
            ("building_type", &spec.building_type),
            ("style", &spec.style),
            ("dimensions", &dimensions_phrase(&spec.dimensions)),
            ("materials", &materials_phrase(&spec.materials)),
            ("roof", &roof_phrase(&spec.roof)),
        ],
    );

    match role {
        PromptRole::FloorPlan { level } => fill(
            FLOOR_PLAN_TEMPLATE,
            &[
                ("level_name", &level_name(level, spec.dimensions.floors)),
                ("facts", &facts),
                ("rooms", &rooms_phrase(spec, level)),
                ("openings", &openings_phrase(spec.openings.iter())),
            ],
        ),
        PromptRole::Elevation { facade } => fill(
            ELEVATION_TEMPLATE,
            &[
                ("facade", facade.as_str()),
                ("facts", &facts),
                ("openings", &openings_phrase(spec.openings_on(facade))),
            ],
        ),
        PromptRole::Section { axis } => {
            let (name, cut) = match axis {
                SectionAxis::Longitudinal => ("A-A", "along the building length"),
                SectionAxis::Transverse => ("B-B", "across the building width"),
            };
            fill(
                SECTION_TEMPLATE,
                &[
                    ("section_name", name),
                    ("axis", cut),
                    ("facts", &facts),
                    ("floor_height", &fmt_num(spec.dimensions.floor_height())),
                ],
            )
        }
        PromptRole::Perspective => fill(
            PERSPECTIVE_TEMPLATE,
            &[("facts", &facts), ("openings", &openings_phrase(spec.openings.iter()))],
        ),
        PromptRole::Axonometric => fill(AXONOMETRIC_TEMPLATE, &[("facts", &facts)]),
    }
}

fn dimensions_phrase(d: &Dimensions) -> String {
    let floors = if d.floors == 1 { "1 floor".to_string() } else { format!("{} floors", d.floors) };
    format!(
        "{} m long × {} m wide × {} m high, {}",
        fmt_num(d.length),
        fmt_num(d.width),
        fmt_num(d.height),
        floors
    )
}

fn materials_phrase(materials: &[Material]) -> String {
    materials
        .iter()
        .map(|m| format!("{} {} ({})", m.name, m.hex_color, m.application))
        .collect::<Vec<_>>()
        .join(", ")
}

fn roof_phrase(r: &Roof) -> String {
    format!("{} roof, {}° pitch, {}", r.roof_type.as_str(), fmt_num(r.pitch), r.material)
}

fn level_name(level: u32, floors: u32) -> String {
    if level >= floors {
        return "roof plan".to_string();
    }
    match level {
        0 => "ground floor".to_string(),
        1 => "first floor".to_string(),
        2 => "second floor".to_string(),
        3 => "third floor".to_string(),
        n => format!("floor {n}"),
    }
}

fn rooms_phrase(spec: &DesignSpecification, level: u32) -> String {
    let rooms: Vec<String> = spec
        .rooms_on(level)
        .map(|r| match r.area_m2 {
            Some(area) => format!("{} {} m²", r.name, fmt_num(area)),
            None => r.name.clone(),
        })
        .collect();
    if rooms.is_empty() {
        "none specified".to_string()
    } else {
        rooms.join(", ")
    }
}

fn opening_phrase(o: &Opening) -> String {
    let mut s = format!(
        "{} × {} {} m × {} m",
        o.count,
        o.kind.as_str(),
        fmt_num(o.width_m),
        fmt_num(o.height_m)
    );
    if o.sill_height_m > 0.0 {
        s.push_str(&format!(" (sill {} m)", fmt_num(o.sill_height_m)));
    }
    s.push_str(&format!(" on {}", o.facade.as_str()));
    s
}

fn openings_phrase<'a>(openings: impl Iterator<Item = &'a Opening>) -> String {
    let parts: Vec<String> = openings.map(opening_phrase).collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Locked facts
// ────────────────────────────────────────────────────────────────────────────

/// One phrase per lock rule, in rule order, rendered from the baseline.
fn locked_facts(baseline: &DesignSpecification, rules: &[String]) -> String {
    let phrases: Vec<String> = rules.iter().filter_map(|rule| lock_phrase(baseline, rule)).collect();
    if phrases.is_empty() {
        "overall massing and proportions".to_string()
    } else {
        phrases.join("; ")
    }
}

fn lock_phrase(b: &DesignSpecification, rule: &str) -> Option<String> {
    let d = &b.dimensions;
    let phrase = match rule {
        "id" => format!("design {}", b.id),
        "seed" => format!("seed {}", b.seed),
        "buildingType" => format!("building type {}", b.building_type),
        "style" => format!("style {}", b.style),
        "dimensions" => format!("dimensions {}", dimensions_phrase(d)),
        "dimensions.length" => format!("length {} m", fmt_num(d.length)),
        "dimensions.width" => format!("width {} m", fmt_num(d.width)),
        "dimensions.height" => format!("height {} m", fmt_num(d.height)),
        "dimensions.floors" => format!("{} floors", d.floors),
        "materials" => format!("materials {}", materials_phrase(&b.materials)),
        "rooms" => {
            let all: Vec<String> = (0..d.floors).map(|f| rooms_phrase(b, f)).collect();
            format!("rooms {}", all.join(" / "))
        }
        "openings" => format!("openings {}", openings_phrase(b.openings.iter())),
        "roof" => format!("roof {}", roof_phrase(&b.roof)),
        "roof.type" => format!("roof type {}", b.roof.roof_type.as_str()),
        "roof.pitch" => format!("roof pitch {}°", fmt_num(b.roof.pitch)),
        "roof.material" => format!("roof material {}", b.roof.material),
        _ => return None,
    };
    Some(phrase)
}
