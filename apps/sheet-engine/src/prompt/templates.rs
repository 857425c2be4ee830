// Prompt text constants. Each template names its `{placeholders}`; `fill`
// substitutes them in one pass.

use crate::layout::SheetType;

/// Shared fact block. Replace: {building_type}, {style}, {dimensions}, {materials}, {roof}
pub const FACTS_TEMPLATE: &str = "{building_type} building, {style} style.
Dimensions: {dimensions}.
Materials: {materials}.
Roof: {roof}.";

/// Replace: {level_name}, {facts}, {rooms}, {openings}
pub const FLOOR_PLAN_TEMPLATE: &str = "Architectural floor plan, {level_name}, orthographic top-down view, \
black linework on white, wall thicknesses drawn, room labels and dimension strings.
{facts}
Rooms on this level: {rooms}.
Openings: {openings}.";

/// Replace: {facade}, {facts}, {openings}
pub const ELEVATION_TEMPLATE: &str = "Architectural {facade} elevation, orthographic flat projection, \
no perspective, ground line shown, material hatching.
{facts}
Openings on this facade: {openings}.";

/// Replace: {section_name}, {axis}, {facts}, {floor_height}
pub const SECTION_TEMPLATE: &str = "Architectural section {section_name}, cut {axis}, orthographic, \
showing floor levels, wall build-up and roof structure.
{facts}
Floor-to-floor height: {floor_height} m.";

/// Replace: {facts}, {openings}
pub const PERSPECTIVE_TEMPLATE: &str = "Photorealistic exterior perspective, eye-level three-quarter view, \
soft daylight, landscaped context.
{facts}
Openings: {openings}.";

/// Replace: {facts}
pub const AXONOMETRIC_TEMPLATE: &str = "Axonometric view from above at 30 degrees, clean white background, \
crisp edges, massing clearly legible.
{facts}";

/// Replace: {locked_facts}
pub const LOCK_CLAUSE_TEMPLATE: &str = "LOCKED (preserve exactly, do not alter): {locked_facts}.";

/// Replace: {level}
pub const LOCK_ESCALATION_TEMPLATE: &str = "STRICT LOCK level {level}: any departure from the locked facts \
is an error. Reproduce the baseline geometry, proportions and materials exactly.";

/// Replace: {delta}
pub const MODIFICATION_TEMPLATE: &str = "MODIFICATION: {delta}";

pub const UNTARGETED_PANEL_LINE: &str =
    "This panel is not being modified. Reproduce the baseline rendering unchanged.";

pub const PRECEDENCE_LINE: &str =
    "If any instruction conflicts with a LOCKED fact, the LOCKED fact takes precedence.";

/// Replaces every `{name}` whose name is in `values`. Inserted text is never
/// rescanned, so braces inside user-supplied values stay literal. Unknown
/// names are left as they are.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values.iter().find(|(k, _)| *k == name).map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

const NEGATIVE_COMMON: &str = "watermark, signature, garbled text, blurry, low resolution, \
distorted geometry, inconsistent materials, extra floors, floating elements";

pub fn negative_prompt(sheet: SheetType) -> String {
    let extra = match sheet {
        SheetType::Presentation => "cluttered background, heavy vignette, lens flare",
        SheetType::Technical => "colour fills, shading, perspective distortion, photorealism, people, vehicles",
        SheetType::Concept => "construction lines, dimension strings, title block",
    };
    format!("{NEGATIVE_COMMON}, {extra}")
}
