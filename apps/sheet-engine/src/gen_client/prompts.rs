// Prompt constants for the reasoning service.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for turning a free-text project brief into a design specification.
pub const BRIEF_TO_SPEC_SYSTEM: &str = "You are an architectural design assistant. \
    You convert client project briefs into precise, buildable design specifications \
    for a single building. Use metric units throughout.";

/// Brief → spec prompt. Replace: {sheet_type}, {brief_text}
pub const BRIEF_TO_SPEC_TEMPLATE: &str = r##"Convert the project brief below into a design specification.

Return a JSON object with this schema:
{
  "buildingType": "residential",
  "style": "contemporary",
  "dimensions": {"length": 12.0, "width": 8.0, "height": 6.0, "floors": 2},
  "materials": [{"name": "red brick", "hexColor": "#8B4513", "application": "facade"}],
  "rooms": [{"name": "living room", "areaM2": 28.0, "floor": 0}],
  "openings": [{"kind": "window", "facade": "south", "count": 4}],
  "roof": {"type": "gable", "pitch": 35, "material": "slate"}
}

Rules:
- Dimensions are in metres. Floor-to-floor height must be between 2.4 and 4.0 m.
- Every material needs a hex colour.
- opening kind is one of: window, door, entrance, patio, french.
- facade is one of: north, south, east, west.
- roof type is one of: gable, hip, flat, mono-pitch, mansard.
- Only include rooms the brief implies.

The sheet being prepared is a {sheet_type} sheet.

PROJECT BRIEF:
{brief_text}"##;
