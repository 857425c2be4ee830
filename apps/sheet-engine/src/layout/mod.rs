// Layout Configuration: static, validated panel geometry per sheet type.
// The registry is built once at start-up and is read-only afterwards.

pub mod config;
pub mod sheets;

pub use config::{
    LayoutConfig, LayoutError, LayoutRegistry, PanelSpec, PromptRole, Rect, SectionAxis, SheetType,
    OVERLAP_TOLERANCE,
};
