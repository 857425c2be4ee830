// Prompt Builder: pure (spec, panel, mode) → PromptBundle.
// No I/O and no randomness beyond the explicit seed.

pub mod builder;
pub mod seed;
pub mod templates;

pub use builder::{build_prompt, ModifyDirectives, PromptBundle, PromptMode, SizePx};
