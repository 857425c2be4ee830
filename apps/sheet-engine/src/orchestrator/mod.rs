// Orchestrator: drives one run through
// Planning → Generating → Validating → (Retrying ⇄ Generating) → Composing → Finalizing → Done.

pub mod compositor;
pub mod locks;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use compositor::{ComposedSheet, CompositorError, ManifestCompositor};
pub use runner::{ModifyPlan, Orchestrator, RunOutcome};
pub use scheduler::{CancelToken, Cancelled};
pub use state::{IllegalTransition, RunState};
