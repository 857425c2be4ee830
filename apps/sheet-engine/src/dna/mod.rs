// Design DNA: the canonical, versioned specification every panel prompt derives from.
// Raw upstream JSON enters through `normalize`; everything downstream sees only
// the fully-typed `DesignSpecification`.

pub mod diff;
pub mod hash;
pub mod models;
pub mod normalize;

pub use diff::{check_lineage, diff, locked_violations, DnaDelta};
pub use hash::{content_hash, ContentHash};
pub use models::{DesignSpecification, Dimensions, Facade, Material, Opening, Roof};
pub use normalize::{apply_overrides, is_valid_design_id, normalize, ValidationError};
