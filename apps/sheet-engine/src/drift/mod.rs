// Drift Validator: compares intended vs. realised state at the spec level and
// the pixel level, and decides accept / retry / reject.

pub mod report;
pub mod similarity;
pub mod validator;

pub use report::{CorrectionAction, DriftPolicy, DriftReport, Verdict};
pub use similarity::{DriftError, ImageFetcher, LumaSimilarity, RefImageFetcher, SimilarityPrimitives};
pub use validator::{check_generate, validate_modify, ModifyCheck};
