use serde::{Deserialize, Serialize};

use crate::dna::DnaDelta;

/// Policy thresholds. Observed values, kept configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPolicy {
    pub ssim_whole_min: f64,
    pub ssim_panel_min: f64,
    pub phash_max_distance: u32,
    /// Validation attempts per run, including the first.
    pub max_attempts: u32,
    /// Multiplier applied to generation strength on each lock escalation.
    pub strength_decay: f64,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self {
            ssim_whole_min: 0.92,
            ssim_panel_min: 0.95,
            phash_max_distance: 5,
            max_attempts: 3,
            strength_decay: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Accept,
    RetryWithStrongerLock,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CorrectionAction {
    /// Raise the lock level and scale down generation strength.
    #[serde(rename_all = "camelCase")]
    StrengthenLock { raise_lock: u32, strength_factor: f64 },
    /// Request the affected panels again with their planned seeds.
    ReissueSeed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedCorrection {
    #[serde(flatten)]
    pub action: CorrectionAction,
    /// Panels to regenerate.
    pub panels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelScore {
    pub panel_id: String,
    pub ssim: f64,
    pub phash_distance: u32,
    pub targeted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDelta {
    /// Panel-area-weighted mean of the per-panel similarities.
    pub ssim_whole: f64,
    pub panels: Vec<PanelScore>,
}

/// One named check and its outcome, kept for run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub dna_delta: DnaDelta,
    pub image_delta: Option<ImageDelta>,
    pub verdict: Verdict,
    pub recommended_correction: Option<RecommendedCorrection>,
    pub attempt: u32,
    pub checks: Vec<CheckResult>,
}

impl DriftReport {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}
