//! Modification Service: turns a modification request into a locked re-run
//! of the latest baseline.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::baseline::BaselineArtifactBundle;
use crate::config::EngineConfig;
use crate::dna::{apply_overrides, ValidationError};
use crate::errors::{EngineError, RunFailure};
use crate::orchestrator::{CancelToken, ModifyPlan, Orchestrator, RunOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyMode {
    /// Regenerate only the targeted panels; reuse baseline images elsewhere.
    Patch,
    /// Regenerate every panel under the baseline lock.
    #[default]
    Regenerate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyToggles {
    /// Panel ids the delta applies to. Empty means every panel.
    #[serde(default)]
    pub target_panels: Vec<String>,
    /// Dotted-path edits to the baseline DNA, e.g. `"materials.0.hexColor"`.
    #[serde(default)]
    pub spec_overrides: BTreeMap<String, Value>,
    /// Generation strength in (0, 1]; defaults from the engine config.
    #[serde(default)]
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRequest {
    #[serde(default)]
    pub design_id: String,
    #[serde(default)]
    pub delta_prompt: String,
    #[serde(default)]
    pub toggles: ModifyToggles,
    #[serde(default)]
    pub mode: ModifyMode,
}

#[derive(Clone)]
pub struct ModificationService {
    orchestrator: Orchestrator,
}

impl ModificationService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Loads the latest baseline under the design lock and re-runs it with the
    /// request merged in. Every failure carries the latest accepted version.
    pub async fn modify(
        &self,
        request: &ModificationRequest,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, RunFailure> {
        let design_id = request.design_id.trim();
        let guard = self.orchestrator.lock(design_id).await;

        let baseline = self
            .orchestrator
            .store()
            .get(design_id, None)
            .await
            .map_err(|e| RunFailure::new(e, None))?
            .ok_or_else(|| {
                RunFailure::new(
                    EngineError::BaselineMissing {
                        design_id: design_id.to_string(),
                    },
                    None,
                )
            })?;
        let last_good = Some(baseline.version);

        let plan = build_plan(request, baseline, config).map_err(|e| RunFailure::new(e, last_good))?;
        info!(
            design_id,
            baseline_version = plan.baseline.version,
            mode = ?request.mode,
            overrides = request.toggles.spec_overrides.len(),
            "modification planned"
        );

        self.orchestrator
            .run_modify(&plan, &guard, config, cancel)
            .await
            .map_err(|e| RunFailure::new(e, last_good))
    }
}

fn build_plan(
    request: &ModificationRequest,
    baseline: BaselineArtifactBundle,
    config: &EngineConfig,
) -> Result<ModifyPlan, ValidationError> {
    let mut issues = Vec::new();
    let delta_prompt = request.delta_prompt.trim().to_string();
    let toggles = &request.toggles;

    if delta_prompt.is_empty() && toggles.spec_overrides.is_empty() {
        issues.push("deltaPrompt or specOverrides is required".to_string());
    }

    let layout = &baseline.baseline_layout;
    for id in &toggles.target_panels {
        if layout.panel(id).is_none() {
            issues.push(format!(
                "unknown panel '{id}' (sheet has: {})",
                layout.panel_ids().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    let strength = toggles.strength.unwrap_or(config.modify.default_strength);
    if !(strength > 0.0 && strength <= 1.0) {
        issues.push(format!("strength must be in (0, 1], got {strength}"));
    }

    let mut candidate_raw = serde_json::to_value(&baseline.baseline_dna)
        .map_err(|e| ValidationError::single(format!("baseline DNA is not serialisable: {e}")))?;
    if let Err(e) = apply_overrides(&mut candidate_raw, &toggles.spec_overrides) {
        issues.extend(e.issues);
    }

    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }

    let targeted: BTreeSet<String> = if toggles.target_panels.is_empty() {
        layout.panel_ids().map(str::to_string).collect()
    } else {
        toggles.target_panels.iter().cloned().collect()
    };

    Ok(ModifyPlan {
        baseline,
        candidate_raw,
        delta_prompt,
        targeted,
        strength,
        reuse_untouched: request.mode == ModifyMode::Patch,
    })
}
