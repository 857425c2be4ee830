//! Engine: the exposed interface. `generate`, `modify`, `get_history`.
//!
//! Owns the run policy and hands it to every run explicitly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::baseline::{BaselineArtifactBundle, StoreError, VersionSummary};
use crate::config::EngineConfig;
use crate::dna::ValidationError;
use crate::drift::DriftReport;
use crate::errors::{EngineError, RunFailure};
use crate::gen_client::prompts::{BRIEF_TO_SPEC_SYSTEM, BRIEF_TO_SPEC_TEMPLATE};
use crate::gen_client::ReasoningRequest;
use crate::layout::SheetType;
use crate::modify::{ModificationRequest, ModificationService};
use crate::orchestrator::{CancelToken, ComposedSheet, Orchestrator, RunOutcome};

/// Raw input from the upstream brief producer. Either `spec` (a loosely typed
/// specification) or `brief_text` (free text for the reasoning service).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBrief {
    #[serde(default)]
    pub design_id: Option<String>,
    #[serde(default)]
    pub sheet_type: SheetType,
    #[serde(default)]
    pub spec: Option<Value>,
    #[serde(default)]
    pub brief_text: Option<String>,
}

/// What generate and modify hand back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetResult {
    pub design_id: String,
    pub bundle_version: u32,
    pub parent_version: Option<u32>,
    pub sheet: ComposedSheet,
    pub drift_report: DriftReport,
}

impl From<RunOutcome> for SheetResult {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            design_id: outcome.bundle.design_id,
            bundle_version: outcome.bundle.version,
            parent_version: outcome.bundle.parent_version,
            sheet: outcome.bundle.sheet,
            drift_report: outcome.report,
        }
    }
}

pub struct Engine {
    orchestrator: Orchestrator,
    modifications: ModificationService,
    config: EngineConfig,
}

impl Engine {
    pub fn new(orchestrator: Orchestrator, config: EngineConfig) -> Self {
        Self {
            modifications: ModificationService::new(orchestrator.clone()),
            orchestrator,
            config,
        }
    }

    pub async fn generate(&self, brief: ProjectBrief, cancel: &CancelToken) -> Result<SheetResult, RunFailure> {
        let design_id = brief.design_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let mut raw = match (brief.spec, brief.brief_text.as_deref()) {
            (Some(spec), _) => spec,
            (None, Some(text)) if !text.trim().is_empty() => match self.spec_from_text(text, brief.sheet_type).await {
                Ok(raw) => raw,
                Err(e) => return Err(RunFailure::new(e, self.last_good(design_id).await)),
            },
            _ => {
                return Err(RunFailure::new(
                    ValidationError::single("either spec or briefText is required"),
                    self.last_good(design_id).await,
                ))
            }
        };

        if let (Some(id), Some(obj)) = (design_id, raw.as_object_mut()) {
            obj.insert("id".to_string(), Value::from(id));
        }

        match self.orchestrator.run_generate(&raw, brief.sheet_type, &self.config, cancel).await {
            Ok(outcome) => Ok(outcome.into()),
            Err(mut failure) => {
                // Planning fails before the store is consulted.
                if failure.last_good_version.is_none() {
                    failure.last_good_version = self.last_good(raw.get("id").and_then(Value::as_str)).await;
                }
                Err(failure)
            }
        }
    }

    pub async fn modify(
        &self,
        design_id: &str,
        mut request: ModificationRequest,
        cancel: &CancelToken,
    ) -> Result<SheetResult, RunFailure> {
        request.design_id = design_id.to_string();
        self.modifications
            .modify(&request, &self.config, cancel)
            .await
            .map(SheetResult::from)
    }

    /// Every stored version of the design, oldest first.
    pub async fn get_history(&self, design_id: &str) -> Result<Vec<VersionSummary>, StoreError> {
        let bundles = self.orchestrator.store().list(design_id).await?;
        Ok(bundles.iter().map(VersionSummary::from).collect())
    }

    pub async fn get_version(
        &self,
        design_id: &str,
        version: u32,
    ) -> Result<Option<BaselineArtifactBundle>, StoreError> {
        self.orchestrator.store().get(design_id, Some(version)).await
    }

    async fn spec_from_text(&self, text: &str, sheet_type: SheetType) -> Result<Value, EngineError> {
        info!(sheet_type = %sheet_type, chars = text.len(), "deriving spec from brief text");
        let request = ReasoningRequest {
            system_prompt: BRIEF_TO_SPEC_SYSTEM.to_string(),
            user_prompt: BRIEF_TO_SPEC_TEMPLATE
                .replace("{sheet_type}", sheet_type.as_str())
                .replace("{brief_text}", text.trim()),
            json_mode: true,
        };
        Ok(self.orchestrator.client().generate_reasoning(&request).await?)
    }

    async fn last_good(&self, design_id: Option<&str>) -> Option<u32> {
        let id = design_id?;
        match self.orchestrator.store().latest_version(id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(design_id = id, "could not read latest version: {e}");
                None
            }
        }
    }
}
