//! The run loop for both modes.
//!
//! Generation for a run always completes before validation starts, retries
//! regenerate only the panels named by the recommended correction, and a
//! bundle is written only after the run passed validation and composition.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::baseline::{BaselineArtifactBundle, BaselineStore, RunStats, SeedRecord};
use crate::config::EngineConfig;
use crate::dna::{check_lineage, content_hash, normalize, DesignSpecification};
use crate::drift::{
    check_generate, validate_modify, CorrectionAction, DriftReport, ModifyCheck,
    SimilarityPrimitives, Verdict,
};
use crate::errors::{EngineError, RunFailure};
use crate::gen_client::{GenerationClient, GenerationResult, TokenBucket};
use crate::layout::{LayoutConfig, LayoutRegistry, SheetType};
use crate::prompt::{build_prompt, ModifyDirectives, PromptBundle, PromptMode};

use super::compositor::Compositor;
use super::locks::{DesignGuard, DesignLocks};
use super::scheduler::{BatchScheduler, CancelToken};
use super::state::{RunState, RunStateMachine};

/// A modification resolved against its baseline, ready to run.
#[derive(Debug, Clone)]
pub struct ModifyPlan {
    pub baseline: BaselineArtifactBundle,
    /// Baseline DNA with overrides applied, not yet normalized.
    pub candidate_raw: Value,
    pub delta_prompt: String,
    pub targeted: BTreeSet<String>,
    pub strength: f64,
    /// Copy baseline images for untargeted panels instead of regenerating them.
    pub reuse_untouched: bool,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub bundle: BaselineArtifactBundle,
    pub report: DriftReport,
}

#[derive(Clone)]
pub struct Orchestrator {
    client: GenerationClient,
    similarity: Arc<dyn SimilarityPrimitives>,
    compositor: Arc<dyn Compositor>,
    store: BaselineStore,
    layouts: Arc<LayoutRegistry>,
    locks: DesignLocks,
}

impl Orchestrator {
    pub fn new(
        client: GenerationClient,
        similarity: Arc<dyn SimilarityPrimitives>,
        compositor: Arc<dyn Compositor>,
        store: BaselineStore,
        layouts: Arc<LayoutRegistry>,
    ) -> Self {
        Self {
            client,
            similarity,
            compositor,
            store,
            layouts,
            locks: DesignLocks::new(),
        }
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    /// Serialises runs for one design id. Modify callers hold this while
    /// loading the baseline so the plan is never built from a stale version.
    pub async fn lock(&self, design_id: &str) -> DesignGuard {
        self.locks.acquire(design_id).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Generate
    // ────────────────────────────────────────────────────────────────────────

    /// Fresh generation of a whole sheet from a raw specification.
    pub async fn run_generate(
        &self,
        raw: &Value,
        sheet_type: SheetType,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, RunFailure> {
        let spec = normalize(raw).map_err(|e| RunFailure::new(e, None))?;
        let _guard = self.lock(&spec.id).await;
        let last_good = self
            .store
            .latest_version(&spec.id)
            .await
            .map_err(|e| RunFailure::new(e, None))?;

        info!(design_id = %spec.id, sheet_type = %sheet_type, "generate run started");
        let mut sm = RunStateMachine::new(&spec.id);
        match self.generate_inner(&spec, sheet_type, last_good, config, cancel, &mut sm).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                sm.fail();
                warn!(design_id = %spec.id, "generate run failed: {error}");
                Err(RunFailure::new(error, last_good))
            }
        }
    }

    async fn generate_inner(
        &self,
        spec: &DesignSpecification,
        sheet_type: SheetType,
        parent: Option<u32>,
        config: &EngineConfig,
        cancel: &CancelToken,
        sm: &mut RunStateMachine,
    ) -> Result<RunOutcome, EngineError> {
        let layout = self
            .layouts
            .get(sheet_type)
            .ok_or_else(|| EngineError::Internal(format!("no layout registered for {sheet_type}")))?
            .clone();
        let bundles: Vec<PromptBundle> = layout
            .panels
            .iter()
            .map(|p| build_prompt(spec, &layout, p, &PromptMode::Generate))
            .collect();

        let policy = config.drift_policy();
        let limiter = config.new_limiter();
        let scheduler = BatchScheduler::new(config.concurrency.batch_size);
        let mut stats = RunStats::default();
        let mut results: BTreeMap<String, GenerationResult> = BTreeMap::new();
        let mut pending: Vec<&PromptBundle> = bundles.iter().collect();
        let mut attempt = 0;

        let report = loop {
            attempt += 1;
            sm.transition(RunState::Generating)?;
            for result in self.generate_all(&pending, &limiter, &scheduler, cancel).await? {
                record(&mut stats, &result);
                results.insert(result.panel_id.clone(), result);
            }

            sm.transition(RunState::Validating)?;
            let announced = reread(spec)?;
            let report = check_generate(spec, &announced, &bundles, &results, attempt, &policy);
            info!(design_id = %spec.id, attempt, verdict = ?report.verdict, "generate validation");

            match report.verdict {
                Verdict::Accept => break report,
                Verdict::Reject => {
                    return Err(EngineError::DriftExceeded {
                        attempts: attempt,
                        report: Box::new(report),
                    })
                }
                Verdict::RetryWithStrongerLock => {
                    sm.transition(RunState::Retrying)?;
                    let retry: BTreeSet<String> = report
                        .recommended_correction
                        .as_ref()
                        .map(|c| c.panels.iter().cloned().collect())
                        .unwrap_or_default();
                    warn!(design_id = %spec.id, attempt, panels = ?retry, "regenerating panels");
                    for id in &retry {
                        results.remove(id);
                    }
                    pending = bundles.iter().filter(|b| retry.contains(&b.panel_id)).collect();
                }
            }
        };
        stats.attempts = attempt;

        let images: BTreeMap<String, String> = results
            .iter()
            .map(|(id, r)| (id.clone(), r.image_ref.clone()))
            .collect();

        sm.transition(RunState::Composing)?;
        let sheet = self.compositor.compose(&layout, &images).await?;

        sm.transition(RunState::Finalizing)?;
        stats.states = sm.history().to_vec();
        let bundle = BaselineArtifactBundle {
            design_id: spec.id.clone(),
            sheet_id: Uuid::new_v4().to_string(),
            version: parent.map_or(1, |v| v + 1),
            parent_version: parent,
            sheet_type,
            baseline_image: sheet.sheet_ref.clone(),
            per_panel_images: images,
            baseline_dna: spec.clone(),
            seeds: SeedRecord {
                base: spec.seed,
                per_panel: bundles.iter().map(|b| (b.panel_id.clone(), b.seed)).collect(),
            },
            base_prompt: bundles.into_iter().map(|b| (b.panel_id.clone(), b)).collect(),
            spec_hash: content_hash(spec).as_str().to_string(),
            baseline_layout: layout,
            delta_prompt: None,
            sheet,
            drift_report: report.clone(),
            run_stats: stats,
            created_at: Utc::now(),
        };
        self.store.create(&bundle).await?;
        sm.transition(RunState::Done)?;

        info!(design_id = %spec.id, version = bundle.version, attempts = attempt, "generate run finished");
        Ok(RunOutcome { bundle, report })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Modify
    // ────────────────────────────────────────────────────────────────────────

    /// Runs a modification against its baseline. The caller must hold the
    /// design's lock for the whole call.
    pub async fn run_modify(
        &self,
        plan: &ModifyPlan,
        guard: &DesignGuard,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, EngineError> {
        let design_id = plan.baseline.design_id.as_str();
        if guard.design_id() != design_id {
            return Err(EngineError::Internal(format!(
                "lock for '{}' does not cover design '{design_id}'",
                guard.design_id()
            )));
        }

        info!(
            design_id,
            baseline_version = plan.baseline.version,
            targets = ?plan.targeted,
            patch = plan.reuse_untouched,
            "modify run started"
        );
        let mut sm = RunStateMachine::new(design_id);
        let result = self.modify_inner(plan, config, cancel, &mut sm).await;
        if let Err(error) = &result {
            sm.fail();
            warn!(design_id, "modify run failed: {error}");
        }
        result
    }

    async fn modify_inner(
        &self,
        plan: &ModifyPlan,
        config: &EngineConfig,
        cancel: &CancelToken,
        sm: &mut RunStateMachine,
    ) -> Result<RunOutcome, EngineError> {
        let baseline = &plan.baseline;
        let design_id = baseline.design_id.as_str();

        let candidate = normalize(&plan.candidate_raw)?;
        check_lineage(&baseline.baseline_dna, &candidate)?;
        let layout: LayoutConfig = baseline.baseline_layout.clone();
        layout.validate()?;
        let rules = baseline.baseline_dna.consistency_rules.clone();

        let policy = config.drift_policy();
        let limiter = config.new_limiter();
        let scheduler = BatchScheduler::new(config.concurrency.batch_size);
        let mut stats = RunStats::default();

        let mut images = baseline.per_panel_images.clone();
        let mut prompts = baseline.base_prompt.clone();
        let mut results: BTreeMap<String, GenerationResult> = BTreeMap::new();
        let mut pending: Vec<String> = layout
            .panel_ids()
            .filter(|id| !plan.reuse_untouched || plan.targeted.contains(*id))
            .map(str::to_string)
            .collect();
        stats.reused_panels = (layout.panels.len() - pending.len()) as u32;

        let mut lock_strength = 0;
        let mut strength = plan.strength;
        let mut attempt = 0;

        let report = loop {
            attempt += 1;
            sm.transition(RunState::Generating)?;
            let bundles: Vec<PromptBundle> = pending
                .iter()
                .filter_map(|id| layout.panel(id))
                .map(|panel| {
                    let mode = PromptMode::Modify(ModifyDirectives {
                        baseline: &baseline.baseline_dna,
                        design_id,
                        seeds: &baseline.seeds,
                        lock_rules: &rules,
                        delta: &plan.delta_prompt,
                        targeted: plan.targeted.contains(&panel.id),
                        lock_strength,
                        strength: Some(strength),
                    });
                    build_prompt(&candidate, &layout, panel, &mode)
                })
                .collect();
            let refs: Vec<&PromptBundle> = bundles.iter().collect();
            for result in self.generate_all(&refs, &limiter, &scheduler, cancel).await? {
                record(&mut stats, &result);
                images.insert(result.panel_id.clone(), result.image_ref.clone());
                results.insert(result.panel_id.clone(), result);
            }

            sm.transition(RunState::Validating)?;
            let check = ModifyCheck {
                baseline_spec: &baseline.baseline_dna,
                candidate_spec: &candidate,
                lock_rules: &rules,
                layout: &layout,
                baseline_images: &baseline.per_panel_images,
                candidate_images: &images,
                targeted: &plan.targeted,
                requested: &bundles,
                results: &results,
                attempt,
            };
            let report = validate_modify(self.similarity.as_ref(), &check, &policy).await?;
            for bundle in bundles {
                prompts.insert(bundle.panel_id.clone(), bundle);
            }
            info!(
                design_id,
                attempt,
                verdict = ?report.verdict,
                ssim_whole = report.image_delta.as_ref().map(|d| d.ssim_whole),
                "modify validation"
            );

            match report.verdict {
                Verdict::Accept => break report,
                Verdict::Reject => {
                    return Err(EngineError::DriftExceeded {
                        attempts: attempt,
                        report: Box::new(report),
                    })
                }
                Verdict::RetryWithStrongerLock => {
                    sm.transition(RunState::Retrying)?;
                    let failed_checks = report.failed_checks().count();
                    let Some(correction) = report.recommended_correction else {
                        return Err(EngineError::Internal("retry verdict without a correction".into()));
                    };
                    if let CorrectionAction::StrengthenLock {
                        raise_lock,
                        strength_factor,
                    } = correction.action
                    {
                        lock_strength += raise_lock;
                        strength = (strength * strength_factor).max(config.correction.min_strength);
                    }
                    warn!(
                        design_id,
                        attempt,
                        failed_checks,
                        lock_strength,
                        strength,
                        action = ?correction.action,
                        panels = ?correction.panels,
                        "retrying modified panels"
                    );
                    for id in &correction.panels {
                        results.remove(id);
                    }
                    pending = correction.panels;
                }
            }
        };
        stats.attempts = attempt;

        sm.transition(RunState::Composing)?;
        let sheet = self.compositor.compose(&layout, &images).await?;

        sm.transition(RunState::Finalizing)?;
        stats.states = sm.history().to_vec();
        let latest = self.store.latest_version(design_id).await?.unwrap_or(baseline.version);
        let bundle = BaselineArtifactBundle {
            design_id: design_id.to_string(),
            sheet_id: Uuid::new_v4().to_string(),
            version: latest + 1,
            parent_version: Some(baseline.version),
            sheet_type: baseline.sheet_type,
            baseline_image: sheet.sheet_ref.clone(),
            per_panel_images: images,
            seeds: SeedRecord {
                base: baseline.seeds.base,
                per_panel: prompts.iter().map(|(id, b)| (id.clone(), b.seed)).collect(),
            },
            base_prompt: prompts,
            spec_hash: content_hash(&candidate).as_str().to_string(),
            baseline_dna: candidate,
            baseline_layout: layout,
            delta_prompt: Some(plan.delta_prompt.clone()),
            sheet,
            drift_report: report.clone(),
            run_stats: stats,
            created_at: Utc::now(),
        };
        self.store.create(&bundle).await?;
        sm.transition(RunState::Done)?;

        info!(design_id, version = bundle.version, attempts = attempt, "modify run finished");
        Ok(RunOutcome { bundle, report })
    }

    /// Generates every bundle under the run's limiter, batch by batch.
    async fn generate_all(
        &self,
        bundles: &[&PromptBundle],
        limiter: &TokenBucket,
        scheduler: &BatchScheduler,
        cancel: &CancelToken,
    ) -> Result<Vec<GenerationResult>, EngineError> {
        let jobs: Vec<_> = bundles
            .iter()
            .map(|b| self.client.generate_image(b, limiter))
            .collect();
        scheduler
            .run(jobs, cancel)
            .await?
            .into_iter()
            .map(|r| r.map_err(EngineError::from))
            .collect()
    }
}

fn record(stats: &mut RunStats, result: &GenerationResult) {
    stats.generation_calls += result.attempts;
    stats.total_latency_ms += result.latency_ms;
}

/// Round-trips the spec through its serialised form.
fn reread(spec: &DesignSpecification) -> Result<DesignSpecification, EngineError> {
    let value = serde_json::to_value(spec).map_err(|e| EngineError::Internal(e.to_string()))?;
    normalize(&value)
        .map_err(|e| EngineError::Internal(format!("serialised spec no longer validates: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{
        orchestrator, raw_spec, test_config, StubImageService, StubReasoningService, StubSimilarity,
    };

    fn plain(image: &StubImageService, similarity: StubSimilarity) -> Orchestrator {
        orchestrator(image, &StubReasoningService::new("{}"), similarity)
    }

    async fn baseline(orch: &Orchestrator, design_id: &str) -> BaselineArtifactBundle {
        orch.run_generate(&raw_spec(design_id), SheetType::Presentation, &test_config(), &CancelToken::new())
            .await
            .unwrap()
            .bundle
    }

    fn plan(baseline: BaselineArtifactBundle, targets: &[&str], reuse_untouched: bool) -> ModifyPlan {
        ModifyPlan {
            candidate_raw: serde_json::to_value(&baseline.baseline_dna).unwrap(),
            baseline,
            delta_prompt: "add a second entrance".to_string(),
            targeted: targets.iter().map(|t| t.to_string()).collect(),
            strength: 0.35,
            reuse_untouched,
        }
    }

    #[tokio::test]
    async fn test_generate_creates_first_version() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let outcome = orch
            .run_generate(&raw_spec("house-1"), SheetType::Presentation, &test_config(), &CancelToken::new())
            .await
            .unwrap();

        let bundle = &outcome.bundle;
        assert_eq!(bundle.version, 1);
        assert_eq!(bundle.parent_version, None);
        assert_eq!(bundle.per_panel_images.len(), 4);
        assert_eq!(bundle.seeds.per_panel.len(), 4);
        assert_eq!(outcome.report.verdict, Verdict::Accept);
        assert_eq!(image.calls(), 4);
        assert_eq!(bundle.run_stats.states.first(), Some(&RunState::Planning));
        assert_eq!(bundle.run_stats.states.last(), Some(&RunState::Finalizing));
        assert_eq!(orch.store().latest_version("house-1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_seed_mismatch_regenerates_only_that_panel() {
        let image = StubImageService::new().wrong_seed_for(1);
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let outcome = orch
            .run_generate(&raw_spec("house-1"), SheetType::Presentation, &test_config(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(image.calls(), 5);
        assert_eq!(outcome.report.attempt, 2);
        assert_eq!(outcome.bundle.run_stats.attempts, 2);
        assert!(outcome.bundle.run_stats.states.contains(&RunState::Retrying));
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_no_baseline() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let cancel = CancelToken::new();
        cancel.cancel();
        let failure = orch
            .run_generate(&raw_spec("house-1"), SheetType::Presentation, &test_config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, EngineError::Cancelled));
        assert_eq!(failure.last_good_version, None);
        assert_eq!(image.calls(), 0);
        assert_eq!(orch.store().latest_version("house-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_regenerating_a_design_appends_a_version() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        baseline(&orch, "house-1").await;
        let second = baseline(&orch, "house-1").await;
        assert_eq!(second.version, 2);
        assert_eq!(second.parent_version, Some(1));
    }

    #[tokio::test]
    async fn test_invalid_spec_fails_in_planning() {
        let orch = plain(&StubImageService::new(), StubSimilarity::new(1.0, 0));
        let mut raw = raw_spec("house-1");
        raw["dimensions"]["length"] = serde_json::json!(-5);
        let failure = orch
            .run_generate(&raw, SheetType::Technical, &test_config(), &CancelToken::new())
            .await
            .unwrap_err();
        match failure.error {
            EngineError::Validation(e) => {
                assert!(e.issues.iter().any(|i| i.contains("length must be > 0")))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_drifting_modify_rejects_after_three_attempts() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(0.80, 0));
        let base = baseline(&orch, "house-1").await;

        let guard = orch.lock("house-1").await;
        let err = orch
            .run_modify(&plan(base, &["perspective-hero"], false), &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap_err();

        match err {
            EngineError::DriftExceeded { attempts, report } => {
                assert_eq!(attempts, 3);
                assert_eq!(report.verdict, Verdict::Reject);
                assert_eq!(report.attempt, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // baseline run, then all four panels, then the three untargeted ones twice
        assert_eq!(image.calls(), 4 + 4 + 3 + 3);
        assert_eq!(orch.store().latest_version("house-1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_retry_escalates_lock_and_decays_strength() {
        let image = StubImageService::new();
        let prompts = image.clone();
        let similarity = StubSimilarity::with_fn(
            move |_, candidate| match prompts.prompt_for(candidate) {
                Some(p) if p.contains("STRICT LOCK") || p.contains("MODIFICATION:") => 0.97,
                _ => 0.80,
            },
            0,
        );
        let orch = plain(&image, similarity);
        let base = baseline(&orch, "house-1").await;

        let guard = orch.lock("house-1").await;
        let outcome = orch
            .run_modify(&plan(base, &["perspective-hero"], false), &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.report.attempt, 2);
        assert_eq!(outcome.bundle.version, 2);
        assert_eq!(outcome.bundle.parent_version, Some(1));
        assert_eq!(outcome.bundle.delta_prompt.as_deref(), Some("add a second entrance"));

        let requests = image.requests();
        assert_eq!(requests.len(), 4 + 4 + 3);
        for retry in &requests[8..] {
            assert!(retry.prompt.contains("STRICT LOCK level 1"));
            assert!((retry.strength.unwrap() - 0.245).abs() < 1e-9);
        }
        let escalated = &outcome.bundle.base_prompt["section-aa"];
        assert_eq!(escalated.lock_strength, 1);
    }

    #[tokio::test]
    async fn test_patch_mode_reuses_untargeted_images() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let base = baseline(&orch, "house-1").await;

        let guard = orch.lock("house-1").await;
        let outcome = orch
            .run_modify(&plan(base.clone(), &["perspective-hero"], true), &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(image.calls(), 4 + 1);
        assert_eq!(outcome.bundle.run_stats.reused_panels, 3);
        for (panel, image_ref) in &outcome.bundle.per_panel_images {
            let same = base.per_panel_images[panel] == *image_ref;
            assert_eq!(same, panel != "perspective-hero", "{panel}");
        }
        assert_eq!(outcome.bundle.seeds.per_panel, base.seeds.per_panel);
    }

    #[tokio::test]
    async fn test_locked_override_is_rejected_without_retry() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let base = baseline(&orch, "house-1").await;
        let mut p = plan(base, &[], false);
        p.candidate_raw["dimensions"]["length"] = serde_json::json!(12);

        let guard = orch.lock("house-1").await;
        let err = orch
            .run_modify(&p, &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            EngineError::DriftExceeded { attempts, report } => {
                assert_eq!(attempts, 1);
                assert_eq!(report.dna_delta.locked_violations, vec!["dimensions"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_modify_reissues_panel_answered_with_wrong_seed() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let base = baseline(&orch, "house-1").await;
        let _ = image.clone().wrong_seed_for(1);

        let guard = orch.lock("house-1").await;
        let outcome = orch
            .run_modify(&plan(base.clone(), &["perspective-hero"], false), &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.report.attempt, 2);
        let requests = image.requests();
        assert_eq!(requests.len(), 4 + 4 + 1);
        assert!(!requests[8].prompt.contains("STRICT LOCK"), "seed reissue must not escalate the lock");
        assert_eq!(requests[8].seed, requests[4].seed);
        assert_eq!(outcome.bundle.seeds.per_panel, base.seeds.per_panel);
    }

    #[tokio::test]
    async fn test_relaxing_lock_rules_fails_before_generation() {
        let image = StubImageService::new();
        let orch = plain(&image, StubSimilarity::new(1.0, 0));
        let base = baseline(&orch, "house-1").await;
        let mut p = plan(base, &[], false);
        p.candidate_raw["consistencyRules"] = serde_json::json!([]);
        p.candidate_raw["seed"] = serde_json::json!(7);

        let guard = orch.lock("house-1").await;
        let err = orch
            .run_modify(&p, &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            EngineError::Validation(e) => {
                assert_eq!(e.issues.len(), 2);
                assert!(e.issues[0].starts_with("seed is fixed"));
                assert!(e.issues[1].contains("dimensions, materials, roof"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(image.calls(), 4);
    }

    #[tokio::test]
    async fn test_modify_requires_the_matching_design_lock() {
        let orch = plain(&StubImageService::new(), StubSimilarity::new(1.0, 0));
        let base = baseline(&orch, "house-1").await;
        let guard = orch.lock("house-2").await;
        let err = orch
            .run_modify(&plan(base, &[], false), &guard, &test_config(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }
}
