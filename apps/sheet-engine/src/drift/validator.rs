//! Drift checks for both run modes.
//!
//! Scoring (`score_images`, async, touches images) is kept apart from judging
//! (`judge_modify`, pure) so identical scores always give identical verdicts.

use std::collections::{BTreeMap, BTreeSet};

use crate::dna::{content_hash, diff, locked_violations, DesignSpecification, DnaDelta};
use crate::gen_client::GenerationResult;
use crate::layout::LayoutConfig;
use crate::prompt::PromptBundle;

use super::report::{
    CheckResult, CorrectionAction, DriftPolicy, DriftReport, ImageDelta, PanelScore,
    RecommendedCorrection, Verdict,
};
use super::similarity::{DriftError, SimilarityPrimitives};

// ────────────────────────────────────────────────────────────────────────────
// Generate mode
// ────────────────────────────────────────────────────────────────────────────

/// Self-consistency check for a fresh generation.
///
/// `announced` is the spec as re-read from its serialised form; it must match
/// `expected` field for field, and every bundle must have been built from it.
/// Missing results and seed mismatches are retried with the planned seeds.
pub fn check_generate(
    expected: &DesignSpecification,
    announced: &DesignSpecification,
    bundles: &[PromptBundle],
    results: &BTreeMap<String, GenerationResult>,
    attempt: u32,
    policy: &DriftPolicy,
) -> DriftReport {
    let dna_delta = DnaDelta::categorise(diff(expected, announced));
    let expected_hash = content_hash(expected);
    let mut checks = Vec::new();

    checks.push(CheckResult::new(
        "dna.self_consistency",
        dna_delta.total() == 0,
        format!("{} field deltas", dna_delta.total()),
    ));
    let stale: Vec<&str> = bundles
        .iter()
        .filter(|b| b.spec_hash != expected_hash.as_str())
        .map(|b| b.panel_id.as_str())
        .collect();
    checks.push(CheckResult::new(
        "prompt.spec_hash",
        stale.is_empty(),
        if stale.is_empty() {
            format!("all bundles built from {}", expected_hash.short())
        } else {
            format!("stale bundles: {}", stale.join(", "))
        },
    ));

    // Structural inconsistencies are not fixed by regenerating.
    if dna_delta.total() > 0 || !stale.is_empty() {
        return DriftReport {
            dna_delta,
            image_delta: None,
            verdict: Verdict::Reject,
            recommended_correction: None,
            attempt,
            checks,
        };
    }

    let GenerationAudit {
        checks: audit_checks,
        retry_panels,
    } = audit_generation(bundles, results);
    checks.extend(audit_checks);

    let (verdict, recommended_correction) = if retry_panels.is_empty() {
        (Verdict::Accept, None)
    } else if attempt < policy.max_attempts {
        (
            Verdict::RetryWithStrongerLock,
            Some(RecommendedCorrection {
                action: CorrectionAction::ReissueSeed,
                panels: retry_panels,
            }),
        )
    } else {
        (Verdict::Reject, None)
    };

    DriftReport {
        dna_delta,
        image_delta: None,
        verdict,
        recommended_correction,
        attempt,
        checks,
    }
}

/// Result and seed checks for one batch of generation requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationAudit {
    pub checks: Vec<CheckResult>,
    /// Panels with no result or a result produced under a different seed.
    pub retry_panels: Vec<String>,
}

/// Every requested bundle must have a result generated with its planned seed.
pub fn audit_generation(
    bundles: &[PromptBundle],
    results: &BTreeMap<String, GenerationResult>,
) -> GenerationAudit {
    let mut audit = GenerationAudit::default();
    for bundle in bundles {
        match results.get(&bundle.panel_id) {
            None => {
                audit.checks.push(CheckResult::new(
                    &format!("panel.{}.result", bundle.panel_id),
                    false,
                    "no generation result",
                ));
                audit.retry_panels.push(bundle.panel_id.clone());
            }
            Some(result) if result.seed_used != bundle.seed => {
                audit.checks.push(CheckResult::new(
                    &format!("panel.{}.seed", bundle.panel_id),
                    false,
                    format!("requested seed {} but service used {}", bundle.seed, result.seed_used),
                ));
                audit.retry_panels.push(bundle.panel_id.clone());
            }
            Some(_) => audit.checks.push(CheckResult::new(
                &format!("panel.{}.seed", bundle.panel_id),
                true,
                format!("seed {}", bundle.seed),
            )),
        }
    }
    audit
}

// ────────────────────────────────────────────────────────────────────────────
// Modify mode
// ────────────────────────────────────────────────────────────────────────────

/// Inputs to a modify-mode validation.
pub struct ModifyCheck<'a> {
    pub baseline_spec: &'a DesignSpecification,
    pub candidate_spec: &'a DesignSpecification,
    pub lock_rules: &'a [String],
    pub layout: &'a LayoutConfig,
    /// Baseline image ref per panel id.
    pub baseline_images: &'a BTreeMap<String, String>,
    /// Candidate image ref per panel id.
    pub candidate_images: &'a BTreeMap<String, String>,
    pub targeted: &'a BTreeSet<String>,
    /// Bundles sent to the image service on this attempt.
    pub requested: &'a [PromptBundle],
    /// Latest generation result per panel generated during the run.
    pub results: &'a BTreeMap<String, GenerationResult>,
    pub attempt: u32,
}

/// Scores every layout panel against its baseline image.
pub async fn score_images(
    similarity: &dyn SimilarityPrimitives,
    layout: &LayoutConfig,
    baseline_images: &BTreeMap<String, String>,
    candidate_images: &BTreeMap<String, String>,
    targeted: &BTreeSet<String>,
) -> Result<ImageDelta, DriftError> {
    let mut panels = Vec::with_capacity(layout.panels.len());
    let mut weighted = 0.0;
    let mut area = 0.0;

    for panel in &layout.panels {
        let missing = |image_ref: &str| DriftError::Fetch {
            image_ref: image_ref.to_string(),
            message: format!("no image recorded for panel '{}'", panel.id),
        };
        let base = baseline_images
            .get(&panel.id)
            .ok_or_else(|| missing("baseline"))?;
        let cand = candidate_images
            .get(&panel.id)
            .ok_or_else(|| missing("candidate"))?;

        let (ssim, phash_distance) = if base == cand {
            (1.0, 0)
        } else {
            let ssim = similarity.similarity(base, cand, None).await?;
            let hb = similarity.perceptual_hash(base).await?;
            let hc = similarity.perceptual_hash(cand).await?;
            (ssim, similarity.hash_distance(hb, hc))
        };

        weighted += ssim * panel.rect.area();
        area += panel.rect.area();
        panels.push(PanelScore {
            panel_id: panel.id.clone(),
            ssim,
            phash_distance,
            targeted: targeted.contains(&panel.id),
        });
    }

    let ssim_whole = if area > 0.0 { weighted / area } else { 1.0 };
    Ok(ImageDelta { ssim_whole, panels })
}

/// Pure verdict for a modify run.
///
/// Locked-field changes reject outright. Panels the image service answered
/// with the wrong seed are reissued; image drift escalates the lock.
pub fn judge_modify(
    dna_delta: DnaDelta,
    image_delta: ImageDelta,
    audit: GenerationAudit,
    attempt: u32,
    policy: &DriftPolicy,
) -> DriftReport {
    let mut checks = Vec::new();

    if !dna_delta.locked_violations.is_empty() {
        checks.push(CheckResult::new(
            "dna.locks",
            false,
            format!("locked fields changed: {}", dna_delta.locked_violations.join(", ")),
        ));
        return DriftReport {
            dna_delta,
            image_delta: Some(image_delta),
            verdict: Verdict::Reject,
            recommended_correction: None,
            attempt,
            checks,
        };
    }
    checks.push(CheckResult::new("dna.locks", true, "all locked fields unchanged"));
    checks.extend(audit.checks);

    let mut drifted = Vec::new();
    for score in image_delta.panels.iter().filter(|p| !p.targeted) {
        let ssim_ok = score.ssim >= policy.ssim_panel_min;
        let hash_ok = score.phash_distance <= policy.phash_max_distance;
        checks.push(CheckResult::new(
            &format!("panel.{}.ssim", score.panel_id),
            ssim_ok,
            format!("{:.4} (min {})", score.ssim, policy.ssim_panel_min),
        ));
        checks.push(CheckResult::new(
            &format!("panel.{}.phash", score.panel_id),
            hash_ok,
            format!("{} (max {})", score.phash_distance, policy.phash_max_distance),
        ));
        if !(ssim_ok && hash_ok) {
            drifted.push(score.panel_id.clone());
        }
    }

    let whole_ok = image_delta.ssim_whole >= policy.ssim_whole_min;
    checks.push(CheckResult::new(
        "sheet.ssim",
        whole_ok,
        format!("{:.4} (min {})", image_delta.ssim_whole, policy.ssim_whole_min),
    ));
    if !whole_ok && drifted.is_empty() {
        // Only the edited panels can have pulled the sheet under the floor.
        drifted = image_delta
            .panels
            .iter()
            .filter(|p| p.targeted)
            .map(|p| p.panel_id.clone())
            .collect();
    }

    let seed_only = whole_ok && drifted.is_empty();
    let mut retry_panels = audit.retry_panels;
    for id in drifted {
        if !retry_panels.contains(&id) {
            retry_panels.push(id);
        }
    }

    let passed = whole_ok && retry_panels.is_empty();
    let (verdict, recommended_correction) = if passed {
        (Verdict::Accept, None)
    } else if attempt < policy.max_attempts {
        let action = if seed_only {
            CorrectionAction::ReissueSeed
        } else {
            CorrectionAction::StrengthenLock {
                raise_lock: 1,
                strength_factor: policy.strength_decay,
            }
        };
        (
            Verdict::RetryWithStrongerLock,
            Some(RecommendedCorrection {
                action,
                panels: retry_panels,
            }),
        )
    } else {
        (Verdict::Reject, None)
    };

    DriftReport {
        dna_delta,
        image_delta: Some(image_delta),
        verdict,
        recommended_correction,
        attempt,
        checks,
    }
}

/// Lock check, generation audit, image scoring and verdict for one modify attempt.
pub async fn validate_modify(
    similarity: &dyn SimilarityPrimitives,
    check: &ModifyCheck<'_>,
    policy: &DriftPolicy,
) -> Result<DriftReport, DriftError> {
    let mut dna_delta = DnaDelta::categorise(diff(check.baseline_spec, check.candidate_spec));
    dna_delta.locked_violations =
        locked_violations(check.baseline_spec, check.candidate_spec, check.lock_rules);

    let image_delta = score_images(
        similarity,
        check.layout,
        check.baseline_images,
        check.candidate_images,
        check.targeted,
    )
    .await?;

    let audit = audit_generation(check.requested, check.results);
    Ok(judge_modify(dna_delta, image_delta, audit, check.attempt, policy))
}
