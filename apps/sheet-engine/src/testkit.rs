//! In-process doubles for the external collaborators, shared by the unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use image::{DynamicImage, GrayImage, ImageFormat};
use serde_json::{json, Value};

use crate::baseline::{
    BaselineArtifactBundle, BaselineStore, MemoryKvStore, RunStats, SeedRecord,
};
use crate::config::{ConcurrencyConfig, EngineConfig, LimiterConfig};
use crate::dna::{content_hash, normalize, ContentHash, DnaDelta};
use crate::drift::{DriftError, DriftReport, ImageFetcher, SimilarityPrimitives, Verdict};
use crate::gen_client::{
    GenerationClient, ImageRequest, ImageResponse, ImageService, ReasoningRequest,
    ReasoningResponse, ReasoningService, RetryPolicy, ServiceFailure,
};
use crate::layout::{LayoutRegistry, Rect, SheetType};
use crate::orchestrator::{ComposedSheet, ManifestCompositor, Orchestrator};
use crate::prompt::{build_prompt, PromptMode};

// ────────────────────────────────────────────────────────────────────────────
// Image service
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ImageState {
    failures: VecDeque<ServiceFailure>,
    wrong_seeds: u32,
    requests: Vec<ImageRequest>,
    prompts: HashMap<String, String>,
}

/// Scripted image service. Clones share state, so a test can keep a handle
/// while the client owns another. Image refs are derived from prompt and seed.
#[derive(Clone, Default)]
pub struct StubImageService {
    state: Arc<Mutex<ImageState>>,
}

impl StubImageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures returned, in order, before calls start succeeding.
    pub fn fail_with(self, failures: Vec<ServiceFailure>) -> Self {
        self.state.lock().unwrap().failures = failures.into();
        self
    }

    /// The next `n` successful responses report a seed other than the one requested.
    pub fn wrong_seed_for(self, n: u32) -> Self {
        self.state.lock().unwrap().wrong_seeds = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn prompt_for(&self, image_ref: &str) -> Option<String> {
        self.state.lock().unwrap().prompts.get(image_ref).cloned()
    }
}

#[async_trait]
impl ImageService for StubImageService {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageResponse, ServiceFailure> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure);
        }

        let hash = ContentHash::of_bytes(request.prompt.as_bytes());
        let image_ref = format!("stub://{}/{}", hash.short(), request.seed);
        state.prompts.insert(image_ref.clone(), request.prompt.clone());

        let seed_used = if state.wrong_seeds > 0 {
            state.wrong_seeds -= 1;
            request.seed ^ 1
        } else {
            request.seed
        };
        Ok(ImageResponse {
            image_ref,
            seed_used,
            model_id: request.model_id.clone(),
            latency_ms: Some(5),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reasoning service
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct StubReasoningService {
    text: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StubReasoningService {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for StubReasoningService {
    async fn complete(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ServiceFailure> {
        self.prompts.lock().unwrap().push(request.user_prompt.clone());
        Ok(ReasoningResponse {
            text: self.text.clone(),
            model_id: "stub-reasoning".to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Similarity
// ────────────────────────────────────────────────────────────────────────────

type ScoreFn = dyn Fn(&str, &str) -> f64 + Send + Sync;

/// Similarity double: `score` decides every comparison of two distinct refs,
/// and distinct hashes are always `distance` apart.
#[derive(Clone)]
pub struct StubSimilarity {
    score: Arc<ScoreFn>,
    distance: u32,
}

impl StubSimilarity {
    pub fn new(score: f64, distance: u32) -> Self {
        Self::with_fn(move |_, _| score, distance)
    }

    pub fn with_fn(score: impl Fn(&str, &str) -> f64 + Send + Sync + 'static, distance: u32) -> Self {
        Self {
            score: Arc::new(score),
            distance,
        }
    }
}

#[async_trait]
impl SimilarityPrimitives for StubSimilarity {
    async fn similarity(&self, a: &str, b: &str, _region: Option<Rect>) -> Result<f64, DriftError> {
        Ok((self.score)(a, b))
    }

    async fn perceptual_hash(&self, image: &str) -> Result<u64, DriftError> {
        let hash = ContentHash::of_bytes(image.as_bytes());
        Ok(u64::from_str_radix(&hash.as_str()[..16], 16).unwrap())
    }

    fn hash_distance(&self, h1: u64, h2: u64) -> u32 {
        if h1 == h2 {
            0
        } else {
            self.distance
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryImageFetcher {
    images: HashMap<String, Bytes>,
}

impl MemoryImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, image_ref: &str, bytes: Bytes) -> Self {
        self.images.insert(image_ref.to_string(), bytes);
        self
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageFetcher {
    async fn fetch(&self, image_ref: &str) -> Result<Bytes, DriftError> {
        self.images.get(image_ref).cloned().ok_or_else(|| DriftError::Fetch {
            image_ref: image_ref.to_string(),
            message: "not in memory fixture".to_string(),
        })
    }
}

pub fn png_bytes(img: &GrayImage) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    Bytes::from(out.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

/// The 10 × 8 × 6 m two-storey brick house used across the run tests.
pub fn raw_spec(design_id: &str) -> Value {
    json!({
        "id": design_id,
        "seed": 42,
        "buildingType": "house",
        "style": "contemporary",
        "dimensions": {"length": 10, "width": 8, "height": 6, "floors": 2},
        "materials": [{"name": "brick", "hexColor": "#8B4513", "application": "facade"}],
        "rooms": [{"name": "living room", "areaM2": 30, "floor": 0}],
        "openings": [{"type": "entrance", "facade": "S"}],
        "roof": {"type": "gable", "material": "slate"}
    })
}

/// Engine config with a limiter roomy enough that tests never wait on it.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        limiter: LimiterConfig {
            capacity: 64,
            refill_per_sec: 64.0,
        },
        concurrency: ConcurrencyConfig { batch_size: 2 },
        ..EngineConfig::default()
    }
}

pub fn client(image: &StubImageService, reasoning: &StubReasoningService) -> GenerationClient {
    GenerationClient::new(
        Arc::new(image.clone()),
        Arc::new(reasoning.clone()),
        RetryPolicy::default(),
        "stub-model",
    )
}

/// Orchestrator over an in-memory store and the manifest compositor.
pub fn orchestrator(
    image: &StubImageService,
    reasoning: &StubReasoningService,
    similarity: StubSimilarity,
) -> Orchestrator {
    Orchestrator::new(
        client(image, reasoning),
        Arc::new(similarity),
        Arc::new(ManifestCompositor),
        BaselineStore::new(Arc::new(MemoryKvStore::new())),
        Arc::new(LayoutRegistry::load().unwrap()),
    )
}

/// A self-consistent presentation-sheet bundle, built without running the engine.
pub fn sample_bundle(design_id: &str, version: u32) -> BaselineArtifactBundle {
    let spec = normalize(&raw_spec(design_id)).unwrap();
    let layout = LayoutRegistry::load()
        .unwrap()
        .get(SheetType::Presentation)
        .unwrap()
        .clone();
    let prompts: BTreeMap<_, _> = layout
        .panels
        .iter()
        .map(|p| (p.id.clone(), build_prompt(&spec, &layout, p, &PromptMode::Generate)))
        .collect();
    let images: BTreeMap<_, _> = layout
        .panels
        .iter()
        .map(|p| (p.id.clone(), format!("stub://{design_id}/v{version}/{}", p.id)))
        .collect();

    BaselineArtifactBundle {
        design_id: design_id.to_string(),
        sheet_id: format!("sheet-{design_id}-{version}"),
        version,
        parent_version: version.checked_sub(1).filter(|v| *v > 0),
        sheet_type: SheetType::Presentation,
        baseline_image: format!("sheet:{design_id}:{version}"),
        per_panel_images: images,
        seeds: SeedRecord {
            base: spec.seed,
            per_panel: prompts.iter().map(|(id, b)| (id.clone(), b.seed)).collect(),
        },
        base_prompt: prompts,
        spec_hash: content_hash(&spec).as_str().to_string(),
        baseline_dna: spec,
        baseline_layout: layout.clone(),
        delta_prompt: None,
        sheet: ComposedSheet {
            sheet_ref: format!("sheet:{design_id}:{version}"),
            width_px: layout.render_width_px,
            height_px: layout.render_height_px,
            placements: Vec::new(),
        },
        drift_report: DriftReport {
            dna_delta: DnaDelta::default(),
            image_delta: None,
            verdict: Verdict::Accept,
            recommended_correction: None,
            attempt: 1,
            checks: Vec::new(),
        },
        run_stats: RunStats::default(),
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}
