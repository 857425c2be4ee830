//! Baseline Artifact Store: append-only, immutable history of accepted sheets.
//!
//! Each accepted run is written once under `baselines/{design_id}/v{version:08}`
//! as JSON. Nothing is ever overwritten; a modification produces a new version
//! whose `parent_version` points at the bundle it was derived from.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dna::{is_valid_design_id, DesignSpecification};
use crate::drift::DriftReport;
use crate::layout::{LayoutConfig, SheetType};
use crate::orchestrator::{ComposedSheet, RunState};
use crate::prompt::PromptBundle;

pub mod fs;
pub mod kv;
pub mod postgres;

pub use fs::FsKvStore;
pub use kv::{KvStore, MemoryKvStore, StoreError};
pub use postgres::PgKvStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRecord {
    pub base: u64,
    pub per_panel: BTreeMap<String, u32>,
}

/// Statistics persisted with each bundle so a run can be reconstructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub attempts: u32,
    pub generation_calls: u32,
    pub reused_panels: u32,
    pub total_latency_ms: u64,
    pub states: Vec<RunState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineArtifactBundle {
    pub design_id: String,
    pub sheet_id: String,
    pub version: u32,
    pub parent_version: Option<u32>,
    pub sheet_type: SheetType,
    /// Content-addressed reference of the composed sheet.
    pub baseline_image: String,
    pub per_panel_images: BTreeMap<String, String>,
    pub baseline_dna: DesignSpecification,
    pub baseline_layout: LayoutConfig,
    pub seeds: SeedRecord,
    /// The prompt bundle that produced each panel image.
    pub base_prompt: BTreeMap<String, PromptBundle>,
    pub spec_hash: String,
    pub delta_prompt: Option<String>,
    pub sheet: ComposedSheet,
    pub drift_report: DriftReport,
    pub run_stats: RunStats,
    pub created_at: DateTime<Utc>,
}

/// One line of a design's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: u32,
    pub parent_version: Option<u32>,
    pub sheet_type: SheetType,
    pub baseline_image: String,
    pub delta_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&BaselineArtifactBundle> for VersionSummary {
    fn from(b: &BaselineArtifactBundle) -> Self {
        Self {
            version: b.version,
            parent_version: b.parent_version,
            sheet_type: b.sheet_type,
            baseline_image: b.baseline_image.clone(),
            delta_prompt: b.delta_prompt.clone(),
            created_at: b.created_at,
        }
    }
}

pub fn bundle_key(design_id: &str, version: u32) -> String {
    format!("baselines/{design_id}/v{version:08}")
}

fn design_prefix(design_id: &str) -> String {
    format!("baselines/{design_id}/")
}

/// Version of a key directly under `prefix`. Keys of nested ids
/// (`baselines/a/b/v..` under `baselines/a/`) do not parse.
fn version_of_key(prefix: &str, key: &str) -> Option<u32> {
    let digits = key.strip_prefix(prefix)?.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Storage-agnostic store over an injected `KvStore`.
#[derive(Clone)]
pub struct BaselineStore {
    kv: Arc<dyn KvStore>,
}

impl BaselineStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Persists a new bundle. Fails if `(design_id, version)` already exists.
    pub async fn create(&self, bundle: &BaselineArtifactBundle) -> Result<(), StoreError> {
        if !is_valid_design_id(&bundle.design_id) {
            return Err(StoreError::InvalidDesignId(bundle.design_id.clone()));
        }
        let key = bundle_key(&bundle.design_id, bundle.version);
        let body = serde_json::to_vec(bundle).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            message: e.to_string(),
        })?;
        if !self.kv.put_if_absent(&key, Bytes::from(body)).await? {
            return Err(StoreError::AlreadyExists { key });
        }
        info!(
            design_id = %bundle.design_id,
            version = bundle.version,
            parent_version = ?bundle.parent_version,
            "baseline bundle stored"
        );
        Ok(())
    }

    /// Fetches one version, or the latest when `version` is `None`.
    pub async fn get(
        &self,
        design_id: &str,
        version: Option<u32>,
    ) -> Result<Option<BaselineArtifactBundle>, StoreError> {
        let version = match version {
            Some(v) => v,
            None => match self.latest_version(design_id).await? {
                Some(v) => v,
                None => return Ok(None),
            },
        };
        if !is_valid_design_id(design_id) {
            return Ok(None);
        }
        let key = bundle_key(design_id, version);
        match self.kv.get(&key).await? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key,
                    message: e.to_string(),
                }),
        }
    }

    /// Every stored version number for a design, ascending.
    pub async fn versions(&self, design_id: &str) -> Result<Vec<u32>, StoreError> {
        if !is_valid_design_id(design_id) {
            return Ok(Vec::new());
        }
        let prefix = design_prefix(design_id);
        let mut versions: Vec<u32> = self
            .kv
            .list_keys(&prefix)
            .await?
            .iter()
            .filter_map(|k| version_of_key(&prefix, k))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    pub async fn latest_version(&self, design_id: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.versions(design_id).await?.last().copied())
    }

    /// Full ordered history for a design.
    pub async fn list(&self, design_id: &str) -> Result<Vec<BaselineArtifactBundle>, StoreError> {
        let mut bundles = Vec::new();
        for version in self.versions(design_id).await? {
            if let Some(b) = self.get(design_id, Some(version)).await? {
                bundles.push(b);
            }
        }
        Ok(bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::sample_bundle;

    fn store() -> BaselineStore {
        BaselineStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[test]
    fn test_key_scheme_is_zero_padded() {
        assert_eq!(bundle_key("dna-1", 7), "baselines/dna-1/v00000007");
        let prefix = design_prefix("dna-1");
        assert_eq!(version_of_key(&prefix, "baselines/dna-1/v00000012"), Some(12));
        assert_eq!(version_of_key(&prefix, "baselines/dna-1/junk"), None);
        assert_eq!(version_of_key(&prefix, "baselines/dna-1/v"), None);
        assert_eq!(version_of_key(&prefix, "baselines/dna-1/v+0000003"), None);
        assert_eq!(version_of_key(&prefix, "baselines/dna-1/x/v00000005"), None);
    }

    #[tokio::test]
    async fn test_create_rejects_existing_version() {
        let s = store();
        let b = sample_bundle("dna-1", 1);
        s.create(&b).await.unwrap();
        let err = s.create(&b).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_defaults_to_latest() {
        let s = store();
        for v in [1, 2, 3] {
            s.create(&sample_bundle("dna-1", v)).await.unwrap();
        }
        s.create(&sample_bundle("dna-2", 9)).await.unwrap();

        assert_eq!(s.get("dna-1", None).await.unwrap().unwrap().version, 3);
        assert_eq!(s.get("dna-1", Some(2)).await.unwrap().unwrap().version, 2);
        assert!(s.get("dna-1", Some(4)).await.unwrap().is_none());
        assert!(s.get("dna-3", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_scoped_to_design() {
        let s = store();
        for v in [2, 10, 1] {
            s.create(&sample_bundle("dna-1", v)).await.unwrap();
        }
        s.create(&sample_bundle("dna-10", 1)).await.unwrap();
        let versions: Vec<u32> = s.list("dna-1").await.unwrap().iter().map(|b| b.version).collect();
        assert_eq!(versions, vec![1, 2, 10]);
    }

    #[tokio::test]
    async fn test_nested_id_keys_do_not_leak_into_parent_history() {
        let kv = Arc::new(MemoryKvStore::new());
        let s = BaselineStore::new(kv.clone());
        s.create(&sample_bundle("a", 1)).await.unwrap();

        let mut nested = sample_bundle("a", 5);
        nested.design_id = "a/b".into();
        let body = Bytes::from(serde_json::to_vec(&nested).unwrap());
        kv.put_if_absent(&bundle_key("a/b", 5), body).await.unwrap();

        assert_eq!(s.latest_version("a").await.unwrap(), Some(1));
        assert_eq!(s.get("a", None).await.unwrap().unwrap().version, 1);
        assert_eq!(s.list("a").await.unwrap().len(), 1);
        assert!(s.get("a/b", None).await.unwrap().is_none());

        let err = s.create(&nested).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidDesignId(id) if id == "a/b"));
    }

    #[tokio::test]
    async fn test_bundle_round_trips_through_fs_backend() {
        let dir = tempfile::tempdir().unwrap();
        let s = BaselineStore::new(Arc::new(FsKvStore::new(dir.path())));
        let b = sample_bundle("dna-1", 1);
        s.create(&b).await.unwrap();
        assert_eq!(s.get("dna-1", None).await.unwrap().unwrap(), b);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_reported() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.put_if_absent(&bundle_key("dna-1", 1), Bytes::from_static(b"{not json"))
            .await
            .unwrap();
        let s = BaselineStore::new(kv);
        assert!(matches!(s.get("dna-1", None).await, Err(StoreError::Corrupt { .. })));
    }
}
