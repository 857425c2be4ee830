//! Seam to the downstream compositor that rasterises validated panels onto the sheet.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dna::ContentHash;
use crate::layout::LayoutConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositorError {
    #[error("no image for panel '{0}'")]
    MissingPanel(String),

    #[error("compositor failed: {0}")]
    Failed(String),
}

/// Where one panel image lands on the sheet, in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub panel_id: String,
    pub label: String,
    pub image_ref: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedSheet {
    pub sheet_ref: String,
    pub width_px: u32,
    pub height_px: u32,
    pub placements: Vec<Placement>,
}

#[async_trait]
pub trait Compositor: Send + Sync {
    async fn compose(
        &self,
        layout: &LayoutConfig,
        images: &BTreeMap<String, String>,
    ) -> Result<ComposedSheet, CompositorError>;
}

/// Emits the placement manifest and a content-addressed sheet reference
/// without rasterising.
#[derive(Debug, Clone, Default)]
pub struct ManifestCompositor;

#[async_trait]
impl Compositor for ManifestCompositor {
    async fn compose(
        &self,
        layout: &LayoutConfig,
        images: &BTreeMap<String, String>,
    ) -> Result<ComposedSheet, CompositorError> {
        let (w, h) = (layout.render_width_px as f64, layout.render_height_px as f64);
        let placements = layout
            .panels
            .iter()
            .map(|p| {
                let image_ref = images
                    .get(&p.id)
                    .ok_or_else(|| CompositorError::MissingPanel(p.id.clone()))?;
                Ok(Placement {
                    panel_id: p.id.clone(),
                    label: p.label.clone(),
                    image_ref: image_ref.clone(),
                    x: (p.rect.x * w).round() as u32,
                    y: (p.rect.y * h).round() as u32,
                    width: (p.rect.w * w).round() as u32,
                    height: (p.rect.h * h).round() as u32,
                })
            })
            .collect::<Result<Vec<_>, CompositorError>>()?;

        let manifest = serde_json::to_value(&placements)
            .map_err(|e| CompositorError::Failed(e.to_string()))?;
        Ok(ComposedSheet {
            sheet_ref: format!("sheet:{}", ContentHash::of_value(&manifest)),
            width_px: layout.render_width_px,
            height_px: layout.render_height_px,
            placements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutRegistry, SheetType};

    fn layout() -> LayoutConfig {
        LayoutRegistry::load().unwrap().get(SheetType::Concept).unwrap().clone()
    }

    fn images(layout: &LayoutConfig, tag: &str) -> BTreeMap<String, String> {
        layout
            .panels
            .iter()
            .map(|p| (p.id.clone(), format!("{tag}://{}", p.id)))
            .collect()
    }

    #[tokio::test]
    async fn test_sheet_ref_is_content_addressed() {
        let l = layout();
        let a = ManifestCompositor.compose(&l, &images(&l, "x")).await.unwrap();
        let b = ManifestCompositor.compose(&l, &images(&l, "x")).await.unwrap();
        let c = ManifestCompositor.compose(&l, &images(&l, "y")).await.unwrap();
        assert_eq!(a.sheet_ref, b.sheet_ref);
        assert_ne!(a.sheet_ref, c.sheet_ref);
        assert!(a.sheet_ref.starts_with("sheet:sha256:"));
    }

    #[tokio::test]
    async fn test_placements_follow_layout_rects() {
        let l = layout();
        let sheet = ManifestCompositor.compose(&l, &images(&l, "x")).await.unwrap();
        assert_eq!(sheet.placements.len(), l.panels.len());
        for p in &sheet.placements {
            assert!(p.x + p.width <= sheet.width_px + 1);
            assert!(p.y + p.height <= sheet.height_px + 1);
        }
    }

    #[tokio::test]
    async fn test_missing_panel_image_fails() {
        let l = layout();
        let mut imgs = images(&l, "x");
        imgs.remove("axonometric");
        let err = ManifestCompositor.compose(&l, &imgs).await.unwrap_err();
        assert_eq!(err, CompositorError::MissingPanel("axonometric".into()));
    }
}
