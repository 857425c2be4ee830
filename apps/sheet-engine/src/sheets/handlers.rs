use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::baseline::{BaselineArtifactBundle, VersionSummary};
use crate::engine::{ProjectBrief, SheetResult};
use crate::errors::AppError;
use crate::modify::ModificationRequest;
use crate::orchestrator::CancelToken;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub design_id: String,
    pub versions: Vec<VersionSummary>,
}

/// POST /api/v1/sheets
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(brief): Json<ProjectBrief>,
) -> Result<(StatusCode, Json<SheetResult>), AppError> {
    let result = state.engine.generate(brief, &CancelToken::new()).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /api/v1/sheets/:design_id/modifications
pub async fn handle_modify(
    State(state): State<AppState>,
    Path(design_id): Path<String>,
    Json(request): Json<ModificationRequest>,
) -> Result<(StatusCode, Json<SheetResult>), AppError> {
    let result = state
        .engine
        .modify(&design_id, request, &CancelToken::new())
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/v1/sheets/:design_id/history
pub async fn handle_history(
    State(state): State<AppState>,
    Path(design_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let versions = state.engine.get_history(&design_id).await?;
    if versions.is_empty() {
        return Err(AppError::NotFound(format!("Design {design_id} has no versions")));
    }
    Ok(Json(HistoryResponse { design_id, versions }))
}

/// GET /api/v1/sheets/:design_id/versions/:version
pub async fn handle_get_version(
    State(state): State<AppState>,
    Path((design_id, version)): Path<(String, u32)>,
) -> Result<Json<BaselineArtifactBundle>, AppError> {
    let bundle = state
        .engine
        .get_version(&design_id, version)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Design {design_id} has no version {version}")))?;
    Ok(Json(bundle))
}
