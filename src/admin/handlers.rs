use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::region::{
    FailoverError, FailoverEvent, FailoverStrategy, MultiRegionDeployment, RegionConfig,
    RegionHealth, RegionUpdate,
};
use crate::resilience::BreakerSnapshot;

/// JSON error reply: `{ "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<FailoverError> for ApiError {
    fn from(e: FailoverError) -> Self {
        let status = match &e {
            FailoverError::DeploymentNotFound(_) | FailoverError::RegionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            FailoverError::NoSuitableTarget(_) | FailoverError::DeploymentExists(_) => {
                StatusCode::CONFLICT
            }
            FailoverError::InvalidDeployment(_) => StatusCode::BAD_REQUEST,
            FailoverError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub breakers: usize,
    pub deployments: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub deployment_id: String,
    pub name: String,
    pub regions: Vec<String>,
    pub primary_region: String,
    #[serde(default)]
    pub failover_strategy: Option<FailoverStrategy>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailoverRequest {
    #[serde(default)]
    pub to_region: Option<String>,
}

#[derive(Serialize)]
pub struct ActiveRegionReply {
    pub deployment_id: String,
    pub active_region: Option<RegionConfig>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        breakers: state.plane.breakers.len(),
        deployments: state.plane.regions.list_deployments().len(),
    })
}

pub async fn list_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.plane.breakers.snapshots())
}

pub async fn get_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    state
        .plane
        .breakers
        .get_state_info(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("breaker '{}' not found", name)))
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    if !state.plane.breakers.reset(&name) {
        return Err(ApiError::not_found(format!("breaker '{}' not found", name)));
    }
    tracing::info!(breaker = %name, "Breaker reset by operator");
    state
        .plane
        .breakers
        .get_state_info(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("breaker '{}' not found", name)))
}

pub async fn list_deployments(State(state): State<AdminState>) -> Json<Vec<MultiRegionDeployment>> {
    Json(state.plane.regions.list_deployments())
}

pub async fn create_deployment(
    State(state): State<AdminState>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<MultiRegionDeployment>), ApiError> {
    let regions: Vec<&str> = req.regions.iter().map(String::as_str).collect();
    let deployment = state
        .plane
        .regions
        .create_deployment(
            &req.deployment_id,
            &req.name,
            &regions,
            &req.primary_region,
            req.failover_strategy.unwrap_or(FailoverStrategy::ActivePassive),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn get_deployment(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<MultiRegionDeployment>, ApiError> {
    state
        .plane
        .regions
        .get_deployment(&id)
        .map(Json)
        .ok_or_else(|| FailoverError::DeploymentNotFound(id).into())
}

pub async fn get_active_region(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ActiveRegionReply>, ApiError> {
    if state.plane.regions.get_deployment(&id).is_none() {
        return Err(FailoverError::DeploymentNotFound(id).into());
    }
    Ok(Json(ActiveRegionReply {
        active_region: state.plane.regions.get_active_region(&id),
        deployment_id: id,
    }))
}

pub async fn check_health(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RegionHealth>>, ApiError> {
    Ok(Json(state.plane.regions.check_deployment_health(&id).await?))
}

pub async fn failover(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(req): Json<FailoverRequest>,
) -> Result<Json<FailoverEvent>, ApiError> {
    let event = state
        .plane
        .regions
        .failover(&id, req.to_region.as_deref())
        .await?;
    Ok(Json(event))
}

pub async fn update_region(
    State(state): State<AdminState>,
    Path((id, region_name)): Path<(String, String)>,
    Json(update): Json<RegionUpdate>,
) -> Result<Json<RegionConfig>, ApiError> {
    let region = state
        .plane
        .regions
        .update_region(&id, &region_name, update)
        .await?;
    Ok(Json(region))
}
