/// HTTP request handlers
use crate::clients::UsgsClient;
use crate::domain::{Health, PathRow, Prediction, Target, User};
use crate::errors::ApiError;
use crate::repo::TargetRepo;
use crate::services::{predict, SceneHistory, SceneHistorySource};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub history: SceneHistory<UsgsClient>,
    pub targets: TargetRepo,
    pub sample_count: usize,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// On-demand prediction for a path/row, computed from live scene history
pub async fn get_prediction(
    Path((path, row)): Path<(i32, i32)>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Prediction>>, ApiError> {
    // WRS-2 grid bounds.
    if !(1..=233).contains(&path) || !(1..=248).contains(&row) {
        return Err(ApiError::InvalidInput(format!(
            "path/row ({path}, {row}) is outside the WRS-2 grid"
        )));
    }

    let (landsat8, landsat9) = state.history.fetch(path, row, state.sample_count).await?;
    let prediction = predict(&landsat8, &landsat9)?;
    Ok(Json(SuccessResponse::new(prediction)))
}

#[derive(Serialize)]
pub struct PathRowList {
    #[serde(rename = "pathRows")]
    pub path_rows: Vec<PathRow>,
}

/// Every path/row currently watched by at least one target
pub async fn list_path_rows(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<PathRowList>>, ApiError> {
    let path_rows = state.targets.registered_path_rows().await?;
    Ok(Json(SuccessResponse::new(PathRowList { path_rows })))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<SuccessResponse<User>>, ApiError> {
    if !request.email.contains('@') {
        return Err(ApiError::InvalidInput(format!(
            "\"{}\" is not an email address",
            request.email
        )));
    }

    let user = state.targets.create_user(&request.email).await?;
    Ok(Json(SuccessResponse::new(user)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetRequest {
    pub user_id: Uuid,
    pub path: i32,
    pub row: i32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub min_cloud_cover: Option<f64>,
    #[serde(default)]
    pub max_cloud_cover: Option<f64>,
    pub notification_offset_seconds: i64,
}

pub async fn create_target(
    State(state): State<AppState>,
    Json(request): Json<CreateTargetRequest>,
) -> Result<Json<SuccessResponse<Target>>, ApiError> {
    if !(1..=233).contains(&request.path) || !(1..=248).contains(&request.row) {
        return Err(ApiError::InvalidInput(format!(
            "path/row ({}, {}) is outside the WRS-2 grid",
            request.path, request.row
        )));
    }
    if request.notification_offset_seconds < 0 {
        return Err(ApiError::InvalidInput(
            "notificationOffsetSeconds must be non-negative".to_string(),
        ));
    }

    if state.targets.get_user(request.user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "user {} does not exist",
            request.user_id
        )));
    }

    let target = Target {
        id: Uuid::new_v4(),
        path: request.path,
        row: request.row,
        latitude: request.latitude,
        longitude: request.longitude,
        min_cloud_cover: request.min_cloud_cover,
        max_cloud_cover: request.max_cloud_cover,
        notification_offset: Duration::seconds(request.notification_offset_seconds),
    };
    state.targets.add_target(request.user_id, &target).await?;

    Ok(Json(SuccessResponse::new(target)))
}

pub async fn get_target(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Target>>, ApiError> {
    match state.targets.get_target(id).await? {
        Some(target) => Ok(Json(SuccessResponse::new(target))),
        None => Err(ApiError::NotFound(format!("target {id} does not exist"))),
    }
}

#[derive(Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

pub async fn delete_target(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Deleted>>, ApiError> {
    if state.targets.remove_target(id).await? {
        Ok(Json(SuccessResponse::new(Deleted { deleted: true })))
    } else {
        Err(ApiError::NotFound(format!("target {id} does not exist")))
    }
}
