//! Items API handlers.
//!
//! Every handler runs inside an API-level span and answers with the active
//! trace id in the `Trace-Id` header.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};

use crate::http::response::{ApiError, ApiResponse};
use crate::items::{Item, ItemId, ItemService};
use crate::observability::{Granularity, Telemetry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Telemetry,
    pub items: Arc<ItemService>,
}

/// Request body for create and update.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemPayload {
    pub item: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemEnvelope {
    pub item: Item,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemList {
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

type ItemResult = Result<ApiResponse<ItemEnvelope>, ApiError>;

fn id_attribute(id: &ItemId) -> [KeyValue; 1] {
    [KeyValue::new("item.id", id.to_string())]
}

pub async fn create_item(State(state): State<AppState>, Json(payload): Json<ItemPayload>) -> ItemResult {
    let telemetry = &state.telemetry;
    telemetry
        .try_wrap_async("API.create_item", Granularity::Api, [], async {
            tracing::debug!("Creating item");
            match state.items.create_item(payload.item) {
                Ok(item) => Ok(ApiResponse::new(telemetry, StatusCode::CREATED, ItemEnvelope { item })),
                Err(err) => Err(ApiError::from_item_error(telemetry, err)),
            }
        })
        .await
}

pub async fn read_item(State(state): State<AppState>, Path(id): Path<ItemId>) -> ItemResult {
    let telemetry = &state.telemetry;
    telemetry
        .try_wrap_async("API.read_item", Granularity::Api, id_attribute(&id), async {
            tracing::debug!(item_id = %id, "Reading item");
            match state.items.read_item(id) {
                Ok(item) => Ok(ApiResponse::new(telemetry, StatusCode::OK, ItemEnvelope { item })),
                Err(err) => Err(ApiError::from_item_error(telemetry, err)),
            }
        })
        .await
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
    Json(payload): Json<ItemPayload>,
) -> ItemResult {
    let telemetry = &state.telemetry;
    telemetry
        .try_wrap_async("API.update_item", Granularity::Api, id_attribute(&id), async {
            tracing::debug!(item_id = %id, "Updating item");
            match state.items.update_item(id, payload.item) {
                Ok(item) => Ok(ApiResponse::new(telemetry, StatusCode::OK, ItemEnvelope { item })),
                Err(err) => Err(ApiError::from_item_error(telemetry, err)),
            }
        })
        .await
}

pub async fn delete_item(State(state): State<AppState>, Path(id): Path<ItemId>) -> ItemResult {
    let telemetry = &state.telemetry;
    telemetry
        .try_wrap_async("API.delete_item", Granularity::Api, id_attribute(&id), async {
            tracing::debug!(item_id = %id, "Deleting item");
            match state.items.delete_item(id) {
                Ok(item) => Ok(ApiResponse::new(telemetry, StatusCode::OK, ItemEnvelope { item })),
                Err(err) => Err(ApiError::from_item_error(telemetry, err)),
            }
        })
        .await
}

pub async fn list_items(State(state): State<AppState>) -> ApiResponse<ItemList> {
    let telemetry = &state.telemetry;
    telemetry
        .wrap_async("API.list_items", Granularity::Api, [], async {
            tracing::debug!("Listing items");
            let items = state.items.list_items();
            ApiResponse::new(telemetry, StatusCode::OK, ItemList { items })
        })
        .await
}

pub async fn healthz() -> Json<HealthStatus> {
    tracing::info!("Health check");
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}
