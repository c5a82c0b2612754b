//! REST API Handlers
//!
//! Exposes the host contract over HTTP: lifecycle entry points and the poll,
//! routed to the controller named in the request body.

use crate::engine::{ControllerRef, InstanceDescription, InstanceStatus, NotifyParameters};
use crate::error::{Error, ErrorClass, Result};
use crate::inventory::InventoryStore;
use crate::settings::ProvisioningSettings;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

fn default_controller() -> String {
    "vm".to_string()
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of every instance request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    /// Controller handling the instance
    #[serde(default = "default_controller")]
    pub controller: String,
    /// Only read on create; generated when absent
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub settings: ProvisioningSettings,
    /// Notification parameters, e.g. `command`
    #[serde(default)]
    pub parameters: NotifyParameters,
}

/// Answer of a lifecycle entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResponse {
    pub instance_id: String,
    #[serde(flatten)]
    pub description: InstanceDescription,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

/// Map a controller error onto an HTTP response
fn error_response(err: Error) -> Response {
    let (status, code) = match (&err, err.class()) {
        (Error::UnsupportedOperation { .. }, _) => (StatusCode::CONFLICT, "unsupported_operation"),
        (_, ErrorClass::Validation) => (StatusCode::BAD_REQUEST, "invalid_request"),
        (_, ErrorClass::ResourceUnavailable) => {
            (StatusCode::SERVICE_UNAVAILABLE, "resource_unavailable")
        }
        (_, ErrorClass::RemoteCall) => (StatusCode::BAD_GATEWAY, "remote_call_failed"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    warn!(error = %err, status = %status, "Request rejected");
    (status, Json(ApiErrorResponse::new(code, err.to_string()))).into_response()
}

// =============================================================================
// REST Router
// =============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    controllers: Arc<BTreeMap<String, ControllerRef>>,
    inventory: Option<Arc<InventoryStore>>,
}

impl AppState {
    fn controller(&self, name: &str) -> std::result::Result<ControllerRef, Response> {
        self.controllers.get(name).cloned().ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiErrorResponse::new(
                    "unknown_controller",
                    format!("No controller named {}", name),
                )),
            )
                .into_response()
        })
    }
}

/// REST API router builder
pub struct RestRouter {
    controllers: BTreeMap<String, ControllerRef>,
    inventory: Option<Arc<InventoryStore>>,
}

impl RestRouter {
    pub fn new() -> Self {
        Self {
            controllers: BTreeMap::new(),
            inventory: None,
        }
    }

    /// Route requests naming `controller.name()` to it
    pub fn with_controller(mut self, controller: ControllerRef) -> Self {
        self.controllers
            .insert(controller.name().to_string(), controller);
        self
    }

    /// Report not-ready until this store holds a non-empty snapshot
    pub fn with_inventory(mut self, inventory: Arc<InventoryStore>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            controllers: Arc::new(self.controllers),
            inventory: self.inventory,
        };

        Router::new()
            .route("/v1/instances", post(create_instance))
            .route("/v1/instances/:id/status", post(instance_status))
            .route("/v1/instances/:id/modify", post(modify_instance))
            .route("/v1/instances/:id/delete", post(delete_instance))
            .route("/v1/instances/:id/activate", post(activate_instance))
            .route("/v1/instances/:id/deactivate", post(deactivate_instance))
            .route("/v1/instances/:id/notify", post(notify_instance))
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }
}

impl Default for RestRouter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn described(instance_id: String, result: Result<InstanceDescription>) -> Response {
    match result {
        Ok(description) => (
            StatusCode::OK,
            Json(InstanceResponse {
                instance_id,
                description,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Create an instance
async fn create_instance(
    State(state): State<AppState>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    let controller = match state.controller(&request.controller) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let instance_id = request
        .instance_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(controller = %request.controller, instance = %instance_id, "Create requested");

    let result = controller
        .create_instance(&instance_id, request.settings)
        .await;
    match result {
        Ok(description) => (
            StatusCode::CREATED,
            Json(InstanceResponse {
                instance_id,
                description,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Host poll
async fn instance_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    let controller = match state.controller(&request.controller) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let status: InstanceStatus = controller.get_instance_status(&id, request.settings).await;
    debug!(instance = %id, state = ?status.state(), "Poll answered");
    (StatusCode::OK, Json(status)).into_response()
}

async fn modify_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    match state.controller(&request.controller) {
        Ok(c) => {
            let result = c.modify_instance(&id, request.settings).await;
            described(id, result)
        }
        Err(response) => response,
    }
}

async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    match state.controller(&request.controller) {
        Ok(c) => {
            let result = c.delete_instance(&id, request.settings).await;
            described(id, result)
        }
        Err(response) => response,
    }
}

async fn activate_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    match state.controller(&request.controller) {
        Ok(c) => {
            let result = c.activate_instance(&id, request.settings).await;
            described(id, result)
        }
        Err(response) => response,
    }
}

async fn deactivate_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    match state.controller(&request.controller) {
        Ok(c) => {
            let result = c.deactivate_instance(&id, request.settings).await;
            described(id, result)
        }
        Err(response) => response,
    }
}

async fn notify_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstanceRequest>,
) -> Response {
    match state.controller(&request.controller) {
        Ok(c) => {
            let result = c
                .notify_instance(&id, request.settings, &request.parameters)
                .await;
            described(id, result)
        }
        Err(response) => response,
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match &state.inventory {
        Some(store) if store.snapshot().is_empty() => {
            (StatusCode::SERVICE_UNAVAILABLE, "inventory not loaded")
        }
        _ => (StatusCode::OK, "ready"),
    }
}
