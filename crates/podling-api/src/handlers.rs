//! REST API handlers.
//!
//! Handlers translate JSON requests into store, placement, membership and
//! endpoint-controller calls, and map their errors onto HTTP status codes:
//! not found → 404, already exists → 409, validation → 400, anything
//! else → 500.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use podling_cluster::{ClusterError, HeartbeatReport, RegisterRequest};
use podling_endpoints::EndpointError;
use podling_scheduler::{Placement, SchedulerError};
use podling_state::*;

use crate::ApiState;
use crate::prune::{PruneRequest, prune as run_prune};

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            warning: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
            warning: None,
        }),
    )
}

fn state_status(e: &StateError) -> StatusCode {
    match e {
        StateError::NotFound { .. } => StatusCode::NOT_FOUND,
        StateError::AlreadyExists { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn state_error(e: StateError) -> Response {
    error_response(&e.to_string(), state_status(&e)).into_response()
}

fn scheduler_error(e: SchedulerError) -> Response {
    let status = match &e {
        SchedulerError::State(inner) => state_status(inner),
        SchedulerError::InvalidWorkload(_) => StatusCode::BAD_REQUEST,
        SchedulerError::NoAvailableNodes { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SchedulerError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

fn endpoint_error(e: EndpointError) -> Response {
    let status = match &e {
        EndpointError::State(inner) => state_status(inner),
        EndpointError::InvalidService(_)
        | EndpointError::InvalidAddress(_)
        | EndpointError::InvalidCidr(_) => StatusCode::BAD_REQUEST,
        EndpointError::PoolExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        EndpointError::NotAllocated(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

fn cluster_error(e: ClusterError) -> Response {
    let status = match &e {
        ClusterError::State(inner) => state_status(inner),
        ClusterError::InvalidNode(_) => StatusCode::BAD_REQUEST,
    };
    error_response(&e.to_string(), status).into_response()
}

/// 201 with the stored workload; a placement failure rides along as a warning.
fn placed<T: Serialize>(placement: Placement<T>) -> Response {
    let warning = placement.error.map(|e| e.to_string());
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data: Some(placement.object),
            error: None,
            warning,
        }),
    )
        .into_response()
}

/// Optional `?namespace=` filter.
#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Tasks ──────────────────────────────────────────────────────

/// GET /api/v1/tasks
pub async fn list_tasks(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_tasks() {
        Ok(tasks) => ApiResponse::ok(tasks).into_response(),
        Err(e) => state_error(e),
    }
}

/// POST /api/v1/tasks
pub async fn create_task(
    State(state): State<ApiState>,
    Json(task): Json<Task>,
) -> impl IntoResponse {
    match state.placer.create_task(task) {
        Ok(placement) => placed(placement),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_task(&id) {
        Ok(task) => ApiResponse::ok(task).into_response(),
        Err(e) => state_error(e),
    }
}

/// DELETE /api/v1/tasks/{id}
pub async fn delete_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_task(&id) {
        Ok(task) => ApiResponse::ok(task).into_response(),
        Err(e) => state_error(e),
    }
}

/// PUT /api/v1/tasks/{id}/status
pub async fn update_task_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> impl IntoResponse {
    match state.store.update_task(&id, &update) {
        Ok(task) => ApiResponse::ok(task).into_response(),
        Err(e) => state_error(e),
    }
}

// ── Pods ───────────────────────────────────────────────────────

/// GET /api/v1/pods
pub async fn list_pods(
    State(state): State<ApiState>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    match state.store.list_pods(query.namespace.as_deref()) {
        Ok(pods) => ApiResponse::ok(pods).into_response(),
        Err(e) => state_error(e),
    }
}

/// POST /api/v1/pods
pub async fn create_pod(
    State(state): State<ApiState>,
    Json(pod): Json<Pod>,
) -> impl IntoResponse {
    match state.placer.create_pod(pod) {
        Ok(placement) => placed(placement),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/pods/{id}
pub async fn get_pod(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_pod(&id) {
        Ok(pod) => ApiResponse::ok(pod).into_response(),
        Err(e) => state_error(e),
    }
}

/// DELETE /api/v1/pods/{id}
pub async fn delete_pod(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_pod(&id) {
        Ok(pod) => ApiResponse::ok(pod).into_response(),
        Err(e) => state_error(e),
    }
}

/// PUT /api/v1/pods/{id}/status
pub async fn update_pod_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<PodUpdate>,
) -> impl IntoResponse {
    match state.store.update_pod(&id, &update) {
        Ok(pod) => ApiResponse::ok(pod).into_response(),
        Err(e) => state_error(e),
    }
}

// ── Nodes ──────────────────────────────────────────────────────

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_nodes() {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => state_error(e),
    }
}

/// POST /api/v1/nodes
pub async fn register_node(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    match state.membership.register(req) {
        Ok(node) => (StatusCode::CREATED, ApiResponse::ok(node)).into_response(),
        Err(e) => cluster_error(e),
    }
}

/// GET /api/v1/nodes/{id}
pub async fn get_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_node(&id) {
        Ok(node) => ApiResponse::ok(node).into_response(),
        Err(e) => state_error(e),
    }
}

/// DELETE /api/v1/nodes/{id}
pub async fn deregister_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.membership.deregister(&id) {
        Ok(node) => ApiResponse::ok(node).into_response(),
        Err(e) => cluster_error(e),
    }
}

/// POST /api/v1/nodes/{id}/heartbeat
///
/// The usage report body is optional.
pub async fn heartbeat(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let report = if body.is_empty() {
        HeartbeatReport::default()
    } else {
        match serde_json::from_slice::<HeartbeatReport>(&body) {
            Ok(report) => report,
            Err(e) => {
                let msg = format!("invalid heartbeat body: {e}");
                return error_response(&msg, StatusCode::BAD_REQUEST).into_response();
            }
        }
    };

    match state.membership.heartbeat(&id, report) {
        Ok(node) => ApiResponse::ok(node).into_response(),
        Err(e) => cluster_error(e),
    }
}

// ── Services ───────────────────────────────────────────────────

/// GET /api/v1/services
pub async fn list_services(
    State(state): State<ApiState>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    match state.store.list_services(query.namespace.as_deref()) {
        Ok(services) => ApiResponse::ok(services).into_response(),
        Err(e) => state_error(e),
    }
}

/// POST /api/v1/services
pub async fn create_service(
    State(state): State<ApiState>,
    Json(service): Json<Service>,
) -> impl IntoResponse {
    match state.endpoints.create_service(service) {
        Ok(service) => (StatusCode::CREATED, ApiResponse::ok(service)).into_response(),
        Err(e) => endpoint_error(e),
    }
}

/// GET /api/v1/services/{id}
pub async fn get_service(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_service(&id) {
        Ok(service) => ApiResponse::ok(service).into_response(),
        Err(e) => state_error(e),
    }
}

/// DELETE /api/v1/services/{id}
pub async fn delete_service(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.endpoints.delete_service(&id) {
        Ok(service) => ApiResponse::ok(service).into_response(),
        Err(e) => endpoint_error(e),
    }
}

// ── Endpoints ──────────────────────────────────────────────────

/// GET /api/v1/endpoints
pub async fn list_endpoints(
    State(state): State<ApiState>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    match state.store.list_endpoints(query.namespace.as_deref()) {
        Ok(endpoints) => ApiResponse::ok(endpoints).into_response(),
        Err(e) => state_error(e),
    }
}

/// GET /api/v1/endpoints/{service_id}
pub async fn get_endpoints(
    State(state): State<ApiState>,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_endpoints(&service_id) {
        Ok(endpoints) => ApiResponse::ok(endpoints).into_response(),
        Err(e) => state_error(e),
    }
}

// ── Prune ──────────────────────────────────────────────────────

/// POST /api/v1/prune
pub async fn prune(
    State(state): State<ApiState>,
    Json(req): Json<PruneRequest>,
) -> impl IntoResponse {
    match run_prune(state.store.as_ref(), &state.endpoints, req.target, req.all) {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => state_error(e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use podling_endpoints::{EndpointController, Ipv4Cidr};
    use podling_scheduler::{Placer, Scheduler};

    use super::*;

    fn test_state() -> ApiState {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let placer = Arc::new(Placer::new(store.clone(), Arc::new(Scheduler::new())));
        let endpoints = Arc::new(EndpointController::new(
            store.clone(),
            Ipv4Cidr::from_cidr("10.96.0.0/16").unwrap(),
            Duration::from_secs(10),
        ));
        ApiState::new(store, placer, endpoints)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn task() -> Task {
        Task {
            name: "job".to_string(),
            image: "busybox".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"], "ok");
    }

    #[tokio::test]
    async fn unplaceable_task_is_created_with_warning() {
        let state = test_state();
        let resp = create_task(State(state.clone()), Json(task())).await.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "pending");
        assert!(body["warning"].as_str().unwrap().contains("no available nodes"));
    }

    #[tokio::test]
    async fn task_without_image_is_bad_request() {
        let state = test_state();
        let resp = create_task(State(state), Json(Task::default())).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["success"], false);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let state = test_state();
        let resp = get_task(State(state.clone()), Path("nope".to_string())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = delete_service(State(state.clone()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = heartbeat(State(state), Path("nope".to_string()), Bytes::new())
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_node_registration_conflicts() {
        let state = test_state();
        let req = RegisterRequest {
            id: Some("n1".to_string()),
            hostname: "worker-1".to_string(),
            port: 8081,
            capacity: 4,
            ..Default::default()
        };
        let resp = register_node(State(state.clone()), Json(req.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = register_node(State(state), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn heartbeat_rejects_malformed_body() {
        let state = test_state();
        state
            .membership
            .register(RegisterRequest {
                id: Some("n1".to_string()),
                hostname: "worker-1".to_string(),
                port: 8081,
                ..Default::default()
            })
            .unwrap();

        let body = Bytes::from_static(b"{oops");
        let resp = heartbeat(State(state.clone()), Path("n1".to_string()), body)
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = heartbeat(
            State(state),
            Path("n1".to_string()),
            Bytes::from_static(br#"{"running_tasks": 2}"#),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["running_tasks"], 2);
    }

    #[tokio::test]
    async fn service_without_selector_is_bad_request() {
        let state = test_state();
        let service = Service {
            name: "web".to_string(),
            ports: vec![ServicePort {
                port: 80,
                ..Default::default()
            }],
            ..Default::default()
        };
        let resp = create_service(State(state), Json(service)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pods_are_listed_by_namespace() {
        let state = test_state();
        for (name, ns) in [("a", "default"), ("b", "staging")] {
            state
                .store
                .add_pod(&Pod {
                    id: name.to_string(),
                    name: name.to_string(),
                    namespace: ns.to_string(),
                    labels: HashMap::new(),
                    ..Default::default()
                })
                .unwrap();
        }

        let resp = list_pods(
            State(state),
            Query(NamespaceQuery {
                namespace: Some("staging".to_string()),
            }),
        )
        .await
        .into_response();
        let body = body_json(resp).await;
        let pods = body["data"].as_array().unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0]["id"], "b");
    }
}
