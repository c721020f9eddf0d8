//! podling-api: REST API for the Podling control plane.
//!
//! Every response body has the shape
//! `{ "success": bool, "data"?: ..., "error"?: "...", "warning"?: "..." }`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Control plane liveness |
//! | GET | `/api/v1/tasks` | List tasks |
//! | POST | `/api/v1/tasks` | Create and schedule a task |
//! | GET | `/api/v1/tasks/{id}` | Get a task |
//! | DELETE | `/api/v1/tasks/{id}` | Delete a task |
//! | PUT | `/api/v1/tasks/{id}/status` | Worker status report |
//! | GET | `/api/v1/pods` | List pods (`?namespace=`) |
//! | POST | `/api/v1/pods` | Create and schedule a pod |
//! | GET | `/api/v1/pods/{id}` | Get a pod |
//! | DELETE | `/api/v1/pods/{id}` | Delete a pod |
//! | PUT | `/api/v1/pods/{id}/status` | Worker status report |
//! | GET | `/api/v1/nodes` | List nodes |
//! | POST | `/api/v1/nodes` | Register a node |
//! | GET | `/api/v1/nodes/{id}` | Get a node |
//! | DELETE | `/api/v1/nodes/{id}` | Deregister a node |
//! | POST | `/api/v1/nodes/{id}/heartbeat` | Node heartbeat |
//! | GET | `/api/v1/services` | List services (`?namespace=`) |
//! | POST | `/api/v1/services` | Create a service |
//! | GET | `/api/v1/services/{id}` | Get a service |
//! | DELETE | `/api/v1/services/{id}` | Delete a service |
//! | GET | `/api/v1/endpoints` | List endpoints (`?namespace=`) |
//! | GET | `/api/v1/endpoints/{service_id}` | Get a service's endpoints |
//! | POST | `/api/v1/prune` | Bulk-delete finished or dead objects |

pub mod handlers;
pub mod prune;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};

use podling_cluster::Membership;
use podling_endpoints::EndpointController;
use podling_scheduler::Placer;
use podling_state::SharedStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
    pub placer: Arc<Placer>,
    pub endpoints: Arc<EndpointController>,
    pub membership: Arc<Membership>,
}

impl ApiState {
    pub fn new(
        store: SharedStore,
        placer: Arc<Placer>,
        endpoints: Arc<EndpointController>,
    ) -> Self {
        let membership = Arc::new(Membership::new(store.clone()));
        Self {
            store,
            placer,
            endpoints,
            membership,
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route("/tasks/{id}", get(handlers::get_task).delete(handlers::delete_task))
        .route("/tasks/{id}/status", put(handlers::update_task_status))
        .route("/pods", get(handlers::list_pods).post(handlers::create_pod))
        .route("/pods/{id}", get(handlers::get_pod).delete(handlers::delete_pod))
        .route("/pods/{id}/status", put(handlers::update_pod_status))
        .route("/nodes", get(handlers::list_nodes).post(handlers::register_node))
        .route("/nodes/{id}", get(handlers::get_node).delete(handlers::deregister_node))
        .route("/nodes/{id}/heartbeat", post(handlers::heartbeat))
        .route("/services", get(handlers::list_services).post(handlers::create_service))
        .route("/services/{id}", get(handlers::get_service).delete(handlers::delete_service))
        .route("/endpoints", get(handlers::list_endpoints))
        .route("/endpoints/{service_id}", get(handlers::get_endpoints))
        .route("/prune", post(handlers::prune))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
