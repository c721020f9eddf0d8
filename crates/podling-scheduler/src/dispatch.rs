//! Workload dispatch to worker nodes.
//!
//! After a workload is assigned, the control plane POSTs its JSON to the
//! chosen worker (`http://{hostname}:{port}/api/v1/tasks` or `/pods`).
//! Dispatch is fire-and-forget: the request runs on a spawned task,
//! failures are logged at `warn`, and nothing is retried or rolled back.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode, header};
use http_body_util::Full;
use serde::Serialize;
use tracing::{debug, warn};

use podling_state::{Node, Pod, Task};

use crate::error::{SchedulerError, SchedulerResult};

/// Default bound on one dispatch request, connect included.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Hands a placed workload to its worker.
///
/// Implementations must not block the caller.
pub trait Dispatcher: Send + Sync {
    fn dispatch_task(&self, node: &Node, task: &Task);

    fn dispatch_pod(&self, node: &Node, pod: &Pod);
}

/// Dispatcher that POSTs workloads to the worker's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn spawn<T: Serialize>(
        &self,
        node: &Node,
        path: &'static str,
        kind: &'static str,
        id: &str,
        workload: &T,
    ) {
        let body = match serde_json::to_vec(workload) {
            Ok(body) => body,
            Err(e) => {
                warn!(kind, %id, error = %e, "failed to encode workload for dispatch");
                return;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(kind, %id, "no async runtime, dispatch skipped");
                return;
            }
        };

        let address = node.address();
        let node_id = node.id.clone();
        let id = id.to_string();
        let timeout = self.timeout;
        handle.spawn(async move {
            match post_json(&address, path, body, timeout).await {
                Ok(status) => debug!(kind, %id, %node_id, %status, "workload dispatched"),
                Err(e) => warn!(kind, %id, %node_id, error = %e, "workload dispatch failed"),
            }
        });
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_TIMEOUT)
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch_task(&self, node: &Node, task: &Task) {
        self.spawn(node, "/api/v1/tasks", "task", &task.id, task);
    }

    fn dispatch_pod(&self, node: &Node, pod: &Pod) {
        self.spawn(node, "/api/v1/pods", "pod", &pod.id, pod);
    }
}

/// POST a JSON body to `http://{address}{path}` over HTTP/1.1.
///
/// Returns the response status if it is 2xx.
pub async fn post_json(
    address: &str,
    path: &str,
    body: Vec<u8>,
    timeout: Duration,
) -> SchedulerResult<StatusCode> {
    let uri = format!("http://{address}{path}");

    let exchange = async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| SchedulerError::Dispatch(format!("connect {address}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| SchedulerError::Dispatch(format!("handshake with {address}: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = Request::builder()
            .method(Method::POST)
            .uri(&uri)
            .header(header::HOST, address)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "podling-scheduler/0.1")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| SchedulerError::Dispatch(format!("build request for {uri}: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| SchedulerError::Dispatch(format!("POST {uri}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(SchedulerError::Dispatch(format!("POST {uri}: worker responded {status}")))
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| SchedulerError::Dispatch(format!("POST {uri}: timed out after {timeout:?}")))?
}
