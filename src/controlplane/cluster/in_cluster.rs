//! Shared Kubernetes Client
//!
//! Sends PersistentVolume requests through the same [`kube::Client`] that
//! watches claims, so both use one server address, credential set and TLS
//! configuration.

use crate::domain::{ClusterState, Volume};
use crate::error::{Error, Result};
use async_trait::async_trait;
use http::{header, Method, Request};
use kube::Client;
use tracing::debug;

/// PersistentVolume records over the operator's kube client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn request(method: Method, path: &str, body: Vec<u8>) -> Result<Request<Vec<u8>>> {
        let mut builder = Request::builder().method(method.clone()).uri(path);
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        builder.body(body).map_err(|e| {
            Error::cluster(method.as_str(), path, None, format!("invalid request: {}", e))
        })
    }
}

/// API errors keep their status for retry classification; anything else is
/// a transport failure of the kube client.
fn map_error(method: &Method, path: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(response) => {
            Error::cluster(method.as_str(), path, Some(response.code), response.message)
        }
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ClusterState for KubeClusterClient {
    async fn get(&self, path: &str) -> Result<Volume> {
        debug!("GET {}", path);
        let request = Self::request(Method::GET, path, Vec::new())?;
        self.client
            .request::<Volume>(request)
            .await
            .map_err(|e| map_error(&Method::GET, path, e))
    }

    async fn post(&self, path: &str, body: &Volume) -> Result<()> {
        debug!("POST {}", path);
        let request = Self::request(Method::POST, path, serde_json::to_vec(body)?)?;
        self.client
            .request_text(request)
            .await
            .map(|_| ())
            .map_err(|e| map_error(&Method::POST, path, e))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("DELETE {}", path);
        let request = Self::request(Method::DELETE, path, Vec::new())?;
        self.client
            .request_text(request)
            .await
            .map(|_| ())
            .map_err(|e| map_error(&Method::DELETE, path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::template::volume_for_claim;
    use crate::domain::{Claim, OwnershipMarker};
    use assert_matches::assert_matches;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct ApiServer {
        posted: Mutex<Vec<serde_json::Value>>,
        deleted: Mutex<Vec<String>>,
    }

    async fn serve(server: Arc<ApiServer>) -> Client {
        let router = Router::new()
            .route("/api/v1/persistentvolumes", post(create_pv))
            .route(
                "/api/v1/persistentvolumes/:name",
                get(read_pv).delete(delete_pv),
            )
            .with_state(server);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let config = kube::Config::new(format!("http://{}", addr).parse().unwrap());
        Client::try_from(config).unwrap()
    }

    async fn create_pv(
        State(server): State<Arc<ApiServer>>,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        server.posted.lock().push(body.clone());
        (StatusCode::CREATED, Json(body))
    }

    async fn read_pv(Path(name): Path<String>) -> (StatusCode, Json<serde_json::Value>) {
        if name != "c1" {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "status": "Failure",
                    "message": format!("persistentvolumes \"{}\" not found", name),
                    "reason": "NotFound",
                    "code": 404
                })),
            );
        }
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "apiVersion": "v1",
                "kind": "PersistentVolume",
                "metadata": {"name": "c1"},
                "spec": {"claimRef": {"namespace": "default", "name": "c1"}}
            })),
        )
    }

    async fn delete_pv(
        State(server): State<Arc<ApiServer>>,
        Path(name): Path<String>,
    ) -> Json<serde_json::Value> {
        server.deleted.lock().push(name);
        Json(serde_json::json!({"kind": "Status", "status": "Success"}))
    }

    #[tokio::test]
    async fn test_round_trip_through_kube_client() {
        let server = Arc::new(ApiServer::default());
        let client = KubeClusterClient::new(serve(server.clone()).await);

        let claim = Claim::new("default", "c1", "u1").with_requested_size("5Gi");
        let volume = volume_for_claim(&claim, "/mnt/", &OwnershipMarker::default());
        client
            .post("/api/v1/persistentvolumes", &volume)
            .await
            .unwrap();
        assert_eq!(server.posted.lock()[0]["spec"]["hostPath"]["path"], "/mnt/u1");

        let fetched = client.get("/api/v1/persistentvolumes/c1").await.unwrap();
        assert_eq!(fetched.claim_ref_name(), Some("c1"));

        client.delete("/api/v1/persistentvolumes/c1").await.unwrap();
        assert_eq!(server.deleted.lock().clone(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_api_error_keeps_status() {
        let client = KubeClusterClient::new(serve(Arc::default()).await);

        let err = client
            .get("/api/v1/persistentvolumes/missing")
            .await
            .unwrap_err();
        assert_matches!(
            err,
            Error::Cluster { status: Some(404), ref reason, .. }
                if reason == "persistentvolumes \"missing\" not found"
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = Client::try_from(kube::Config::new(url.parse().unwrap())).unwrap();

        let err = KubeClusterClient::new(client)
            .get("/api/v1/persistentvolumes/c1")
            .await
            .unwrap_err();
        assert_matches!(err, Error::Kube(_));
        assert!(err.is_retryable());
    }
}
