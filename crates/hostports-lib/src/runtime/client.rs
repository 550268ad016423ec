//! gRPC client for the CRI runtime service
//!
//! Dials the runtime over plaintext gRPC, either through a Unix domain
//! socket (`unix:///path`) or TCP (`tcp://host:port`, `http://host:port`).

use super::{RuntimeConnector, RuntimeService, DEFAULT_RUNTIME_ENDPOINT};
use crate::error::RuntimeError;
use crate::models::{ContainerRecord, PodNetwork};
use crate::proto::{
    ContainerFilter, ContainerState, ContainerStateValue, ListContainersRequest,
    PodSandboxStatusRequest, RuntimeServiceClient, VersionRequest,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, info};

/// CRI API version sent with the `Version` handshake
const CRI_API_VERSION: &str = "v1";

/// Parsed runtime endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEndpoint {
    /// Unix domain socket path
    Unix(PathBuf),
    /// HTTP/2 URI for a TCP endpoint
    Tcp(String),
}

impl RuntimeEndpoint {
    /// Parse an endpoint in the forms accepted by crictl and kubelet
    pub fn parse(endpoint: &str) -> Result<Self, RuntimeError> {
        let invalid = |reason: String| RuntimeError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        if endpoint.starts_with('/') {
            return Ok(RuntimeEndpoint::Unix(PathBuf::from(endpoint)));
        }

        let url = url::Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "unix" => {
                if url.path().is_empty() || url.path() == "/" {
                    return Err(invalid("missing socket path".to_string()));
                }
                Ok(RuntimeEndpoint::Unix(PathBuf::from(url.path())))
            }
            "tcp" | "http" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| invalid("missing host".to_string()))?;
                let port = url
                    .port_or_known_default()
                    .ok_or_else(|| invalid("missing port".to_string()))?;
                Ok(RuntimeEndpoint::Tcp(format!("http://{}:{}", host, port)))
            }
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }
}

/// Dials the CRI runtime service
#[derive(Debug, Clone)]
pub struct CriConnector {
    endpoint: String,
    parsed: RuntimeEndpoint,
    connect_timeout: Duration,
}

impl CriConnector {
    /// Create a connector, validating the endpoint up front
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, RuntimeError> {
        let endpoint = endpoint.into();
        let parsed = RuntimeEndpoint::parse(&endpoint)?;
        Ok(Self {
            endpoint,
            parsed,
            connect_timeout,
        })
    }

    /// Parsed form of the endpoint
    pub fn runtime_endpoint(&self) -> &RuntimeEndpoint {
        &self.parsed
    }

    async fn create_channel(&self) -> Result<Channel, RuntimeError> {
        let connect_err = |source| RuntimeError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        };

        match &self.parsed {
            RuntimeEndpoint::Unix(path) => {
                let path = path.clone();
                // The authority is ignored; every connection goes to the socket.
                Endpoint::from_static("http://[::]:50051")
                    .connect_timeout(self.connect_timeout)
                    .connect_with_connector(service_fn(move |_: Uri| {
                        UnixStream::connect(path.clone())
                    }))
                    .await
                    .map_err(connect_err)
            }
            RuntimeEndpoint::Tcp(uri) => Endpoint::from_shared(uri.clone())
                .map_err(connect_err)?
                .connect_timeout(self.connect_timeout)
                .connect()
                .await
                .map_err(connect_err),
        }
    }
}

#[async_trait]
impl RuntimeConnector for CriConnector {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> Result<Arc<dyn RuntimeService>, RuntimeError> {
        let channel = self.create_channel().await?;
        let mut client = RuntimeServiceClient::new(channel);

        let version = client
            .version(VersionRequest {
                version: CRI_API_VERSION.to_string(),
            })
            .await?
            .into_inner();

        info!(
            endpoint = %self.endpoint,
            runtime_name = %version.runtime_name,
            runtime_version = %version.runtime_version,
            runtime_api_version = %version.runtime_api_version,
            "Connected to container runtime"
        );

        Ok(Arc::new(CriRuntime { client }))
    }
}

/// An established CRI connection
#[derive(Debug, Clone)]
pub struct CriRuntime {
    client: RuntimeServiceClient<Channel>,
}

#[async_trait]
impl RuntimeService for CriRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let mut client = self.client.clone();

        let request = ListContainersRequest {
            filter: Some(ContainerFilter {
                state: Some(ContainerStateValue {
                    state: ContainerState::ContainerRunning as i32,
                }),
                ..Default::default()
            }),
        };

        let response = client.list_containers(request).await?.into_inner();
        debug!(count = response.containers.len(), "Listed running containers");

        Ok(response
            .containers
            .into_iter()
            .map(ContainerRecord::from)
            .collect())
    }

    async fn pod_network(&self, pod_sandbox_id: &str) -> Result<PodNetwork, RuntimeError> {
        let mut client = self.client.clone();

        let request = PodSandboxStatusRequest {
            pod_sandbox_id: pod_sandbox_id.to_string(),
            verbose: false,
        };

        let response = client.pod_sandbox_status(request).await?.into_inner();
        Ok(PodNetwork::from(response))
    }
}

/// Builder for CriConnector configuration
pub struct CriConnectorBuilder {
    endpoint: String,
    connect_timeout: Duration,
}

impl CriConnectorBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_RUNTIME_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<CriConnector, RuntimeError> {
        CriConnector::new(self.endpoint, self.connect_timeout)
    }
}

impl Default for CriConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
