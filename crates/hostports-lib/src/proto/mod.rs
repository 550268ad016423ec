//! CRI protobuf types
//!
//! Hand-declared prost messages and a tonic client for the subset of the
//! Kubernetes `runtime.v1.RuntimeService` API the agent consumes:
//! `Version`, `ListContainers` and `PodSandboxStatus`. Tags and names match
//! `k8s.io/cri-api/pkg/apis/runtime/v1/api.proto`; fields the agent never
//! reads are omitted and skipped by the decoder.

pub mod runtime {
    pub mod v1 {
        use prost::Message;
        use std::collections::HashMap;

        #[derive(Clone, PartialEq, Message)]
        pub struct VersionRequest {
            #[prost(string, tag = "1")]
            pub version: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct VersionResponse {
            #[prost(string, tag = "1")]
            pub version: String,
            #[prost(string, tag = "2")]
            pub runtime_name: String,
            #[prost(string, tag = "3")]
            pub runtime_version: String,
            #[prost(string, tag = "4")]
            pub runtime_api_version: String,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ContainerState {
            ContainerCreated = 0,
            ContainerRunning = 1,
            ContainerExited = 2,
            ContainerUnknown = 3,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerStateValue {
            #[prost(enumeration = "ContainerState", tag = "1")]
            pub state: i32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerFilter {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(message, optional, tag = "2")]
            pub state: Option<ContainerStateValue>,
            #[prost(string, tag = "3")]
            pub pod_sandbox_id: String,
            #[prost(map = "string, string", tag = "4")]
            pub label_selector: HashMap<String, String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListContainersRequest {
            #[prost(message, optional, tag = "1")]
            pub filter: Option<ContainerFilter>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerMetadata {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(uint32, tag = "2")]
            pub attempt: u32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct Container {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "2")]
            pub pod_sandbox_id: String,
            #[prost(message, optional, tag = "3")]
            pub metadata: Option<ContainerMetadata>,
            #[prost(string, tag = "5")]
            pub image_ref: String,
            #[prost(enumeration = "ContainerState", tag = "6")]
            pub state: i32,
            #[prost(int64, tag = "7")]
            pub created_at: i64,
            #[prost(map = "string, string", tag = "8")]
            pub labels: HashMap<String, String>,
            #[prost(map = "string, string", tag = "9")]
            pub annotations: HashMap<String, String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListContainersResponse {
            #[prost(message, repeated, tag = "1")]
            pub containers: Vec<Container>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxStatusRequest {
            #[prost(string, tag = "1")]
            pub pod_sandbox_id: String,
            #[prost(bool, tag = "2")]
            pub verbose: bool,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodIp {
            #[prost(string, tag = "1")]
            pub ip: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxNetworkStatus {
            #[prost(string, tag = "1")]
            pub ip: String,
            #[prost(message, repeated, tag = "2")]
            pub additional_ips: Vec<PodIp>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxStatus {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(int32, tag = "3")]
            pub state: i32,
            #[prost(int64, tag = "4")]
            pub created_at: i64,
            #[prost(message, optional, tag = "5")]
            pub network: Option<PodSandboxNetworkStatus>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodSandboxStatusResponse {
            #[prost(message, optional, tag = "1")]
            pub status: Option<PodSandboxStatus>,
            #[prost(map = "string, string", tag = "2")]
            pub info: HashMap<String, String>,
        }

        pub mod runtime_service_client {
            use super::*;
            use tonic::codegen::*;
            use tonic::transport::Uri;

            #[derive(Debug, Clone)]
            pub struct RuntimeServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl RuntimeServiceClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> RuntimeServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }

                async fn ready(&mut self) -> Result<(), tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })
                }

                pub async fn version(
                    &mut self,
                    request: impl tonic::IntoRequest<VersionRequest>,
                ) -> Result<tonic::Response<VersionResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path =
                        http::uri::PathAndQuery::from_static("/runtime.v1.RuntimeService/Version");
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn list_containers(
                    &mut self,
                    request: impl tonic::IntoRequest<ListContainersRequest>,
                ) -> Result<tonic::Response<ListContainersResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/ListContainers",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn pod_sandbox_status(
                    &mut self,
                    request: impl tonic::IntoRequest<PodSandboxStatusRequest>,
                ) -> Result<tonic::Response<PodSandboxStatusResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/PodSandboxStatus",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub use runtime::v1::runtime_service_client::RuntimeServiceClient;
pub use runtime::v1::*;

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_container_decodes_annotations_and_skips_unknown_fields() {
        let container = Container {
            id: "abc".to_string(),
            pod_sandbox_id: "pod-1".to_string(),
            metadata: Some(ContainerMetadata {
                name: "web".to_string(),
                attempt: 0,
            }),
            state: ContainerState::ContainerRunning as i32,
            created_at: 42,
            annotations: [(
                "io.kubernetes.container.ports".to_string(),
                "[]".to_string(),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let mut bytes = container.encode_to_vec();
        // Field 4 (image spec) is not declared here; append one and make
        // sure decoding tolerates it.
        bytes.extend_from_slice(&[0x22, 0x00]);

        let decoded = Container::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.id, "abc");
        assert_eq!(decoded.created_at, 42);
        assert_eq!(decoded.state(), ContainerState::ContainerRunning);
        assert_eq!(
            decoded.annotations.get("io.kubernetes.container.ports"),
            Some(&"[]".to_string())
        );
    }

    #[test]
    fn test_running_filter_encodes_state() {
        let request = ListContainersRequest {
            filter: Some(ContainerFilter {
                state: Some(ContainerStateValue {
                    state: ContainerState::ContainerRunning as i32,
                }),
                ..Default::default()
            }),
        };

        let decoded = ListContainersRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        let state = decoded.filter.and_then(|f| f.state).map(|s| s.state);
        assert_eq!(state, Some(1));
    }
}
