//! # Reflection Client
//!
//! A client implementation for `grpc.reflection.v1`.
//!
//! This client builds a complete `FileDescriptorSet` for a symbol by querying a server that
//! supports reflection, fetching the imports of every received file until the whole schema tree
//! is known.
//!
//! Every query is a short-lived stream whose requests are all written before any response is
//! read. Dependencies are therefore fetched in rounds: one stream per level of imports. This
//! keeps reflection usable over half-duplex transports such as gRPC-web.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet};
use tonic::client::GrpcService;
use tonic::transport::Channel;
use tonic::{Code, Status};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, server_reflection_client::ServerReflectionClient,
    server_reflection_request::MessageRequest, server_reflection_response::MessageResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionResolveError {
    #[error(
        "Failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    ServerStreamInitFailed(#[source] Status),

    #[error("The server stream returned an error status: '{0}'")]
    ServerStreamFailure(#[source] Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: Received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

impl ReflectionResolveError {
    /// The server does not expose the reflection service at all.
    pub fn is_unimplemented(&self) -> bool {
        matches!(
            self,
            Self::ServerStreamInitFailed(status) | Self::ServerStreamFailure(status)
                if status.code() == Code::Unimplemented
        )
    }

    /// The server does not know the requested symbol or file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ServerStreamFailure(status) => status.code() == Code::NotFound,
            Self::ServerError { code, .. } => *code == Code::NotFound as i32,
            _ => false,
        }
    }
}

// The host defined in the reflection requests doesn't seem to be a mandatory field
// and there is no documentation about what it is about.
// So we won't enforce it from the user.
const EMPTY_HOST: &str = "";

/// A generic client for the gRPC Server Reflection Protocol.
#[derive(Debug, Clone)]
pub struct ReflectionClient<T = Channel> {
    client: ServerReflectionClient<T>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(channel: S) -> Self {
        let client = ServerReflectionClient::new(channel);
        Self { client }
    }

    /// Asks the reflection service for the file containing the requested symbol
    /// (e.g., `my.package.MyService`), along with all of its transitive imports.
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ReflectionResolveError> {
        let mut collected_files = HashMap::new();
        let mut requested = HashSet::new();
        let mut round = vec![MessageRequest::FileContainingSymbol(symbol.to_string())];

        while !round.is_empty() {
            tracing::debug!(symbol, requests = round.len(), "reflection round");

            let mut missing = Vec::new();
            for response in self.query(round).await? {
                let raw_protos = match response {
                    MessageResponse::FileDescriptorResponse(res) => res.file_descriptor_proto,
                    other => {
                        return Err(ReflectionResolveError::UnexpectedResponseType(format!(
                            "{other:?}"
                        )));
                    }
                };

                for raw in raw_protos {
                    let fd = FileDescriptorProto::decode(raw.as_ref())?;
                    let Some(name) = fd.name.clone() else {
                        continue;
                    };
                    if collected_files.contains_key(&name) {
                        continue;
                    }

                    requested.insert(name.clone());
                    missing.extend(
                        fd.dependency
                            .iter()
                            .filter(|dep| requested.insert(dep.to_string()))
                            .cloned(),
                    );
                    collected_files.insert(name, fd);
                }
            }

            // Servers often ship imports alongside the file that needs them.
            round = missing
                .into_iter()
                .filter(|dep| !collected_files.contains_key(dep))
                .map(MessageRequest::FileByFilename)
                .collect();
        }

        Ok(FileDescriptorSet {
            file: collected_files.into_values().collect(),
        })
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        let request = MessageRequest::ListServices(String::new());

        match self.query(vec![request]).await?.pop() {
            Some(MessageResponse::ListServicesResponse(resp)) => {
                Ok(resp.service.into_iter().map(|s| s.name).collect())
            }
            Some(other) => Err(ReflectionResolveError::UnexpectedResponseType(format!(
                "{other:?}",
            ))),
            None => Err(ReflectionResolveError::StreamClosed),
        }
    }

    /// Sends all `requests` on a fresh stream, then reads exactly one response for each.
    async fn query(
        &mut self,
        requests: Vec<MessageRequest>,
    ) -> Result<Vec<MessageResponse>, ReflectionResolveError> {
        let expected = requests.len();
        let requests: Vec<_> = requests
            .into_iter()
            .map(|message_request| ServerReflectionRequest {
                host: EMPTY_HOST.to_string(),
                message_request: Some(message_request),
            })
            .collect();

        let mut response_stream = self
            .client
            .server_reflection_info(tokio_stream::iter(requests))
            .await
            .map_err(ReflectionResolveError::ServerStreamInitFailed)?
            .into_inner();

        let mut responses = Vec::with_capacity(expected);
        while responses.len() < expected {
            let response = response_stream
                .message()
                .await
                .map_err(ReflectionResolveError::ServerStreamFailure)?
                .ok_or(ReflectionResolveError::StreamClosed)?;

            match response.message_response {
                Some(MessageResponse::ErrorResponse(e)) => {
                    return Err(ReflectionResolveError::ServerError {
                        code: e.error_code,
                        message: e.error_message,
                    });
                }
                Some(message) => responses.push(message),
                None => {
                    return Err(ReflectionResolveError::UnexpectedResponseType(
                        "Empty Message".into(),
                    ));
                }
            }
        }

        Ok(responses)
    }
}
