//! # Transport Contract
//!
//! The call engine talks to servers exclusively through [`Transport`] and [`ClientStream`].
//! Two implementations exist: [`super::native::GrpcTransport`] speaks gRPC over HTTP/2 and
//! [`super::web::GrpcWebTransport`] speaks gRPC-web. Whatever differs between the two wire
//! protocols (notably when the streaming mode must be known) stays behind this contract.
use crate::BoxError;
use crate::method::CallTarget;
use prost_reflect::DynamicMessage;
use std::future::Future;
use tonic::metadata::MetadataMap;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Call failed: '{0}'")]
    Invoke(#[source] tonic::Status),
    #[error("Failed to open stream: '{0}'")]
    StreamOpen(#[source] tonic::Status),
    #[error("Failed to send message, the stream is gone")]
    Send,
    #[error("Failed to receive message: '{0}'")]
    Recv(#[source] tonic::Status),
    #[error("Cannot send a message after the send direction was closed")]
    SendAfterClose,
    #[error("A unary method cannot be called through a stream")]
    NotAStreamRequest,
    #[error("A server streaming call requires exactly one request message, got {0}")]
    MissingRequest(usize),
}

impl TransportError {
    /// The gRPC status reported by the server, if the failure carries one.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            Self::Invoke(status) | Self::StreamOpen(status) | Self::Recv(status) => Some(status),
            _ => None,
        }
    }
}

/// A connection able to perform calls on methods described at runtime.
pub trait Transport {
    type Stream: ClientStream;

    /// Performs a single request/response round trip.
    fn invoke(
        &mut self,
        target: &CallTarget,
        metadata: MetadataMap,
        request: DynamicMessage,
    ) -> impl Future<Output = Result<DynamicMessage, TransportError>>;

    /// Opens a logical stream for a client, server or bidirectional streaming method.
    fn new_stream(
        &mut self,
        target: &CallTarget,
        metadata: MetadataMap,
    ) -> impl Future<Output = Result<Self::Stream, TransportError>>;
}

/// One open call on a [`Transport`].
pub trait ClientStream {
    fn send_msg(
        &mut self,
        message: DynamicMessage,
    ) -> impl Future<Output = Result<(), TransportError>>;

    /// Returns `Ok(None)` once the server has finished sending.
    fn recv_msg(&mut self) -> impl Future<Output = Result<Option<DynamicMessage>, TransportError>>;

    /// Half-closes the stream: no further messages will be sent, responses can still be read.
    fn close_send(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Response headers. Waits for them to arrive if needed.
    fn header(&mut self) -> impl Future<Output = Result<MetadataMap, TransportError>>;

    /// Response trailers, available once the stream is exhausted.
    fn trailer(&self) -> Option<&MetadataMap>;
}
