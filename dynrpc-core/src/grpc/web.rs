//! # gRPC-web Transport
//!
//! gRPC-web runs over HTTP/1.1 and cannot stream a request body while reading the response.
//! A [`GrpcWebStream`] therefore buffers everything that is sent and performs the HTTP request
//! on the first receive, choosing the client streaming, server streaming or bidirectional
//! request constructor from the stream shape given at creation.
//!
//! The service handed to [`GrpcWebTransport::new`] is expected to translate gRPC into
//! gRPC-web, e.g. a client wrapped in `tonic_web::GrpcWebClientLayer`
//! (see [`crate::connect::connect_web`]).
use super::codec::DynamicCodec;
use super::native::{next_message, with_metadata};
use super::transport::{ClientStream, Transport, TransportError};
use crate::BoxError;
use crate::method::{CallTarget, StreamKind};
use http_body::Body as HttpBody;
use prost_reflect::DynamicMessage;
use tonic::{
    Streaming,
    client::{Grpc, GrpcService},
    metadata::MetadataMap,
};

/// A [`Transport`] over gRPC-web.
#[derive(Debug, Clone)]
pub struct GrpcWebTransport<S> {
    client: Grpc<S>,
}

impl<S> GrpcWebTransport<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        Self {
            client: Grpc::new(service),
        }
    }
}

impl<S> Transport for GrpcWebTransport<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    type Stream = GrpcWebStream<S>;

    async fn invoke(
        &mut self,
        target: &CallTarget,
        metadata: MetadataMap,
        request: DynamicMessage,
    ) -> Result<DynamicMessage, TransportError> {
        self.client
            .ready()
            .await
            .map_err(|e| TransportError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(target.output.clone());

        let response = self
            .client
            .unary(with_metadata(request, metadata), target.path.clone(), codec)
            .await
            .map_err(TransportError::Invoke)?;

        Ok(response.into_inner())
    }

    async fn new_stream(
        &mut self,
        target: &CallTarget,
        metadata: MetadataMap,
    ) -> Result<Self::Stream, TransportError> {
        let kind = target.shape.kind();
        if kind == StreamKind::Unary {
            return Err(TransportError::NotAStreamRequest);
        }

        Ok(GrpcWebStream {
            client: self.client.clone(),
            target: target.clone(),
            kind,
            metadata,
            outbound: Vec::new(),
            closed: false,
            inbound: None,
            header: MetadataMap::new(),
            trailer: None,
        })
    }
}

enum Inbound {
    /// The single response of a client streaming call, until it is read.
    Single(Option<DynamicMessage>),
    Streaming(Streaming<DynamicMessage>),
}

/// An open gRPC-web call. Nothing goes on the wire until the first receive.
pub struct GrpcWebStream<S> {
    client: Grpc<S>,
    target: CallTarget,
    kind: StreamKind,
    metadata: MetadataMap,
    outbound: Vec<DynamicMessage>,
    closed: bool,
    inbound: Option<Inbound>,
    header: MetadataMap,
    trailer: Option<MetadataMap>,
}

impl<S> GrpcWebStream<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Sends the buffered request, once.
    async fn flush(&mut self) -> Result<(), TransportError> {
        if self.inbound.is_some() {
            return Ok(());
        }
        self.closed = true;

        self.client
            .ready()
            .await
            .map_err(|e| TransportError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(self.target.output.clone());
        let path = self.target.path.clone();
        let outbound = std::mem::take(&mut self.outbound);
        let metadata = std::mem::take(&mut self.metadata);

        let inbound = match self.kind {
            StreamKind::ClientStreaming => {
                let request = with_metadata(tokio_stream::iter(outbound), metadata);
                let (header, message, _) = self
                    .client
                    .client_streaming(request, path, codec)
                    .await
                    .map_err(TransportError::StreamOpen)?
                    .into_parts();
                self.header = header;
                Inbound::Single(Some(message))
            }
            StreamKind::ServerStreaming => {
                let [message] = <[DynamicMessage; 1]>::try_from(outbound)
                    .map_err(|messages| TransportError::MissingRequest(messages.len()))?;
                let (header, messages, _) = self
                    .client
                    .server_streaming(with_metadata(message, metadata), path, codec)
                    .await
                    .map_err(TransportError::StreamOpen)?
                    .into_parts();
                self.header = header;
                Inbound::Streaming(messages)
            }
            StreamKind::Bidirectional => {
                let request = with_metadata(tokio_stream::iter(outbound), metadata);
                let (header, messages, _) = self
                    .client
                    .streaming(request, path, codec)
                    .await
                    .map_err(TransportError::StreamOpen)?
                    .into_parts();
                self.header = header;
                Inbound::Streaming(messages)
            }
            StreamKind::Unary => return Err(TransportError::NotAStreamRequest),
        };

        self.inbound = Some(inbound);
        Ok(())
    }
}

impl<S> ClientStream for GrpcWebStream<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    async fn send_msg(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::SendAfterClose);
        }
        self.outbound.push(message);
        Ok(())
    }

    async fn recv_msg(&mut self) -> Result<Option<DynamicMessage>, TransportError> {
        self.flush().await?;

        match self.inbound.as_mut() {
            Some(Inbound::Single(message)) => Ok(message.take()),
            Some(Inbound::Streaming(messages)) => next_message(messages, &mut self.trailer).await,
            None => Ok(None),
        }
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    async fn header(&mut self) -> Result<MetadataMap, TransportError> {
        self.flush().await?;
        Ok(self.header.clone())
    }

    fn trailer(&self) -> Option<&MetadataMap> {
        self.trailer.as_ref()
    }
}
