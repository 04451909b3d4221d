//! # Native gRPC Transport
//!
//! Speaks gRPC over HTTP/2 through `tonic`. Native gRPC does not care about the streaming mode
//! when a call is opened: every stream is driven through [`Grpc::streaming`], and a client or
//! server streaming method simply sees one message on the corresponding side.
//!
//! Opening the HTTP/2 call is deferred until the first receive (or header read). Messages sent
//! before that are queued in an unbounded channel that becomes the request body, so a
//! half-duplex caller never waits on response headers that the server only sends once it has
//! read the whole request.
use super::codec::DynamicCodec;
use super::transport::{ClientStream, Transport, TransportError};
use crate::BoxError;
use crate::method::CallTarget;
use futures_util::future::{BoxFuture, FutureExt};
use http_body::Body as HttpBody;
use prost_reflect::DynamicMessage;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::{
    Streaming,
    client::{Grpc, GrpcService},
    metadata::MetadataMap,
    transport::Channel,
};

/// A [`Transport`] over plain gRPC.
#[derive(Debug, Clone)]
pub struct GrpcTransport<S = Channel> {
    client: Grpc<S>,
}

impl<S> GrpcTransport<S>
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

impl<S> Transport for GrpcTransport<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    type Stream = GrpcStream;

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
        let request = with_metadata(request, metadata);

        let response = self
            .client
            .unary(request, target.path.clone(), codec)
            .await
            .map_err(TransportError::Invoke)?;

        Ok(response.into_inner())
    }

    async fn new_stream(
        &mut self,
        target: &CallTarget,
        metadata: MetadataMap,
    ) -> Result<Self::Stream, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut client = self.client.clone();
        let path = target.path.clone();
        let codec = DynamicCodec::new(target.output.clone());
        let request = with_metadata(UnboundedReceiverStream::new(receiver), metadata);

        let call = async move {
            client
                .ready()
                .await
                .map_err(|e| TransportError::ClientNotReady(e.into()))?;

            let response = client
                .streaming(request, path, codec)
                .await
                .map_err(TransportError::StreamOpen)?;

            Ok(response.into_parts())
        }
        .boxed();

        Ok(GrpcStream {
            sender: Some(sender),
            pending: Some(call),
            header: MetadataMap::new(),
            messages: None,
            trailer: None,
        })
    }
}

type OpenedCall = (MetadataMap, Streaming<DynamicMessage>, http::Extensions);

/// An open native gRPC call.
pub struct GrpcStream {
    sender: Option<mpsc::UnboundedSender<DynamicMessage>>,
    pending: Option<BoxFuture<'static, Result<OpenedCall, TransportError>>>,
    header: MetadataMap,
    messages: Option<Streaming<DynamicMessage>>,
    trailer: Option<MetadataMap>,
}

impl GrpcStream {
    /// Drives the deferred call until response headers arrive.
    async fn open(&mut self) -> Result<(), TransportError> {
        if let Some(call) = self.pending.take() {
            let (header, messages, _) = call.await?;
            self.header = header;
            self.messages = Some(messages);
        }
        Ok(())
    }
}

impl ClientStream for GrpcStream {
    async fn send_msg(&mut self, message: DynamicMessage) -> Result<(), TransportError> {
        let sender = self.sender.as_ref().ok_or(TransportError::SendAfterClose)?;
        sender.send(message).map_err(|_| TransportError::Send)
    }

    async fn recv_msg(&mut self) -> Result<Option<DynamicMessage>, TransportError> {
        self.open().await?;

        match self.messages.as_mut() {
            Some(messages) => next_message(messages, &mut self.trailer).await,
            None => Ok(None),
        }
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        // Dropping the sender ends the request body.
        self.sender = None;
        Ok(())
    }

    async fn header(&mut self) -> Result<MetadataMap, TransportError> {
        self.open().await?;
        Ok(self.header.clone())
    }

    fn trailer(&self) -> Option<&MetadataMap> {
        self.trailer.as_ref()
    }
}

pub(super) fn with_metadata<T>(message: T, metadata: MetadataMap) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = metadata;
    request
}

/// Reads the next response, capturing trailers once the stream is exhausted.
pub(super) async fn next_message(
    messages: &mut Streaming<DynamicMessage>,
    trailer: &mut Option<MetadataMap>,
) -> Result<Option<DynamicMessage>, TransportError> {
    match messages.message().await.map_err(TransportError::Recv)? {
        Some(message) => Ok(Some(message)),
        None => {
            *trailer = messages.trailers().await.map_err(TransportError::Recv)?;
            Ok(None)
        }
    }
}
