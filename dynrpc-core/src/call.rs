//! # Call Engine
//!
//! Drives one call on a [`DynamicMethod`] to completion over any [`Transport`]:
//!
//! * **Unary**: one request (zero-valued if the input is empty), one response.
//! * **Client streaming**: every input message is sent, the stream is half-closed, then exactly
//!   one response is read.
//! * **Server streaming**: one request is sent, then responses are read until the end of the
//!   stream.
//! * **Bidirectional streaming**: every input message is sent, the stream is half-closed, then
//!   every response is read. Sends and receives never interleave.
//!
//! Each response is rendered as soon as it arrives and written, followed by a newline, to the
//! output sink. A failure aborts the call; output already written stays written.
use crate::format::{FormatError, MessageFormatter, MessageParser, ParseError};
use crate::grpc::transport::{ClientStream, Transport, TransportError};
use crate::method::{DynamicMethod, MethodError, StreamKind};
use prost_reflect::DynamicMessage;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tonic::metadata::MetadataMap;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Method(#[from] MethodError),
    #[error("Failed to build request: '{0}'")]
    Request(#[source] ParseError),
    #[error("Failed to invoke '{method}': '{source}'")]
    Invoke {
        method: String,
        source: TransportError,
    },
    #[error("Streaming call to '{method}' failed: '{source}'")]
    Stream {
        method: String,
        source: TransportError,
    },
    #[error("Failed to format response: '{0}'")]
    Response(#[source] FormatError),
    #[error("Failed to write response: '{0}'")]
    Output(#[source] std::io::Error),
    #[error("Call did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl CallError {
    /// The gRPC status returned by the server, if the call failed with one.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            CallError::Invoke { source, .. } | CallError::Stream { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Executes calls over a transport, attaching the same metadata to every call.
#[derive(Debug)]
pub struct CallEngine<T> {
    transport: T,
    metadata: MetadataMap,
    timeout: Option<Duration>,
}

impl<T: Transport> CallEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            metadata: MetadataMap::new(),
            timeout: None,
        }
    }

    /// Metadata (headers) sent with every call.
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Upper bound for a whole call, checked whenever the call waits on input or the network.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Calls `method` with the messages produced by `parser`, writing every response to `out`.
    pub async fn call<P, F, W>(
        &mut self,
        method: &DynamicMethod,
        parser: &mut P,
        formatter: &F,
        out: &mut W,
    ) -> Result<(), CallError>
    where
        P: MessageParser,
        F: MessageFormatter,
        W: Write,
    {
        let mut call = Call {
            method,
            deadline: Deadline::new(self.timeout),
            output: Output { formatter, out },
        };

        let kind = method.stream_shape().kind();
        debug!(method = method.full_name(), ?kind, "starting call");

        match kind {
            StreamKind::Unary => call.unary(&mut self.transport, &self.metadata, parser).await,
            StreamKind::ClientStreaming => {
                call.client_streaming(&mut self.transport, &self.metadata, parser)
                    .await
            }
            StreamKind::ServerStreaming => {
                call.server_streaming(&mut self.transport, &self.metadata, parser)
                    .await
            }
            StreamKind::Bidirectional => {
                call.bidirectional(&mut self.transport, &self.metadata, parser)
                    .await
            }
        }
    }
}

/// The state of one call in flight.
struct Call<'a, F, W> {
    method: &'a DynamicMethod,
    deadline: Deadline,
    output: Output<'a, F, W>,
}

impl<F: MessageFormatter, W: Write> Call<'_, F, W> {
    async fn unary<T: Transport, P: MessageParser>(
        &mut self,
        transport: &mut T,
        metadata: &MetadataMap,
        parser: &mut P,
    ) -> Result<(), CallError> {
        let target = self.method.call_target()?;
        let request = self.first_request(parser).await?;

        let response = self
            .deadline
            .guard(transport.invoke(&target, metadata.clone(), request))
            .await?
            .map_err(|source| CallError::Invoke {
                method: self.method.full_name().to_string(),
                source,
            })?;

        self.output.emit(&response)
    }

    async fn client_streaming<T: Transport, P: MessageParser>(
        &mut self,
        transport: &mut T,
        metadata: &MetadataMap,
        parser: &mut P,
    ) -> Result<(), CallError> {
        let mut stream = self.open(transport, metadata).await?;

        self.send_all(&mut stream, parser).await?;
        self.close(&mut stream).await?;

        let response = match self.recv(&mut stream).await? {
            Some(response) => response,
            None => {
                warn!(
                    method = self.method.full_name(),
                    "stream ended without a response, using an empty message"
                );
                self.method.response_message()
            }
        };
        self.output.emit(&response)?;

        self.finish(&mut stream).await
    }

    async fn server_streaming<T: Transport, P: MessageParser>(
        &mut self,
        transport: &mut T,
        metadata: &MetadataMap,
        parser: &mut P,
    ) -> Result<(), CallError> {
        let request = self.first_request(parser).await?;
        let mut stream = self.open(transport, metadata).await?;

        self.send(&mut stream, request).await?;
        // Some servers only answer once the request body has ended.
        self.close(&mut stream).await?;

        self.recv_all(&mut stream).await?;
        self.finish(&mut stream).await
    }

    async fn bidirectional<T: Transport, P: MessageParser>(
        &mut self,
        transport: &mut T,
        metadata: &MetadataMap,
        parser: &mut P,
    ) -> Result<(), CallError> {
        let mut stream = self.open(transport, metadata).await?;

        // TODO: pump sends and receives from two tasks to support servers that answer
        // before the client finishes sending.
        self.send_all(&mut stream, parser).await?;
        self.close(&mut stream).await?;

        self.recv_all(&mut stream).await?;
        self.finish(&mut stream).await
    }

    /// The single request of unary and server streaming calls. Empty input is a zero-valued request.
    async fn first_request<P: MessageParser>(
        &self,
        parser: &mut P,
    ) -> Result<DynamicMessage, CallError> {
        Ok(self
            .next_request(parser)
            .await?
            .unwrap_or_else(|| self.method.request_message()))
    }

    async fn next_request<P: MessageParser>(
        &self,
        parser: &mut P,
    ) -> Result<Option<DynamicMessage>, CallError> {
        let mut message = self.method.request_message();
        let parsed = self
            .deadline
            .guard(parser.next_message(&mut message))
            .await?
            .map_err(CallError::Request)?;

        Ok(parsed.then_some(message))
    }

    async fn open<T: Transport>(
        &self,
        transport: &mut T,
        metadata: &MetadataMap,
    ) -> Result<T::Stream, CallError> {
        let target = self.method.call_target()?;
        let stream = self
            .deadline
            .guard(transport.new_stream(&target, metadata.clone()))
            .await?;
        stream.map_err(|source| self.stream_error(source))
    }

    async fn send_all<S: ClientStream, P: MessageParser>(
        &self,
        stream: &mut S,
        parser: &mut P,
    ) -> Result<(), CallError> {
        let mut sent = 0;
        while let Some(request) = self.next_request(parser).await? {
            self.send(stream, request).await?;
            sent += 1;
        }
        debug!(method = self.method.full_name(), sent, "request stream complete");
        Ok(())
    }

    async fn send<S: ClientStream>(
        &self,
        stream: &mut S,
        request: DynamicMessage,
    ) -> Result<(), CallError> {
        let sent = self.deadline.guard(stream.send_msg(request)).await?;
        sent.map_err(|source| self.stream_error(source))
    }

    async fn close<S: ClientStream>(&self, stream: &mut S) -> Result<(), CallError> {
        let closed = self.deadline.guard(stream.close_send()).await?;
        closed.map_err(|source| self.stream_error(source))
    }

    async fn recv<S: ClientStream>(
        &self,
        stream: &mut S,
    ) -> Result<Option<DynamicMessage>, CallError> {
        let received = self.deadline.guard(stream.recv_msg()).await?;
        received.map_err(|source| self.stream_error(source))
    }

    async fn recv_all<S: ClientStream>(&mut self, stream: &mut S) -> Result<(), CallError> {
        while let Some(response) = self.recv(stream).await? {
            self.output.emit(&response)?;
        }
        Ok(())
    }

    async fn finish<S: ClientStream>(&self, stream: &mut S) -> Result<(), CallError> {
        let header = self.deadline.guard(stream.header()).await?;
        let header = header.map_err(|source| self.stream_error(source))?;
        debug!(
            method = self.method.full_name(),
            ?header,
            trailer = ?stream.trailer(),
            "call finished"
        );
        Ok(())
    }

    fn stream_error(&self, source: TransportError) -> CallError {
        CallError::Stream {
            method: self.method.full_name().to_string(),
            source,
        }
    }
}

/// Writes formatted responses in arrival order.
struct Output<'a, F, W> {
    formatter: &'a F,
    out: &'a mut W,
}

impl<F: MessageFormatter, W: Write> Output<'_, F, W> {
    fn emit(&mut self, message: &DynamicMessage) -> Result<(), CallError> {
        let text = self
            .formatter
            .format(message)
            .map_err(CallError::Response)?;
        writeln!(self.out, "{text}").map_err(CallError::Output)?;
        self.out.flush().map_err(CallError::Output)
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline(Option<(Instant, Duration)>);

impl Deadline {
    fn new(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|timeout| (Instant::now() + timeout, timeout)))
    }

    /// Runs `operation`, giving up once the deadline has passed.
    async fn guard<O: Future>(&self, operation: O) -> Result<O::Output, CallError> {
        match self.0 {
            None => Ok(operation.await),
            Some((at, timeout)) => tokio::time::timeout_at(at, operation)
                .await
                .map_err(|_| CallError::DeadlineExceeded(timeout)),
        }
    }
}
