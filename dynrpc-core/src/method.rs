//! # Dynamic Methods
//!
//! A [`DynamicMethod`] is the runtime view of an RPC method resolved from a schema source.
//! It knows how to build empty request and response messages, how many messages flow in each
//! direction, and which HTTP/2 path addresses it on the wire.
use http::uri::PathAndQuery;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("Invalid fully qualified method name '{0}': expected at least 'Service.Method'")]
    InvalidFqn(String),
}

/// How many messages flow in each direction of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamShape {
    pub client_streaming: bool,
    pub server_streaming: bool,
}

/// The four RPC shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl StreamShape {
    pub fn kind(&self) -> StreamKind {
        match (self.client_streaming, self.server_streaming) {
            (false, false) => StreamKind::Unary,
            (true, false) => StreamKind::ClientStreaming,
            (false, true) => StreamKind::ServerStreaming,
            (true, true) => StreamKind::Bidirectional,
        }
    }
}

/// Everything a transport needs to route a call and decode its responses.
#[derive(Debug, Clone)]
pub struct CallTarget {
    pub path: PathAndQuery,
    pub shape: StreamShape,
    pub output: MessageDescriptor,
}

/// An RPC method whose message types are only known at runtime.
#[derive(Debug, Clone)]
pub struct DynamicMethod {
    descriptor: MethodDescriptor,
}

impl DynamicMethod {
    pub fn new(descriptor: MethodDescriptor) -> Self {
        Self { descriptor }
    }

    /// The fully qualified name, e.g. `echo.EchoService.UnaryEcho`.
    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// A zero-valued instance of the input message.
    pub fn request_message(&self) -> DynamicMessage {
        DynamicMessage::new(self.descriptor.input())
    }

    /// A zero-valued instance of the output message.
    pub fn response_message(&self) -> DynamicMessage {
        DynamicMessage::new(self.descriptor.output())
    }

    pub fn stream_shape(&self) -> StreamShape {
        StreamShape {
            client_streaming: self.descriptor.is_client_streaming(),
            server_streaming: self.descriptor.is_server_streaming(),
        }
    }

    /// The HTTP/2 path of the method, e.g. `/echo.EchoService/UnaryEcho`.
    pub fn wire_path(&self) -> Result<PathAndQuery, MethodError> {
        wire_path(self.full_name())
    }

    pub fn call_target(&self) -> Result<CallTarget, MethodError> {
        Ok(CallTarget {
            path: self.wire_path()?,
            shape: self.stream_shape(),
            output: self.descriptor.output(),
        })
    }
}

/// Builds `/package.Service/Method` from `package.Service.Method` by turning the last dot into
/// a slash.
pub fn wire_path(full_name: &str) -> Result<PathAndQuery, MethodError> {
    let invalid = || MethodError::InvalidFqn(full_name.to_string());

    let (service, method) = full_name.rsplit_once('.').ok_or_else(invalid)?;
    if service.is_empty() || method.is_empty() {
        return Err(invalid());
    }

    PathAndQuery::from_str(&format!("/{service}/{method}")).map_err(|_| invalid())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wire_path_replaces_last_dot() {
        assert_eq!(
            wire_path("echo.EchoService.UnaryEcho").unwrap().as_str(),
            "/echo.EchoService/UnaryEcho"
        );
        assert_eq!(
            wire_path("pkg.v1.Svc.Method").unwrap().as_str(),
            "/pkg.v1.Svc/Method"
        );
        assert_eq!(wire_path("Svc.Method").unwrap().as_str(), "/Svc/Method");
    }

    #[test]
    fn test_wire_path_rejects_short_names() {
        assert!(matches!(wire_path("Method"), Err(MethodError::InvalidFqn(n)) if n == "Method"));
        assert!(matches!(wire_path(""), Err(MethodError::InvalidFqn(_))));
        assert!(matches!(wire_path(".Method"), Err(MethodError::InvalidFqn(_))));
    }

    #[test]
    fn test_stream_kind() {
        let shape = |client_streaming, server_streaming| StreamShape {
            client_streaming,
            server_streaming,
        };

        assert_eq!(shape(false, false).kind(), StreamKind::Unary);
        assert_eq!(shape(true, false).kind(), StreamKind::ClientStreaming);
        assert_eq!(shape(false, true).kind(), StreamKind::ServerStreaming);
        assert_eq!(shape(true, true).kind(), StreamKind::Bidirectional);
    }
}
