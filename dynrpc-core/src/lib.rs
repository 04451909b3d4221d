//! # dynrpc core
//!
//! `dynrpc-core` calls any gRPC method at runtime, without code generated for its schema.
//! Request and response messages are [`prost_reflect::DynamicMessage`]s built from descriptors
//! that come either from `.proto` files compiled in process or from the server's reflection
//! service.
//!
//! ## Key Components
//!
//! * **[`client::Session`]:** Resolves partial method names against a default package and
//!   service, produces request templates and answers completion queries.
//! * **[`call::CallEngine`]:** Drives unary, client streaming, server streaming and
//!   bidirectional calls to completion, writing each response as it arrives.
//! * **[`schema::SchemaSource`]:** Lists services and methods and resolves symbols, backed by
//!   compiled proto files or by server reflection.
//! * **[`grpc::Transport`]:** The wire seam. [`grpc::GrpcTransport`] speaks gRPC over HTTP/2,
//!   [`grpc::GrpcWebTransport`] speaks gRPC-web over HTTP/1.1.
//!
//! ## Message encoding
//!
//! The engine only sees [`format::MessageParser`] and [`format::MessageFormatter`]; JSON
//! implementations using the canonical Protobuf JSON mapping are provided.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod call;
pub mod client;
pub mod config;
pub mod connect;
pub mod format;
pub mod fqn;
pub mod fs;
pub mod grpc;
pub mod method;
pub mod reflection;
pub mod schema;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
