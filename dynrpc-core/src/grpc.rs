//! # Dynamic gRPC Transports
//!
//! Low-level building blocks for calling methods whose message types are only known at
//! runtime. Everything here exchanges [`prost_reflect::DynamicMessage`]s, encoded on the fly
//! by [`codec::DynamicCodec`].
//!
//! * [`transport`] defines the contract the call engine is written against.
//! * [`native`] implements it over gRPC (HTTP/2).
//! * [`web`] implements it over gRPC-web (HTTP/1.1).
pub mod codec;
pub mod native;
pub mod transport;
pub mod web;

pub use native::{GrpcStream, GrpcTransport};
pub use transport::{ClientStream, Transport, TransportError};
pub use web::{GrpcWebStream, GrpcWebTransport};
