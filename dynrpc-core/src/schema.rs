//! # Schema Sources
//!
//! A [`SchemaSource`] answers four questions about the services a call can target: which
//! services exist, which methods exist, what a fully qualified symbol refers to, and which
//! [`DynamicMethod`] a name designates.
//!
//! There are exactly two sources:
//!
//! 1. **[`StaticSource`]**: `.proto` files compiled once, in process, with `protox`.
//! 2. **[`ReflectionSource`]**: a live server queried through the gRPC reflection protocol,
//!    with no caching between queries.
//!
//! Both answer with the same semantics; they only differ in how they fail.
pub mod reflective;
pub mod static_source;

pub use reflective::ReflectionSource;
pub use static_source::StaticSource;

use crate::BoxError;
use crate::fs::HomeDirUnavailable;
use crate::method::DynamicMethod;
use crate::reflection::client::ReflectionResolveError;
use http_body::Body as HttpBody;
use prost_reflect::{
    DescriptorPool, EnumDescriptor, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use tonic::client::GrpcService;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Symbol '{0}' not found")]
    SymbolNotFound(String),
    #[error("Symbol '{0}' is not a method")]
    NotAMethod(String),
    #[error("Failed to compile proto files: '{0}'")]
    CompileFailed(#[source] protox::Error),
    #[error("The server does not support reflection: '{0}'")]
    ReflectionNotSupported(#[source] ReflectionResolveError),
    #[error("Reflection request failed: '{0}'")]
    Reflection(#[source] ReflectionResolveError),
    #[error("Failed to build descriptor pool: '{0}'")]
    InvalidDescriptor(#[from] prost_reflect::DescriptorError),
    #[error(transparent)]
    Path(#[from] HomeDirUnavailable),
}

impl From<ReflectionResolveError> for SchemaError {
    fn from(err: ReflectionResolveError) -> Self {
        if err.is_unimplemented() {
            SchemaError::ReflectionNotSupported(err)
        } else {
            SchemaError::Reflection(err)
        }
    }
}

/// What a fully qualified symbol resolved to.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Service(ServiceDescriptor),
    Method(MethodDescriptor),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl SchemaNode {
    /// Returns the name (e.g.,`MyMessage`) of the inner descriptor
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Service(v) => v.name(),
            SchemaNode::Method(v) => v.name(),
            SchemaNode::Message(v) => v.name(),
            SchemaNode::Enum(v) => v.name(),
        }
    }

    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            SchemaNode::Service(v) => v.full_name(),
            SchemaNode::Method(v) => v.full_name(),
            SchemaNode::Message(v) => v.full_name(),
            SchemaNode::Enum(v) => v.full_name(),
        }
    }

    pub fn package_name(&self) -> &str {
        match self {
            SchemaNode::Service(v) => v.package_name(),
            SchemaNode::Method(v) => v.parent_service().package_name(),
            SchemaNode::Message(v) => v.package_name(),
            SchemaNode::Enum(v) => v.package_name(),
        }
    }
}

/// Looks a symbol up among the services, methods, messages and enums of a pool.
pub(crate) fn lookup_symbol(pool: &DescriptorPool, name: &str) -> Option<SchemaNode> {
    if let Some(service) = pool.get_service_by_name(name) {
        return Some(SchemaNode::Service(service));
    }
    if let Some(message) = pool.get_message_by_name(name) {
        return Some(SchemaNode::Message(message));
    }
    if let Some(enum_desc) = pool.get_enum_by_name(name) {
        return Some(SchemaNode::Enum(enum_desc));
    }

    let (service, method) = name.rsplit_once('.')?;
    pool.get_service_by_name(service)?
        .methods()
        .find(|m| m.name() == method)
        .map(SchemaNode::Method)
}

/// Full names of the methods of a service, in declaration order.
pub(crate) fn method_names(service: &ServiceDescriptor) -> impl Iterator<Item = String> + '_ {
    service.methods().map(|m| m.full_name().to_string())
}

/// A schema provider: compiled proto files or a reflection session.
#[derive(Debug)]
pub enum SchemaSource<S = Channel> {
    Static(StaticSource),
    Reflective(ReflectionSource<S>),
}

impl<S> SchemaSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Compiles `proto_files` against `import_paths`.
    pub fn compile<P: AsRef<str>>(
        import_paths: &[P],
        proto_files: &[P],
    ) -> Result<Self, SchemaError> {
        StaticSource::compile(import_paths, proto_files).map(SchemaSource::Static)
    }

    /// Uses the reflection service reachable through `service`.
    pub fn reflective(service: S) -> Self {
        SchemaSource::Reflective(ReflectionSource::new(service))
    }

    /// Full names of all known services.
    pub async fn list_services(&mut self) -> Result<Vec<String>, SchemaError> {
        match self {
            SchemaSource::Static(source) => Ok(source.list_services()),
            SchemaSource::Reflective(source) => source.list_services().await,
        }
    }

    /// Full names of all methods of all known services.
    pub async fn list_methods(&mut self) -> Result<Vec<String>, SchemaError> {
        match self {
            SchemaSource::Static(source) => Ok(source.list_methods()),
            SchemaSource::Reflective(source) => source.list_methods().await,
        }
    }

    pub async fn find_symbol(&mut self, name: &str) -> Result<SchemaNode, SchemaError> {
        match self {
            SchemaSource::Static(source) => source.find_symbol(name),
            SchemaSource::Reflective(source) => source.find_symbol(name).await,
        }
    }

    pub async fn find_method(&mut self, name: &str) -> Result<DynamicMethod, SchemaError> {
        match self.find_symbol(name).await? {
            SchemaNode::Method(method) => Ok(DynamicMethod::new(method)),
            _ => Err(SchemaError::NotAMethod(name.to_string())),
        }
    }
}
