//! # Session
//!
//! Ties a [`SchemaSource`] to the default package and service a user configured, so callers
//! can speak in partial method names. A [`Session`] is what the command line drives: it
//! resolves names, produces request templates, answers completion queries and hands resolved
//! methods to a [`CallEngine`].
use crate::BoxError;
use crate::call::{CallEngine, CallError};
use crate::format::{FormatError, MessageFormatter, MessageParser};
use crate::fqn::{self, Defaults};
use crate::grpc::transport::Transport;
use crate::method::DynamicMethod;
use crate::schema::{SchemaError, SchemaSource};
use http_body::Body as HttpBody;
use std::io::Write;
use tonic::client::GrpcService;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no method given")]
    MissingMethod,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// A schema source plus the defaults partial method names are resolved against.
#[derive(Debug)]
pub struct Session<S = Channel> {
    schema: SchemaSource<S>,
    package: String,
    service: String,
}

impl<S> Session<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(schema: SchemaSource<S>) -> Self {
        Self {
            schema,
            package: String::new(),
            service: String::new(),
        }
    }

    /// Sets the package and service used to complete partial method names.
    pub fn with_defaults(mut self, package: impl Into<String>, service: impl Into<String>) -> Self {
        self.package = package.into();
        self.service = service.into();
        self
    }

    pub fn schema(&mut self) -> &mut SchemaSource<S> {
        &mut self.schema
    }

    /// Expands `raw` with the session defaults and looks the method up.
    pub async fn resolve_method(&mut self, raw: &str) -> Result<DynamicMethod, ClientError> {
        let name = fqn::resolve(raw, &self.package, &self.service);
        if name.is_empty() {
            return Err(ClientError::MissingMethod);
        }

        tracing::debug!(raw, resolved = %name, "resolving method");
        Ok(self.schema.find_method(&name).await?)
    }

    /// Resolves `raw` and runs the call on `engine`.
    pub async fn call<T, P, F, W>(
        &mut self,
        engine: &mut CallEngine<T>,
        raw: &str,
        parser: &mut P,
        formatter: &F,
        out: &mut W,
    ) -> Result<(), ClientError>
    where
        T: Transport,
        P: MessageParser,
        F: MessageFormatter,
        W: Write,
    {
        let method = self.resolve_method(raw).await?;
        engine.call(&method, parser, formatter, out).await?;
        Ok(())
    }

    /// Renders a zero-valued request of the method, to be filled in by the user.
    ///
    /// Use a formatter that emits default values, or the template is just `{}`.
    pub async fn request_template<F: MessageFormatter>(
        &mut self,
        raw: &str,
        formatter: &F,
    ) -> Result<String, ClientError> {
        let method = self.resolve_method(raw).await?;
        Ok(formatter.format(&method.request_message())?)
    }

    /// Method names matching `prefix`, shortened by the session defaults.
    pub async fn complete_methods(&mut self, prefix: &str) -> Result<Vec<String>, ClientError> {
        let symbols = self.schema.list_methods().await?;
        let defaults = Defaults {
            package: &self.package,
            service: &self.service,
        };
        Ok(fqn::filter_symbols(&symbols, prefix, defaults))
    }

    pub async fn complete_packages(&mut self, prefix: &str) -> Result<Vec<String>, ClientError> {
        let symbols = self.schema.list_methods().await?;
        Ok(fqn::filter_packages(&symbols, prefix))
    }

    pub async fn complete_services(&mut self, prefix: &str) -> Result<Vec<String>, ClientError> {
        let symbols = self.schema.list_methods().await?;
        Ok(fqn::filter_services(&symbols, prefix, &self.package))
    }
}
