//! Schema source backed by a server's reflection service.
use super::{SchemaError, SchemaNode, lookup_symbol, method_names};
use crate::BoxError;
use crate::reflection::client::ReflectionClient;
use http_body::Body as HttpBody;
use prost_reflect::DescriptorPool;
use tonic::client::GrpcService;
use tonic::transport::Channel;

/// Resolves symbols by asking the server. Nothing is cached: every query is a new round trip.
#[derive(Debug, Clone)]
pub struct ReflectionSource<S = Channel> {
    client: ReflectionClient<S>,
}

impl<S> ReflectionSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        Self {
            client: ReflectionClient::new(service),
        }
    }

    pub async fn list_services(&mut self) -> Result<Vec<String>, SchemaError> {
        Ok(self.client.list_services().await?)
    }

    /// Lists services, then fetches the file of each one to enumerate its methods.
    pub async fn list_methods(&mut self) -> Result<Vec<String>, SchemaError> {
        let mut methods = Vec::new();

        for service_name in self.list_services().await? {
            let pool = self
                .fetch_pool(&service_name)
                .await?
                .ok_or_else(|| SchemaError::SymbolNotFound(service_name.clone()))?;

            if let Some(service) = pool.get_service_by_name(&service_name) {
                methods.extend(method_names(&service));
            }
        }

        Ok(methods)
    }

    pub async fn find_symbol(&mut self, name: &str) -> Result<SchemaNode, SchemaError> {
        let not_found = || SchemaError::SymbolNotFound(name.to_string());

        let pool = match self.fetch_pool(name).await? {
            Some(pool) => pool,
            // Not every server indexes method names, their service is enough.
            None => match name.rsplit_once('.') {
                Some((parent, _)) => self.fetch_pool(parent).await?.ok_or_else(not_found)?,
                None => return Err(not_found()),
            },
        };

        lookup_symbol(&pool, name).ok_or_else(not_found)
    }

    /// Fetches the file defining `symbol` and its imports. `None` if the server doesn't know it.
    async fn fetch_pool(&mut self, symbol: &str) -> Result<Option<DescriptorPool>, SchemaError> {
        match self.client.file_descriptor_set_by_symbol(symbol).await {
            Ok(fd_set) => Ok(Some(DescriptorPool::from_file_descriptor_set(fd_set)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
