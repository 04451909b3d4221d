//! # Connections
//!
//! Opens the connection a schema source and a transport share. Both wire protocols end up
//! behind the same boxed service type, [`Connection`]:
//!
//! * **gRPC**: a `tonic` [`Channel`], optionally over TLS.
//! * **gRPC-web**: a `hyper` HTTP/1.1 client behind `tonic_web::GrpcWebClientLayer`, with TLS
//!   provided by `rustls`.
//!
//! Certificates arrive as PEM bytes in [`TlsCredentials`]; reading them from disk is the
//! caller's business.
use crate::BoxError;
use crate::config::Config;
use http::Uri;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tonic::body::Body;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic_web::{GrpcWebCall, GrpcWebClientLayer};
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};

/// A connection usable by [`crate::grpc::GrpcTransport`], [`crate::grpc::GrpcWebTransport`]
/// and [`crate::schema::SchemaSource`].
pub type Connection = BoxCloneService<http::Request<Body>, http::Response<Body>, BoxError>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] BoxError),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
    #[error("Invalid TLS configuration: {0}")]
    Tls(#[source] BoxError),
}

/// Certificates for an encrypted connection.
#[derive(Debug, Clone, Default)]
pub struct TlsCredentials {
    /// CA certificates to trust, PEM encoded. The platform's roots are used when absent.
    pub ca_certificate: Option<Vec<u8>>,
    /// Client certificate and key for mutual TLS.
    pub identity: Option<ClientIdentity>,
}

#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

impl TlsCredentials {
    fn tonic_config(&self) -> ClientTlsConfig {
        let config = match &self.ca_certificate {
            Some(pem) => ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)),
            None => ClientTlsConfig::new().with_native_roots(),
        };

        match &self.identity {
            Some(identity) => {
                config.identity(Identity::from_pem(&identity.certificate, &identity.key))
            }
            None => config,
        }
    }

    fn rustls_config(&self) -> Result<ClientConfig, ConnectError> {
        let mut roots = RootCertStore::empty();
        match &self.ca_certificate {
            Some(pem) => {
                for cert in CertificateDer::pem_slice_iter(pem) {
                    let cert = cert.map_err(|e| ConnectError::Tls(e.into()))?;
                    roots.add(cert).map_err(|e| ConnectError::Tls(e.into()))?;
                }
            }
            None => {
                let native_certs = rustls_native_certs::load_native_certs();
                if !native_certs.errors.is_empty() {
                    tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
                }
                roots.add_parsable_certificates(native_certs.certs);
            }
        }

        let builder = crypto_config_builder()?.with_root_certificates(roots);

        match &self.identity {
            Some(identity) => {
                let chain = CertificateDer::pem_slice_iter(&identity.certificate)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ConnectError::Tls(e.into()))?;
                let key = PrivateKeyDer::from_pem_slice(&identity.key)
                    .map_err(|e| ConnectError::Tls(e.into()))?;
                builder
                    .with_client_auth_cert(chain, key)
                    .map_err(|e| ConnectError::Tls(e.into()))
            }
            None => Ok(builder.with_no_client_auth()),
        }
    }
}

fn crypto_config_builder()
-> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, ConnectError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectError::Tls(e.into()))
}

/// Prefixes a scheme to bare `host:port` addresses.
pub fn normalize_address(address: &str, tls: bool) -> String {
    if address.contains("://") {
        address.to_string()
    } else if tls {
        format!("https://{address}")
    } else {
        format!("http://{address}")
    }
}

/// Connects with the protocol selected by `config.web`.
///
/// `tls` must be given when the connection is to be encrypted.
pub async fn connect(
    config: &Config,
    tls: Option<&TlsCredentials>,
) -> Result<Connection, ConnectError> {
    if config.web {
        connect_web(&config.address, tls)
    } else {
        let channel = connect_native(&config.address, tls).await?;
        Ok(BoxCloneService::new(channel.map_err(BoxError::from)))
    }
}

/// Opens an HTTP/2 gRPC channel.
pub async fn connect_native(
    address: &str,
    tls: Option<&TlsCredentials>,
) -> Result<Channel, ConnectError> {
    let url = normalize_address(address, tls.is_some());

    let mut endpoint =
        Endpoint::new(url.clone()).map_err(|e| ConnectError::InvalidUrl(url.clone(), e.into()))?;

    if let Some(tls) = tls {
        endpoint = endpoint
            .tls_config(tls.tonic_config())
            .map_err(|e| ConnectError::Tls(e.into()))?;
    }

    tracing::debug!(%url, "connecting");
    endpoint
        .connect()
        .await
        .map_err(|e| ConnectError::ConnectionFailed(url, e))
}

/// Builds a gRPC-web client. Connections are opened lazily, on the first request.
pub fn connect_web(
    address: &str,
    tls: Option<&TlsCredentials>,
) -> Result<Connection, ConnectError> {
    let url = normalize_address(address, tls.is_some());
    let origin: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| ConnectError::InvalidUrl(url.clone(), e.into()))?;

    let tls_config = match tls {
        Some(tls) => tls.rustls_config()?,
        // Only used if the address itself asks for https.
        None => crypto_config_builder()?
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth(),
    };

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .build();
    let client: Client<_, GrpcWebCall<Body>> =
        Client::builder(TokioExecutor::new()).build(connector);

    let service = ServiceBuilder::new()
        .filter(move |request: http::Request<Body>| with_origin(request, &origin))
        .map_response(|response: http::Response<_>| response.map(Body::new))
        .map_err(BoxError::from)
        .layer(GrpcWebClientLayer::new())
        .service(client);

    Ok(BoxCloneService::new(service))
}

/// `tonic` only fills in the path of a request URI, the HTTP client needs it absolute. A path
/// in the configured address is kept as a prefix.
fn with_origin(
    request: http::Request<Body>,
    origin: &Uri,
) -> Result<http::Request<Body>, http::Error> {
    let (mut parts, body) = request.into_parts();
    let path = parts.uri.path_and_query().map_or("/", |path| path.as_str());
    let prefix = origin.path().trim_end_matches('/');

    let mut uri = Uri::builder().path_and_query(format!("{prefix}{path}"));
    if let Some(scheme) = origin.scheme() {
        uri = uri.scheme(scheme.clone());
    }
    if let Some(authority) = origin.authority() {
        uri = uri.authority(authority.clone());
    }

    parts.uri = uri.build()?;
    Ok(http::Request::from_parts(parts, body))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("localhost:50051", false),
            "http://localhost:50051"
        );
        assert_eq!(
            normalize_address("localhost:50051", true),
            "https://localhost:50051"
        );
        assert_eq!(
            normalize_address("https://api.example.com", false),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_with_origin_makes_uri_absolute() {
        let origin: Uri = "http://localhost:8080".parse().unwrap();
        let request = http::Request::builder()
            .uri("/echo.EchoService/UnaryEcho")
            .body(Body::empty())
            .unwrap();

        let request = with_origin(request, &origin).unwrap();
        assert_eq!(
            request.uri().to_string(),
            "http://localhost:8080/echo.EchoService/UnaryEcho"
        );
    }

    #[test]
    fn test_with_origin_keeps_path_prefix() {
        for address in ["https://api.example.com/grpc", "https://api.example.com/grpc/"] {
            let origin: Uri = address.parse().unwrap();
            let request = http::Request::builder()
                .uri("/echo.EchoService/UnaryEcho")
                .body(Body::empty())
                .unwrap();

            let request = with_origin(request, &origin).unwrap();
            assert_eq!(
                request.uri().to_string(),
                "https://api.example.com/grpc/echo.EchoService/UnaryEcho"
            );
        }
    }

    #[test]
    fn test_rejects_garbage_pem() {
        let credentials = TlsCredentials {
            ca_certificate: None,
            identity: Some(ClientIdentity {
                certificate: b"not a certificate".to_vec(),
                key: b"not a key".to_vec(),
            }),
        };

        assert!(matches!(
            credentials.rustls_config(),
            Err(ConnectError::Tls(_))
        ));
    }
}
