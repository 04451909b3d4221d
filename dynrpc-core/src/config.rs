//! # Configuration
//!
//! The settings a call is made with. Loading and merging them from files, environment and
//! flags is left to the caller; this module only defines them and checks they are coherent
//! before anything touches the network.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tonic::metadata::{
    MetadataKey, MetadataMap, MetadataValue,
    errors::{InvalidMetadataKey, InvalidMetadataValue},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("address must not be empty")]
    MissingAddress,
    #[error("cert and key must be both set: 'key' is missing")]
    CertWithoutKey,
    #[error("cert and key must be both set: 'cert' is missing")]
    KeyWithoutCert,
    #[error("no schema source available: at least 1 proto file must be specified or reflection used")]
    NoSchemaSource,
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server address, `host:port` or a full URL.
    pub address: String,
    /// Speak gRPC-web instead of gRPC.
    pub web: bool,
    /// Encrypt the connection.
    pub tls: bool,
    /// Resolve schemas through server reflection.
    pub reflection: bool,
    /// PEM file with the CA certificate(s) to trust.
    pub cacert: Option<String>,
    /// PEM file with the client certificate.
    pub cert: Option<String>,
    /// PEM file with the client private key.
    pub key: Option<String>,
    pub import_paths: Vec<String>,
    pub proto_files: Vec<String>,
    /// Default package for partial method names.
    pub package: String,
    /// Default service for partial method names. May be fully qualified.
    pub service: String,
    /// Metadata attached to every call.
    pub metadata: BTreeMap<String, MetadataValues>,
    /// Call timeout in seconds.
    pub timeout: Option<u64>,
    /// Render fields holding default values.
    pub emit_defaults: bool,
    /// Pretty-print responses.
    pub multiline: bool,
}

/// The values sent under one metadata key, in order. A lone value may be written as a plain
/// string instead of a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct MetadataValues(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for MetadataValues {
    fn from(values: OneOrMany) -> Self {
        match values {
            OneOrMany::One(value) => Self(vec![value]),
            OneOrMany::Many(values) => Self(values),
        }
    }
}

impl<const N: usize> From<[&str; N]> for MetadataValues {
    fn from(values: [&str; N]) -> Self {
        Self(values.iter().map(|value| value.to_string()).collect())
    }
}

impl Config {
    /// Checks the configuration is usable. `needs_server` is set for operations that talk to a
    /// server even when schemas come from local files.
    pub fn validate(&self, needs_server: bool) -> Result<(), ConfigError> {
        if !self.reflection && self.proto_files.is_empty() {
            return Err(ConfigError::NoSchemaSource);
        }
        if (needs_server || self.reflection) && self.address.trim().is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        match (&self.cert, &self.key) {
            (Some(_), None) => Err(ConfigError::CertWithoutKey),
            (None, Some(_)) => Err(ConfigError::KeyWithoutCert),
            _ => Ok(()),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Builds the metadata sent with every call.
    pub fn metadata_map(&self) -> Result<MetadataMap, ConfigError> {
        let mut metadata = MetadataMap::new();

        for (k, values) in &self.metadata {
            let key = MetadataKey::from_str(k).map_err(|source| ConfigError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
            for v in &values.0 {
                let val = MetadataValue::from_str(v).map_err(|source| {
                    ConfigError::InvalidMetadataValue {
                        key: k.clone(),
                        source,
                    }
                })?;
                metadata.append(key.clone(), val);
            }
        }

        Ok(metadata)
    }
}
