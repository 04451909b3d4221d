//! # Configuration Loading
//!
//! Builds the effective [`Config`] from, lowest to highest precedence:
//!
//! 1. built-in defaults,
//! 2. `~/.dynrpc.yaml`,
//! 3. `./.dynrpc.yaml`,
//! 4. the file given with `--config`,
//! 5. `DYNRPC_*` environment variables,
//! 6. command-line flags.
//!
//! Also reads the TLS files a configuration points at.
use crate::cli::GlobalArgs;
use anyhow::{Context, bail};
use directories::BaseDirs;
use dynrpc_core::config::Config;
use dynrpc_core::connect::{ClientIdentity, TlsCredentials};
use dynrpc_core::fs::expand_home;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = ".dynrpc.yaml";
const ENV_PREFIX: &str = "DYNRPC_";

/// The flags that were actually given. Anything left out must not shadow a lower layer.
#[derive(Debug, Default, Serialize)]
struct Overrides<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reflection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cacert: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cert: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    import_paths: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proto_files: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<&'a str, Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emit_defaults: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multiline: Option<bool>,
}

impl<'a> From<&'a GlobalArgs> for Overrides<'a> {
    fn from(args: &'a GlobalArgs) -> Self {
        let non_empty = |values: &'a [String]| (!values.is_empty()).then_some(values);

        // Repeating a header keeps every value.
        let mut metadata: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (key, value) in &args.headers {
            metadata.entry(key.as_str()).or_default().push(value.as_str());
        }

        Self {
            address: args.address.as_deref(),
            web: args.web.then_some(true),
            tls: args.tls.then_some(true),
            reflection: args.reflection.then_some(true),
            cacert: args.cacert.as_deref(),
            cert: args.cert.as_deref(),
            key: args.key.as_deref(),
            import_paths: non_empty(&args.import_paths),
            proto_files: non_empty(&args.proto_files),
            package: args.package.as_deref(),
            service: args.service.as_deref(),
            metadata,
            timeout: args.timeout,
            emit_defaults: args.emit_defaults.then_some(true),
            multiline: args.multiline.then_some(true),
        }
    }
}

/// Loads the configuration from the standard locations.
pub fn load(args: &GlobalArgs) -> anyhow::Result<Config> {
    let home = BaseDirs::new().map(|dirs| dirs.home_dir().join(FILE_NAME));
    load_from(args, home.as_deref(), Path::new(FILE_NAME))
}

fn load_from(
    args: &GlobalArgs,
    home_file: Option<&Path>,
    local_file: &Path,
) -> anyhow::Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(home_file) = home_file {
        figment = figment.merge(Yaml::file(home_file));
    }
    figment = figment.merge(Yaml::file(local_file));

    if let Some(path) = &args.config {
        if !path.is_file() {
            bail!("config file '{}' does not exist", path.display());
        }
        figment = figment.merge(Yaml::file(path));
    }

    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(Overrides::from(args)))
        .extract()
        .context("invalid configuration")?;

    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Reads the certificates a TLS configuration refers to. `None` when TLS is disabled.
pub fn tls_credentials(config: &Config) -> anyhow::Result<Option<TlsCredentials>> {
    if !config.tls {
        return Ok(None);
    }

    let ca_certificate = config.cacert.as_deref().map(read_pem).transpose()?;

    let identity = match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => Some(ClientIdentity {
            certificate: read_pem(cert)?,
            key: read_pem(key)?,
        }),
        _ => None,
    };

    Ok(Some(TlsCredentials {
        ca_certificate,
        identity,
    }))
}

fn read_pem(path: &str) -> anyhow::Result<Vec<u8>> {
    let path: PathBuf = expand_home(path)?;
    std::fs::read(&path).with_context(|| format!("failed to read '{}'", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use dynrpc_core::config::MetadataValues;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join(FILE_NAME);

        let config = load_from(&GlobalArgs::default(), None, &missing).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_layers_override_each_other() {
        let dir = TempDir::new().unwrap();
        let home = write(
            &dir,
            "home.yaml",
            "address: home:1\npackage: home\nproto_files: [a.proto]\nmetadata:\n  x-home: h\n",
        );
        let local = write(&dir, "local.yaml", "address: local:2\nmultiline: true\n");
        let explicit = write(&dir, "explicit.yaml", "package: explicit\ntimeout: 5\n");

        let args = GlobalArgs {
            config: Some(explicit),
            service: Some("EchoService".into()),
            headers: vec![
                ("x-flag".into(), "f".into()),
                ("x-flag".into(), "g".into()),
            ],
            ..Default::default()
        };
        let config = load_from(&args, Some(&home), &local).unwrap();

        assert_eq!(config.address, "local:2");
        assert_eq!(config.package, "explicit");
        assert_eq!(config.service, "EchoService");
        assert_eq!(config.proto_files, vec!["a.proto"]);
        assert_eq!(config.timeout, Some(5));
        assert!(config.multiline);
        assert_eq!(
            config.metadata,
            BTreeMap::from([
                ("x-flag".to_string(), MetadataValues::from(["f", "g"])),
                ("x-home".to_string(), MetadataValues::from(["h"])),
            ])
        );
    }

    #[test]
    fn test_flags_win_over_files() {
        let dir = TempDir::new().unwrap();
        let local = write(&dir, "local.yaml", "address: file:1\nproto_files: [a.proto]\n");

        let args = GlobalArgs {
            address: Some("flag:2".into()),
            proto_files: vec!["b.proto".into()],
            reflection: true,
            ..Default::default()
        };
        let config = load_from(&args, None, &local).unwrap();

        assert_eq!(config.address, "flag:2");
        assert_eq!(config.proto_files, vec!["b.proto"]);
        assert!(config.reflection);
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let dir = TempDir::new().unwrap();
        let args = GlobalArgs {
            config: Some(dir.path().join("nope.yaml")),
            ..Default::default()
        };

        assert!(load_from(&args, None, &dir.path().join(FILE_NAME)).is_err());
    }

    #[test]
    fn test_tls_credentials() {
        let dir = TempDir::new().unwrap();
        let ca = write(&dir, "ca.pem", "ca");
        let cert = write(&dir, "cert.pem", "cert");
        let key = write(&dir, "key.pem", "key");

        let config = Config {
            tls: false,
            cacert: Some(ca.display().to_string()),
            ..Default::default()
        };
        assert!(tls_credentials(&config).unwrap().is_none());

        let config = Config {
            tls: true,
            cacert: Some(ca.display().to_string()),
            cert: Some(cert.display().to_string()),
            key: Some(key.display().to_string()),
            ..Default::default()
        };
        let credentials = tls_credentials(&config).unwrap().unwrap();
        assert_eq!(credentials.ca_certificate.as_deref(), Some(b"ca".as_slice()));
        let identity = credentials.identity.unwrap();
        assert_eq!(identity.certificate, b"cert");
        assert_eq!(identity.key, b"key");

        let config = Config {
            tls: true,
            cacert: Some(dir.path().join("missing.pem").display().to_string()),
            ..Default::default()
        };
        assert!(tls_credentials(&config).is_err());
    }
}
