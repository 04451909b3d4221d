//! # CLI
//!
//! This module defines the command-line interface of `dynrpc` using `clap`.
//!
//! Every connection and schema option is global, so it can be given before or after the
//! subcommand. Options left out fall back to the configuration files and environment.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dynrpc", version, about = "Call gRPC and gRPC-web methods without generated code")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file, merged over ~/.dynrpc.yaml and ./.dynrpc.yaml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server address (host:port or URL)
    #[arg(short, long, global = true)]
    pub address: Option<String>,

    /// Use gRPC-web instead of gRPC
    #[arg(long, global = true)]
    pub web: bool,

    /// Encrypt the connection with TLS
    #[arg(long, global = true)]
    pub tls: bool,

    /// Resolve schemas through server reflection
    #[arg(short, long, global = true)]
    pub reflection: bool,

    /// CA certificate file (PEM)
    #[arg(long, global = true)]
    pub cacert: Option<String>,

    /// Client certificate file (PEM)
    #[arg(long, global = true)]
    pub cert: Option<String>,

    /// Client private key file (PEM)
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Directory to search for imports (repeatable)
    #[arg(short = 'I', long = "import-path", global = true)]
    pub import_paths: Vec<String>,

    /// Proto file to load (repeatable)
    #[arg(short = 'p', long = "proto", global = true)]
    pub proto_files: Vec<String>,

    /// Default package for partial method names
    #[arg(long, global = true)]
    pub package: Option<String>,

    /// Default service for partial method names
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Metadata sent with the call, as 'key:value' (repeatable)
    #[arg(short = 'H', long = "header", global = true, value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Call timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Print fields holding default values
    #[arg(long, global = true)]
    pub emit_defaults: bool,

    /// Pretty-print responses
    #[arg(long, global = true)]
    pub multiline: bool,

    /// Log every step of the call to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Call a method
    ///
    /// Request messages are read as JSON, one document per message. Streaming methods accept
    /// any number of concatenated documents.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// dynrpc -a localhost:50051 -r call echo.EchoService.UnaryEcho -d '{"message": "hi"}'
    /// dynrpc -p echo.proto --package echo --service EchoService call UnaryEcho -d @request.json
    /// ```
    Call {
        /// Method name: package.Service.Method, Service.Method or Method
        method: String,

        /// Request data: '-' for stdin, '@path' for a file, or literal JSON. Defaults to stdin.
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Print a request template for a method, with every field set to its default value
    Request {
        /// Method name: package.Service.Method, Service.Method or Method
        method: String,
    },

    /// List services or methods
    List {
        #[command(subcommand)]
        sub: ListCommands,
    },

    /// Describe a service, method, message or enum
    Describe {
        /// Fully qualified symbol (e.g. my.package.Service)
        symbol: String,
    },

    /// Print completion candidates
    Complete {
        #[command(subcommand)]
        sub: CompleteCommands,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List all services
    Services,
    /// List all methods of all services
    Methods,
}

#[derive(Subcommand)]
pub enum CompleteCommands {
    /// Methods, shortened by the default package and service
    Methods {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Packages
    Packages {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Services, shortened by the default package
    Services {
        #[arg(default_value = "")]
        prefix: String,
    },
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}
