//! # dynrpc CLI Entry Point
//!
//! The main executable. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`], installs the log
//!    subscriber and merges the configuration layers.
//! 2. **Validation**: Checks the configuration before anything touches the network.
//! 3. **Connection**: Connects over gRPC or gRPC-web when the command needs a server.
//! 4. **Execution**: Runs the command through a `dynrpc_core` [`Session`], racing it
//!    against Ctrl-C.
//! 5. **Presentation**: Prints results to standard output and failures to standard error.

mod cli;
mod config;
mod formatter;
mod input;

use clap::Parser;
use cli::{Cli, Commands, CompleteCommands, ListCommands};
use dynrpc_core::call::CallEngine;
use dynrpc_core::client::Session;
use dynrpc_core::config::Config;
use dynrpc_core::connect::{self, Connection};
use dynrpc_core::format::{BackgroundJsonParser, JsonMessageFormatter};
use dynrpc_core::grpc::{GrpcTransport, GrpcWebTransport, Transport};
use dynrpc_core::schema::SchemaSource;
use dynrpc_core::tonic::metadata::MetadataMap;
use formatter::{FormattedString, SymbolList};
use input::DataSource;
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DYNRPC_LOG";

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(args.global.verbose);

    let config = match config::load(&args.global) {
        Ok(config) => config,
        Err(err) => exit_with(err),
    };

    tokio::select! {
        result = run(args.command, config) => {
            if let Err(err) = result {
                exit_with(err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            process::exit(130);
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn exit_with(err: anyhow::Error) -> ! {
    eprintln!("{}", FormattedString::from(err));
    process::exit(1);
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Call { method, data } => {
            call(&config, &method, DataSource::parse(data.as_deref())).await
        }
        Commands::Request { method } => {
            let mut session = open_session(&config).await?;
            let formatter = JsonMessageFormatter::new()
                .emit_defaults(true)
                .multiline(config.multiline);
            println!("{}", session.request_template(&method, &formatter).await?);
            Ok(())
        }
        Commands::List { sub } => {
            let mut session = open_session(&config).await?;
            let list = match sub {
                ListCommands::Services => {
                    SymbolList("services", session.schema().list_services().await?)
                }
                ListCommands::Methods => {
                    SymbolList("methods", session.schema().list_methods().await?)
                }
            };
            println!("{}", FormattedString::from(list));
            Ok(())
        }
        Commands::Describe { symbol } => {
            let mut session = open_session(&config).await?;
            let node = session.schema().find_symbol(&symbol).await?;
            println!("{}", FormattedString::from(node));
            Ok(())
        }
        Commands::Complete { sub } => {
            let mut session = open_session(&config).await?;
            let candidates = match sub {
                CompleteCommands::Methods { prefix } => session.complete_methods(&prefix).await?,
                CompleteCommands::Packages { prefix } => {
                    session.complete_packages(&prefix).await?
                }
                CompleteCommands::Services { prefix } => {
                    session.complete_services(&prefix).await?
                }
            };
            for candidate in candidates {
                println!("{candidate}");
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn call(config: &Config, method: &str, data: DataSource) -> anyhow::Result<()> {
    config.validate(true)?;
    let metadata = config.metadata_map()?;

    let connection = open_connection(config).await?;
    let mut session = session(config, Some(connection.clone()))?;

    if config.web {
        let engine = CallEngine::new(GrpcWebTransport::new(connection));
        execute(engine, &mut session, config, method, data, metadata).await
    } else {
        let engine = CallEngine::new(GrpcTransport::new(connection));
        execute(engine, &mut session, config, method, data, metadata).await
    }
}

async fn execute<T: Transport>(
    engine: CallEngine<T>,
    session: &mut Session<Connection>,
    config: &Config,
    method: &str,
    data: DataSource,
    metadata: MetadataMap,
) -> anyhow::Result<()> {
    let mut engine = engine
        .with_metadata(metadata)
        .with_timeout(config.call_timeout());
    // Stdin is read on its own thread so Ctrl-C and the timeout stay responsive.
    let mut parser = BackgroundJsonParser::spawn(data.open()?)?;
    let formatter = JsonMessageFormatter::new()
        .emit_defaults(config.emit_defaults)
        .multiline(config.multiline);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    session
        .call(&mut engine, method, &mut parser, &formatter, &mut out)
        .await?;
    Ok(())
}

/// Opens a session for commands that only need a schema. A server is only contacted when
/// the schema comes from reflection.
async fn open_session(config: &Config) -> anyhow::Result<Session<Connection>> {
    config.validate(false)?;

    let connection = if config.reflection {
        Some(open_connection(config).await?)
    } else {
        None
    };
    session(config, connection)
}

fn session(
    config: &Config,
    connection: Option<Connection>,
) -> anyhow::Result<Session<Connection>> {
    let schema = match connection {
        Some(connection) if config.reflection => SchemaSource::reflective(connection),
        _ => SchemaSource::compile(&config.import_paths, &config.proto_files)?,
    };

    Ok(Session::new(schema).with_defaults(&config.package, &config.service))
}

async fn open_connection(config: &Config) -> anyhow::Result<Connection> {
    let tls = config::tls_credentials(config)?;
    Ok(connect::connect(config, tls.as_ref()).await?)
}
