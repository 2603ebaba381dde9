//! Atelier CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments**: global connection options plus one command.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty
//!    layer on stderr and an optional OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: load `atelier.toml`, open the runtime
//!    state file, and build the [`ClientEnvironment`] with terminal sinks.
//! 4. **Run the command** against the selected connection.

mod commands;
mod observability;
mod sinks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use atelier_client::{ClientEnvironment, ClientOptions};
use atelier_core::{ConnectionContext, ServerName};
use atelier_workspace::{FileStateStore, WorkspaceConfig, CONFIG_FILE, DEFAULT_STATE_PATH};

use commands::Command;
use observability::LogFormat;
use sinks::{LogStatus, StdoutConsole};

#[derive(Debug, Parser)]
#[command(name = "atelier", version)]
#[command(about = "Work with documents on an Atelier REST server")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "ATELIER_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Runtime state file (learned addresses, session cookies).
    #[arg(long, env = "ATELIER_STATE", default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    /// Connection block to use.
    #[arg(long, env = "ATELIER_CONNECTION", default_value = "default")]
    connection: String,

    /// Address an external server definition directly instead of a
    /// connection block.
    #[arg(long, conflicts_with = "connection")]
    server: Option<String>,

    /// Namespace, overriding the configured one.
    #[arg(long, short)]
    namespace: Option<String>,

    /// Password for the connection. Remembered in the runtime state, so
    /// later runs can omit it.
    #[arg(long, env = "ATELIER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// OTLP collector endpoint; spans are exported when set.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn context(&self) -> anyhow::Result<ConnectionContext> {
        match &self.server {
            Some(server) => Ok(ConnectionContext::Server {
                server: ServerName::new(server.as_str()).context("server name is empty")?,
                namespace: self.namespace.clone(),
            }),
            None => Ok(ConnectionContext::Workspace(self.connection.clone())),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = observability::init(cli.log_format, cli.otlp_endpoint.as_deref())?;
    let outcome = run(cli).await;
    telemetry.shutdown();
    outcome
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = WorkspaceConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let state = FileStateStore::open(&cli.state)
        .with_context(|| format!("opening {}", cli.state.display()))?;
    debug!(state = %state.path().display(), "Runtime state opened");

    let options = ClientOptions {
        strict_ssl: config.transport.strict_ssl,
        max_connections: config.transport.max_connections,
        ..ClientOptions::default()
    };
    let env = ClientEnvironment::builder(Arc::new(config), Arc::new(state))
        .console_sink(Arc::new(StdoutConsole))
        .status_sink(Arc::new(LogStatus))
        .options(options)
        .build()?;

    let context = cli.context()?;
    if let Some(password) = &cli.password {
        env.settings()
            .remember_password(&context, password)
            .context("storing password")?;
    }
    if matches!(cli.command, Command::Logout) {
        env.logout(&context);
        return Ok(());
    }
    let client = env.client(context, cli.namespace.as_deref());
    commands::run(&client, cli.command).await
}
