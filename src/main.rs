//! benchcmd - send text commands to bench instruments over raw TCP.
//!
//! Loads a command catalog, lets the operator fire any command at a
//! configurable host/port from a terminal UI, and keeps a colored,
//! timestamped transcript of what was sent and what came back.

mod catalog;
mod config;
mod dispatch;
mod shell;
mod transcript;
mod transport;

use anyhow::{Context, Result};
use catalog::{Catalog, Entry};
use clap::{Parser, Subcommand};
use config::{Config, ConnectionConfig};
use dispatch::{ControlId, DispatchError, Dispatcher, SendRequest};
use std::path::PathBuf;
use std::process::Command as ProcessCommand;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use transcript::Transcript;
use transport::{SendResult, TcpTransport, Transport};

#[derive(Parser)]
#[command(name = "benchcmd")]
#[command(author, version, about = "Send text commands to bench instruments over raw TCP")]
#[command(long_about = "Loads a command catalog (COMMANDS.txt) and sends any command to an instrument over a raw TCP socket.\n\nRun without a subcommand to open the terminal UI.\n\n`send` exits 0 on success, 1 on a transport failure and 2 when the request is rejected before sending.")]
struct Cli {
    /// Instrument host name or IP address
    #[arg(long, global = true, value_name = "HOST")]
    host: Option<String>,

    /// Instrument TCP port
    #[arg(short = 'p', long, global = true, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Don't append a newline to commands
    #[arg(long, global = true)]
    no_newline: bool,

    /// Command catalog file
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    commands: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one command and print the response
    Send {
        /// Command text, e.g. "*IDN?"
        command: String,
    },
    /// List catalog sections and their commands
    Sections,
    /// Open configuration file in $EDITOR
    Config,
}

impl Cli {
    /// Connection settings from config, overridden by flags.
    fn connection(&self, config: &Config) -> ConnectionConfig {
        let mut connection = config.connection.clone();
        if let Some(host) = &self.host {
            connection.host = host.clone();
        }
        if let Some(port) = self.port {
            connection.port = port;
        }
        if self.no_newline {
            connection.auto_newline = false;
        }
        connection
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Send { command }) => handle_send(&cli, command).await,
        Some(Commands::Sections) => handle_sections(&cli),
        Some(Commands::Config) => handle_config(),
        None => handle_ui(&cli).await,
    }
}

/// `send` exit status when the transport reports a failure.
const EXIT_FAILURE: i32 = 1;
/// `send` exit status when the request is rejected before any I/O.
const EXIT_REJECTED: i32 = 2;

/// Default log filter, overridable with `RUST_LOG`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("benchcmd=info"))
}

/// Log to stderr.
fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Log to a file so the terminal UI owns the screen.
fn init_file_logging() -> Result<()> {
    let path = Config::log_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// Run the terminal UI.
async fn handle_ui(cli: &Cli) -> Result<()> {
    init_file_logging()?;

    let config = Config::load().context("Failed to load configuration")?;
    let connection = cli.connection(&config);
    let catalog_path = config.catalog_path(cli.commands.as_deref());
    let catalog = Catalog::load(&catalog_path);

    info!(
        "Starting UI with catalog {} ({} sections), target {}:{}",
        catalog_path.display(),
        catalog.sections().len(),
        connection.host,
        connection.port
    );

    let transport = TcpTransport::new(connection.transport_options());
    let mut app = shell::App::new(&catalog, &connection, transport);
    shell::run(&mut app).await
}

/// How a one-shot send ended.
#[derive(Debug, PartialEq, Eq)]
enum SendOutcome {
    Response(String),
    Failed,
    Rejected(DispatchError),
}

impl SendOutcome {
    /// Process exit status for `send`.
    fn exit_code(&self) -> i32 {
        match self {
            SendOutcome::Response(_) => 0,
            SendOutcome::Failed => EXIT_FAILURE,
            SendOutcome::Rejected(_) => EXIT_REJECTED,
        }
    }
}

/// Dispatch `request`, wait for it and record both ends in `log`.
async fn send_once<T: Transport>(
    dispatcher: &mut Dispatcher<T>,
    request: SendRequest,
    log: &mut Transcript,
) -> Result<SendOutcome> {
    let sent = match dispatcher.dispatch(request) {
        Ok(sent) => sent,
        Err(e) => return Ok(SendOutcome::Rejected(e)),
    };
    log.on_sent(&sent.payload);

    let completion = dispatcher
        .completion()
        .await
        .context("Send finished without a result")?;

    Ok(match completion.result {
        SendResult::Success(response) => {
            log.on_success(&response);
            SendOutcome::Response(response)
        }
        SendResult::Failure(reason) => {
            log.on_failure(&reason);
            SendOutcome::Failed
        }
    })
}

/// Send one command through the dispatcher and print the outcome.
///
/// Exits with [`EXIT_FAILURE`] when the transport fails and [`EXIT_REJECTED`]
/// when the dispatcher refuses the request.
async fn handle_send(cli: &Cli, command: &str) -> Result<()> {
    init_stderr_logging();

    let config = Config::load().context("Failed to load configuration")?;
    let connection = cli.connection(&config);
    let mut dispatcher = Dispatcher::new(TcpTransport::new(connection.transport_options()));

    let request = SendRequest {
        host: connection.host.clone(),
        port: connection.port,
        payload: command.to_string(),
        control: ControlId(0),
        auto_newline: connection.auto_newline,
    };

    let mut log = Transcript::new();
    let outcome = send_once(&mut dispatcher, request, &mut log).await?;

    // Transcript to stderr, bare response to stdout for scripting.
    for line in log.lines() {
        eprintln!("{}", line.plain());
    }

    match &outcome {
        SendOutcome::Response(response) => {
            print!("{}", response);
            if !response.is_empty() && !response.ends_with('\n') {
                println!();
            }
            Ok(())
        }
        SendOutcome::Rejected(e) => {
            eprintln!("Warning: {}", e);
            std::process::exit(outcome.exit_code());
        }
        SendOutcome::Failed => std::process::exit(outcome.exit_code()),
    }
}

/// Handle the sections subcommand.
fn handle_sections(cli: &Cli) -> Result<()> {
    let config = Config::load()?;
    let path = config.catalog_path(cli.commands.as_deref());
    let catalog = Catalog::load(&path);

    println!("Command Catalog ({})", path.display());
    println!("================\n");

    for section in catalog.sections() {
        let count = section
            .entries
            .iter()
            .filter(|e| matches!(e, Entry::Command(_)))
            .count();
        println!("  {} ({} commands)", section.name, count);
        for entry in &section.entries {
            match entry {
                Entry::Command(text) => println!("    {}", text),
                Entry::Spacer => println!(),
            }
        }
        println!();
    }

    Ok(())
}

/// Handle the config command.
fn handle_config() -> Result<()> {
    let config_path = Config::config_path()?;

    // Create default config if it doesn't exist
    if !config_path.exists() {
        Config::default().save()?;
        println!("Created default config at {}", config_path.display());
    }

    // Open in editor
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}
