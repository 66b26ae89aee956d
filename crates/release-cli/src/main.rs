//! release-orchestrator CLI — config loading, logging init, wiring of
//! the Release Engine's collaborators, and the `serve`/`table`
//! subcommands.
//!
//! Shape ported from `orchestrate-cli/src/main.rs`: the same
//! `Cli`/`Commands` clap-derive layout, the same `init_logging`
//! verbosity ladder (`-v`/`-vv`/`-vvv`, `--log-json`), and the same
//! `axum::serve(TcpListener::bind(...), app)` launch the teacher's
//! `Commands::Web` arm uses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use release_ci::{CiTriggerClient, CiTriggerConfig};
use release_core::Database;
use release_rollback::{ProductionHost, RollbackExecutor, ServiceTopology};
use release_web::{
    create_intake_router, ApprovalPolicy, AppState, CiDispatchTarget, ReleaseEngine,
};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8, quiet: bool, json: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("release_orchestrator={level}").parse()?)
        .add_directive(format!("release_web={level}").parse()?)
        .add_directive(format!("release_core={level}").parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_file(verbose >= 3)
        .with_line_number(verbose >= 3);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "release-orchestrator")]
#[command(about = "Release state machine, approval quorum, and rollback orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file.
    #[arg(long, env = "RELEASE_ORCHESTRATOR_CONFIG", default_value = "release-orchestrator.toml")]
    config: PathBuf,

    /// Increase verbosity (-v: info, -vv: debug, -vvv: trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress non-error output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Event Intake HTTP server.
    Serve,
    /// Schema bootstrap for the `releases`/`release_audit_log` tables.
    Table {
        #[command(subcommand)]
        action: TableAction,
    },
}

#[derive(Subcommand)]
enum TableAction {
    /// Create the release tables if they don't already exist.
    Create,
    /// Drop the release tables.
    Drop,
}

/// Config file shape — spec.md's ambient-stack fields (SPEC_FULL.md §2):
/// db_path, http_port, intake_prefix, required_approvers, admins,
/// ci.{api_url,token,owner,repo,workflow_id}, production host
/// credentials, per-service port/prefix maps, and the Authorization
/// service base url.
#[derive(Debug, Deserialize)]
struct FileConfig {
    db_path: String,
    http_port: u16,
    #[serde(default = "default_prefix")]
    intake_prefix: String,
    #[serde(default)]
    shared_secret: Option<String>,
    required_approvers: Vec<String>,
    admins: Vec<String>,
    ci: CiConfig,
    production_host: String,
    #[serde(default = "default_ssh_port")]
    production_port: u16,
    production_user: String,
    production_password: String,
    #[serde(default)]
    service_port_map: HashMap<String, u16>,
    #[serde(default)]
    service_prefix_map: HashMap<String, String>,
    identity: IdentityConfig,
}

fn default_prefix() -> String {
    "/intake".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Deserialize)]
struct CiConfig {
    api_url: String,
    token: String,
    owner: String,
    repo: String,
    #[serde(default)]
    #[allow(dead_code)]
    workflow_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityConfig {
    #[serde(default)]
    #[allow(dead_code)]
    authorization_base_url: Option<String>,
}

fn load_config(path: &PathBuf) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_json)?;

    let config = load_config(&cli.config)?;
    let db = Database::new(&config.db_path).await?;

    let ci = CiTriggerClient::new(
        CiTriggerConfig {
            api_base_url: config.ci.api_url.clone(),
            owner: config.ci.owner.clone(),
        },
        SecretString::new(config.ci.token.clone()),
    )?;

    let rollback = RollbackExecutor::new(
        ProductionHost {
            host: config.production_host.clone(),
            port: config.production_port,
            username: config.production_user.clone(),
        },
        SecretString::new(config.production_password.clone()),
        format!("http://127.0.0.1:{}{}", config.http_port, config.intake_prefix),
    );

    let topology = config
        .service_port_map
        .iter()
        .map(|(service, port)| {
            let prefix = config
                .service_prefix_map
                .get(service)
                .cloned()
                .unwrap_or_default();
            (
                service.clone(),
                ServiceTopology {
                    port: *port,
                    health_path_prefix: prefix,
                },
            )
        })
        .collect();

    let policy = ApprovalPolicy::new(
        config.required_approvers.iter().cloned().collect(),
        config.admins.iter().cloned().collect(),
    );

    let engine = Arc::new(ReleaseEngine::new(
        db,
        ci,
        CiDispatchTarget { repo: config.ci.repo.clone() },
        rollback,
        topology,
        policy,
    ));

    match cli.command {
        Commands::Serve => {
            let state = Arc::new(AppState::new(engine, config.shared_secret.clone()));
            let app = create_intake_router(&config.intake_prefix, state);
            let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
            info!(%addr, prefix = %config.intake_prefix, "starting event intake server");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Table { action } => match action {
            TableAction::Create => {
                engine.database().create_table().await?;
                println!("release tables created");
            }
            TableAction::Drop => {
                engine.database().drop_table().await?;
                println!("release tables dropped");
            }
        },
    }

    Ok(())
}
