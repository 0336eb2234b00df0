pub mod config;
pub mod jobs;
pub mod query;
pub mod server;

use adb_client::{ArangoClient, Database};
use adb_domain::config::ClientConfig;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// arangoq: query and job tool for a multi-host database cluster.
#[derive(Debug, Parser)]
#[command(name = "arangoq", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to $ADB_CONFIG, then `adb.toml`).
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Coordinator URL; repeat for several hosts. Replaces `hosts` from the config.
    #[arg(long = "host", global = true)]
    pub hosts: Vec<String>,
    /// Database override.
    #[arg(long, short = 'd', global = true)]
    pub database: Option<String>,
    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the server is reachable and accepts the credentials.
    Ping,
    /// Print the server version.
    Version {
        /// Print the full details document.
        #[arg(long)]
        details: bool,
    },
    /// Run a query and print one JSON document per line.
    Query(QueryArgs),
    /// Submit a query as an async job and print the job id.
    Submit {
        #[command(flatten)]
        query: QueryArgs,
        /// Let the server discard the result (nothing to fetch later).
        #[arg(long)]
        no_result: bool,
    },
    /// Async job utilities.
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Query text.
    pub query: String,
    /// Bind parameter as `name=value`; the value is parsed as JSON when possible.
    #[arg(long = "bind", short = 'b', value_parser = parse_bind)]
    pub bind: Vec<(String, Value)>,
    #[arg(long)]
    pub batch_size: Option<u32>,
    /// Ask the server for the total result count.
    #[arg(long)]
    pub count: bool,
    /// Allow re-fetching a batch after a failed request.
    #[arg(long)]
    pub allow_retry: bool,
    /// Stream results instead of materializing them on the server.
    #[arg(long)]
    pub stream: bool,
}

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List job ids.
    List {
        /// List finished jobs instead of pending ones.
        #[arg(long)]
        done: bool,
        #[arg(long)]
        count: Option<u32>,
    },
    /// Show whether a job is pending or done.
    Status { id: String },
    /// Fetch a job's result. The server forgets it afterwards.
    Result {
        id: String,
        /// Poll until the job is done instead of failing while it is pending.
        #[arg(long)]
        wait: bool,
    },
    /// Cancel a pending job.
    Cancel { id: String },
    /// Delete stored results: one job, all of them, or those older than a timestamp.
    Clear {
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
        /// Unix timestamp in seconds.
        #[arg(long, conflicts_with_all = ["id", "all"])]
        expired: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML. Secrets are masked.
    Show,
}

/// `name=value` with a JSON value, falling back to a plain string.
pub fn parse_bind(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty bind parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((name.to_owned(), value))
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path (`--config`, then `ADB_CONFIG`, then `adb.toml`),
/// load it, and apply the command-line overrides.
pub fn load_config(opts: &GlobalOpts) -> anyhow::Result<(ClientConfig, String)> {
    let config_path = opts
        .config
        .clone()
        .or_else(|| std::env::var("ADB_CONFIG").ok())
        .unwrap_or_else(|| "adb.toml".into());

    let mut config = ClientConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("loading {config_path}: {e}"))?;
    if !opts.hosts.is_empty() {
        config.hosts = opts.hosts.clone();
    }
    if let Some(db) = &opts.database {
        config.database = db.clone();
    }
    Ok((config, config_path))
}

/// Connect and open the configured database.
pub async fn connect(config: ClientConfig) -> anyhow::Result<Database> {
    let client = ArangoClient::new(config).await?;
    Ok(client.default_db()?)
}
