use clap::Parser;
use tracing_subscriber::EnvFilter;

use adb_cli::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.global.json_logs);

    let (config, config_path) = cli::load_config(&cli.global)?;

    match cli.command {
        Command::Config(ConfigCommand::Validate) => {
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => cli::config::show(&config),
        Command::Ping => {
            let db = cli::connect(config).await?;
            cli::server::ping(&db).await
        }
        Command::Version { details } => {
            let db = cli::connect(config).await?;
            cli::server::version(&db, details).await
        }
        Command::Query(args) => {
            let db = cli::connect(config).await?;
            cli::query::run(&db, &args).await
        }
        Command::Submit { query, no_result } => {
            let db = cli::connect(config).await?;
            cli::query::submit(&db, &query, !no_result).await
        }
        Command::Jobs(command) => {
            let db = cli::connect(config).await?;
            cli::jobs::run(&db, command).await
        }
    }
}

/// Initialize stderr-only tracing for one-shot commands.
///
/// Defaults to `warn` level so diagnostic output does not pollute stdout.
fn init_cli_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
