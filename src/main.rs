use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod app;
mod shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    /// HTTP API only.
    Api,
    /// Queue consumer only.
    Worker,
    /// API and worker in one process.
    All,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "opsboard", about = "Job orchestration and queue control plane")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/opsboard.toml")]
    config: String,

    #[arg(long, value_enum, default_value_t = RunMode::All)]
    mode: RunMode,

    /// Log filter, e.g. "info" or "opsboard=debug,sqlx=warn".
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    match cli.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let config = opsboard_core::AppConfig::load(&cli.config)?;
    app::run(config, cli.mode.into()).await
}

impl From<RunMode> for app::Mode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::Api => app::Mode::Api,
            RunMode::Worker => app::Mode::Worker,
            RunMode::All => app::Mode::All,
        }
    }
}
