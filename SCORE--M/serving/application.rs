use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use score_learning::PipelineTelemetry;
use score_serving::{router, AppState, ServingConfig};
use serde_json::json;
use shared_logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "application", version, about = "Student math-score prediction server")]
struct Cli {
    /// TOML file with `[artifacts]` and `[serving]` tables.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overriding the configured one.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServingConfig::load(path)?,
        None => ServingConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let telemetry = PipelineTelemetry::builder("serving")
        .log_path_opt(config.log_path.clone())
        .echo_to_stderr(true)
        .min_level(LogLevel::Info)
        .build()?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    telemetry.note(
        LogLevel::Info,
        "serving.start",
        json!({
            "bind": config.bind.to_string(),
            "artifacts": config.artifacts.root,
            "swap_score_fields": config.swap_score_fields,
        }),
    );
    axum::serve(listener, router(AppState::new(config, telemetry)))
        .await
        .context("serving requests")?;
    Ok(())
}
