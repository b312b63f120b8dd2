use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use score_learning::{
    build_telemetry, PipelineConfig, PipelineError, TrainingPipeline, TrainingSummary,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "trn", version, about = "Runs ingestion, transformation, and model selection")]
struct Cli {
    /// Pipeline TOML; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Appends one JSON line per run to this file.
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Prints every model's scores, not just the winner's.
    #[arg(long)]
    report: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunRecord {
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    config: Option<PathBuf>,
    status: String,
    best_model: Option<String>,
    test_r2: Option<f64>,
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let telemetry = build_telemetry(&config, true)?;
    let run_id = format!("run-{}", Uuid::new_v4());
    let started_at = Utc::now();
    telemetry.note(
        LogLevel::Info,
        "trn.start",
        json!({ "run_id": run_id, "config": cli.config }),
    );

    let outcome = TrainingPipeline::new(config, telemetry).run();
    if let Some(manifest) = &cli.manifest {
        let record = RunRecord {
            run_id,
            started_at,
            finished_at: Utc::now(),
            config: cli.config.clone(),
            status: if outcome.is_ok() { "completed" } else { "failed" }.into(),
            best_model: outcome.as_ref().ok().map(|s| s.best_model.clone()),
            test_r2: outcome.as_ref().ok().map(|s| s.test_r2),
            error: outcome.as_ref().err().map(PipelineError::report),
        };
        append_manifest(manifest, &record)?;
    }

    let summary = outcome.context("training pipeline failed")?;
    if cli.report {
        print_report(&summary);
    }
    println!("{}", summary.test_r2);
    Ok(())
}

fn print_report(summary: &TrainingSummary) {
    for (name, score) in &summary.report {
        println!(
            "{name}: test_r2={:.4} train_r2={:.4} cv={:.4} params={}",
            score.test_r2, score.train_r2, score.cv_score, score.best_params
        );
    }
    println!("best: {} -> {}", summary.best_model, summary.model_path.display());
}

fn append_manifest(path: &Path, record: &RunRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, record)?;
    file.write_all(b"\n")?;
    Ok(())
}
