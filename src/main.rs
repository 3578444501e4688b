use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use screenflow::batch::session::BatchSnapshot;
use screenflow::transport::HttpTransport;
use screenflow::ui::BatchUI;
use screenflow::{
    BatchClient, BatchRequest, ClientConfig, Diagnostics, ItemStatus, ResumeUpload, SubmitOptions,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screenflow")]
#[command(version, about = "Streaming resume screening against a job description")]
pub struct Cli {
    /// Base URL of the analysis server
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit resumes and stream per-file progress until the batch settles
    Analyze {
        /// Path to a text file holding the job description
        #[arg(short, long)]
        job_description: PathBuf,

        /// Resume files to analyze (at most 10)
        #[arg(required = true)]
        resumes: Vec<PathBuf>,

        /// Overall deadline for the batch, in seconds
        #[arg(long, default_value = "300")]
        timeout_secs: u64,

        /// Minimum acceptable score
        #[arg(long, default_value = "70.0")]
        min_score: f64,

        /// Tolerated number of missing skills
        #[arg(long, default_value = "3")]
        max_missing: u32,
    },
    /// Probe the server's health endpoint
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.server)?;

    match cli.command {
        Commands::Analyze {
            job_description,
            resumes,
            timeout_secs,
            min_score,
            max_missing,
        } => {
            analyze(
                config,
                job_description,
                resumes,
                timeout_secs,
                min_score,
                max_missing,
            )
            .await
        }
        Commands::Check => check(config).await,
    }
}

async fn analyze(
    config: ClientConfig,
    job_description: PathBuf,
    resumes: Vec<PathBuf>,
    timeout_secs: u64,
    min_score: f64,
    max_missing: u32,
) -> Result<()> {
    let description = tokio::fs::read_to_string(&job_description)
        .await
        .with_context(|| format!("reading job description {}", job_description.display()))?;

    let mut request = BatchRequest::new(description);
    request.minimum_score = min_score;
    request.max_missing_skills = max_missing;
    for path in &resumes {
        let upload = ResumeUpload::from_path(path)
            .await
            .with_context(|| format!("reading resume {}", path.display()))?;
        request.resumes.push(upload);
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let options = SubmitOptions::default()
        .with_timeout(Duration::from_secs(timeout_secs))
        .with_cancel(cancel);

    let client = BatchClient::new(config)?;
    let mut ui: Option<BatchUI> = None;
    let mut diagnostics = Diagnostics::default();
    let result = client
        .analyze_batch(&request, options, |snapshot: &BatchSnapshot| {
            diagnostics = snapshot.diagnostics;
            let ui = ui.get_or_insert_with(|| BatchUI::new(snapshot));
            ui.render(snapshot);
        })
        .await;

    if let Some(ui) = &ui {
        if diagnostics.malformed_frames > 0 || diagnostics.unknown_filenames > 0 {
            ui.print_line(format!(
                "{} skipped {} malformed frames, {} events for unknown files",
                style("warning:").yellow().bold(),
                diagnostics.malformed_frames,
                diagnostics.unknown_filenames
            ));
        }
        ui.finish();
    }

    let outcomes = result.context("batch analysis failed")?;

    println!();
    println!("{}", style("Results").bold().underlined());
    for outcome in &outcomes {
        match outcome.status {
            ItemStatus::Settled => {
                let report = outcome
                    .report
                    .as_ref()
                    .context("settled outcome is missing its report")?;
                let marker = if report.is_best_match {
                    format!(" {}", style("★ best match").yellow().bold())
                } else {
                    String::new()
                };
                println!(
                    "  {} {}  score {}{}",
                    style("✔").green(),
                    style(&outcome.filename).bold(),
                    style(format!("{:.1}", report.score)).cyan(),
                    marker
                );
                if !report.missing_skills.is_empty() {
                    println!(
                        "      missing: {}",
                        style(report.missing_skills.join(", ")).yellow()
                    );
                }
                if !report.remarks.is_empty() {
                    println!("      {}", style(&report.remarks).dim());
                }
            }
            _ => {
                println!(
                    "  {} {}  {}",
                    style("✘").red(),
                    style(&outcome.filename).bold(),
                    style(outcome.error.as_deref().unwrap_or("failed")).red()
                );
            }
        }
    }

    let failed = outcomes
        .iter()
        .filter(|o| o.status == ItemStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} resumes failed", outcomes.len());
    }
    Ok(())
}

async fn check(config: ClientConfig) -> Result<()> {
    let url = config.health_url();
    let transport = HttpTransport::new(config)?;
    transport
        .ping()
        .await
        .with_context(|| format!("server unreachable at {url}"))?;
    println!("{} server is up at {url}", style("✔").green());
    Ok(())
}
