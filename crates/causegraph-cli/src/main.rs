//! causegraph CLI - Command-line runner
//!
//! Usage:
//!   causegraph run <csv> --column <name> [--cluster] [--output <dir>]
//!   causegraph cluster <rows.json> [--nr-topics <n>] [--output <file>]
//!
//! Model endpoints come from the same environment variables and config file
//! as the API server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use causegraph_core::config::AppConfig;
use causegraph_core::{
    ClusterParams, JobRequest, JobStatus, NGramRange, Row, TopicCountPolicy,
};
use causegraph_extractor::EntityPreprocessor;
use causegraph_jobs::{CsvArtifactStore, CsvRecordSource, JobOrchestrator, JobService};

#[derive(Parser)]
#[command(name = "causegraph")]
#[command(about = "Causal graph extraction from tabular text")]
#[command(version)]
struct Cli {
    /// Config file (defaults to CAUSEGRAPH_CONFIG, then environment only)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a local CSV through the model endpoints and write the graph table
    Run {
        /// CSV file to analyse
        path: PathBuf,

        /// Column holding the text
        #[arg(long, short)]
        column: String,

        /// Group causes and effects into topics
        #[arg(long)]
        cluster: bool,

        /// Let the predictor clean text before tagging
        #[arg(long)]
        preprocess: bool,

        /// Directory for the CSV artifact
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },
    /// Re-cluster rows saved from an earlier run
    Cluster {
        /// JSON file with a row array or a full job result
        path: PathBuf,

        /// 0 = automatic, -1 = no reduction, n > 0 = fixed topic count
        #[arg(long, allow_hyphen_values = true)]
        nr_topics: Option<i64>,

        /// Smallest n-gram in topic representations
        #[arg(long)]
        n_gram_min: Option<u32>,

        /// Largest n-gram in topic representations
        #[arg(long)]
        n_gram_max: Option<u32>,

        /// Words kept per topic
        #[arg(long)]
        top_n_words: Option<usize>,

        /// Write the reconciled graph here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = path.or_else(|| std::env::var_os("CAUSEGRAPH_CONFIG").map(PathBuf::from));
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn orchestrator(config: &AppConfig, output: &Path) -> anyhow::Result<JobOrchestrator> {
    let (predictor, clusterer) = causegraph_inference::create_model_clients(&config.models)?;
    let artifacts = Arc::new(CsvArtifactStore::new(output));
    Ok(JobOrchestrator::new(predictor, clusterer, artifacts)
        .with_cluster_params(config.clustering.params()?)
        .with_preprocessor(EntityPreprocessor::from_config(&config.preprocessing)))
}

async fn run(
    config: AppConfig,
    path: PathBuf,
    request: JobRequest,
    output: PathBuf,
) -> anyhow::Result<()> {
    let upload_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let orchestrator = orchestrator(&config, &output)?;
    let source = Arc::new(CsvRecordSource::new(upload_dir));
    let service = JobService::new(orchestrator, source, &config.worker);

    let submission = service.submit(request).await?;
    let job_id = submission.job_id;
    let mut events = service.subscribe(job_id).await?;

    let progress = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.status {
                JobStatus::CauseEffect => {
                    println!("[{}] {}/{} rows", event.status, event.progress, event.total)
                }
                status => println!("[{status}]"),
            }
        }
    });

    let claimed = service.queue().claim().await;
    let outcome = service.execute(claimed).await;
    if let Err(e) = progress.await {
        tracing::warn!(error = %e, "Progress printer stopped");
    }
    outcome?;

    let job = service.job(job_id).await?;
    let Some(result) = job.result else {
        bail!("job {job_id} ended as {} without a result", job.status);
    };

    println!(
        "Processed {} rows, {} graph rows",
        result.result_rows.len(),
        result.result_graph.len()
    );
    if let Some(topics) = &result.topics {
        println!("{} topics", topics.len());
    }
    println!(
        "Graph table written to {}",
        output.join(format!("{job_id}.csv")).display()
    );

    Ok(())
}

fn read_rows(path: &Path) -> anyhow::Result<Vec<Row>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&content)?;

    // A saved job result carries its rows under result_rows
    if let Some(rows) = value.get_mut("result_rows") {
        value = rows.take();
    }
    Ok(serde_json::from_value(value)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "causegraph_jobs=warn,causegraph_inference=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Run {
            path,
            column,
            cluster,
            preprocess,
            output,
        } => {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                bail!("not a file: {}", path.display());
            };
            let request = JobRequest {
                source_reference: file_name.to_string(),
                column_name: column,
                cluster,
                preprocess,
            };
            run(config, path, request, output).await?;
        }
        Commands::Cluster {
            path,
            nr_topics,
            n_gram_min,
            n_gram_max,
            top_n_words,
            output,
        } => {
            let defaults = &config.clustering;
            let params = ClusterParams::new(
                TopicCountPolicy::from_wire(nr_topics.unwrap_or(defaults.nr_topics))?,
                NGramRange::new(
                    n_gram_min.unwrap_or(defaults.n_gram_min),
                    n_gram_max.unwrap_or(defaults.n_gram_max),
                )?,
                top_n_words.unwrap_or(defaults.top_n_words),
            )?;

            let rows = read_rows(&path)?;
            let orchestrator = orchestrator(&config, &config.storage.download_dir)?;
            let (graph, topics) = orchestrator.recluster(&rows, &params).await?;

            let body = serde_json::to_string_pretty(&serde_json::json!({
                "graph": graph,
                "topics": topics,
            }))?;
            match output {
                Some(out) => {
                    std::fs::write(&out, body)?;
                    println!("{} graph rows written to {}", graph.len(), out.display());
                }
                None => println!("{body}"),
            }
        }
    }

    Ok(())
}
