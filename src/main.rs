mod assemble;
mod classify;
mod config;
mod error;
mod fetch;
mod input;
mod llm;
mod models;
mod parser;
mod pipeline;
mod records;
mod store;
mod summarize;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{AiMode, HarvestConfig};
use error::LlmError;
use llm::{ChatClient, LlmConfig};

#[derive(Parser)]
#[command(name = "pmc_harvester", about = "Harvest PubMed Central articles into JSON dossiers")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Config file (default: ./harvester.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract and classify articles, writing one dossier per ID
    Run(RunArgs),
    /// Print the PMC IDs a CSV file yields
    Ids {
        csv: PathBuf,
        /// Max IDs to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Add AI summaries to existing dossiers
    Summarize {
        /// Dossier directory (default: <out>/papers)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Max files to update this run
        #[arg(long, default_value = "2")]
        max_batch: usize,
        /// Primary model
        #[arg(long)]
        model: Option<String>,
        /// Model tried when the primary fails
        #[arg(long, default_value = summarize::FALLBACK_MODEL)]
        fallback_model: String,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").required(true).args(["csv", "ids"])))]
struct RunArgs {
    /// CSV file with PMC IDs or links
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Explicit PMC IDs, e.g. PMC4136787 PMC123456
    #[arg(long, num_args = 1..)]
    ids: Vec<String>,
    /// Output base directory
    #[arg(long)]
    out: Option<PathBuf>,
    /// Max IDs to process
    #[arg(short = 'n', long)]
    limit: Option<usize>,
    /// Parallel workers
    #[arg(short, long)]
    workers: Option<usize>,
    /// Refetch HTML and rebuild records even if present
    #[arg(long)]
    force: bool,
    /// Use the AI service when a key is configured, or never
    #[arg(long, value_enum)]
    ai: Option<AiMode>,
    /// Model for AI classification
    #[arg(long)]
    ai_model: Option<String>,
}

impl RunArgs {
    fn apply(&self, cfg: &mut HarvestConfig) {
        if let Some(out) = &self.out {
            cfg.out_dir = out.clone();
        }
        if self.limit.is_some() {
            cfg.limit = self.limit;
        }
        if let Some(workers) = self.workers {
            cfg.concurrency = workers;
        }
        cfg.force |= self.force;
        if let Some(ai) = self.ai {
            cfg.ai_mode = ai;
        }
        if let Some(model) = &self.ai_model {
            cfg.ai_model = model.clone();
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let t0 = Instant::now();
    let mut cfg = HarvestConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut cfg);
            let items = match &args.csv {
                Some(csv) => input::from_csv(csv, cfg.limit)?,
                None => input::from_ids(&args.ids, cfg.limit)?,
            };
            info!(items = items.len(), out = %cfg.out_dir.display(), "harvesting articles");

            let report = pipeline::Pipeline::from_config(&cfg)?
                .with_progress(!cli.quiet)
                .run(items)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("{}", report.summary_line());
        }
        Commands::Ids { csv, limit } => {
            for item in input::from_csv(&csv, limit)? {
                println!("{}", item.id);
            }
        }
        Commands::Summarize {
            dir,
            max_batch,
            model,
            fallback_model,
        } => {
            let llm = LlmConfig::from_harvest(&cfg)
                .ok_or(LlmError::MissingApiKey)
                .context("OPENAI_API_KEY is not set; set it before running the summarizer")?;
            let client = ChatClient::new(llm)?;
            let opts = summarize::SummarizeOptions {
                dir: dir.unwrap_or_else(|| cfg.papers_dir()),
                max_batch,
                primary_model: model.unwrap_or_else(|| cfg.ai_model.clone()),
                fallback_model,
            };
            let stats = summarize::summarize_dir(&client, &opts).await?;
            println!(
                "Updated {} dossiers ({} already summarized, {} failed).",
                stats.updated, stats.skipped, stats.failed
            );
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
