use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::assemble;
use crate::classify::ai::AiSummarizer;
use crate::classify::Classifier;
use crate::config::HarvestConfig;
use crate::error::{PipelineError, Stage};
use crate::fetch::{FetchOutcome, FetchSettings, Fetcher};
use crate::input::WorkItem;
use crate::llm::{ChatClient, LlmConfig};
use crate::models::{DocumentId, ItemStatus};
use crate::parser;
use crate::records::{write_json, RecordStore};
use crate::store::FsDocumentStore;

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome counts for a run, written to `<out>/run_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub processed: usize,
    pub ok: usize,
    pub missing_sections: Vec<ReportEntry>,
    pub no_html: Vec<ReportEntry>,
    pub errors: Vec<ReportEntry>,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    fn from_outcomes(outcomes: Vec<ItemOutcome>, started: Instant) -> Self {
        let mut report = RunReport {
            processed: outcomes.len(),
            ok: 0,
            missing_sections: Vec::new(),
            no_html: Vec::new(),
            errors: Vec::new(),
            generated_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        for outcome in outcomes {
            let entry = ReportEntry {
                id: outcome.id.to_string(),
                status: outcome.status,
                detail: outcome.detail,
            };
            match outcome.status {
                ItemStatus::Ok => report.ok += 1,
                ItemStatus::MissingSections => report.missing_sections.push(entry),
                ItemStatus::NoHtml => report.no_html.push(entry),
                ItemStatus::Error => report.errors.push(entry),
            }
        }
        for list in [&mut report.missing_sections, &mut report.no_html, &mut report.errors] {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }
        report
    }

    /// `Summary: processed N papers, ...` line printed after a run.
    pub fn summary_line(&self) -> String {
        format!(
            "Summary: processed {} papers: {} succeeded, {} with missing sections, {} without HTML, {} errors.",
            self.processed,
            self.ok,
            self.missing_sections.len(),
            self.no_html.len(),
            self.errors.len()
        )
    }
}

#[derive(Debug)]
struct ItemOutcome {
    id: DocumentId,
    status: ItemStatus,
    detail: Option<String>,
}

/// Shared, read-only state handed to every worker.
struct Shared {
    fetcher: Fetcher,
    classifier: Classifier,
    records: RecordStore,
    force: bool,
}

pub struct Pipeline {
    ctx: Arc<Shared>,
    concurrency: usize,
    report_path: PathBuf,
    show_progress: bool,
}

impl Pipeline {
    pub fn from_config(cfg: &HarvestConfig) -> Result<Self> {
        let cache = FsDocumentStore::open(cfg.raw_dir())
            .with_context(|| format!("cannot create {}", cfg.raw_dir().display()))?;
        let records = RecordStore::open(cfg.papers_dir())
            .with_context(|| format!("cannot create {}", cfg.papers_dir().display()))?;
        let fetcher = Fetcher::new(FetchSettings::from(cfg), Arc::new(cache))?;

        let classifier = match (cfg.ai_disabled_reason(), LlmConfig::from_harvest(cfg)) {
            (None, Some(llm)) => {
                let client = ChatClient::new(llm)?;
                info!(model = %cfg.ai_model, "AI augmentation enabled");
                Classifier::with_ai(Arc::new(AiSummarizer::new(client, cfg.ai_model.clone())))
            }
            (reason, _) => {
                info!("{}", reason.unwrap_or("AI augmentation unavailable; using heuristics"));
                Classifier::heuristic_only()
            }
        };

        Ok(Self {
            ctx: Arc::new(Shared {
                fetcher,
                classifier,
                records,
                force: cfg.force,
            }),
            concurrency: cfg.concurrency.max(1),
            report_path: cfg.report_path(),
            show_progress: true,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Process every item, then write the run report.
    pub async fn run(&self, items: Vec<WorkItem>) -> Result<RunReport> {
        let started = Instant::now();
        let total = items.len();
        info!(
            items = total,
            workers = self.concurrency,
            force = self.ctx.force,
            "starting harvest"
        );

        let pb = if self.show_progress {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ItemOutcome>(self.concurrency * 2);

        for item in items {
            let ctx = Arc::clone(&self.ctx);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let outcome = isolate(ctx, item).await;
                let _ = tx.send(outcome).await;
            });
        }
        // rx closes once every worker has dropped its sender
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            pb.inc(1);
            outcomes.push(outcome);
        }
        pb.finish_and_clear();

        let report = RunReport::from_outcomes(outcomes, started);
        write_json(&self.report_path, &report)
            .with_context(|| format!("cannot write {}", self.report_path.display()))?;
        info!(
            processed = report.processed,
            ok = report.ok,
            duration_ms = report.duration_ms,
            "harvest finished"
        );
        Ok(report)
    }
}

/// Run one item on its own task so a panic becomes an `error` record instead of a lost item.
async fn isolate(ctx: Arc<Shared>, item: WorkItem) -> ItemOutcome {
    let inner = (Arc::clone(&ctx), item.clone());
    let joined = tokio::spawn(async move {
        let (ctx, item) = inner;
        process(&ctx, &item).await
    })
    .await;

    let reason = match joined {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(e)) => {
            warn!(pmcid = %item.id, stage = %e.stage, "item failed: {}", e.message);
            e.to_string()
        }
        Err(join) => {
            error!(pmcid = %item.id, "worker panicked: {}", join);
            format!("worker panicked: {}", join)
        }
    };
    persist_failure(&ctx, &item, ItemStatus::Error, reason)
}

async fn process(ctx: &Shared, item: &WorkItem) -> Result<ItemOutcome, PipelineError> {
    let output_id = assemble::output_id(item.seq);
    if !ctx.force {
        if let Some(existing) = ctx.records.existing(&output_id) {
            if existing.pmcid == item.id && existing.status.is_complete() {
                debug!(pmcid = %item.id, record = %output_id, "reusing existing record");
                return Ok(ItemOutcome {
                    id: item.id.clone(),
                    status: existing.status,
                    detail: missing_detail(&existing.missing_sections, existing.status),
                });
            }
        }
    }

    let fetched = ctx
        .fetcher
        .fetch(&item.id, ctx.force, item.source_url.as_deref())
        .await
        .map_err(|e| PipelineError::new(Stage::Fetching, e))?;
    let doc = match fetched {
        FetchOutcome::Cached(doc) => {
            debug!(pmcid = %doc.id, bytes = doc.html.len(), "source: cache");
            doc
        }
        FetchOutcome::Downloaded(doc) => {
            debug!(pmcid = %doc.id, bytes = doc.html.len(), "source: network");
            doc
        }
        FetchOutcome::NotAvailable { status } => {
            warn!(pmcid = %item.id, status, "article HTML not available");
            let reason = format!("Failed to retrieve article HTML (HTTP {})", status);
            return Ok(persist_failure(ctx, item, ItemStatus::NoHtml, reason));
        }
    };

    let parsed = tokio::task::spawn_blocking(move || parser::parse_document(&doc.html))
        .await
        .map_err(|e| PipelineError::new(Stage::Extracting, e))?;

    let pmc_html = ctx.fetcher.canonical_url(&item.id);
    let meta = assemble::merge_metadata(&parsed.page_meta, &item.row, pmc_html);
    let assessment = ctx.classifier.classify(&meta, &parsed.sections).await;
    let record = assemble::assemble(item, meta, parsed.sections, assessment);

    ctx.records
        .write(&record)
        .map_err(|e| PipelineError::new(Stage::Persisting, e))?;
    debug!(pmcid = %item.id, record = %record.id, status = %record.status, "record written");

    Ok(ItemOutcome {
        id: item.id.clone(),
        status: record.status,
        detail: missing_detail(&record.missing_sections, record.status),
    })
}

fn missing_detail(missing: &[String], status: ItemStatus) -> Option<String> {
    (status == ItemStatus::MissingSections && !missing.is_empty()).then(|| missing.join(", "))
}

/// Persist an empty-sections record so every attempted ID has a file.
fn persist_failure(ctx: &Shared, item: &WorkItem, status: ItemStatus, reason: String) -> ItemOutcome {
    let meta = assemble::row_metadata(&item.row, ctx.fetcher.canonical_url(&item.id));
    let record = assemble::failure_record(item, meta, status, reason.clone());
    if let Err(e) = ctx.records.write(&record) {
        error!(pmcid = %item.id, stage = %Stage::Persisting, "cannot write failure record: {}", e);
    }
    ItemOutcome {
        id: item.id.clone(),
        status,
        detail: Some(reason),
    }
}
