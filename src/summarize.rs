use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::llm::{ChatClient, Completion};
use crate::records::write_json;

pub const AI_SUMMARY_KEY: &str = "ai_summary";
pub const FALLBACK_MODEL: &str = "gpt-3.5-turbo";
const TEMPERATURE: f32 = 0.4;

const INSTRUCTIONS: &str = "You are summarizing NASA bioscience experiment data.\n\
Write a concise, digestible, descriptive summary (120-170 words) that captures the full study.\n\
Blend details from the abstract, introduction/background, methods, results, and conclusion where available.\n\
Highlight the scientific question, key findings, and why they matter for space biosciences.\n\
Avoid repeating the title verbatim and keep the tone informative yet approachable.\n\
Return only the summary text, no extra commentary.";

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub dir: PathBuf,
    pub max_batch: usize,
    pub primary_model: String,
    pub fallback_model: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SummarizeStats {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Prompt fields pulled from a dossier.
struct Payload {
    title: String,
    authors: String,
    abstract_text: String,
    background: String,
    methods: String,
    results: String,
    conclusion: String,
}

impl Payload {
    fn from_record(data: &Value) -> Self {
        let section = |key: &str| text_of(&data["sections"][key]);
        let background = [section("introduction"), section("background"), text_of(&data["summary"])]
            .into_iter()
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        Self {
            title: text_of(&data["title"]),
            authors: text_of(&data["authors"]),
            abstract_text: section("abstract"),
            background,
            methods: section("methods"),
            results: section("results"),
            conclusion: section("conclusion"),
        }
    }

    fn prompt(&self) -> String {
        format!(
            "Title: {}\nAuthors: {}\nAbstract: {}\n\nBackground: {}\n\nMethods: {}\n\nResults: {}\n\nConclusion: {}",
            self.title,
            self.authors,
            self.abstract_text,
            self.background,
            self.methods,
            self.results,
            self.conclusion
        )
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("title", &self.title),
            ("authors", &self.authors),
            ("abstract", &self.abstract_text),
            ("background", &self.background),
            ("methods", &self.methods),
            ("results", &self.results),
            ("conclusion", &self.conclusion),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

/// Strings as-is, arrays joined, null as empty.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Add `ai_summary` to up to `max_batch` dossiers that lack one.
pub async fn summarize_dir(client: &ChatClient, opts: &SummarizeOptions) -> Result<SummarizeStats> {
    let mut paths: Vec<PathBuf> = fs::read_dir(&opts.dir)
        .with_context(|| format!("cannot list {}", opts.dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut stats = SummarizeStats::default();
    for path in paths {
        if stats.updated >= opts.max_batch {
            debug!("batch limit of {} reached", opts.max_batch);
            break;
        }
        match summarize_file(client, opts, &path).await {
            Ok(true) => stats.updated += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                warn!("Error summarizing {}: {:#}", path.display(), e);
                stats.failed += 1;
            }
        }
    }
    info!(
        updated = stats.updated,
        skipped = stats.skipped,
        failed = stats.failed,
        "summaries done"
    );
    Ok(stats)
}

async fn summarize_file(client: &ChatClient, opts: &SummarizeOptions, path: &Path) -> Result<bool> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let mut data: Value = serde_json::from_slice(&bytes).context("not a JSON dossier")?;
    let Some(obj) = data.as_object() else {
        anyhow::bail!("dossier is not a JSON object");
    };
    if obj.contains_key(AI_SUMMARY_KEY) {
        debug!("Skipping {} (already contains {})", path.display(), AI_SUMMARY_KEY);
        return Ok(false);
    }

    let payload = Payload::from_record(&data);
    let empty = payload.empty_fields();
    if !empty.is_empty() {
        warn!("{} missing sections for prompt: {}", path.display(), empty.join(", "));
    }

    let summary = request_summary(client, opts, &payload.prompt()).await?;
    let lengths = json!({
        "abstract": word_count(&payload.abstract_text),
        "results": word_count(&payload.results),
        "conclusion": word_count(&payload.conclusion),
    });

    let Some(obj) = data.as_object_mut() else {
        anyhow::bail!("dossier is not a JSON object");
    };
    let words = word_count(&summary);
    obj.insert(AI_SUMMARY_KEY.to_string(), Value::String(summary));
    let metrics = obj
        .entry("metrics")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metrics.is_object() {
        *metrics = Value::Object(Map::new());
    }
    if let Some(metrics) = metrics.as_object_mut() {
        metrics.insert("section_lengths".to_string(), lengths);
    }

    write_json(path, &data).with_context(|| format!("cannot write {}", path.display()))?;
    info!("Saved {} with {} ({} words)", path.display(), AI_SUMMARY_KEY, words);
    Ok(true)
}

async fn request_summary(client: &ChatClient, opts: &SummarizeOptions, prompt: &str) -> Result<String> {
    let primary_err = match ask(client, &opts.primary_model, prompt).await {
        Ok(text) => return Ok(text),
        Err(e) => e,
    };
    warn!(
        "Primary model {} failed with {}. Attempting fallback {}.",
        opts.primary_model, primary_err, opts.fallback_model
    );
    ask(client, &opts.fallback_model, prompt)
        .await
        .map_err(|fallback_err| {
            anyhow::anyhow!(
                "primary model failed with: {}. Fallback failed with: {}",
                primary_err,
                fallback_err
            )
        })
}

async fn ask(client: &ChatClient, model: &str, prompt: &str) -> Result<String, LlmError> {
    client
        .complete(Completion {
            model,
            system: INSTRUCTIONS,
            prompt,
            temperature: TEMPERATURE,
            max_tokens: None,
        })
        .await
}
