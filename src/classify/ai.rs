use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::keywords::MAX_KEYWORDS;
use super::{Assessment, Summarizer};
use crate::llm::{ChatClient, Completion};
use crate::models::{Classification, ClassificationSource, Metadata, SectionSet};

const MAX_SECTION_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are assisting with the NASA Space Biology archive. \
Analyse the following experiment report and respond with a compact JSON document. \
JSON keys: organism (string), experiment_type (string), platform (string), \
keywords (array of <=8 lowercase keywords), summary (concise paragraph <=120 words). \
If unsure of a field use null. JSON only, no commentary.";

#[derive(Debug, Deserialize)]
struct AiPayload {
    organism: Option<String>,
    experiment_type: Option<String>,
    platform: Option<String>,
    keywords: Option<Vec<String>>,
    summary: Option<String>,
}

/// Classification by chat completion. The first failure switches it off for the rest of the run.
pub struct AiSummarizer {
    client: ChatClient,
    model: String,
    disabled: AtomicBool,
}

impl AiSummarizer {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn disable(&self, reason: &str) {
        if !self.disabled.swap(true, Ordering::SeqCst) {
            warn!("AI augmentation disabled for the rest of the run: {}", reason);
        }
    }
}

#[async_trait]
impl Summarizer for AiSummarizer {
    async fn summarize(&self, meta: &Metadata, sections: &SectionSet) -> Option<Assessment> {
        if self.is_disabled() {
            return None;
        }
        let prompt = build_prompt(meta, sections);
        let reply = match self
            .client
            .complete(Completion {
                model: &self.model,
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: 0.2,
                max_tokens: Some(400),
            })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.disable(&e.to_string());
                return None;
            }
        };

        match serde_json::from_str::<AiPayload>(strip_fences(&reply)) {
            Ok(payload) => {
                debug!(model = %self.model, "AI classification parsed");
                Some(into_assessment(payload))
            }
            Err(e) => {
                self.disable(&format!("unparseable AI response: {}", e));
                None
            }
        }
    }
}

fn into_assessment(payload: AiPayload) -> Assessment {
    let keywords = payload
        .keywords
        .unwrap_or_default()
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .take(MAX_KEYWORDS)
        .collect();
    Assessment {
        classification: Classification {
            organism: non_blank(payload.organism),
            experiment_type: non_blank(payload.experiment_type),
            platform: non_blank(payload.platform),
            keywords,
            source: ClassificationSource::Ai,
        },
        summary: non_blank(payload.summary),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn build_prompt(meta: &Metadata, sections: &SectionSet) -> String {
    let year = meta.year.map(|y| y.to_string()).unwrap_or_default();
    let body = sections
        .iter()
        .map(|(name, text)| format!("## {}\n{}", capitalize(name), truncate_chars(text, MAX_SECTION_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Title: {}\nYear: {}\nAuthors: {}\nPMC Link: {}\n\nArticle sections:\n{}",
        meta.title,
        year,
        meta.authors.join(", "),
        meta.links.pmc_html,
        body
    )
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Drop a surrounding ```json fence if the model added one.
pub(crate) fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // language tag on the opening fence line
    match inner.find('\n') {
        Some(nl) if !inner[..nl].trim_start().starts_with('{') => inner[nl + 1..].trim(),
        _ => inner.trim(),
    }
}
