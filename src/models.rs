use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^PMC\d+$").unwrap());
static ID_SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)PMC\d+").unwrap());

/// PubMed Central identifier, always uppercase (`PMC4136787`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Parse a whole string as an ID. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        ID_RE
            .is_match(trimmed)
            .then(|| Self(trimmed.to_ascii_uppercase()))
    }

    /// First `PMC<digits>` occurrence anywhere in `text`.
    pub fn find_in(text: &str) -> Option<Self> {
        ID_SEARCH_RE
            .find(text)
            .map(|m| Self(m.as_str().to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a PMC identifier: {value:?}"))
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Unmodified markup as fetched for one ID.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: DocumentId,
    pub html: String,
}

/// Extracted section text. Every key is always present; empty means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSet {
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub methods: String,
    #[serde(default)]
    pub results: String,
    #[serde(default)]
    pub conclusion: String,
}

impl SectionSet {
    /// Sections in canonical order, paired with their JSON names.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("abstract", self.abstract_text.as_str()),
            ("methods", self.methods.as_str()),
            ("results", self.results.as_str()),
            ("conclusion", self.conclusion.as_str()),
        ]
        .into_iter()
    }

    pub fn combined_text(&self) -> String {
        self.iter()
            .map(|(_, text)| text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Core sections (results, conclusion) that came back empty.
    pub fn missing_core(&self) -> Vec<String> {
        [("results", &self.results), ("conclusion", &self.conclusion)]
            .into_iter()
            .filter(|(_, text)| text.is_empty())
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub pmc_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmc_pdf: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub links: Links,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Ai,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub organism: Option<String>,
    pub experiment_type: Option<String>,
    pub platform: Option<String>,
    pub keywords: Vec<String>,
    #[serde(rename = "classification_source")]
    pub source: ClassificationSource,
}

impl Classification {
    pub fn empty(source: ClassificationSource) -> Self {
        Self {
            organism: None,
            experiment_type: None,
            platform: None,
            keywords: Vec::new(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Ok,
    MissingSections,
    NoHtml,
    Error,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Ok => "ok",
            ItemStatus::MissingSections => "missing_sections",
            ItemStatus::NoHtml => "no_html",
            ItemStatus::Error => "error",
        }
    }

    /// Statuses whose dossier is worth keeping on a non-forced re-run.
    pub fn is_complete(self) -> bool {
        matches!(self, ItemStatus::Ok | ItemStatus::MissingSections)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keyword_counts: BTreeMap<String, usize>,
}

/// The persisted dossier for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub pmcid: DocumentId,
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    #[serde(flatten)]
    pub classification: Classification,
    pub sections: SectionSet,
    pub links: Links,
    pub summary: Option<String>,
    pub metrics: Metrics,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_normalizes_case_and_whitespace() {
        let id = DocumentId::parse("  pmc4136787 ").unwrap();
        assert_eq!(id.as_str(), "PMC4136787");
    }

    #[test]
    fn id_rejects_other_formats() {
        assert!(DocumentId::parse("4136787").is_none());
        assert!(DocumentId::parse("PMC").is_none());
        assert!(DocumentId::parse("PMC12x").is_none());
    }

    #[test]
    fn id_found_inside_link() {
        let id = DocumentId::find_in("see https://pmc.ncbi.nlm.nih.gov/articles/pmc4136787/").unwrap();
        assert_eq!(id.as_str(), "PMC4136787");
    }

    #[test]
    fn id_deserialization_validates() {
        let ok: DocumentId = serde_json::from_str("\"pmc12\"").unwrap();
        assert_eq!(ok.as_str(), "PMC12");
        assert!(serde_json::from_str::<DocumentId>("\"doi:10.1\"").is_err());
    }

    #[test]
    fn sections_serialize_with_all_keys() {
        let json = serde_json::to_value(SectionSet::default()).unwrap();
        for key in ["abstract", "methods", "results", "conclusion"] {
            assert_eq!(json[key], "", "missing key {key}");
        }
    }

    #[test]
    fn missing_core_lists_empty_results_and_conclusion() {
        let sections = SectionSet {
            results: "data".into(),
            ..Default::default()
        };
        assert_eq!(sections.missing_core(), vec!["conclusion".to_string()]);
    }

    #[test]
    fn record_flattens_classification() {
        let record = Record {
            pmcid: DocumentId::parse("PMC1").unwrap(),
            id: "exp_001".into(),
            title: String::new(),
            authors: vec![],
            year: None,
            classification: Classification::empty(ClassificationSource::Heuristic),
            sections: SectionSet::default(),
            links: Links::default(),
            summary: None,
            metrics: Metrics::default(),
            status: ItemStatus::NoHtml,
            missing_sections: vec![],
            error: Some("Failed to retrieve article HTML".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["classification_source"], "heuristic");
        assert!(json["organism"].is_null());
        assert_eq!(json["status"], "no_html");
        assert!(json.get("missing_sections").is_none());
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
