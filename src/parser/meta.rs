use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate};
use regex::Regex;
use scraper::{Html, Selector};

use super::sections::normalize_ws;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static META_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[name][content]").unwrap());

/// Bibliographic fields embedded in the page's `citation_*` meta tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub pdf_url: Option<String>,
}

pub fn extract_meta(doc: &Html) -> PageMeta {
    let mut tags: Vec<(String, String)> = Vec::new();
    for el in doc.select(&META_SEL) {
        let (Some(name), Some(content)) = (el.value().attr("name"), el.value().attr("content")) else {
            continue;
        };
        let content = content.trim();
        if !content.is_empty() {
            tags.push((name.to_ascii_lowercase(), content.to_string()));
        }
    }
    let first = |name: &str| {
        tags.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let title = first("citation_title").or_else(|| {
        doc.select(&TITLE_SEL)
            .next()
            .map(|t| normalize_ws(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    });
    let authors = tags
        .iter()
        .filter(|(k, _)| k == "citation_author")
        .map(|(_, v)| v.clone())
        .collect();
    let year = ["citation_publication_date", "citation_date"]
        .iter()
        .filter_map(|name| first(name))
        .find_map(|raw| parse_year(&raw));

    PageMeta {
        title,
        authors,
        year,
        pdf_url: first("citation_pdf_url"),
    }
}

/// Year of an ISO date or datetime, else the first standalone 19xx/20xx.
pub fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.year());
    }
    YEAR_RE.find(raw).and_then(|m| m.as_str().parse().ok())
}
