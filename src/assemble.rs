use std::collections::BTreeMap;

use crate::classify::keywords::count_occurrences;
use crate::classify::Assessment;
use crate::input::{RowMeta, WorkItem};
use crate::models::{
    Classification, ClassificationSource, ItemStatus, Links, Metadata, Metrics, Record, SectionSet,
};
use crate::parser::meta::{parse_year, PageMeta};

const COUNTED_KEYWORDS: usize = 5;

pub fn output_id(seq: usize) -> String {
    format!("exp_{:03}", seq)
}

/// Page meta tags win; the input row fills whatever the page lacks.
pub fn merge_metadata(page: &PageMeta, row: &RowMeta, pmc_html: String) -> Metadata {
    let title = page
        .title
        .clone()
        .or_else(|| row.title().map(str::to_string))
        .unwrap_or_default();
    let authors = if page.authors.is_empty() {
        row.authors()
    } else {
        page.authors.clone()
    };
    Metadata {
        title,
        authors,
        year: page.year.or_else(|| row.year().and_then(parse_year)),
        links: Links {
            pmc_html,
            pmc_pdf: page.pdf_url.clone(),
        },
    }
}

/// Metadata from the input row alone, for items whose page never arrived.
pub fn row_metadata(row: &RowMeta, pmc_html: String) -> Metadata {
    merge_metadata(&PageMeta::default(), row, pmc_html)
}

pub fn build_metrics(year: Option<i32>, keywords: &[String], results: &str) -> Metrics {
    let keyword_counts: BTreeMap<String, usize> = keywords
        .iter()
        .take(COUNTED_KEYWORDS)
        .map(|kw| (kw.clone(), count_occurrences(results, kw)))
        .collect();
    Metrics {
        publication_year: year,
        keyword_counts,
    }
}

pub fn assemble(item: &WorkItem, meta: Metadata, sections: SectionSet, assessment: Assessment) -> Record {
    let missing = sections.missing_core();
    let status = if missing.len() == 2 {
        ItemStatus::MissingSections
    } else {
        ItemStatus::Ok
    };
    let metrics = build_metrics(meta.year, &assessment.classification.keywords, &sections.results);

    Record {
        pmcid: item.id.clone(),
        id: output_id(item.seq),
        title: meta.title,
        authors: meta.authors,
        year: meta.year,
        classification: assessment.classification,
        sections,
        links: meta.links,
        summary: assessment.summary,
        metrics,
        status,
        missing_sections: missing,
        error: None,
    }
}

/// Record for an item that never got as far as extraction.
pub fn failure_record(item: &WorkItem, meta: Metadata, status: ItemStatus, reason: String) -> Record {
    Record {
        pmcid: item.id.clone(),
        id: output_id(item.seq),
        title: meta.title,
        authors: meta.authors,
        year: meta.year,
        classification: Classification::empty(ClassificationSource::Heuristic),
        sections: SectionSet::default(),
        links: meta.links,
        summary: None,
        metrics: Metrics {
            publication_year: meta.year,
            keyword_counts: BTreeMap::new(),
        },
        status,
        missing_sections: Vec::new(),
        error: Some(reason),
    }
}
