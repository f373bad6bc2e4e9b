pub mod meta;
pub mod sections;
pub mod tree;

use scraper::Html;

use crate::models::SectionSet;
use meta::PageMeta;
use tree::DocTree;

/// Everything read out of one article page.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub sections: SectionSet,
    pub page_meta: PageMeta,
}

/// Single parse feeding both passes: markup → tree → sections, markup → meta tags.
///
/// CPU-bound; callers on the async runtime should run it on a blocking thread.
pub fn parse_document(html: &str) -> ParsedDocument {
    let doc = Html::parse_document(html);
    let page_meta = meta::extract_meta(&doc);
    let tree = DocTree::from_html(&doc);
    ParsedDocument {
        sections: sections::extract_sections(&tree),
        page_meta,
    }
}
