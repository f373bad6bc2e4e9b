use std::sync::LazyLock;

use regex::Regex;

use super::tree::{DocTree, NodeId};
use crate::models::SectionSet;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const RESULTS_LABELS: &[&str] = &[
    "results",
    "result",
    "results and discussion",
    "findings",
    "outcome",
    "outcomes",
    "observations",
];
const CONCLUSION_LABELS: &[&str] = &[
    "conclusion",
    "conclusions",
    "concluding remarks",
    "summary and conclusions",
    "summary",
    "closing remarks",
];
const METHODS_LABELS: &[&str] = &[
    "methods",
    "method",
    "materials and methods",
    "materials",
    "methodology",
    "experimental",
    "experimental procedures",
];
const ABSTRACT_LABELS: &[&str] = &["abstract"];

static RESULTS_WORD: LazyLock<Regex> = LazyLock::new(|| word_pattern(RESULTS_LABELS));
static CONCLUSION_WORD: LazyLock<Regex> = LazyLock::new(|| word_pattern(CONCLUSION_LABELS));
static METHODS_WORD: LazyLock<Regex> = LazyLock::new(|| word_pattern(METHODS_LABELS));
static ABSTRACT_WORD: LazyLock<Regex> = LazyLock::new(|| word_pattern(ABSTRACT_LABELS));

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const CONTAINERS: &[&str] = &["section", "div", "article"];

/// `(?i)\b(?:label|label ...)\b`
fn word_pattern(labels: &[&str]) -> Regex {
    let alternatives: Vec<String> = labels.iter().map(|l| regex::escape(l)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
}

pub fn normalize_ws(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Pull abstract, methods, results and conclusion text out of an article page.
///
/// Pure and deterministic. A section nothing matches comes back as `""`.
pub fn extract_sections(tree: &DocTree) -> SectionSet {
    let region = main_region(tree);
    let finder = Finder { tree, region };

    let mut abstract_text = finder.find(ABSTRACT_LABELS, &ABSTRACT_WORD);
    if abstract_text.is_empty() {
        abstract_text = abstract_block(tree).unwrap_or_default();
    }

    SectionSet {
        abstract_text,
        methods: finder.find(METHODS_LABELS, &METHODS_WORD),
        results: finder.find(RESULTS_LABELS, &RESULTS_WORD),
        conclusion: finder.find(CONCLUSION_LABELS, &CONCLUSION_WORD),
    }
}

/// `div#maincontent` if present, else the whole document.
fn main_region(tree: &DocTree) -> NodeId {
    tree.elements(tree.root(), &["div"])
        .find(|&n| tree.attr(n, "id") == Some("maincontent"))
        .unwrap_or_else(|| tree.root())
}

/// Abstract blocks that live outside the main region on some layouts.
fn abstract_block(tree: &DocTree) -> Option<String> {
    tree.descendants(tree.root())
        .find(|&n| match tree.tag(n) {
            Some("div") => tree.has_class(n, "abstr") || tree.has_class(n, "abstract"),
            Some("section") => tree.has_class(n, "abstract"),
            Some(_) => tree.attr(n, "id") == Some("abstract"),
            None => false,
        })
        .map(|n| normalize_ws(&tree.text(n)))
        .filter(|t| !t.is_empty())
}

struct Finder<'a> {
    tree: &'a DocTree,
    region: NodeId,
}

impl Finder<'_> {
    fn find(&self, labels: &[&str], word: &Regex) -> String {
        self.by_heading(labels)
            .or_else(|| self.by_attributes(word))
            .or_else(|| self.inline(word))
            .unwrap_or_default()
    }

    /// First label-matching heading that yields a non-empty body.
    fn by_heading(&self, labels: &[&str]) -> Option<String> {
        let tree = self.tree;
        tree.elements(self.region, HEADINGS).find_map(|h| {
            let title = normalize_ws(&tree.text(h)).to_lowercase();
            if title.is_empty() || !heading_matches(&title, labels) {
                return None;
            }
            let body = self.following(h).or_else(|| self.same_parent(h))?;
            Some(body)
        })
    }

    /// Siblings after the heading, up to one of equal or shallower level.
    fn following(&self, heading: NodeId) -> Option<String> {
        let tree = self.tree;
        let level = tree.heading_level(heading).unwrap_or(7);
        let mut parts = Vec::new();
        for &sib in tree.next_siblings(heading) {
            if tree.heading_level(sib).is_some_and(|l| l <= level) {
                break;
            }
            parts.push(tree.text(sib));
        }
        join_parts(parts)
    }

    /// Content wrapped in the heading's own container.
    fn same_parent(&self, heading: NodeId) -> Option<String> {
        let tree = self.tree;
        let parent = tree.parent(heading)?;
        let mut parts = Vec::new();
        for &child in tree.children(parent) {
            if child == heading {
                continue;
            }
            if tree.heading_level(child).is_some() {
                break;
            }
            parts.push(tree.text(child));
        }
        join_parts(parts)
    }

    /// Container whose id, title or class names name the section.
    fn by_attributes(&self, word: &Regex) -> Option<String> {
        let tree = self.tree;
        tree.elements(self.region, CONTAINERS).find_map(|n| {
            let mut chunks = vec![
                tree.attr(n, "id").unwrap_or(""),
                tree.attr(n, "title").unwrap_or(""),
            ];
            chunks.extend(tree.classes(n));
            if !word.is_match(&chunks.join(" ")) {
                return None;
            }
            Some(normalize_ws(&tree.text(n))).filter(|t| !t.is_empty())
        })
    }

    /// Innermost element on the first-match path whose text mentions a label.
    fn inline(&self, word: &Regex) -> Option<String> {
        let tree = self.tree;
        let mentions = |n: NodeId| tree.tag(n).is_some() && word.is_match(&tree.text(n));
        if !mentions(self.region) {
            return None;
        }
        let mut current = self.region;
        while let Some(&next) = tree.children(current).iter().find(|&&c| mentions(c)) {
            current = next;
        }
        Some(normalize_ws(&tree.text(current))).filter(|t| !t.is_empty())
    }
}

/// Heading text starts with a label, or contains it as a space-delimited word.
fn heading_matches(lowered: &str, labels: &[&str]) -> bool {
    let padded = format!(" {} ", lowered);
    labels
        .iter()
        .any(|lab| lowered.starts_with(lab) || padded.contains(&format!(" {} ", lab)))
}

fn join_parts(parts: Vec<String>) -> Option<String> {
    let joined = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(normalize_ws(&joined)).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(html: &str) -> SectionSet {
        extract_sections(&DocTree::parse(html))
    }

    fn fixture(name: &str) -> SectionSet {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        sections(&html)
    }

    #[test]
    fn flat_article_maps_synonym_headings() {
        let s = fixture("flat_article");
        assert!(s.results.starts_with("Seedlings grown on orbit"), "{}", s.results);
        assert!(s.results.contains("Root skewing"), "deeper heading text is kept");
        assert!(!s.results.contains("In summary"), "stops at the next h2");
        assert!(s.conclusion.starts_with("In summary"), "{}", s.conclusion);
        assert!(s.methods.contains("Arabidopsis thaliana seeds"));
        assert!(s.abstract_text.contains("Spaceflight alters"));
        assert!(!s.abstract_text.contains("navigation"));
    }

    #[test]
    fn nested_sections_and_abstract_outside_region() {
        let s = fixture("nested_article");
        assert!(s.abstract_text.starts_with("Mice flown aboard"), "{}", s.abstract_text);
        assert!(s.results.contains("Bone mineral density decreased"));
        assert!(s.results.contains("Muscle fibres"));
        assert!(s.conclusion.contains("countermeasures"));
        assert!(!s.conclusion.contains("Bone mineral"));
        assert!(s.methods.contains("Thirty female mice"));
    }

    #[test]
    fn no_headings_gives_empty_sections() {
        let s = fixture("no_headings");
        assert_eq!(s, SectionSet::default());
        assert_eq!(s.missing_core().len(), 2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = std::fs::read_to_string("tests/fixtures/nested_article.html").unwrap();
        assert_eq!(sections(&html), sections(&html));
    }

    #[test]
    fn heading_without_siblings_uses_parent_children() {
        let s = sections(
            "<body><div class='wrap'><p>Cells divided faster.</p><h3>Findings</h3></div><p>Unrelated</p></body>",
        );
        assert_eq!(s.results, "Cells divided faster.");
    }

    #[test]
    fn empty_heading_body_falls_through_to_next_match() {
        let s = sections(
            "<body><div><h2>Results</h2></div><h2>Results and Discussion</h2><p>Second body.</p></body>",
        );
        assert_eq!(s.results, "Second body.");
    }

    #[test]
    fn attribute_scan_when_no_heading() {
        let s = sections(
            r#"<body><div id="sec-conclusions" class="sec"><p>Shielding helps.</p></div></body>"#,
        );
        assert_eq!(s.conclusion, "Shielding helps.");
        assert!(s.results.is_empty());
    }

    #[test]
    fn inline_scan_returns_innermost_match() {
        let s = sections(
            "<body><div><p>Intro text.</p><div><span>Our findings show growth.</span><p>Other.</p></div></div></body>",
        );
        assert_eq!(s.results, "Our findings show growth.");
    }

    #[test]
    fn heading_match_rules() {
        assert!(heading_matches("3. results and discussion", RESULTS_LABELS));
        assert!(heading_matches("conclusions", CONCLUSION_LABELS));
        // "result" is a label, so the prefix rule also takes headings that merely start with it
        assert!(heading_matches("resultant forces", RESULTS_LABELS));
        assert!(!heading_matches("the resultant forces", RESULTS_LABELS));
        assert!(!heading_matches("introduction", RESULTS_LABELS));
    }
}
