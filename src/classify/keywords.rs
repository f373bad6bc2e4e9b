use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::SectionSet;

pub const MAX_KEYWORDS: usize = 8;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z][a-z\-]{2,}").unwrap());
static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "were", "this", "have", "which", "using", "into",
    "been", "their", "about", "between", "within", "after", "before", "during", "these", "those",
    "through", "under", "over", "such", "also", "because", "while", "among", "based", "data",
    "study", "results", "conclusion", "methods", "analysis", "effect", "effects", "space",
    "microgravity",
];

/// Most frequent non-stopword tokens, ties broken by first occurrence.
pub fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    // token -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, m) in TOKEN_RE.find_iter(&lowered).enumerate() {
        let token = m.as_str();
        if STOPWORDS.contains(&token) {
            continue;
        }
        counts.entry(token).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(token, _)| token.to_string())
        .collect()
}

/// First three sentences of the abstract, else results, else conclusion.
pub fn simple_summary(sections: &SectionSet) -> Option<String> {
    let text = [&sections.abstract_text, &sections.results, &sections.conclusion]
        .into_iter()
        .find(|t| !t.is_empty())?;

    let mut end = text.len();
    for (n, m) in SENTENCE_END_RE.find_iter(text).enumerate() {
        if n == 2 {
            // keep the terminator, drop the whitespace after it
            end = m.start() + 1;
            break;
        }
    }
    Some(text[..end].trim().to_string()).filter(|s| !s.is_empty())
}

/// Non-overlapping, case-insensitive occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.to_lowercase().matches(&needle.to_lowercase()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_dropped_and_ties_keep_text_order() {
        let text = "Bone loss and bone density. Muscle atrophy, muscle mass. The osteoclast.";
        let kws = top_keywords(text, MAX_KEYWORDS);
        assert_eq!(kws, ["bone", "muscle", "loss", "density", "atrophy", "mass", "osteoclast"]);
    }

    #[test]
    fn limit_and_hyphenated_tokens() {
        let text = "long-term long-term exposure exposure exposure a bb cc";
        let kws = top_keywords(text, 1);
        assert_eq!(kws, ["exposure"]);
        assert_eq!(top_keywords(text, 8), ["exposure", "long-term"]);
    }

    #[test]
    fn summary_takes_three_sentences() {
        let sections = SectionSet {
            abstract_text: "One. Two! Three? Four.".into(),
            ..Default::default()
        };
        assert_eq!(simple_summary(&sections).as_deref(), Some("One. Two! Three?"));
    }

    #[test]
    fn summary_falls_back_to_results_then_nothing() {
        let sections = SectionSet {
            results: "Only results here".into(),
            ..Default::default()
        };
        assert_eq!(simple_summary(&sections).as_deref(), Some("Only results here"));
        assert!(simple_summary(&SectionSet::default()).is_none());
    }

    #[test]
    fn occurrences_are_case_insensitive() {
        assert_eq!(count_occurrences("Root growth; ROOT hairs; roots", "root"), 3);
        assert_eq!(count_occurrences("aaaa", "aa"), 2);
    }
}
