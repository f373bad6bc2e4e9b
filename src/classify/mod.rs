pub mod ai;
pub mod keywords;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Classification, ClassificationSource, Metadata, SectionSet};
use rules::Vocabulary;

/// Classification plus the short summary that travels with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub classification: Classification,
    pub summary: Option<String>,
}

/// A strategy that may decline to answer.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, meta: &Metadata, sections: &SectionSet) -> Option<Assessment>;
}

/// Rule tables and keyword counts over the combined section text.
pub struct HeuristicSummarizer {
    organisms: &'static dyn Vocabulary,
    experiment_types: &'static dyn Vocabulary,
    platforms: &'static dyn Vocabulary,
}

impl Default for HeuristicSummarizer {
    fn default() -> Self {
        Self {
            organisms: &rules::ORGANISMS,
            experiment_types: &rules::EXPERIMENT_TYPES,
            platforms: &rules::PLATFORMS,
        }
    }
}

impl HeuristicSummarizer {
    pub fn assess(&self, sections: &SectionSet) -> Assessment {
        let text = sections.combined_text();
        Assessment {
            classification: Classification {
                organism: self.organisms.classify(&text),
                experiment_type: self.experiment_types.classify(&text),
                platform: self.platforms.classify(&text),
                keywords: keywords::top_keywords(&text, keywords::MAX_KEYWORDS),
                source: ClassificationSource::Heuristic,
            },
            summary: keywords::simple_summary(sections),
        }
    }
}

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    async fn summarize(&self, _meta: &Metadata, sections: &SectionSet) -> Option<Assessment> {
        Some(self.assess(sections))
    }
}

/// AI first when configured; otherwise, or when it declines, the heuristic for the whole record.
pub struct Classifier {
    ai: Option<Arc<dyn Summarizer>>,
    heuristic: HeuristicSummarizer,
}

impl Classifier {
    pub fn heuristic_only() -> Self {
        Self {
            ai: None,
            heuristic: HeuristicSummarizer::default(),
        }
    }

    pub fn with_ai(ai: Arc<dyn Summarizer>) -> Self {
        Self {
            ai: Some(ai),
            heuristic: HeuristicSummarizer::default(),
        }
    }

    pub async fn classify(&self, meta: &Metadata, sections: &SectionSet) -> Assessment {
        if let Some(ai) = &self.ai {
            if let Some(assessment) = ai.summarize(meta, sections).await {
                return assessment;
            }
        }
        self.heuristic.assess(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ai::AiSummarizer;
    use crate::llm::tests::client_for;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sections() -> SectionSet {
        SectionSet {
            abstract_text: "Mice were flown on the Space Shuttle. Bone loss was measured.".into(),
            results: "Bone density fell in flight mice.".into(),
            ..Default::default()
        }
    }

    #[test]
    fn heuristic_fills_every_field() {
        let a = HeuristicSummarizer::default().assess(&sections());
        let c = &a.classification;
        assert_eq!(c.source, ClassificationSource::Heuristic);
        assert_eq!(c.organism.as_deref(), Some("Mus musculus"));
        assert_eq!(c.platform.as_deref(), Some("Space Shuttle"));
        assert_eq!(c.experiment_type.as_deref(), Some("Musculoskeletal Adaptation"));
        assert_eq!(c.keywords[..2], ["mice", "bone"]);
        assert!(c.keywords.len() <= keywords::MAX_KEYWORDS);
        assert_eq!(
            a.summary.as_deref(),
            Some("Mice were flown on the Space Shuttle. Bone loss was measured.")
        );
    }

    #[test]
    fn heuristic_is_deterministic() {
        let h = HeuristicSummarizer::default();
        assert_eq!(h.assess(&sections()), h.assess(&sections()));
    }

    #[tokio::test]
    async fn ai_failure_falls_back_and_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let ai = Arc::new(AiSummarizer::new(client_for(&server), "gpt-4o-mini"));
        let classifier = Classifier::with_ai(ai);
        let meta = Metadata::default();

        let first = classifier.classify(&meta, &sections()).await;
        let second = classifier.classify(&meta, &sections()).await;
        assert_eq!(first.classification.source, ClassificationSource::Heuristic);
        assert_eq!(second.classification.source, ClassificationSource::Heuristic);
        assert_eq!(first, second);
    }
}
