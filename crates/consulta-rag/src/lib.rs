//! # consulta-rag
//!
//! Retrieval-augmented answering over the clinical corpus: query analysis,
//! strategy-driven retrieval with ranking, and prompt-templated generation
//! with validation.

pub mod analyzer;
pub mod generator;
pub mod lexicon;
pub mod retriever;

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use consulta_core::defaults::CHAT_MAX_RESULTS;
use consulta_core::{
    ChatBackend, ChatRequest, ChatResult, EmbeddingBackend, QueryClassification, RankedContext,
    Result, SourceRef, VectorIndex,
};

pub use analyzer::QueryAnalyzer;
pub use generator::{Generator, FALLBACK_ANSWER};
pub use retriever::Retriever;

/// How many sources a chat answer cites at most.
const MAX_SOURCES: usize = 5;

/// Full RAG pipeline: analyze → retrieve → rank → generate → validate.
pub struct RagEngine {
    analyzer: QueryAnalyzer,
    retriever: Retriever,
    generator: Generator,
}

impl RagEngine {
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(),
            retriever: Retriever::new(vectors, embedder),
            generator: Generator::new(chat),
        }
    }

    /// Answer a natural-language clinical question against the corpus.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResult> {
        let start = Instant::now();
        let max_results = request.max_results.unwrap_or(CHAT_MAX_RESULTS);

        let mut plan = self.analyzer.analyze(&request.query);
        merge_filters(&mut plan.filters, &request.filters);

        let contexts = self.retriever.retrieve(&plan, max_results).await?;
        let generated = self.generator.generate(&plan, &contexts).await?;

        let sources = if request.include_sources {
            contexts
                .iter()
                .take(MAX_SOURCES)
                .map(|c| SourceRef {
                    source_id: c.source_id,
                    source_kind: c.source_kind,
                    patient_name: c.patient_name.clone(),
                    relevance: c.final_score,
                    excerpt: c.excerpt.clone(),
                    date: c.date.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            query = %request.query,
            intent = %plan.intent,
            result_count = contexts.len(),
            confidence = generated.confidence,
            duration_ms = elapsed_ms,
            "Chat query answered"
        );

        Ok(ChatResult {
            answer: generated.answer,
            sources,
            confidence: generated.confidence,
            intent: plan.intent,
            follow_up_suggestions: generated.follow_ups,
            classification: QueryClassification {
                entities: plan.entities,
                search_terms: plan.search_terms,
                normalized_query: plan.normalized,
            },
            elapsed_ms,
        })
    }

    /// Plain retrieval (no generation), for the search façade operation.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RankedContext>> {
        let plan = self.analyzer.analyze(query);
        self.retriever.retrieve(&plan, max_results).await
    }
}

/// User-supplied filters take precedence over analyzer-derived ones.
fn merge_filters(
    base: &mut consulta_core::MetadataFilter,
    user: &consulta_core::MetadataFilter,
) {
    if user.patient_name.is_some() {
        base.patient_name = user.patient_name.clone();
    }
    if user.diagnosis.is_some() {
        base.diagnosis = user.diagnosis.clone();
    }
    if user.doc_type.is_some() {
        base.doc_type = user.doc_type.clone();
    }
    if user.urgency.is_some() {
        base.urgency = user.urgency;
    }
    if user.source_kind.is_some() {
        base.source_kind = user.source_kind;
    }
    if user.date_from.is_some() {
        base.date_from = user.date_from.clone();
    }
    if user.date_to.is_some() {
        base.date_to = user.date_to.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consulta_core::{MetadataFilter, SourceKind, Urgency};

    #[test]
    fn test_merge_filters_user_wins() {
        let mut base = MetadataFilter {
            patient_name: Some("Pepito".to_string()),
            ..Default::default()
        };
        let user = MetadataFilter {
            patient_name: Some("Ana".to_string()),
            urgency: Some(Urgency::High),
            source_kind: Some(SourceKind::Document),
            ..Default::default()
        };
        merge_filters(&mut base, &user);
        assert_eq!(base.patient_name.as_deref(), Some("Ana"));
        assert_eq!(base.urgency, Some(Urgency::High));
        assert_eq!(base.source_kind, Some(SourceKind::Document));
    }

    #[test]
    fn test_merge_filters_keeps_base_when_user_empty() {
        let mut base = MetadataFilter {
            diagnosis: Some("diabetes".to_string()),
            ..Default::default()
        };
        merge_filters(&mut base, &MetadataFilter::default());
        assert_eq!(base.diagnosis.as_deref(), Some("diabetes"));
    }
}
