//! Strategy-driven retrieval over the vector index, context ranking, and
//! excerpt building.

use std::sync::Arc;

use tracing::debug;

use consulta_core::defaults::{EXCERPT_MAX_CHARS, SEARCH_MIN_SCORE};
use consulta_core::{
    EmbeddingBackend, Entities, Intent, NameMatch, QueryPlan, RankedContext, Result, VectorHit,
    VectorIndex,
};

/// Ranker bonus weights.
const PATIENT_BONUS: f32 = 0.10;
const CONDITION_BONUS: f32 = 0.15;
const SYMPTOM_BONUS: f32 = 0.05;
const RECENCY_BONUS: f32 = 0.02;

/// Strategy-dispatching retriever.
pub struct Retriever {
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl Retriever {
    pub fn new(vectors: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { vectors, embedder }
    }

    /// Retrieve and rank contexts for an analyzed query.
    pub async fn retrieve(&self, plan: &QueryPlan, max_results: usize) -> Result<Vec<RankedContext>> {
        let hits = match (plan.intent, plan.entities.patients.first(), plan.entities.conditions.first())
        {
            (Intent::PatientInfo, Some(patient), _) => {
                self.vectors
                    .search_by_patient(patient, NameMatch::Fuzzy, max_results)
                    .await?
            }
            (Intent::ConditionList, _, Some(condition)) => {
                self.search_by_condition(condition, max_results).await?
            }
            _ => {
                let query_text = if plan.search_terms.is_empty() {
                    plan.normalized.clone()
                } else {
                    plan.search_terms[..plan.search_terms.len().min(3)].join(" ")
                };
                let query_vec = self.embedder.embed(&query_text).await?;
                self.vectors
                    .search(&query_vec, max_results, &plan.filters, Some(SEARCH_MIN_SCORE))
                    .await?
            }
        };

        debug!(
            intent = %plan.intent,
            hit_count = hits.len(),
            "Retrieval completed"
        );

        Ok(rank_contexts(hits, plan))
    }

    /// Semantic search for a condition, post-filtered so the condition token
    /// really appears in the hit, then grouped one-per-patient.
    async fn search_by_condition(
        &self,
        condition: &str,
        max_results: usize,
    ) -> Result<Vec<VectorHit>> {
        let query_vec = self
            .embedder
            .embed(&format!("diagnóstico {} enfermedad", condition))
            .await?;
        // Over-fetch, then filter and group.
        let hits = self
            .vectors
            .search(
                &query_vec,
                max_results * 2,
                &Default::default(),
                Some(SEARCH_MIN_SCORE),
            )
            .await?;

        let needle = condition.to_lowercase();
        let mut seen_patients: Vec<String> = Vec::new();
        let mut grouped = Vec::new();
        for hit in hits {
            let meta = &hit.entry.metadata;
            let in_diagnosis = meta
                .diagnosis
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            let in_symptoms = meta
                .symptoms
                .as_deref()
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false);
            let in_payload = hit.entry.payload_text.to_lowercase().contains(&needle);
            if !(in_diagnosis || in_symptoms || in_payload) {
                continue;
            }

            let patient_key = meta
                .patient_name
                .as_deref()
                .map(consulta_core::normalize_name)
                .unwrap_or_else(|| hit.entry.vector_id.clone());
            if seen_patients.contains(&patient_key) {
                continue;
            }
            seen_patients.push(patient_key);
            grouped.push(hit);
            if grouped.len() >= max_results {
                break;
            }
        }
        Ok(grouped)
    }
}

/// Apply the uniform ranker, order, and build excerpts.
pub fn rank_contexts(hits: Vec<VectorHit>, plan: &QueryPlan) -> Vec<RankedContext> {
    let mut contexts: Vec<RankedContext> = hits
        .into_iter()
        .map(|hit| {
            let haystack = hit.entry.payload_text.to_lowercase();
            let mut score = hit.similarity;

            if plan
                .entities
                .patients
                .iter()
                .any(|p| haystack.contains(&p.to_lowercase()))
            {
                score += PATIENT_BONUS;
            }
            if plan
                .entities
                .conditions
                .iter()
                .any(|c| haystack.contains(&c.to_lowercase()))
            {
                score += CONDITION_BONUS;
            }
            if plan
                .entities
                .symptoms
                .iter()
                .any(|s| haystack.contains(&s.to_lowercase()))
            {
                score += SYMPTOM_BONUS;
            }
            if hit.entry.metadata.date.is_some() {
                score += RECENCY_BONUS;
            }

            let excerpt = build_excerpt(&hit.entry.payload_text, &plan.entities);

            RankedContext {
                vector_id: hit.entry.vector_id,
                source_kind: hit.entry.source_kind,
                source_id: hit.entry.source_id,
                patient_name: hit.entry.metadata.patient_name,
                diagnosis: hit.entry.metadata.diagnosis,
                symptoms: hit.entry.metadata.symptoms,
                date: hit.entry.metadata.date,
                payload_text: hit.entry.payload_text,
                similarity: hit.similarity,
                final_score: score.clamp(0.0, 1.0),
                excerpt,
            }
        })
        .collect();

    contexts.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
    contexts
}

/// Window of up to 300 characters centered on the first entity-token hit,
/// else the head of the payload.
pub fn build_excerpt(payload: &str, entities: &Entities) -> String {
    let haystack = payload.to_lowercase();
    let tokens = entities
        .patients
        .iter()
        .chain(entities.conditions.iter())
        .chain(entities.symptoms.iter())
        .chain(entities.medications.iter());

    let mut first_hit: Option<usize> = None;
    for token in tokens {
        if let Some(byte_pos) = haystack.find(&token.to_lowercase()) {
            let char_pos = haystack[..byte_pos].chars().count();
            first_hit = Some(match first_hit {
                Some(existing) => existing.min(char_pos),
                None => char_pos,
            });
        }
    }

    let chars: Vec<char> = payload.chars().collect();
    if chars.len() <= EXCERPT_MAX_CHARS {
        return payload.to_string();
    }

    let center = first_hit.unwrap_or(0);
    let half = EXCERPT_MAX_CHARS / 2;
    let start = center.saturating_sub(half);
    let end = (start + EXCERPT_MAX_CHARS).min(chars.len());
    let start = end.saturating_sub(EXCERPT_MAX_CHARS);

    let mut excerpt: String = chars[start..end].iter().collect();
    if start > 0 {
        excerpt = format!("…{}", excerpt);
    }
    if end < chars.len() {
        excerpt.push('…');
    }
    excerpt
}
