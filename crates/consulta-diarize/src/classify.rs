//! Speaker classification: text scoring, cluster-to-role resolution, and the
//! hybrid decision rule.

use consulta_core::Speaker;

use crate::patterns::{
    has_unambiguous_pattern, PATIENT_KEYWORDS, PATIENT_PATTERNS, PROFESSIONAL_KEYWORDS,
    PROMOTOR_PATTERNS,
};

/// Decision thresholds on the combined score.
pub const DECISION_THRESHOLD: f64 = 0.2;

/// Confidence bonus when an unambiguous pattern is present.
pub const PATTERN_BONUS: f64 = 0.2;

/// Confidence cap when only text evidence is available.
pub const TEXT_ONLY_CONFIDENCE_CAP: f64 = 0.8;

/// Score text evidence in [-1, +1]: positive leans promoter, negative leans
/// patient. Pattern hits weigh 1.0, keyword hits 0.5; normalized by total
/// hits.
pub fn text_score(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();

    let mut promotor = 0f64;
    let mut patient = 0f64;

    for pattern in PROMOTOR_PATTERNS.iter() {
        if pattern.is_match(&lower) {
            promotor += 1.0;
        }
    }
    for pattern in PATIENT_PATTERNS.iter() {
        if pattern.is_match(&lower) {
            patient += 1.0;
        }
    }
    for keyword in PROFESSIONAL_KEYWORDS {
        if lower.contains(keyword) {
            promotor += 0.5;
        }
    }
    for keyword in PATIENT_KEYWORDS {
        if lower.contains(keyword) {
            patient += 0.5;
        }
    }

    let total = promotor + patient;
    if total == 0.0 {
        return 0.0;
    }
    (promotor - patient) / total
}

/// Resolve which audio cluster plays which role.
///
/// The mapping is NOT assumed from pitch; it is chosen to maximize
/// sign-agreement between per-segment cluster votes and text scores.
/// Returns the audio score (+1 promoter / -1 patient) for cluster 0; cluster
/// 1 gets the opposite sign.
pub fn resolve_cluster_role(clusters: &[usize], text_scores: &[f64]) -> f64 {
    // Hypothesis A: cluster 0 → promoter (+1). Hypothesis B: the inverse.
    let mut agreement_a = 0f64;
    for (cluster, score) in clusters.iter().zip(text_scores.iter()) {
        let audio = if *cluster == 0 { 1.0 } else { -1.0 };
        agreement_a += audio * score;
    }
    if agreement_a >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Combine audio and text evidence into a speaker decision.
pub fn classify_hybrid(
    audio_score: f64,
    text_score: f64,
    text: &str,
    audio_weight: f64,
    text_weight: f64,
) -> (Speaker, f64) {
    let combined = audio_weight * audio_score + text_weight * text_score;
    decide(combined, text, None)
}

/// Text-only decision; confidence is capped because half the evidence is
/// missing.
pub fn classify_text_only(text: &str) -> (Speaker, f64) {
    let combined = text_score(text);
    decide(combined, text, Some(TEXT_ONLY_CONFIDENCE_CAP))
}

fn decide(combined: f64, text: &str, cap: Option<f64>) -> (Speaker, f64) {
    let speaker = if combined > DECISION_THRESHOLD {
        Speaker::Promotor
    } else if combined < -DECISION_THRESHOLD {
        Speaker::Patient
    } else {
        Speaker::Unknown
    };

    let bonus = if has_unambiguous_pattern(&text.to_lowercase()) {
        PATTERN_BONUS
    } else {
        0.0
    };
    let mut confidence = (combined.abs() + bonus).min(1.0);
    if let Some(cap) = cap {
        confidence = confidence.min(cap);
    }
    (speaker, confidence)
}
