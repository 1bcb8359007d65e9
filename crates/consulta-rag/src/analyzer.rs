//! Query analysis: normalization, intent detection, entity extraction, and
//! search-term generation.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use consulta_core::{Entities, Intent, MetadataFilter, QueryPlan};

use crate::lexicon;

/// Maximum search terms kept on a plan.
const MAX_SEARCH_TERMS: usize = 10;

/// Ordered intent rules; the first matching pattern wins. Symptom-specific
/// rules come before the generic "pacientes con …" shape so symptom queries
/// are not swallowed by the condition-list intent.
static INTENT_RULES: Lazy<Vec<(Intent, Regex)>> = Lazy::new(|| {
    let rules: &[(Intent, &str)] = &[
        (
            Intent::PatientInfo,
            r"que\s.*(enfermedad|diagnostico|tiene|padece|le pasa)",
        ),
        (Intent::PatientInfo, r"informacion\s+(del?\s+)?paciente"),
        (
            Intent::SymptomSearch,
            r"quien(es)?\s.*(dolor|sintoma|molestia|fiebre|tos|mareos)",
        ),
        (
            Intent::SymptomSearch,
            r"pacientes\s+con\s+(dolor|sintoma|molestia|fiebre|tos|mareos|nausea)",
        ),
        (Intent::ConditionList, r"lista\w*\s.*pacientes"),
        (Intent::ConditionList, r"quienes\s+(tienen|padecen)"),
        (Intent::ConditionList, r"cuantos\s+pacientes"),
        (Intent::ConditionList, r"pacientes\s+(con|que\s+tienen)\s+\w+"),
        (
            Intent::MedicationInfo,
            r"que\s+(medicamento|medicina|tratamiento)\w*\s.*toma",
        ),
        (Intent::MedicationInfo, r"medicamentos?\s+para"),
        (Intent::MedicationInfo, r"tratamiento\s+de"),
        (
            Intent::TemporalQuery,
            r"(ayer|hoy|semana\s+pasada|mes\s+pasado).*paciente",
        ),
        (Intent::TemporalQuery, r"ultima\s+consulta"),
        (Intent::TemporalQuery, r"cuando\s+fue"),
    ];
    rules
        .iter()
        .map(|(intent, pattern)| {
            (
                *intent,
                Regex::new(pattern).expect("static pattern must compile"),
            )
        })
        .collect()
});

static TEMPORAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(ayer|hoy|manana)\b",
        r"\b(semana|mes|ano)\s+(pasada|pasado|anterior)\b",
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"\b\d{1,2}/\d{1,2}/\d{4}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern must compile"))
    .collect()
});

/// Analyzer turning raw queries into retrieval plans.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a raw query into a [`QueryPlan`].
    pub fn analyze(&self, raw: &str) -> QueryPlan {
        let normalized = normalize_query(raw);
        let intent = detect_intent(&normalized);
        let entities = extract_entities(raw, &normalized);
        let search_terms = build_search_terms(&normalized, &entities);
        let filters = build_filters(intent, &entities);

        debug!(
            query = raw,
            intent = %intent,
            entity_count = entities.total(),
            "Query analyzed"
        );

        QueryPlan {
            raw_query: raw.to_string(),
            normalized,
            intent,
            entities,
            filters,
            search_terms,
        }
    }
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' => 'a',
        'é' | 'è' | 'ë' => 'e',
        'í' | 'ì' | 'ï' => 'i',
        'ó' | 'ò' | 'ö' => 'o',
        'ú' | 'ù' | 'ü' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

/// Lowercase, strip diacritics, drop punctuation, collapse whitespace.
pub fn normalize_query(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .map(fold_char)
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '/' {
                c
            } else {
                ' '
            }
        })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn detect_intent(normalized: &str) -> Intent {
    for (intent, pattern) in INTENT_RULES.iter() {
        if pattern.is_match(normalized) {
            return *intent;
        }
    }
    Intent::GeneralQuery
}

/// Extract entities. Patient names come from the raw query (capitalized
/// token runs survive there; the normalized form is caseless), everything
/// else from the normalized query via the closed lexicon.
fn extract_entities(raw: &str, normalized: &str) -> Entities {
    let mut entities = Entities {
        conditions: lexicon::find_conditions(normalized),
        ..Default::default()
    };

    entities.patients = extract_patient_names(raw);

    for symptom in lexicon::SYMPTOM_KEYWORDS {
        if normalized.contains(symptom) && !entities.symptoms.iter().any(|s| s == symptom) {
            entities.symptoms.push(symptom.to_string());
        }
    }

    for medication in lexicon::MEDICATION_KEYWORDS {
        if normalized.contains(medication) && !entities.medications.iter().any(|m| m == medication)
        {
            entities.medications.push(medication.to_string());
        }
    }

    for pattern in TEMPORAL_PATTERNS.iter() {
        for m in pattern.find_iter(normalized) {
            let text = m.as_str().to_string();
            if !entities.dates.contains(&text) {
                entities.dates.push(text);
            }
        }
    }

    entities
}

/// Capitalized token runs from the raw query, minus stopword tokens
/// (question openers are capitalized too).
fn extract_patient_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    let flush = |run: &mut Vec<&str>, names: &mut Vec<String>| {
        let kept: Vec<&str> = run
            .iter()
            .filter(|token| {
                let folded: String = token.to_lowercase().chars().map(fold_char).collect();
                !lexicon::is_stopword(&folded)
            })
            .copied()
            .collect();
        if !kept.is_empty() {
            let name = kept.join(" ");
            if name.chars().count() > 2 && !names.contains(&name) {
                names.push(name);
            }
        }
        run.clear();
    };

    for word in raw.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        let capitalized = chars
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
            && chars.all(|c| c.is_lowercase());
        if capitalized {
            run.push(word);
        } else {
            flush(&mut run, &mut names);
        }
    }
    flush(&mut run, &mut names);
    names
}

/// Entities ∪ residual non-stopword tokens, capped.
fn build_search_terms(normalized: &str, entities: &Entities) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: String| {
        if term.chars().count() > 2 && !terms.contains(&term) && terms.len() < MAX_SEARCH_TERMS {
            terms.push(term);
        }
    };

    for patient in &entities.patients {
        push(normalize_query(patient));
    }
    for condition in &entities.conditions {
        push(condition.clone());
        for synonym in lexicon::synonyms_for(condition).iter().take(3) {
            push(synonym.to_string());
        }
    }
    for symptom in &entities.symptoms {
        push(symptom.clone());
    }
    for medication in &entities.medications {
        push(medication.clone());
    }
    for token in normalized.split(' ') {
        if !lexicon::is_stopword(token) {
            push(token.to_string());
        }
    }
    terms
}

fn build_filters(intent: Intent, entities: &Entities) -> MetadataFilter {
    let mut filters = MetadataFilter::default();
    if intent == Intent::PatientInfo && entities.patients.len() == 1 {
        filters.patient_name = Some(entities.patients[0].clone());
    }
    if intent == Intent::ConditionList {
        if let Some(condition) = entities.conditions.first() {
            filters.diagnosis = Some(condition.clone());
        }
    }
    filters
}
