//! Closed medical lexicon for entity extraction over normalized (accent-
//! stripped, lowercase) query text.

/// Canonical condition → synonyms, all in normalized form.
pub static CONDITION_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "diabetes",
        &["diabetes", "diabetico", "diabetica", "glucosa", "azucar", "insulina"],
    ),
    (
        "hipertension",
        &["hipertension", "presion alta", "presion arterial", "hipertenso"],
    ),
    ("asma", &["asma", "asmatico", "bronquial", "respiratorio"]),
    (
        "migrana",
        &["migrana", "jaqueca", "dolor de cabeza", "cefalea"],
    ),
    ("covid", &["covid", "coronavirus", "sars-cov-2", "pandemia"]),
    ("gripe", &["gripe", "influenza", "resfriado", "catarro"]),
    ("cancer", &["cancer", "tumor", "oncologico"]),
];

/// Recognized symptom keywords.
pub static SYMPTOM_KEYWORDS: &[&str] = &[
    "dolor",
    "fiebre",
    "tos",
    "mareos",
    "nausea",
    "vomito",
    "diarrea",
    "estrenimiento",
    "fatiga",
    "cansancio",
    "debilidad",
];

/// Recognized medication names.
pub static MEDICATION_KEYWORDS: &[&str] = &[
    "metformina",
    "insulina",
    "ibuprofeno",
    "paracetamol",
    "amoxicilina",
    "losartan",
    "omeprazol",
    "aspirina",
    "salbutamol",
];

/// Spanish stopwords plus question/command openers that start capitalized
/// in a query and must not be mistaken for patient names.
pub static STOPWORDS: &[&str] = &[
    "a", "al", "como", "con", "cual", "cuales", "cuando", "cuanta", "cuantas", "cuanto",
    "cuantos", "de", "del", "dime", "donde", "el", "ella", "en", "enfermedad", "es", "esta",
    "fue", "hay", "informacion", "la", "las", "lista", "listame", "lo", "los", "me", "muestra",
    "muestrame", "o", "para", "paciente", "pacientes", "por", "que", "quien", "quienes", "se",
    "sobre", "son", "su", "tiene", "tienen", "ultima", "ultimo", "un", "una", "y",
];

/// Whether a normalized token is a stopword.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Canonical conditions whose synonyms occur in the normalized query.
pub fn find_conditions(normalized: &str) -> Vec<String> {
    let mut found = Vec::new();
    for (canonical, synonyms) in CONDITION_SYNONYMS {
        if synonyms.iter().any(|s| normalized.contains(s)) && !found.contains(&canonical.to_string())
        {
            found.push(canonical.to_string());
        }
    }
    found
}

/// Synonyms for a canonical condition (for query expansion).
pub fn synonyms_for(condition: &str) -> &'static [&'static str] {
    CONDITION_SYNONYMS
        .iter()
        .find(|(canonical, _)| *canonical == condition)
        .map(|(_, synonyms)| *synonyms)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_conditions_by_synonym() {
        assert_eq!(find_conditions("paciente con presion alta"), vec!["hipertension"]);
        assert_eq!(find_conditions("tiene glucosa elevada"), vec!["diabetes"]);
        assert!(find_conditions("sin condiciones").is_empty());
    }

    #[test]
    fn test_find_conditions_no_duplicates() {
        let found = find_conditions("diabetes diabetico glucosa");
        assert_eq!(found, vec!["diabetes"]);
    }

    #[test]
    fn test_stopwords() {
        assert!(is_stopword("que"));
        assert!(is_stopword("listame"));
        assert!(!is_stopword("pepito"));
    }

    #[test]
    fn test_synonyms_for() {
        assert!(synonyms_for("diabetes").contains(&"glucosa"));
        assert!(synonyms_for("desconocida").is_empty());
    }

    #[test]
    fn test_lexicon_is_normalized() {
        for (canonical, synonyms) in CONDITION_SYNONYMS {
            for term in std::iter::once(canonical).chain(synonyms.iter()) {
                assert_eq!(
                    *term,
                    term.to_lowercase(),
                    "lexicon entries must be lowercase"
                );
                assert!(
                    !term.chars().any(|c| "áéíóúñ".contains(c)),
                    "lexicon entries must be accent-free: {}",
                    term
                );
            }
        }
    }
}
