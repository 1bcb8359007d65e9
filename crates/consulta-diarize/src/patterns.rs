//! Spanish clinical-dialogue pattern and keyword sets for speaker
//! classification.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern must compile"))
        .collect()
}

/// Phrases typical of the health promoter (interviewer).
pub static PROMOTOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"buenos días|buenas tardes|hola",
        r"¿cómo se siente|¿cómo está|¿qué le pasa",
        r"vamos a revisar|le voy a|necesito que",
        r"¿desde cuándo|¿cuánto tiempo|¿con qué frecuencia",
        r"voy a recetarle|le recomiendo|debe tomar",
        r"¿tiene alguna alergia|¿toma algún medicamento",
        r"doctor|doctora|médico|enfermero|enfermera",
    ])
});

/// Phrases typical of the patient (interviewee).
pub static PATIENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"me duele|me siento|tengo dolor",
        r"desde hace|hace como|hace unos",
        r"no puedo|no me deja|me impide",
        r"sí doctor|no doctor|gracias doctor",
        r"tomo|estoy tomando|me tomo",
        r"mi familia|mi trabajo|en casa",
    ])
});

/// Medical-professional vocabulary, weighted half a pattern hit.
pub static PROFESSIONAL_KEYWORDS: &[&str] = &[
    "diagnóstico",
    "tratamiento",
    "medicamento",
    "receta",
    "examen",
    "análisis",
    "síntoma",
    "presión",
    "temperatura",
    "auscultar",
    "palpar",
    "revisar",
    "prescribir",
    "recetar",
];

/// Personal/daily-life vocabulary typical of the patient. "síntoma" is on
/// both lists, so a hit there cancels out in the score but still counts as
/// evidence mass.
pub static PATIENT_KEYWORDS: &[&str] = &[
    "dolor",
    "malestar",
    "molestia",
    "síntoma",
    "siento",
    "familia",
    "trabajo",
    "casa",
    "dormir",
    "comer",
];

/// How many leading patterns count as "unambiguous" for the confidence bonus.
pub const UNAMBIGUOUS_PATTERN_COUNT: usize = 3;

/// Whether the text hits one of the strongest promoter or patient patterns.
pub fn has_unambiguous_pattern(text_lower: &str) -> bool {
    PROMOTOR_PATTERNS
        .iter()
        .take(UNAMBIGUOUS_PATTERN_COUNT)
        .any(|p| p.is_match(text_lower))
        || PATIENT_PATTERNS
            .iter()
            .take(UNAMBIGUOUS_PATTERN_COUNT)
            .any(|p| p.is_match(text_lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert_eq!(PROMOTOR_PATTERNS.len(), 7);
        assert_eq!(PATIENT_PATTERNS.len(), 6);
    }

    #[test]
    fn test_promotor_greeting_matches() {
        assert!(PROMOTOR_PATTERNS[0].is_match("buenos días, pase adelante"));
        assert!(PROMOTOR_PATTERNS[1].is_match("¿cómo se siente hoy?"));
    }

    #[test]
    fn test_patient_complaint_matches() {
        assert!(PATIENT_PATTERNS[0].is_match("me duele mucho la cabeza"));
        assert!(PATIENT_PATTERNS[1].is_match("desde hace tres días"));
    }

    #[test]
    fn test_unambiguous_detection() {
        assert!(has_unambiguous_pattern("buenos días"));
        assert!(has_unambiguous_pattern("me duele la espalda"));
        assert!(!has_unambiguous_pattern("el clima está agradable"));
    }

    #[test]
    fn test_sintoma_counts_for_both_roles() {
        assert!(PROFESSIONAL_KEYWORDS.contains(&"síntoma"));
        assert!(PATIENT_KEYWORDS.contains(&"síntoma"));
    }
}
