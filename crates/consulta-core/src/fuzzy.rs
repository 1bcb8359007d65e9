//! Fuzzy patient-name scoring.
//!
//! Both sides are normalized (lowercase, diacritics stripped, whitespace
//! collapsed); an exact normalized match scores 1.0, otherwise a weighted
//! token Jaccard with bonuses for token-order agreement and query
//! completeness, penalized for extra candidate tokens.

/// Strip Spanish diacritics and lowercase a single char.
fn fold_char(c: char) -> char {
    match c.to_lowercase().next().unwrap_or(c) {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

/// Normalize a name for comparison: lowercase, strip diacritics, collapse
/// whitespace.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.chars().map(fold_char).collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Score how well `candidate` matches the queried `name`, in [0, 1].
///
/// 1.0 on exact normalized match. Otherwise token Jaccard, +0.10 when the
/// shared tokens appear in the same relative order, +0.10 when every query
/// token is present in the candidate, −0.05 per extra candidate token
/// (capped at 0.15).
pub fn fuzzy_name_score(name: &str, candidate: &str) -> f32 {
    let a = normalize_name(name);
    let b = normalize_name(candidate);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a_tokens: Vec<&str> = a.split(' ').collect();
    let b_tokens: Vec<&str> = b.split(' ').collect();

    let shared: Vec<&str> = a_tokens
        .iter()
        .filter(|t| b_tokens.contains(t))
        .copied()
        .collect();
    if shared.is_empty() {
        return 0.0;
    }

    let union = {
        let mut all: Vec<&str> = a_tokens.clone();
        for t in &b_tokens {
            if !all.contains(t) {
                all.push(t);
            }
        }
        all.len()
    };
    let mut score = shared.len() as f32 / union as f32;

    // Order agreement: shared tokens occur in the same relative order.
    let order_a: Vec<usize> = shared
        .iter()
        .filter_map(|t| a_tokens.iter().position(|x| x == t))
        .collect();
    let order_b: Vec<usize> = shared
        .iter()
        .filter_map(|t| b_tokens.iter().position(|x| x == t))
        .collect();
    let in_order = order_a.windows(2).all(|w| w[0] < w[1])
        && order_b.windows(2).all(|w| w[0] < w[1]);
    if in_order {
        score += 0.10;
    }

    // Completeness: every query token found in the candidate.
    if a_tokens.iter().all(|t| b_tokens.contains(t)) {
        score += 0.10;
    }

    // Extra candidate tokens dilute the match.
    let extra = b_tokens.len().saturating_sub(shared.len());
    score -= (0.05 * extra as f32).min(0.15);

    score.clamp(0.0, 1.0)
}

/// Whether `candidate` matches `name` at the given threshold.
pub fn is_fuzzy_match(name: &str, candidate: &str, threshold: f32) -> bool {
    fuzzy_name_score(name, candidate) >= threshold
}
