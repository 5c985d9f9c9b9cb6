use regex::Regex;
use once_cell::sync::Lazy;

/// Terms that describe checkable facts about a property. A narrative may only
/// use one of these when the listing actually has it.
pub const FEATURE_TERMS: &[&str] = &[
    "quiet",
    "walkable",
    "pool",
    "garage",
    "garden",
    "yard",
    "fireplace",
    "waterfront",
    "balcony",
    "basement",
    "patio",
    "gym",
    "renovated",
    "hardwood",
    "solar",
    "pet-friendly",
    "cul-de-sac",
];

/// Tone words a buyer may use; they steer ranking but are never fact-checked
pub const STYLE_TERMS: &[&str] = &[
    "cozy",
    "spacious",
    "modern",
    "bright",
    "charming",
    "sunny",
    "luxury",
    "historic",
    "family-friendly",
    "private",
];

static TERM_REGEXES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FEATURE_TERMS
        .iter()
        .chain(STYLE_TERMS.iter())
        .filter_map(|term| {
            let pattern = format!(r"(?i)\b{}s?\b", regex::escape(term));
            Regex::new(&pattern).ok().map(|re| (*term, re))
        })
        .collect()
});

/// Count whole-word mentions of `term` (plural tolerated)
pub fn mentions(text: &str, term: &str) -> usize {
    TERM_REGEXES
        .iter()
        .find(|(t, _)| *t == term)
        .map(|(_, re)| re.find_iter(text).count())
        .unwrap_or_else(|| {
            let lower = text.to_lowercase();
            lower.matches(&term.to_lowercase()).count()
        })
}

/// Vocabulary terms (feature or style) mentioned in `text`, with counts
pub fn mentioned_terms(text: &str) -> Vec<(&'static str, usize)> {
    TERM_REGEXES
        .iter()
        .filter_map(|(term, re)| {
            let count = re.find_iter(text).count();
            (count > 0).then_some((*term, count))
        })
        .collect()
}

pub fn is_feature_term(term: &str) -> bool {
    FEATURE_TERMS.contains(&term)
}

/// Lower-case, treat `_` as `-` and drop a trailing plural "s", so "Gardens"
/// matches "garden" and a `pet_friendly` flag matches "pet-friendly"
pub fn normalize_term(term: &str) -> String {
    let lower = term.trim().to_lowercase().replace('_', "-");
    match lower.strip_suffix('s') {
        Some(stem) if stem.len() > 2 => stem.to_string(),
        _ => lower,
    }
}
