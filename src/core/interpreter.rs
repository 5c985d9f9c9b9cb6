use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::vocabulary::mentioned_terms;
use crate::models::domain::{ATTR_BATHROOMS, ATTR_BEDROOMS, ATTR_PRICE, ATTR_SQUARE_FEET};
use crate::models::{BuyerProfile, Constraint, Preference};
use crate::services::embedding::{EmbeddingError, EmbeddingService};

/// Errors that abort interpretation of a buyer request
#[derive(Debug, Error)]
pub enum InterpretationError {
    #[error("Buyer statement is empty")]
    EmptyInput,

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Preference vector has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Turns a free-text buyer statement plus optional explicit constraints into
/// a [`BuyerProfile`] with a preference vector.
pub struct PreferenceInterpreter {
    embedder: Arc<dyn EmbeddingService>,
    dimensions: usize,
    timeout: Duration,
}

impl PreferenceInterpreter {
    pub fn new(embedder: Arc<dyn EmbeddingService>, dimensions: usize, timeout: Duration) -> Self {
        Self {
            embedder,
            dimensions,
            timeout,
        }
    }

    /// Build a profile for one request
    ///
    /// Caller-supplied constraints are copied verbatim as explicit preferences.
    /// Numeric requirements stated in the text only fill attributes the caller
    /// left unconstrained.
    pub async fn interpret(
        &self,
        statement: &str,
        explicit: &BTreeMap<String, Constraint>,
    ) -> Result<BuyerProfile, InterpretationError> {
        if statement.trim().is_empty() {
            return Err(InterpretationError::EmptyInput);
        }

        let preferences = build_preferences(statement, explicit);
        let summary = summarize(statement, &preferences);
        tracing::debug!(summary = %summary, "Interpreted buyer statement");

        let vector = tokio::time::timeout(self.timeout, self.embedder.embed(&summary))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))??;

        if vector.len() != self.dimensions {
            return Err(InterpretationError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        Ok(BuyerProfile {
            statement: statement.to_string(),
            preferences,
            vector,
        })
    }
}

/// Merge explicit, text-stated and inferred preferences
pub fn build_preferences(
    statement: &str,
    explicit: &BTreeMap<String, Constraint>,
) -> BTreeMap<String, Preference> {
    let mut preferences: BTreeMap<String, Preference> = explicit
        .iter()
        .map(|(name, c)| (name.clone(), Preference::Explicit(c.clone())))
        .collect();

    for (name, constraint) in parse_stated_constraints(statement) {
        preferences
            .entry(name)
            .or_insert(Preference::Explicit(constraint));
    }

    let terms = mentioned_terms(statement);
    let total: usize = terms.iter().map(|(_, n)| n).sum();
    for (term, count) in terms {
        preferences
            .entry(term.to_string())
            .or_insert(Preference::Inferred(count as f32 / total as f32));
    }

    preferences
}

/// Normalized text handed to the embedding service
///
/// Lower-cased, whitespace-collapsed statement followed by the explicit
/// constraints in attribute order, so identical inputs embed identically.
pub fn summarize(statement: &str, preferences: &BTreeMap<String, Preference>) -> String {
    let mut summary = statement
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");

    for (name, pref) in preferences {
        if let Preference::Explicit(constraint) = pref {
            summary.push_str(&format!("; {}: {}", name, constraint));
        }
    }
    summary
}

struct StatedPatterns {
    bedrooms: Regex,
    bathrooms: Regex,
    budget: Regex,
    area: Regex,
}

/// Optional upper-bound wording in front of a room count
const ROOM_BOUND: &str =
    r"(?:(?P<bound>max(?:imum)?|at\s+most|no\s+more\s+than|up\s+to|under|fewer\s+than|less\s+than)\s+)?";

/// Optional "+", "or more" or "or fewer" between a room count and its noun
const ROOM_TAIL: &str = r"\s*(?P<tail>\+|or\s+(?:more|fewer|less))?";

static PATTERNS: Lazy<StatedPatterns> = Lazy::new(|| StatedPatterns {
    bedrooms: Regex::new(&format!(
        r"(?i)\b{}(?P<count>\d+){}\s*-?\s*(?:bed(?:room)?s?|br|bd)\b",
        ROOM_BOUND, ROOM_TAIL
    ))
    .expect("valid bedrooms regex"),
    bathrooms: Regex::new(&format!(
        r"(?i)\b{}(?P<count>\d+(?:\.\d+)?){}\s*-?\s*(?:bath(?:room)?s?|ba)\b",
        ROOM_BOUND, ROOM_TAIL
    ))
    .expect("valid bathrooms regex"),
    budget: Regex::new(
        r"(?i)\b(budget(?:\s+of)?|under|below|max(?:imum)?|up\s+to|no\s+more\s+than|less\s+than)\s*:?\s*(\$)?\s*(\d+(?:[.,]\d+)*)\s*(k|m|million|thousand)?\b",
    )
    .expect("valid budget regex"),
    area: Regex::new(
        r"(?i)\b(?:at\s+least|min(?:imum)?|over)\s+(\d[\d,]*)\s*(?:sq\.?\s*ft\.?|square\s+feet|sqft)",
    )
    .expect("valid area regex"),
});

/// Turn a matched room count into a bound
///
/// Counts are minimums unless worded as a ceiling. Strict ceilings ("under 3",
/// "fewer than 3") step down by `step`, the smallest countable unit.
fn room_constraint(caps: &Captures<'_>, step: f64) -> Option<Constraint> {
    let n: f64 = caps.name("count")?.as_str().parse().ok()?;
    let bound = caps.name("bound").map(|m| m.as_str().to_lowercase());
    let tail = caps.name("tail").map(|m| m.as_str().to_lowercase());

    let constraint = match (bound.as_deref(), tail.as_deref()) {
        (Some(b), _) if b.starts_with("under") || b.starts_with("fewer") || b.starts_with("less") => {
            Constraint::at_most((n - step).max(0.0))
        }
        (Some(_), _) => Constraint::at_most(n),
        (None, Some(t)) if t.ends_with("fewer") || t.ends_with("less") => Constraint::at_most(n),
        _ => Constraint::at_least(n),
    };
    Some(constraint)
}

/// Parse an amount like `500`, `1.2`, `480,000` with an optional multiplier
pub fn parse_amount(digits: &str, multiplier: Option<&str>) -> Option<f64> {
    let base: f64 = digits.replace(',', "").parse().ok()?;
    let factor = match multiplier.map(|m| m.to_lowercase()) {
        Some(m) if m == "k" || m == "thousand" => 1_000.0,
        Some(m) if m == "m" || m == "million" => 1_000_000.0,
        _ => 1.0,
    };
    Some(base * factor)
}

/// Hard numeric requirements phrased in the buyer text
///
/// "3+ bedrooms", "2 baths", "budget $500k", "under $450,000",
/// "at least 1,800 sq ft". Room counts are minimums unless phrased as a
/// ceiling ("at most 2 bedrooms", "2 or fewer baths").
pub fn parse_stated_constraints(statement: &str) -> BTreeMap<String, Constraint> {
    let p = &*PATTERNS;
    let mut constraints = BTreeMap::new();

    if let Some(c) = p.bedrooms.captures(statement).and_then(|c| room_constraint(&c, 1.0)) {
        constraints.insert(ATTR_BEDROOMS.to_string(), c);
    }

    if let Some(c) = p.bathrooms.captures(statement).and_then(|c| room_constraint(&c, 0.5)) {
        constraints.insert(ATTR_BATHROOMS.to_string(), c);
    }

    for caps in p.budget.captures_iter(statement) {
        let keyword = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let has_dollar = caps.get(2).is_some();
        let suffix = caps.get(4).map(|m| m.as_str());
        let Some(amount) = caps.get(3).and_then(|m| parse_amount(m.as_str(), suffix)) else {
            continue;
        };
        // "under 3 bedrooms" is not a price
        let looks_like_price = keyword.starts_with("budget") || has_dollar || suffix.is_some();
        if looks_like_price && amount >= 1_000.0 {
            constraints.insert(ATTR_PRICE.to_string(), Constraint::at_most(amount));
            break;
        }
    }

    if let Some(n) = p
        .area
        .captures(statement)
        .and_then(|c| parse_amount(c.get(1)?.as_str(), None))
    {
        constraints.insert(ATTR_SQUARE_FEET.to_string(), Constraint::at_least(n));
    }

    constraints
}
