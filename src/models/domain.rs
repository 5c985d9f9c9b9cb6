use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Well-known listing attribute names
pub const ATTR_PRICE: &str = "price";
pub const ATTR_BEDROOMS: &str = "bedrooms";
pub const ATTR_BATHROOMS: &str = "bathrooms";
pub const ATTR_SQUARE_FEET: &str = "square_feet";
pub const ATTR_LOCATION: &str = "location";
pub const ATTR_YEAR_BUILT: &str = "year_built";
pub const ATTR_AMENITIES: &str = "amenities";

/// Typed value of a single listing attribute
///
/// Serialized untagged so a listing feed can send plain JSON values:
/// `true`, `4`, `2.5`, `"Green Valley"`, `["pool", "garage"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Tags(BTreeSet<String>),
}

impl AttributeValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tags(&self) -> Option<&BTreeSet<String>> {
        match self {
            AttributeValue::Tags(tags) => Some(tags),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttributeValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Flag(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Number(n) if n.fract() == 0.0 => write!(f, "{:.0}", n),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => write!(f, "{}", s),
            AttributeValue::Tags(tags) => {
                let joined = tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
                write!(f, "{}", joined)
            }
        }
    }
}

/// A listing as supplied by the listing feed
///
/// Attributes arrive already normalized (units, currency). The embedding is
/// computed once at ingestion and never changes while the record is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    pub description: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl ListingRecord {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(AttributeValue::as_number)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::as_text)
    }

    pub fn location(&self) -> Option<&str> {
        self.text(ATTR_LOCATION)
    }

    /// True when the listing carries `term` as a tag in any tag-set attribute
    /// or has a boolean attribute of that name set to true.
    pub fn has_feature(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.attributes.iter().any(|(name, value)| match value {
            AttributeValue::Tags(tags) => tags.iter().any(|t| t.to_lowercase() == term),
            AttributeValue::Flag(true) => name.to_lowercase() == term,
            _ => false,
        })
    }

    /// Lower-cased feature terms of the listing (tags plus true flags)
    pub fn features(&self) -> BTreeSet<String> {
        let mut features = BTreeSet::new();
        for (name, value) in &self.attributes {
            match value {
                AttributeValue::Tags(tags) => {
                    features.extend(tags.iter().map(|t| t.to_lowercase()));
                }
                AttributeValue::Flag(true) => {
                    features.insert(name.to_lowercase());
                }
                _ => {}
            }
        }
        features
    }
}

/// A structured buyer requirement on one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Inclusive numeric range; either bound may be open
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Text value equals one of `values`, or tag set intersects `values`
    OneOf { values: Vec<String> },
    /// Tag set contains every entry of `values`
    AllOf { values: Vec<String> },
    /// Boolean attribute equals `value`; a missing attribute counts as false
    Flag { value: bool },
}

impl Constraint {
    pub fn at_least(min: f64) -> Self {
        Constraint::Range { min: Some(min), max: None }
    }

    pub fn at_most(max: f64) -> Self {
        Constraint::Range { min: None, max: Some(max) }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Range { min: Some(lo), max: Some(hi) } => write!(f, "between {} and {}", lo, hi),
            Constraint::Range { min: Some(lo), max: None } => write!(f, "at least {}", lo),
            Constraint::Range { min: None, max: Some(hi) } => write!(f, "at most {}", hi),
            Constraint::Range { min: None, max: None } => write!(f, "any"),
            Constraint::OneOf { values } => write!(f, "one of {}", values.join(", ")),
            Constraint::AllOf { values } => write!(f, "all of {}", values.join(", ")),
            Constraint::Flag { value } => write!(f, "{}", if *value { "required" } else { "excluded" }),
        }
    }
}

/// Attribute-level buyer preference
///
/// `Explicit` preferences are hard filters: they decide eligibility.
/// `Inferred` preferences are soft and only steer similarity and emphasis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Preference {
    Explicit(Constraint),
    Inferred(f32),
}

/// Request-scoped buyer profile; never persisted
#[derive(Debug, Clone, Serialize)]
pub struct BuyerProfile {
    pub statement: String,
    pub preferences: BTreeMap<String, Preference>,
    #[serde(skip)]
    pub vector: Vec<f32>,
}

impl BuyerProfile {
    /// Explicit constraints, keyed by attribute name
    pub fn constraints(&self) -> BTreeMap<String, Constraint> {
        self.preferences
            .iter()
            .filter_map(|(name, pref)| match pref {
                Preference::Explicit(c) => Some((name.clone(), c.clone())),
                Preference::Inferred(_) => None,
            })
            .collect()
    }

    /// Soft preference terms with their weights
    pub fn soft_terms(&self) -> Vec<(&str, f32)> {
        self.preferences
            .iter()
            .filter_map(|(name, pref)| match pref {
                Preference::Inferred(w) => Some((name.as_str(), *w)),
                Preference::Explicit(_) => None,
            })
            .collect()
    }

    /// Terms the buyer asked for that could be features of a listing:
    /// soft terms plus the values of explicit tag and flag constraints.
    pub fn feature_terms(&self) -> BTreeSet<String> {
        let mut terms = BTreeSet::new();
        for (name, pref) in &self.preferences {
            match pref {
                Preference::Inferred(_) => {
                    terms.insert(name.to_lowercase());
                }
                Preference::Explicit(Constraint::Flag { value: true }) => {
                    terms.insert(name.to_lowercase());
                }
                Preference::Explicit(Constraint::AllOf { values })
                | Preference::Explicit(Constraint::OneOf { values })
                    if name == ATTR_AMENITIES =>
                {
                    terms.extend(values.iter().map(|v| v.to_lowercase()));
                }
                Preference::Explicit(_) => {}
            }
        }
        terms
    }

    pub fn hard_filters(&self) -> HardFilters {
        HardFilters::new(self.constraints())
    }
}

/// Non-negotiable constraints applied before ranking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardFilters {
    pub constraints: BTreeMap<String, Constraint>,
}

impl HardFilters {
    pub fn new(constraints: BTreeMap<String, Constraint>) -> Self {
        Self { constraints }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Merge another filter set; entries already present win
    pub fn merged(mut self, other: &HardFilters) -> Self {
        for (name, constraint) in &other.constraints {
            self.constraints
                .entry(name.clone())
                .or_insert_with(|| constraint.clone());
        }
        self
    }
}

/// One ranked match produced by the matcher
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub listing: Arc<ListingRecord>,
    pub score: f32,
    /// 1-based position in the ranking
    pub rank: usize,
}

/// Why a listing's narrative fell back to its original description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RewriteUnavailable,
    VerificationFailed,
    WorkerFailed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackReason::RewriteUnavailable => "rewrite unavailable",
            FallbackReason::VerificationFailed => "verification failed",
            FallbackReason::WorkerFailed => "worker failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NarrativeOutcome {
    Accepted { attempts: u32 },
    Fallback { reason: FallbackReason },
}

/// Narrative returned to the caller for one listing
///
/// Only constructible through [`PersonalizedNarrative::accepted`] and
/// [`PersonalizedNarrative::fallback`]; a rejected narrative always carries
/// the listing's original description.
#[derive(Debug, Clone, Serialize)]
pub struct PersonalizedNarrative {
    listing_id: String,
    text: String,
    checked_attributes: BTreeSet<String>,
    accepted: bool,
    outcome: NarrativeOutcome,
}

impl PersonalizedNarrative {
    pub fn accepted(
        listing: &ListingRecord,
        text: String,
        checked_attributes: BTreeSet<String>,
        attempts: u32,
    ) -> Self {
        Self {
            listing_id: listing.id.clone(),
            text,
            checked_attributes,
            accepted: true,
            outcome: NarrativeOutcome::Accepted { attempts },
        }
    }

    pub fn fallback(listing: &ListingRecord, reason: FallbackReason) -> Self {
        Self {
            listing_id: listing.id.clone(),
            text: listing.description.clone(),
            checked_attributes: BTreeSet::new(),
            accepted: false,
            outcome: NarrativeOutcome::Fallback { reason },
        }
    }

    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn checked_attributes(&self) -> &BTreeSet<String> {
        &self.checked_attributes
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn outcome(&self) -> &NarrativeOutcome {
        &self.outcome
    }
}
