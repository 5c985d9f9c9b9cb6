//! Fact guard: verifies that a generated narrative does not contradict or
//! invent listing facts.
//!
//! Claims are pulled out of the draft with patterns (room counts, prices,
//! areas, build year, place names, amenity terms) and each one is compared
//! with the listing's attributes. Model output is never trusted as typed data.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use once_cell::sync::Lazy;

use crate::core::interpreter::parse_amount;
use crate::core::vocabulary::{mentions, normalize_term, FEATURE_TERMS};
use crate::models::domain::{
    ATTR_AMENITIES, ATTR_BATHROOMS, ATTR_BEDROOMS, ATTR_LOCATION, ATTR_PRICE, ATTR_SQUARE_FEET,
    ATTR_YEAR_BUILT,
};
use crate::models::ListingRecord;

/// A factual statement found in a draft
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Bedrooms(f64),
    Bathrooms(f64),
    Price(f64),
    Area(f64),
    YearBuilt(i64),
    Location(String),
    Feature(String),
}

impl Claim {
    pub fn attribute(&self) -> &'static str {
        match self {
            Claim::Bedrooms(_) => ATTR_BEDROOMS,
            Claim::Bathrooms(_) => ATTR_BATHROOMS,
            Claim::Price(_) => ATTR_PRICE,
            Claim::Area(_) => ATTR_SQUARE_FEET,
            Claim::YearBuilt(_) => ATTR_YEAR_BUILT,
            Claim::Location(_) => ATTR_LOCATION,
            Claim::Feature(_) => ATTR_AMENITIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Claimed value differs from the listing's value
    Mismatch,
    /// Claim about something the listing does not have
    Fabricated,
    /// None of the confirmed buyer preferences made it into the draft
    MissingHighlight,
}

/// One failed check, phrased so it can be fed back into a repair prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub attribute: String,
    pub claimed: String,
    pub expected: Option<String>,
}

impl Discrepancy {
    pub fn mismatch(attribute: &str, claimed: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            kind: DiscrepancyKind::Mismatch,
            attribute: attribute.to_string(),
            claimed: claimed.into(),
            expected: Some(expected.into()),
        }
    }

    pub fn fabricated(attribute: &str, claimed: impl Into<String>) -> Self {
        Self {
            kind: DiscrepancyKind::Fabricated,
            attribute: attribute.to_string(),
            claimed: claimed.into(),
            expected: None,
        }
    }

    pub fn missing_highlight(highlights: &[String]) -> Self {
        Self {
            kind: DiscrepancyKind::MissingHighlight,
            attribute: "highlights".to_string(),
            claimed: String::new(),
            expected: Some(highlights.join(", ")),
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiscrepancyKind::Mismatch => write!(
                f,
                "{} stated as {} but the listing has {}",
                self.attribute,
                self.claimed,
                self.expected.as_deref().unwrap_or("a different value")
            ),
            DiscrepancyKind::Fabricated => write!(
                f,
                "mentions {} ({}) which the listing does not have",
                self.claimed, self.attribute
            ),
            DiscrepancyKind::MissingHighlight => write!(
                f,
                "must mention at least one of: {}",
                self.expected.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Outcome of checking one draft
#[derive(Debug, Clone)]
pub struct Verdict {
    pub accepted: bool,
    pub discrepancies: Vec<Discrepancy>,
    /// Attributes for which at least one claim was compared
    pub checked: BTreeSet<String>,
}

struct ClaimPatterns {
    bedrooms: Regex,
    bathrooms: Regex,
    labelled: Regex,
    price: Regex,
    price_words: Regex,
    area: Regex,
    year_built_in: Regex,
    year_built_suffix: Regex,
}

const COUNT: &str = r"(\d{1,2}(?:\.\d)?|one|two|three|four|five|six|seven|eight|nine|ten)";

/// Up to two descriptive words between a count and its noun ("5 spacious bedrooms")
const FILLER: &str = r"((?:[\s-]+[a-z]+){0,2}?)";

/// Filler words that mean the count belongs to something else
const FILLER_STOP_WORDS: &[&str] = &[
    "and", "or", "with", "plus", "of", "the", "in", "to", "for", "bed", "beds", "bedroom",
    "bedrooms", "bath", "baths", "bathroom", "bathrooms", "car", "story", "stories",
];

static PATTERNS: Lazy<ClaimPatterns> = Lazy::new(|| ClaimPatterns {
    bedrooms: Regex::new(&format!(r"(?i)\b{}{}[\s-]*(?:bed(?:room)?s?|br|bd)\b", COUNT, FILLER))
        .expect("valid bedroom claim regex"),
    bathrooms: Regex::new(&format!(
        r"(?i)\b{}{}[\s-]*(?:bath(?:room)?s?|ba)\b",
        COUNT, FILLER
    ))
    .expect("valid bathroom claim regex"),
    labelled: Regex::new(
        r"(?i)\b(bed(?:room)?s|bath(?:room)?s|price|asking\s+price|square[\s_-]+f(?:ee|oo)t(?:age)?|sq\.?\s*ft|living\s+area|year[\s_]+built)\s*:\s*\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k|m|million|thousand)?\b",
    )
    .expect("valid labelled claim regex"),
    price: Regex::new(r"(?i)\$\s?(\d+(?:[.,]\d+)*)(?:\s*(k|m|million|thousand)\b)?")
        .expect("valid price claim regex"),
    price_words: Regex::new(
        r"(?i)(?:\busd\s*(\d+(?:[.,]\d+)*)(?:\s*(k|m|million|thousand)\b)?|\b(\d+(?:[.,]\d+)*)\s*(k|m|million|thousand)?\s*(?:dollars|usd)\b)",
    )
    .expect("valid worded price regex"),
    area: Regex::new(
        r"(?i)\b(\d+(?:,\d{3})*)[\s-]*(?:sq\.?[\s-]*ft|square[\s-]+f(?:ee|oo)t|sqft|sf)\b",
    )
    .expect("valid area claim regex"),
    year_built_in: Regex::new(r"(?i)\bbuilt\s+in\s+(\d{4})\b").expect("valid year regex"),
    year_built_suffix: Regex::new(r"(?i)\b(\d{4})[\s-]built\b").expect("valid year regex"),
});

fn filler_is_descriptive(filler: Option<regex::Match<'_>>) -> bool {
    filler.map_or(true, |m| {
        m.as_str()
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|w| !w.is_empty())
            .all(|w| !FILLER_STOP_WORDS.contains(&w.to_lowercase().as_str()))
    })
}

fn room_claims(re: &Regex, draft: &str, claim: fn(f64) -> Claim, claims: &mut Vec<Claim>) {
    for caps in re.captures_iter(draft) {
        if !filler_is_descriptive(caps.get(2)) {
            continue;
        }
        if let Some(n) = caps.get(1).and_then(|m| parse_count(m.as_str())) {
            claims.push(claim(n));
        }
    }
}

/// "Bedrooms: 5", "Price: $480,000", "Square feet: 2,100"
fn labelled_claim(label: &str, amount: f64) -> Claim {
    let label = label.to_lowercase();
    if label.starts_with("bed") {
        Claim::Bedrooms(amount)
    } else if label.starts_with("bath") {
        Claim::Bathrooms(amount)
    } else if label.contains("price") {
        Claim::Price(amount)
    } else if label.starts_with("year") {
        Claim::YearBuilt(amount as i64)
    } else {
        Claim::Area(amount)
    }
}

fn parse_count(token: &str) -> Option<f64> {
    let word = match token.to_lowercase().as_str() {
        "one" => 1.0,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        other => return other.parse().ok(),
    };
    Some(word)
}

/// Extract every recognizable factual claim from a draft
///
/// `known_locations` is the gazetteer of place names to look for.
pub fn extract_claims(draft: &str, known_locations: &BTreeSet<String>) -> Vec<Claim> {
    let p = &*PATTERNS;
    let mut claims = Vec::new();

    room_claims(&p.bedrooms, draft, Claim::Bedrooms, &mut claims);
    room_claims(&p.bathrooms, draft, Claim::Bathrooms, &mut claims);

    for caps in p.labelled.captures_iter(draft) {
        let suffix = caps.get(3).map(|m| m.as_str());
        let amount = caps.get(2).and_then(|m| parse_amount(m.as_str(), suffix));
        if let (Some(label), Some(amount)) = (caps.get(1), amount) {
            claims.push(labelled_claim(label.as_str(), amount));
        }
    }

    for caps in p.price.captures_iter(draft) {
        let suffix = caps.get(2).map(|m| m.as_str());
        if let Some(n) = caps.get(1).and_then(|m| parse_amount(m.as_str(), suffix)) {
            claims.push(Claim::Price(n));
        }
    }
    for caps in p.price_words.captures_iter(draft) {
        let (digits, suffix) = match caps.get(1) {
            Some(digits) => (Some(digits), caps.get(2)),
            None => (caps.get(3), caps.get(4)),
        };
        if let Some(n) = digits.and_then(|m| parse_amount(m.as_str(), suffix.map(|s| s.as_str()))) {
            claims.push(Claim::Price(n));
        }
    }
    for caps in p.area.captures_iter(draft) {
        if let Some(n) = caps.get(1).and_then(|m| parse_amount(m.as_str(), None)) {
            claims.push(Claim::Area(n));
        }
    }
    for re in [&p.year_built_in, &p.year_built_suffix] {
        for caps in re.captures_iter(draft) {
            if let Some(y) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                claims.push(Claim::YearBuilt(y));
            }
        }
    }

    for location in known_locations {
        let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(location))) else {
            continue;
        };
        if re.is_match(draft) {
            claims.push(Claim::Location(location.clone()));
        }
    }

    for term in FEATURE_TERMS {
        if mentions(draft, term) > 0 {
            claims.push(Claim::Feature(term.to_string()));
        }
    }

    claims
}

/// True when the listing's tags, true flags or original description back up `term`
pub fn supports_feature(listing: &ListingRecord, term: &str) -> bool {
    let wanted = normalize_term(term);
    let tagged = listing.features().iter().any(|feature| {
        normalize_term(feature) == wanted
            || feature
                .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
                .any(|word| normalize_term(word) == wanted)
    });
    tagged || mentions(&listing.description, term) > 0
}

/// Verifies drafts against a listing's ground truth
#[derive(Debug, Clone)]
pub struct FactGuard {
    price_tolerance: f64,
    area_tolerance: f64,
}

impl Default for FactGuard {
    fn default() -> Self {
        Self::new(0.01, 0.02)
    }
}

impl FactGuard {
    /// Tolerances are relative (0.01 = 1%); counts and years are always exact
    pub fn new(price_tolerance: f64, area_tolerance: f64) -> Self {
        Self {
            price_tolerance: price_tolerance.max(0.0),
            area_tolerance: area_tolerance.max(0.0),
        }
    }

    /// Check a draft; accepted only when no discrepancy was found
    pub fn verify(
        &self,
        draft: &str,
        listing: &ListingRecord,
        highlights: &[String],
        known_locations: &BTreeSet<String>,
    ) -> Verdict {
        let mut discrepancies = Vec::new();
        let mut checked = BTreeSet::new();

        for claim in extract_claims(draft, known_locations) {
            checked.insert(claim.attribute().to_string());
            if let Some(d) = self.check_claim(&claim, listing) {
                if !discrepancies.contains(&d) {
                    discrepancies.push(d);
                }
            }
        }

        if !highlights.is_empty() && !highlights.iter().any(|h| mentions(draft, h) > 0) {
            discrepancies.push(Discrepancy::missing_highlight(highlights));
        }

        Verdict {
            accepted: discrepancies.is_empty(),
            discrepancies,
            checked,
        }
    }

    fn check_claim(&self, claim: &Claim, listing: &ListingRecord) -> Option<Discrepancy> {
        match claim {
            Claim::Bedrooms(n) | Claim::Bathrooms(n) => {
                check_number(claim.attribute(), *n, listing, 0.0)
            }
            Claim::Price(n) => check_number(ATTR_PRICE, *n, listing, self.price_tolerance),
            Claim::Area(n) => check_number(ATTR_SQUARE_FEET, *n, listing, self.area_tolerance),
            Claim::YearBuilt(y) => check_number(ATTR_YEAR_BUILT, *y as f64, listing, 0.0),
            Claim::Location(name) => match listing.location() {
                None => Some(Discrepancy::fabricated(ATTR_LOCATION, name.clone())),
                Some(actual) => {
                    let a = actual.to_lowercase();
                    let c = name.to_lowercase();
                    if a.contains(&c) || c.contains(&a) {
                        None
                    } else {
                        Some(Discrepancy::mismatch(ATTR_LOCATION, name.clone(), actual))
                    }
                }
            },
            Claim::Feature(term) => {
                if supports_feature(listing, term) {
                    None
                } else {
                    Some(Discrepancy::fabricated(ATTR_AMENITIES, term.clone()))
                }
            }
        }
    }
}

fn check_number(attribute: &str, claimed: f64, listing: &ListingRecord, tolerance: f64) -> Option<Discrepancy> {
    let Some(actual) = listing.number(attribute) else {
        return Some(Discrepancy::fabricated(attribute, format_number(claimed)));
    };
    let allowed = (actual.abs() * tolerance).max(1e-9);
    if (claimed - actual).abs() <= allowed {
        None
    } else {
        Some(Discrepancy::mismatch(attribute, format_number(claimed), format_number(actual)))
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}
