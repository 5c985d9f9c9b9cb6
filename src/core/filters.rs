use crate::models::{AttributeValue, Constraint, HardFilters, ListingRecord};

/// Check whether a listing satisfies every hard filter
///
/// This is the eligibility stage of the matching pipeline: it runs before any
/// similarity is computed, so a listing failing here can never be ranked.
#[inline]
pub fn matches_hard_filters(listing: &ListingRecord, filters: &HardFilters) -> bool {
    filters
        .constraints
        .iter()
        .all(|(name, constraint)| satisfies(listing.attribute(name), constraint))
}

/// Evaluate a single constraint against an attribute value
///
/// A missing attribute fails every constraint except `Flag { value: false }`.
pub fn satisfies(value: Option<&AttributeValue>, constraint: &Constraint) -> bool {
    match constraint {
        Constraint::Range { min, max } => {
            let Some(n) = value.and_then(AttributeValue::as_number) else {
                return false;
            };
            if let Some(lo) = min {
                if n < *lo {
                    return false;
                }
            }
            if let Some(hi) = max {
                if n > *hi {
                    return false;
                }
            }
            true
        }
        Constraint::OneOf { values } => match value {
            Some(AttributeValue::Text(text)) => values.iter().any(|v| v.eq_ignore_ascii_case(text)),
            Some(AttributeValue::Tags(tags)) => values
                .iter()
                .any(|v| tags.iter().any(|t| t.eq_ignore_ascii_case(v))),
            _ => false,
        },
        Constraint::AllOf { values } => match value {
            Some(AttributeValue::Tags(tags)) => values
                .iter()
                .all(|v| tags.iter().any(|t| t.eq_ignore_ascii_case(v))),
            _ => false,
        },
        Constraint::Flag { value: wanted } => {
            let actual = value.and_then(AttributeValue::as_flag).unwrap_or(false);
            actual == *wanted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::{ATTR_AMENITIES, ATTR_BEDROOMS, ATTR_LOCATION, ATTR_PRICE};
    use std::collections::BTreeMap;

    fn create_test_listing(bedrooms: i64, price: f64) -> ListingRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert(ATTR_BEDROOMS.to_string(), AttributeValue::Integer(bedrooms));
        attributes.insert(ATTR_PRICE.to_string(), AttributeValue::Number(price));
        attributes.insert(ATTR_LOCATION.to_string(), AttributeValue::Text("Elm Park".to_string()));
        attributes.insert(
            ATTR_AMENITIES.to_string(),
            AttributeValue::Tags(["pool".to_string(), "garage".to_string()].into_iter().collect()),
        );
        attributes.insert("quiet".to_string(), AttributeValue::Flag(true));
        ListingRecord {
            id: "test_listing".to_string(),
            attributes,
            description: "Test listing".to_string(),
            embedding: vec![1.0, 0.0],
        }
    }

    fn filters(entries: Vec<(&str, Constraint)>) -> HardFilters {
        HardFilters::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_no_filters_match_everything() {
        let listing = create_test_listing(2, 300_000.0);
        assert!(matches_hard_filters(&listing, &HardFilters::none()));
    }

    #[test]
    fn test_bedroom_minimum() {
        let f = filters(vec![(ATTR_BEDROOMS, Constraint::at_least(3.0))]);
        assert!(matches_hard_filters(&create_test_listing(4, 480_000.0), &f));
        assert!(matches_hard_filters(&create_test_listing(3, 480_000.0), &f));
        assert!(!matches_hard_filters(&create_test_listing(2, 450_000.0), &f));
    }

    #[test]
    fn test_budget_ceiling() {
        let f = filters(vec![(ATTR_PRICE, Constraint::at_most(500_000.0))]);
        assert!(matches_hard_filters(&create_test_listing(4, 500_000.0), &f));
        assert!(!matches_hard_filters(&create_test_listing(4, 500_001.0), &f));
    }

    #[test]
    fn test_missing_attribute_fails_range() {
        let f = filters(vec![("year_built", Constraint::at_least(1990.0))]);
        assert!(!matches_hard_filters(&create_test_listing(4, 480_000.0), &f));
    }

    #[test]
    fn test_set_membership() {
        let listing = create_test_listing(4, 480_000.0);
        let loc = filters(vec![(
            ATTR_LOCATION,
            Constraint::OneOf { values: vec!["elm park".to_string(), "Oak Hill".to_string()] },
        )]);
        assert!(matches_hard_filters(&listing, &loc));

        let all = filters(vec![(
            ATTR_AMENITIES,
            Constraint::AllOf { values: vec!["pool".to_string(), "fireplace".to_string()] },
        )]);
        assert!(!matches_hard_filters(&listing, &all));

        let any = filters(vec![(
            ATTR_AMENITIES,
            Constraint::OneOf { values: vec!["fireplace".to_string(), "Garage".to_string()] },
        )]);
        assert!(matches_hard_filters(&listing, &any));
    }

    #[test]
    fn test_flag_constraint() {
        let listing = create_test_listing(4, 480_000.0);
        assert!(matches_hard_filters(&listing, &filters(vec![("quiet", Constraint::Flag { value: true })])));
        assert!(matches_hard_filters(&listing, &filters(vec![("hoa", Constraint::Flag { value: false })])));
        assert!(!matches_hard_filters(&listing, &filters(vec![("hoa", Constraint::Flag { value: true })])));
    }
}
