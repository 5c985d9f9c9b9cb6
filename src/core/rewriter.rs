use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::fact_guard::{supports_feature, Discrepancy};
use crate::models::domain::{ATTR_PRICE, ATTR_SQUARE_FEET};
use crate::models::{AttributeValue, BuyerProfile, ListingRecord};
use crate::services::llm::{CompletionRequest, LanguageModel, ModelError};

/// Standing instruction for every rewrite call
pub const SYSTEM_INSTRUCTION: &str = "You rewrite real-estate listing descriptions for a specific buyer. \
Change tone and emphasis only. Every number, price, room count, area, year, and place name must match \
the listing facts exactly. Do not mention any amenity or neighborhood quality that is not in the listing \
facts or the original description. Do not mention the buyer's budget or any figure that is not a listing \
fact. Output only the rewritten description as plain prose.";

/// Errors from a single rewrite call
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Language model unavailable: {0}")]
    Model(#[from] ModelError),

    #[error("Language model returned an empty draft")]
    EmptyDraft,
}

/// Produces personalized drafts of a listing description
pub struct DescriptionRewriter {
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl DescriptionRewriter {
    pub fn new(model: Arc<dyn LanguageModel>, max_tokens: u32, temperature: f32, timeout: Duration) -> Self {
        Self {
            model,
            max_tokens,
            temperature,
            timeout,
        }
    }

    /// First draft for a listing
    pub async fn draft(
        &self,
        listing: &ListingRecord,
        profile: &BuyerProfile,
        highlights: &[String],
    ) -> Result<String, RewriteError> {
        let request = self.build_request(listing, profile, highlights, None);
        self.call(request).await
    }

    /// Ask the model to correct the listed discrepancies in a previous draft
    pub async fn repair(
        &self,
        listing: &ListingRecord,
        profile: &BuyerProfile,
        highlights: &[String],
        previous: &str,
        discrepancies: &[Discrepancy],
    ) -> Result<String, RewriteError> {
        let request = self.build_request(listing, profile, highlights, Some((previous, discrepancies)));
        self.call(request).await
    }

    async fn call(&self, request: CompletionRequest) -> Result<String, RewriteError> {
        let raw = tokio::time::timeout(self.timeout, self.model.complete(request))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))??;

        let draft = clean_draft(&raw);
        if draft.is_empty() {
            return Err(RewriteError::EmptyDraft);
        }
        Ok(draft)
    }

    pub fn build_request(
        &self,
        listing: &ListingRecord,
        profile: &BuyerProfile,
        highlights: &[String],
        repair: Option<(&str, &[Discrepancy])>,
    ) -> CompletionRequest {
        let mut prompt = format!(
            "Buyer's own words: \"{}\"\n\nOriginal description:\n{}\n\n",
            profile.statement.trim(),
            listing.description.trim()
        );

        if highlights.is_empty() {
            prompt.push_str("None of the buyer's stated preferences are confirmed for this listing; do not claim any.\n");
        } else {
            prompt.push_str(&format!(
                "Weave in these buyer preferences, all confirmed true for this listing: {}.\n",
                highlights.join(", ")
            ));
        }

        if let Some((previous, discrepancies)) = repair {
            prompt.push_str(&format!("\nYour previous draft was:\n{}\n\nIt contained these errors:\n", previous));
            for d in discrepancies {
                prompt.push_str(&format!("- {}\n", d));
            }
            prompt.push_str("Rewrite it correcting only these errors.\n");
        } else {
            prompt.push_str("Rewrite the description for this buyer.\n");
        }

        CompletionRequest {
            system: SYSTEM_INSTRUCTION.to_string(),
            context: fact_sheet(listing),
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Buyer preference terms that are true for this listing
pub fn highlights(listing: &ListingRecord, profile: &BuyerProfile) -> Vec<String> {
    profile
        .feature_terms()
        .into_iter()
        .filter(|term| supports_feature(listing, term))
        .collect()
}

/// Every listing attribute, one per line, in attribute-name order
pub fn fact_sheet(listing: &ListingRecord) -> String {
    listing
        .attributes
        .iter()
        .map(|(name, value)| format!("- {}: {}", name, format_fact(name, value)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_fact(name: &str, value: &AttributeValue) -> String {
    match (name, value.as_number()) {
        (ATTR_PRICE, Some(n)) => format!("${}", format_thousands(n)),
        (ATTR_SQUARE_FEET, Some(n)) => format!("{} sq ft", format_thousands(n)),
        _ => value.to_string(),
    }
}

/// 480000 -> "480,000"; fractional values keep up to two decimals
pub fn format_thousands(n: f64) -> String {
    let fixed = format!("{:.2}", n.abs());
    let fixed = fixed.trim_end_matches('0').trim_end_matches('.');
    let (digits, decimals) = match fixed.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (fixed, None),
    };

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    if n < 0.0 && fixed != "0" {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = decimals {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Strip code fences and wrapping quotes from model output
pub fn clean_draft(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(after_fence) = text.strip_prefix("```") {
        let body = after_fence
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or(after_fence);
        text = body.rfind("```").map(|end| &body[..end]).unwrap_or(body).trim();
    }
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    text.trim().to_string()
}
