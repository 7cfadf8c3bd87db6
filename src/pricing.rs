//! Per-request cost calculation from token counts.
//!
//! Prices are held as exact decimals (per 1000 tokens) so that repeated billing
//! never drifts the way binary floating point does. Each component is rounded
//! half-up to six decimal places and the total is the sum of the rounded parts.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::ModelMetadataTable;

const COST_DECIMAL_PLACES: u32 = 6;

/// Prompt and completion prices for one model, per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRecord {
    pub prompt: Decimal,
    pub completion: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    #[serde(with = "rust_decimal::serde::float")]
    pub input_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub output_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_cost: Decimal,
}

/// Price table keyed by model id, shared read-only across requests.
#[derive(Debug, Clone, Default)]
pub struct CostCalculator {
    prices: HashMap<String, PricingRecord>,
}

impl CostCalculator {
    pub fn new(prices: impl IntoIterator<Item = (String, PricingRecord)>) -> Self {
        Self {
            prices: prices.into_iter().collect(),
        }
    }

    /// Build from the static metadata table. Models lacking either price are left out.
    #[must_use]
    pub fn from_metadata(table: &ModelMetadataTable) -> Self {
        Self::new(table.iter().filter_map(|m| {
            Some((
                m.id.clone(),
                PricingRecord {
                    prompt: m.pricing.prompt?,
                    completion: m.pricing.completion?,
                },
            ))
        }))
    }

    #[must_use]
    pub fn pricing(&self, model_id: &str) -> Option<&PricingRecord> {
        self.prices.get(model_id)
    }

    /// Cost of a request. `None` means no pricing is known for the model, which is
    /// distinct from a zero cost, or that the cost does not fit a decimal.
    #[must_use]
    pub fn calculate_costs(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<CostBreakdown> {
        let pricing = self.pricing(model_id)?;

        let breakdown = token_cost(input_tokens, pricing.prompt).and_then(|input_cost| {
            let output_cost = token_cost(output_tokens, pricing.completion)?;
            Some(CostBreakdown {
                input_cost,
                output_cost,
                total_cost: input_cost.checked_add(output_cost)?,
            })
        });

        if breakdown.is_none() {
            tracing::warn!(
                model = model_id,
                input_tokens,
                output_tokens,
                "Cost overflowed decimal range"
            );
        }
        breakdown
    }
}

fn token_cost(tokens: u64, price_per_thousand: Decimal) -> Option<Decimal> {
    Decimal::from(tokens)
        .checked_div(Decimal::ONE_THOUSAND)?
        .checked_mul(price_per_thousand)
        .map(|cost| {
            cost.round_dp_with_strategy(COST_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        })
}

/// Convert a float to the decimal its shortest representation denotes, so `0.1`
/// becomes exactly `0.1` rather than the nearest binary fraction.
#[must_use]
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
}

/// Deserialize an optional price written as a JSON number or a decimal string.
///
/// # Errors
/// Fails when the value is neither a finite number nor a parseable decimal string.
pub fn deserialize_optional_price<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawPrice>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPrice::Number(n)) => decimal_from_f64(n)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid price {n}"))),
        Some(RawPrice::Text(s)) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid price {s:?}: {e}"))),
    }
}
