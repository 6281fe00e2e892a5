//! Cost normalization across heterogeneous model pricing
//!
//! Providers report token counts but bill at wildly different unit
//! prices. Billing normalizes everything to a baseline model: a turn's
//! actual USD cost is divided by what the baseline would have charged
//! for the same tokens, and the actual token count is scaled by that
//! ratio. The result ("adjusted tokens") is comparable across
//! providers and is the only number written back into accounting.
//!
//! Pure functions over an injected [`PricingTable`]; the same
//! normalization serves the agent loop and single-shot requests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::providers::TokenUsage;

/// Unit prices for a model, in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    /// USD cost of a prompt/completion pair at these unit prices
    pub fn cost_usd(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

/// Failure to price a turn. Fatal to a run: an un-priceable turn
/// cannot be safely billed.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("no pricing entry for model '{0}'")]
    Unpriced(String),

    #[error("baseline-equivalent cost is zero for {prompt_tokens} prompt / {completion_tokens} completion tokens")]
    ZeroBaseline {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
}

/// Injected, versioned price configuration: per-model unit prices plus
/// the baseline the adjustment is computed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    pub baseline: ModelPricing,
    pub models: HashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "claude-sonnet-4-5".to_string(),
            ModelPricing {
                input_per_mtok: 3.0,
                output_per_mtok: 15.0,
            },
        );
        models.insert(
            "claude-haiku-4-5".to_string(),
            ModelPricing {
                input_per_mtok: 1.0,
                output_per_mtok: 5.0,
            },
        );
        models.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_per_mtok: 2.5,
                output_per_mtok: 10.0,
            },
        );
        models.insert(
            "gpt-4o-mini".to_string(),
            ModelPricing {
                input_per_mtok: 0.15,
                output_per_mtok: 0.6,
            },
        );
        models.insert(
            "gemini-2.0-flash".to_string(),
            ModelPricing {
                input_per_mtok: 0.1,
                output_per_mtok: 0.4,
            },
        );
        models.insert(
            "gemini-1.5-flash".to_string(),
            ModelPricing {
                input_per_mtok: 0.075,
                output_per_mtok: 0.3,
            },
        );

        // Baseline is the cheapest priced tier, so adjusted token
        // counts never shrink below actual counts.
        Self {
            baseline: ModelPricing {
                input_per_mtok: 0.075,
                output_per_mtok: 0.3,
            },
            models,
        }
    }
}

impl PricingTable {
    /// Derive the actual USD cost of a turn from the active model's
    /// unit prices. Providers do not report USD directly.
    pub fn actual_cost(&self, model: &str, usage: TokenUsage) -> Result<f64, PricingError> {
        let pricing = self
            .models
            .get(model)
            .ok_or_else(|| PricingError::Unpriced(model.to_string()))?;
        Ok(pricing.cost_usd(usage.prompt_tokens as u64, usage.completion_tokens as u64))
    }

    /// Normalize a turn into a ledger entry.
    ///
    /// adjusted = (prompt + completion) * actual_cost / baseline_cost.
    /// A zero baseline-equivalent cost is an error, never a division
    /// producing infinity.
    pub fn normalize(
        &self,
        usage: TokenUsage,
        actual_cost_usd: f64,
    ) -> Result<LedgerEntry, PricingError> {
        let prompt = usage.prompt_tokens as u64;
        let completion = usage.completion_tokens as u64;
        let baseline_cost = self.baseline.cost_usd(prompt, completion);

        if baseline_cost <= 0.0 {
            return Err(PricingError::ZeroBaseline {
                prompt_tokens: prompt,
                completion_tokens: completion,
            });
        }

        let actual_tokens = prompt + completion;
        let adjusted = (actual_tokens as f64 * (actual_cost_usd / baseline_cost)).round() as u64;

        debug!(
            "Normalized turn: {} tokens, ${:.6} actual vs ${:.6} baseline -> {} adjusted",
            actual_tokens, actual_cost_usd, baseline_cost, adjusted
        );

        Ok(LedgerEntry {
            prompt_tokens: prompt,
            completion_tokens: completion,
            actual_cost_usd,
            baseline_equivalent_cost_usd: baseline_cost,
            adjusted_tokens: adjusted,
        })
    }
}

/// One priced turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub actual_cost_usd: f64,
    pub baseline_equivalent_cost_usd: f64,
    pub adjusted_tokens: u64,
}

/// Append-only cost record for one run. Entries are never edited
/// retroactively.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    entries: Vec<LedgerEntry>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn total_prompt_tokens(&self) -> u64 {
        self.entries.iter().map(|e| e.prompt_tokens).sum()
    }

    pub fn total_completion_tokens(&self) -> u64 {
        self.entries.iter().map(|e| e.completion_tokens).sum()
    }

    /// Raw token total: the billing fallback when normalization is
    /// unavailable downstream.
    pub fn total_actual_tokens(&self) -> u64 {
        self.total_prompt_tokens() + self.total_completion_tokens()
    }

    pub fn total_adjusted_tokens(&self) -> u64 {
        self.entries.iter().map(|e| e.adjusted_tokens).sum()
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.entries.iter().map(|e| e.actual_cost_usd).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
        }
    }

    #[test]
    fn test_cost_usd() {
        let pricing = ModelPricing {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        };
        let cost = pricing.cost_usd(1000, 500);
        assert!((cost - 0.0105).abs() < 1e-9);
    }

    #[test]
    fn test_reference_calculation() {
        // Claude-class turn priced against the Gemini-class baseline:
        // $0.01575 for 1800 prompt + 700 completion tokens is a
        // ~45.65x cost ratio, so 2500 tokens adjust to ~114,130.
        let table = PricingTable::default();
        let entry = table.normalize(usage(1800, 700), 0.01575).unwrap();

        assert!((entry.baseline_equivalent_cost_usd - 0.000345).abs() < 1e-9);
        assert_eq!(entry.adjusted_tokens, 114_130);
    }

    #[test]
    fn test_adjusted_degenerates_to_actual_at_baseline_price() {
        let table = PricingTable::default();
        let u = usage(1800, 700);
        let baseline_cost = table.baseline.cost_usd(1800, 700);
        let entry = table.normalize(u, baseline_cost).unwrap();
        assert_eq!(entry.adjusted_tokens, 2500);
    }

    #[test]
    fn test_monotonicity_over_default_table() {
        // Every priced model costs at least the baseline, so adjusted
        // tokens never undercut actual tokens.
        let table = PricingTable::default();
        let u = usage(1800, 700);
        for model in table.models.keys() {
            let cost = table.actual_cost(model, u).unwrap();
            let entry = table.normalize(u, cost).unwrap();
            assert!(
                entry.adjusted_tokens >= 2500,
                "model {} adjusted below actual",
                model
            );
        }
    }

    #[test]
    fn test_unpriced_model() {
        let table = PricingTable::default();
        let err = table.actual_cost("mystery-model", usage(10, 10)).unwrap_err();
        assert_eq!(err, PricingError::Unpriced("mystery-model".to_string()));
    }

    #[test]
    fn test_zero_baseline_is_error() {
        let table = PricingTable::default();
        let err = table.normalize(usage(0, 0), 0.01).unwrap_err();
        assert!(matches!(err, PricingError::ZeroBaseline { .. }));
    }

    #[test]
    fn test_ledger_totals() {
        let table = PricingTable::default();
        let mut ledger = CostLedger::new();
        ledger.push(table.normalize(usage(1000, 200), 0.004).unwrap());
        ledger.push(table.normalize(usage(500, 100), 0.002).unwrap());

        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.total_prompt_tokens(), 1500);
        assert_eq!(ledger.total_completion_tokens(), 300);
        assert_eq!(ledger.total_actual_tokens(), 1800);
        assert!((ledger.total_cost_usd() - 0.006).abs() < 1e-9);
        assert!(ledger.total_adjusted_tokens() >= 1800);
    }
}
