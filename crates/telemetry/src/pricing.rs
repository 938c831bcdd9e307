//! Per-model pricing table.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. The built-in table is populated on first lookup; overrides
//! from the config file are layered on top and survive [`PricingTable::clear`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_per_m + completion_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with lazily populated built-ins.
pub struct PricingTable {
    builtin: bool,
    cache: RwLock<Option<BTreeMap<String, ModelPricing>>>,
    overrides: RwLock<BTreeMap<String, ModelPricing>>,
}

impl PricingTable {
    /// A table backed by the built-in model prices.
    pub fn with_defaults() -> Self {
        Self {
            builtin: true,
            cache: RwLock::new(None),
            overrides: RwLock::new(BTreeMap::new()),
        }
    }

    /// A table that only knows what is [`set`](Self::set) on it.
    pub fn empty() -> Self {
        Self {
            builtin: false,
            ..Self::with_defaults()
        }
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let model = model.into();
        write(&self.overrides).insert(model.clone(), pricing);
        if let Some(prices) = write(&self.cache).as_mut() {
            prices.insert(model, pricing);
        }
    }

    /// Drop the populated table. The next lookup repopulates it.
    pub fn clear(&self) {
        *write(&self.cache) = None;
    }

    /// Whether a lookup has populated the table since the last clear.
    pub fn is_populated(&self) -> bool {
        read(&self.cache).is_some()
    }

    /// Look up pricing for a model.
    ///
    /// Tries the exact name first, then compares names without their
    /// `provider/` prefix, picking the longest known name the requested model
    /// starts with (`gpt-4o-mini-2024-07-18` matches `openai/gpt-4o-mini`).
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.with_prices(|prices| {
            if let Some(p) = prices.get(model) {
                return Some(*p);
            }
            let wanted = bare_name(model).to_ascii_lowercase();
            prices
                .iter()
                .filter(|(key, _)| wanted.starts_with(&bare_name(key).to_ascii_lowercase()))
                .max_by_key(|(key, _)| bare_name(key).len())
                .map(|(_, p)| *p)
        })
    }

    /// Compute cost for a model call, returning 0.0 if the model is unknown.
    pub fn compute_cost(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        self.get(model)
            .map(|p| p.cost(prompt_tokens, completion_tokens))
            .unwrap_or(0.0)
    }

    /// All known model names, sorted.
    pub fn models(&self) -> Vec<String> {
        self.with_prices(|prices| prices.keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.with_prices(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_prices<R>(&self, f: impl FnOnce(&BTreeMap<String, ModelPricing>) -> R) -> R {
        if let Some(prices) = read(&self.cache).as_ref() {
            return f(prices);
        }
        let mut cache = write(&self.cache);
        let prices = cache.get_or_insert_with(|| self.populate());
        f(prices)
    }

    fn populate(&self) -> BTreeMap<String, ModelPricing> {
        let mut prices = if self.builtin {
            builtin_prices()
        } else {
            BTreeMap::new()
        };
        prices.extend(read(&self.overrides).iter().map(|(k, v)| (k.clone(), *v)));
        debug!(models = prices.len(), "Populated pricing table");
        prices
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Render a USD amount for display.
pub fn format_cost(usd: f64) -> String {
    if usd > 0.0 && usd < 0.01 {
        format!("${usd:.4}")
    } else {
        format!("${usd:.2}")
    }
}

fn bare_name(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn builtin_prices() -> BTreeMap<String, ModelPricing> {
    [
        // ── Anthropic ──────────────────────────────────────────────
        ("anthropic/claude-sonnet-4", 3.0, 15.0),
        ("anthropic/claude-opus-4", 15.0, 75.0),
        ("anthropic/claude-3.5-haiku", 0.8, 4.0),
        // ── OpenAI ─────────────────────────────────────────────────
        ("openai/gpt-4o", 2.5, 10.0),
        ("openai/gpt-4o-mini", 0.15, 0.6),
        ("openai/gpt-4.1", 2.0, 8.0),
        ("openai/gpt-4.1-mini", 0.4, 1.6),
        ("openai/o3-mini", 1.1, 4.4),
        // ── Google ─────────────────────────────────────────────────
        ("google/gemini-2.0-flash", 0.1, 0.4),
        ("google/gemini-2.5-pro", 1.25, 10.0),
        // ── Meta / Mistral / DeepSeek ──────────────────────────────
        ("meta-llama/llama-3.1-70b", 0.52, 0.75),
        ("mistral/mistral-large", 2.0, 6.0),
        ("deepseek/deepseek-v3", 0.27, 1.1),
    ]
    .into_iter()
    .map(|(model, input, output)| (model.to_string(), ModelPricing::new(input, output)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();

        // Claude Sonnet 4: $3/M input, $15/M output
        let cost = table.compute_cost("anthropic/claude-sonnet-4", 1000, 500);
        // (1000 * 3.0 + 500 * 15.0) / 1M = 0.0105
        assert!((cost - 0.0105).abs() < 1e-10);
    }

    #[test]
    fn unknown_model_returns_zero() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.compute_cost("unknown/model-xyz", 1000, 500), 0.0);
    }

    #[test]
    fn bare_and_versioned_names_match() {
        let table = PricingTable::with_defaults();
        let exact = table.compute_cost("openai/gpt-4o-mini", 1_000_000, 0);
        assert!((table.compute_cost("gpt-4o-mini", 1_000_000, 0) - exact).abs() < 1e-10);
        // Longest prefix wins: gpt-4o-mini, not gpt-4o.
        assert!((table.compute_cost("gpt-4o-mini-2024-07-18", 1_000_000, 0) - exact).abs() < 1e-10);
    }

    #[test]
    fn populated_on_first_use_and_cleared() {
        let table = PricingTable::with_defaults();
        assert!(!table.is_populated());
        assert!(table.get("openai/gpt-4o").is_some());
        assert!(table.is_populated());

        table.clear();
        assert!(!table.is_populated());
        assert!(table.len() > 10);
    }

    #[test]
    fn overrides_survive_clear() {
        let table = PricingTable::empty();
        assert!(table.is_empty());

        table.set("gateway/custom", ModelPricing::new(1.0, 2.0));
        table.clear();
        let cost = table.compute_cost("gateway/custom", 1_000_000, 1_000_000);
        assert!((cost - 3.0).abs() < 1e-10);
    }

    #[test]
    fn set_overrides_builtin() {
        let table = PricingTable::with_defaults();
        let old = table.compute_cost("openai/gpt-4o", 1_000_000, 0);
        assert!((old - 2.5).abs() < 1e-10);

        table.set("openai/gpt-4o", ModelPricing::new(5.0, 20.0));
        let new_cost = table.compute_cost("openai/gpt-4o", 1_000_000, 0);
        assert!((new_cost - 5.0).abs() < 1e-10);
    }

    #[test]
    fn models_are_sorted() {
        let models = PricingTable::with_defaults().models();
        assert!(models.contains(&"anthropic/claude-sonnet-4".to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn cost_formatting() {
        assert_eq!(format_cost(0.0), "$0.00");
        assert_eq!(format_cost(0.0042), "$0.0042");
        assert_eq!(format_cost(1.5), "$1.50");
    }

    #[test]
    fn pricing_deserializes_from_config_shape() {
        let p: ModelPricing =
            serde_json::from_str(r#"{"input_per_m": 1.5, "output_per_m": 6.0}"#).unwrap();
        assert_eq!(p, ModelPricing::new(1.5, 6.0));
    }
}
