//! Model catalog types and cost display helpers.

use serde::{Deserialize, Serialize};

/// Per-token pricing for a model, in USD per million tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub prompt: f64,
    #[serde(default)]
    pub completion: f64,
}

/// One entry in the model catalog fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub context_length: u32,
    #[serde(default)]
    pub pricing: ModelPricing,
}

impl ModelDescriptor {
    /// Average of prompt and completion price — a display heuristic,
    /// not a billing computation.
    pub fn mean_cost(&self) -> f64 {
        (self.pricing.prompt + self.pricing.completion) / 2.0
    }
}

/// Format a cost with precision tiered by magnitude, so very cheap
/// models don't display-round to zero.
pub fn format_cost(cost: f64) -> String {
    if cost == 0.0 {
        return "$0.00".to_string();
    }
    if cost < 0.01 {
        return format!("${:.5}", cost);
    }
    if cost < 0.1 {
        return format!("${:.4}", cost);
    }
    if cost < 1.0 {
        return format!("${:.3}", cost);
    }
    format!("${:.2}", cost)
}

/// Token and cost bookkeeping for one session.
///
/// `total_tokens` and `cumulative_cost` accumulate across calls;
/// the `last_*` fields are overwritten by each completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageStats {
    pub total_tokens: u64,
    pub last_prompt_tokens: u32,
    pub last_completion_tokens: u32,
    pub last_cost: f64,
    pub cumulative_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(prompt: f64, completion: f64) -> ModelDescriptor {
        ModelDescriptor {
            id: "test/model".to_string(),
            name: "Test Model".to_string(),
            description: String::new(),
            context_length: 8192,
            pricing: ModelPricing { prompt, completion },
        }
    }

    #[test]
    fn test_mean_cost() {
        let model = descriptor(0.00002, 0.00004);
        assert!((model.mean_cost() - 0.00003).abs() < 1e-12);

        let free = descriptor(0.0, 0.0);
        assert_eq!(free.mean_cost(), 0.0);
    }

    #[test]
    fn test_format_cost_tiers() {
        assert_eq!(format_cost(0.0), "$0.00");
        assert_eq!(format_cost(0.00003), "$0.00003");
        assert_eq!(format_cost(0.002), "$0.00200");
        assert_eq!(format_cost(0.05), "$0.0500");
        assert_eq!(format_cost(0.5), "$0.500");
        assert_eq!(format_cost(15.0), "$15.00");
    }

    #[test]
    fn test_catalog_record_parse() {
        let json = r#"{
            "id": "anthropic/claude-3-sonnet:beta",
            "name": "Claude 3 Sonnet",
            "description": "Balanced model",
            "context_length": 200000,
            "pricing": { "prompt": 0.000003, "completion": 0.000015 }
        }"#;
        let model: ModelDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(model.id, "anthropic/claude-3-sonnet:beta");
        assert_eq!(model.context_length, 200000);
        assert_eq!(model.pricing.completion, 0.000015);
    }
}
