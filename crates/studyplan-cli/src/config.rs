use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use studyplan_core::{ModelPricing, PricingTable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyplanConfig {
    pub agent: AgentConfig,
    pub store: StoreConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub pricing: Option<PricingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Active provider: "anthropic", "openai", or "google"
    pub provider: String,
    pub max_tokens: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_agent_mode_threshold")]
    pub agent_mode_threshold: u32,
}

fn default_max_iterations() -> u32 {
    20
}

fn default_agent_mode_threshold() -> u32 {
    studyplan_core::DEFAULT_AGENT_MODE_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub anthropic: Option<AnthropicConfig>,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub google: Option<GoogleConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_anthropic_model() -> String {
    "claude-sonnet-4-5".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub api_key: String,
    #[serde(default = "default_google_model")]
    pub model: String,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

fn default_google_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Optional pricing override. Absent sections fall back to the built-in
/// table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub baseline: PricingEntry,
    #[serde(default)]
    pub models: HashMap<String, PricingEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingEntry {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl From<PricingEntry> for ModelPricing {
    fn from(e: PricingEntry) -> Self {
        ModelPricing {
            input_per_mtok: e.input_per_mtok,
            output_per_mtok: e.output_per_mtok,
        }
    }
}

impl StudyplanConfig {
    pub fn load(path: &Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p.clone(),
            None => config_dir().join("config.toml"),
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let cfg: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        match self.agent.provider.as_str() {
            "anthropic" | "openai" | "google" => {}
            other => bail!("unknown provider '{other}' (expected anthropic, openai, or google)"),
        }
        if self.agent.max_iterations == 0 {
            bail!("agent.max_iterations must be at least 1");
        }
        Ok(())
    }

    /// Merge the optional [pricing] section over the built-in table
    pub fn pricing_table(&self) -> PricingTable {
        let mut table = PricingTable::default();
        if let Some(pricing) = &self.pricing {
            table.baseline = pricing.baseline.into();
            for (model, entry) in &pricing.models {
                table.models.insert(model.clone(), (*entry).into());
            }
        }
        table
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".studyplan")
}

fn mask_secret(s: &str) -> String {
    if s.len() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", &s[..8])
    }
}

// Expand ~ and ${VAR} in configured paths and keys
pub fn expand_str(s: &str) -> String {
    let mut result = s.to_string();
    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    }
    let mut pos = 0;
    while pos < result.len() {
        if let Some(start) = result[pos..].find("${") {
            let abs_start = pos + start;
            if let Some(end) = result[abs_start..].find('}') {
                let var_name = &result[abs_start + 2..abs_start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                let value_len = value.len();
                result = format!(
                    "{}{}{}",
                    &result[..abs_start],
                    value,
                    &result[abs_start + end + 1..]
                );
                pos = abs_start + value_len;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    result
}

pub fn expand_path(s: &str) -> PathBuf {
    PathBuf::from(expand_str(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let raw = include_str!("../../../config/default.toml");
        let cfg: StudyplanConfig = toml::from_str(raw).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.agent.max_iterations, 20);
        assert_eq!(cfg.agent.agent_mode_threshold, 50);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let raw = r#"
            [agent]
            provider = "mistral"
            max_tokens = 4096

            [store]
            db_path = "~/.studyplan/sessions.db"

            [providers]
        "#;
        let cfg: StudyplanConfig = toml::from_str(raw).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_pricing_override_merges() {
        let raw = r#"
            [agent]
            provider = "google"
            max_tokens = 4096

            [store]
            db_path = "sessions.db"

            [providers]

            [pricing.baseline]
            input_per_mtok = 0.1
            output_per_mtok = 0.4

            [pricing.models.my-model]
            input_per_mtok = 7.0
            output_per_mtok = 21.0
        "#;
        let cfg: StudyplanConfig = toml::from_str(raw).unwrap();
        let table = cfg.pricing_table();
        assert_eq!(table.baseline.input_per_mtok, 0.1);
        assert!(table.models.contains_key("my-model"));
        // Built-in entries survive the merge
        assert!(table.models.contains_key("gpt-4o"));
    }

    #[test]
    fn test_debug_masks_api_keys() {
        let cfg = AnthropicConfig {
            api_key: "sk-ant-api03-abcdef".to_string(),
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
        };
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("abcdef"));
    }

    #[test]
    fn test_expand_env_var() {
        unsafe { std::env::set_var("STUDYPLAN_TEST_KEY", "value-123") };
        assert_eq!(expand_str("${STUDYPLAN_TEST_KEY}"), "value-123");
    }
}
