//! Provider registry
//!
//! Maps the model selectors clients send (`model1`..`model6`, or the upstream
//! model name) to a provider instance and its capabilities.

use crate::config::{EndpointConfig, ProvidersConfig};
use crate::provider::{ChatProvider, OpenAiCompatibleProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Static description of one selectable model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Selector clients send, e.g. `model2`
    pub selector: String,
    /// Upstream model name, also accepted as an alias
    pub upstream_model: String,
    /// Whether the model streams a reasoning channel
    pub reasoning: bool,
}

/// A selector resolved to a concrete provider
#[derive(Clone)]
pub struct ResolvedModel {
    /// The matching model description
    pub spec: ModelSpec,
    /// Provider that serves it
    pub provider: Arc<dyn ChatProvider>,
}

/// Registry of selectable models
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    models: HashMap<String, ResolvedModel>,
    aliases: HashMap<String, String>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry of built-in models from endpoint configuration
    pub fn from_config(config: &ProvidersConfig, connect_timeout_secs: u64) -> Self {
        let mut registry = Self::new();
        let builtin: [(&str, &str, &EndpointConfig, bool); 6] = [
            ("model1", "deepseek-chat", &config.deepseek, false),
            ("model2", "deepseek-reasoner", &config.deepseek, true),
            ("model3", "ernie-4.5-8k-preview", &config.qianfan, false),
            ("model4", "qwq-plus", &config.dashscope, true),
            ("model5", "hunyuan-turbos-latest", &config.hunyuan, false),
            ("model6", "ernie-4.5-8k-preview", &config.qianfan, false),
        ];

        for (selector, upstream_model, endpoint, reasoning) in builtin {
            if endpoint.api_key.is_empty() {
                warn!(
                    selector = %selector,
                    base_url = %endpoint.base_url,
                    "No API key configured, requests to this model will be rejected upstream"
                );
            }
            let provider = OpenAiCompatibleProvider::new(
                endpoint.base_url.clone(),
                endpoint.api_key.clone(),
                upstream_model,
                connect_timeout_secs,
            );
            registry.register(
                ModelSpec {
                    selector: selector.to_string(),
                    upstream_model: upstream_model.to_string(),
                    reasoning,
                },
                Arc::new(provider),
            );
        }

        info!(model_count = registry.models.len(), "Provider registry initialized");
        registry
    }

    /// Register a model under its selector
    ///
    /// The upstream model name becomes an alias unless an earlier model
    /// already claimed it.
    pub fn register(&mut self, spec: ModelSpec, provider: Arc<dyn ChatProvider>) {
        self.aliases
            .entry(spec.upstream_model.clone())
            .or_insert_with(|| spec.selector.clone());
        self.models
            .insert(spec.selector.clone(), ResolvedModel { spec, provider });
    }

    /// Look up a selector or upstream model name
    pub fn resolve(&self, selector: &str) -> Option<ResolvedModel> {
        if let Some(model) = self.models.get(selector) {
            return Some(model.clone());
        }
        self.aliases
            .get(selector)
            .and_then(|canonical| self.models.get(canonical))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProvidersConfig {
        let endpoint = |url: &str| EndpointConfig {
            base_url: url.to_string(),
            api_key: "key".to_string(),
        };
        ProvidersConfig {
            deepseek: endpoint("https://deepseek.test/v1"),
            qianfan: endpoint("https://qianfan.test/v2"),
            dashscope: endpoint("https://dashscope.test/v1"),
            hunyuan: endpoint("https://hunyuan.test/v1"),
        }
    }

    #[test]
    fn test_builtin_selectors_resolve() {
        let registry = ProviderRegistry::from_config(&test_config(), 5);
        for selector in ["model1", "model2", "model3", "model4", "model5", "model6"] {
            assert!(registry.resolve(selector).is_some(), "{} should resolve", selector);
        }
        assert!(registry.resolve("model7").is_none());
    }

    #[test]
    fn test_upstream_name_is_alias() {
        let registry = ProviderRegistry::from_config(&test_config(), 5);
        let resolved = registry.resolve("deepseek-reasoner").unwrap();
        assert_eq!(resolved.spec.selector, "model2");
    }

    #[test]
    fn test_shared_upstream_alias_points_to_first_selector() {
        let registry = ProviderRegistry::from_config(&test_config(), 5);
        let resolved = registry.resolve("ernie-4.5-8k-preview").unwrap();
        assert_eq!(resolved.spec.selector, "model3");
    }

    #[test]
    fn test_reasoning_capability() {
        let registry = ProviderRegistry::from_config(&test_config(), 5);
        let reasoning = |selector: &str| registry.resolve(selector).unwrap().spec.reasoning;
        assert!(!reasoning("model1"));
        assert!(reasoning("model2"));
        assert!(reasoning("deepseek-reasoner"));
        assert!(reasoning("model4"));
        assert!(!reasoning("model5"));
    }
}
