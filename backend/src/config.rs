//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Default system prompt prepended to every provider request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an intelligent assistant. Format every reply as Markdown. \
Write all mathematical formulas in standard LaTeX: wrap inline formulas in `$...$` and block formulas in `$$...$$`.";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Persistence configuration
    pub persistence: PersistenceConfig,
    /// Streaming configuration
    pub streaming: StreamingConfig,
    /// Upstream LLM endpoints
    pub providers: ProvidersConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file
    pub database_path: String,
    /// Directory uploaded images are written to and served from
    pub uploads_dir: String,
}

/// Streaming configuration
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Capacity of the worker-to-consumer handoff channel
    pub handoff_capacity: usize,
    /// Connect timeout for upstream provider requests (in seconds)
    pub connect_timeout_secs: u64,
    /// System prompt placed before the dialog history
    pub system_prompt: String,
}

/// Credentials and base URL of one OpenAI-compatible endpoint
#[derive(Clone)]
pub struct EndpointConfig {
    /// Base URL, e.g. `https://api.deepseek.com/v1`
    pub base_url: String,
    /// Bearer token; empty when not configured
    pub api_key: String,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}

/// Upstream provider endpoints
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    /// DeepSeek (chat and reasoner models)
    pub deepseek: EndpointConfig,
    /// Baidu Qianfan (ERNIE models)
    pub qianfan: EndpointConfig,
    /// Alibaba DashScope compatible mode (Qwen models)
    pub dashscope: EndpointConfig,
    /// Tencent Hunyuan
    pub hunyuan: EndpointConfig,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8000),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_origins: env::var("CORS_ORIGINS")
                    .map(|v| parse_list(&v))
                    .unwrap_or_else(|_| {
                        vec![
                            "http://localhost:3000".to_string(),
                            "http://localhost:3001".to_string(),
                        ]
                    }),
            },
            persistence: PersistenceConfig {
                database_path: env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| "data/chat.db".to_string()),
                uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            },
            streaming: StreamingConfig {
                handoff_capacity: env::var("HANDOFF_CAPACITY")
                    .ok()
                    .and_then(|c| c.parse().ok())
                    .filter(|c| *c > 0)
                    .unwrap_or(1),
                connect_timeout_secs: env::var("PROVIDER_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
                system_prompt: env::var("SYSTEM_PROMPT")
                    .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            },
            providers: ProvidersConfig {
                deepseek: endpoint_from_env("DEEPSEEK", "https://api.deepseek.com/v1"),
                qianfan: endpoint_from_env("QIANFAN", "https://qianfan.baidubce.com/v2"),
                dashscope: endpoint_from_env(
                    "DASHSCOPE",
                    "https://dashscope.aliyuncs.com/compatible-mode/v1",
                ),
                hunyuan: endpoint_from_env("HUNYUAN", "https://api.hunyuan.cloud.tencent.com/v1"),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn endpoint_from_env(prefix: &str, default_base_url: &str) -> EndpointConfig {
    EndpointConfig {
        base_url: env::var(format!("{prefix}_BASE_URL"))
            .unwrap_or_else(|_| default_base_url.to_string()),
        api_key: env::var(format!("{prefix}_API_KEY")).unwrap_or_default(),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_trims_and_skips_empty() {
        let origins = parse_list(" http://a.test , ,http://b.test,");
        assert_eq!(origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_endpoint_debug_redacts_key() {
        let endpoint = EndpointConfig {
            base_url: "https://example.test/v1".to_string(),
            api_key: "sk-secret".to_string(),
        };
        let rendered = format!("{:?}", endpoint);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn test_server_addr() {
        let mut config = Config::from_env();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9000;
        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }
}
