use serde::Deserialize;

use crate::gateway::ProviderSelection;

/// Default system directive prepended to every stitched conversation when the
/// caller does not supply one of their own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Jibu, a friendly and knowledgeable digital advisor. \
Answer clearly and concisely, match the user's tone and language, \
and keep your advice grounded in practical next steps.";

/// Main configuration structure for Jibu
///
/// Built once at process start and passed explicitly into the server and
/// adapters; nothing reads the environment after startup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity-service (session verification) configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Chat defaults (provider selection, system directive)
    #[serde(default)]
    pub chat: ChatConfig,
    /// Local streaming backend configuration
    #[serde(default)]
    pub local: LocalBackendConfig,
    /// Hosted streaming backend configuration
    #[serde(default)]
    pub hosted: HostedBackendConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8787")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Overall timeout for a single upstream call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Identity-service configuration
///
/// The anon key is never stored in the config file; the file names the
/// environment variable it is resolved from at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity service (empty = not configured)
    #[serde(default)]
    pub identity_url: String,
    /// Environment variable name for the identity service anon key
    #[serde(default = "default_anon_key_env")]
    pub anon_key_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_url: String::new(),
            anon_key_env: default_anon_key_env(),
        }
    }
}

fn default_anon_key_env() -> String {
    "JIBU_IDENTITY_ANON_KEY".to_string()
}

/// Chat defaults
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Provider used when the request does not name one
    #[serde(default)]
    pub default_provider: ProviderSelection,
    /// System directive used when the request does not carry one
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderSelection::default(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Local newline-delimited-JSON backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalBackendConfig {
    /// Base URL of the local inference server
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    /// Model identifier requested from the local backend
    #[serde(default = "default_local_model")]
    pub model: String,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            model: default_local_model(),
        }
    }
}

fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "gemma2:2b".to_string()
}

/// Hosted SSE backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HostedBackendConfig {
    /// Chat completions endpoint URL
    #[serde(default = "default_hosted_api_url")]
    pub api_url: String,
    /// Model identifier requested from the hosted backend
    #[serde(default = "default_hosted_model")]
    pub model: String,
    /// Environment variable name for the hosted API key
    #[serde(default = "default_hosted_api_key_env")]
    pub api_key_env: String,
    /// Sampling temperature sent with each request
    #[serde(default = "default_hosted_temperature")]
    pub temperature: f32,
}

impl Default for HostedBackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_hosted_api_url(),
            model: default_hosted_model(),
            api_key_env: default_hosted_api_key_env(),
            temperature: default_hosted_temperature(),
        }
    }
}

fn default_hosted_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_hosted_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_hosted_api_key_env() -> String {
    "JIBU_HOSTED_API_KEY".to_string()
}

fn default_hosted_temperature() -> f32 {
    0.4
}
