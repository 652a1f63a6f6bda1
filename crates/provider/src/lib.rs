pub mod types;

mod error;
mod http;
pub mod testing;

pub use error::ProviderError;
pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

/// The one seam between this engine and the outside chat-completion world.
/// `AgentClient` (forge-core) only ever talks to this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

fn resolve_base_url(name: &str, config: &forge_config::Config) -> String {
    config
        .provider
        .entry(name)
        .and_then(|e| e.base_url.clone())
        .or_else(|| {
            forge_config::find_provider_def(name).map(|d| d.default_base_url.to_string())
        })
        .unwrap_or_default()
}

fn resolve_api_key(name: &str, config: &forge_config::Config) -> Result<String> {
    if let Some(key) = config.provider.entry(name).and_then(|e| e.api_key.clone()) {
        return Ok(key);
    }
    if let Some(def) = forge_config::find_provider_def(name) {
        if let Ok(key) = std::env::var(def.env_var) {
            if !key.is_empty() {
                return Ok(key);
            }
        }
    }
    Err(ProviderError::MissingCredential(name.to_string()).into())
}

/// Builds the configured `Provider` for a given provider id (e.g.
/// `"openai"`, `"anthropic"`, or any id with a custom `base_url` in
/// config). Credential resolution order: explicit `forge.toml` entry, then
/// the provider's well-known environment variable.
pub fn create_provider(name: &str, config: &forge_config::Config) -> Result<Box<dyn Provider>> {
    let api_key = resolve_api_key(name, config)?;
    let base_url = resolve_base_url(name, config);
    let model = config
        .provider
        .entry(name)
        .and_then(|e| e.model.clone())
        .unwrap_or_else(|| "gpt-4.1".to_string());
    Ok(Box::new(http::HttpProvider::new(
        name.to_string(),
        api_key,
        base_url,
        model,
    )))
}
