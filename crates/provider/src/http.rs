use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::types::*;
use crate::{Provider, ProviderError};

/// A single concrete `Provider` speaking a generic chat-completion
/// contract: POST `{model, messages, temperature, options}`, expect back
/// `{content}`. Modeled on the request/response handling of this
/// codebase's OpenAI-style provider, trimmed of streaming, tool-call, and
/// vision plumbing these agents never use (agents communicate only via
/// fenced file-operation text).
pub struct HttpProvider {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl HttpProvider {
    pub fn new(name: String, api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            name,
            base_url,
            api_key,
            default_model,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": role_str(m.role),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let serde_json::Value::Object(opts) = &request.options {
            if let serde_json::Value::Object(body_obj) = &mut body {
                for (k, v) in opts {
                    body_obj.insert(k.clone(), v.clone());
                }
            }
        }

        let resp = self
            .client
            .post(self.chat_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(status.as_u16(), text).into());
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("failed to decode JSON body: {e}"))
        })?;

        let content = data
            .get("content")
            .and_then(|v| v.as_str())
            .or_else(|| {
                data.get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                    .and_then(|v| v.as_str())
            })
            .ok_or_else(|| {
                ProviderError::MalformedResponse(
                    "response body has neither `content` nor `choices[0].message.content`".into(),
                )
            })?
            .to_string();

        Ok(ChatResponse { content })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}
