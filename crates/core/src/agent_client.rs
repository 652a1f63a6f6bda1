//! `AgentClient` — a thin, stateful wrapper over a chat
//! completion `Provider`: carries role, system prompt, temperature, and a
//! monotonically growing message history owned exclusively by this agent.

use std::sync::Arc;

use forge_provider::{ChatRequest, Message, Provider};

use crate::error::ForgeError;
use crate::roles::Role;

/// The identity and conversational state of one role-specialized agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub role: Role,
    pub name: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub message_history: Vec<Message>,
}

impl AgentSpec {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            system_prompt: role.default_system_prompt(),
            temperature: role.default_temperature(),
            role,
            name: name.into(),
            message_history: Vec::new(),
        }
    }
}

/// Wraps an `AgentSpec` and a `Provider`. `step` appends `input` to the
/// history, invokes the endpoint with the full concatenated history and
/// this agent's temperature, appends the reply, and returns it. Callers do
/// not retry silently on failure — the error is surfaced so the workflow
/// can record it and continue with the remaining agents.
pub struct AgentClient {
    pub spec: AgentSpec,
    provider: Arc<dyn Provider>,
    model: String,
}

impl AgentClient {
    pub fn new(spec: AgentSpec, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            spec,
            provider,
            model: model.into(),
        }
    }

    pub async fn step(&mut self, input: &str) -> Result<String, ForgeError> {
        self.spec.message_history.push(Message::user(input));

        let mut messages = Vec::with_capacity(self.spec.message_history.len() + 1);
        messages.push(Message::system(self.spec.system_prompt.clone()));
        messages.extend(self.spec.message_history.clone());

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.spec.temperature,
            options: serde_json::Value::Null,
        };

        match self.provider.chat(&request).await {
            Ok(response) => {
                self.spec
                    .message_history
                    .push(Message::assistant(response.content.clone()));
                Ok(response.content)
            }
            Err(e) => Err(ForgeError::Agent(format!(
                "{} ({}): {e}",
                self.spec.name,
                self.spec.role.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_provider::testing::FixtureProvider;

    #[tokio::test]
    async fn step_grows_history_in_insertion_order() {
        let provider = Arc::new(FixtureProvider::single("ok, understood"));
        let mut client = AgentClient::new(
            AgentSpec::new(Role::BackendDeveloper, "backend-1"),
            provider,
            "gpt-4.1",
        );

        client.step("do the thing").await.unwrap();
        assert_eq!(client.spec.message_history.len(), 2);
        assert_eq!(client.spec.message_history[0].content, "do the thing");
        assert_eq!(client.spec.message_history[1].content, "ok, understood");

        client.step("now another thing").await.unwrap();
        assert_eq!(client.spec.message_history.len(), 4);
        assert_eq!(client.spec.message_history[2].content, "now another thing");
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_agent_error() {
        struct FailingProvider;
        #[async_trait::async_trait]
        impl Provider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }
            async fn chat(&self, _req: &ChatRequest) -> anyhow::Result<forge_provider::ChatResponse> {
                Err(anyhow::anyhow!("endpoint unreachable"))
            }
        }

        let mut client = AgentClient::new(
            AgentSpec::new(Role::QaTester, "qa-1"),
            Arc::new(FailingProvider),
            "gpt-4.1",
        );
        let err = client.step("write tests").await.unwrap_err();
        assert!(matches!(err, ForgeError::Agent(_)));
    }
}
