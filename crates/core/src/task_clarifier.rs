//! `TaskClarifier` — a single best-effort rewrite of the
//! raw task text through the classifier-role agent. Never raises: any
//! failure or empty reply falls back to the raw text unchanged.

use crate::agent_client::AgentClient;

#[derive(Debug, Clone)]
pub struct ClarifiedTask {
    pub clarified: String,
    pub original: String,
    pub warning: Option<String>,
}

const REWRITE_PREAMBLE: &str =
    "Rewrite the following task description as a clear, unambiguous set of \
     requirements suitable for a software team to implement. Do not invent \
     scope beyond what is implied. Respond with the rewritten text only.\n\n";

pub async fn clarify(classifier: &mut AgentClient, raw: &str) -> ClarifiedTask {
    let prompt = format!("{REWRITE_PREAMBLE}{raw}");
    match classifier.step(&prompt).await {
        Ok(reply) if !reply.trim().is_empty() => ClarifiedTask {
            clarified: reply,
            original: raw.to_string(),
            warning: None,
        },
        Ok(_) => ClarifiedTask {
            clarified: raw.to_string(),
            original: raw.to_string(),
            warning: Some("clarifier returned an empty reply; using raw task text".to_string()),
        },
        Err(e) => ClarifiedTask {
            clarified: raw.to_string(),
            original: raw.to_string(),
            warning: Some(format!("clarifier call failed ({e}); using raw task text")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use forge_provider::testing::FixtureProvider;
    use std::sync::Arc;

    #[tokio::test]
    async fn successful_clarification_returns_rewritten_text() {
        let provider = Arc::new(FixtureProvider::single("Build a REST API with X, Y, Z."));
        let mut classifier = AgentClient::new(
            crate::agent_client::AgentSpec::new(Role::ProductManager, "clarifier"),
            provider,
            "gpt-4.1",
        );
        let result = clarify(&mut classifier, "make me an api").await;
        assert_eq!(result.clarified, "Build a REST API with X, Y, Z.");
        assert_eq!(result.original, "make me an api");
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_raw_with_warning() {
        let provider = Arc::new(FixtureProvider::single("   "));
        let mut classifier = AgentClient::new(
            crate::agent_client::AgentSpec::new(Role::ProductManager, "clarifier"),
            provider,
            "gpt-4.1",
        );
        let result = clarify(&mut classifier, "raw task").await;
        assert_eq!(result.clarified, "raw task");
        assert!(result.warning.is_some());
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_raw_without_raising() {
        struct FailingProvider;
        #[async_trait::async_trait]
        impl forge_provider::Provider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }
            async fn chat(
                &self,
                _req: &forge_provider::ChatRequest,
            ) -> anyhow::Result<forge_provider::ChatResponse> {
                Err(anyhow::anyhow!("down"))
            }
        }

        let mut classifier = AgentClient::new(
            crate::agent_client::AgentSpec::new(Role::ProductManager, "clarifier"),
            Arc::new(FailingProvider),
            "gpt-4.1",
        );
        let result = clarify(&mut classifier, "raw task").await;
        assert_eq!(result.clarified, "raw task");
        assert!(result.warning.unwrap().contains("clarifier call failed"));
    }
}
