//! A scripted `Provider` double for exercising the orchestration engine
//! without a real model endpoint, in the spirit of other agent-harness test
//! suites in this ecosystem that stub the completion call behind the same
//! trait the production code depends on.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::*;
use crate::Provider;

/// Returns one scripted reply per call to `chat`, cycling through `replies`
/// in order and repeating the last one once exhausted. Every request it
/// receives is recorded for assertions.
pub struct FixtureProvider {
    name: String,
    replies: Vec<String>,
    next: Mutex<usize>,
    received: Mutex<Vec<ChatRequest>>,
}

impl FixtureProvider {
    pub fn new(replies: Vec<impl Into<String>>) -> Self {
        Self {
            name: "fixture".to_string(),
            replies: replies.into_iter().map(Into::into).collect(),
            next: Mutex::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn single(reply: impl Into<String>) -> Self {
        Self::new(vec![reply.into()])
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for FixtureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.received.lock().unwrap().push(request.clone());
        let mut idx = self.next.lock().unwrap();
        let reply = self
            .replies
            .get(*idx)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        if *idx + 1 < self.replies.len() {
            *idx += 1;
        }
        Ok(ChatResponse { content: reply })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_through_scripted_replies() {
        let provider = FixtureProvider::new(vec!["first", "second"]);
        let req = ChatRequest {
            model: "test".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            options: serde_json::Value::Null,
        };
        assert_eq!(provider.chat(&req).await.unwrap().content, "first");
        assert_eq!(provider.chat(&req).await.unwrap().content, "second");
        assert_eq!(provider.chat(&req).await.unwrap().content, "second");
        assert_eq!(provider.call_count(), 3);
    }
}
