//! `TddController` — an alternative RED/GREEN/REFACTOR loop
//! that reuses `FileStore`/`TestRunner`/`AgentClient` via composition
//! rather than subclassing `IterationController`. Requires at least one QA
//! and one developer role in the team; anything less is a workflow
//! misconfiguration surfaced as `ForgeError::Fatal`.

use std::collections::HashMap;

use tracing::info;

use crate::agent_client::AgentClient;
use crate::error::ForgeError;
use crate::file_store::{FileOp, FileStore};
use crate::operation_parser;
use crate::roles::Role;
use crate::test_runner::{TestResult, TestRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TddPhase {
    Red,
    Green,
    Refactor,
}

#[derive(Debug, Clone)]
pub struct TddPhaseRecord {
    pub phase: TddPhase,
    pub test_result: TestResult,
    pub reverted: bool,
}

#[derive(Debug, Clone)]
pub struct TddReport {
    pub phases: Vec<TddPhaseRecord>,
    pub files: Vec<String>,
}

const GREEN_CYCLE_CAP: usize = 5;

pub struct TddController {
    store: FileStore,
    clients: HashMap<Role, AgentClient>,
    team: Vec<Role>,
    task_text: String,
    test_runner: TestRunner,
}

impl TddController {
    pub fn new(
        store: FileStore,
        clients: HashMap<Role, AgentClient>,
        team: Vec<Role>,
        task_text: String,
        test_command: Option<String>,
    ) -> Result<Self, ForgeError> {
        let has_qa = team.contains(&Role::QaTester);
        let has_developer = team.iter().any(Role::is_developer);
        if !has_qa || !has_developer {
            return Err(ForgeError::Fatal(
                "TDD mode requires at least one QA and one developer role".to_string(),
            ));
        }
        Ok(Self {
            store,
            clients,
            team,
            task_text,
            test_runner: TestRunner::with_defaults(test_command),
        })
    }

    async fn apply_reply(&mut self, reply: &str) -> Vec<FileOp> {
        let (ops, _completion, _warnings) = operation_parser::parse(reply);
        let mut applied = Vec::new();
        for op in ops {
            let result = match &op {
                FileOp::Create { path, content } => self.store.create(path, content).await,
                FileOp::Update { path, content } => self.store.update(path, content).await,
                FileOp::Read { .. } => Ok(()),
            };
            if result.is_ok() {
                applied.push(op);
            }
        }
        applied
    }

    pub async fn run(mut self) -> Result<TddReport, ForgeError> {
        let mut phases = Vec::new();

        // RED: QA writes tests only. An unexpectedly-passing RED phase is
        // treated as benign — proceed to GREEN regardless.
        let qa_role = Role::QaTester;
        {
            let prompt = format!(
                "Task:\n{}\n\nWrite test files only for this task. Do not implement the functionality itself yet. \
                 Use filename:/update: fenced blocks for every test file.",
                self.task_text
            );
            let client = self
                .clients
                .get_mut(&qa_role)
                .expect("team contains QaTester, checked in new()");
            if let Ok(reply) = client.step(&prompt).await {
                self.apply_reply(&reply).await;
            }
            let result = self.test_runner.run(&self.store).await;
            if result.success() {
                info!("RED phase tests unexpectedly passed; proceeding to GREEN anyway");
            }
            phases.push(TddPhaseRecord {
                phase: TddPhase::Red,
                test_result: result,
                reverted: false,
            });
        }

        // GREEN: developers iterate until tests pass or the cycle cap is
        // reached.
        let developer_roles: Vec<Role> =
            self.team.iter().copied().filter(Role::is_developer).collect();
        let mut green_result = self.test_runner.run(&self.store).await;
        for _cycle in 0..GREEN_CYCLE_CAP {
            if green_result.success() {
                break;
            }
            let feedback = green_result.format_feedback();
            for role in &developer_roles {
                let Some(client) = self.clients.get_mut(role) else {
                    continue;
                };
                if let Ok(reply) = client.step(&feedback).await {
                    self.apply_reply(&reply).await;
                }
            }
            green_result = self.test_runner.run(&self.store).await;
        }
        let green_passed = green_result.success();
        phases.push(TddPhaseRecord {
            phase: TddPhase::Green,
            test_result: green_result,
            reverted: false,
        });

        // REFACTOR: one cycle permitted; tests must keep passing or the
        // change is reverted via FileStore backups.
        if green_passed {
            if let Some(lead_or_dev) = self
                .team
                .iter()
                .copied()
                .find(|r| *r == Role::LeadDeveloper)
                .or_else(|| developer_roles.first().copied())
            {
                let prompt = format!(
                    "Task:\n{}\n\nTests currently pass. Refactor the implementation for clarity \
                     without changing behavior. Use update: fenced blocks only.",
                    self.task_text
                );
                let touched_paths: Vec<String> = if let Some(client) =
                    self.clients.get_mut(&lead_or_dev)
                {
                    match client.step(&prompt).await {
                        Ok(reply) => self
                            .apply_reply(&reply)
                            .await
                            .into_iter()
                            .map(|op| op.path().to_string())
                            .collect(),
                        Err(_) => Vec::new(),
                    }
                } else {
                    Vec::new()
                };

                let refactor_result = self.test_runner.run(&self.store).await;
                let reverted = if !refactor_result.success() {
                    for path in &touched_paths {
                        let backup_path = format!("{path}.backup");
                        if let Ok(prior) = self.store.read(&backup_path).await {
                            let _ = self.store.update(path, &prior).await;
                        }
                    }
                    true
                } else {
                    false
                };

                phases.push(TddPhaseRecord {
                    phase: TddPhase::Refactor,
                    test_result: refactor_result,
                    reverted,
                });
            }
        }

        let files = self.store.list(None).await.unwrap_or_default();
        Ok(TddReport { phases, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_client::AgentSpec;
    use forge_provider::testing::FixtureProvider;
    use std::sync::Arc;

    fn client(role: Role, replies: Vec<&str>) -> AgentClient {
        AgentClient::new(
            AgentSpec::new(role, role.name()),
            Arc::new(FixtureProvider::new(replies)),
            "gpt-4.1",
        )
    }

    async fn store() -> FileStore {
        let tmp = tempfile::tempdir().unwrap();
        FileStore::new(tmp.into_path()).await.unwrap()
    }

    #[tokio::test]
    async fn requires_qa_and_developer_roles() {
        let store = store().await;
        let err = TddController::new(
            store,
            HashMap::new(),
            vec![Role::QaTester],
            "task".to_string(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ForgeError::Fatal(_)));
    }

    #[tokio::test]
    async fn accepts_team_with_both_roles() {
        let store = store().await;
        let mut clients = HashMap::new();
        clients.insert(Role::QaTester, client(Role::QaTester, vec!["no tests written"]));
        clients.insert(
            Role::BackendDeveloper,
            client(Role::BackendDeveloper, vec!["no implementation"]),
        );
        let result = TddController::new(
            store,
            clients,
            vec![Role::QaTester, Role::BackendDeveloper],
            "task".to_string(),
            None,
        );
        assert!(result.is_ok());
    }
}
