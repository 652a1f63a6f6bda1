//! `IterationController` — the sequential per-agent-turn
//! loop that drives a workflow from an empty project directory to a
//! finished one. Agent turns within an iteration are strictly ordered by
//! team order; the file system is the ordering oracle, so no two agents
//! ever observe an inconsistent view of it.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent_client::AgentClient;
use crate::error::ForgeError;
use crate::file_store::{FileOp, FileStore};
use crate::operation_parser;
use crate::path_filter::should_ignore_path;
use crate::review_coordinator::{ReviewCoordinator, ReviewOutcome};
use crate::roles::Role;
use crate::security_scanner::{self, ScanReport};
use crate::test_runner::{TestResult, TestRunner};

#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    pub max_iterations: usize,
    pub min_iterations: usize,
    pub stop_on_completion: bool,
    pub testing_enabled: bool,
    pub test_command: Option<String>,
    pub review_enabled: bool,
    pub security_scan_enabled: bool,
    pub max_review_rounds: usize,
    pub completion_fraction: f64,
    pub relevant_file_window: usize,
    pub test_timeout_secs: u64,
    pub test_output_cap_bytes: usize,
}

impl WorkflowConfig {
    pub fn defaults() -> Self {
        Self {
            max_iterations: 3,
            min_iterations: 2,
            stop_on_completion: true,
            testing_enabled: true,
            test_command: None,
            review_enabled: true,
            security_scan_enabled: true,
            max_review_rounds: 2,
            completion_fraction: 0.7,
            relevant_file_window: 20,
            test_timeout_secs: 300,
            test_output_cap_bytes: 100 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentTurnRecord {
    pub agent: String,
    pub ops: Vec<FileOp>,
    pub completion_signal: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub index: usize,
    pub agent_turns: Vec<AgentTurnRecord>,
    pub test_result: Option<TestResult>,
    pub reviews: Vec<ReviewOutcome>,
}

#[derive(Debug, Clone)]
pub struct WorkflowReport {
    /// A fresh id per run, for correlating this report with its log lines —
    /// the engine itself persists no run manifest.
    pub run_id: uuid::Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub project_path: PathBuf,
    pub files: Vec<String>,
    pub iterations: Vec<IterationRecord>,
    pub final_test_result: Option<TestResult>,
    pub security_findings: Option<ScanReport>,
    pub warnings: Vec<String>,
    /// Set when an external cancellation signal stopped the loop before
    /// `max_iterations` was reached or exhausted.
    pub cancelled: bool,
}

pub struct IterationController {
    store: FileStore,
    clients: HashMap<Role, AgentClient>,
    team: Vec<Role>,
    task_text: String,
    config: WorkflowConfig,
    test_runner: TestRunner,
    reviewer: ReviewCoordinator,
    cancellation: CancellationToken,
}

impl IterationController {
    /// `team` must be non-empty — an empty team is a workflow
    /// misconfiguration and is rejected here as `ForgeError::Fatal` rather
    /// than surfacing as a confusing zero-iteration report.
    pub fn new(
        store: FileStore,
        clients: HashMap<Role, AgentClient>,
        team: Vec<Role>,
        task_text: String,
        config: WorkflowConfig,
    ) -> Result<Self, ForgeError> {
        if team.is_empty() {
            return Err(ForgeError::Fatal(
                "workflow misconfiguration: team is empty".to_string(),
            ));
        }
        let test_runner = TestRunner::new(
            config.test_command.clone(),
            config.test_timeout_secs,
            config.test_output_cap_bytes,
        );
        let reviewer = ReviewCoordinator::new(config.max_review_rounds);
        Ok(Self {
            store,
            clients,
            team,
            task_text,
            config,
            test_runner,
            reviewer,
            cancellation: CancellationToken::new(),
        })
    }

    /// Attaches an external cancellation signal, checked between agent
    /// turns and between iterations. Cancelling mid-turn is not
    /// supported — the in-flight `AgentClient::step` call completes (or
    /// times out on its own) before cancellation is observed.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    async fn build_context(&self, index: usize, recently_edited: &[String]) -> String {
        let structure = self.store.structure().await.unwrap_or_default();

        let mut files_section = String::new();
        for path in recently_edited.iter().take(self.config.relevant_file_window) {
            if let Ok(content) = self.store.read(path).await {
                files_section.push_str(&format!("--- {path} ---\n{content}\n\n"));
            }
        }

        let instruction = if index == 0 {
            "Create the project described below from scratch. Use filename:/update: fenced blocks for every file you author."
        } else {
            "Review the current project state against the task and improve or complete it. Use update: fenced blocks for any file you change."
        };

        format!(
            "Task:\n{}\n\nProject structure:\n{}\n{}\nInstruction: {}",
            self.task_text, structure, files_section, instruction
        )
    }

    fn record_edit(recently_edited: &mut Vec<String>, path: &str) {
        recently_edited.retain(|p| p != path);
        recently_edited.insert(0, path.to_string());
    }

    async fn apply_ops(
        store: &FileStore,
        ops: Vec<FileOp>,
        recently_edited: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> Vec<FileOp> {
        let mut applied = Vec::new();
        for op in ops {
            match &op {
                FileOp::Create { path, content } => match store.create(path, content).await {
                    Ok(()) => {
                        Self::record_edit(recently_edited, path);
                        applied.push(op);
                    }
                    Err(e) => warnings.push(format!("create {path} failed: {e}")),
                },
                FileOp::Update { path, content } => match store.update(path, content).await {
                    Ok(()) => {
                        Self::record_edit(recently_edited, path);
                        applied.push(op);
                    }
                    Err(e) => warnings.push(format!("update {path} failed: {e}")),
                },
                FileOp::Read { path } => {
                    // A `Read` op targeting a filtered path is reported as
                    // a "file not found" outcome to the agent, even if the
                    // path happens to exist on disk (e.g. a `.backup`
                    // sibling or a `.git/` entry) — ignore-filtering governs
                    // what an agent may observe, independent of
                    // `FileStore::read` itself, which stays a plain
                    // sanitize-only primitive.
                    if should_ignore_path(path) {
                        warnings.push(format!("read of {path} failed: filtered path"));
                    } else if store.read(path).await.is_ok() {
                        applied.push(op);
                    } else {
                        warnings.push(format!("read of {path} failed: not found"));
                    }
                }
            }
        }
        applied
    }

    /// Runs the full workflow to completion and returns its report. Never
    /// returns `Err` except for `ForgeError::Fatal` (project directory
    /// unusable) — every other failure mode is folded into `warnings` or
    /// an `AgentTurnRecord.error`.
    pub async fn run(mut self) -> Result<WorkflowReport, ForgeError> {
        let run_id = uuid::Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let mut iterations = Vec::new();
        let mut recently_edited: Vec<String> = Vec::new();
        let mut warnings = Vec::new();
        let mut final_test_result: Option<TestResult> = None;
        let mut cancelled = false;

        'iterations: for index in 0..self.config.max_iterations {
            if self.cancellation.is_cancelled() {
                cancelled = true;
                break 'iterations;
            }

            let mut agent_turns = Vec::new();
            let mut reviews = Vec::new();

            for role in self.team.clone() {
                if self.cancellation.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let context = self.build_context(index, &recently_edited).await;

                let Some(client) = self.clients.get_mut(&role) else {
                    continue;
                };
                let reply = match client.step(&context).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        agent_turns.push(AgentTurnRecord {
                            agent: role.name().to_string(),
                            ops: Vec::new(),
                            completion_signal: false,
                            error: Some(e.to_string()),
                        });
                        warn!(role = role.name(), error = %e, "agent turn failed");
                        continue;
                    }
                };

                let (ops, completion_signal, parse_warnings) = operation_parser::parse(&reply);
                warnings.extend(parse_warnings);

                let applied =
                    Self::apply_ops(&self.store, ops, &mut recently_edited, &mut warnings).await;

                if self.config.review_enabled && role.is_reviewable_author() {
                    for op in &applied {
                        if let FileOp::Create { path, .. } | FileOp::Update { path, .. } = op {
                            match self
                                .reviewer
                                .review(
                                    path,
                                    &self.task_text,
                                    role,
                                    &self.team,
                                    &mut self.clients,
                                    &self.store,
                                )
                                .await
                            {
                                Ok(outcome) => reviews.push(outcome),
                                Err(e) => {
                                    warnings.push(format!("review of {path} failed: {e}"))
                                }
                            }
                        }
                    }
                }

                agent_turns.push(AgentTurnRecord {
                    agent: role.name().to_string(),
                    ops: applied,
                    completion_signal,
                    error: None,
                });
            }

            let mut test_result = None;
            if self.config.testing_enabled && !cancelled {
                let mut result = self.test_runner.run(&self.store).await;

                if !result.success() && index >= 1 {
                    let feedback = result.format_feedback();
                    for role in self.team.clone() {
                        if !role.is_developer() {
                            continue;
                        }
                        let Some(client) = self.clients.get_mut(&role) else {
                            continue;
                        };
                        let Ok(reply) = client.step(&feedback).await else {
                            continue;
                        };
                        let (ops, _, parse_warnings) = operation_parser::parse(&reply);
                        warnings.extend(parse_warnings);
                        Self::apply_ops(&self.store, ops, &mut recently_edited, &mut warnings)
                            .await;
                    }
                    result = self.test_runner.run(&self.store).await;
                }

                final_test_result = Some(result.clone());
                test_result = Some(result);
            }

            let should_stop = self.config.stop_on_completion && {
                let total = agent_turns.len();
                let iteration_number = index + 1;
                if total == 0 || iteration_number < self.config.min_iterations {
                    false
                } else {
                    let completed = agent_turns.iter().filter(|t| t.completion_signal).count();
                    let fraction = completed as f64 / total as f64;
                    let testing_ok = !self.config.testing_enabled
                        || test_result.as_ref().map(TestResult::success).unwrap_or(false);
                    fraction >= self.config.completion_fraction && testing_ok
                }
            };

            iterations.push(IterationRecord {
                index,
                agent_turns,
                test_result,
                reviews,
            });

            if should_stop || cancelled {
                break 'iterations;
            }
        }

        let mut security_findings = None;
        if self.config.security_scan_enabled {
            let files = self.store.list(None).await.unwrap_or_default();
            let mut contents = Vec::with_capacity(files.len());
            for f in &files {
                if let Ok(c) = self.store.read(f).await {
                    contents.push((f.clone(), c));
                }
            }
            let refs: Vec<(&str, &str)> =
                contents.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
            security_findings = Some(security_scanner::scan_project(refs));
        }

        let files = self.store.list(None).await.unwrap_or_default();

        Ok(WorkflowReport {
            run_id,
            started_at,
            finished_at: chrono::Utc::now(),
            project_path: self.store.root().to_path_buf(),
            files,
            iterations,
            final_test_result,
            security_findings,
            warnings,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_client::AgentSpec;
    use forge_provider::testing::FixtureProvider;
    use std::sync::Arc;

    async fn store() -> FileStore {
        let tmp = tempfile::tempdir().unwrap();
        // Leak the tempdir so it outlives the store for the duration of
        // the test; the OS reclaims it on process exit.
        let path = tmp.into_path();
        FileStore::new(path).await.unwrap()
    }

    fn client(role: Role, replies: Vec<&str>) -> AgentClient {
        let provider = Arc::new(FixtureProvider::new(replies));
        AgentClient::new(AgentSpec::new(role, role.name()), provider, "gpt-4.1")
    }

    #[tokio::test]
    async fn empty_team_is_rejected_as_fatal() {
        let store = store().await;
        let err = IterationController::new(
            store,
            HashMap::new(),
            Vec::new(),
            "do something".to_string(),
            WorkflowConfig::defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, ForgeError::Fatal(_)));
    }

    #[tokio::test]
    async fn simple_task_creates_files_and_stops_early_on_completion() {
        let store = store().await;
        let mut clients = HashMap::new();
        clients.insert(
            Role::BackendDeveloper,
            client(
                Role::BackendDeveloper,
                vec![
                    "```filename:add.py\ndef add(a, b):\n    return a + b\n```\nstill working",
                    "project is complete, all requirements met",
                ],
            ),
        );
        clients.insert(
            Role::QaTester,
            client(
                Role::QaTester,
                vec![
                    "```filename:test_add.py\nfrom add import add\n\ndef test_add():\n    assert add(1, 2) == 3\n```\nstill working",
                    "project is complete, ready for deployment",
                ],
            ),
        );

        let mut config = WorkflowConfig::defaults();
        config.testing_enabled = false;
        config.security_scan_enabled = false;
        config.review_enabled = false;
        config.max_iterations = 5;
        config.min_iterations = 2;

        let controller = IterationController::new(
            store,
            clients,
            vec![Role::BackendDeveloper, Role::QaTester],
            "Create a Python function add(a,b) returning their sum, plus tests.".to_string(),
            config,
        )
        .unwrap();

        let report = controller.run().await.unwrap();

        assert!(report.files.contains(&"add.py".to_string()));
        assert!(report.files.contains(&"test_add.py".to_string()));
        // Completion phrases only appear from iteration index 1 onward,
        // and min_iterations=2 requires iteration_number >= 2 (index >= 1),
        // so the loop should stop after the second iteration (index 1).
        assert_eq!(report.iterations.len(), 2);
    }

    #[tokio::test]
    async fn agent_step_failure_is_recorded_and_workflow_continues() {
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
                Err(anyhow::anyhow!("endpoint down"))
            }
        }

        let store = store().await;
        let mut clients = HashMap::new();
        clients.insert(
            Role::BackendDeveloper,
            AgentClient::new(
                AgentSpec::new(Role::BackendDeveloper, "backend"),
                Arc::new(FailingProvider),
                "gpt-4.1",
            ),
        );
        clients.insert(
            Role::QaTester,
            client(Role::QaTester, vec!["project is complete"]),
        );

        let mut config = WorkflowConfig::defaults();
        config.testing_enabled = false;
        config.security_scan_enabled = false;
        config.review_enabled = false;
        config.max_iterations = 1;
        config.min_iterations = 0;

        let controller = IterationController::new(
            store,
            clients,
            vec![Role::BackendDeveloper, Role::QaTester],
            "task".to_string(),
            config,
        )
        .unwrap();

        let report = controller.run().await.unwrap();
        assert_eq!(report.iterations.len(), 1);
        let backend_turn = &report.iterations[0].agent_turns[0];
        assert!(backend_turn.error.is_some());
    }

    /// An agent requesting creation of an ignored path (`.DS_Store`,
    /// something under `.git/`) must leave the filesystem unchanged.
    #[tokio::test]
    async fn ignored_path_creation_attempts_are_silently_rejected() {
        let store = store().await;
        let mut clients = HashMap::new();
        clients.insert(
            Role::BackendDeveloper,
            client(
                Role::BackendDeveloper,
                vec![
                    "```filename:.DS_Store\njunk\n```\n```filename:src/.git/config\n[core]\n```\n```filename:real.py\nprint(1)\n```",
                    "project is complete",
                ],
            ),
        );

        let mut config = WorkflowConfig::defaults();
        config.testing_enabled = false;
        config.security_scan_enabled = false;
        config.review_enabled = false;
        config.max_iterations = 1;
        config.min_iterations = 0;

        let controller = IterationController::new(
            store,
            clients,
            vec![Role::BackendDeveloper],
            "task".to_string(),
            config,
        )
        .unwrap();

        let report = controller.run().await.unwrap();
        assert_eq!(report.files, vec!["real.py".to_string()]);
        assert!(!report.warnings.is_empty());
    }

    /// S2 from spec.md §8: a failing test run at iteration index ≥ 1
    /// triggers exactly one repair sub-iteration, and the re-run result
    /// (not the original failing one) is what lands in the iteration
    /// record.
    #[tokio::test]
    async fn failing_test_triggers_one_repair_sub_iteration_that_fixes_it() {
        let store = store().await;
        let mut clients = HashMap::new();
        clients.insert(
            Role::BackendDeveloper,
            client(
                Role::BackendDeveloper,
                vec![
                    "```filename:div.py\ndef div(a, b):\n    return a / b\n```\nstill working",
                    "still working on the zero-division case",
                    "```update:div.py\ndef div(a, b):\n    if b == 0:\n        return None\n    return a / b\n```\nfixed it",
                ],
            ),
        );

        let mut config = WorkflowConfig::defaults();
        config.security_scan_enabled = false;
        config.review_enabled = false;
        config.max_iterations = 2;
        config.min_iterations = 2;
        config.test_command = Some("grep -q 'if b == 0' div.py".to_string());

        let controller = IterationController::new(
            store,
            clients,
            vec![Role::BackendDeveloper],
            "Write a div(a,b) function that guards against division by zero.".to_string(),
            config,
        )
        .unwrap();

        let report = controller.run().await.unwrap();

        assert_eq!(report.iterations.len(), 2);
        // Iteration 0: no guard yet, no repair attempted (index < 1), so
        // the recorded result is the original failing run.
        assert!(!report.iterations[0].test_result.as_ref().unwrap().success());
        // Iteration 1: the repair sub-iteration ran once and the re-run
        // result — now passing — replaced the iteration's test result.
        assert!(report.iterations[1].test_result.as_ref().unwrap().success());
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_before_the_first_iteration() {
        let store = store().await;
        let mut clients = HashMap::new();
        clients.insert(
            Role::BackendDeveloper,
            client(Role::BackendDeveloper, vec!["```filename:a.py\nx = 1\n```"]),
        );

        let mut config = WorkflowConfig::defaults();
        config.testing_enabled = false;
        config.security_scan_enabled = false;
        config.review_enabled = false;
        config.max_iterations = 5;
        config.min_iterations = 0;

        let token = CancellationToken::new();
        token.cancel();

        let controller = IterationController::new(
            store,
            clients,
            vec![Role::BackendDeveloper],
            "task".to_string(),
            config,
        )
        .unwrap()
        .with_cancellation(token);

        let report = controller.run().await.unwrap();
        assert!(report.cancelled);
        assert!(report.iterations.is_empty());
        assert!(report.files.is_empty());
    }
}
