//! Orchestration engine: agent roles, the file store agents author into,
//! the free-text-to-operation parser, test execution, security scanning,
//! peer review, team composition, and the iteration loop that ties them
//! together into a single workflow run.

pub mod agent_client;
pub mod error;
pub mod file_store;
pub mod iteration_controller;
pub mod operation_parser;
pub mod path_filter;
pub mod review_coordinator;
pub mod roles;
pub mod security_scanner;
pub mod task_clarifier;
pub mod tdd_controller;
pub mod team_builder;
pub mod test_runner;

pub use agent_client::{AgentClient, AgentSpec};
pub use error::ForgeError;
pub use file_store::{FileEntry, FileOp, FileStore, FileStoreError};
pub use iteration_controller::{IterationController, WorkflowConfig, WorkflowReport};
pub use review_coordinator::{ReviewCoordinator, ReviewOutcome};
pub use roles::{ResponseFormat, Role};
pub use security_scanner::{scan_project, Finding, ScanReport, Severity};
pub use task_clarifier::{clarify, ClarifiedTask};
pub use tdd_controller::{TddController, TddPhase, TddReport};
pub use team_builder::{Complexity, Domain, TeamAnalysis, TeamBuilder};
pub use test_runner::{TestCase, TestResult, TestRunner};
