use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use forge_core::{
    AgentClient, AgentSpec, FileStore, IterationController, Role, TddController, TeamBuilder,
    WorkflowConfig,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "forge", about = "Multi-agent engine that builds runnable software projects from a task description", version)]
struct Cli {
    /// The task to build, in free text
    task: String,

    /// Project directory name; default is derived from the task
    #[arg(long)]
    name: Option<String>,

    /// Parent directory for the generated project
    #[arg(long, default_value = "./generated_projects")]
    output: PathBuf,

    /// Maximum number of iterations (default: from forge.toml, else 3)
    #[arg(long)]
    iterations: Option<u32>,

    /// Minimum iterations before early stop is considered (default: from forge.toml, else 2)
    #[arg(long)]
    min_iterations: Option<u32>,

    /// Disable completion-based early stop
    #[arg(long)]
    no_auto_stop: bool,

    /// Override team composition, e.g. --agents backend:Ada qa:Grace
    #[arg(long, value_name = "ROLE[:NAME]")]
    agents: Vec<String>,

    /// Disable TeamBuilder; use a default Lead/Backend/QA team
    #[arg(long)]
    no_auto_team: bool,

    /// Cap the team size
    #[arg(long)]
    max_team_size: Option<usize>,

    /// Override test framework detection with an explicit command
    #[arg(long)]
    test_command: Option<String>,

    /// Disable test execution entirely
    #[arg(long)]
    no_testing: bool,

    /// Disable the peer review pass
    #[arg(long)]
    no_collaborative_review: bool,

    /// Disable the post-loop security scan
    #[arg(long)]
    no_security_scan: bool,

    /// Use the RED/GREEN/REFACTOR TDD loop instead of the default one
    #[arg(long)]
    tdd: bool,

    /// Provider id to use (default: the configured default provider)
    #[arg(long)]
    provider: Option<String>,

    /// Model name to request from the provider
    #[arg(long)]
    model: Option<String>,
}

fn derive_project_name(task: &str) -> String {
    let slug: String = task
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let collapsed: String = slug
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let truncated: String = collapsed.chars().take(50).collect();
    if truncated.is_empty() {
        "project".to_string()
    } else {
        truncated
    }
}

fn parse_role(s: &str) -> Option<Role> {
    match s.to_lowercase().as_str() {
        "ceo" => Some(Role::Ceo),
        "pm" | "productmanager" | "product_manager" => Some(Role::ProductManager),
        "lead" | "leaddeveloper" | "lead_developer" => Some(Role::LeadDeveloper),
        "backend" | "backenddeveloper" | "backend_developer" => Some(Role::BackendDeveloper),
        "frontend" | "frontenddeveloper" | "frontend_developer" => Some(Role::FrontendDeveloper),
        "qa" | "qatester" | "qa_tester" => Some(Role::QaTester),
        "devops" => Some(Role::DevOps),
        "designer" => Some(Role::Designer),
        "security" => Some(Role::Security),
        "techwriter" | "tech_writer" => Some(Role::TechWriter),
        "datascientist" | "data_scientist" => Some(Role::DataScientist),
        _ => None,
    }
}

/// Parses `--agents` entries of the form `role` or `role:name`.
fn parse_explicit_agents(entries: &[String]) -> Vec<(Role, Option<String>)> {
    let mut out = Vec::new();
    for entry in entries {
        let mut parts = entry.splitn(2, ':');
        let Some(role_str) = parts.next() else { continue };
        let Some(role) = parse_role(role_str) else {
            tracing::warn!(entry, "unrecognized role in --agents, skipping");
            continue;
        };
        out.push((role, parts.next().map(str::to_string)));
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("forge=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let global_config = forge_config::Config::load().context("failed to load configuration")?;
    let config = match forge_config::Config::load_project(&cli.output) {
        Ok(Some(project_config)) => project_config,
        _ => global_config,
    };

    let provider_name = cli
        .provider
        .clone()
        .unwrap_or_else(|| config.provider.default.clone());
    let model = cli
        .model
        .clone()
        .or_else(|| {
            config
                .provider
                .entry(&provider_name)
                .and_then(|e| e.model.clone())
        })
        .unwrap_or_else(|| "gpt-4.1".to_string());

    let provider: Arc<dyn forge_provider::Provider> =
        Arc::from(forge_provider::create_provider(&provider_name, &config)
            .context("failed to configure model provider")?);

    let project_name = cli.name.clone().unwrap_or_else(|| derive_project_name(&cli.task));
    let project_path = cli.output.join(&project_name);

    let store = FileStore::new(&project_path)
        .await
        .context("failed to create project directory")?;

    let mut classifier = AgentClient::new(
        AgentSpec::new(Role::ProductManager, "classifier"),
        provider.clone(),
        model.clone(),
    );
    let clarified = forge_core::clarify(&mut classifier, &cli.task).await;
    if let Some(warning) = &clarified.warning {
        tracing::warn!(%warning, "task clarification fell back to raw text");
    }

    let max_team_size = cli.max_team_size.or(config.workflow.max_team_size);

    let explicit_agents = parse_explicit_agents(&cli.agents);
    let team: Vec<Role> = if !explicit_agents.is_empty() {
        explicit_agents.iter().map(|(role, _)| *role).collect()
    } else if cli.no_auto_team {
        vec![Role::LeadDeveloper, Role::BackendDeveloper, Role::QaTester]
    } else {
        TeamBuilder::build(&mut classifier, &clarified.clarified, max_team_size).await
    };

    if team.is_empty() {
        bail!("no agent team could be composed for this task");
    }

    let mut clients: HashMap<Role, AgentClient> = HashMap::new();
    for role in &team {
        let name = explicit_agents
            .iter()
            .find(|(r, _)| r == role)
            .and_then(|(_, n)| n.clone())
            .unwrap_or_else(|| role.name().to_string());
        clients.insert(
            *role,
            AgentClient::new(AgentSpec::new(*role, name), provider.clone(), model.clone()),
        );
    }

    let test_command = cli
        .test_command
        .clone()
        .or_else(|| config.test_runner.custom_command.clone());

    if cli.tdd {
        let controller = TddController::new(
            store,
            clients,
            team,
            clarified.clarified,
            test_command.clone(),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;

        let report = controller.run().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        for phase in &report.phases {
            println!(
                "{:?}: {} (reverted: {})",
                phase.phase,
                phase.test_result.format_feedback(),
                phase.reverted
            );
        }
        println!("files written: {}", report.files.len());
        return Ok(());
    }

    let workflow_config = WorkflowConfig {
        max_iterations: cli.iterations.unwrap_or(config.workflow.max_iterations) as usize,
        min_iterations: cli.min_iterations.unwrap_or(config.workflow.min_iterations) as usize,
        stop_on_completion: if cli.no_auto_stop { false } else { config.workflow.stop_on_completion },
        testing_enabled: if cli.no_testing { false } else { config.workflow.testing_enabled },
        test_command,
        review_enabled: if cli.no_collaborative_review { false } else { config.workflow.review_enabled },
        security_scan_enabled: if cli.no_security_scan { false } else { config.workflow.security_scan_enabled },
        max_review_rounds: config.workflow.max_review_rounds as usize,
        completion_fraction: config.workflow.completion_fraction,
        relevant_file_window: config.workflow.relevant_file_window,
        test_timeout_secs: config.test_runner.timeout_secs,
        test_output_cap_bytes: config.test_runner.output_cap_bytes,
    };

    let cancellation = CancellationToken::new();
    let ctrl_c_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing the current agent turn then stopping");
            ctrl_c_token.cancel();
        }
    });

    let controller = IterationController::new(
        store,
        clients,
        team,
        clarified.clarified,
        workflow_config,
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?
    .with_cancellation(cancellation);

    let report = controller.run().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    if report.cancelled {
        tracing::warn!("workflow stopped early due to cancellation");
    }

    println!("project: {}", report.project_path.display());
    println!("files: {}", report.files.len());
    println!("iterations run: {}", report.iterations.len());
    if let Some(result) = &report.final_test_result {
        println!("tests: {}", result.format_feedback());
    }
    if let Some(findings) = &report.security_findings {
        println!("security findings: {}", findings.total);
    }
    for warning in &report.warnings {
        tracing::warn!(%warning, "workflow warning");
    }

    Ok(())
}
