//! `TeamBuilder` — turns a task description into an ordered
//! team of roles. Tries an LLM classifier call first; any failure mode
//! (unreachable endpoint, invalid JSON, an out-of-range size) falls back to
//! a deterministic keyword classifier so a team is always produced.

use serde::Deserialize;

use crate::agent_client::AgentClient;
use crate::roles::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Frontend,
    Backend,
    Database,
    Security,
    DataScience,
    Mobile,
    Devops,
    Testing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamAnalysis {
    pub project_type: String,
    pub complexity: Complexity,
    pub domains: Vec<Domain>,
    pub requires_security: bool,
    pub requires_ui: bool,
    pub requires_testing: bool,
    pub requires_data_science: bool,
    pub estimated_team_size: u8,
}

const CLASSIFIER_PROMPT_PREAMBLE: &str = "Analyze the following software task and respond with ONLY a JSON object of the shape \
{\"project_type\": string, \"complexity\": \"simple\"|\"medium\"|\"complex\", \
\"domains\": [\"frontend\"|\"backend\"|\"database\"|\"security\"|\"data_science\"|\"mobile\"|\"devops\"|\"testing\"], \
\"requires_security\": bool, \"requires_ui\": bool, \"requires_testing\": bool, \
\"requires_data_science\": bool, \"estimated_team_size\": integer between 1 and 8}. Task:\n\n";

/// Attempts the LLM classifier; returns `None` on any failure (unreachable
/// endpoint, invalid JSON, an out-of-range size) so the caller falls back
/// to the deterministic keyword classifier. A `estimated_team_size` of
/// exactly 0 is not treated as out-of-range — it's clamped to 1, per
/// spec.md §8 — the rest of the analysis is kept rather than discarded.
async fn classify_via_llm(classifier: &mut AgentClient, task_text: &str) -> Option<TeamAnalysis> {
    let prompt = format!("{CLASSIFIER_PROMPT_PREAMBLE}{task_text}");
    let reply = classifier.step(&prompt).await.ok()?;
    let json_slice = extract_json_object(&reply)?;
    let mut analysis: TeamAnalysis = serde_json::from_str(json_slice).ok()?;
    if analysis.estimated_team_size == 0 {
        analysis.estimated_team_size = 1;
    } else if analysis.estimated_team_size > 8 {
        return None;
    }
    Some(analysis)
}

/// Agents are prone to wrap JSON in prose or a fence; take the first
/// balanced `{...}` span.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn classify_via_keywords(task_text: &str) -> TeamAnalysis {
    let lower = task_text.to_lowercase();
    let mut domains = Vec::new();

    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(&["frontend", "react", "vue", "ui ", "website", "web app", "css"]) {
        domains.push(Domain::Frontend);
    }
    if has_any(&["backend", "api", "server"]) {
        domains.push(Domain::Backend);
    }
    if has_any(&["database", "db", "sql", "postgres", "mongo"]) {
        domains.push(Domain::Database);
    }
    if has_any(&["mobile", "ios", "android", "react native"]) {
        domains.push(Domain::Mobile);
    }
    if has_any(&["deploy", "docker", "kubernetes", "ci/cd", "devops"]) {
        domains.push(Domain::Devops);
    }
    if has_any(&["test", "testing", "qa"]) {
        domains.push(Domain::Testing);
    }

    let requires_security = has_any(&["auth", "security", "encryption", "login", "payment"]);
    let requires_data_science = has_any(&["machine learning", "data science", "ml ", "analytics", "pandas"]);
    if requires_data_science {
        domains.push(Domain::DataScience);
    }
    if requires_security && !domains.contains(&Domain::Security) {
        domains.push(Domain::Security);
    }

    let requires_ui = domains.contains(&Domain::Frontend) || has_any(&["ui", "interface", "design"]);
    let requires_testing = !has_any(&["prototype", "no tests"]);

    let complexity = if has_any(&["simple", "small", "quick", "prototype"]) {
        Complexity::Simple
    } else if has_any(&["enterprise", "complex", "large-scale", "distributed"]) {
        Complexity::Complex
    } else {
        Complexity::Medium
    };

    let estimated_team_size = (domains.len() as u8 + 2).clamp(1, 8);

    TeamAnalysis {
        project_type: "general".to_string(),
        complexity,
        domains,
        requires_security,
        requires_ui,
        requires_testing,
        requires_data_science,
        estimated_team_size,
    }
}

/// Composes the ordered role list via the priority-ordered composition
/// rules, then applies `max_size` trimming if given. TechWriter appears in
/// the canonical ordering but no composition rule here ever selects it
/// automatically — see DESIGN.md.
pub fn compose(analysis: &TeamAnalysis, max_size: Option<usize>) -> Vec<Role> {
    let has_domain = |d: Domain| analysis.domains.contains(&d);
    let backend_needed = has_domain(Domain::Backend) || has_domain(Domain::Database);
    let frontend_needed = has_domain(Domain::Frontend) || has_domain(Domain::Mobile);

    let mut roles: Vec<Role> = Vec::new();
    let wants_qa = analysis.requires_testing;

    if analysis.complexity == Complexity::Simple && analysis.estimated_team_size <= 2 {
        roles.push(if backend_needed {
            Role::BackendDeveloper
        } else {
            Role::FrontendDeveloper
        });
        if wants_qa {
            roles.push(Role::QaTester);
        }
        return order(roles);
    }

    if analysis.estimated_team_size >= 3 {
        roles.push(Role::LeadDeveloper);
    }
    if analysis.estimated_team_size >= 5 {
        roles.push(Role::ProductManager);
    }

    if backend_needed {
        roles.push(Role::BackendDeveloper);
    }
    if frontend_needed {
        roles.push(Role::FrontendDeveloper);
    }
    // spec.md §8: "a team of at least one developer" is a hard floor — a
    // task whose text names no frontend/backend/database/mobile domain
    // still needs someone to write code, so fall back to a default
    // developer rather than composing a developer-less team.
    if !backend_needed && !frontend_needed {
        roles.push(Role::BackendDeveloper);
    }

    if analysis.requires_security {
        roles.push(Role::Security);
    }
    if analysis.requires_data_science {
        roles.push(Role::DataScientist);
    }
    if analysis.requires_ui && analysis.complexity != Complexity::Simple {
        roles.push(Role::Designer);
    }
    if has_domain(Domain::Devops) {
        roles.push(Role::DevOps);
    }

    if wants_qa {
        roles.push(Role::QaTester);
    }

    let mut roles = order(roles);
    if let Some(max) = max_size {
        trim_to(&mut roles, max, backend_needed, frontend_needed);
    }
    roles
}

/// Canonical execution order: PM, Lead, Backend, Frontend, Specialists
/// (Security, Data Scientist), Designer, DevOps, QA, TechWriter.
fn order(roles: Vec<Role>) -> Vec<Role> {
    const ORDER: &[Role] = &[
        Role::ProductManager,
        Role::LeadDeveloper,
        Role::BackendDeveloper,
        Role::FrontendDeveloper,
        Role::Security,
        Role::DataScientist,
        Role::Designer,
        Role::DevOps,
        Role::QaTester,
        Role::TechWriter,
    ];
    ORDER
        .iter()
        .filter(|r| roles.contains(r))
        .copied()
        .collect()
}

/// Reverse-priority trimming: support roles first, then specialists, then
/// PM — Lead, QA, and the primary domain developer are never dropped while
/// any non-essential role remains. Security is never in this list — per
/// spec.md §4.8 only "support roles (DevOps, Designer)" and "specialists
/// (Data Scientist)" are droppable here, then Product Manager.
fn trim_to(roles: &mut Vec<Role>, max: usize, backend_primary: bool, frontend_primary: bool) {
    let drop_order: &[Role] = &[
        Role::DevOps,
        Role::Designer,
        Role::DataScientist,
        Role::ProductManager,
    ];

    for candidate in drop_order {
        if roles.len() <= max {
            break;
        }
        roles.retain(|r| r != candidate);
    }

    // If still over budget, the only roles left are Lead/QA/primary
    // developer(s) plus possibly both Backend and Frontend; drop the
    // non-primary developer before ever touching Lead or QA.
    while roles.len() > max {
        if frontend_primary && !backend_primary && roles.contains(&Role::BackendDeveloper) {
            roles.retain(|r| *r != Role::BackendDeveloper);
        } else if backend_primary && !frontend_primary && roles.contains(&Role::FrontendDeveloper) {
            roles.retain(|r| *r != Role::FrontendDeveloper);
        } else {
            break;
        }
    }
}

pub struct TeamBuilder;

impl TeamBuilder {
    pub async fn build(
        classifier: &mut AgentClient,
        task_text: &str,
        max_size: Option<usize>,
    ) -> Vec<Role> {
        let analysis = match classify_via_llm(classifier, task_text).await {
            Some(a) => a,
            None => classify_via_keywords(task_text),
        };
        compose(&analysis, max_size)
    }
}
