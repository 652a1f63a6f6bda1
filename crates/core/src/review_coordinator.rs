//! `ReviewCoordinator` — routes an authored file past a
//! capped set of reviewer roles for up to `max_rounds` critique/revision
//! passes. Never hard-rejects: exhausting `max_rounds` without unanimous
//! approval still yields a result, just one carrying unresolved notes
//! (see DESIGN.md for the rationale).

use std::collections::HashMap;

use crate::agent_client::AgentClient;
use crate::error::ForgeError;
use crate::file_store::{FileOp, FileStore};
use crate::operation_parser;
use crate::roles::Role;

const SECURITY_SENSITIVE_SUBSTRINGS: &[&str] = &[
    "auth", "login", "password", "token", "crypto", "payment", "security",
];

fn is_security_sensitive(path: &str) -> bool {
    let lower = path.to_lowercase();
    SECURITY_SENSITIVE_SUBSTRINGS
        .iter()
        .any(|s| lower.contains(s))
}

/// Reviewer selection: Lead always, a complementary
/// developer, QA always, Security if the path looks sensitive — in that
/// priority order, capped to three, excluding the author.
fn select_reviewers(author: Role, file_path: &str, team: &[Role]) -> Vec<Role> {
    let mut selected = Vec::new();
    let has = |r: Role| team.contains(&r);

    if has(Role::LeadDeveloper) && author != Role::LeadDeveloper {
        selected.push(Role::LeadDeveloper);
    }

    let complementary = match author {
        Role::BackendDeveloper => Some(Role::FrontendDeveloper),
        Role::FrontendDeveloper => Some(Role::BackendDeveloper),
        _ => None,
    };
    if let Some(r) = complementary {
        if has(r) && r != author && !selected.contains(&r) {
            selected.push(r);
        }
    }

    if has(Role::QaTester) && author != Role::QaTester && !selected.contains(&Role::QaTester) {
        selected.push(Role::QaTester);
    }

    if is_security_sensitive(file_path)
        && has(Role::Security)
        && author != Role::Security
        && !selected.contains(&Role::Security)
    {
        selected.push(Role::Security);
    }

    selected.truncate(3);
    selected
}

fn critique_rubric(role: Role) -> &'static str {
    match role {
        Role::LeadDeveloper => "Review for architecture and structural soundness.",
        Role::BackendDeveloper => "Review for API design, data access, and performance.",
        Role::FrontendDeveloper => "Review for UX, state management, and accessibility.",
        Role::QaTester => "Review for testability and uncovered edge cases.",
        Role::Security => "Review for OWASP-style vulnerabilities.",
        _ => "Review this file for correctness.",
    }
}

const APPROVAL_PHRASES: &[&str] = &["approved", "looks good", "no changes"];

fn is_approval(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    APPROVAL_PHRASES.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub rounds_run: usize,
    pub approved: bool,
    pub notes: Vec<String>,
    /// Ops the author emitted that targeted files other than the one under
    /// review; these are deferred to the next iteration turn rather than
    /// applied here.
    pub deferred_ops: Vec<FileOp>,
}

pub struct ReviewCoordinator {
    max_rounds: usize,
}

impl ReviewCoordinator {
    pub fn new(max_rounds: usize) -> Self {
        Self { max_rounds }
    }

    /// Runs the review protocol for one file. `clients` holds one
    /// `AgentClient` per team role, including the author's.
    pub async fn review(
        &self,
        file_path: &str,
        task_context: &str,
        author: Role,
        team: &[Role],
        clients: &mut HashMap<Role, AgentClient>,
        store: &FileStore,
    ) -> Result<ReviewOutcome, ForgeError> {
        let reviewers = select_reviewers(author, file_path, team);
        let mut notes = Vec::new();
        let mut deferred_ops = Vec::new();

        if reviewers.is_empty() {
            return Ok(ReviewOutcome {
                rounds_run: 0,
                approved: true,
                notes,
                deferred_ops,
            });
        }

        let mut rounds_run = 0;
        for _round in 0..self.max_rounds {
            rounds_run += 1;
            let content = store
                .read(file_path)
                .await
                .map_err(|e| ForgeError::Review(e.to_string()))?;

            let mut critiques = Vec::new();
            for reviewer_role in &reviewers {
                let Some(client) = clients.get_mut(reviewer_role) else {
                    continue;
                };
                let prompt = format!(
                    "Task context:\n{task_context}\n\nFile under review: {file_path}\n\n{content}\n\n{}",
                    critique_rubric(*reviewer_role)
                );
                let reply = client.step(&prompt).await?;
                if !is_approval(&reply) {
                    critiques.push(format!("[{}] {}", reviewer_role.name(), reply));
                }
            }

            if critiques.is_empty() {
                return Ok(ReviewOutcome {
                    rounds_run,
                    approved: true,
                    notes,
                    deferred_ops,
                });
            }

            let consolidated = format!(
                "The following reviewers raised concerns about {file_path}:\n\n{}",
                critiques.join("\n\n")
            );
            notes.extend(critiques);

            let Some(author_client) = clients.get_mut(&author) else {
                break;
            };
            let reply = author_client.step(&consolidated).await?;
            let (ops, _completion, _warnings) = operation_parser::parse(&reply);

            for op in ops {
                match &op {
                    FileOp::Update { path, content } if path == file_path => {
                        store
                            .update(path, content)
                            .await
                            .map_err(|e| ForgeError::Review(e.to_string()))?;
                    }
                    _ => deferred_ops.push(op),
                }
            }
        }

        // max_rounds exhausted without unanimous approval: accept with
        // warning rather than reverting or hard-rejecting.
        Ok(ReviewOutcome {
            rounds_run,
            approved: false,
            notes,
            deferred_ops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_author_gets_frontend_as_complementary() {
        let team = vec![
            Role::LeadDeveloper,
            Role::BackendDeveloper,
            Role::FrontendDeveloper,
            Role::QaTester,
        ];
        let reviewers = select_reviewers(Role::BackendDeveloper, "src/api.py", &team);
        assert!(reviewers.contains(&Role::FrontendDeveloper));
        assert!(!reviewers.contains(&Role::BackendDeveloper));
    }

    #[test]
    fn security_sensitive_path_pulls_in_security_reviewer() {
        let team = vec![
            Role::LeadDeveloper,
            Role::BackendDeveloper,
            Role::QaTester,
            Role::Security,
        ];
        let reviewers = select_reviewers(Role::BackendDeveloper, "src/auth/login.py", &team);
        assert!(reviewers.contains(&Role::Security));
    }

    #[test]
    fn reviewer_set_is_capped_at_three_and_excludes_author() {
        let team = vec![
            Role::LeadDeveloper,
            Role::BackendDeveloper,
            Role::FrontendDeveloper,
            Role::QaTester,
            Role::Security,
        ];
        let reviewers = select_reviewers(Role::BackendDeveloper, "src/auth/token.py", &team);
        assert_eq!(reviewers.len(), 3);
        assert!(!reviewers.contains(&Role::BackendDeveloper));
    }

    #[test]
    fn approval_detection_matches_stock_phrases() {
        assert!(is_approval("Looks good to me."));
        assert!(is_approval("Approved, ship it."));
        assert!(!is_approval("This needs a null check before the index."));
    }
}
