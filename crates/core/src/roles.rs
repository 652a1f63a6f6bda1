//! The closed role table: roles are a fixed tagged variant with a
//! behavioral table (temperature, response contract, review-receive
//! policy). New roles extend the table; the controller never subclasses
//! on role.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Ceo,
    ProductManager,
    LeadDeveloper,
    BackendDeveloper,
    FrontendDeveloper,
    QaTester,
    DevOps,
    Designer,
    Security,
    TechWriter,
    DataScientist,
}

impl Role {
    pub const ALL: &'static [Role] = &[
        Role::Ceo,
        Role::ProductManager,
        Role::LeadDeveloper,
        Role::BackendDeveloper,
        Role::FrontendDeveloper,
        Role::QaTester,
        Role::DevOps,
        Role::Designer,
        Role::Security,
        Role::TechWriter,
        Role::DataScientist,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Role::Ceo => "CEO",
            Role::ProductManager => "ProductManager",
            Role::LeadDeveloper => "LeadDeveloper",
            Role::BackendDeveloper => "BackendDeveloper",
            Role::FrontendDeveloper => "FrontendDeveloper",
            Role::QaTester => "QATester",
            Role::DevOps => "DevOps",
            Role::Designer => "Designer",
            Role::Security => "Security",
            Role::TechWriter => "TechWriter",
            Role::DataScientist => "DataScientist",
        }
    }

    /// Roles whose turns are eligible for `ReviewCoordinator`: role name
    /// ends in `Developer`, or the role is `Security` or `QATester`.
    pub fn is_reviewable_author(&self) -> bool {
        matches!(
            self,
            Role::LeadDeveloper
                | Role::BackendDeveloper
                | Role::FrontendDeveloper
                | Role::Security
                | Role::QaTester
        )
    }

    pub fn is_developer(&self) -> bool {
        matches!(
            self,
            Role::LeadDeveloper | Role::BackendDeveloper | Role::FrontendDeveloper
        )
    }

    pub fn response_format(&self) -> ResponseFormat {
        match self {
            Role::LeadDeveloper | Role::BackendDeveloper | Role::FrontendDeveloper => {
                ResponseFormat::MustEmitCode
            }
            Role::QaTester => ResponseFormat::MustEmitTest,
            _ => ResponseFormat::Freeform,
        }
    }

    /// A default starting temperature for this role's `AgentClient`.
    /// Planning/leadership roles run cooler (more deterministic); creative
    /// roles run warmer. Overridable per `AgentSpec`.
    pub fn default_temperature(&self) -> f32 {
        match self {
            Role::Ceo | Role::ProductManager | Role::LeadDeveloper | Role::Security => 0.3,
            Role::BackendDeveloper | Role::QaTester | Role::DevOps | Role::TechWriter => 0.4,
            Role::FrontendDeveloper | Role::Designer | Role::DataScientist => 0.6,
        }
    }

    /// A short, generic instruction describing this role's responsibility.
    /// The *content* of per-role prompts is an external collaborator's
    /// concern; this is only the minimal default so an `AgentSpec`
    /// always has a non-empty `system_prompt` to send.
    pub fn default_system_prompt(&self) -> String {
        match self {
            Role::Ceo => "You set overall product direction and approve scope.".into(),
            Role::ProductManager => {
                "You translate requirements into prioritized, buildable specs.".into()
            }
            Role::LeadDeveloper => {
                "You own architecture and review other developers' structural decisions.".into()
            }
            Role::BackendDeveloper => {
                "You implement server-side logic, data access, and APIs.".into()
            }
            Role::FrontendDeveloper => {
                "You implement user-facing interfaces and client-side state.".into()
            }
            Role::QaTester => "You write and maintain the automated test suite.".into(),
            Role::DevOps => "You own build, deployment, and environment configuration.".into(),
            Role::Designer => "You define UX flows and interface structure.".into(),
            Role::Security => "You review code for vulnerabilities and unsafe patterns.".into(),
            Role::TechWriter => "You document the project for its users and contributors.".into(),
            Role::DataScientist => "You implement data pipelines, models, and analysis.".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    MustEmitCode,
    MustEmitTest,
    Freeform,
}
