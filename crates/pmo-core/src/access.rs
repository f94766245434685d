//! Actors, roles, and the capability check.
//!
//! Every operation in the pipeline asks `can(actor, permission)` before doing
//! anything else. Authentication (mapping a credential to an `Actor`) lives
//! in the API layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SYSTEM_POLICY_ENGINE;

/// Organization-level role of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Member,
    Manager,
    Admin,
    /// The automated policy engine / AI worker.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Member => write!(f, "member"),
            Role::Manager => write!(f, "manager"),
            Role::Admin => write!(f, "admin"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "member" => Ok(Role::Member),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Capability tokens checked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadAudit,
    RecordDecision,
    ExecuteDecision,
    WriteProposal,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::ReadAudit => write!(f, "audit:read"),
            Permission::RecordDecision => write!(f, "decisions:record"),
            Permission::ExecuteDecision => write!(f, "decisions:execute"),
            Permission::WriteProposal => write!(f, "proposals:write"),
        }
    }
}

/// An authenticated principal acting within exactly one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            role,
        }
    }

    /// The policy engine acting on behalf of an organization.
    pub fn policy_engine(organization_id: impl Into<String>) -> Self {
        Self::new(SYSTEM_POLICY_ENGINE, organization_id, Role::System)
    }

    /// Identity written to `decided_by` / `executed_by` columns.
    pub fn audit_identity(&self) -> &str {
        match self.role {
            Role::System => SYSTEM_POLICY_ENGINE,
            _ => &self.user_id,
        }
    }
}

/// The single capability check for the pipeline.
pub fn can(actor: &Actor, permission: Permission) -> bool {
    match permission {
        Permission::ReadAudit => true,
        Permission::RecordDecision | Permission::ExecuteDecision => matches!(
            actor.role,
            Role::Manager | Role::Admin | Role::System
        ),
        Permission::WriteProposal => matches!(actor.role, Role::Admin | Role::System),
    }
}
