//! PMO Storage crate - SQLite persistence for the decision pipeline.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and
//! repositories for proposals, decisions, executions, projects and tasks.
//! Exactly-once execution and decision immutability are enforced by the
//! schema itself, so they hold across every handle that opens the file.

pub mod db;
pub mod migrations;
pub mod repository;
pub mod tasks;

pub use db::Database;
pub use repository::{
    DecisionQuery, DecisionRepository, ExecutionInsert, ExecutionRepository, NewExecution,
    ProposalRepository,
};
pub use tasks::{NewTask, ProjectRepository, TaskPatch, TaskRepository};
