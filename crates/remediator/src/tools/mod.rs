//! Cluster-facing tools: command model, validation, execution, and the
//! result envelope they all share.

pub mod classifier;
pub mod command;
pub mod executor;
pub mod plan;
pub mod result;
pub mod validator;

pub use command::{PatchField, ProposedCommand, ResourceKind, ValidatedCommand, Verb};
pub use executor::{
    CommandExecutor, CommandOutput, CommandRunner, ExecutionRecord, KubectlRunner, RunOutput,
};
pub use plan::{ProposedPlan, RemediationPlan};
pub use result::{ErrorKind, ToolError, ToolResult};
pub use validator::{CommandValidator, CommandVerdict, PlanRejection, PlanValidation};
