//! Fatal contract errors
//!
//! A fatal error aborts the whole invocation: the runtime drops the staged
//! writes so later reads never observe them. Transient conditions are not
//! errors; they surface as [`crate::context::TickOutcome::Skipped`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StorageError;
use crate::types::{Address, GroupId, NodeId};

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("{contract} was triggered by {caller}, not by itself")]
    Unauthorized { contract: Address, caller: Address },
    #[error("Invocation addressed to {actual}, expected {expected}")]
    WrongContract { expected: Address, actual: Address },
    #[error("Governance precondition violated: {0}")]
    GovernanceViolation(#[from] ConfigError),
    #[error("Genesis election incomplete: auditor group {auditor} / validator group {validator} not elected")]
    GenesisIncomplete { auditor: GroupId, validator: GroupId },
    #[error("Auditor group {0} has no associated validator groups")]
    NoAssociatedValidators(GroupId),
    #[error("Invalid registration for {node}: {reason}")]
    InvalidRegistration { node: NodeId, reason: String },
    #[error("Registration data unavailable")]
    RegistrationUnavailable,
    #[error("Invalid static consensus layout: {0}")]
    StaticLayout(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}
