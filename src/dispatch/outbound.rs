//! Outbound interfaces of the dispatcher

use thiserror::Error;

use crate::error::ContractError;
use crate::storage::StorageError;
use crate::types::{Address, NodeTypeSet};

/// Logical-time ticks a scheduled call stays valid
pub const CALL_EXPIRE_DURATION: u64 = 300;

/// A self-addressed contract invocation produced by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub target: Address,
    pub action: String,
    /// Little-endian timer round
    pub params: Vec<u8>,
    pub round: u64,
    pub fire_timestamp: u64,
    pub expire_duration: u64,
}

impl ContractCall {
    pub fn timer(target: Address, action: &str, round: u64, fire_timestamp: u64) -> Self {
        Self {
            target,
            action: action.to_string(),
            params: round.to_le_bytes().to_vec(),
            round,
            fire_timestamp,
            expire_duration: CALL_EXPIRE_DURATION,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Call rejected: {0}")]
    Rejected(String),
    #[error("No contract at {0}")]
    UnknownContract(Address),
    #[error("Contract failed: {0}")]
    Contract(#[from] ContractError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Where scheduled calls go
pub trait TransactionSubmitter {
    /// Submit for consensus execution
    fn request_transaction_consensus(&mut self, call: ContractCall) -> Result<(), DispatchError>;

    /// Execute immediately on this node
    fn execute_direct(&mut self, call: ContractCall) -> Result<(), DispatchError>;
}

pub trait GroupBroadcaster {
    fn send_to_group(&mut self, types: NodeTypeSet, payload: Vec<u8>);
}

/// The node's network position as seen by the dispatcher
pub trait RoleDriver: GroupBroadcaster {
    fn slot_id(&self) -> u16;

    /// Tables served by this node, ascending
    fn table_ids(&self) -> Vec<u16>;
}
