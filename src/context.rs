//! Invocation context supplied by the execution environment
//!
//! Contracts see who invoked them, the consensus leader's logical time and
//! the per-tick random seed through [`ContractContext`]; they never read
//! process-wide state.

use thiserror::Error;

use crate::types::{Address, LogicTime};

/// The random seed service could not produce a seed for this tick
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("random seed unavailable: {0}")]
pub struct SeedUnavailable(pub String);

pub trait ContractContext {
    /// Account the invoked contract runs as
    fn self_address(&self) -> &Address;

    /// Account that sent the invocation
    fn source_address(&self) -> &Address;

    /// Consensus leader's logical time
    fn consensus_time(&self) -> LogicTime;

    fn random_seed(&self) -> Result<Vec<u8>, SeedUnavailable>;

    /// Local wall clock in milliseconds (not consensus-relevant)
    fn wall_clock_ms(&self) -> u64;
}

/// Why an invocation completed without changing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Tick time is ahead of the consensus leader's time
    FutureTick { tick: LogicTime, now: LogicTime },
    /// Tick is older than half an election interval
    RetriedTooManyTimes { tick: LogicTime, now: LogicTime },
    SeedUnavailable(String),
    /// No standby snapshot block could be read
    NoStandbySnapshot,
    NoStandbyNodes,
    NoAssociation,
    /// Static bootstrap is waiting for its warm-up period
    WarmingUp,
    /// Static bootstrap already ran
    AlreadyExecuted,
}

/// Result of an invocation that did not fail fatally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome<T> {
    Committed(T),
    Skipped(SkipReason),
}

impl<T> TickOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, TickOutcome::Committed(_))
    }

    pub fn committed(self) -> Option<T> {
        match self {
            TickOutcome::Committed(value) => Some(value),
            TickOutcome::Skipped(_) => None,
        }
    }
}

/// Context for one invocation, built by the runtime (and by tests)
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub self_address: Address,
    pub source_address: Address,
    pub consensus_time: LogicTime,
    pub seed: Result<Vec<u8>, SeedUnavailable>,
    pub wall_clock_ms: u64,
}

impl InvocationContext {
    /// Self-originated timer invocation of `address`
    pub fn timer(address: Address, consensus_time: LogicTime, seed: Vec<u8>) -> Self {
        Self {
            source_address: address.clone(),
            self_address: address,
            consensus_time,
            seed: Ok(seed),
            wall_clock_ms: 0,
        }
    }

    pub fn with_source(mut self, source: Address) -> Self {
        self.source_address = source;
        self
    }

    pub fn without_seed(mut self, reason: &str) -> Self {
        self.seed = Err(SeedUnavailable(reason.to_string()));
        self
    }

    pub fn with_wall_clock(mut self, ms: u64) -> Self {
        self.wall_clock_ms = ms;
        self
    }
}

impl ContractContext for InvocationContext {
    fn self_address(&self) -> &Address {
        &self.self_address
    }

    fn source_address(&self) -> &Address {
        &self.source_address
    }

    fn consensus_time(&self) -> LogicTime {
        self.consensus_time
    }

    fn random_seed(&self) -> Result<Vec<u8>, SeedUnavailable> {
        self.seed.clone()
    }

    fn wall_clock_ms(&self) -> u64 {
        self.wall_clock_ms
    }
}
