//! Per-contract dispatch configuration

use std::collections::BTreeMap;

use crate::types::{Address, NodeTypeSet, ZEC_ELECT_CONSENSUS_ADDR};

/// How a scheduled call reaches the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallWay {
    /// Submitted as a transaction for consensus
    Consensus,
    /// Executed locally without consensus
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastPolicy {
    None,
    /// Every new block of the contract
    Normal,
    /// Only full-unit blocks of the contract
    FullUnit,
}

/// What a contract watches and what it calls when the watch fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorKind {
    /// Beacon timer rounds; fires every `interval` rounds
    Timer {
        interval: u64,
        action: String,
        call_way: CallWay,
    },
    /// Each newly committed block of the monitored account
    Block { action: String, call_way: CallWay },
}

impl MonitorKind {
    pub fn action(&self) -> &str {
        match self {
            MonitorKind::Timer { action, .. } | MonitorKind::Block { action, .. } => action,
        }
    }

    pub fn call_way(&self) -> CallWay {
        match self {
            MonitorKind::Timer { call_way, .. } | MonitorKind::Block { call_way, .. } => *call_way,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub address: Address,
    /// Monitored account -> monitor
    pub monitors: BTreeMap<Address, MonitorKind>,
    pub broadcast_policy: BroadcastPolicy,
    pub broadcast_types: NodeTypeSet,
    /// Timer rounds between per-table calls, for table-scheduled contracts
    pub table_schedule_interval: Option<u32>,
}

impl ContractInfo {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            monitors: BTreeMap::new(),
            broadcast_policy: BroadcastPolicy::None,
            broadcast_types: NodeTypeSet::empty(),
            table_schedule_interval: None,
        }
    }

    pub fn with_timer(mut self, timer: Address, interval: u64, action: &str, call_way: CallWay) -> Self {
        self.monitors.insert(
            timer,
            MonitorKind::Timer {
                interval,
                action: action.to_string(),
                call_way,
            },
        );
        self
    }

    pub fn with_block_monitor(mut self, account: Address, action: &str, call_way: CallWay) -> Self {
        self.monitors.insert(
            account,
            MonitorKind::Block {
                action: action.to_string(),
                call_way,
            },
        );
        self
    }

    pub fn with_broadcast(mut self, policy: BroadcastPolicy, types: NodeTypeSet) -> Self {
        self.broadcast_policy = policy;
        self.broadcast_types = types;
        self
    }

    pub fn with_table_schedule(mut self, interval: u32) -> Self {
        self.table_schedule_interval = Some(interval);
        self
    }

    pub fn has_monitors(&self) -> bool {
        !self.monitors.is_empty()
    }

    pub fn has_broadcasts(&self) -> bool {
        self.broadcast_policy != BroadcastPolicy::None
    }

    /// Monitor for `address`: exact match first, then by contract family
    pub fn find_monitor(&self, address: &Address) -> Option<&MonitorKind> {
        self.monitors.get(address).or_else(|| {
            self.monitors
                .iter()
                .find(|(pattern, _)| address.matches(pattern))
                .map(|(_, monitor)| monitor)
        })
    }

    pub fn is_scheduled_table_contract(&self) -> bool {
        self.table_schedule_interval.is_some()
    }
}

/// Election contracts that fire on every third round until their chain has
/// its first block
pub fn runs_stand_alone(address: &Address) -> bool {
    address.as_str() == ZEC_ELECT_CONSENSUS_ADDR
}
