//! Account addresses and the well-known system contract accounts

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between a contract's base address and its table (shard) index
const TABLE_SEPARATOR: char = '@';

/// Beacon timer account; its block height is the on-chain timer round
pub const BEACON_TIMER_ADDR: &str = "sys.beacon.timer";
/// Node registration contract (external bookkeeping)
pub const REC_REGISTRATION_ADDR: &str = "sys.rec.registration";
/// Standby pool contract (source of standby snapshots)
pub const REC_STANDBY_POOL_ADDR: &str = "sys.rec.standby_pool";
/// Zone-side standby reader; records the last standby block height read
pub const ZEC_STANDBY_POOL_ADDR: &str = "sys.zec.standby_pool";
/// Auditor/validator election contract
pub const ZEC_ELECT_CONSENSUS_ADDR: &str = "sys.zec.elect_consensus";
/// Validator-to-auditor association contract
pub const ZEC_GROUP_ASSOC_ADDR: &str = "sys.zec.group_assoc";
/// Per-table workload report contract
pub const SHARDING_WORKLOAD_ADDR: &str = "sys.shard.workload";
/// Per-table slash report contract
pub const SHARDING_SLASH_INFO_ADDR: &str = "sys.shard.slash_info";

/// Account address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address without any table suffix
    pub fn base(&self) -> &str {
        match self.0.split_once(TABLE_SEPARATOR) {
            Some((base, _)) => base,
            None => &self.0,
        }
    }

    /// Table-scoped address of a sharded contract
    pub fn table_address(&self, table_id: u16) -> Address {
        Address(format!("{}{}{}", self.base(), TABLE_SEPARATOR, table_id))
    }

    /// Whether this address belongs to the contract family `pattern`
    pub fn matches(&self, pattern: &Address) -> bool {
        self.base() == pattern.base()
    }

    /// Sharded system contracts run once per table
    pub fn is_sharding_contract(&self) -> bool {
        self.base().starts_with("sys.shard.")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_address() {
        let addr = Address::from(SHARDING_WORKLOAD_ADDR);
        let t3 = addr.table_address(3);
        assert_eq!(t3.as_str(), "sys.shard.workload@3");
        assert_eq!(t3.base(), SHARDING_WORKLOAD_ADDR);
        assert!(t3.matches(&addr));
        assert!(t3.is_sharding_contract());
    }

    #[test]
    fn test_plain_address_does_not_match_other_family() {
        let a = Address::from(ZEC_ELECT_CONSENSUS_ADDR);
        let b = Address::from(ZEC_GROUP_ASSOC_ADDR);
        assert!(!a.matches(&b));
        assert!(!a.is_sharding_contract());
    }
}
