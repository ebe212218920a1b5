//! Genesis bootstrap
//!
//! The first election must populate every auditor / validator pair of the
//! association table in a single tick. [`GenesisBootstrap`] tracks that
//! stage and persists the completion flag; [`StaticConsensusBootstrap`]
//! instead installs a fixed, configured first round.

use tracing::{error, info, warn};

use super::{
    election_result_property_name, AssociationClusterResult, ClusterElectionStores, ElectionInfo,
    ElectionResultStore,
};
use crate::chain::ChainReader;
use crate::config::{GovernanceParams, StaticConsensusConfig};
use crate::context::{SkipReason, TickOutcome};
use crate::crypto::PublicKey;
use crate::error::ContractError;
use crate::storage::{load_prop, save_prop, PropertyStore, StorageError};
use crate::types::{Address, ClusterId, GroupId, LogicTime, NetworkId, NodeId, NodeType, DEFAULT_CLUSTER_ID};

/// String property of the election contract; non-empty once genesis completed
pub const ELECTION_EXECUTED_KEY: &str = "election_executed";

const EXECUTED_FLAG: &[u8] = b"1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenesisStage {
    NotStarted,
    /// Groups are being elected within the genesis tick
    InProgress { elected_groups: u16 },
    Completed,
}

#[derive(Debug, Clone)]
pub struct GenesisBootstrap {
    stage: GenesisStage,
}

impl GenesisBootstrap {
    pub fn load<S: PropertyStore + ?Sized>(store: &S, contract: &Address) -> Result<Self, StorageError> {
        let flag = store.string_get(contract, ELECTION_EXECUTED_KEY)?.unwrap_or_default();
        let stage = if flag.is_empty() {
            GenesisStage::NotStarted
        } else {
            GenesisStage::Completed
        };
        Ok(Self { stage })
    }

    pub fn stage(&self) -> GenesisStage {
        self.stage
    }

    pub fn is_completed(&self) -> bool {
        self.stage == GenesisStage::Completed
    }

    /// Auditor groups that may rotate this tick: all of them during genesis
    pub fn rotation_cap(&self, params: &GovernanceParams) -> u16 {
        if self.is_completed() {
            params.max_auditor_rotation_count
        } else {
            params.auditor_group_count
        }
    }

    /// Genesis membership takes effect immediately, later rotations after
    /// half an election interval
    pub fn start_time(&self, params: &GovernanceParams, election_time: LogicTime) -> LogicTime {
        if self.is_completed() {
            election_time + params.cluster_election_interval / 2
        } else {
            election_time
        }
    }

    pub fn record_elected(&mut self) {
        self.stage = match self.stage {
            GenesisStage::NotStarted => GenesisStage::InProgress { elected_groups: 1 },
            GenesisStage::InProgress { elected_groups } => GenesisStage::InProgress {
                elected_groups: elected_groups + 1,
            },
            GenesisStage::Completed => GenesisStage::Completed,
        };
    }

    /// Require every association pair to be populated, then mark completion.
    ///
    /// A no-op once completed.
    pub fn verify_and_complete(
        &mut self,
        network_id: NetworkId,
        cluster: ClusterId,
        association: &AssociationClusterResult,
        stores: &ClusterElectionStores,
    ) -> Result<(), ContractError> {
        if self.is_completed() {
            return Ok(());
        }
        info!(cluster = cluster.0, "Checking genesis election");
        for (validator, auditor) in association.iter() {
            let store = stores.get(&auditor);
            let populated = |node_type: NodeType, group: GroupId| {
                store
                    .and_then(|s| s.group(network_id, node_type, cluster, group))
                    .map_or(false, |g| !g.is_empty())
            };
            if !populated(NodeType::ConsensusAuditor, auditor) || !populated(NodeType::ConsensusValidator, validator) {
                error!(auditor = %auditor, validator = %validator, "Genesis election failed");
                return Err(ContractError::GenesisIncomplete { auditor, validator });
            }
        }
        self.stage = GenesisStage::Completed;
        Ok(())
    }

    /// Write the completion flag if genesis completed
    pub fn persist<S: PropertyStore + ?Sized>(&self, store: &mut S, contract: &Address) -> Result<(), StorageError> {
        if self.is_completed() {
            store.string_set(contract, ELECTION_EXECUTED_KEY, EXECUTED_FLAG.to_vec())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNode {
    pub node_id: NodeId,
    pub stake: u64,
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticGroup {
    pub node_type: NodeType,
    pub nodes: Vec<StaticNode>,
}

/// Parse `"auditor:id.stake.pubkey,...|validator:id.stake.pubkey,..."`
pub fn parse_static_layout(layout: &str) -> Result<Vec<StaticGroup>, ContractError> {
    let bad = |msg: String| ContractError::StaticLayout(msg);
    let mut groups = Vec::new();
    for entry in layout.split('|').map(str::trim).filter(|e| !e.is_empty()) {
        let (kind, nodes) = entry
            .split_once(':')
            .ok_or_else(|| bad(format!("missing group type in '{}'", entry)))?;
        let node_type = match kind.trim() {
            "auditor" => NodeType::ConsensusAuditor,
            "validator" => NodeType::ConsensusValidator,
            other => return Err(bad(format!("unknown group type '{}'", other))),
        };

        let mut parsed = Vec::new();
        for node in nodes.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let parts: Vec<&str> = node.split('.').collect();
            if parts.len() != 3 {
                return Err(bad(format!("expected id.stake.pubkey, got '{}'", node)));
            }
            let stake = parts[1]
                .parse::<u64>()
                .map_err(|e| bad(format!("bad stake in '{}': {}", node, e)))?;
            let public_key =
                PublicKey::from_hex(parts[2]).map_err(|e| bad(format!("bad public key in '{}': {}", node, e)))?;
            parsed.push(StaticNode {
                node_id: NodeId::new(parts[0]),
                stake,
                public_key,
            });
        }
        if parsed.is_empty() {
            return Err(bad(format!("group '{}' has no nodes", entry)));
        }
        groups.push(StaticGroup {
            node_type,
            nodes: parsed,
        });
    }
    Ok(groups)
}

/// Installs a configured first round verbatim instead of a randomized genesis
#[derive(Debug, Clone)]
pub struct StaticConsensusBootstrap {
    layout: Vec<StaticGroup>,
    warmup_ms: u64,
    node_start_time_ms: u64,
    executed: bool,
}

impl StaticConsensusBootstrap {
    pub fn new(config: &StaticConsensusConfig, node_start_time_ms: u64) -> Result<Self, ContractError> {
        Ok(Self {
            layout: parse_static_layout(&config.layout)?,
            warmup_ms: config.warmup_ms,
            node_start_time_ms,
            executed: false,
        })
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    /// Install the layout once the warm-up elapsed.
    ///
    /// Commits the number of groups installed. Does nothing (but latches
    /// `executed`) if the election contract chain has a block above its
    /// genesis block.
    #[allow(clippy::too_many_arguments)]
    pub fn on_timer<S, C>(
        &mut self,
        store: &mut S,
        chain: &C,
        contract: &Address,
        network_id: NetworkId,
        params: &GovernanceParams,
        now_ms: u64,
        current_time: LogicTime,
    ) -> Result<TickOutcome<usize>, ContractError>
    where
        S: PropertyStore + ?Sized,
        C: ChainReader + ?Sized,
    {
        if now_ms.saturating_sub(self.node_start_time_ms) < self.warmup_ms {
            return Ok(TickOutcome::Skipped(SkipReason::WarmingUp));
        }
        if self.executed {
            return Ok(TickOutcome::Skipped(SkipReason::AlreadyExecuted));
        }

        let height = chain.latest_height(contract)?;
        info!(height, "Static consensus bootstrap");
        if height > 0 {
            self.executed = true;
            return Ok(TickOutcome::Skipped(SkipReason::AlreadyExecuted));
        }

        let installed = self.install(store, contract, network_id, params, current_time)?;
        self.executed = true;
        Ok(TickOutcome::Committed(installed))
    }

    fn install<S: PropertyStore + ?Sized>(
        &self,
        store: &mut S,
        contract: &Address,
        network_id: NetworkId,
        params: &GovernanceParams,
        current_time: LogicTime,
    ) -> Result<usize, ContractError> {
        let fan_out = params.validator_fan_out();
        let per_property = 1 + fan_out as usize;
        let mut next_auditor = 0u16;
        let mut next_validator = 0u16;
        let mut installed = 0usize;

        let chunks: Vec<&[StaticGroup]> = self.layout.chunks(per_property).collect();
        if chunks.len() > params.auditor_group_count as usize {
            warn!(
                chunks = chunks.len(),
                auditors = params.auditor_group_count,
                "Static layout longer than the auditor group count, extra groups ignored"
            );
        }

        for (index, chunk) in chunks.into_iter().take(params.auditor_group_count as usize).enumerate() {
            let auditor_gid = GroupId::auditor(index as u16);
            let property = election_result_property_name(auditor_gid);
            let mut result_store: ElectionResultStore = load_prop(store, contract, &property)?;
            let network = result_store.result_of(network_id);

            for group in chunk {
                let gid = match group.node_type {
                    NodeType::ConsensusAuditor => {
                        next_auditor += 1;
                        GroupId::auditor(next_auditor - 1)
                    }
                    _ => {
                        next_validator += 1;
                        GroupId::validator(next_validator - 1)
                    }
                };
                let result = network
                    .result_of(group.node_type)
                    .result_of(DEFAULT_CLUSTER_ID)
                    .result_of(gid);
                let version = result.group_version.map_or(0, |v| v + 1);
                result.group_version = Some(version);
                result.election_committee_version = Some(0);
                result.timestamp = current_time;
                result.start_time = current_time;
                for node in &group.nodes {
                    result.insert(
                        node.node_id.clone(),
                        ElectionInfo {
                            joined_version: version,
                            stake: node.stake,
                            comprehensive_stake: node.stake,
                            consensus_public_key: node.public_key.clone(),
                        },
                    );
                }
                info!(group = %gid, size = result.len(), version, "Static group installed");
                installed += 1;
            }

            let auditor_version = network
                .result_of(NodeType::ConsensusAuditor)
                .result_of(DEFAULT_CLUSTER_ID)
                .result_of(auditor_gid)
                .group_version;
            for v in 0..fan_out {
                let validator = network
                    .result_of(NodeType::ConsensusValidator)
                    .result_of(DEFAULT_CLUSTER_ID)
                    .result_of(GroupId::validator(index as u16 * fan_out + v));
                validator.associated_group_id = Some(auditor_gid);
                validator.cluster_version = Some(0);
                validator.associated_group_version = auditor_version;
            }

            save_prop(store, contract, &property, &result_store)?;
        }
        Ok(installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainWriter, MemoryChain};
    use crate::storage::MemoryStore;
    use crate::types::ZEC_ELECT_CONSENSUS_ADDR;
    use std::collections::BTreeMap;

    const NET: NetworkId = NetworkId(255);

    fn key_hex(b: u8) -> String {
        hex::encode([b; 32])
    }

    fn layout() -> String {
        format!(
            "auditor:a1.10.{k}|validator:v1.5.{k},v2.5.{k}|validator:v3.5.{k}|auditor:a2.10.{k}|validator:v4.5.{k}|validator:v5.5.{k}",
            k = key_hex(2)
        )
    }

    fn params() -> GovernanceParams {
        GovernanceParams {
            auditor_group_count: 2,
            validator_group_count: 4,
            ..GovernanceParams::default()
        }
    }

    #[test]
    fn test_stage_transitions() {
        let store = MemoryStore::new();
        let contract = Address::from(ZEC_ELECT_CONSENSUS_ADDR);
        let mut genesis = GenesisBootstrap::load(&store, &contract).unwrap();
        assert_eq!(genesis.stage(), GenesisStage::NotStarted);
        assert_eq!(genesis.rotation_cap(&params()), 2);
        assert_eq!(genesis.start_time(&params(), 100), 100);

        genesis.record_elected();
        genesis.record_elected();
        assert_eq!(genesis.stage(), GenesisStage::InProgress { elected_groups: 2 });
    }

    #[test]
    fn test_incomplete_association_is_fatal() {
        let p = params();
        let association = AssociationClusterResult::build(&p);
        let mut stores = ClusterElectionStores::new();
        stores.insert(GroupId(1), ElectionResultStore::default());
        stores.insert(GroupId(2), ElectionResultStore::default());

        let mut genesis = GenesisBootstrap { stage: GenesisStage::NotStarted };
        let err = genesis
            .verify_and_complete(NET, DEFAULT_CLUSTER_ID, &association, &stores)
            .unwrap_err();
        assert!(matches!(err, ContractError::GenesisIncomplete { .. }));
        assert!(!genesis.is_completed());
    }

    #[test]
    fn test_completion_flag_persists() {
        let mut store = MemoryStore::new();
        let contract = Address::from(ZEC_ELECT_CONSENSUS_ADDR);
        let mut genesis = GenesisBootstrap::load(&store, &contract).unwrap();
        genesis.persist(&mut store, &contract).unwrap();
        assert!(!GenesisBootstrap::load(&store, &contract).unwrap().is_completed());

        genesis.stage = GenesisStage::Completed;
        genesis.persist(&mut store, &contract).unwrap();
        let reloaded = GenesisBootstrap::load(&store, &contract).unwrap();
        assert!(reloaded.is_completed());
        assert_eq!(reloaded.rotation_cap(&params()), params().max_auditor_rotation_count);
        assert_eq!(reloaded.start_time(&params(), 100), 100 + params().cluster_election_interval / 2);
    }

    #[test]
    fn test_parse_layout() {
        let groups = parse_static_layout(&layout()).unwrap();
        assert_eq!(groups.len(), 6);
        assert_eq!(groups[0].node_type, NodeType::ConsensusAuditor);
        assert_eq!(groups[1].nodes.len(), 2);
        assert_eq!(groups[1].nodes[0].stake, 5);

        assert!(parse_static_layout("observer:a.1.00").is_err());
        assert!(parse_static_layout("auditor:a.1").is_err());
        assert!(parse_static_layout("auditor:a.x.00").is_err());
        assert!(parse_static_layout("auditor:").is_err());
    }

    #[test]
    fn test_static_install() {
        let p = params();
        let contract = Address::from(ZEC_ELECT_CONSENSUS_ADDR);
        let mut store = MemoryStore::new();
        let chain = MemoryChain::new();
        let config = StaticConsensusConfig {
            layout: layout(),
            warmup_ms: 1_000,
        };
        let mut bootstrap = StaticConsensusBootstrap::new(&config, 5_000).unwrap();

        let early = bootstrap
            .on_timer(&mut store, &chain, &contract, NET, &p, 5_500, 10)
            .unwrap();
        assert_eq!(early, TickOutcome::Skipped(SkipReason::WarmingUp));

        let done = bootstrap
            .on_timer(&mut store, &chain, &contract, NET, &p, 6_000, 10)
            .unwrap();
        assert_eq!(done, TickOutcome::Committed(6));
        assert!(bootstrap.executed());

        let first: ElectionResultStore =
            load_prop(&store, &contract, &election_result_property_name(GroupId(1))).unwrap();
        let auditor = first
            .group(NET, NodeType::ConsensusAuditor, DEFAULT_CLUSTER_ID, GroupId(1))
            .unwrap();
        assert_eq!(auditor.group_version, Some(0));
        let validator = first
            .group(NET, NodeType::ConsensusValidator, DEFAULT_CLUSTER_ID, GroupId(65))
            .unwrap();
        assert_eq!(validator.len(), 1);
        assert_eq!(validator.associated_group_id, Some(GroupId(1)));

        let second: ElectionResultStore =
            load_prop(&store, &contract, &election_result_property_name(GroupId(2))).unwrap();
        let validator = second
            .group(NET, NodeType::ConsensusValidator, DEFAULT_CLUSTER_ID, GroupId(67))
            .unwrap();
        assert_eq!(validator.associated_group_id, Some(GroupId(2)));
        assert!(validator.contains(&NodeId::from("v5")));

        let again = bootstrap
            .on_timer(&mut store, &chain, &contract, NET, &p, 7_000, 11)
            .unwrap();
        assert_eq!(again, TickOutcome::Skipped(SkipReason::AlreadyExecuted));
    }

    #[test]
    fn test_static_install_skipped_on_existing_chain() {
        let p = params();
        let contract = Address::from(ZEC_ELECT_CONSENSUS_ADDR);
        let mut store = MemoryStore::new();
        let mut chain = MemoryChain::new();
        chain.commit_genesis(&contract, 0).unwrap();
        chain.commit_snapshot(&contract, 1, BTreeMap::new()).unwrap();

        let config = StaticConsensusConfig {
            layout: layout(),
            warmup_ms: 0,
        };
        let mut bootstrap = StaticConsensusBootstrap::new(&config, 0).unwrap();
        let outcome = bootstrap
            .on_timer(&mut store, &chain, &contract, NET, &p, 0, 10)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::AlreadyExecuted));
        assert!(bootstrap.executed());
        assert!(store.is_empty());
    }
}
