//! Standby pool contract
//!
//! Maintains the standby result store from the registration contract's
//! records. Every committed store is also published as a block snapshot of
//! the contract account; the election reads it back by height.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{
    read_activation, read_registrations, ActivationRecord, RegistrationRecord, RoleType, StandbyNetworkResult,
    StandbyNodeInfo, StandbyResultStore,
};
use crate::chain::{ChainReader, ChainWriter};
use crate::config::SeedNodeConfig;
use crate::context::{ContractContext, SkipReason, TickOutcome};
use crate::crypto::PublicKey;
use crate::error::ContractError;
use crate::storage::{load_prop, save_prop, PropertyStore, StorageError};
use crate::types::{Address, LogicTime, NetworkId, NodeId, NodeType, REC_STANDBY_POOL_ADDR, ZEC_STANDBY_POOL_ADDR};

/// String property holding the serialized [`StandbyResultStore`]
pub const STANDBYS_KEY: &str = "standbys";

/// String property of the zec standby pool: last rec standby height read (decimal)
pub const LAST_READ_REC_STANDBY_HEIGHT_KEY: &str = "last_read_rec_standby_pool_height";

/// Program version credited to genesis seed nodes
pub const GENESIS_PROGRAM_VERSION: &str = "1.0.0";

pub struct StandbyPoolContract {
    network_id: NetworkId,
    address: Address,
}

impl StandbyPoolContract {
    pub fn new(network_id: NetworkId) -> Self {
        Self {
            network_id,
            address: Address::from(REC_STANDBY_POOL_ADDR),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Register the genesis seed nodes in every role
    pub fn setup<S: PropertyStore + ?Sized>(
        &self,
        store: &mut S,
        seed_nodes: &[SeedNodeConfig],
    ) -> Result<(), ContractError> {
        let mut standby_store = StandbyResultStore::default();
        for seed in seed_nodes {
            let consensus_public_key =
                PublicKey::from_hex(&seed.public_key).map_err(|e| ContractError::InvalidRegistration {
                    node: NodeId::new(seed.node_id.clone()),
                    reason: e.to_string(),
                })?;
            let info = StandbyNodeInfo {
                consensus_public_key,
                stake_container: NodeType::ALL.iter().map(|t| (*t, seed.stake)).collect(),
                program_version: GENESIS_PROGRAM_VERSION.to_string(),
                is_genesis_node: true,
            };
            standby_store
                .result_of(self.network_id)
                .insert(NodeId::new(seed.node_id.clone()), info);
        }

        store.string_create(&self.address, STANDBYS_KEY)?;
        save_prop(store, &self.address, STANDBYS_KEY, &standby_store)?;
        info!(seeds = seed_nodes.len(), network = self.network_id.0, "Standby pool set up");
        Ok(())
    }

    pub fn load<S: PropertyStore + ?Sized>(&self, store: &S) -> Result<StandbyResultStore, StorageError> {
        load_prop(store, &self.address, STANDBYS_KEY)
    }

    /// Add (or refresh) a registered node in every network it registered for.
    ///
    /// Returns whether the standby store changed.
    pub fn node_join_network<S: PropertyStore + ?Sized>(
        &self,
        store: &mut S,
        node_id: &NodeId,
        program_version: &str,
    ) -> Result<bool, ContractError> {
        let registrations = read_registrations(store)?;
        if registrations.is_empty() {
            return Err(ContractError::RegistrationUnavailable);
        }
        let record = registrations.get(node_id).ok_or_else(|| ContractError::InvalidRegistration {
            node: node_id.clone(),
            reason: "not found in registration map".to_string(),
        })?;
        check_registration(node_id, record)?;

        let info = StandbyNodeInfo {
            consensus_public_key: record.consensus_public_key.clone(),
            stake_container: record.stake_container(),
            program_version: program_version.to_string(),
            is_genesis_node: record.is_genesis_node,
        };

        let mut standby_store = self.load(store)?;
        let mut changed = false;
        for network_id in &record.network_ids {
            changed |= standby_store.result_of(*network_id).insert(node_id.clone(), info.clone());
        }

        if changed {
            debug!(node = %node_id, role = ?record.role, "Node joined standby pool");
            save_prop(store, &self.address, STANDBYS_KEY, &standby_store)?;
        }
        Ok(changed)
    }

    /// Reconcile the standby store with the registration contract.
    ///
    /// Commits `true` when the store changed.
    pub fn on_timer<S, X>(
        &self,
        ctx: &X,
        store: &mut S,
        current_time: LogicTime,
    ) -> Result<TickOutcome<bool>, ContractError>
    where
        S: PropertyStore + ?Sized,
        X: ContractContext,
    {
        ensure_self_invoked(ctx, &self.address)?;
        if current_time > ctx.consensus_time() {
            warn!(tick = current_time, now = ctx.consensus_time(), "Standby timer ahead of consensus time");
            return Ok(TickOutcome::Skipped(SkipReason::FutureTick {
                tick: current_time,
                now: ctx.consensus_time(),
            }));
        }

        let registrations = read_registrations(store)?;
        debug!(records = registrations.len(), "Registration data read");
        if registrations.is_empty() {
            return Err(ContractError::RegistrationUnavailable);
        }

        let activation = read_activation(store)?;
        let mut standby_store = self.load(store)?;
        let updated = update_standby_result_store(&registrations, &mut standby_store, &activation);
        if updated {
            debug!("Standby pool updated");
            save_prop(store, &self.address, STANDBYS_KEY, &standby_store)?;
        }
        Ok(TickOutcome::Committed(updated))
    }

    /// Publish the current store as the next block of the pool account.
    ///
    /// Returns the new block height. The zone side records it with
    /// [`record_standby_height`] when it sees the block.
    pub fn publish_snapshot<S, C>(&self, store: &S, chain: &mut C, timestamp: LogicTime) -> Result<u64, StorageError>
    where
        S: PropertyStore + ?Sized,
        C: ChainWriter + ?Sized,
    {
        let bytes = store.string_get(&self.address, STANDBYS_KEY)?.unwrap_or_default();
        let mut properties = BTreeMap::new();
        properties.insert(STANDBYS_KEY.to_string(), bytes);
        chain.commit_snapshot(&self.address, timestamp, properties)
    }
}

/// Record `height` as the standby snapshot height the election reads.
///
/// Heights never move backwards; returns whether the record changed.
pub fn record_standby_height<S: PropertyStore + ?Sized>(store: &mut S, height: u64) -> Result<bool, StorageError> {
    let zec = Address::from(ZEC_STANDBY_POOL_ADDR);
    let recorded = store.string_get(&zec, LAST_READ_REC_STANDBY_HEIGHT_KEY)?.is_some();
    if recorded && read_height(store)? >= height {
        return Ok(false);
    }
    store.string_set(&zec, LAST_READ_REC_STANDBY_HEIGHT_KEY, height.to_string().into_bytes())?;
    Ok(true)
}

pub(crate) fn ensure_self_invoked<X: ContractContext>(ctx: &X, expected: &Address) -> Result<(), ContractError> {
    if ctx.source_address() != ctx.self_address() {
        return Err(ContractError::Unauthorized {
            contract: ctx.self_address().clone(),
            caller: ctx.source_address().clone(),
        });
    }
    if ctx.self_address() != expected {
        return Err(ContractError::WrongContract {
            expected: expected.clone(),
            actual: ctx.self_address().clone(),
        });
    }
    Ok(())
}

fn check_registration(node_id: &NodeId, record: &RegistrationRecord) -> Result<(), ContractError> {
    let invalid = |reason: String| ContractError::InvalidRegistration {
        node: node_id.clone(),
        reason,
    };
    if record.role == RoleType::Invalid {
        return Err(invalid("invalid role".to_string()));
    }
    if record.account_mortgage < record.required_min_deposit {
        return Err(invalid(format!(
            "account mortgage {} < required min deposit {}",
            record.account_mortgage, record.required_min_deposit
        )));
    }
    if !record.consensus_public_key.is_valid() {
        return Err(invalid("malformed consensus public key".to_string()));
    }
    Ok(())
}

/// Refresh `info` from its registration record, keeping the program version
fn update_standby_node(record: &RegistrationRecord, info: &mut StandbyNodeInfo) -> bool {
    let refreshed = StandbyNodeInfo {
        consensus_public_key: record.consensus_public_key.clone(),
        stake_container: record.stake_container(),
        program_version: info.program_version.clone(),
        is_genesis_node: record.is_genesis_node,
    };
    if refreshed == *info {
        return false;
    }
    *info = refreshed;
    true
}

fn update_standby_result_store(
    registrations: &BTreeMap<NodeId, RegistrationRecord>,
    standby_store: &mut StandbyResultStore,
    activation: &ActivationRecord,
) -> bool {
    let mut updated = false;
    for (network_id, network) in standby_store.networks_mut() {
        let nodes = network.nodes_mut();
        let before = nodes.len();
        nodes.retain(|node_id, _| {
            let keep = registrations.contains_key(node_id);
            if !keep {
                info!(node = %node_id, network = network_id.0, "Node left standby pool: deregistered");
            }
            keep
        });
        updated |= nodes.len() != before;

        for (node_id, info) in nodes.iter_mut() {
            if let Some(record) = registrations.get(node_id) {
                updated |= update_standby_node(record, info);
            }
        }

        if activation.activated {
            updated |= network.activate();
        }
    }
    updated
}

/// Read the standby role view for `network_id` from the latest published
/// snapshot at or below the recorded read height.
///
/// Walks down from the recorded height until a block carries a non-empty
/// store. `Ok(None)` means no such block could be read.
pub fn read_standby_snapshot<S, C>(
    store: &S,
    chain: &C,
    network_id: NetworkId,
) -> Result<Option<StandbyNetworkResult>, ContractError>
where
    S: PropertyStore + ?Sized,
    C: ChainReader + ?Sized,
{
    let start = read_height(store)?;
    let pool = Address::from(REC_STANDBY_POOL_ADDR);
    let mut height = start;
    loop {
        let block = match chain.get_block_by_height(&pool, height)? {
            Some(block) => block,
            None => {
                warn!(height, "Standby pool snapshot block missing");
                return Ok(None);
            }
        };
        if let Some(bytes) = block.native_string_get(STANDBYS_KEY) {
            if !bytes.is_empty() {
                let standby_store: StandbyResultStore = bincode::deserialize(bytes)?;
                let view = standby_store
                    .network(network_id)
                    .map(|n| n.network_result())
                    .unwrap_or_default();
                debug!(height, start, "Standby snapshot read");
                return Ok(Some(view));
            }
        }
        if height == 0 {
            return Ok(None);
        }
        height -= 1;
    }
}

fn read_height<S: PropertyStore + ?Sized>(store: &S) -> Result<u64, StorageError> {
    let zec = Address::from(ZEC_STANDBY_POOL_ADDR);
    let raw = match store.string_get(&zec, LAST_READ_REC_STANDBY_HEIGHT_KEY)? {
        Some(raw) => raw,
        None => return Ok(0),
    };
    std::str::from_utf8(&raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            warn!(value = %String::from_utf8_lossy(&raw), "Malformed standby read height");
            StorageError::MalformedValue {
                account: zec,
                key: LAST_READ_REC_STANDBY_HEIGHT_KEY.to_string(),
            }
        })
}
