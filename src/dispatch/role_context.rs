//! Per-contract reaction to committed blocks and beacon timer ticks

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::{
    runs_stand_alone, BroadcastPolicy, CallWay, ContractCall, ContractInfo, MonitorKind,
    RoleDriver, TransactionSubmitter,
};
use crate::chain::{Block, ChainReader};
use crate::types::{Address, NodeType, NodeTypeSet, BEACON_TIMER_ADDR};

/// Stand-alone contracts fire every this many rounds until their first block
const STAND_ALONE_ROUND_STEP: u64 = 3;

/// Events the dispatcher reacts to
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A beacon timer block; its height is the timer round
    Timer(Block),
    /// A block written to the store; `new_block` is false on replays
    BlockToDb { block: Block, new_block: bool },
}

impl ChainEvent {
    pub fn block(&self) -> &Block {
        match self {
            ChainEvent::Timer(block) | ChainEvent::BlockToDb { block, .. } => block,
        }
    }

    fn is_new_block(&self) -> bool {
        matches!(self, ChainEvent::BlockToDb { new_block: true, .. })
    }
}

/// Round-robin cursor of a table-scheduled contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableScheduleInfo {
    pub cur_interval: u32,
    pub target_interval: u32,
    pub cur_table: u16,
}

impl TableScheduleInfo {
    fn new(target_interval: u32, cur_table: u16) -> Self {
        Self {
            cur_interval: 0,
            target_interval,
            cur_table,
        }
    }
}

/// Dispatcher state for one system contract on this node
#[derive(Debug)]
pub struct RoleContext {
    contract_info: ContractInfo,
    /// Last timer round a call was issued for, per contract
    address_round_map: BTreeMap<Address, u64>,
    table_schedule: BTreeMap<Address, TableScheduleInfo>,
}

impl RoleContext {
    pub fn new(contract_info: ContractInfo) -> Self {
        Self {
            contract_info,
            address_round_map: BTreeMap::new(),
            table_schedule: BTreeMap::new(),
        }
    }

    pub fn contract_info(&self) -> &ContractInfo {
        &self.contract_info
    }

    pub fn table_schedule(&self) -> Option<&TableScheduleInfo> {
        self.table_schedule.get(&self.contract_info.address)
    }

    /// React to one event. Returns the number of calls handed to the
    /// submitter.
    ///
    /// `event_broadcasted` is shared between the contexts handling the same
    /// event so a block is broadcast at most once.
    pub fn on_block<D, S, C>(
        &mut self,
        event: &ChainEvent,
        event_broadcasted: &mut bool,
        driver: &mut D,
        submitter: &mut S,
        chain: &C,
    ) -> usize
    where
        D: RoleDriver,
        S: TransactionSubmitter,
        C: ChainReader,
    {
        if !self.contract_info.has_monitors() {
            return 0;
        }

        let block = event.block();
        let owner = block.owner().clone();
        debug!(owner = %owner, height = block.height(), "on_block");

        if event.is_new_block() && self.contract_info.has_broadcasts() {
            self.maybe_broadcast(block, event_broadcasted, driver);
        }

        let monitor = match self.contract_info.find_monitor(&owner) {
            Some(monitor) => monitor.clone(),
            None => return 0,
        };

        match &monitor {
            MonitorKind::Timer { interval, .. } => {
                if owner.as_str() != BEACON_TIMER_ADDR {
                    warn!(owner = %owner, "Timer monitor fired by non-timer account");
                    return 0;
                }
                let round = block.height();
                let timestamp = block.timestamp();

                if self.contract_info.is_scheduled_table_contract() {
                    if !self.valid_call(round) {
                        return 0;
                    }
                    return self.schedule_table_call(&monitor, round, timestamp, driver, submitter);
                }

                let stand_alone = self.is_stand_alone(chain);
                let due = *interval != 0
                    && round != 0
                    && if stand_alone {
                        round % STAND_ALONE_ROUND_STEP == 0
                    } else {
                        round % interval == 0
                    };
                debug!(
                    contract = %self.contract_info.address,
                    round,
                    interval = *interval,
                    due,
                    stand_alone,
                    "Timer round"
                );
                if due && self.valid_call(round) {
                    return self.call_contract(&monitor, round, timestamp, driver, submitter);
                }
                0
            }
            MonitorKind::Block { .. } => {
                // guard keyed by the block's owner so each new height fires once
                if !event.is_new_block() {
                    return 0;
                }
                let height = block.height();
                let fresh = match self.address_round_map.get(&owner) {
                    Some(last) => *last < height,
                    None => true,
                };
                if !fresh {
                    return 0;
                }
                self.address_round_map.insert(owner, height);
                self.call_contract(&monitor, height, block.timestamp(), driver, submitter)
            }
        }
    }

    /// Accept at most one call per timer round
    pub fn valid_call(&mut self, round: u64) -> bool {
        let address = self.contract_info.address.clone();
        match self.address_round_map.get(&address) {
            Some(last) if *last >= round => {
                info!(contract = %address, round, last = *last, "Not a valid call");
                false
            }
            _ => {
                self.address_round_map.insert(address, round);
                true
            }
        }
    }

    /// Stand-alone until the contract commits a block above its genesis block
    fn is_stand_alone<C: ChainReader>(&self, chain: &C) -> bool {
        if !runs_stand_alone(&self.contract_info.address) {
            return false;
        }
        match chain.latest_height(&self.contract_info.address) {
            Ok(height) => height == 0,
            Err(e) => {
                warn!(contract = %self.contract_info.address, error = %e, "Failed to read contract height");
                false
            }
        }
    }

    fn maybe_broadcast<D: RoleDriver>(&self, block: &Block, event_broadcasted: &mut bool, driver: &mut D) {
        if block.owner().base() != self.contract_info.address.base() {
            return;
        }
        if block.header.leader_slot != driver.slot_id() || *event_broadcasted {
            return;
        }
        *event_broadcasted = true;

        match self.contract_info.broadcast_policy {
            BroadcastPolicy::Normal => self.broadcast(block, driver),
            BroadcastPolicy::FullUnit => {
                if block.header.full_unit {
                    self.broadcast(block, driver);
                }
            }
            BroadcastPolicy::None => {}
        }
    }

    fn broadcast<D: RoleDriver>(&self, block: &Block, driver: &mut D) {
        let payload = match bincode::serialize(block) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(owner = %block.owner(), error = %e, "Failed to serialize block for broadcast");
                return;
            }
        };

        let types = self.contract_info.broadcast_types;
        if types.is_all() {
            driver.send_to_group(NodeTypeSet::all(), payload);
            debug!(owner = %block.owner(), height = block.height(), "Broadcast block to all");
            return;
        }
        if types.has_committee() {
            driver.send_to_group(NodeTypeSet::empty().with_committee(), payload.clone());
        }
        if types.contains(NodeType::Zec) {
            driver.send_to_group(NodeTypeSet::empty().with(NodeType::Zec), payload.clone());
        }
        if types.contains(NodeType::Archive) {
            driver.send_to_group(NodeTypeSet::empty().with(NodeType::Archive), payload);
        }
    }

    fn schedule_table_call<D, S>(
        &mut self,
        monitor: &MonitorKind,
        round: u64,
        timestamp: u64,
        driver: &mut D,
        submitter: &mut S,
    ) -> usize
    where
        D: RoleDriver,
        S: TransactionSubmitter,
    {
        let tables = driver.table_ids();
        let first_table = match tables.first() {
            Some(first) => *first,
            None => {
                warn!(contract = %self.contract_info.address, "No tables served, skipping");
                return 0;
            }
        };
        let interval = self.contract_info.table_schedule_interval.unwrap_or(1).max(1);
        let table_for_round =
            first_table + ((round / interval as u64) % tables.len() as u64) as u16;

        let address = self.contract_info.address.clone();
        let fire = match self.table_schedule.get_mut(&address) {
            Some(schedule) => {
                schedule.target_interval = interval;
                schedule.cur_interval += 1;
                if schedule.cur_interval == schedule.target_interval {
                    schedule.cur_table = table_for_round;
                    schedule.cur_interval = 0;
                    true
                } else {
                    false
                }
            }
            None => {
                self.table_schedule
                    .insert(address.clone(), TableScheduleInfo::new(interval, table_for_round));
                true
            }
        };
        if !fire {
            return 0;
        }

        info!(contract = %address, round, table = table_for_round, "Table scheduled");
        let call = ContractCall::timer(
            address.table_address(table_for_round),
            monitor.action(),
            round,
            timestamp,
        );
        usize::from(submit(monitor.call_way(), call, submitter))
    }

    fn call_contract<D, S>(
        &self,
        monitor: &MonitorKind,
        round: u64,
        timestamp: u64,
        driver: &D,
        submitter: &mut S,
    ) -> usize
    where
        D: RoleDriver,
        S: TransactionSubmitter,
    {
        let address = &self.contract_info.address;
        let targets: Vec<Address> = if address.is_sharding_contract() {
            driver
                .table_ids()
                .into_iter()
                .map(|table| address.table_address(table))
                .collect()
        } else {
            vec![address.clone()]
        };

        targets
            .into_iter()
            .map(|target| ContractCall::timer(target, monitor.action(), round, timestamp))
            .filter(|call| submit(monitor.call_way(), call.clone(), submitter))
            .count()
    }
}

fn submit<S: TransactionSubmitter>(call_way: CallWay, call: ContractCall, submitter: &mut S) -> bool {
    let target = call.target.clone();
    let result = match call_way {
        CallWay::Consensus => submitter.request_transaction_consensus(call),
        CallWay::Direct => submitter.execute_direct(call),
    };
    match result {
        Ok(()) => {
            info!(contract = %target, ?call_way, "Contract called");
            true
        }
        Err(e) => {
            warn!(contract = %target, error = %e, "Contract call failed");
            false
        }
    }
}
