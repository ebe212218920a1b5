//! On-chain governance parameters consumed by the election engine
//!
//! Parameters are read through a [`GovernanceSource`], a read-only key/value
//! lookup. Missing keys fall back to the defaults below; the loaded set is
//! validated before any election uses it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{AUDITOR_GROUP_ID_BEGIN, AUDITOR_GROUP_ID_END, VALIDATOR_GROUP_ID_BEGIN, VALIDATOR_GROUP_ID_END};

pub const VALIDATOR_GROUP_COUNT: &str = "validator_group_count";
pub const AUDITOR_GROUP_COUNT: &str = "auditor_group_count";
pub const MIN_AUDITOR_GROUP_SIZE: &str = "min_auditor_group_size";
pub const MAX_AUDITOR_GROUP_SIZE: &str = "max_auditor_group_size";
pub const MIN_VALIDATOR_GROUP_SIZE: &str = "min_validator_group_size";
pub const MAX_VALIDATOR_GROUP_SIZE: &str = "max_validator_group_size";
pub const CLUSTER_ELECTION_INTERVAL: &str = "cluster_election_interval";
pub const ZONE_ELECTION_TRIGGER_INTERVAL: &str = "zone_election_trigger_interval";
pub const MAX_AUDITOR_ROTATION_COUNT: &str = "max_auditor_rotation_count";
pub const ELECTION_SELECTION_POLICY: &str = "election_selection_policy";
pub const TABLEWORKLOAD_REPORT_SCHEDULE_INTERVAL: &str = "tableworkload_report_schedule_interval";
pub const TABLESLASH_REPORT_SCHEDULE_INTERVAL: &str = "tableslash_report_schedule_interval";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid governance parameter {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("Invalid node configuration: {0}")]
    Node(String),
}

/// Read-only governance parameter lookup
pub trait GovernanceSource {
    fn get(&self, key: &str) -> Option<u64>;
}

/// Parameter table backed by a map (genesis config, overrides, tests)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamTable(pub BTreeMap<String, u64>);

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: u64) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }
}

impl GovernanceSource for ParamTable {
    fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }
}

/// How the group elector picks committee members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Probability of selection proportional to role stake
    #[default]
    StakeWeighted,
    /// Every eligible candidate equally likely
    Uniform,
}

impl SelectionPolicy {
    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(SelectionPolicy::StakeWeighted),
            1 => Some(SelectionPolicy::Uniform),
            _ => None,
        }
    }

    fn code(self) -> u64 {
        match self {
            SelectionPolicy::StakeWeighted => 0,
            SelectionPolicy::Uniform => 1,
        }
    }
}

/// Inclusive committee size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: u16,
    pub max: u16,
}

impl SizeRange {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, size: usize) -> bool {
        size >= self.min as usize && size <= self.max as usize
    }
}

/// Election-relevant governance parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    pub validator_group_count: u16,
    pub auditor_group_count: u16,
    pub min_auditor_group_size: u16,
    pub max_auditor_group_size: u16,
    pub min_validator_group_size: u16,
    pub max_validator_group_size: u16,
    /// Logical time between expected rotations of a group
    pub cluster_election_interval: u64,
    /// Timer interval of the election contract; must stay below the cluster interval
    pub zone_election_trigger_interval: u64,
    pub max_auditor_rotation_count: u16,
    pub selection_policy: SelectionPolicy,
    pub tableworkload_report_schedule_interval: u32,
    pub tableslash_report_schedule_interval: u32,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            validator_group_count: 4,
            auditor_group_count: 2,
            min_auditor_group_size: 6,
            max_auditor_group_size: 64,
            min_validator_group_size: 6,
            max_validator_group_size: 128,
            cluster_election_interval: 360,
            zone_election_trigger_interval: 61,
            max_auditor_rotation_count: 2,
            selection_policy: SelectionPolicy::StakeWeighted,
            tableworkload_report_schedule_interval: 6,
            tableslash_report_schedule_interval: 6,
        }
    }
}

impl GovernanceSource for GovernanceParams {
    fn get(&self, key: &str) -> Option<u64> {
        let value = match key {
            VALIDATOR_GROUP_COUNT => self.validator_group_count as u64,
            AUDITOR_GROUP_COUNT => self.auditor_group_count as u64,
            MIN_AUDITOR_GROUP_SIZE => self.min_auditor_group_size as u64,
            MAX_AUDITOR_GROUP_SIZE => self.max_auditor_group_size as u64,
            MIN_VALIDATOR_GROUP_SIZE => self.min_validator_group_size as u64,
            MAX_VALIDATOR_GROUP_SIZE => self.max_validator_group_size as u64,
            CLUSTER_ELECTION_INTERVAL => self.cluster_election_interval,
            ZONE_ELECTION_TRIGGER_INTERVAL => self.zone_election_trigger_interval,
            MAX_AUDITOR_ROTATION_COUNT => self.max_auditor_rotation_count as u64,
            ELECTION_SELECTION_POLICY => self.selection_policy.code(),
            TABLEWORKLOAD_REPORT_SCHEDULE_INTERVAL => self.tableworkload_report_schedule_interval as u64,
            TABLESLASH_REPORT_SCHEDULE_INTERVAL => self.tableslash_report_schedule_interval as u64,
            _ => return None,
        };
        Some(value)
    }
}

fn read_u16<S: GovernanceSource + ?Sized>(source: &S, key: &'static str, default: u16) -> Result<u16, ConfigError> {
    match source.get(key) {
        None => Ok(default),
        Some(v) => u16::try_from(v).map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("{} does not fit in 16 bits", v),
        }),
    }
}

fn read_u32<S: GovernanceSource + ?Sized>(source: &S, key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match source.get(key) {
        None => Ok(default),
        Some(v) => u32::try_from(v).map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("{} does not fit in 32 bits", v),
        }),
    }
}

impl GovernanceParams {
    /// Read every parameter from `source`, defaulting missing keys, and validate
    pub fn from_source<S: GovernanceSource + ?Sized>(source: &S) -> Result<Self, ConfigError> {
        let d = Self::default();
        let selection_policy = match source.get(ELECTION_SELECTION_POLICY) {
            None => d.selection_policy,
            Some(code) => SelectionPolicy::from_code(code).ok_or_else(|| ConfigError::Invalid {
                key: ELECTION_SELECTION_POLICY,
                reason: format!("unknown policy code {}", code),
            })?,
        };

        let params = Self {
            validator_group_count: read_u16(source, VALIDATOR_GROUP_COUNT, d.validator_group_count)?,
            auditor_group_count: read_u16(source, AUDITOR_GROUP_COUNT, d.auditor_group_count)?,
            min_auditor_group_size: read_u16(source, MIN_AUDITOR_GROUP_SIZE, d.min_auditor_group_size)?,
            max_auditor_group_size: read_u16(source, MAX_AUDITOR_GROUP_SIZE, d.max_auditor_group_size)?,
            min_validator_group_size: read_u16(source, MIN_VALIDATOR_GROUP_SIZE, d.min_validator_group_size)?,
            max_validator_group_size: read_u16(source, MAX_VALIDATOR_GROUP_SIZE, d.max_validator_group_size)?,
            cluster_election_interval: source.get(CLUSTER_ELECTION_INTERVAL).unwrap_or(d.cluster_election_interval),
            zone_election_trigger_interval: source
                .get(ZONE_ELECTION_TRIGGER_INTERVAL)
                .unwrap_or(d.zone_election_trigger_interval),
            max_auditor_rotation_count: read_u16(source, MAX_AUDITOR_ROTATION_COUNT, d.max_auditor_rotation_count)?,
            selection_policy,
            tableworkload_report_schedule_interval: read_u32(
                source,
                TABLEWORKLOAD_REPORT_SCHEDULE_INTERVAL,
                d.tableworkload_report_schedule_interval,
            )?,
            tableslash_report_schedule_interval: read_u32(
                source,
                TABLESLASH_REPORT_SCHEDULE_INTERVAL,
                d.tableslash_report_schedule_interval,
            )?,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the invariants the election relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };

        if self.auditor_group_count == 0 {
            return Err(invalid(AUDITOR_GROUP_COUNT, "must be non-zero"));
        }
        if self.auditor_group_count as u32 > (AUDITOR_GROUP_ID_END - AUDITOR_GROUP_ID_BEGIN) as u32 {
            return Err(invalid(AUDITOR_GROUP_COUNT, "exceeds the auditor group id range"));
        }
        if self.validator_group_count < self.auditor_group_count {
            return Err(invalid(
                VALIDATOR_GROUP_COUNT,
                "every auditor group needs at least one validator group",
            ));
        }
        if self.validator_group_count % self.auditor_group_count != 0 {
            return Err(invalid(
                VALIDATOR_GROUP_COUNT,
                "must be a multiple of auditor_group_count",
            ));
        }
        if self.validator_group_count as u32 > (VALIDATOR_GROUP_ID_END - VALIDATOR_GROUP_ID_BEGIN) as u32 {
            return Err(invalid(VALIDATOR_GROUP_COUNT, "exceeds the validator group id range"));
        }
        if self.min_auditor_group_size == 0 || self.min_auditor_group_size > self.max_auditor_group_size {
            return Err(invalid(MIN_AUDITOR_GROUP_SIZE, "must be in 1..=max_auditor_group_size"));
        }
        if self.min_validator_group_size == 0 || self.min_validator_group_size > self.max_validator_group_size {
            return Err(invalid(MIN_VALIDATOR_GROUP_SIZE, "must be in 1..=max_validator_group_size"));
        }
        if self.zone_election_trigger_interval >= self.cluster_election_interval {
            return Err(invalid(
                ZONE_ELECTION_TRIGGER_INTERVAL,
                "must be strictly less than cluster_election_interval",
            ));
        }
        if self.max_auditor_rotation_count == 0 {
            return Err(invalid(MAX_AUDITOR_ROTATION_COUNT, "must be non-zero"));
        }
        Ok(())
    }

    pub fn auditor_size_range(&self) -> SizeRange {
        SizeRange::new(self.min_auditor_group_size, self.max_auditor_group_size)
    }

    pub fn validator_size_range(&self) -> SizeRange {
        SizeRange::new(self.min_validator_group_size, self.max_validator_group_size)
    }

    /// Validator groups associated with each auditor group
    pub fn validator_fan_out(&self) -> u16 {
        self.validator_group_count / self.auditor_group_count.max(1)
    }

    /// Auditor plus validator groups in the cluster
    pub fn total_group_count(&self) -> u64 {
        self.auditor_group_count as u64 + self.validator_group_count as u64
    }
}
