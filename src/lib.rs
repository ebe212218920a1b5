//! Committee Election Core Library
//!
//! Deterministic election of auditor and validator committees from a
//! stake-weighted standby pool. Every replica that sees the same standby
//! snapshot, governance parameters and random seed derives the same groups.

pub mod types;
pub mod crypto;
pub mod chain;
pub mod storage;
pub mod config;
pub mod context;
pub mod error;
pub mod standby;
pub mod election;
pub mod dispatch;
pub mod runtime;
pub mod rpc;
