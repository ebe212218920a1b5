//! RPC Method Implementations
//!
//! Each method is a read-only query over the election contracts' committed
//! properties.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::GovernanceParams;
use crate::election::{
    ElectionGroupResult, GenesisBootstrap, GenesisStage, GroupAssocContract, ClusterElectionStores,
    ElectConsensusContract,
};
use crate::standby::StandbyPoolContract;
use crate::storage::db::PropertyDb;
use crate::types::{NetworkId, NodeType, DEFAULT_CLUSTER_ID};

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Value,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC Error
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// RPC Handler State
///
/// Sled handles are shared, so queries read committed state without
/// locking the runtime.
pub struct RpcState {
    pub db: PropertyDb,
    pub network_id: NetworkId,
    pub params: GovernanceParams,
}

/// Process a JSON-RPC request and return a response
pub fn handle_request(state: &RpcState, request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "getelectionresult" => get_election_result(state, request.id, request.params),
        "getstandbys" => get_standbys(state, request.id),
        "getassociation" => get_association(state, request.id),
        "getgenesisstatus" => get_genesis_status(state, request.id),
        "getgovernance" => get_governance(state, request.id),
        _ => JsonRpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    }
}

fn parse_node_type(name: &str) -> Option<NodeType> {
    NodeType::ALL.into_iter().find(|t| t.to_string() == name)
}

fn group_json(node_type: NodeType, group_id: u8, group: &ElectionGroupResult) -> Value {
    let members: Vec<Value> = group
        .nodes()
        .iter()
        .map(|(node_id, info)| {
            json!({
                "node_id": node_id.as_str(),
                "joined_version": info.joined_version,
                "stake": info.stake,
                "public_key": info.consensus_public_key.to_hex(),
            })
        })
        .collect();
    json!({
        "node_type": node_type.to_string(),
        "group_id": group_id,
        "version": group.group_version,
        "timestamp": group.timestamp,
        "start_time": group.start_time,
        "associated_group_id": group.associated_group_id.map(|g| g.0),
        "associated_group_version": group.associated_group_version,
        "members": members,
    })
}

/// Returns elected groups, optionally filtered by node type name
/// (`["auditor"]`, `["validator"]`)
fn get_election_result(state: &RpcState, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let filter = match params {
        None => None,
        Some(Value::Array(arr)) if arr.is_empty() => None,
        Some(Value::Array(arr)) => match arr[0].as_str().and_then(parse_node_type) {
            Some(t) => Some(t),
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: expected node type".into()),
        },
        Some(Value::String(s)) => match parse_node_type(&s) {
            Some(t) => Some(t),
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown node type {}", s)),
        },
        _ => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: expected node type".into()),
    };

    let contract = ElectConsensusContract::new(state.network_id, state.params.clone());
    let stores: ClusterElectionStores = match contract.load_stores(&state.db) {
        Ok(stores) => stores,
        Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    };

    let mut groups = Vec::new();
    for store in stores.values() {
        let network = match store.network(state.network_id) {
            Some(network) => network,
            None => continue,
        };
        for (node_type, type_result) in network.node_types() {
            if filter.map_or(false, |t| t != *node_type) {
                continue;
            }
            for (_, cluster) in type_result.clusters() {
                for (group_id, group) in cluster.groups() {
                    if !group.is_empty() {
                        groups.push(group_json(*node_type, group_id.0, group));
                    }
                }
            }
        }
    }
    JsonRpcResponse::success(id, json!(groups))
}

/// Returns the standby pool of this network
fn get_standbys(state: &RpcState, id: Value) -> JsonRpcResponse {
    let standby = match StandbyPoolContract::new(state.network_id).load(&state.db) {
        Ok(standby) => standby,
        Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    };
    let network = match standby.network(state.network_id) {
        Some(network) => network,
        None => return JsonRpcResponse::success(id, json!({ "activated": false, "nodes": [] })),
    };

    let nodes: Vec<Value> = network
        .nodes()
        .iter()
        .map(|(node_id, info)| {
            let stakes: serde_json::Map<String, Value> = info
                .stake_container
                .iter()
                .map(|(t, stake)| (t.to_string(), json!(stake)))
                .collect();
            json!({
                "node_id": node_id.as_str(),
                "public_key": info.consensus_public_key.to_hex(),
                "program_version": info.program_version,
                "is_genesis_node": info.is_genesis_node,
                "stakes": stakes,
            })
        })
        .collect();
    JsonRpcResponse::success(id, json!({ "activated": network.activated(), "nodes": nodes }))
}

/// Returns validator group -> auditor group pairs of the default cluster
fn get_association(state: &RpcState, id: Value) -> JsonRpcResponse {
    let store = match GroupAssocContract::new().load(&state.db) {
        Ok(store) => store,
        Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    };
    let pairs: Vec<Value> = store
        .result_of(DEFAULT_CLUSTER_ID)
        .map(|cluster| {
            cluster
                .iter()
                .map(|(validator, auditor)| json!({ "validator": validator.0, "auditor": auditor.0 }))
                .collect()
        })
        .unwrap_or_default();
    JsonRpcResponse::success(id, json!(pairs))
}

fn get_genesis_status(state: &RpcState, id: Value) -> JsonRpcResponse {
    let contract = ElectConsensusContract::new(state.network_id, state.params.clone());
    match GenesisBootstrap::load(&state.db, contract.address()) {
        Ok(genesis) => {
            let status = match genesis.stage() {
                GenesisStage::NotStarted => json!({ "stage": "not_started" }),
                GenesisStage::InProgress { elected_groups } => {
                    json!({ "stage": "in_progress", "elected_groups": elected_groups })
                }
                GenesisStage::Completed => json!({ "stage": "completed" }),
            };
            JsonRpcResponse::success(id, status)
        }
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}

fn get_governance(state: &RpcState, id: Value) -> JsonRpcResponse {
    match serde_json::to_value(&state.params) {
        Ok(params) => JsonRpcResponse::success(id, params),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}
