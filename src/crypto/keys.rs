//! Consensus public keys
//!
//! Nodes register an x-only secp256k1 (BIP-340) key used to sign committee
//! messages. The election engine only stores and validates keys.

use k256::schnorr::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::hash_bytes;
use crate::types::NodeId;

/// Prefix of node account ids derived from consensus keys
const NODE_ID_PREFIX: &str = "T8";

/// Key errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// 32-byte x-only consensus public key
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(PublicKey(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether the bytes are a valid point on the curve
    pub fn is_valid(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }

    /// Account id for a node owning this key
    pub fn node_id(&self) -> NodeId {
        let digest = hash_bytes(&self.0);
        NodeId(format!(
            "{}{}",
            NODE_ID_PREFIX,
            bs58::encode(&digest.0[..20]).into_string()
        ))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Consensus key pair held by a node
#[derive(Clone)]
pub struct ConsensusKeypair {
    signing_key: SigningKey,
}

impl fmt::Debug for ConsensusKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusKeypair({:?})", self.public_key())
    }
}

impl ConsensusKeypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Deterministic key pair from 32 secret bytes
    pub fn from_secret(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_bytes(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> PublicKey {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&self.signing_key.verifying_key().to_bytes());
        PublicKey(arr)
    }
}
