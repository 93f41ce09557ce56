//! Contract ABI loading.
//!
//! Accepts either a bare ABI array or a Truffle build artifact, whose
//! `networks.<id>.address` entry records where the contract was deployed.

use crate::error::ChainError;
use ethabi::{Address, Contract};
use serde_json::Value;
use std::path::Path;

/// ABI of the attendance contract's read and write functions.
const EMBEDDED_ABI: &str = include_str!("../abi/AttendanceSystem.json");

/// Ganache's default network id.
pub const DEFAULT_NETWORK_ID: &str = "5777";

pub struct ContractArtifact {
    pub abi: Contract,
    /// Deployed address for the requested network, if the artifact has one.
    pub address: Option<Address>,
}

impl ContractArtifact {
    /// The ABI compiled into this crate; carries no address.
    pub fn embedded() -> Result<Self, ChainError> {
        Self::from_json(EMBEDDED_ABI, DEFAULT_NETWORK_ID)
    }

    pub fn from_file(path: &Path, network_id: &str) -> Result<Self, ChainError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text, network_id)
    }

    pub fn from_json(text: &str, network_id: &str) -> Result<Self, ChainError> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Array(_) => Ok(Self {
                abi: serde_json::from_value(value)?,
                address: None,
            }),
            Value::Object(mut artifact) => {
                let abi = artifact
                    .remove("abi")
                    .ok_or_else(|| ChainError::Artifact("missing \"abi\" field".into()))?;
                let address = artifact
                    .get("networks")
                    .and_then(|n| n.get(network_id))
                    .and_then(|n| n.get("address"))
                    .and_then(Value::as_str)
                    .map(parse_address)
                    .transpose()?;
                Ok(Self {
                    abi: serde_json::from_value(abi)?,
                    address,
                })
            }
            _ => Err(ChainError::Artifact(
                "expected an ABI array or an artifact object".into(),
            )),
        }
    }
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address. Checksum case is
/// not verified.
pub fn parse_address(text: &str) -> Result<Address, ChainError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let bytes = hex::decode(digits).map_err(|_| ChainError::InvalidAddress(text.to_string()))?;
    if bytes.len() != 20 {
        return Err(ChainError::InvalidAddress(text.to_string()));
    }
    Ok(Address::from_slice(&bytes))
}
