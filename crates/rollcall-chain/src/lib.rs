//! rollcall-chain: read attendance records from the deployed contract.
//!
//! Calls are encoded with `ethabi` and sent as JSON-RPC `eth_call`s; nothing
//! here signs or sends transactions.

pub mod artifact;
pub mod contract;
pub mod error;
pub mod rpc;

pub use artifact::{parse_address, ContractArtifact, DEFAULT_NETWORK_ID};
pub use contract::{AttendanceContract, Classroom, MarkedAttendance, RosterEntry, Student};
pub use error::ChainError;
pub use ethabi::Address;
pub use rpc::RpcClient;
