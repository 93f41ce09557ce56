//! Read-only attendance commands against the deployed contract.

use anyhow::{Context, Result};
use clap::Args;
use rollcall_chain::{
    parse_address, Address, AttendanceContract, ContractArtifact, RpcClient, Student,
    DEFAULT_NETWORK_ID,
};
use std::path::PathBuf;

/// Address the contract was deployed at on the local development chain.
const DEFAULT_CONTRACT_ADDRESS: &str = "0x472dD472E7bB103b92E5e7836CA8451D0a68930d";

#[derive(Args)]
pub struct ChainArgs {
    /// JSON-RPC endpoint of the chain
    #[arg(long, env = "ROLLCALL_RPC_URL", default_value = "http://127.0.0.1:7545", global = true)]
    rpc_url: String,

    /// Contract address; overrides the artifact's deployed address
    #[arg(long, env = "ROLLCALL_CONTRACT_ADDRESS", global = true)]
    contract_address: Option<String>,

    /// Truffle artifact or bare ABI JSON; the bundled ABI is used otherwise
    #[arg(long, env = "ROLLCALL_CONTRACT_ARTIFACT", global = true)]
    contract_artifact: Option<PathBuf>,

    /// Network whose deployed address is read from the artifact
    #[arg(long, env = "ROLLCALL_NETWORK_ID", default_value = DEFAULT_NETWORK_ID, global = true)]
    network_id: String,
}

impl ChainArgs {
    fn contract(&self) -> Result<AttendanceContract> {
        let artifact = match &self.contract_artifact {
            Some(path) => ContractArtifact::from_file(path, &self.network_id)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => ContractArtifact::embedded()?,
        };
        let address = resolve_address(self.contract_address.as_deref(), &artifact)?;
        let contract = AttendanceContract::from_artifact(RpcClient::new(&self.rpc_url), artifact, address)?;
        tracing::debug!(rpc = %self.rpc_url, contract = ?contract.address(), "contract ready");
        Ok(contract)
    }
}

/// An explicit address wins, then the artifact's, then the development default.
fn resolve_address(explicit: Option<&str>, artifact: &ContractArtifact) -> Result<Option<Address>> {
    match explicit {
        Some(text) => Ok(Some(parse_address(text)?)),
        None if artifact.address.is_some() => Ok(None),
        None => Ok(Some(parse_address(DEFAULT_CONTRACT_ADDRESS)?)),
    }
}

pub async fn roster(args: &ChainArgs, class_id: u64) -> Result<()> {
    let contract = args.contract()?;
    let (classroom, entries) = contract
        .roster(class_id)
        .await
        .with_context(|| format!("failed to read classroom {class_id}"))?;

    println!(
        "Classroom {}: {} ({} students)",
        classroom.id,
        classroom.name,
        classroom.students.len()
    );
    for (address, student) in entries {
        match student {
            Ok(student) => println!("  {}", student_line(&student)),
            Err(e) => println!("  {address:?}  error: {e}"),
        }
    }
    Ok(())
}

pub async fn classrooms(args: &ChainArgs) -> Result<()> {
    let contract = args.contract()?;
    let count = contract.classroom_count().await?;
    if count == 0 {
        println!("No classrooms");
        return Ok(());
    }
    for id in 0..count {
        match contract.get_classroom(id).await {
            Ok(room) => println!("{:>4}  {:<24} {} students", id, room.name, room.students.len()),
            Err(e) => println!("{id:>4}  error: {e}"),
        }
    }
    Ok(())
}

pub async fn marked(args: &ChainArgs, class_id: u64) -> Result<()> {
    let contract = args.contract()?;
    let marked = contract.marked_attendance(class_id).await?;
    if marked.addresses.is_empty() {
        println!("No attendance marked in classroom {class_id}");
        return Ok(());
    }
    for (address, reg_no) in marked.addresses.iter().zip(&marked.reg_nos) {
        println!("{reg_no:<16} {address:?}");
    }
    Ok(())
}

fn student_line(student: &Student) -> String {
    format!(
        "{:?}  {:<12} {:<24} {:<10} last attendance: {}",
        student.address,
        student.reg_no,
        student.name,
        if student.is_verified { "verified" } else { "unverified" },
        format_timestamp(student.last_attendance)
    )
}

/// Unix seconds as UTC, or "never" for zero.
fn format_timestamp(secs: u64) -> String {
    if secs == 0 {
        return "never".to_string();
    }
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "never");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
        assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn test_resolve_address() {
        let bare = ContractArtifact::embedded().unwrap();
        assert_eq!(
            resolve_address(None, &bare).unwrap(),
            Some(parse_address(DEFAULT_CONTRACT_ADDRESS).unwrap())
        );

        let explicit = "0x00000000000000000000000000000000000000aa";
        assert_eq!(
            resolve_address(Some(explicit), &bare).unwrap(),
            Some(parse_address(explicit).unwrap())
        );
        assert!(resolve_address(Some("0x1234"), &bare).is_err());
    }

    #[test]
    fn test_resolve_address_prefers_artifact() {
        let json = r#"{
            "abi": [],
            "networks": { "5777": { "address": "0x00000000000000000000000000000000000000bb" } }
        }"#;
        let artifact = ContractArtifact::from_json(json, "5777").unwrap();
        assert_eq!(resolve_address(None, &artifact).unwrap(), None);
    }

    #[test]
    fn test_student_line() {
        let student = Student {
            address: Address::zero(),
            name: "Asha".into(),
            reg_no: "21BCE0001".into(),
            last_attendance: 0,
            is_verified: true,
        };
        let line = student_line(&student);
        assert!(line.contains("21BCE0001"));
        assert!(line.contains("verified"));
        assert!(line.ends_with("last attendance: never"));
    }
}
