use ethabi::ethereum_types::U256;
use ethabi::Token;
use httpmock::{Method::POST, MockServer};
use rollcall_chain::{parse_address, Address, AttendanceContract, ChainError, ContractArtifact, RpcClient};
use serde_json::json;

const CONTRACT: &str = "0x472dD472E7bB103b92E5e7836CA8451D0a68930d";

fn selector(name: &str) -> String {
    let artifact = ContractArtifact::embedded().unwrap();
    hex::encode(artifact.abi.function(name).unwrap().short_signature())
}

fn result(tokens: &[Token]) -> serde_json::Value {
    json!({ "jsonrpc": "2.0", "id": 1, "result": format!("0x{}", hex::encode(ethabi::encode(tokens))) })
}

fn student_address(last_byte: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xaa;
    bytes[19] = last_byte;
    Address::from_slice(&bytes)
}

fn contract(server: &MockServer) -> AttendanceContract {
    AttendanceContract::from_artifact(
        RpcClient::new(server.url("/")),
        ContractArtifact::embedded().unwrap(),
        Some(parse_address(CONTRACT).unwrap()),
    )
    .unwrap()
}

#[tokio::test]
async fn roster_reads_classroom_then_each_student() {
    let server = MockServer::start_async().await;
    let alice = student_address(1);
    let bob = student_address(2);

    let classroom = server
        .mock_async(|when, then| {
            when.method(POST).path("/").body_contains(selector("getClassroom"));
            then.status(200).json_body(result(&[
                Token::String("CS101".into()),
                Token::Array(vec![Token::Address(alice), Token::Address(bob)]),
            ]));
        })
        .await;
    let alice_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_contains(selector("getStudent"))
                .body_contains(hex::encode(alice.as_bytes()));
            then.status(200).json_body(result(&[
                Token::String("Alice".into()),
                Token::String("21BCE0001".into()),
                Token::Uint(U256::from(1_700_000_000u64)),
                Token::Bool(true),
            ]));
        })
        .await;
    let bob_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_contains(selector("getStudent"))
                .body_contains(hex::encode(bob.as_bytes()));
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "execution reverted" }
            }));
        })
        .await;

    let (room, entries) = contract(&server).roster(0).await.unwrap();

    assert_eq!(room.name, "CS101");
    assert_eq!(room.students, vec![alice, bob]);
    assert_eq!(entries.len(), 2);

    let (address, first) = &entries[0];
    assert_eq!(*address, alice);
    let first = first.as_ref().unwrap();
    assert_eq!(first.name, "Alice");
    assert_eq!(first.reg_no, "21BCE0001");
    assert_eq!(first.last_attendance, 1_700_000_000);
    assert!(first.is_verified);

    assert!(matches!(
        &entries[1].1,
        Err(ChainError::Rpc { code: -32000, message }) if message == "execution reverted"
    ));

    classroom.assert_async().await;
    alice_mock.assert_async().await;
    bob_mock.assert_async().await;
}

#[tokio::test]
async fn classroom_read_failure_fails_roster() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "invalid opcode" }
            }));
        })
        .await;

    let err = contract(&server).roster(7).await.unwrap_err();
    assert!(matches!(err, ChainError::Rpc { .. }));
}

#[tokio::test]
async fn classroom_count_and_marked_attendance() {
    let server = MockServer::start_async().await;
    let alice = student_address(1);

    server
        .mock_async(|when, then| {
            when.method(POST).path("/").body_contains(selector("classroomCount"));
            then.status(200).json_body(result(&[Token::Uint(U256::from(3u8))]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_contains(selector("getMarkedAttendanceStudents"));
            then.status(200).json_body(result(&[
                Token::Array(vec![Token::Address(alice)]),
                Token::Array(vec![Token::String("21BCE0001".into())]),
            ]));
        })
        .await;

    let contract = contract(&server);
    assert_eq!(contract.classroom_count().await.unwrap(), 3);

    let marked = contract.marked_attendance(1).await.unwrap();
    assert_eq!(marked.addresses, vec![alice]);
    assert_eq!(marked.reg_nos, vec!["21BCE0001".to_string()]);
}

#[tokio::test]
async fn unknown_reg_no_resolves_to_none() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_contains(selector("getStudentAddressByRegNo"));
            then.status(200).json_body(result(&[Token::Address(Address::zero())]));
        })
        .await;

    let found = contract(&server).student_address_by_reg_no("nobody").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn empty_result_is_an_abi_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x" }));
        })
        .await;

    let err = contract(&server).get_classroom(0).await.unwrap_err();
    assert!(matches!(err, ChainError::Abi(_)));
}

#[test]
fn missing_address_is_reported() {
    let err = AttendanceContract::from_artifact(
        RpcClient::new("http://127.0.0.1:7545"),
        ContractArtifact::embedded().unwrap(),
        None,
    )
    .err()
    .unwrap();
    assert!(matches!(err, ChainError::Artifact(_)));
}
