//! tests/etherscan_client_tests.rs
//!
//! Tests for `src/blockchain/etherscan.rs` against a mocked explorer API:
//! - verified / unverified source
//! - rate-limit and error payloads
//! - HTTP failures

use ethers::types::Address;
use httpmock::{Method, MockServer};
use ice_phishing_detector::blockchain::{EtherscanClient, Verification, VerificationSource};
use serde_json::json;

fn contract() -> Address {
    Address::repeat_byte(0xc0)
}

fn client_for(server: &MockServer) -> EtherscanClient {
    EtherscanClient::with_base_url("test_key".to_string(), &server.base_url())
}

#[tokio::test(flavor = "current_thread")]
async fn test_verified_contract() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET)
            .path("/api")
            .query_param("module", "contract")
            .query_param("action", "getsourcecode")
            .query_param("address", format!("{:?}", contract()))
            .query_param("apikey", "test_key");
        then.status(200).json_body(json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "SourceCode": "pragma solidity ^0.8.20; contract Router {}",
                "ContractName": "Router"
            }]
        }));
    });

    let client = client_for(&server);
    assert_eq!(client.is_contract_verified(contract()).await, Verification::Verified);
    mock.assert();
}

#[tokio::test(flavor = "current_thread")]
async fn test_unverified_contract() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET).path("/api");
        then.status(200).json_body(json!({
            "status": "1",
            "message": "OK",
            "result": [{ "SourceCode": "", "ContractName": "" }]
        }));
    });

    let client = client_for(&server);
    assert_eq!(client.is_contract_verified(contract()).await, Verification::Unverified);
    mock.assert();
}

#[tokio::test(flavor = "current_thread")]
async fn test_rate_limited_is_unknown() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::GET).path("/api");
        then.status(200).json_body(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached"
        }));
    });

    let client = client_for(&server);
    assert!(client.get_verification(contract()).await.is_err());
    assert_eq!(client.is_contract_verified(contract()).await, Verification::Unknown);
}

#[tokio::test(flavor = "current_thread")]
async fn test_server_error_is_unknown() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET).path("/api");
        then.status(500).body("internal error");
    });

    let client = client_for(&server);
    assert_eq!(client.is_contract_verified(contract()).await, Verification::Unknown);
    mock.assert();
}

#[tokio::test(flavor = "current_thread")]
async fn test_garbage_body_is_unknown() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::GET).path("/api");
        then.status(200).body("<html>maintenance</html>");
    });

    let client = client_for(&server);
    assert_eq!(client.is_contract_verified(contract()).await, Verification::Unknown);
}

#[test]
fn test_trailing_slash_trimmed() {
    let client = EtherscanClient::with_base_url("k".to_string(), "http://localhost:9000/");
    assert_eq!(client.base_url(), "http://localhost:9000");
}
