//! tests/address_classifier_tests.rs
//!
//! Concurrency and timeout behaviour of `AddressClassifier`.

mod common;

use common::*;
use futures::future::join_all;
use ice_phishing_detector::ice_phishing::{AddressClassifier, Classification, DetectorError, Role};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

fn classifier(
    chain: &Arc<MockChain>,
    verifier: &Arc<MockVerifier>,
    timeout: Duration,
) -> AddressClassifier {
    AddressClassifier::new(
        chain.clone(),
        verifier.clone(),
        NonZeroUsize::new(16).unwrap(),
        100,
        timeout,
    )
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_code_check() {
    let (chain, verifier) = (MockChain::new(), MockVerifier::new());
    chain.set_delay(Duration::from_millis(20));
    let classifier = classifier(&chain, &verifier, Duration::from_secs(1));
    let spender = addr(0x5e);

    let lookups = (0..4).map(|_| classifier.classify(spender, Role::Spender, 1_000));
    let results = join_all(lookups).await;

    for result in results {
        assert_eq!(result.unwrap(), Classification::EoaLowNonce);
    }
    assert_eq!(chain.code_calls(spender), 1);
    assert_eq!(classifier.stats().misses, 1);
    assert_eq!(classifier.stats().hits, 3);
}

#[tokio::test]
async fn test_concurrent_contract_lookups_share_one_verification() {
    let (chain, verifier) = (MockChain::new(), MockVerifier::new());
    let router = addr(0xc0);
    chain.add_contract(router);
    verifier.verify(router);
    chain.set_delay(Duration::from_millis(20));
    let classifier = classifier(&chain, &verifier, Duration::from_secs(1));

    let results = join_all((0..3).map(|_| classifier.classify(router, Role::Spender, 1_000))).await;

    assert!(results.iter().all(|r| matches!(r, Ok(Classification::VerifiedContract))));
    assert_eq!(verifier.calls(), 1);
}

#[tokio::test]
async fn test_code_check_timeout_is_an_error_and_not_cached() {
    let (chain, verifier) = (MockChain::new(), MockVerifier::new());
    chain.set_delay(Duration::from_millis(200));
    let classifier = classifier(&chain, &verifier, Duration::from_millis(20));
    let spender = addr(0x5e);

    let result = classifier.classify(spender, Role::Spender, 1_000).await;

    assert!(matches!(result, Err(DetectorError::Timeout { operation: "has_code", .. })));
    assert!(classifier.cached(&spender).await.is_none());
    assert!(classifier.is_empty());
}

#[tokio::test]
async fn test_code_check_failure_propagates() {
    let (chain, verifier) = (MockChain::new(), MockVerifier::new());
    let flaky = addr(0x0f);
    chain.fail_code_check(flaky);
    let classifier = classifier(&chain, &verifier, Duration::from_secs(1));

    let err = classifier.classify(flaky, Role::Owner, 1_000).await.unwrap_err();
    assert!(err.is_recoverable());
    assert!(classifier.cached(&flaky).await.is_none());
}

#[tokio::test]
async fn test_owner_cache_hit_never_rechecks() {
    let (chain, verifier) = (MockChain::new(), MockVerifier::new());
    let classifier = classifier(&chain, &verifier, Duration::from_secs(1));
    let owner = addr(0x01);

    for block in 1_000..1_003 {
        let classification = classifier.classify(owner, Role::Owner, block).await.unwrap();
        assert_eq!(classification, Classification::EoaLowNonce);
    }

    assert_eq!(chain.code_calls(owner), 1);
    assert_eq!(chain.nonce_calls(), 0);
}

#[tokio::test]
async fn test_owner_entry_rechecked_when_seen_as_spender() {
    let (chain, verifier) = (MockChain::new(), MockVerifier::new());
    let classifier = classifier(&chain, &verifier, Duration::from_secs(1));
    let address = addr(0x02);
    chain.set_nonce(address, 5_000);

    let as_owner = classifier.classify(address, Role::Owner, 1_000).await.unwrap();
    assert_eq!(as_owner, Classification::EoaLowNonce);
    let as_spender = classifier.classify(address, Role::Spender, 1_001).await.unwrap();
    assert_eq!(as_spender, Classification::EoaHighNonce);

    let record = classifier.cached(&address).await.unwrap();
    assert_eq!(record.cached_nonce, Some(5_000));
    assert_eq!(record.last_evaluated, 1_001);
    assert_eq!(chain.code_calls(address), 1);
}
