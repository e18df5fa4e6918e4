//! End-to-end tests of the data source broker: read, open, pool, audit.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use common::{api_key_credentials, basic_credentials, RecordingFactory, TestBroker};
use datasource_broker::audit::DATA_SOURCE_CLIENT_CALL;
use datasource_broker::domain::{AuthScheme, DataSourceId};
use datasource_broker::errors::{BrokerError, StorageError};
use datasource_broker::pool::PoolError;

#[tokio::test]
async fn concurrent_requests_share_one_client_and_each_is_audited() {
    let broker = Arc::new(TestBroker::seeded().await);

    let (first, second) = tokio::join!(broker.get("ds-1", "10.1.1.1"), broker.get("ds-1", "10.2.2.2"));
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(broker.factory.builds(), 1);
    assert_eq!(first.auth_scheme(), AuthScheme::UsernamePassword);

    let mut messages: Vec<String> = broker.sink.records().into_iter().map(|r| r.message).collect();
    messages.sort();
    assert_eq!(messages, vec!["10.1.1.1 accessing ds-1", "10.2.2.2 accessing ds-1"]);
    assert!(broker.sink.records().iter().all(|r| r.event_type == DATA_SOURCE_CLIENT_CALL));
}

#[tokio::test]
async fn unknown_data_source_is_not_found_and_not_audited() {
    let broker = TestBroker::seeded().await;

    let err = broker.get("ds-missing", "10.1.1.1").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.data_source_id, "ds-missing");
    assert!(err.to_string().contains("ds-missing"));
    assert!(broker.sink.is_empty());
    assert_eq!(broker.factory.builds(), 0);
}

#[tokio::test]
async fn dangling_credential_reference_is_not_found() {
    let broker = TestBroker::new();
    broker.put_data_source("ds-orphan", "http://orphan.example:9200", "cred-gone").await;

    let err = broker.get("ds-orphan", "ops").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(
        err.source,
        BrokerError::Storage(StorageError::NotFound { ref id, .. }) if id == "cred-gone"
    ));
    assert!(broker.sink.is_empty());
}

#[tokio::test]
async fn many_concurrent_callers_trigger_a_single_construction() {
    let gate = Arc::new(Notify::new());
    let broker = Arc::new(TestBroker::with_factory(RecordingFactory::gated(gate.clone())));
    broker.seed_default().await;

    let callers = 24;
    let mut jobs = JoinSet::new();
    for i in 0..callers {
        let broker = broker.clone();
        jobs.spawn(async move { broker.get("ds-1", &format!("caller-{}", i)).await });
    }

    // Hold the build until every caller had a chance to join it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.factory.builds(), 1);
    gate.notify_one();

    let mut clients = Vec::new();
    while let Some(result) = jobs.join_next().await {
        clients.push(result.expect("task panicked").expect("client should be handed out"));
    }

    assert_eq!(clients.len(), callers);
    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    assert_eq!(broker.factory.builds(), 1);
    assert_eq!(broker.sink.len(), callers);
}

#[tokio::test]
async fn data_sources_never_share_clients() {
    let broker = TestBroker::seeded().await;
    broker.put_credential("cred-2", api_key_credentials("key-abc")).await;
    broker.put_data_source("ds-2", "http://cluster-two.example:9200", "cred-2").await;
    // Same endpoint and credential as ds-1, still a separate client.
    broker.put_data_source("ds-3", "http://cluster-one.example:9200", "cred-1").await;

    let one = broker.get("ds-1", "ops").await.unwrap();
    let two = broker.get("ds-2", "ops").await.unwrap();
    let three = broker.get("ds-3", "ops").await.unwrap();

    assert!(!Arc::ptr_eq(&one, &two));
    assert!(!Arc::ptr_eq(&one, &three));
    assert_eq!(one.data_source_id(), &DataSourceId::from("ds-1"));
    assert_eq!(three.data_source_id(), &DataSourceId::from("ds-3"));
    assert_eq!(two.auth_scheme(), AuthScheme::ApiKey);
    assert_eq!(broker.factory.builds(), 3);
    assert_eq!(broker.service.pool().len(), 3);
}

#[tokio::test]
async fn rotated_credential_builds_a_new_client_and_reclaims_the_old_one() {
    let broker = TestBroker::seeded().await;

    let before = broker.get("ds-1", "ops").await.unwrap();
    broker.rotate_credential("cred-1", basic_credentials("admin", "rotated-pass")).await;
    let after = broker.get("ds-1", "ops").await.unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(broker.factory.builds(), 2);
    // Reclaimed from the pool; a caller still holding it is not cut off.
    assert!(!before.is_closed());
    assert!(!after.is_closed());
    assert_eq!(broker.service.pool().len(), 1);

    let again = broker.get("ds-1", "ops").await.unwrap();
    assert!(Arc::ptr_eq(&after, &again));
    assert_eq!(broker.factory.builds(), 2);
}

#[tokio::test]
async fn failed_construction_is_reported_and_retried_on_next_request() {
    let broker = TestBroker::seeded().await;
    broker.factory.set_failing(true);

    let err = broker.get("ds-1", "ops").await.unwrap_err();
    assert!(matches!(err.source, BrokerError::Pool(PoolError::Construction { .. })));
    assert!(err.is_retryable());
    assert!(broker.sink.is_empty());
    assert!(broker.service.pool().is_empty());

    broker.factory.set_failing(false);
    let client = broker.get("ds-1", "ops").await.unwrap();

    assert!(!client.is_closed());
    assert_eq!(broker.factory.builds(), 2);
    assert_eq!(broker.sink.len(), 1);
}

#[tokio::test]
async fn invalidate_drops_pooled_clients() {
    let broker = TestBroker::seeded().await;

    let client = broker.get("ds-1", "ops").await.unwrap();
    assert_eq!(broker.service.invalidate(&DataSourceId::from("ds-1")), 1);
    assert!(!client.is_closed());
    assert!(broker.service.pool().is_empty());

    let fresh = broker.get("ds-1", "ops").await.unwrap();
    assert!(!Arc::ptr_eq(&client, &fresh));
    assert_eq!(broker.factory.builds(), 2);
}

#[tokio::test]
async fn stop_closes_clients_and_is_idempotent() {
    let broker = TestBroker::seeded().await;
    let client = broker.get("ds-1", "ops").await.unwrap();

    broker.service.stop().await;
    broker.service.stop().await;

    assert!(client.is_closed());
    assert!(broker.service.pool().is_closed());
    assert!(broker.service.pool().is_empty());

    let err = broker.get("ds-1", "ops").await.unwrap_err();
    assert!(matches!(err.source, BrokerError::Pool(PoolError::Closed)));
}

#[tokio::test]
async fn stop_waits_for_in_flight_construction() {
    let broker = Arc::new(TestBroker::with_factory(RecordingFactory::slow(Duration::from_millis(50))));
    broker.seed_default().await;

    let pending = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.get("ds-1", "ops").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    broker.service.stop().await;

    // The waiter still gets its client; shutdown closed it once it was ready.
    let client = pending.await.unwrap().unwrap();
    assert!(client.is_closed());
    assert!(broker.service.pool().is_empty());
}
