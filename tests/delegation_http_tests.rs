//! Delegation over the wire
//!
//! Runs the adapter's HTTP server on an ephemeral port and drives it with
//! the core's HTTP client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use db_backup_operator::cluster::{MemoryCluster, UnitKind, UnitStore};
use db_backup_operator::config::OperatorConfig;
use db_backup_operator::controllers::Context;
use db_backup_operator::crd::{Intent, LifecyclePhase, UnitHandle};
use db_backup_operator::delegation::{
    server, BackupRequest, EngineAdapter, HttpAdapter, HttpDialer, UnitStatus, UpdateRequest,
};
use db_backup_operator::reconcilers::backup as backup_reconciler;
use db_backup_operator::registry::AdapterRegistry;
use db_backup_operator::Error;
use tokio::net::TcpListener;

use common::{backup, postgres_scheduler, SYSTEM_NAMESPACE};

/// Start a postgres adapter backed by `cluster`, returning its address
async fn start_adapter(cluster: &Arc<MemoryCluster>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let scheduler = Arc::new(postgres_scheduler(cluster));
    tokio::spawn(server::serve_listener(listener, scheduler));
    addr.to_string()
}

fn client(addr: &str) -> HttpAdapter {
    HttpAdapter::new(reqwest::Client::new(), format!("http://{}", addr))
}

fn request() -> BackupRequest {
    let mut intent = backup("pg-db1", "postgres", "0 0 * * *");
    intent.metadata.uid = Some("uid-1".to_string());
    BackupRequest::for_intent(&intent, "core.oiler-backup-system.svc:8080")
}

#[tokio::test]
async fn backup_round_trip_is_idempotent() {
    let cluster = Arc::new(MemoryCluster::new());
    let addr = start_adapter(&cluster).await;
    let adapter = client(&addr);

    let first = adapter.backup(&request()).await.unwrap();
    assert_eq!(first.status, UnitStatus::Created);
    assert_eq!(first.handle(), UnitHandle::new("backup-pg-db1", SYSTEM_NAMESPACE));

    let second = adapter.backup(&request()).await.unwrap();
    assert_eq!(second.status, UnitStatus::Exists);
    assert_eq!(second.handle(), first.handle());
    assert_eq!(cluster.cron_jobs().await.len(), 2);
}

#[tokio::test]
async fn update_round_trip_rewrites_schedule() {
    let cluster = Arc::new(MemoryCluster::new());
    let addr = start_adapter(&cluster).await;
    let adapter = client(&addr);

    let created = adapter.backup(&request()).await.unwrap();
    let mut changed = request();
    changed.schedule = "0 6 * * *".to_string();
    let ack = adapter
        .update(&UpdateRequest::new(changed, &created.handle()))
        .await
        .unwrap();
    assert!(ack.ack);

    let unit = cluster
        .get(UnitKind::Scheduled, &created.handle())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.schedule(), Some("0 6 * * *"));
}

#[tokio::test]
async fn update_of_missing_unit_is_an_error() {
    let cluster = Arc::new(MemoryCluster::new());
    let addr = start_adapter(&cluster).await;
    let adapter = client(&addr);

    let handle = UnitHandle::new("backup-pg-db1", SYSTEM_NAMESPACE);
    let result = adapter.update(&UpdateRequest::new(request(), &handle)).await;
    assert!(matches!(result, Err(Error::Delegation(_))));
}

#[tokio::test]
async fn reconcile_through_http_dialer() {
    let cluster = Arc::new(MemoryCluster::new());
    let addr = start_adapter(&cluster).await;
    cluster
        .set_registry(AdapterRegistry::new([("postgres", addr.as_str())]))
        .await;

    let dialer = HttpDialer::new(Duration::from_secs(5), false).unwrap();
    let ctx = Context::in_memory(cluster.clone(), Arc::new(dialer), OperatorConfig::default());
    cluster.insert_backup(backup("pg-db1", "postgres", "0 0 * * *")).await;

    backup_reconciler::reconcile("pg-db1", &ctx).await.unwrap();

    let stored = cluster.backup("pg-db1").await.unwrap();
    assert_eq!(stored.phase(), Some(LifecyclePhase::Success));
    assert_eq!(
        stored.intent_status().unwrap().execution_unit,
        Some(UnitHandle::new("backup-pg-db1", SYSTEM_NAMESPACE))
    );
}

#[tokio::test]
async fn unreachable_adapter_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(&addr.to_string()).backup(&request()).await;
    let err = result.unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {}", err);
}
