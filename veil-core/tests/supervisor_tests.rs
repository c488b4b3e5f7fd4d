//! Integration tests for the connection supervisor
//!
//! Drives connect/disconnect/reconnect/list_servers against in-memory
//! collaborators and checks both the returned results and the published
//! status sequence.

mod common;

use common::{drain, server, MemoryStore, MockDirectory, MockFactory, ProviderBehavior};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use veil_core::error::{ApiError, VpnError};
use veil_core::platform::{LastServerRecord, SharedStore, LAST_SERVER_KEY};
use veil_core::types::{Configuration, ConnectionInfo, Protocol};
use veil_core::vpn::{ConnectionStatus, Status, Supervisor};

fn connecting(id: &str, protocol: Protocol) -> Status {
    Status::Connection(ConnectionStatus::Connecting {
        server: server(id),
        protocol,
    })
}

fn connected(id: &str, protocol: Protocol) -> Status {
    Status::Connection(ConnectionStatus::Connected {
        server: server(id),
        protocol,
    })
}

fn reconnecting(id: &str, protocol: Protocol) -> Status {
    Status::Connection(ConnectionStatus::Reconnecting {
        server: server(id),
        protocol,
    })
}

async fn start(directory: &Arc<MockDirectory>, factory: &Arc<MockFactory>) -> Supervisor {
    Supervisor::builder(directory.clone(), factory.clone())
        .start()
        .await
}

#[tokio::test]
async fn test_connect_success_publishes_connecting_then_connected() {
    // Given: a fresh supervisor and an early subscriber
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    let mut statuses = supervisor.status_stream();

    // When: connecting over IKEv2 with an empty configuration
    supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();

    // Then: the subscriber saw the full lifecycle in order
    assert_eq!(
        drain(&mut statuses),
        vec![
            Status::Idle,
            connecting("x", Protocol::Ikev2),
            connected("x", Protocol::Ikev2),
        ]
    );
    assert_eq!(supervisor.current_status(), connected("x", Protocol::Ikev2));
    assert!(supervisor.is_connected());
    assert_eq!(supervisor.current_server(), Some(server("x")));
    assert_eq!(supervisor.current_protocol(), Some(Protocol::Ikev2));
    assert_eq!(
        supervisor.connection_info(),
        Some(ConnectionInfo {
            server: server("x"),
            protocol: Protocol::Ikev2
        })
    );
    assert!(supervisor.connected_since().is_some());

    let created = factory.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].loads.load(Ordering::SeqCst), 1);
    assert_eq!(created[0].connect_count(), 1);
    assert_eq!(directory.configuration_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_provider_connect_failure_ends_failed_with_raw_message() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        connect_error: Some("auth error".to_string()),
        ..ProviderBehavior::default()
    }));
    let supervisor = start(&directory, &factory).await;

    let err = supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        VpnError::ConnectionFailed {
            reason: "auth error".to_string()
        }
    );
    assert_eq!(
        supervisor.current_status(),
        Status::Connection(ConnectionStatus::Failed {
            error: "auth error".to_string(),
            last_server: Some(server("x")),
        })
    );
    assert_eq!(supervisor.connection_info(), None);
    assert_eq!(supervisor.current_server(), None);
    assert_eq!(supervisor.current_protocol(), None);
    assert_eq!(supervisor.connected_since(), None);
    assert!(!supervisor.is_connected());
}

#[tokio::test]
async fn test_load_failure_skips_provider_connect() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        load_error: Some("tool missing".to_string()),
        ..ProviderBehavior::default()
    }));
    let supervisor = start(&directory, &factory).await;

    let err = supervisor
        .connect(server("x"), Protocol::WireGuard, Configuration::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VpnError::ConnectionFailed { .. }));
    assert_eq!(factory.created()[0].connect_count(), 0);
}

#[tokio::test]
async fn test_directory_failure_surfaces_api_error() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    directory.fail_configuration(ApiError::Status { code: 503 });
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;

    let err = supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap_err();

    assert_eq!(err, VpnError::Api(ApiError::Status { code: 503 }));
    assert!(factory.created().is_empty());
    match supervisor.current_status() {
        Status::Connection(ConnectionStatus::Failed { error, last_server }) => {
            assert!(error.contains("503"));
            assert_eq!(last_server, Some(server("x")));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_factory_rejection_is_recoverable() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::new());
    factory.reject_all();
    let supervisor = start(&directory, &factory).await;

    let err = supervisor
        .connect(server("x"), Protocol::OpenVpn, Configuration::default())
        .await
        .unwrap_err();
    assert_eq!(err, VpnError::ConfigurationNotFound);

    // The supervisor keeps serving requests afterwards
    assert_eq!(supervisor.list_servers().await.unwrap(), vec![server("x")]);
}

#[tokio::test]
async fn test_disconnect_cleans_up_even_when_provider_fails() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        disconnect_error: Some("device busy".to_string()),
        ..ProviderBehavior::default()
    }));
    let supervisor = start(&directory, &factory).await;
    supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();
    let mut statuses = supervisor.status_stream();

    let err = supervisor.disconnect().await.unwrap_err();

    assert_eq!(
        err,
        VpnError::DisconnectionFailed {
            reason: "device busy".to_string()
        }
    );
    assert_eq!(
        drain(&mut statuses),
        vec![
            connected("x", Protocol::Ikev2),
            Status::Connection(ConnectionStatus::Disconnecting),
            Status::Connection(ConnectionStatus::Disconnected),
        ]
    );
    assert_eq!(supervisor.connection_info(), None);
    assert_eq!(supervisor.connected_since(), None);
    assert_eq!(factory.created()[0].disconnect_count(), 1);

    // The provider is gone: a second disconnect has nothing to act on
    assert_eq!(
        supervisor.disconnect().await,
        Err(VpnError::ConfigurationNotFound)
    );
}

#[tokio::test]
async fn test_disconnect_success() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    supervisor
        .connect(server("x"), Protocol::WireGuard, Configuration::default())
        .await
        .unwrap();

    supervisor.disconnect().await.unwrap();

    assert_eq!(
        supervisor.current_status(),
        Status::Connection(ConnectionStatus::Disconnected)
    );
    assert_eq!(supervisor.connection_info(), None);
    assert_eq!(factory.created()[0].disconnect_count(), 1);
}

#[tokio::test]
async fn test_disconnect_without_provider_changes_nothing() {
    let directory = Arc::new(MockDirectory::new(vec![]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    let mut statuses = supervisor.status_stream();

    let err = supervisor.disconnect().await.unwrap_err();

    assert_eq!(err, VpnError::ConfigurationNotFound);
    assert_eq!(drain(&mut statuses), vec![Status::Idle]);
    assert_eq!(supervisor.current_status(), Status::Idle);
}

#[tokio::test]
async fn test_reconnect_replaces_provider_exactly_once() {
    // Given: an established tunnel to x
    let directory = Arc::new(MockDirectory::new(vec![server("x"), server("y")]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();
    let mut statuses = supervisor.status_stream();

    // When: reconnecting to y
    supervisor
        .reconnect(server("y"), Protocol::WireGuard, Configuration::default())
        .await
        .unwrap();

    // Then: the old provider was torn down once and the new one is attached
    let created = factory.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].disconnect_count(), 1);
    assert_eq!(created[1].disconnect_count(), 0);
    assert_eq!(created[1].connect_count(), 1);
    assert_eq!(
        drain(&mut statuses),
        vec![
            connected("x", Protocol::Ikev2),
            reconnecting("y", Protocol::WireGuard),
            connected("y", Protocol::WireGuard),
        ]
    );
    assert_eq!(
        supervisor.connection_info().map(|info| info.server.id),
        Some("y".to_string())
    );
}

#[tokio::test]
async fn test_reconnect_ignores_teardown_failure() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        disconnect_error: Some("stale pid".to_string()),
        ..ProviderBehavior::default()
    }));
    let supervisor = start(&directory, &factory).await;
    supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();

    factory.set_behavior(ProviderBehavior::default());
    supervisor
        .reconnect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();

    assert_eq!(supervisor.current_status(), connected("x", Protocol::Ikev2));
    assert_eq!(factory.created()[0].disconnect_count(), 1);
}

#[tokio::test]
async fn test_reconnect_after_failure() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        connect_error: Some("timeout".to_string()),
        ..ProviderBehavior::default()
    }));
    let supervisor = start(&directory, &factory).await;
    assert!(supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .is_err());

    factory.set_behavior(ProviderBehavior::default());
    supervisor
        .reconnect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();

    assert_eq!(supervisor.current_status(), connected("x", Protocol::Ikev2));
    // The failed provider was detached, not torn down
    assert_eq!(factory.created()[0].disconnect_count(), 0);
}

#[tokio::test]
async fn test_connect_while_connected_retires_previous_provider() {
    let directory = Arc::new(MockDirectory::new(vec![server("x"), server("y")]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();

    supervisor
        .connect(server("y"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();

    let created = factory.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].disconnect_count(), 1);
    assert_eq!(supervisor.current_status(), connected("y", Protocol::Ikev2));
}

#[tokio::test]
async fn test_list_servers_shows_loading_then_restores() {
    let directory = Arc::new(MockDirectory::new(vec![server("x"), server("y")]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    let mut statuses = supervisor.status_stream();

    let servers = supervisor.list_servers().await.unwrap();

    assert_eq!(servers, vec![server("x"), server("y")]);
    assert_eq!(
        drain(&mut statuses),
        vec![Status::Idle, Status::LoadingServers, Status::Idle]
    );
}

#[tokio::test]
async fn test_list_servers_failure_restores_idle() {
    let directory = Arc::new(MockDirectory::new(vec![]));
    directory.fail_servers(ApiError::Transport {
        message: "connection refused".to_string(),
    });
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    let mut statuses = supervisor.status_stream();

    let err = supervisor.list_servers().await.unwrap_err();

    assert!(matches!(err, VpnError::Api(ApiError::Transport { .. })));
    assert_eq!(
        drain(&mut statuses),
        vec![Status::Idle, Status::LoadingServers, Status::Idle]
    );
}

#[tokio::test]
async fn test_list_servers_while_connected_keeps_connection_status() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await
        .unwrap();
    let mut statuses = supervisor.status_stream();

    supervisor.list_servers().await.unwrap();

    assert_eq!(drain(&mut statuses), vec![connected("x", Protocol::Ikev2)]);
    assert!(supervisor.is_connected());
}

#[tokio::test]
async fn test_list_servers_after_failure_returns_to_failed() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        connect_error: Some("auth error".to_string()),
        ..ProviderBehavior::default()
    }));
    let supervisor = start(&directory, &factory).await;
    let _ = supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await;
    let failed = supervisor.current_status();

    supervisor.list_servers().await.unwrap();

    assert_eq!(supervisor.current_status(), failed);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_operations_are_serialized() {
    // Given: a slow directory and an early subscriber
    let directory =
        Arc::new(MockDirectory::new(vec![server("x"), server("y")]).with_delay(Duration::from_millis(50)));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    let mut early = supervisor.status_stream();

    // When: several operations are issued at once from different handles
    let (a, b) = (supervisor.clone(), supervisor.clone());
    let (first, second, listed) = tokio::join!(
        a.connect(server("x"), Protocol::Ikev2, Configuration::default()),
        b.connect(server("y"), Protocol::WireGuard, Configuration::default()),
        supervisor.list_servers(),
    );
    first.unwrap();
    second.unwrap();
    listed.unwrap();

    // Then: every Connecting is immediately followed by its own Connected
    let seen = drain(&mut early);
    assert_eq!(seen[0], Status::Idle);
    for pair in seen[1..].chunks(2) {
        match pair {
            [Status::Connection(ConnectionStatus::Connecting { server: s1, protocol: p1 }),
             Status::Connection(ConnectionStatus::Connected { server: s2, protocol: p2 })] => {
                assert_eq!(s1, s2);
                assert_eq!(p1, p2);
            }
            // list_servers ran with nothing attached
            [Status::LoadingServers, Status::Idle] => {}
            other => panic!("unexpected interleaving: {:?}", other),
        }
    }

    // And: a late subscriber starts from the final status
    let mut late = supervisor.status_stream();
    assert_eq!(late.try_recv(), Some(supervisor.current_status()));
    assert_eq!(seen.last(), Some(&supervisor.current_status()));

    // Exactly one provider remains attached
    let created = factory.created();
    assert_eq!(created.len(), 2);
    assert_eq!(
        created.iter().filter(|p| p.disconnect_count() == 0).count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_does_not_abort_operation() {
    let directory =
        Arc::new(MockDirectory::new(vec![server("x")]).with_delay(Duration::from_millis(100)));
    let factory = Arc::new(MockFactory::new());
    let supervisor = start(&directory, &factory).await;
    let mut statuses = supervisor.status_stream();

    // When: the caller gives up before the directory answers
    let gave_up = tokio::time::timeout(
        Duration::from_millis(10),
        supervisor.connect(server("x"), Protocol::Ikev2, Configuration::default()),
    )
    .await;
    assert!(gave_up.is_err());

    // Then: the queued disconnect runs after the connect completed
    supervisor.disconnect().await.unwrap();
    assert_eq!(
        drain(&mut statuses),
        vec![
            Status::Idle,
            connecting("x", Protocol::Ikev2),
            connected("x", Protocol::Ikev2),
            Status::Connection(ConnectionStatus::Disconnecting),
            Status::Connection(ConnectionStatus::Disconnected),
        ]
    );
}

#[tokio::test]
async fn test_successful_connect_persists_last_server() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::new());
    let store = Arc::new(MemoryStore::new());
    let supervisor = Supervisor::builder(directory.clone(), factory.clone())
        .shared_store(store.clone())
        .start()
        .await;

    supervisor
        .connect(server("x"), Protocol::OpenVpn, Configuration::default())
        .await
        .unwrap();

    let record = LastServerRecord::decode(&store.get(LAST_SERVER_KEY).unwrap()).unwrap();
    assert_eq!(record.server_id, "x");
    assert_eq!(record.protocol, "OPENVPN");
}

#[tokio::test]
async fn test_failed_connect_does_not_persist_last_server() {
    let directory = Arc::new(MockDirectory::new(vec![server("x")]));
    let factory = Arc::new(MockFactory::with_behavior(ProviderBehavior {
        connect_error: Some("auth error".to_string()),
        ..ProviderBehavior::default()
    }));
    let store = Arc::new(MemoryStore::new());
    let supervisor = Supervisor::builder(directory.clone(), factory.clone())
        .shared_store(store.clone())
        .start()
        .await;

    let _ = supervisor
        .connect(server("x"), Protocol::Ikev2, Configuration::default())
        .await;

    assert!(store.get(LAST_SERVER_KEY).is_none());
}
