mod common;

use bridge_reconcile::{Bootstrapper, PollingService, TenantBootstrap};
use common::{World, tenant};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn bootstrapper(world: &World) -> Bootstrapper {
    Bootstrapper::new(
        world.directory.clone(),
        world.pools.clone(),
        world.factory.clone(),
        world.registry.clone(),
        Duration::from_secs(60),
    )
}

fn polling(world: &World) -> Arc<PollingService> {
    Arc::new(PollingService::new(
        world.directory.clone(),
        world.pools.clone(),
        world.registry.clone(),
        Duration::from_secs(60),
    ))
}

#[tokio::test]
async fn tenant_without_devices_is_disconnected_and_not_registered() {
    let world = World::new();
    let store = world.add_tenant("empty");
    store.add_device("100", Some("A"));
    store.soft_delete_device("100");

    let outcome = bootstrapper(&world)
        .bootstrap_tenant(&tenant("empty"))
        .await
        .expect("bootstrap");

    assert_eq!(outcome, TenantBootstrap::NoDevices);
    assert!(world.factory.broker("empty").is_disconnected());
    assert!(world.registry.get("empty").is_none());
}

#[tokio::test]
async fn tenant_with_devices_subscribes_and_announces() {
    let world = World::new();
    let store = world.add_tenant("acme");
    store.add_device("100", Some("A"));
    store.add_sensor("5", Some("A"));
    store.add_sensor("6", Some("A"));
    store.add_sensor("7", Some("B"));

    let outcome = bootstrapper(&world)
        .bootstrap_tenant(&tenant("acme"))
        .await
        .expect("bootstrap");

    assert_eq!(
        outcome,
        TenantBootstrap::Registered {
            subscribed: 1,
            failed: 0
        }
    );
    let broker = world.factory.broker("acme");
    assert!(!broker.is_disconnected());
    assert_eq!(
        broker.calls(),
        vec![
            r#"publish acme/100/sensordetails {"sensors":[5,6]}"#,
            "subscribe acme/100/#",
        ]
    );
    let handle = world.registry.get("acme").expect("registered");
    assert!(handle.live_topics().contains("acme/100/#"));
    assert_eq!(handle.sensor_snapshot("100"), Some(vec![5, 6]));
}

#[tokio::test(start_paused = true)]
async fn sensor_sets_wait_for_broker_connection() {
    let world = World::new();
    let store = world.add_tenant("acme");
    store.add_device("100", Some("A"));
    store.add_sensor("5", Some("A"));
    store.add_sensor("6", Some("A"));
    world.factory.connect_after(Duration::from_secs(3));

    let started = tokio::time::Instant::now();
    bootstrapper(&world)
        .bootstrap_tenant(&tenant("acme"))
        .await
        .expect("bootstrap");

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(
        world.factory.broker("acme").calls(),
        vec![
            r#"publish acme/100/sensordetails {"sensors":[5,6]}"#,
            "subscribe acme/100/#",
        ]
    );
    let handle = world.registry.get("acme").expect("registered");
    assert_eq!(handle.sensor_snapshot("100"), Some(vec![5, 6]));
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_leaves_sensor_sets_to_polling() {
    let world = World::new();
    let store = world.add_tenant("acme");
    store.add_device("100", Some("A"));
    store.add_sensor("5", Some("A"));
    world.factory.start_offline();

    let started = tokio::time::Instant::now();
    let outcome = bootstrapper(&world)
        .bootstrap_tenant(&tenant("acme"))
        .await
        .expect("bootstrap");

    assert_eq!(started.elapsed(), Duration::from_secs(30));
    assert_eq!(
        outcome,
        TenantBootstrap::Registered {
            subscribed: 1,
            failed: 0
        }
    );
    let broker = world.factory.broker("acme");
    assert_eq!(broker.calls(), vec!["subscribe acme/100/#"]);
    let handle = world.registry.get("acme").expect("registered");
    assert_eq!(handle.sensor_snapshot("100"), None);

    broker.set_connected(true);
    polling(&world).run_once().await;
    assert!(
        broker
            .calls()
            .contains(&r#"publish acme/100/sensordetails {"sensors":[5]}"#.to_string())
    );
    assert_eq!(handle.sensor_snapshot("100"), Some(vec![5]));
}

#[tokio::test]
async fn broker_failure_leaves_tenant_unregistered() {
    let world = World::new();
    world.add_tenant("acme").add_device("100", Some("A"));
    world.factory.fail_tenant("acme");

    let result = bootstrapper(&world).bootstrap_tenant(&tenant("acme")).await;

    assert!(result.is_err());
    assert!(world.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn tenant_failures_are_isolated() {
    let world = World::new();
    world.add_tenant("acme").add_device("100", Some("A"));
    world.add_tenant("globex").add_device("200", Some("A"));
    world.add_tenant("initech").add_device("300", Some("A"));
    world.connector.fail_next("globex_db", 3);
    world.factory.fail_tenant("initech");

    let report = bootstrapper(&world)
        .bootstrap_tenants(vec![tenant("acme"), tenant("globex"), tenant("initech")])
        .await;

    assert_eq!(report.registered, vec!["acme"]);
    let mut failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["globex", "initech"]);
    assert_eq!(world.registry.names(), vec!["acme"]);
}

#[tokio::test(start_paused = true)]
async fn run_waits_for_directory_then_starts_polling() {
    let world = World::new();
    world.add_tenant("acme").add_device("100", Some("A"));
    world.directory.fail_next(2);
    let polling = polling(&world);
    let shutdown = CancellationToken::new();

    let started = tokio::time::Instant::now();
    let report = bootstrapper(&world)
        .run(&polling, &shutdown)
        .await
        .expect("bootstrapped");

    assert_eq!(started.elapsed(), Duration::from_secs(120));
    assert_eq!(report.registered, vec!["acme"]);
    assert!(polling.is_started());
    polling.stop();
}

#[tokio::test(start_paused = true)]
async fn run_gives_up_on_shutdown_before_directory_is_ready() {
    let world = World::new();
    world.directory.fail_next(usize::MAX);
    let polling = polling(&world);
    let shutdown = CancellationToken::new();

    let cancel = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        cancel.cancel();
    });

    let report = bootstrapper(&world).run(&polling, &shutdown).await;

    assert!(report.is_none());
    assert!(!polling.is_started());
    assert_eq!(world.directory.calls(), 2);
}
