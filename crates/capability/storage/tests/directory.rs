use bridge_storage::{
    DirectoryError, InMemoryConnector, PoolManager, PoolSettings, PooledTenantDirectory,
    TenantDirectory, compute_associations, list_active_devices, list_active_sensors,
    sensor_is_active,
};
use domain::{DatabaseTarget, Device, Sensor, Tenant};
use std::sync::Arc;

#[test]
fn associations_match_exact_type() {
    let devices = vec![Device::new("100", Some("A"))];
    let sensors = vec![
        Sensor::new(5, Some("A")),
        Sensor::new(6, Some("A")),
        Sensor::new(7, Some("B")),
    ];

    let associations = compute_associations(&devices, &sensors);

    assert_eq!(associations.len(), 1);
    assert_eq!(associations["100"], vec![5, 6]);
}

#[test]
fn untyped_device_is_excluded_from_associations() {
    let devices = vec![Device::new("100", Some("A")), Device::new("200", None)];
    let sensors = vec![Sensor::new(5, Some("A")), Sensor::new(9, None)];

    let associations = compute_associations(&devices, &sensors);

    assert!(associations.contains_key("100"));
    assert!(!associations.contains_key("200"));
}

#[test]
fn typed_device_without_sensors_maps_to_empty_list() {
    let devices = vec![Device::new("300", Some("C"))];
    let sensors = vec![Sensor::new(5, Some("A"))];

    let associations = compute_associations(&devices, &sensors);

    assert_eq!(associations["300"], Vec::<i64>::new());
}

#[tokio::test]
async fn listings_skip_soft_deleted_rows() {
    let connector = InMemoryConnector::new();
    let store = connector.register("acme_db");
    store.add_device("100", Some("A"));
    store.add_device("200", None);
    store.add_device("300", Some("A"));
    store.soft_delete_device("300");
    store.add_sensor("5", Some("A"));
    store.add_sensor("6", Some("A"));
    store.add_sensor("not-a-number", Some("A"));
    store.soft_delete_sensor("6");

    let database = bridge_storage::DatabaseConnector::connect(
        &connector,
        &DatabaseTarget::new("db.local", "acme_db", "acme", "secret"),
    )
    .await
    .expect("connect");

    let devices = list_active_devices(database.as_ref()).await.expect("devices");
    assert_eq!(
        devices,
        vec![Device::new("100", Some("A")), Device::new("200", None)]
    );
    let sensors = list_active_sensors(database.as_ref()).await.expect("sensors");
    assert_eq!(sensors, vec![Sensor::new(5, Some("A"))]);

    assert!(sensor_is_active(database.as_ref(), "5").await.expect("lookup"));
    assert!(!sensor_is_active(database.as_ref(), "6").await.expect("lookup"));
}

#[tokio::test]
async fn device_listing_failure_maps_to_directory_error() {
    let connector = InMemoryConnector::new();
    let store = connector.register("acme_db");
    store.set_failing(true);
    let database = bridge_storage::DatabaseConnector::connect(
        &connector,
        &DatabaseTarget::new("db.local", "acme_db", "acme", "secret"),
    )
    .await
    .expect("connect");

    let err = list_active_devices(database.as_ref()).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Devices(_)));
}

#[tokio::test]
async fn pooled_directory_reads_tenants_from_main() {
    let connector = Arc::new(InMemoryConnector::new());
    let main = connector.register("main_db");
    let tenant = Tenant::new(
        "acme",
        DatabaseTarget::new("db.local", "acme_db", "acme", "secret"),
        "acme",
    );
    main.set_tenants(vec![tenant.clone()]);
    let pools = Arc::new(PoolManager::new(
        connector.clone(),
        DatabaseTarget::new("db.local", "main_db", "bridge", "secret"),
        PoolSettings::default(),
    ));
    let directory = PooledTenantDirectory::new(pools);

    let tenants = directory.list_tenants().await.expect("tenants");
    assert_eq!(tenants, vec![tenant]);

    main.set_failing(true);
    let err = directory.list_tenants().await.unwrap_err();
    assert!(matches!(err, DirectoryError::Tenants(_)));
}
