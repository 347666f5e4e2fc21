use domain::{DatabaseTarget, Tenant};

fn tenant(prefix: &str) -> Tenant {
    Tenant::new(
        "acme",
        DatabaseTarget::new("db.local:5433", "acme_db", "acme", "secret"),
        prefix,
    )
}

#[test]
fn device_topics_use_tenant_prefix() {
    let tenant = tenant("acme");
    assert_eq!(tenant.device_topic("100"), "acme/100/#");
    assert_eq!(tenant.sensor_details_topic("100"), "acme/100/sensordetails");
}

#[test]
fn trailing_slash_in_prefix_is_ignored() {
    let tenant = tenant("acme/");
    assert_eq!(tenant.device_topic("7"), "acme/7/#");
}

#[test]
fn host_and_port_split() {
    let target = DatabaseTarget::new("db.local:5433", "a", "u", "p");
    assert_eq!(target.host_and_port(), ("db.local", Some(5433)));

    let target = DatabaseTarget::new("db.local", "a", "u", "p");
    assert_eq!(target.host_and_port(), ("db.local", None));
}

#[test]
fn debug_output_hides_password() {
    let rendered = format!("{:?}", tenant("acme").database);
    assert!(!rendered.contains("secret"));
}
