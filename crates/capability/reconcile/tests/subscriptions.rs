mod common;

use bridge_reconcile::{TenantHandle, reconcile_subscriptions, required_topics};
use common::{FakeBroker, tenant};
use domain::Device;
use std::sync::Arc;

fn handle_with(broker: &Arc<FakeBroker>, live: &[&str]) -> TenantHandle {
    let handle = TenantHandle::new(tenant("acme"), broker.clone());
    for topic in live {
        handle.record_live(topic);
    }
    handle
}

#[tokio::test]
async fn removes_only_stale_topics() {
    let broker = Arc::new(FakeBroker::new("acme", "acme_db"));
    let handle = handle_with(&broker, &["acme/100/#", "acme/200/#"]);

    let report = reconcile_subscriptions(&handle, &[Device::new("100", Some("A"))]).await;

    assert_eq!(report.unsubscribed, vec!["acme/200/#"]);
    assert!(report.subscribed.is_empty());
    assert_eq!(broker.calls(), vec!["unsubscribe acme/200/#"]);
    assert_eq!(
        handle.live_topics().into_iter().collect::<Vec<_>>(),
        vec!["acme/100/#"]
    );
}

#[tokio::test]
async fn second_run_is_a_noop() {
    let broker = Arc::new(FakeBroker::new("acme", "acme_db"));
    let handle = handle_with(&broker, &[]);
    let devices = vec![Device::new("100", Some("A")), Device::new("300", None)];

    let first = reconcile_subscriptions(&handle, &devices).await;
    let calls_after_first = broker.calls().len();
    let second = reconcile_subscriptions(&handle, &devices).await;

    assert_eq!(first.subscribed, vec!["acme/100/#", "acme/300/#"]);
    assert!(second.is_noop());
    assert_eq!(broker.calls().len(), calls_after_first);
}

#[tokio::test]
async fn one_failing_topic_does_not_block_others() {
    let broker = Arc::new(FakeBroker::new("acme", "acme_db"));
    broker.fail_topic("acme/100/#");
    broker.fail_topic("acme/900/#");
    let handle = handle_with(&broker, &["acme/900/#", "acme/901/#"]);
    let devices = vec![Device::new("100", None), Device::new("101", None)];

    let report = reconcile_subscriptions(&handle, &devices).await;

    assert_eq!(report.subscribed, vec!["acme/101/#"]);
    assert_eq!(report.unsubscribed, vec!["acme/901/#"]);
    let failed: Vec<&str> = report.failed.iter().map(|(topic, _)| topic.as_str()).collect();
    assert_eq!(failed, vec!["acme/100/#", "acme/900/#"]);
    let live: Vec<String> = handle.live_topics().into_iter().collect();
    assert_eq!(live, vec!["acme/101/#", "acme/900/#"]);
}

#[test]
fn required_topics_follow_tenant_prefix() {
    let broker = Arc::new(FakeBroker::new("acme", "acme_db"));
    let handle = handle_with(&broker, &[]);
    let topics = required_topics(&handle, &[Device::new("7", None), Device::new("7", Some("B"))]);
    assert_eq!(topics.into_iter().collect::<Vec<_>>(), vec!["acme/7/#"]);
}
