//! 订阅收敛
//!
//! 期望集合 = 活跃基站的 `{prefix}/{serial}/#`；与租户的已订阅集合比较：
//! 缺少的先订阅再记录，多余的先退订再移除。两个方向互不阻塞，
//! 单个 topic 失败只记录日志。

use crate::registry::TenantHandle;
use bridge_broker::TenantBroker;
use bridge_telemetry::{
    record_subscribe_failure, record_subscribe_success, record_unsubscribe_failure,
    record_unsubscribe_success,
};
use domain::Device;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    /// (topic, 原因)
    pub failed: Vec<(String, String)>,
}

impl SubscriptionReport {
    pub fn is_noop(&self) -> bool {
        self.subscribed.is_empty() && self.unsubscribed.is_empty() && self.failed.is_empty()
    }
}

pub fn required_topics(handle: &TenantHandle, devices: &[Device]) -> BTreeSet<String> {
    let tenant = handle.tenant();
    devices
        .iter()
        .map(|device| tenant.device_topic(&device.serial))
        .collect()
}

pub async fn reconcile_subscriptions(handle: &TenantHandle, devices: &[Device]) -> SubscriptionReport {
    let tenant = handle.tenant().name;
    let required = required_topics(handle, devices);
    let live = handle.live_topics();
    let mut report = SubscriptionReport::default();

    for topic in required.difference(&live) {
        match handle.broker().subscribe(topic).await {
            Ok(status) => {
                handle.record_live(topic);
                record_subscribe_success();
                info!(target: "bridge.poll", tenant = %tenant, topic = %topic, status = ?status, "topic_subscribed");
                report.subscribed.push(topic.clone());
            }
            Err(err) => {
                record_subscribe_failure();
                warn!(target: "bridge.poll", tenant = %tenant, topic = %topic, error = %err, "topic_subscribe_failed");
                report.failed.push((topic.clone(), err.to_string()));
            }
        }
    }

    for topic in live.difference(&required) {
        match handle.broker().unsubscribe(topic).await {
            Ok(()) => {
                handle.forget_live(topic);
                record_unsubscribe_success();
                info!(target: "bridge.poll", tenant = %tenant, topic = %topic, "topic_unsubscribed");
                report.unsubscribed.push(topic.clone());
            }
            Err(err) => {
                record_unsubscribe_failure();
                warn!(target: "bridge.poll", tenant = %tenant, topic = %topic, error = %err, "topic_unsubscribe_failed");
                report.failed.push((topic.clone(), err.to_string()));
            }
        }
    }

    report
}
