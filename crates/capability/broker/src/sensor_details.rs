//! 传感器清单
//!
//! 每个基站在 `{prefix}/{serial}/sensordetails` 上有一条保留消息，
//! 内容为与该基站同类型的活跃传感器序列号（升序、去重）：
//!
//! ```json
//! {
//!   "sensors": [5, 6]
//! }
//! ```
//!
//! `SensorSetCache` 记录每个基站上次成功发布的集合，只有集合变化时才重新发布。

use crate::error::BrokerError;
use crate::traits::TenantBroker;
use domain::Tenant;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// 保留消息内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDetails {
    pub sensors: Vec<i64>,
}

impl SensorDetails {
    pub fn new(sensors: &[i64]) -> Self {
        let unique: BTreeSet<i64> = sensors.iter().copied().collect();
        Self {
            sensors: unique.into_iter().collect(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// 单租户的传感器集合快照，按基站序列号索引。
#[derive(Debug, Default)]
pub struct SensorSetCache {
    snapshots: HashMap<String, BTreeSet<i64>>,
}

impl SensorSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 与上次提交的集合比较（集合语义，忽略顺序与重复）；从未提交过的基站按空集比较。
    pub fn has_changed(&self, device_serial: &str, sensors: &[i64]) -> bool {
        let empty = BTreeSet::new();
        let snapshot = self.snapshots.get(device_serial).unwrap_or(&empty);
        let candidate: BTreeSet<i64> = sensors.iter().copied().collect();
        candidate.len() != snapshot.len() || candidate.iter().any(|s| !snapshot.contains(s))
    }

    /// 整体替换该基站的快照。
    pub fn commit(&mut self, device_serial: &str, sensors: &[i64]) {
        self.snapshots.insert(
            device_serial.to_string(),
            sensors.iter().copied().collect(),
        );
    }

    pub fn snapshot(&self, device_serial: &str) -> Option<Vec<i64>> {
        self.snapshots
            .get(device_serial)
            .map(|set| set.iter().copied().collect())
    }
}

/// 发布一个基站的传感器清单（保留、至少一次）。
pub async fn publish_sensor_details(
    broker: &dyn TenantBroker,
    tenant: &Tenant,
    device_serial: &str,
    sensors: &[i64],
) -> Result<(), BrokerError> {
    let topic = tenant.sensor_details_topic(device_serial);
    let payload = SensorDetails::new(sensors)
        .to_payload()
        .map_err(|err| BrokerError::Publish {
            topic: topic.clone(),
            reason: err.to_string(),
        })?;
    broker.publish_retained(&topic, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_device_compares_against_empty_set() {
        let cache = SensorSetCache::new();
        assert!(!cache.has_changed("100", &[]));
        assert!(cache.has_changed("100", &[5]));
        assert_eq!(cache.snapshot("100"), None);
    }

    #[test]
    fn commit_ignores_order_and_duplicates() {
        let mut cache = SensorSetCache::new();
        cache.commit("100", &[6, 5, 5]);
        assert!(!cache.has_changed("100", &[5, 6]));
        assert!(!cache.has_changed("100", &[6, 5, 6]));
        assert_eq!(cache.snapshot("100"), Some(vec![5, 6]));
    }

    #[test]
    fn membership_or_size_change_is_detected() {
        let mut cache = SensorSetCache::new();
        cache.commit("100", &[5, 6]);
        assert!(cache.has_changed("100", &[5, 7]));
        assert!(cache.has_changed("100", &[5]));
        assert!(cache.has_changed("100", &[5, 6, 7]));
        assert!(cache.has_changed("100", &[]));
    }

    #[test]
    fn payload_is_sorted_pretty_json() {
        let payload = SensorDetails::new(&[6, 5, 6]).to_payload().expect("encode");
        let text = String::from_utf8(payload).expect("utf8");
        assert!(text.contains('\n'));
        let decoded: SensorDetails = serde_json::from_str(&text).expect("decode");
        assert_eq!(decoded.sensors, vec![5, 6]);
    }
}
