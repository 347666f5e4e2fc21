//! 传感器清单同步：只有集合变化的基站才重新发布，发布成功后才提交快照。

use crate::registry::TenantHandle;
use bridge_broker::publish_sensor_details;
use bridge_storage::compute_associations;
use bridge_telemetry::{record_sensor_details_failed, record_sensor_details_published};
use domain::{Device, Sensor};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorSyncReport {
    pub published: Vec<String>,
    pub unchanged: usize,
    /// (基站序列号, 原因)
    pub failed: Vec<(String, String)>,
}

pub async fn announce_sensor_sets(
    handle: &TenantHandle,
    devices: &[Device],
    sensors: &[Sensor],
) -> SensorSyncReport {
    let tenant = handle.tenant();
    let mut report = SensorSyncReport::default();

    for (device_serial, matching) in compute_associations(devices, sensors) {
        if !handle.sensor_cache().has_changed(&device_serial, &matching) {
            report.unchanged += 1;
            continue;
        }
        info!(
            target: "bridge.poll",
            tenant = %tenant.name,
            device = %device_serial,
            sensors = matching.len(),
            "sensor_set_changed"
        );
        match publish_sensor_details(handle.broker().as_ref(), &tenant, &device_serial, &matching).await {
            Ok(()) => {
                handle.sensor_cache().commit(&device_serial, &matching);
                record_sensor_details_published();
                report.published.push(device_serial);
            }
            Err(err) => {
                record_sensor_details_failed();
                warn!(
                    target: "bridge.poll",
                    tenant = %tenant.name,
                    device = %device_serial,
                    error = %err,
                    "sensor_details_publish_failed"
                );
                report.failed.push((device_serial, err.to_string()));
            }
        }
    }

    report
}
