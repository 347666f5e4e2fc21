//! 基站 / 传感器目录
//!
//! - 列出租户库中未软删除的基站与传感器
//! - 按类型精确匹配计算基站与传感器的关联
//! - 主库租户目录（`PooledTenantDirectory`）

use crate::error::DirectoryError;
use crate::pool::PoolManager;
use crate::traits::{PooledDatabase, TenantDirectory};
use async_trait::async_trait;
use domain::{Device, Sensor, Tenant};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub async fn list_active_devices(
    database: &dyn PooledDatabase,
) -> Result<Vec<Device>, DirectoryError> {
    database
        .list_active_devices()
        .await
        .map_err(DirectoryError::Devices)
}

pub async fn list_active_sensors(
    database: &dyn PooledDatabase,
) -> Result<Vec<Sensor>, DirectoryError> {
    database
        .list_active_sensors()
        .await
        .map_err(DirectoryError::Sensors)
}

/// 入库前的归属校验：该序列号是否为本租户的活跃传感器。
pub async fn sensor_is_active(
    database: &dyn PooledDatabase,
    serial: &str,
) -> Result<bool, DirectoryError> {
    database
        .sensor_is_active(serial)
        .await
        .map_err(DirectoryError::SensorLookup)
}

/// 计算基站序列号到同类型传感器序列号的映射。
///
/// 无类型的基站不参与关联（记录 warning），但仍是活跃基站。
/// 有类型但无匹配传感器的基站映射到空列表。
pub fn compute_associations(devices: &[Device], sensors: &[Sensor]) -> BTreeMap<String, Vec<i64>> {
    let mut associations = BTreeMap::new();
    for device in devices {
        let Some(device_type) = device.device_type.as_deref() else {
            warn!(
                target: "bridge.directory",
                device = %device.serial,
                "device_without_type"
            );
            continue;
        };
        let matching: Vec<i64> = sensors
            .iter()
            .filter(|sensor| sensor.sensor_type.as_deref() == Some(device_type))
            .map(|sensor| sensor.serial)
            .collect();
        associations
            .entry(device.serial.clone())
            .or_insert_with(Vec::new)
            .extend(matching);
    }
    associations
}

/// 解析传感器序列号：忽略首尾空白，取前导整数部分。
pub(crate) fn parse_sensor_serial(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits_end = trimmed
        .char_indices()
        .find(|(index, ch)| !(ch.is_ascii_digit() || (*index == 0 && (*ch == '-' || *ch == '+'))))
        .map(|(index, _)| index)
        .unwrap_or(trimmed.len());
    trimmed[..digits_end].parse().ok()
}

/// 通过主库连接读取租户目录。
pub struct PooledTenantDirectory {
    pools: Arc<PoolManager>,
}

impl PooledTenantDirectory {
    pub fn new(pools: Arc<PoolManager>) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl TenantDirectory for PooledTenantDirectory {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, DirectoryError> {
        let main = self.pools.acquire_main().await?;
        main.list_tenants().await.map_err(DirectoryError::Tenants)
    }
}
