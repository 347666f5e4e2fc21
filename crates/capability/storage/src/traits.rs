//! 存储接口 Trait 定义
//!
//! - PooledDatabase：一个池化的数据库连接（主库或租户库）
//! - DatabaseConnector：按坐标建立 PooledDatabase
//! - TenantDirectory：租户目录来源
//!
//! 设计原则：
//! - 所有接口返回显式错误类型
//! - 使用 async_trait 支持动态分发（Postgres / 内存实现可互换）

use crate::error::{DirectoryError, StorageError};
use async_trait::async_trait;
use domain::{DatabaseTarget, Device, Sensor, SensorReading, Tenant};
use std::sync::Arc;

/// 池化数据库连接。
///
/// 主库只使用 `list_tenants`，租户库使用其余查询。
#[async_trait]
pub trait PooledDatabase: Send + Sync {
    /// 建立连接时使用的库名。
    fn database_name(&self) -> &str;

    /// 服务端报告的当前库名。
    async fn current_database(&self) -> Result<String, StorageError>;

    /// 最小往返探测（`select 1`）。
    async fn ping(&self) -> Result<(), StorageError>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StorageError>;

    /// 未软删除的基站（类型可为空）。
    async fn list_active_devices(&self) -> Result<Vec<Device>, StorageError>;

    /// 未软删除的传感器；序列号无法解析为整数的行被跳过。
    async fn list_active_sensors(&self) -> Result<Vec<Sensor>, StorageError>;

    async fn sensor_is_active(&self, serial: &str) -> Result<bool, StorageError>;

    async fn reading_exists(&self, sensor_serial: &str, logged_at: &str)
    -> Result<bool, StorageError>;

    async fn insert_reading(&self, reading: &SensorReading) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError>;
}

pub type SharedDatabase = Arc<dyn PooledDatabase>;

/// 数据库连接器。
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self, target: &DatabaseTarget) -> Result<SharedDatabase, StorageError>;
}

/// 租户目录来源。
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, DirectoryError>;
}
