//! 存储层错误类型
//!
//! - `StorageError`：单次数据库操作失败（连接、查询、超时）
//! - `ConnectionError`：连接池获取在重试预算耗尽后失败
//! - `DirectoryError`：租户目录或设备/传感器列表读取失败

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed")]
    Closed,
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// 连接池获取失败（已包含全部重试）。
#[derive(Debug, thiserror::Error)]
#[error("connection to {key} failed after {attempts} attempts: {source}")]
pub struct ConnectionError {
    pub key: String,
    pub attempts: u32,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("tenant listing failed: {0}")]
    Tenants(StorageError),
    #[error("device listing failed: {0}")]
    Devices(StorageError),
    #[error("sensor listing failed: {0}")]
    Sensors(StorageError),
    #[error("sensor lookup failed: {0}")]
    SensorLookup(StorageError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
