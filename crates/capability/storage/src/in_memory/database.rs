//! PooledDatabase 的内存实现
//!
//! 每个实例代表一次建连；`break_connection` 模拟连接失效，
//! 之后 ping 与查询都返回 `StorageError::Closed`。

use super::store::InMemoryStore;
use crate::error::StorageError;
use crate::traits::PooledDatabase;
use async_trait::async_trait;
use domain::{Device, Sensor, SensorReading, Tenant};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct InMemoryDatabase {
    database: String,
    store: Arc<InMemoryStore>,
    closed: AtomicBool,
    broken: AtomicBool,
    fail_close: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new(database: impl Into<String>, store: Arc<InMemoryStore>) -> Self {
        Self {
            database: database.into(),
            store,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn break_connection(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// 让 `close` 返回错误（连接仍会标记为已关闭）。
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    fn usable(&self) -> Result<&InMemoryStore, StorageError> {
        if self.is_closed() || self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(&self.store)
    }
}

#[async_trait]
impl PooledDatabase for InMemoryDatabase {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn current_database(&self) -> Result<String, StorageError> {
        self.usable()?;
        Ok(self.database.clone())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.usable()?;
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StorageError> {
        self.usable()?.tenants()
    }

    async fn list_active_devices(&self) -> Result<Vec<Device>, StorageError> {
        self.usable()?.active_devices()
    }

    async fn list_active_sensors(&self) -> Result<Vec<Sensor>, StorageError> {
        self.usable()?.active_sensors()
    }

    async fn sensor_is_active(&self, serial: &str) -> Result<bool, StorageError> {
        self.usable()?.sensor_is_active(serial)
    }

    async fn reading_exists(
        &self,
        sensor_serial: &str,
        logged_at: &str,
    ) -> Result<bool, StorageError> {
        self.usable()?.reading_exists(sensor_serial, logged_at)
    }

    async fn insert_reading(&self, reading: &SensorReading) -> Result<(), StorageError> {
        self.usable()?.insert_reading(reading)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(StorageError::Query("scripted close failure".to_string()));
        }
        Ok(())
    }
}
