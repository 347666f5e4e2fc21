//! 单个库的内存数据
//!
//! 使用 RwLock 提供线程安全的读写；`set_failing` 让后续所有查询失败。

use crate::directory::parse_sensor_serial;
use crate::error::StorageError;
use domain::{Device, Sensor, SensorReading, Tenant};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct StoredDevice {
    device: Device,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct StoredSensor {
    serial: String,
    sensor_type: Option<String>,
    deleted: bool,
}

#[derive(Default)]
struct StoreData {
    tenants: Vec<Tenant>,
    devices: Vec<StoredDevice>,
    sensors: Vec<StoredSensor>,
    readings: Vec<SensorReading>,
}

#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tenants(&self, tenants: Vec<Tenant>) {
        if let Ok(mut data) = self.data.write() {
            data.tenants = tenants;
        }
    }

    pub fn add_device(&self, serial: &str, device_type: Option<&str>) {
        if let Ok(mut data) = self.data.write() {
            data.devices.push(StoredDevice {
                device: Device::new(serial, device_type),
                deleted: false,
            });
        }
    }

    pub fn soft_delete_device(&self, serial: &str) {
        if let Ok(mut data) = self.data.write() {
            for stored in data.devices.iter_mut().filter(|d| d.device.serial == serial) {
                stored.deleted = true;
            }
        }
    }

    pub fn add_sensor(&self, serial: &str, sensor_type: Option<&str>) {
        if let Ok(mut data) = self.data.write() {
            data.sensors.push(StoredSensor {
                serial: serial.to_string(),
                sensor_type: sensor_type.map(str::to_string),
                deleted: false,
            });
        }
    }

    pub fn soft_delete_sensor(&self, serial: &str) {
        if let Ok(mut data) = self.data.write() {
            for stored in data.sensors.iter_mut().filter(|s| s.serial == serial) {
                stored.deleted = true;
            }
        }
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        self.data
            .read()
            .map(|data| data.readings.clone())
            .unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Query("scripted failure".to_string()));
        }
        Ok(())
    }

    pub(crate) fn tenants(&self) -> Result<Vec<Tenant>, StorageError> {
        self.check()?;
        let data = self.read()?;
        Ok(data.tenants.clone())
    }

    pub(crate) fn active_devices(&self) -> Result<Vec<Device>, StorageError> {
        self.check()?;
        let data = self.read()?;
        Ok(data
            .devices
            .iter()
            .filter(|stored| !stored.deleted)
            .map(|stored| stored.device.clone())
            .collect())
    }

    pub(crate) fn active_sensors(&self) -> Result<Vec<Sensor>, StorageError> {
        self.check()?;
        let data = self.read()?;
        Ok(data
            .sensors
            .iter()
            .filter(|stored| !stored.deleted)
            .filter_map(|stored| {
                parse_sensor_serial(&stored.serial)
                    .map(|serial| Sensor::new(serial, stored.sensor_type.as_deref()))
            })
            .collect())
    }

    pub(crate) fn sensor_is_active(&self, serial: &str) -> Result<bool, StorageError> {
        self.check()?;
        let data = self.read()?;
        Ok(data
            .sensors
            .iter()
            .any(|stored| !stored.deleted && stored.serial == serial))
    }

    pub(crate) fn reading_exists(
        &self,
        sensor_serial: &str,
        logged_at: &str,
    ) -> Result<bool, StorageError> {
        self.check()?;
        let data = self.read()?;
        Ok(data
            .readings
            .iter()
            .any(|r| r.sensor_serial == sensor_serial && r.logged_at == logged_at))
    }

    pub(crate) fn insert_reading(&self, reading: &SensorReading) -> Result<(), StorageError> {
        self.check()?;
        let mut data = self
            .data
            .write()
            .map_err(|_| StorageError::Query("lock failed".to_string()))?;
        data.readings.push(reading.clone());
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreData>, StorageError> {
        self.data
            .read()
            .map_err(|_| StorageError::Query("lock failed".to_string()))
    }
}
