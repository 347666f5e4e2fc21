//! Postgres 池化数据库实现
//!
//! 设计要点：
//! - 主库与租户库共用同一实现，按调用的查询区分用途
//! - 每条查询由 `timed` 包装，超时返回 `StorageError::Timeout`

use crate::directory::parse_sensor_serial;
use crate::error::StorageError;
use crate::traits::PooledDatabase;
use async_trait::async_trait;
use domain::{DatabaseTarget, Device, Sensor, SensorReading, Tenant};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const LOG_DATETIME_FORMAT: &str = "YYYY/MM/DD HH24:MI:SS";

pub struct PgDatabase {
    pool: PgPool,
    database: String,
    request_timeout: Duration,
}

impl PgDatabase {
    pub fn new(pool: PgPool, database: String, request_timeout: Duration) -> Self {
        Self {
            pool,
            database,
            request_timeout,
        }
    }

    async fn timed<T, F>(&self, query: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, query).await {
            Ok(result) => result.map_err(StorageError::from),
            Err(_) => Err(StorageError::Timeout(self.request_timeout)),
        }
    }
}

#[async_trait]
impl PooledDatabase for PgDatabase {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn current_database(&self) -> Result<String, StorageError> {
        let row = self
            .timed(sqlx::query("select current_database() as current_db").fetch_one(&self.pool))
            .await?;
        Ok(row.try_get("current_db")?)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        self.timed(sqlx::query("select 1").execute(&self.pool))
            .await?;
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StorageError> {
        let rows = self
            .timed(
                sqlx::query(
                    "select name, db_host, db_name, db_user, db_password, mqtt_topic \
                     from companies order by name",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            let target = DatabaseTarget::new(
                row.try_get::<String, _>("db_host")?,
                row.try_get::<String, _>("db_name")?,
                row.try_get::<String, _>("db_user")?,
                row.try_get::<String, _>("db_password")?,
            );
            tenants.push(Tenant::new(
                row.try_get::<String, _>("name")?,
                target,
                row.try_get::<String, _>("mqtt_topic")?,
            ));
        }
        Ok(tenants)
    }

    async fn list_active_devices(&self) -> Result<Vec<Device>, StorageError> {
        let rows = self
            .timed(
                sqlx::query(
                    "select bu.serial_no, bt.type \
                     from base_units bu \
                     left join base_types bt on bu.id = bt.base_id \
                     where bu.is_deleted = false",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        let mut devices = Vec::with_capacity(rows.len());
        for row in rows {
            let serial: String = row.try_get("serial_no")?;
            let device_type: Option<String> = row.try_get("type")?;
            devices.push(Device::new(serial, device_type.as_deref()));
        }
        Ok(devices)
    }

    async fn list_active_sensors(&self) -> Result<Vec<Sensor>, StorageError> {
        let rows = self
            .timed(
                sqlx::query(
                    "select s.serial_no, bt.type \
                     from sensors s \
                     left join base_types bt on s.type = bt.type \
                     where s.is_deleted = false",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        let mut sensors = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("serial_no")?;
            let sensor_type: Option<String> = row.try_get("type")?;
            match parse_sensor_serial(&raw) {
                Some(serial) => sensors.push(Sensor::new(serial, sensor_type.as_deref())),
                None => warn!(
                    target: "bridge.directory",
                    database = %self.database,
                    serial = %raw,
                    "sensor_serial_not_numeric"
                ),
            }
        }
        Ok(sensors)
    }

    async fn sensor_is_active(&self, serial: &str) -> Result<bool, StorageError> {
        let row = self
            .timed(
                sqlx::query("select 1 from sensors where serial_no = $1 and is_deleted = false limit 1")
                    .bind(serial)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.is_some())
    }

    async fn reading_exists(
        &self,
        sensor_serial: &str,
        logged_at: &str,
    ) -> Result<bool, StorageError> {
        let row = self
            .timed(
                sqlx::query(
                    "select 1 from sensor_data \
                     where sensor_id = $1 and log_datetime = to_timestamp($2, $3)::timestamp \
                     limit 1",
                )
                .bind(sensor_serial)
                .bind(logged_at)
                .bind(LOG_DATETIME_FORMAT)
                .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.is_some())
    }

    async fn insert_reading(&self, reading: &SensorReading) -> Result<(), StorageError> {
        self.timed(
            sqlx::query(
                "insert into sensor_data \
                 (sensor_id, temperature, log_datetime, battery, rssi, snr, hum) \
                 values ($1, $2, to_timestamp($3, $4)::timestamp, $5, $6, $7, $8)",
            )
            .bind(&reading.sensor_serial)
            .bind(reading.temperature)
            .bind(&reading.logged_at)
            .bind(LOG_DATETIME_FORMAT)
            .bind(reading.battery)
            .bind(reading.rssi)
            .bind(reading.snr)
            .bind(reading.humidity)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}
