//! 读数报文解析与入库
//!
//! 报文为 JSON，数值字段既可能是字符串也可能是数字。

use crate::validation::{
    is_valid_humidity, is_valid_serial_number, is_valid_temperature, is_valid_timestamp,
};
use crate::{IngestError, IngestOutcome, MessageHandler, is_data_topic};
use async_trait::async_trait;
use bridge_retry::{RetryPolicy, with_retries};
use bridge_storage::{PooledDatabase, SharedDatabase, sensor_is_active};
use bridge_telemetry::{record_message_dropped, record_message_persisted, record_message_received};
use domain::SensorReading;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RawReading {
    #[serde(rename = "serialNumber")]
    serial_number: Option<Value>,
    temperature: Option<Value>,
    timestamp: Option<Value>,
    humidity: Option<Value>,
    #[serde(rename = "Voltage")]
    voltage: Option<Value>,
    #[serde(rename = "RSSI")]
    rssi: Option<Value>,
    #[serde(rename = "SNR")]
    snr: Option<Value>,
    #[serde(rename = "firmwareVersion")]
    firmware_version: Option<Value>,
}

/// 校验通过的读数。
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub reading: SensorReading,
    /// 固件版本为 `N/A` 的补传数据。
    pub backfill: bool,
}

/// 解析并校验一条读数报文。
pub fn parse_reading(payload: &[u8]) -> Result<ParsedReading, IngestError> {
    let raw: RawReading =
        serde_json::from_slice(payload).map_err(|err| IngestError::Payload(err.to_string()))?;

    let serial = text(raw.serial_number.as_ref()).unwrap_or_default();
    if !is_valid_serial_number(&serial) {
        return Err(invalid("serialNumber", serial));
    }
    let temperature_text = text(raw.temperature.as_ref()).unwrap_or_default();
    if !is_valid_temperature(&temperature_text) {
        return Err(invalid("temperature", temperature_text));
    }
    let temperature: f64 = temperature_text
        .parse()
        .map_err(|_| invalid("temperature", temperature_text.clone()))?;
    let timestamp = text(raw.timestamp.as_ref()).unwrap_or_default();
    if !is_valid_timestamp(&timestamp) {
        return Err(invalid("timestamp", timestamp));
    }
    let humidity = match text(raw.humidity.as_ref()) {
        Some(value) if !is_valid_humidity(&value) => return Err(invalid("humidity", value)),
        Some(value) => value.parse().ok(),
        None => None,
    };

    let reading = SensorReading {
        sensor_serial: serial,
        temperature,
        logged_at: timestamp,
        battery: number(raw.voltage.as_ref()),
        rssi: number::<f64>(raw.rssi.as_ref()).map(|value| value.trunc() as i32),
        snr: number(raw.snr.as_ref()),
        humidity,
    };
    let backfill = text(raw.firmware_version.as_ref()).as_deref() == Some("N/A");
    Ok(ParsedReading { reading, backfill })
}

fn invalid(field: &'static str, value: String) -> IngestError {
    IngestError::Invalid { field, value }
}

/// 字符串或数字字段转为文本；空串、null 与其他类型视为缺失。
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(value) if value.is_empty() => None,
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn number<T: std::str::FromStr>(value: Option<&Value>) -> Option<T> {
    text(value)?.trim().parse().ok()
}

/// 读数入库处理器：先查重，再写入，整体按 RetryPolicy 重试。
#[derive(Debug, Clone, Default)]
pub struct ReadingIngestor {
    retry: RetryPolicy,
}

impl ReadingIngestor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    async fn ingest(
        &self,
        payload: &[u8],
        database: &dyn PooledDatabase,
    ) -> Result<IngestOutcome, IngestError> {
        let parsed = parse_reading(payload)?;
        let serial = parsed.reading.sensor_serial.as_str();
        if !sensor_is_active(database, serial).await? {
            return Err(IngestError::UnknownSensor(serial.to_string()));
        }
        if parsed.backfill {
            info!(target: "bridge.ingest", sensor = %serial, "backfill_reading");
        }
        self.persist(database, &parsed.reading).await
    }

    async fn persist(
        &self,
        database: &dyn PooledDatabase,
        reading: &SensorReading,
    ) -> Result<IngestOutcome, IngestError> {
        let outcome = with_retries("insert sensor reading", self.retry, move || async move {
            if database
                .reading_exists(&reading.sensor_serial, &reading.logged_at)
                .await?
            {
                return Ok(IngestOutcome::Duplicate);
            }
            database.insert_reading(reading).await?;
            Ok::<_, IngestError>(IngestOutcome::Persisted)
        })
        .await?;
        Ok(outcome)
    }
}

#[async_trait]
impl MessageHandler for ReadingIngestor {
    async fn on_message(
        &self,
        topic: &str,
        payload: &[u8],
        database: SharedDatabase,
    ) -> Result<IngestOutcome, IngestError> {
        record_message_received();
        if !is_data_topic(topic) {
            debug!(target: "bridge.ingest", topic = %topic, "non_data_message_skipped");
            return Ok(IngestOutcome::Skipped);
        }

        let result = self.ingest(payload, database.as_ref()).await;

        match &result {
            Ok(IngestOutcome::Persisted) => {
                record_message_persisted();
                info!(target: "bridge.ingest", topic = %topic, "reading_persisted");
            }
            Ok(IngestOutcome::Duplicate) => {
                record_message_dropped();
                warn!(target: "bridge.ingest", topic = %topic, "duplicate_reading_skipped");
            }
            Ok(IngestOutcome::Skipped) => {}
            Err(err) => {
                record_message_dropped();
                warn!(target: "bridge.ingest", topic = %topic, error = %err, "message_dropped");
            }
        }
        result
    }
}
