//! 设备上报报文接入
//!
//! 代理连接把每条入站报文连同该租户当前的数据库连接交给 `MessageHandler`。
//! `ReadingIngestor` 负责解析、校验、归属检查与入库；报文处理失败只记录日志，
//! 不会回传给代理连接。

use async_trait::async_trait;
use bridge_storage::{DirectoryError, SharedDatabase, StorageError};

pub mod reading;
pub mod validation;

pub use reading::{ParsedReading, ReadingIngestor, parse_reading};

/// 接入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("payload is not valid json: {0}")]
    Payload(String),
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
    #[error("invalid or inactive sensor: {0}")]
    UnknownSensor(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 单条报文的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 非数据 topic（配置、传感器清单等）。
    Skipped,
    /// 同一传感器同一时刻的读数已存在。
    Duplicate,
    Persisted,
}

/// 入站报文处理器。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(
        &self,
        topic: &str,
        payload: &[u8],
        database: SharedDatabase,
    ) -> Result<IngestOutcome, IngestError>;
}

/// 不承载读数的 topic 后缀。
const NON_DATA_SUFFIXES: [&str; 3] = ["/config", "/sensordetails", "/unknown"];

pub fn is_data_topic(topic: &str) -> bool {
    !NON_DATA_SUFFIXES
        .iter()
        .any(|suffix| topic.ends_with(suffix))
}
