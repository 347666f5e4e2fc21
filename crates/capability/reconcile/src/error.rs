use bridge_broker::BrokerError;
use bridge_storage::{ConnectionError, DirectoryError};

/// 单个租户对账/引导失败的原因。
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
