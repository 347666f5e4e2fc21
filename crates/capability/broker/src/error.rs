use std::time::Duration;

/// 传输层错误（由具体 MQTT 客户端产生）。
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// 代理连接错误。
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("subscription on {topic} failed: {source}")]
    Subscription {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("broker not connected")]
    NotConnected,
    #[error("broker connection closed")]
    Closed,
    #[error("subscription queue full ({0} topics)")]
    QueueFull(usize),
    #[error("broker request timed out after {0:?}")]
    Timeout(Duration),
}
