//! 传输接口
//!
//! BrokerConnection 只通过该接口向代理发送请求，
//! 生产环境使用 rumqttc 实现（`mqtt.rs`），测试使用脚本化的假实现。

use crate::error::TransportError;
use async_trait::async_trait;

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// 以“至少一次”订阅。
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// 以“至少一次”发布保留消息。
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
