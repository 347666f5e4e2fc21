//! 代理接口 Trait 定义
//!
//! - TenantBroker：单个租户的代理连接
//! - BrokerFactory：为租户建立代理连接

use crate::error::BrokerError;
use async_trait::async_trait;
use bridge_storage::SharedDatabase;
use domain::Tenant;
use std::sync::Arc;

/// 订阅请求的去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStatus {
    /// 已向代理发出订阅。
    Subscribed,
    /// 尚未连接，已进入待订阅队列。
    Queued,
}

/// 租户代理连接。
#[async_trait]
pub trait TenantBroker: Send + Sync {
    fn tenant(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// 等待连上代理（上限为请求超时），返回此时是否已连接。
    async fn wait_connected(&self) -> bool;

    async fn subscribe(&self, topic: &str) -> Result<SubscribeStatus, BrokerError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError>;

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// 优雅断开，可重复调用。
    async fn disconnect(&self);

    /// 替换交给报文处理器的租户库连接。
    fn set_database(&self, database: SharedDatabase);
}

pub type SharedBroker = Arc<dyn TenantBroker>;

/// 代理连接工厂。
#[async_trait]
pub trait BrokerFactory: Send + Sync {
    async fn connect(
        &self,
        tenant: &Tenant,
        database: SharedDatabase,
    ) -> Result<SharedBroker, BrokerError>;
}
