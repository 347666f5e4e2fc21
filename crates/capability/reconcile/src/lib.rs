//! # Bridge Reconcile 模块
//!
//! 把目录中的期望状态（租户、活跃基站、同类型传感器）收敛到代理上的实际状态。
//!
//! ## 模块说明
//!
//! - [`registry`]：已引导租户的登记表（代理连接、已订阅集合、传感器清单缓存）
//! - [`subscriptions`]：订阅收敛
//! - [`sensor_sync`]：传感器清单变化检测与发布
//! - [`polling`]：定时对账（单飞、跳过重叠 tick）
//! - [`bootstrap`]：启动引导

pub mod bootstrap;
pub mod error;
pub mod polling;
pub mod registry;
pub mod sensor_sync;
pub mod subscriptions;

pub use bootstrap::{BootstrapReport, Bootstrapper, TenantBootstrap};
pub use error::ReconcileError;
pub use polling::{PassOutcome, PassReport, PollingService, TenantPass};
pub use registry::{TenantHandle, TenantRegistry};
pub use sensor_sync::{SensorSyncReport, announce_sensor_sets};
pub use subscriptions::{SubscriptionReport, reconcile_subscriptions, required_topics};
