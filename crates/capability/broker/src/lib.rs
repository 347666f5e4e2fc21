//! # Bridge Broker 模块
//!
//! 每个租户一条独立的 MQTT 连接，启动时建立，生命周期内只原地重连。
//!
//! ## 模块说明
//!
//! - [`traits`]：TenantBroker / BrokerFactory 接口
//! - [`connection`]：连接状态、待订阅队列、看门狗、报文派发
//! - [`transport`]：传输接口（rumqttc 或测试替身）
//! - [`mqtt`]：rumqttc 实现与驱动任务
//! - [`sensor_details`]：传感器清单缓存与保留消息发布
//!
//! ## 约束
//!
//! - MQTT 3.1.1 没有 no-local 订阅选项，自己发布的 `sensordetails`
//!   保留消息会回流，由报文处理器按 topic 后缀跳过

pub mod connection;
pub mod error;
pub mod mqtt;
pub mod sensor_details;
pub mod traits;
pub mod transport;

pub use connection::{BrokerConnection, BrokerSettings, ConnectionState};
pub use error::{BrokerError, TransportError};
pub use mqtt::{MqttBrokerConfig, MqttBrokerFactory, RumqttTransport, client_id};
pub use sensor_details::{SensorDetails, SensorSetCache, publish_sensor_details};
pub use traits::{BrokerFactory, SharedBroker, SubscribeStatus, TenantBroker};
pub use transport::BrokerTransport;
