//! rumqttc 实现
//!
//! - RumqttTransport：把 BrokerTransport 请求交给 AsyncClient
//! - MqttBrokerFactory：为租户建立客户端、驱动任务与看门狗
//!
//! 驱动任务独占 EventLoop：CONNACK 触发排空队列，PUBLISH 逐条派发给报文处理器，
//! 出错后按固定间隔（或看门狗唤醒）再次 poll，由 rumqttc 重新建连。

use crate::connection::{BrokerConnection, BrokerSettings};
use crate::error::{BrokerError, TransportError};
use crate::traits::{BrokerFactory, SharedBroker, TenantBroker};
use crate::transport::BrokerTransport;
use async_trait::async_trait;
use bridge_ingest::MessageHandler;
use bridge_storage::SharedDatabase;
use domain::Tenant;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing,
    Packet, QoS,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 请求通道容量。
const REQUEST_CAPACITY: usize = 100;

pub struct RumqttTransport {
    client: AsyncClient,
}

impl RumqttTransport {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BrokerTransport for RumqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|err| TransportError(err.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|err| TransportError(err.to_string()))
    }

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|err| TransportError(err.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .disconnect()
            .await
            .map_err(|err| TransportError(err.to_string()))
    }
}

/// MQTT 代理配置。
#[derive(Debug, Clone)]
pub struct MqttBrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub settings: BrokerSettings,
}

pub struct MqttBrokerFactory {
    config: MqttBrokerConfig,
    handler: Arc<dyn MessageHandler>,
}

impl MqttBrokerFactory {
    pub fn new(config: MqttBrokerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self { config, handler }
    }

    fn options(&self, tenant: &Tenant) -> MqttOptions {
        let mut options = MqttOptions::new(
            client_id(&tenant.name),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl BrokerFactory for MqttBrokerFactory {
    async fn connect(
        &self,
        tenant: &Tenant,
        database: SharedDatabase,
    ) -> Result<SharedBroker, BrokerError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(tenant), REQUEST_CAPACITY);
        let mut network = NetworkOptions::new();
        network.set_connection_timeout(self.config.settings.request_timeout.as_secs());
        eventloop.set_network_options(network);

        let connection = BrokerConnection::new(
            tenant.name.clone(),
            Arc::new(RumqttTransport::new(client)),
            Arc::clone(&self.handler),
            database,
            self.config.settings,
        );
        info!(
            target: "bridge.broker",
            tenant = %tenant.name,
            host = %self.config.host,
            port = self.config.port,
            "broker_connecting"
        );
        let driver = tokio::spawn(drive(Arc::clone(&connection), eventloop));
        connection.attach_driver(driver);
        connection.spawn_watchdog();
        Ok(connection)
    }
}

/// `mqtt-client-{tenant}-{6 位十六进制}`。
pub fn client_id(tenant: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("mqtt-client-{}-{}", tenant, &suffix[..6])
}

async fn drive(connection: Arc<BrokerConnection>, mut eventloop: EventLoop) {
    let shutdown = connection.shutdown_token();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connection.on_connected(ack.session_present);
                } else {
                    connection.on_connection_lost(&format!("{:?}", ack.code));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                connection.dispatch_message(publish.topic.clone(), publish.payload.to_vec());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connection.on_connection_lost("broker sent disconnect");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(target: "bridge.broker", tenant = %connection.tenant(), "disconnect_sent");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                if connection.is_closed() {
                    break;
                }
                connection.on_connection_lost(&err.to_string());
                connection.wait_reconnect().await;
                if shutdown.is_cancelled() {
                    break;
                }
                connection.on_connecting();
            }
        }
    }
    if !connection.is_closed() {
        warn!(target: "bridge.broker", tenant = %connection.tenant(), "broker_driver_stopped");
    }
}
