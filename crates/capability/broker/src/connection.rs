//! 单租户代理连接
//!
//! 状态：`Disconnected → Connecting → Connected`，断线回到 `Disconnected`，
//! 由驱动任务按固定间隔重连；看门狗每个周期检查一次，仍断线时强制重连。
//!
//! 待订阅队列：
//! - 未连接时的订阅进入 FIFO 队列（去重、有上限）
//! - 每次连上后由单一消费者按序排空；某个 topic 失败则放回队首并停止本轮排空
//! - 会话未保留（clean session）时，已订阅的 topic 重新入队

use crate::error::{BrokerError, TransportError};
use crate::traits::{SubscribeStatus, TenantBroker};
use crate::transport::BrokerTransport;
use async_trait::async_trait;
use bridge_ingest::MessageHandler;
use bridge_retry::{RetryPolicy, with_retries};
use bridge_storage::SharedDatabase;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy)]
pub struct BrokerSettings {
    /// 单次订阅/发布/断开请求的超时。
    pub request_timeout: Duration,
    /// 断线后驱动任务的重连间隔。
    pub reconnect_period: Duration,
    pub watchdog_interval: Duration,
    /// 看门狗强制重连的重试策略。
    pub reconnect_retry: RetryPolicy,
    pub max_pending: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            reconnect_period: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(5 * 60),
            reconnect_retry: RetryPolicy::default(),
            max_pending: 10_000,
        }
    }
}

// 断开时等待驱动任务把 DISCONNECT 发出去的上限。
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

pub struct BrokerConnection {
    tenant: String,
    transport: Arc<dyn BrokerTransport>,
    handler: Arc<dyn MessageHandler>,
    settings: BrokerSettings,
    state: watch::Sender<ConnectionState>,
    pending: Mutex<VecDeque<String>>,
    subscribed: Mutex<BTreeSet<String>>,
    retained: Mutex<BTreeSet<String>>,
    drain_lock: tokio::sync::Mutex<()>,
    database: RwLock<SharedDatabase>,
    reconnect: Notify,
    closed: AtomicBool,
    shutdown: CancellationToken,
    watchdog_token: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerConnection {
    pub fn new(
        tenant: impl Into<String>,
        transport: Arc<dyn BrokerTransport>,
        handler: Arc<dyn MessageHandler>,
        database: SharedDatabase,
        settings: BrokerSettings,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let watchdog_token = shutdown.child_token();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Arc::new(Self {
            tenant: tenant.into(),
            transport,
            handler,
            settings,
            state,
            pending: Mutex::new(VecDeque::new()),
            subscribed: Mutex::new(BTreeSet::new()),
            retained: Mutex::new(BTreeSet::new()),
            drain_lock: tokio::sync::Mutex::new(()),
            database: RwLock::new(database),
            reconnect: Notify::new(),
            closed: AtomicBool::new(false),
            shutdown,
            watchdog_token,
            driver: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 所有后台任务共享的取消令牌。
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pending_topics(&self) -> Vec<String> {
        lock(&self.pending).iter().cloned().collect()
    }

    pub fn subscribed_topics(&self) -> BTreeSet<String> {
        lock(&self.subscribed).clone()
    }

    pub fn retained_topics(&self) -> BTreeSet<String> {
        lock(&self.retained).clone()
    }

    pub fn database(&self) -> SharedDatabase {
        self.database
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attach_driver(&self, handle: JoinHandle<()>) {
        *lock(&self.driver) = Some(handle);
    }

    pub fn on_connecting(&self) {
        if !self.is_closed() {
            self.state.send_replace(ConnectionState::Connecting);
        }
    }

    /// 收到 CONNACK：切换为已连接并异步排空待订阅队列。
    pub fn on_connected(self: &Arc<Self>, session_present: bool) -> JoinHandle<()> {
        self.state.send_replace(ConnectionState::Connected);
        info!(
            target: "bridge.broker",
            tenant = %self.tenant,
            session_present,
            "broker_connected"
        );
        if !session_present {
            // 已订阅的排在原有待订阅之前
            let subscribed: Vec<String> = lock(&self.subscribed).iter().cloned().collect();
            let mut pending = lock(&self.pending);
            let queued: Vec<String> = pending
                .drain(..)
                .filter(|topic| !subscribed.contains(topic))
                .collect();
            pending.extend(subscribed);
            pending.extend(queued);
            drop(pending);
        }
        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.drain_pending().await })
    }

    pub fn on_connection_lost(&self, reason: &str) {
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        if self.is_closed() {
            return;
        }
        if previous == ConnectionState::Connected {
            warn!(
                target: "bridge.broker",
                tenant = %self.tenant,
                reason = %reason,
                "broker_connection_lost"
            );
        } else {
            debug!(
                target: "bridge.broker",
                tenant = %self.tenant,
                reason = %reason,
                "broker_connect_failed"
            );
        }
    }

    /// 驱动任务在断线后等待下一次重连：固定间隔，或被看门狗提前唤醒。
    pub async fn wait_reconnect(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.reconnect_period) => {}
            _ = self.reconnect.notified() => {
                debug!(target: "bridge.broker", tenant = %self.tenant, "forced_reconnect");
            }
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// 按 FIFO 排空待订阅队列；失败的 topic 放回队首并停止本轮。
    pub async fn drain_pending(&self) {
        let _consumer = self.drain_lock.lock().await;
        loop {
            if !self.is_connected() {
                return;
            }
            let Some(topic) = lock(&self.pending).pop_front() else {
                return;
            };
            match self.request(self.transport.subscribe(&topic)).await {
                Ok(()) => {
                    info!(target: "bridge.broker", tenant = %self.tenant, topic = %topic, "queued_subscription_sent");
                    lock(&self.subscribed).insert(topic);
                }
                Err(err) => {
                    warn!(
                        target: "bridge.broker",
                        tenant = %self.tenant,
                        topic = %topic,
                        error = %err,
                        "queued_subscription_failed"
                    );
                    lock(&self.pending).push_front(topic);
                    return;
                }
            }
        }
    }

    /// 启动看门狗：每个周期若仍断线，则在有界重试内强制重连。
    pub fn spawn_watchdog(self: &Arc<Self>) -> JoinHandle<()> {
        let connection = Arc::clone(self);
        let token = self.watchdog_token.clone();
        tokio::spawn(async move {
            let period = connection.settings.watchdog_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if connection.state() != ConnectionState::Disconnected {
                            continue;
                        }
                        info!(target: "bridge.broker", tenant = %connection.tenant, "watchdog_reconnect");
                        let operation = format!("broker reconnect {}", connection.tenant);
                        let conn = connection.as_ref();
                        let policy = connection.settings.reconnect_retry;
                        if let Err(err) = with_retries(&operation, policy, move || conn.force_reconnect()).await {
                            warn!(
                                target: "bridge.broker",
                                tenant = %connection.tenant,
                                error = %err,
                                "watchdog_reconnect_failed"
                            );
                        }
                    }
                }
            }
        })
    }

    /// 唤醒驱动任务立即重连，并在请求超时内等待连上。
    pub async fn force_reconnect(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        if self.is_connected() {
            return Ok(());
        }
        self.reconnect.notify_one();
        if self.wait_connected().await {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    /// 把一条入站报文交给报文处理器，每条报文独立任务。
    pub fn dispatch_message(self: &Arc<Self>, topic: String, payload: Vec<u8>) -> JoinHandle<()> {
        let database = self.database();
        let handler = Arc::clone(&self.handler);
        let tenant = self.tenant.clone();
        tokio::spawn(async move {
            if let Err(err) = handler.on_message(&topic, &payload, database).await {
                debug!(
                    target: "bridge.broker",
                    tenant = %tenant,
                    topic = %topic,
                    error = %err,
                    "message_handler_failed"
                );
            }
        })
    }

    fn enqueue(&self, topic: &str) -> Result<(), BrokerError> {
        let mut pending = lock(&self.pending);
        if pending.iter().any(|queued| queued == topic) {
            return Ok(());
        }
        if pending.len() >= self.settings.max_pending {
            return Err(BrokerError::QueueFull(pending.len()));
        }
        pending.push_back(topic.to_string());
        Ok(())
    }

    async fn request<F>(&self, request: F) -> Result<(), TransportError>
    where
        F: Future<Output = Result<(), TransportError>>,
    {
        match tokio::time::timeout(self.settings.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(TransportError(format!(
                "timed out after {:?}",
                self.settings.request_timeout
            ))),
        }
    }
}

#[async_trait]
impl TenantBroker for BrokerConnection {
    fn tenant(&self) -> &str {
        &self.tenant
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    async fn wait_connected(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut state = self.state.subscribe();
        matches!(
            tokio::time::timeout(
                self.settings.request_timeout,
                state.wait_for(|state| *state == ConnectionState::Connected),
            )
            .await,
            Ok(Ok(_))
        )
    }

    async fn subscribe(&self, topic: &str) -> Result<SubscribeStatus, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        if !self.is_connected() {
            self.enqueue(topic)?;
            debug!(target: "bridge.broker", tenant = %self.tenant, topic = %topic, "subscription_queued");
            return Ok(SubscribeStatus::Queued);
        }
        match self.request(self.transport.subscribe(topic)).await {
            Ok(()) => {
                lock(&self.subscribed).insert(topic.to_string());
                Ok(SubscribeStatus::Subscribed)
            }
            Err(source) => {
                // 放回队列，下次连上后按序补订
                let mut pending = lock(&self.pending);
                if !pending.iter().any(|queued| queued == topic) {
                    pending.push_back(topic.to_string());
                }
                Err(BrokerError::Subscription {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        lock(&self.pending).retain(|queued| queued != topic);
        if self.is_connected() {
            self.request(self.transport.unsubscribe(topic))
                .await
                .map_err(|source| BrokerError::Subscription {
                    topic: topic.to_string(),
                    source,
                })?;
        }
        // 断线时 clean session 已丢弃代理端订阅，只需不再补订。
        lock(&self.subscribed).remove(topic);
        Ok(())
    }

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.request(self.transport.publish_retained(topic, payload))
            .await
            .map_err(|err| BrokerError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })?;
        lock(&self.retained).insert(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.watchdog_token.cancel();
        let was_connected = self.is_connected();
        self.state.send_replace(ConnectionState::Disconnected);
        if was_connected {
            if let Err(err) = self.request(self.transport.disconnect()).await {
                warn!(target: "bridge.broker", tenant = %self.tenant, error = %err, "broker_disconnect_failed");
            }
        } else {
            // 没有 DISCONNECT 要发，驱动任务直接退出
            self.shutdown.cancel();
        }
        let driver = lock(&self.driver).take();
        if let Some(mut driver) = driver {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        self.shutdown.cancel();
        info!(target: "bridge.broker", tenant = %self.tenant, "broker_disconnected");
    }

    fn set_database(&self, database: SharedDatabase) {
        *self
            .database
            .write()
            .unwrap_or_else(PoisonError::into_inner) = database;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
