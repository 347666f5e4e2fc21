//! 连接池管理器
//!
//! - 每个租户库按 (host, database) 键持有至多一个池化连接
//! - 每次 `acquire` 都会取消旧的空闲回收任务并重新计时（默认 15 分钟）
//! - 主库（租户目录）连接不参与空闲回收，由周期健康探测维护
//! - 租户库连接建立后同样按周期探测（默认 5 分钟），失败时关闭并重建；回收时探测随之停止
//! - 建连失败按 RetryPolicy 固定间隔重试，耗尽后返回 `ConnectionError`
//!
//! 所有后台任务都挂在管理器的根 CancellationToken 下，`shutdown` 时统一取消。

use crate::error::ConnectionError;
use crate::traits::{DatabaseConnector, SharedDatabase};
use bridge_retry::{RetryPolicy, with_retries};
use bridge_telemetry::{record_pool_created, record_pool_evicted};
use domain::DatabaseTarget;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 池化连接的键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolKey {
    /// 主库（租户目录）。
    Main,
    Tenant { host: String, database: String },
}

impl PoolKey {
    pub fn tenant(target: &DatabaseTarget) -> Self {
        Self::Tenant {
            host: target.host.clone(),
            database: target.database.clone(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Tenant { host, database } => write!(f, "{host}_{database}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub idle_timeout: Duration,
    pub health_probe_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15 * 60),
            health_probe_interval: Duration::from_secs(5 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Default)]
struct Slot {
    database: Option<SharedDatabase>,
    eviction: Option<CancellationToken>,
    probe: Option<CancellationToken>,
    // 每次重新计时递增，过期任务据此判断自己是否已被取代。
    generation: u64,
}

type SharedSlot = Arc<tokio::sync::Mutex<Slot>>;

pub struct PoolManager {
    connector: Arc<dyn DatabaseConnector>,
    settings: PoolSettings,
    main_target: DatabaseTarget,
    slots: Mutex<HashMap<PoolKey, SharedSlot>>,
    main: tokio::sync::Mutex<Option<SharedDatabase>>,
    shutdown: CancellationToken,
}

impl PoolManager {
    pub fn new(
        connector: Arc<dyn DatabaseConnector>,
        main_target: DatabaseTarget,
        settings: PoolSettings,
    ) -> Self {
        Self {
            connector,
            settings,
            main_target,
            slots: Mutex::new(HashMap::new()),
            main: tokio::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// 获取租户库连接，并重置该键的空闲回收计时。
    pub async fn acquire(&self, target: &DatabaseTarget) -> Result<SharedDatabase, ConnectionError> {
        let key = PoolKey::tenant(target);
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;
        let database = match guard.database.as_ref() {
            Some(database) => database.clone(),
            None => {
                let database = self.connect_with_retry(&key, target).await?;
                info!(target: "bridge.pool", key = %key, "pool_created");
                record_pool_created();
                guard.database = Some(database.clone());
                self.arm_probe(&key, target, &slot, &mut guard);
                database
            }
        };
        self.arm_eviction(&key, &slot, &mut guard);
        Ok(database)
    }

    /// 获取主库连接（不参与空闲回收）。
    pub async fn acquire_main(&self) -> Result<SharedDatabase, ConnectionError> {
        let mut guard = self.main.lock().await;
        if let Some(database) = guard.as_ref() {
            return Ok(database.clone());
        }
        let database = self
            .connect_with_retry(&PoolKey::Main, &self.main_target)
            .await?;
        info!(target: "bridge.pool", key = %PoolKey::Main, "pool_created");
        record_pool_created();
        *guard = Some(database.clone());
        Ok(database)
    }

    /// 探测主库连接，失败时关闭旧连接并重建。
    pub async fn probe_main(&self) -> Result<(), ConnectionError> {
        let current = self.acquire_main().await?;
        let Err(err) = current.ping().await else {
            debug!(target: "bridge.pool", key = %PoolKey::Main, "health_probe_ok");
            return Ok(());
        };
        warn!(
            target: "bridge.pool",
            key = %PoolKey::Main,
            error = %err,
            "health_probe_failed"
        );
        let mut guard = self.main.lock().await;
        let stale = guard.take_if(|database| Arc::ptr_eq(database, &current));
        if let Some(stale) = stale {
            if let Err(err) = stale.close().await {
                warn!(target: "bridge.pool", key = %PoolKey::Main, error = %err, "pool_close_failed");
            }
        }
        if guard.is_none() {
            let database = self
                .connect_with_retry(&PoolKey::Main, &self.main_target)
                .await?;
            info!(target: "bridge.pool", key = %PoolKey::Main, "pool_recreated");
            record_pool_created();
            *guard = Some(database);
        }
        Ok(())
    }

    /// 启动主库健康探测任务（首次探测在一个周期之后）。
    pub fn spawn_health_probe(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            let period = manager.settings.health_probe_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = manager.probe_main().await {
                            warn!(target: "bridge.pool", error = %err, "health_probe_recreate_failed");
                        }
                    }
                }
            }
        })
    }

    /// 该租户库当前是否持有连接。
    pub async fn is_live(&self, target: &DatabaseTarget) -> bool {
        let key = PoolKey::tenant(target);
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(&key).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.database.is_some(),
            None => false,
        }
    }

    /// 关闭全部连接（含主库），单个关闭失败只记录不重试。
    pub async fn close_all(&self) {
        let slots: Vec<(PoolKey, SharedSlot)> = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.drain().collect()
        };
        for (key, slot) in slots {
            let database = {
                let mut guard = slot.lock().await;
                for token in [guard.eviction.take(), guard.probe.take()].into_iter().flatten() {
                    token.cancel();
                }
                guard.database.take()
            };
            if let Some(database) = database {
                close_logged(&key, database).await;
            }
        }
        let main = self.main.lock().await.take();
        if let Some(database) = main {
            close_logged(&PoolKey::Main, database).await;
        }
    }

    /// 取消全部后台任务并关闭全部连接。
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.close_all().await;
    }

    fn slot(&self, key: &PoolKey) -> SharedSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.clone()).or_default().clone()
    }

    async fn connect_with_retry(
        &self,
        key: &PoolKey,
        target: &DatabaseTarget,
    ) -> Result<SharedDatabase, ConnectionError> {
        connect_with_retry(self.connector.as_ref(), self.settings.retry, key, target).await
    }

    fn arm_probe(&self, key: &PoolKey, target: &DatabaseTarget, slot: &SharedSlot, guard: &mut Slot) {
        if let Some(previous) = guard.probe.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        guard.probe = Some(token.clone());

        let connector = Arc::clone(&self.connector);
        let retry = self.settings.retry;
        let period = self.settings.health_probe_interval;
        let key = key.clone();
        let target = target.clone();
        let slot = Arc::clone(slot);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = slot.lock().await.database.clone();
                        let Some(current) = current else {
                            break;
                        };
                        let Err(err) = current.ping().await else {
                            debug!(target: "bridge.pool", key = %key, "health_probe_ok");
                            continue;
                        };
                        warn!(target: "bridge.pool", key = %key, error = %err, "health_probe_failed");

                        let mut guard = slot.lock().await;
                        if token.is_cancelled() {
                            break;
                        }
                        let stale = guard.database.take_if(|database| Arc::ptr_eq(database, &current));
                        if let Some(stale) = stale {
                            close_logged(&key, stale).await;
                        }
                        if guard.database.is_some() {
                            continue;
                        }
                        match connect_with_retry(connector.as_ref(), retry, &key, &target).await {
                            Ok(database) => {
                                info!(target: "bridge.pool", key = %key, "pool_recreated");
                                record_pool_created();
                                guard.database = Some(database);
                            }
                            Err(err) => {
                                // 下一次 acquire 会重新建连并重新挂上探测
                                warn!(target: "bridge.pool", key = %key, error = %err, "health_probe_recreate_failed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    fn arm_eviction(&self, key: &PoolKey, slot: &SharedSlot, guard: &mut Slot) {
        if let Some(previous) = guard.eviction.take() {
            previous.cancel();
        }
        guard.generation += 1;
        let armed = guard.generation;
        let token = self.shutdown.child_token();
        guard.eviction = Some(token.clone());

        let idle = self.settings.idle_timeout;
        let key = key.clone();
        let slot = Arc::clone(slot);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(idle) => {
                    let database = {
                        let mut guard = slot.lock().await;
                        if guard.generation != armed {
                            return;
                        }
                        guard.eviction = None;
                        if let Some(probe) = guard.probe.take() {
                            probe.cancel();
                        }
                        guard.database.take()
                    };
                    if let Some(database) = database {
                        info!(target: "bridge.pool", key = %key, idle_secs = idle.as_secs(), "pool_evicted");
                        record_pool_evicted();
                        close_logged(&key, database).await;
                    }
                }
            }
        });
    }
}

async fn connect_with_retry(
    connector: &dyn DatabaseConnector,
    retry: RetryPolicy,
    key: &PoolKey,
    target: &DatabaseTarget,
) -> Result<SharedDatabase, ConnectionError> {
    let operation = format!("connect {key}");
    with_retries(&operation, retry, move || connector.connect(target))
        .await
        .map_err(|source| ConnectionError {
            key: key.to_string(),
            attempts: retry.attempts,
            source,
        })
}

async fn close_logged(key: &PoolKey, database: SharedDatabase) {
    if let Err(err) = database.close().await {
        warn!(target: "bridge.pool", key = %key, error = %err, "pool_close_failed");
    }
}
