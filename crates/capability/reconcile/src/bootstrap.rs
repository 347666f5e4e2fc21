//! 启动引导
//!
//! 1. 读取租户目录（失败则按轮询间隔重试，直到成功或收到关闭信号）
//! 2. 各租户并发、相互隔离地引导：
//!    获取租户库 → 建立代理连接 → 列出活跃基站
//!    - 没有活跃基站：断开代理连接，不登记
//!    - 否则发布传感器清单、订阅每个基站 topic，登记到 TenantRegistry
//! 3. 全部租户完成后启动定时对账

use crate::error::ReconcileError;
use crate::polling::PollingService;
use crate::registry::{TenantHandle, TenantRegistry};
use crate::sensor_sync::announce_sensor_sets;
use bridge_broker::{BrokerFactory, TenantBroker};
use bridge_storage::{PoolManager, TenantDirectory, list_active_devices, list_active_sensors};
use bridge_telemetry::{record_subscribe_failure, record_subscribe_success};
use domain::Tenant;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 单个租户的引导结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantBootstrap {
    Registered { subscribed: usize, failed: usize },
    /// 没有活跃基站，代理连接已断开。
    NoDevices,
}

#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub registered: Vec<String>,
    pub without_devices: Vec<String>,
    /// (租户, 原因)
    pub failed: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct Bootstrapper {
    directory: Arc<dyn TenantDirectory>,
    pools: Arc<PoolManager>,
    factory: Arc<dyn BrokerFactory>,
    registry: Arc<TenantRegistry>,
    directory_retry: Duration,
}

impl Bootstrapper {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        pools: Arc<PoolManager>,
        factory: Arc<dyn BrokerFactory>,
        registry: Arc<TenantRegistry>,
        directory_retry: Duration,
    ) -> Self {
        Self {
            directory,
            pools,
            factory,
            registry,
            directory_retry,
        }
    }

    /// 引导全部租户后启动对账；在读到租户目录之前收到关闭信号则返回 None。
    pub async fn run(
        &self,
        polling: &Arc<PollingService>,
        shutdown: &CancellationToken,
    ) -> Option<BootstrapReport> {
        let tenants = self.load_tenants(shutdown).await?;
        let report = self.bootstrap_tenants(tenants).await;
        info!(
            target: "bridge.bootstrap",
            registered = report.registered.len(),
            without_devices = report.without_devices.len(),
            failed = report.failed.len(),
            "bootstrap_completed"
        );
        polling.start();
        Some(report)
    }

    async fn load_tenants(&self, shutdown: &CancellationToken) -> Option<Vec<Tenant>> {
        loop {
            match self.directory.list_tenants().await {
                Ok(tenants) => return Some(tenants),
                Err(err) => {
                    error!(
                        target: "bridge.bootstrap",
                        error = %err,
                        retry_secs = self.directory_retry.as_secs(),
                        "tenant_directory_unavailable"
                    );
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.directory_retry) => {}
            }
        }
    }

    /// 并发引导，等待全部完成。
    pub async fn bootstrap_tenants(&self, tenants: Vec<Tenant>) -> BootstrapReport {
        let mut tasks = JoinSet::new();
        for tenant in tenants {
            let bootstrapper = self.clone();
            tasks.spawn(async move {
                let result = bootstrapper.bootstrap_tenant(&tenant).await;
                (tenant.name, result)
            });
        }

        let mut report = BootstrapReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(TenantBootstrap::Registered { .. }))) => report.registered.push(name),
                Ok((name, Ok(TenantBootstrap::NoDevices))) => report.without_devices.push(name),
                Ok((name, Err(err))) => {
                    error!(target: "bridge.bootstrap", tenant = %name, error = %err, "tenant_bootstrap_failed");
                    report.failed.push((name, err.to_string()));
                }
                Err(err) => {
                    error!(target: "bridge.bootstrap", error = %err, "tenant_bootstrap_panicked");
                }
            }
        }
        report.registered.sort();
        report.without_devices.sort();
        report
    }

    pub async fn bootstrap_tenant(&self, tenant: &Tenant) -> Result<TenantBootstrap, ReconcileError> {
        let database = self.pools.acquire(&tenant.database).await?;
        let broker = self.factory.connect(tenant, database.clone()).await?;

        let devices = match list_active_devices(database.as_ref()).await {
            Ok(devices) => devices,
            Err(err) => {
                broker.disconnect().await;
                return Err(err.into());
            }
        };
        if devices.is_empty() {
            info!(target: "bridge.bootstrap", tenant = %tenant.name, "tenant_without_devices");
            broker.disconnect().await;
            return Ok(TenantBootstrap::NoDevices);
        }

        // 工厂返回时连接可能仍在 Connecting；保留发布不排队，先等 CONNACK
        if !broker.wait_connected().await {
            warn!(target: "bridge.bootstrap", tenant = %tenant.name, "broker_not_connected");
        }

        let handle = TenantHandle::new(tenant.clone(), broker);
        match list_active_sensors(database.as_ref()).await {
            Ok(sensors) => {
                announce_sensor_sets(&handle, &devices, &sensors).await;
            }
            Err(err) => warn!(
                target: "bridge.bootstrap",
                tenant = %tenant.name,
                error = %err,
                "sensor_listing_failed"
            ),
        }

        let mut subscribed = 0;
        let mut failed = 0;
        for device in &devices {
            let topic = tenant.device_topic(&device.serial);
            match handle.broker().subscribe(&topic).await {
                Ok(_) => {
                    handle.record_live(&topic);
                    record_subscribe_success();
                    subscribed += 1;
                }
                Err(err) => {
                    record_subscribe_failure();
                    warn!(
                        target: "bridge.bootstrap",
                        tenant = %tenant.name,
                        topic = %topic,
                        error = %err,
                        "topic_subscribe_failed"
                    );
                    failed += 1;
                }
            }
        }

        self.registry.register(handle);
        info!(
            target: "bridge.bootstrap",
            tenant = %tenant.name,
            devices = devices.len(),
            subscribed,
            failed,
            "tenant_registered"
        );
        Ok(TenantBootstrap::Registered { subscribed, failed })
    }
}
