//! 定时对账
//!
//! - 单一定时器（默认 60 秒），首次立即执行
//! - 同一时刻至多一轮在执行：上一轮未结束时的 tick 直接丢弃并告警，不排队
//! - `shutdown` 停止定时器并等待在途的一轮结束，之后才能安全关闭连接池
//! - 每轮重新读取租户目录；目录读取失败放弃本轮，下个 tick 继续
//! - 单个租户失败只记录日志，不影响其他租户
//! - 引导之后新增的租户不会被轮询，直到下次引导（重启）

use crate::error::ReconcileError;
use crate::registry::TenantRegistry;
use crate::sensor_sync::{SensorSyncReport, announce_sensor_sets};
use crate::subscriptions::{SubscriptionReport, reconcile_subscriptions};
use bridge_broker::TenantBroker;
use bridge_storage::{
    DirectoryError, PoolManager, PooledDatabase, TenantDirectory, list_active_devices,
    list_active_sensors,
};
use bridge_telemetry::{
    new_run_id, record_pass_completed, record_pass_skipped, record_pass_started,
    record_tenant_pass_failure,
};
use domain::Tenant;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// 单个租户本轮的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantPass {
    Reconciled {
        sensors: SensorSyncReport,
        subscriptions: SubscriptionReport,
    },
    /// 未在引导时登记。
    NotRegistered,
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub run_id: String,
    pub tenants: Vec<(String, TenantPass)>,
    /// (租户, 原因)
    pub failures: Vec<(String, String)>,
}

impl PassReport {
    pub fn tenant(&self, name: &str) -> Option<&TenantPass> {
        self.tenants
            .iter()
            .find(|(tenant, _)| tenant == name)
            .map(|(_, pass)| pass)
    }
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(PassReport),
    /// 上一轮仍在执行。
    Skipped,
    /// 租户目录不可用。
    Aborted(DirectoryError),
}

pub struct PollingService {
    directory: Arc<dyn TenantDirectory>,
    pools: Arc<PoolManager>,
    registry: Arc<TenantRegistry>,
    interval: Duration,
    in_flight: AtomicBool,
    started: AtomicBool,
    timer: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    // 定时器派生的最近一轮。
    current: Mutex<Option<JoinHandle<()>>>,
}

// 本轮结束（含 panic 展开）时释放在途标记。
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PollingService {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        pools: Arc<PoolManager>,
        registry: Arc<TenantRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            pools,
            registry,
            interval,
            in_flight: AtomicBool::new(false),
            started: AtomicBool::new(false),
            timer: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// 执行一轮对账；已有一轮在执行时直接跳过。
    pub async fn run_once(&self) -> PassOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return skipped();
        }
        let _in_flight = InFlight(&self.in_flight);

        let run_id = new_run_id();
        let span = info_span!(target: "bridge.poll", "reconcile_pass", run_id = %run_id);
        self.pass(run_id).instrument(span).await
    }

    async fn pass(&self, run_id: String) -> PassOutcome {
        record_pass_started();
        info!(target: "bridge.poll", "reconcile_pass_started");

        let tenants = match self.directory.list_tenants().await {
            Ok(tenants) => tenants,
            Err(err) => {
                error!(target: "bridge.poll", error = %err, "reconcile_pass_aborted");
                return PassOutcome::Aborted(err);
            }
        };

        let mut report = PassReport {
            run_id,
            ..PassReport::default()
        };
        for tenant in tenants {
            match self.poll_tenant(&tenant).await {
                Ok(pass) => report.tenants.push((tenant.name, pass)),
                Err(err) => {
                    record_tenant_pass_failure();
                    error!(
                        target: "bridge.poll",
                        tenant = %tenant.name,
                        error = %err,
                        "tenant_pass_failed"
                    );
                    report.failures.push((tenant.name, err.to_string()));
                }
            }
        }

        record_pass_completed();
        info!(
            target: "bridge.poll",
            tenants = report.tenants.len(),
            failures = report.failures.len(),
            "reconcile_pass_completed"
        );
        PassOutcome::Completed(report)
    }

    async fn poll_tenant(&self, tenant: &Tenant) -> Result<TenantPass, ReconcileError> {
        let database = self.pools.acquire(&tenant.database).await?;
        log_current_database(tenant, database.as_ref()).await;

        let Some(handle) = self.registry.get(&tenant.name) else {
            warn!(target: "bridge.poll", tenant = %tenant.name, "tenant_not_registered");
            return Ok(TenantPass::NotRegistered);
        };
        handle.set_tenant(tenant.clone());
        handle.broker().set_database(database.clone());

        let devices = list_active_devices(database.as_ref()).await?;
        let sensors = list_active_sensors(database.as_ref()).await?;
        debug!(
            target: "bridge.poll",
            tenant = %tenant.name,
            devices = devices.len(),
            sensors = sensors.len(),
            "tenant_directory_loaded"
        );

        let sensors = announce_sensor_sets(&handle, &devices, &sensors).await;
        let subscriptions = reconcile_subscriptions(&handle, &devices).await;
        Ok(TenantPass::Reconciled {
            sensors,
            subscriptions,
        })
    }

    /// 立即执行一轮，并按间隔周期执行；每个 tick 独立任务，上一轮未结束时跳过。
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(target: "bridge.poll", "polling_already_started");
            return;
        }
        let token = CancellationToken::new();
        let service = Arc::clone(self);
        let timer_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer_token.cancelled() => break,
                    _ = ticker.tick() => service.spawn_pass(),
                }
            }
        });
        info!(
            target: "bridge.poll",
            interval_secs = self.interval.as_secs(),
            "polling_started"
        );
        *lock(&self.timer) = Some((token, handle));
    }

    fn spawn_pass(self: &Arc<Self>) {
        let mut current = lock(&self.current);
        if current.as_ref().is_some_and(|pass| !pass.is_finished()) {
            skipped();
            return;
        }
        let service = Arc::clone(self);
        *current = Some(tokio::spawn(async move {
            service.run_once().await;
        }));
    }

    /// 停止定时器。在途的一轮允许执行完毕，之后可再次 start。
    pub fn stop(&self) {
        self.halt_timer();
    }

    /// 停止定时器并等待在途的一轮结束。
    pub async fn shutdown(&self) {
        if let Some(timer) = self.halt_timer() {
            if let Err(err) = timer.await {
                warn!(target: "bridge.poll", error = %err, "polling_timer_join_failed");
            }
        }
        let pass = lock(&self.current).take();
        if let Some(pass) = pass {
            if !pass.is_finished() {
                info!(target: "bridge.poll", "waiting_for_reconcile_pass");
            }
            if let Err(err) = pass.await {
                error!(target: "bridge.poll", error = %err, "reconcile_pass_panicked");
            }
        }
    }

    fn halt_timer(&self) -> Option<JoinHandle<()>> {
        let timer = lock(&self.timer).take();
        self.started.store(false, Ordering::SeqCst);
        let (token, handle) = timer?;
        token.cancel();
        info!(target: "bridge.poll", "polling_stopped");
        Some(handle)
    }
}

fn skipped() -> PassOutcome {
    warn!(target: "bridge.poll", "reconcile_pass_skipped");
    record_pass_skipped();
    PassOutcome::Skipped
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn log_current_database(tenant: &Tenant, database: &dyn PooledDatabase) {
    match database.current_database().await {
        Ok(current) => debug!(
            target: "bridge.poll",
            tenant = %tenant.name,
            expected = %tenant.database.database,
            current = %current,
            "tenant_database_checked"
        ),
        Err(err) => warn!(
            target: "bridge.poll",
            tenant = %tenant.name,
            error = %err,
            "tenant_database_check_failed"
        ),
    }
}
