//! 追踪初始化、对账运行 ID 与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub tenant_pass_failures: u64,
    pub subscribe_success: u64,
    pub subscribe_failure: u64,
    pub unsubscribe_success: u64,
    pub unsubscribe_failure: u64,
    pub sensor_details_published: u64,
    pub sensor_details_failed: u64,
    pub pools_created: u64,
    pub pools_evicted: u64,
    pub messages_received: u64,
    pub messages_persisted: u64,
    pub messages_dropped: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    passes_started: AtomicU64,
    passes_completed: AtomicU64,
    passes_skipped: AtomicU64,
    tenant_pass_failures: AtomicU64,
    subscribe_success: AtomicU64,
    subscribe_failure: AtomicU64,
    unsubscribe_success: AtomicU64,
    unsubscribe_failure: AtomicU64,
    sensor_details_published: AtomicU64,
    sensor_details_failed: AtomicU64,
    pools_created: AtomicU64,
    pools_evicted: AtomicU64,
    messages_received: AtomicU64,
    messages_persisted: AtomicU64,
    messages_dropped: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            passes_started: AtomicU64::new(0),
            passes_completed: AtomicU64::new(0),
            passes_skipped: AtomicU64::new(0),
            tenant_pass_failures: AtomicU64::new(0),
            subscribe_success: AtomicU64::new(0),
            subscribe_failure: AtomicU64::new(0),
            unsubscribe_success: AtomicU64::new(0),
            unsubscribe_failure: AtomicU64::new(0),
            sensor_details_published: AtomicU64::new(0),
            sensor_details_failed: AtomicU64::new(0),
            pools_created: AtomicU64::new(0),
            pools_evicted: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_persisted: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes_started: self.passes_started.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            tenant_pass_failures: self.tenant_pass_failures.load(Ordering::Relaxed),
            subscribe_success: self.subscribe_success.load(Ordering::Relaxed),
            subscribe_failure: self.subscribe_failure.load(Ordering::Relaxed),
            unsubscribe_success: self.unsubscribe_success.load(Ordering::Relaxed),
            unsubscribe_failure: self.unsubscribe_failure.load(Ordering::Relaxed),
            sensor_details_published: self.sensor_details_published.load(Ordering::Relaxed),
            sensor_details_failed: self.sensor_details_failed.load(Ordering::Relaxed),
            pools_created: self.pools_created.load(Ordering::Relaxed),
            pools_evicted: self.pools_evicted.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_persisted: self.messages_persisted.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成一次对账运行的 run_id。
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn record_pass_started() {
    metrics().passes_started.fetch_add(1, Ordering::Relaxed);
}

pub fn record_pass_completed() {
    metrics().passes_completed.fetch_add(1, Ordering::Relaxed);
}

/// 记录因上一轮未结束而跳过的 tick。
pub fn record_pass_skipped() {
    metrics().passes_skipped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_tenant_pass_failure() {
    metrics().tenant_pass_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_subscribe_success() {
    metrics().subscribe_success.fetch_add(1, Ordering::Relaxed);
}

pub fn record_subscribe_failure() {
    metrics().subscribe_failure.fetch_add(1, Ordering::Relaxed);
}

pub fn record_unsubscribe_success() {
    metrics().unsubscribe_success.fetch_add(1, Ordering::Relaxed);
}

pub fn record_unsubscribe_failure() {
    metrics().unsubscribe_failure.fetch_add(1, Ordering::Relaxed);
}

pub fn record_sensor_details_published() {
    metrics()
        .sensor_details_published
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_sensor_details_failed() {
    metrics().sensor_details_failed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_pool_created() {
    metrics().pools_created.fetch_add(1, Ordering::Relaxed);
}

pub fn record_pool_evicted() {
    metrics().pools_evicted.fetch_add(1, Ordering::Relaxed);
}

pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

pub fn record_message_persisted() {
    metrics().messages_persisted.fetch_add(1, Ordering::Relaxed);
}

/// 记录校验失败、重复或非数据 topic 被丢弃的报文。
pub fn record_message_dropped() {
    metrics().messages_dropped.fetch_add(1, Ordering::Relaxed);
}
