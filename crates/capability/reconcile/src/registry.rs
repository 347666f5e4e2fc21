//! 租户登记表
//!
//! 引导成功的租户在此登记：代理连接、已订阅 topic 集合、传感器清单缓存。
//! 只有引导与对账路径写入，报文接入路径只读数据库句柄。

use bridge_broker::{SensorSetCache, SharedBroker, TenantBroker};
use domain::Tenant;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::info;

pub struct TenantHandle {
    tenant: RwLock<Tenant>,
    broker: SharedBroker,
    live_topics: Mutex<BTreeSet<String>>,
    sensor_cache: Mutex<SensorSetCache>,
}

impl TenantHandle {
    pub fn new(tenant: Tenant, broker: SharedBroker) -> Self {
        Self {
            tenant: RwLock::new(tenant),
            broker,
            live_topics: Mutex::new(BTreeSet::new()),
            sensor_cache: Mutex::new(SensorSetCache::new()),
        }
    }

    /// 本轮对账使用的租户信息。
    pub fn tenant(&self) -> Tenant {
        self.tenant
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_tenant(&self, tenant: Tenant) {
        *self.tenant.write().unwrap_or_else(PoisonError::into_inner) = tenant;
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    /// 当前已订阅 topic（对外可观察的订阅状态）。
    pub fn live_topics(&self) -> BTreeSet<String> {
        lock(&self.live_topics).clone()
    }

    pub fn record_live(&self, topic: &str) {
        lock(&self.live_topics).insert(topic.to_string());
    }

    pub fn forget_live(&self, topic: &str) {
        lock(&self.live_topics).remove(topic);
    }

    pub(crate) fn sensor_cache(&self) -> MutexGuard<'_, SensorSetCache> {
        lock(&self.sensor_cache)
    }

    pub fn sensor_snapshot(&self, device_serial: &str) -> Option<Vec<i64>> {
        self.sensor_cache().snapshot(device_serial)
    }
}

#[derive(Default)]
pub struct TenantRegistry {
    tenants: RwLock<BTreeMap<String, Arc<TenantHandle>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: TenantHandle) -> Arc<TenantHandle> {
        let handle = Arc::new(handle);
        let name = handle.tenant().name;
        self.tenants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, name: &str) -> Option<Arc<TenantHandle>> {
        self.tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn handles(&self) -> Vec<Arc<TenantHandle>> {
        self.tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 依次断开所有租户的代理连接。
    pub async fn disconnect_all(&self) {
        for handle in self.handles() {
            let tenant = handle.tenant().name;
            handle.broker().disconnect().await;
            info!(target: "bridge.service", tenant = %tenant, "tenant_broker_closed");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
