#![allow(dead_code)]

use async_trait::async_trait;
use bridge_broker::{
    BrokerError, BrokerFactory, SharedBroker, SubscribeStatus, TenantBroker, TransportError,
};
use bridge_reconcile::{TenantHandle, TenantRegistry};
use bridge_storage::{
    DirectoryError, InMemoryConnector, InMemoryStore, PoolManager, PoolSettings, PooledDatabase,
    SharedDatabase, StorageError, TenantDirectory,
};
use domain::{DatabaseTarget, Tenant};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};

// 与 BrokerSettings 默认的请求超时一致。
const CONNECT_WAIT: Duration = Duration::from_secs(30);

/// 记录调用的代理连接替身。
pub struct FakeBroker {
    tenant: String,
    connected: watch::Sender<bool>,
    disconnected: AtomicBool,
    calls: Mutex<Vec<String>>,
    failing_topics: Mutex<HashSet<String>>,
    database: Mutex<String>,
}

impl FakeBroker {
    pub fn new(tenant: &str, database: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            connected: watch::Sender::new(true),
            disconnected: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            failing_topics: Mutex::new(HashSet::new()),
            database: Mutex::new(database.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn database_name(&self) -> String {
        self.database.lock().unwrap().clone()
    }

    fn check(&self, topic: &str) -> Result<(), BrokerError> {
        if self.failing_topics.lock().unwrap().contains(topic) {
            return Err(BrokerError::Subscription {
                topic: topic.to_string(),
                source: TransportError("refused".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TenantBroker for FakeBroker {
    fn tenant(&self) -> &str {
        &self.tenant
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn wait_connected(&self) -> bool {
        let mut connected = self.connected.subscribe();
        matches!(
            tokio::time::timeout(CONNECT_WAIT, connected.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        )
    }

    async fn subscribe(&self, topic: &str) -> Result<SubscribeStatus, BrokerError> {
        self.calls.lock().unwrap().push(format!("subscribe {topic}"));
        self.check(topic)?;
        Ok(SubscribeStatus::Subscribed)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.calls.lock().unwrap().push(format!("unsubscribe {topic}"));
        self.check(topic)
    }

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        let body: String = String::from_utf8(payload)
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        self.calls.lock().unwrap().push(format!("publish {topic} {body}"));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.connected.send_replace(false);
    }

    fn set_database(&self, database: SharedDatabase) {
        *self.database.lock().unwrap() = database.database_name().to_string();
    }
}

#[derive(Default)]
pub struct FakeBrokerFactory {
    brokers: Mutex<HashMap<String, Arc<FakeBroker>>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
}

impl FakeBrokerFactory {
    pub fn broker(&self, tenant: &str) -> Arc<FakeBroker> {
        self.brokers.lock().unwrap()[tenant].clone()
    }

    pub fn fail_tenant(&self, tenant: &str) {
        self.failing.lock().unwrap().insert(tenant.to_string());
    }

    /// 之后建立的连接停在 Connecting，永不连上。
    pub fn start_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// 之后建立的连接先处于 Connecting，经过 `delay` 后才收到 CONNACK。
    pub fn connect_after(&self, delay: Duration) {
        self.start_offline();
        *self.connect_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl BrokerFactory for FakeBrokerFactory {
    async fn connect(
        &self,
        tenant: &Tenant,
        database: SharedDatabase,
    ) -> Result<SharedBroker, BrokerError> {
        if self.failing.lock().unwrap().contains(&tenant.name) {
            return Err(BrokerError::Connection("broker unreachable".to_string()));
        }
        let broker = Arc::new(FakeBroker::new(&tenant.name, database.database_name()));
        if self.offline.load(Ordering::SeqCst) {
            broker.set_connected(false);
            if let Some(delay) = *self.connect_delay.lock().unwrap() {
                let broker = broker.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    broker.set_connected(true);
                });
            }
        }
        self.brokers
            .lock()
            .unwrap()
            .insert(tenant.name.clone(), broker.clone());
        Ok(broker)
    }
}

/// 可阻塞、可失败的租户目录。
pub struct GatedDirectory {
    tenants: Mutex<Vec<Tenant>>,
    failures: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: AtomicUsize,
}

impl GatedDirectory {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants: Mutex::new(tenants),
            failures: AtomicUsize::new(0),
            gate: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_tenants(&self, tenants: Vec<Tenant>) {
        *self.tenants.lock().unwrap() = tenants;
    }

    pub fn fail_next(&self, times: usize) {
        self.failures.store(times, Ordering::SeqCst);
    }

    /// 之后的 list_tenants 都要先拿到一个许可。
    pub fn close_gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantDirectory for GatedDirectory {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate open");
            permit.forget();
        }
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(DirectoryError::Tenants(StorageError::Query(
                "directory offline".to_string(),
            )));
        }
        Ok(self.tenants.lock().unwrap().clone())
    }
}

pub fn tenant(name: &str) -> Tenant {
    Tenant::new(
        name,
        DatabaseTarget::new("db.local", format!("{name}_db"), name, "secret"),
        name,
    )
}

pub struct World {
    pub connector: Arc<InMemoryConnector>,
    pub pools: Arc<PoolManager>,
    pub factory: Arc<FakeBrokerFactory>,
    pub registry: Arc<TenantRegistry>,
    pub directory: Arc<GatedDirectory>,
}

impl World {
    pub fn new() -> Self {
        let connector = Arc::new(InMemoryConnector::new());
        connector.register("main_db");
        let pools = Arc::new(PoolManager::new(
            connector.clone(),
            DatabaseTarget::new("db.local", "main_db", "bridge", "secret"),
            PoolSettings::default(),
        ));
        Self {
            connector,
            pools,
            factory: Arc::new(FakeBrokerFactory::default()),
            registry: Arc::new(TenantRegistry::new()),
            directory: Arc::new(GatedDirectory::new(Vec::new())),
        }
    }

    /// 注册租户库并加入目录。
    pub fn add_tenant(&self, name: &str) -> Arc<InMemoryStore> {
        let store = self.connector.register(&format!("{name}_db"));
        let mut tenants = self.directory.tenants.lock().unwrap();
        tenants.push(tenant(name));
        store
    }

    /// 直接登记一个租户（跳过引导）。
    pub fn register(&self, name: &str) -> Arc<FakeBroker> {
        let broker = Arc::new(FakeBroker::new(name, &format!("{name}_db")));
        self.registry
            .register(TenantHandle::new(tenant(name), broker.clone()));
        broker
    }
}
