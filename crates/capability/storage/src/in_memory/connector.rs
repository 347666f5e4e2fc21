//! DatabaseConnector 的内存实现
//!
//! 按库名注册 InMemoryStore；`fail_next` 让指定库接下来的 N 次建连失败。
//! 记录每次成功建出的连接，便于测试检查关闭与重建。

use super::database::InMemoryDatabase;
use super::store::InMemoryStore;
use crate::error::StorageError;
use crate::traits::{DatabaseConnector, PooledDatabase, SharedDatabase};
use async_trait::async_trait;
use domain::DatabaseTarget;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
pub struct InMemoryConnector {
    stores: Mutex<HashMap<String, Arc<InMemoryStore>>>,
    failures: Mutex<HashMap<String, u32>>,
    connections: Mutex<Vec<Arc<InMemoryDatabase>>>,
    attempts: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个库，返回其数据以便继续写入种子数据。
    pub fn register(&self, database: &str) -> Arc<InMemoryStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores
            .entry(database.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::new()))
            .clone()
    }

    pub fn fail_next(&self, database: &str, times: u32) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.insert(database.to_string(), times);
    }

    /// 建连尝试次数（含失败）。
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 指定库已建出的全部连接，按建立顺序。
    pub fn connections(&self, database: &str) -> Vec<Arc<InMemoryDatabase>> {
        let connections = self.connections.lock().unwrap_or_else(PoisonError::into_inner);
        connections
            .iter()
            .filter(|connection| connection.database_name() == database)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DatabaseConnector for InMemoryConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<SharedDatabase, StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(remaining) = failures.get_mut(&target.database) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StorageError::Connect(format!(
                        "scripted failure for {}",
                        target.database
                    )));
                }
            }
        }
        let store = {
            let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
            stores.get(&target.database).cloned()
        };
        let Some(store) = store else {
            return Err(StorageError::Connect(format!(
                "unknown database {}",
                target.database
            )));
        };
        let connection = Arc::new(InMemoryDatabase::new(target.database.clone(), store));
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&connection));
        Ok(connection)
    }
}
