//! 数据库连接管理
//!
//! 提供 Postgres 连接池初始化功能：
//! - connect_pool：按 DatabaseTarget 建立 Postgres 连接池
//! - PgConnector：DatabaseConnector 的 Postgres 实现
//!
//! 设计原则：
//! - 每个池最大连接数 10，最小 0，空闲连接 30 秒回收
//! - 建连与请求都受固定超时约束（默认 30 秒）
//! - 使用 PgConnectOptions 传递凭据，口令无需 URL 转义

use crate::error::StorageError;
use crate::postgres::PgDatabase;
use crate::traits::{DatabaseConnector, SharedDatabase};
use async_trait::async_trait;
use domain::DatabaseTarget;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PG_PORT: u16 = 5432;

/// 建立 Postgres 连接池
///
/// # 参数
/// - `target`：主机（可带端口）、库名与凭据
/// - `timeout`：建连超时
pub async fn connect_pool(target: &DatabaseTarget, timeout: Duration) -> Result<PgPool, StorageError> {
    let (host, port) = target.host_and_port();
    let options = PgConnectOptions::new()
        .host(host)
        .port(port.unwrap_or(DEFAULT_PG_PORT))
        .username(&target.user)
        .password(&target.password)
        .database(&target.database);
    let connect = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(0)
        .idle_timeout(Duration::from_secs(30))
        .acquire_timeout(timeout)
        .connect_with(options);
    match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result.map_err(|err| StorageError::Connect(err.to_string())),
        Err(_) => Err(StorageError::Timeout(timeout)),
    }
}

/// Postgres 连接器。
#[derive(Debug, Clone)]
pub struct PgConnector {
    request_timeout: Duration,
}

impl PgConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl DatabaseConnector for PgConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<SharedDatabase, StorageError> {
        let pool = connect_pool(target, self.request_timeout).await?;
        Ok(Arc::new(PgDatabase::new(
            pool,
            target.database.clone(),
            self.request_timeout,
        )))
    }
}
