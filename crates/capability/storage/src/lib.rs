//! # Bridge Storage 模块
//!
//! 本模块提供主库（租户目录）与各租户库的池化访问。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：PooledDatabase / DatabaseConnector / TenantDirectory
//! 2. **错误处理层** (`error.rs`)：StorageError / ConnectionError / DirectoryError
//! 3. **连接管理层** (`connection.rs`)：Postgres 连接池建立
//! 4. **池管理层** (`pool.rs`)：按键复用、空闲回收、主库健康探测
//! 5. **目录层** (`directory.rs`)：活跃基站/传感器列表与类型关联
//! 6. **实现层**：
//!    - `in_memory/`：内存实现（测试与本地演示）
//!    - `postgres/`：PostgreSQL 实现（生产环境）
//!
//! ## 核心特性
//!
//! - **每键至多一个连接**：同一 (host, database) 在任意时刻只有一个活跃连接对象
//! - **访问即续期**：每次 acquire 都重置 15 分钟空闲回收计时
//! - **有界重试**：建连失败固定间隔重试 3 次后返回 ConnectionError
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use bridge_storage::{PgConnector, PoolManager, PoolSettings};
//! use std::sync::Arc;
//!
//! let connector = Arc::new(PgConnector::new(Duration::from_secs(30)));
//! let pools = Arc::new(PoolManager::new(connector, main_target, PoolSettings::default()));
//! let _probe = pools.spawn_health_probe();
//! let database = pools.acquire(&tenant.database).await?;
//! let devices = bridge_storage::list_active_devices(database.as_ref()).await?;
//! ```

pub mod connection;
pub mod directory;
pub mod error;
pub mod in_memory;
pub mod pool;
pub mod postgres;
pub mod traits;

pub use connection::{PgConnector, connect_pool};
pub use directory::{
    PooledTenantDirectory, compute_associations, list_active_devices, list_active_sensors,
    sensor_is_active,
};
pub use error::{ConnectionError, DirectoryError, StorageError};
pub use in_memory::{InMemoryConnector, InMemoryDatabase, InMemoryStore};
pub use pool::{PoolKey, PoolManager, PoolSettings};
pub use postgres::PgDatabase;
pub use traits::{DatabaseConnector, PooledDatabase, SharedDatabase, TenantDirectory};
