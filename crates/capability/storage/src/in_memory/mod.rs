//! 内存存储实现模块
//!
//! 仅用于测试和本地演示，行为与 Postgres 实现保持一致。
//!
//! 包含以下实现：
//! - InMemoryStore：一个库的数据（租户目录或租户表）
//! - InMemoryDatabase：PooledDatabase 的内存实现
//! - InMemoryConnector：DatabaseConnector 的内存实现，支持脚本化建连失败

pub mod connector;
pub mod database;
pub mod store;

pub use connector::*;
pub use database::*;
pub use store::*;
