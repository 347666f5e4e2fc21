//! # PostgreSQL 存储实现模块
//!
//! 一个 `PgDatabase` 包装一个 `PgPool`，既可指向主库（租户目录），
//! 也可指向某个租户库（基站、传感器、读数）。
//!
//! ## 数据库模式要求
//!
//! ### 主库
//! - `companies`：租户表（name, db_host, db_name, db_user, db_password, mqtt_topic）
//!
//! ### 租户库
//! - `base_units`：基站表（id, serial_no, is_deleted）
//! - `base_types`：基站类型表（base_id, type, description）
//! - `sensors`：传感器表（serial_no, type, is_deleted）
//! - `sensor_data`：读数表（sensor_id, temperature, log_datetime, battery, rssi, snr, hum）
//!
//! ## 设计原则
//!
//! 1. **参数化查询**：所有 SQL 使用参数绑定
//! 2. **请求超时**：每条查询都包在固定超时内
//! 3. **软删除**：`is_deleted` 为真的行视为不存在

pub mod database;

pub use database::PgDatabase;
