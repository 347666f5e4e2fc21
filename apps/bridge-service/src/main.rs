//! MQTT → 租户数据库桥接服务。
//!
//! 启动顺序：配置 → 日志 → 主库连接池与健康探测 → 引导全部租户 → 定时对账。
//! 收到 SIGTERM / Ctrl-C 后：停止对账并等待在途一轮结束 → 断开全部代理连接 → 关闭全部连接池。

use bridge_broker::{BrokerSettings, MqttBrokerConfig, MqttBrokerFactory};
use bridge_config::AppConfig;
use bridge_ingest::ReadingIngestor;
use bridge_reconcile::{Bootstrapper, PollingService, TenantRegistry};
use bridge_retry::RetryPolicy;
use bridge_storage::{PgConnector, PoolManager, PoolSettings, PooledTenantDirectory};
use bridge_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// 等待引导任务在关闭信号后收尾的上限。
const BOOTSTRAP_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 初始化结构化日志
    init_tracing();

    // 从环境变量加载运行配置；缺失或非法是唯一会让进程退出的错误
    let config = AppConfig::from_env()
        .inspect_err(|err| error!(target: "bridge.service", error = %err, "config_invalid"))?;
    info!(
        target: "bridge.service",
        directory = %config.directory_database.database,
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        poll_interval_secs = config.poll_interval_seconds,
        "bridge_starting"
    );

    let retry = RetryPolicy::new(config.retry_attempts, config.retry_delay());

    // 连接池：主库 + 按需建立的租户库
    let pools = Arc::new(PoolManager::new(
        Arc::new(PgConnector::new(config.request_timeout())),
        config.directory_database.clone(),
        PoolSettings {
            idle_timeout: config.pool_idle_timeout(),
            health_probe_interval: config.health_probe_interval(),
            retry,
        },
    ));
    let health_probe = pools.spawn_health_probe();
    let directory = Arc::new(PooledTenantDirectory::new(Arc::clone(&pools)));

    // 每租户一个 MQTT 连接，报文交给读数入库处理器
    let factory = Arc::new(MqttBrokerFactory::new(
        MqttBrokerConfig {
            host: config.broker.host.clone(),
            port: config.broker.port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            keep_alive: Duration::from_secs(config.mqtt_keep_alive_seconds),
            settings: BrokerSettings {
                request_timeout: config.request_timeout(),
                reconnect_period: config.reconnect_period(),
                watchdog_interval: config.broker_watchdog_interval(),
                reconnect_retry: retry,
                ..BrokerSettings::default()
            },
        },
        Arc::new(ReadingIngestor::new(retry)),
    ));

    let registry = Arc::new(TenantRegistry::new());
    let polling = Arc::new(PollingService::new(
        directory.clone(),
        Arc::clone(&pools),
        Arc::clone(&registry),
        config.poll_interval(),
    ));
    let bootstrapper = Bootstrapper::new(
        directory,
        Arc::clone(&pools),
        factory,
        Arc::clone(&registry),
        config.poll_interval(),
    );

    let shutdown = CancellationToken::new();
    let mut bootstrap = tokio::spawn({
        let polling = Arc::clone(&polling);
        let shutdown = shutdown.clone();
        async move { bootstrapper.run(&polling, &shutdown).await }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        joined = &mut bootstrap => {
            if let Err(err) = joined {
                error!(target: "bridge.service", error = %err, "bootstrap_task_failed");
            }
            shutdown_signal().await;
        }
    }

    info!(target: "bridge.service", "bridge_stopping");
    shutdown.cancel();
    if !bootstrap.is_finished()
        && tokio::time::timeout(BOOTSTRAP_GRACE, &mut bootstrap)
            .await
            .is_err()
    {
        warn!(target: "bridge.service", "bootstrap_aborted");
        bootstrap.abort();
    }

    polling.shutdown().await;
    registry.disconnect_all().await;
    pools.shutdown().await;
    if let Err(err) = health_probe.await {
        warn!(target: "bridge.service", error = %err, "health_probe_join_failed");
    }

    let snapshot = metrics().snapshot();
    info!(target: "bridge.service", metrics = ?snapshot, "bridge_stopped");
    Ok(())
}

/// 等待 SIGTERM 或 Ctrl-C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "bridge.service", error = %err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target: "bridge.service", error = %err, "sigterm_listener_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "bridge.service", signal = "SIGINT", "shutdown_signal_received"),
        _ = terminate => info!(target: "bridge.service", signal = "SIGTERM", "shutdown_signal_received"),
    }
}
