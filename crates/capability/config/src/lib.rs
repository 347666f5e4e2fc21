//! 应用运行配置加载。

use domain::DatabaseTarget;
use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// MQTT 代理地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    /// 解析 `tcp://host:port`、`mqtt://host:port` 或 `host[:port]`，端口缺省 1883。
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid("MQTTBROKER".to_string(), value.to_string());
        let trimmed = value.trim();
        let rest = trimmed
            .strip_prefix("tcp://")
            .or_else(|| trimmed.strip_prefix("mqtt://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');
        if rest.is_empty() || rest.contains("://") {
            return Err(invalid());
        }
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (rest, 1883),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 主库（租户目录）坐标。
    pub directory_database: DatabaseTarget,
    pub broker: BrokerEndpoint,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_keep_alive_seconds: u64,
    pub poll_interval_seconds: u64,
    pub pool_idle_seconds: u64,
    pub health_probe_seconds: u64,
    pub broker_watchdog_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_seconds: u64,
    pub reconnect_period_ms: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。缺失的必填项会一次性全部报出。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let db_host = read_required(&["DB_SERVER", "SERVER"], &mut missing);
        let db_name = read_required(&["DB_NAME", "DATABASE"], &mut missing);
        let db_user = read_required(&["DB_USER"], &mut missing);
        let db_password = read_required(&["DB_PASSWORD", "PASSWORD"], &mut missing);
        let broker = read_required(&["MQTTBROKER"], &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing.join(", ")));
        }

        let broker = BrokerEndpoint::parse(&broker)?;
        let mqtt_username = read_optional("MQTT_USERNAME");
        let mqtt_password = read_optional("MQTT_PASSWORD");
        let mqtt_keep_alive_seconds = read_u64_with_default("BRIDGE_MQTT_KEEP_ALIVE_SECONDS", 60)?;
        let poll_interval_seconds = read_u64_with_default("BRIDGE_POLL_INTERVAL_SECONDS", 60)?;
        let pool_idle_seconds = read_u64_with_default("BRIDGE_POOL_IDLE_SECONDS", 15 * 60)?;
        let health_probe_seconds = read_u64_with_default("BRIDGE_HEALTH_PROBE_SECONDS", 5 * 60)?;
        let broker_watchdog_seconds =
            read_u64_with_default("BRIDGE_BROKER_WATCHDOG_SECONDS", 5 * 60)?;
        let retry_attempts = read_u32_with_default("BRIDGE_RETRY_ATTEMPTS", 3)?;
        let retry_delay_ms = read_u64_with_default("BRIDGE_RETRY_DELAY_MS", 5000)?;
        let request_timeout_seconds = read_u64_with_default("BRIDGE_REQUEST_TIMEOUT_SECONDS", 30)?;
        let reconnect_period_ms = read_u64_with_default("BRIDGE_RECONNECT_PERIOD_MS", 5000)?;

        if poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "BRIDGE_POLL_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }
        if retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "BRIDGE_RETRY_ATTEMPTS".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            directory_database: DatabaseTarget::new(db_host, db_name, db_user, db_password),
            broker,
            mqtt_username,
            mqtt_password,
            mqtt_keep_alive_seconds,
            poll_interval_seconds,
            pool_idle_seconds,
            health_probe_seconds,
            broker_watchdog_seconds,
            retry_attempts,
            retry_delay_ms,
            request_timeout_seconds,
            reconnect_period_ms,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_seconds)
    }

    pub fn health_probe_interval(&self) -> Duration {
        Duration::from_secs(self.health_probe_seconds)
    }

    pub fn broker_watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.broker_watchdog_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn reconnect_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_period_ms)
    }
}

/// 按顺序读取首个非空的候选变量；全部缺失时记入 `missing`。
fn read_required(keys: &[&str], missing: &mut Vec<String>) -> String {
    for key in keys {
        if let Some(value) = read_optional(key) {
            return value;
        }
    }
    missing.push(keys.join("|"));
    String::new()
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::BrokerEndpoint;

    #[test]
    fn broker_endpoint_accepts_scheme_and_bare_host() {
        let endpoint = BrokerEndpoint::parse("tcp://10.0.0.5:1884").expect("endpoint");
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 1884);

        let endpoint = BrokerEndpoint::parse("broker.local").expect("endpoint");
        assert_eq!(endpoint.host, "broker.local");
        assert_eq!(endpoint.port, 1883);
    }

    #[test]
    fn broker_endpoint_rejects_garbage() {
        assert!(BrokerEndpoint::parse("").is_err());
        assert!(BrokerEndpoint::parse("tcp://host:notaport").is_err());
        assert!(BrokerEndpoint::parse("ws://host:80").is_err());
    }
}
