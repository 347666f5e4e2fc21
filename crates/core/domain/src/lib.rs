pub mod data;

pub use data::{Device, Sensor, SensorReading};

/// 租户数据库坐标（主机、库名、凭据）。
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DatabaseTarget {
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// 拆分 `host[:port]`，端口缺省或非法时返回 None。
    pub fn host_and_port(&self) -> (&str, Option<u16>) {
        match self.host.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => (host, Some(port)),
                Err(_) => (self.host.as_str(), None),
            },
            None => (self.host.as_str(), None),
        }
    }
}

impl std::fmt::Debug for DatabaseTarget {
    // 口令不进日志。
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// 租户（公司）：独立的数据库与 topic 命名空间，按 name 唯一。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub name: String,
    pub database: DatabaseTarget,
    pub topic_prefix: String,
}

impl Tenant {
    pub fn new(
        name: impl Into<String>,
        database: DatabaseTarget,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            database,
            topic_prefix: topic_prefix.into(),
        }
    }

    /// 设备订阅 topic：`{prefix}/{serial}/#`。
    pub fn device_topic(&self, device_serial: &str) -> String {
        format!("{}/{}/#", self.prefix(), device_serial)
    }

    /// 传感器清单 topic：`{prefix}/{serial}/sensordetails`。
    pub fn sensor_details_topic(&self, device_serial: &str) -> String {
        format!("{}/{}/sensordetails", self.prefix(), device_serial)
    }

    fn prefix(&self) -> &str {
        self.topic_prefix.trim_end_matches('/')
    }
}
