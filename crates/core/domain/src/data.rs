/// 基站（网关设备），未软删除即为活跃。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub device_type: Option<String>,
}

impl Device {
    pub fn new(serial: impl Into<String>, device_type: Option<&str>) -> Self {
        Self {
            serial: serial.into(),
            device_type: device_type.map(str::to_string),
        }
    }
}

/// 传感器，与同类型的基站关联。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub serial: i64,
    pub sensor_type: Option<String>,
}

impl Sensor {
    pub fn new(serial: i64, sensor_type: Option<&str>) -> Self {
        Self {
            serial,
            sensor_type: sensor_type.map(str::to_string),
        }
    }
}

/// 校验通过、待入库的一条传感器读数。
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub sensor_serial: String,
    pub temperature: f64,
    /// 设备上报格式：`YYYY/MM/DD HH:MM:SS`。
    pub logged_at: String,
    pub battery: Option<f64>,
    pub rssi: Option<i32>,
    pub snr: Option<f64>,
    pub humidity: Option<f64>,
}
