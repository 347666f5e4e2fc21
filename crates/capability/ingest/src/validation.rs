//! 上报字段格式校验。

/// 序列号需以整数开头，且不是 `unknown`。
pub fn is_valid_serial_number(serial: &str) -> bool {
    if serial == "unknown" {
        return false;
    }
    let trimmed = serial.trim_start();
    let unsigned = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    unsigned.chars().next().is_some_and(|ch| ch.is_ascii_digit())
}

/// `-?数字[.数字]`，允许末尾单独的小数点。
pub fn is_valid_temperature(temperature: &str) -> bool {
    let unsigned = temperature.strip_prefix('-').unwrap_or(temperature);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };
    is_digits(whole) && fraction.chars().all(|ch| ch.is_ascii_digit())
}

/// `YYYY/MM/DD HH:MM:SS`。
pub fn is_valid_timestamp(timestamp: &str) -> bool {
    let bytes = timestamp.as_bytes();
    if bytes.len() != 19 {
        return false;
    }
    bytes.iter().enumerate().all(|(index, byte)| match index {
        4 | 7 => *byte == b'/',
        10 => *byte == b' ',
        13 | 16 => *byte == b':',
        _ => byte.is_ascii_digit(),
    })
}

/// `数字.数字`。
pub fn is_valid_humidity(humidity: &str) -> bool {
    match humidity.split_once('.') {
        Some((whole, fraction)) => is_digits(whole) && is_digits(fraction),
        None => false,
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}
