//! 固定间隔的有界重试（无指数退避）。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// 重试策略：总尝试次数与两次尝试之间的固定间隔。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// 执行 `operation`，失败后按策略重试，返回首次成功结果或最后一次错误。
pub async fn with_retries<T, E, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => {
                error!(
                    target: "bridge.retry",
                    operation = operation_name,
                    attempts = attempts,
                    error = %err,
                    "retry_exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                warn!(
                    target: "bridge.retry",
                    operation = operation_name,
                    attempt = attempt,
                    attempts = attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "retry_attempt_failed"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
        }
    }
}
