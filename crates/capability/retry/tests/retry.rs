use bridge_retry::{RetryPolicy, with_retries};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn succeeds_on_third_attempt() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let started = tokio::time::Instant::now();
    let result: Result<u32, String> = with_retries("flaky", RetryPolicy::default(), || async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 3 { Err(format!("attempt {n} failed")) } else { Ok(n) }
    })
    .await;

    assert_eq!(result, Ok(3));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    // 两次固定 5s 间隔。
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn returns_last_error_after_budget() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::new(3, Duration::from_millis(10));
    let result: Result<(), String> = with_retries("always_down", policy, || async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(format!("down {n}"))
    })
    .await;

    assert_eq!(result, Err("down 3".to_string()));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn zero_attempts_is_clamped_to_one() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
}
