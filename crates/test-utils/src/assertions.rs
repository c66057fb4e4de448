//! Polling assertions for async tests.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep};

/// Default polling interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls a condition until it returns true or the timeout expires.
///
/// Returns `true` if the condition held before the timeout. Use instead of
/// fixed sleeps when the timing of a state change is not deterministic.
///
/// # Example
///
/// ```no_run
/// use std::{sync::{Arc, atomic::{AtomicBool, Ordering}}, time::Duration};
/// use meshlink_test_utils::assert_eventually;
///
/// # async fn example() {
/// let ready = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&ready);
/// tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });
///
/// assert!(assert_eventually(Duration::from_millis(200), || ready.load(Ordering::SeqCst)).await);
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }

    condition()
}

/// Like [`assert_eventually`], for conditions that must await (an RPC, a dial).
pub async fn assert_eventually_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }

    condition().await
}
