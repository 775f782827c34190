use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep, timeout};

/// Repeatedly runs `probe` until it yields `Some`, or `limit` elapses.
///
/// The first probe runs immediately, later ones every `interval`. Each probe
/// is bounded by the time left, so a hung probe cannot push the loop past its
/// deadline. A final probe runs at the deadline, bounded by one `interval`.
pub async fn poll_until<T, F, Fut>(interval: Duration, limit: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = if remaining.is_zero() { interval } else { remaining };
        let outcome = timeout(budget, probe()).await.ok().flatten();
        if outcome.is_some() {
            return outcome;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        sleep(interval.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let counter = calls.clone();
        let out = poll_until(Duration::from_secs(1), Duration::from_secs(10), || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { (n == 3).then_some(n) }
        })
        .await;

        assert_eq!(out, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline() {
        let start = Instant::now();
        let out: Option<()> =
            poll_until(Duration::from_secs(2), Duration::from_secs(5), || async { None }).await;
        assert!(out.is_none());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_is_bounded() {
        let start = Instant::now();
        let out: Option<()> = poll_until(Duration::from_secs(1), Duration::from_secs(3), || async {
            sleep(Duration::from_secs(60)).await;
            Some(())
        })
        .await;
        assert!(out.is_none());
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
