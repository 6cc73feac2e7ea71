//! Best-effort concurrent fan-out.
//!
//! Applies an async function to every item on its own Tokio task and keeps
//! only the successful results. Failed and panicked items are logged and
//! dropped; the batch never aborts. Output order is completion order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Fan-out executor with an optional concurrency bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    max_in_flight: Option<usize>,
}

impl FanOut {
    /// One task per item, all at once.
    pub const fn unbounded() -> Self {
        Self {
            max_in_flight: None,
        }
    }

    /// At most `max` items in flight. Zero is treated as one.
    pub fn with_max_in_flight(max: usize) -> Self {
        Self {
            max_in_flight: Some(max.max(1)),
        }
    }

    /// The configured bound, if any.
    pub const fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight
    }

    /// Run `f` over `items`, collecting successful results.
    pub async fn run<T, R, E, F, Fut>(&self, items: impl IntoIterator<Item = T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        let limiter = self.max_in_flight.map(|max| Arc::new(Semaphore::new(max)));
        let mut set = JoinSet::new();

        for item in items {
            let f = f.clone();
            let limiter = limiter.clone();
            set.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                f(item).await
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => debug!(error = %e, "fan-out item failed, dropping it"),
                Err(e) if e.is_panic() => warn!("fan-out item panicked, dropping it"),
                Err(e) => debug!(error = %e, "fan-out item cancelled"),
            }
        }
        results
    }
}

/// Run `f` over `items` with no concurrency bound.
///
/// Shorthand for [`FanOut::unbounded`]`().run(items, f)`.
pub async fn process_async<T, R, E, F, Fut>(items: impl IntoIterator<Item = T>, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    E: fmt::Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    FanOut::unbounded().run(items, f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_collects_all_successes() {
        let mut doubled = process_async(1..=5, |n: u32| async move { Ok::<_, String>(n * 2) }).await;
        doubled.sort_unstable();
        assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn test_failures_are_dropped() {
        let emails = vec!["alice", "unknown", "bob"];
        let mut resolved = process_async(emails, |id: &'static str| async move {
            if id == "unknown" {
                Err(format!("no principal {id}"))
            } else {
                Ok(format!("user:{id}@example.com"))
            }
        })
        .await;
        resolved.sort();

        assert_eq!(resolved, vec!["user:alice@example.com", "user:bob@example.com"]);
    }

    #[tokio::test]
    async fn test_panics_are_dropped() {
        let results = process_async(vec![1_u32, 2, 3], |n| async move {
            assert!(n != 2, "bad item");
            Ok::<_, String>(n)
        })
        .await;

        assert_eq!(results.len(), 2);
        assert!(!results.contains(&2));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u32> =
            process_async(Vec::<u32>::new(), |n| async move { Ok::<_, String>(n) }).await;
        assert!(results.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bound_is_respected() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let fan_out = FanOut::with_max_in_flight(2);
        assert_eq!(fan_out.max_in_flight(), Some(2));

        let (c, p) = (current.clone(), peak.clone());
        let results = fan_out
            .run(0..10_u32, move |n| {
                let current = c.clone();
                let peak = p.clone();
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(n)
                }
            })
            .await;

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_zero_bound_means_one() {
        assert_eq!(FanOut::with_max_in_flight(0).max_in_flight(), Some(1));
        assert_eq!(FanOut::default(), FanOut::unbounded());
    }
}
