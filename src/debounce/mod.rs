//! Per-requester coalescing of inline queries.
//!
//! Every event registers itself as the requester's single pending wait and
//! cancels whichever wait held that slot before. A wait that survives its
//! settle window dispatches; one that gets cancelled returns without touching
//! anything. The slot stays claimed while the dispatched work runs, so a newer
//! event also abandons work that is already in flight and the requester only
//! ever gets the answer to its latest query.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::models::{InlineQuery, QueryShape};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Debounced<T> {
    /// The event settled and its work completed.
    Dispatched(T),
    /// A newer event from the same requester took over.
    Superseded,
    /// The coordinator was shut down first.
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleWindows {
    /// First page of a free-text search, where the user is likely still typing.
    pub search: Duration,
    /// Everything else.
    pub quick: Duration,
}

impl SettleWindows {
    pub fn new(search: Duration, quick: Duration) -> Self {
        Self { search, quick }
    }

    pub fn for_query(&self, query: &InlineQuery) -> Duration {
        match query.shape() {
            QueryShape::Search if !query.is_continuation() => self.search,
            _ => self.quick,
        }
    }
}

struct PendingWait {
    ticket: u64,
    supersede: CancellationToken,
}

pub struct Debouncer<K> {
    waits: Mutex<HashMap<K, PendingWait>>,
    tickets: AtomicU64,
    release: CancellationToken,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Cancelling `release` resolves every pending wait as [`Debounced::Released`].
    pub fn new(release: CancellationToken) -> Self {
        Self {
            waits: Mutex::new(HashMap::new()),
            tickets: AtomicU64::new(0),
            release,
        }
    }

    /// Waits out `settle` on behalf of `requester`, then runs `dispatch`
    /// unless a newer event for the same requester arrived in the meantime.
    ///
    /// Errors from `dispatch` are returned as they are.
    pub async fn run<F, Fut, T, E>(
        &self,
        requester: K,
        settle: Duration,
        dispatch: F,
    ) -> Result<Debounced<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (ticket, supersede) = self.register(&requester);
        let _guard = WaitGuard {
            debouncer: self,
            requester: &requester,
            ticket,
        };

        tokio::select! {
            biased;
            _ = supersede.cancelled() => return Ok(self.abandoned(&requester, ticket, "pending")),
            _ = tokio::time::sleep(settle) => {}
        }

        debug!("Dispatching event {} for {:?}", ticket, requester);

        tokio::select! {
            biased;
            _ = supersede.cancelled() => Ok(self.abandoned(&requester, ticket, "in-flight")),
            result = dispatch() => result.map(Debounced::Dispatched),
        }
    }

    /// Number of requesters with a live wait.
    pub fn pending(&self) -> usize {
        self.waits.lock().len()
    }

    fn register(&self, requester: &K) -> (u64, CancellationToken) {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let supersede = self.release.child_token();

        let mut waits = self.waits.lock();
        let previous = waits.insert(
            requester.clone(),
            PendingWait {
                ticket,
                supersede: supersede.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.supersede.cancel();
        }

        (ticket, supersede)
    }

    fn finish(&self, requester: &K, ticket: u64) {
        let mut waits = self.waits.lock();
        if waits.get(requester).map_or(false, |wait| wait.ticket == ticket) {
            waits.remove(requester);
        }
    }

    fn abandoned<T>(&self, requester: &K, ticket: u64, stage: &str) -> Debounced<T> {
        if self.release.is_cancelled() {
            debug!("Released {} event {} for {:?}", stage, ticket, requester);
            Debounced::Released
        } else {
            debug!("Discarded {} event {} for {:?}", stage, ticket, requester);
            Debounced::Superseded
        }
    }
}

/// Clears the requester's slot on every exit path, including the caller
/// dropping the `run` future, unless a newer wait already owns it.
struct WaitGuard<'a, K>
where
    K: Eq + Hash + Clone + Debug,
{
    debouncer: &'a Debouncer<K>,
    requester: &'a K,
    ticket: u64,
}

impl<K> Drop for WaitGuard<'_, K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        self.debouncer.finish(self.requester, self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Arc;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    const SETTLE: Duration = Duration::from_millis(1500);

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn event(
        debouncer: &Arc<Debouncer<String>>,
        log: &Log,
        requester: &str,
        text: &'static str,
        work: Duration,
    ) -> JoinHandle<Result<Debounced<&'static str>, Infallible>> {
        let debouncer = Arc::clone(debouncer);
        let log = Arc::clone(log);
        let requester = requester.to_string();

        tokio::spawn(async move {
            debouncer
                .run(requester, SETTLE, move || async move {
                    sleep(work).await;
                    log.lock().push(text);
                    Ok::<_, Infallible>(text)
                })
                .await
        })
    }

    fn setup() -> (Arc<Debouncer<String>>, Log, CancellationToken) {
        let release = CancellationToken::new();
        let debouncer = Arc::new(Debouncer::new(release.clone()));
        (debouncer, Arc::new(Mutex::new(Vec::new())), release)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_dispatches_only_the_last_event() {
        let (debouncer, log, _release) = setup();

        let a = event(&debouncer, &log, "u1", "p", Duration::ZERO);
        sleep(Duration::from_millis(100)).await;
        let b = event(&debouncer, &log, "u1", "po", Duration::ZERO);
        sleep(Duration::from_millis(100)).await;
        let c = event(&debouncer, &log, "u1", "pon", Duration::ZERO);

        assert_eq!(a.await.unwrap().unwrap(), Debounced::Superseded);
        assert_eq!(b.await.unwrap().unwrap(), Debounced::Superseded);
        assert_eq!(c.await.unwrap().unwrap(), Debounced::Dispatched("pon"));
        assert_eq!(*log.lock(), vec!["pon"]);
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_events_each_dispatch() {
        let (debouncer, log, _release) = setup();

        let mut handles = Vec::new();
        for text in ["a", "b", "c"] {
            handles.push(event(&debouncer, &log, "u1", text, Duration::ZERO));
            sleep(SETTLE + Duration::from_millis(100)).await;
        }

        for (handle, text) in handles.into_iter().zip(["a", "b", "c"]) {
            assert_eq!(handle.await.unwrap().unwrap(), Debounced::Dispatched(text));
        }
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_event_abandons_in_flight_work() {
        let (debouncer, log, _release) = setup();
        let work = Duration::from_secs(1);

        // "pon" settles at 1600ms and is still working when "pony" lands at 2000ms
        let po = event(&debouncer, &log, "u1", "po", work);
        sleep(Duration::from_millis(100)).await;
        let pon = event(&debouncer, &log, "u1", "pon", work);
        sleep(Duration::from_millis(1900)).await;
        let pony = event(&debouncer, &log, "u1", "pony", work);

        assert_eq!(po.await.unwrap().unwrap(), Debounced::Superseded);
        assert_eq!(pon.await.unwrap().unwrap(), Debounced::Superseded);
        assert_eq!(pony.await.unwrap().unwrap(), Debounced::Dispatched("pony"));
        assert_eq!(*log.lock(), vec!["pony"]);
    }

    #[tokio::test(start_paused = true)]
    async fn requesters_do_not_coalesce_with_each_other() {
        let (debouncer, log, _release) = setup();

        let first = event(&debouncer, &log, "u1", "one", Duration::ZERO);
        let second = event(&debouncer, &log, "u2", "two", Duration::ZERO);

        assert_eq!(first.await.unwrap().unwrap(), Debounced::Dispatched("one"));
        assert_eq!(second.await.unwrap().unwrap(), Debounced::Dispatched("two"));
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_pending_waits_without_dispatch() {
        let (debouncer, log, release) = setup();

        let pending = event(&debouncer, &log, "u1", "pony", Duration::ZERO);
        sleep(Duration::from_millis(100)).await;
        release.cancel();

        assert_eq!(pending.await.unwrap().unwrap(), Debounced::Released);
        assert!(log.lock().is_empty());
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_errors_reach_the_caller() {
        let (debouncer, _log, _release) = setup();

        let result: Result<Debounced<()>, String> = debouncer
            .run("u1".to_string(), SETTLE, || async { Err("upstream down".to_string()) })
            .await;

        assert_eq!(result, Err("upstream down".to_string()));
        assert_eq!(debouncer.pending(), 0);
    }

    #[test]
    fn cheap_shapes_get_the_quick_window() {
        let windows = SettleWindows::new(SETTLE, Duration::from_millis(200));

        assert_eq!(windows.for_query(&InlineQuery::new("1", "pony", "")), SETTLE);
        assert_eq!(
            windows.for_query(&InlineQuery::new("1", "pony", "2")),
            Duration::from_millis(200)
        );
        assert_eq!(
            windows.for_query(&InlineQuery::new("1", "", "")),
            Duration::from_millis(200)
        );
        assert_eq!(
            windows.for_query(&InlineQuery::new("1", "https://derpibooru.org/images/1", "")),
            Duration::from_millis(200)
        );
    }
}
