//! Pull-based iteration over a live store cursor.
//!
//! An [`Iter`] is either active or done. It becomes done when the cursor is
//! exhausted, when a document fails to decode, or when the deadline passes;
//! after that `next` returns `None` without touching the cursor.
//!
//! `done`, `err` and `timed_out` may be called from another task while a
//! `next` is in flight. State is kept behind one read-write lock, and the
//! helpers that write it take the lock themselves so no write ever happens
//! while a read guard is held.

use std::fmt;
use std::time::Duration;

use bson::Document;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{QueryError, QueryResult};
use crate::store::StoreCursor;
use crate::timeout::Deadline;

#[derive(Debug, Default)]
struct IterState {
    done: bool,
    err: Option<QueryError>,
    timed_out: bool,
}

/// A cursor over query results.
pub struct Iter {
    collection: String,
    cursor: Mutex<Option<Box<dyn StoreCursor>>>,
    state: RwLock<IterState>,
    timeout: Option<Duration>,
    fallback: Option<Duration>,
}

impl fmt::Debug for Iter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Iter")
            .field("collection", &self.collection)
            .field("done", &state.done)
            .field("err", &state.err)
            .field("timed_out", &state.timed_out)
            .finish()
    }
}

impl Iter {
    /// Wrap an open cursor.
    ///
    /// Each `next` gets its own deadline, resolved from `timeout` and then
    /// `fallback`; `all` resolves one for the whole drain.
    pub fn new(
        collection: impl Into<String>,
        cursor: Box<dyn StoreCursor>,
        timeout: Option<Duration>,
        fallback: Option<Duration>,
    ) -> Self {
        Self {
            collection: collection.into(),
            cursor: Mutex::new(Some(cursor)),
            state: RwLock::new(IterState::default()),
            timeout,
            fallback,
        }
    }

    /// Whether iteration has finished.
    pub fn done(&self) -> bool {
        self.state.read().done
    }

    /// The error that ended iteration, if any.
    pub fn err(&self) -> Option<QueryError> {
        self.state.read().err.clone()
    }

    /// Whether iteration ended because the deadline passed.
    pub fn timed_out(&self) -> bool {
        self.state.read().timed_out
    }

    /// Decode the next document into `T`.
    ///
    /// Returns `None` once iteration is done; check [`Iter::err`] to tell
    /// exhaustion from failure.
    pub async fn next<T>(&self) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let document = self.next_document().await?;
        match bson::from_document(document) {
            Ok(value) => Some(value),
            Err(err) => {
                self.set_error(err.into());
                None
            }
        }
    }

    /// Fetch the next raw document.
    pub async fn next_document(&self) -> Option<Document> {
        if self.done() {
            return None;
        }

        let deadline = Deadline::resolve(self.timeout, self.fallback);
        let outcome = {
            let mut guard = self.cursor.lock().await;
            let Some(cursor) = guard.as_mut() else {
                self.set_done();
                return None;
            };
            match deadline.run(cursor.advance()).await {
                Ok(true) => cursor.current().map(Some).map_err(QueryError::from),
                Ok(false) => Ok(None),
                Err(err) => Err(err),
            }
        };

        if deadline.is_elapsed() || outcome.as_ref().is_err_and(QueryError::is_timeout) {
            self.set_timed_out();
            return None;
        }

        match outcome {
            Ok(Some(document)) => Some(document),
            Ok(None) => {
                self.set_done();
                None
            }
            Err(err) => {
                self.set_error(err);
                None
            }
        }
    }

    /// Decode every remaining document, then close the cursor.
    ///
    /// The whole drain runs under a single deadline resolved now, not one
    /// per document.
    pub async fn all<T>(&self) -> QueryResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.all_within(Deadline::resolve(self.timeout, self.fallback))
            .await
    }

    /// Drain the cursor under `deadline`, then close it.
    pub(crate) async fn all_within<T>(&self, deadline: Deadline) -> QueryResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let drained = if self.done() {
            Ok(Vec::new())
        } else {
            let mut guard = self.cursor.lock().await;
            match guard.as_mut() {
                Some(cursor) => deadline.run(cursor.drain()).await,
                None => Ok(Vec::new()),
            }
        };

        let decoded = match drained {
            Err(err) if err.is_timeout() || deadline.is_elapsed() => {
                self.set_timed_out();
                Vec::new()
            }
            Err(err) => {
                self.set_error(err);
                Vec::new()
            }
            Ok(documents) => documents
                .into_iter()
                .map(|document| bson::from_document(document).map_err(QueryError::from))
                .collect::<QueryResult<Vec<T>>>()
                .unwrap_or_else(|err| {
                    self.set_error(err);
                    Vec::new()
                }),
        };

        let closed = self.close().await;
        if let Some(err) = self.err() {
            return Err(err);
        }
        closed?;
        Ok(decoded)
    }

    /// Release the cursor. Calling this more than once is harmless.
    pub async fn close(&self) -> QueryResult<()> {
        let taken = self.cursor.lock().await.take();
        self.set_done();
        match taken {
            Some(mut cursor) => cursor.close().await.map_err(QueryError::from),
            None => Ok(()),
        }
    }

    fn set_done(&self) {
        self.state.write().done = true;
    }

    fn set_error(&self, err: QueryError) {
        debug!(collection = %self.collection, error = %err, "iteration failed");
        let mut state = self.state.write();
        state.done = true;
        state.err = Some(err);
    }

    fn set_timed_out(&self) {
        warn!(collection = %self.collection, "iteration timed out");
        let mut state = self.state.write();
        state.done = true;
        state.timed_out = true;
        state.err = Some(QueryError::TimeoutOccurred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::options::FindOptions;
    use crate::store::Store;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Enemy {
        name: String,
    }

    async fn open(store: &MemoryStore, timeout: Option<Duration>) -> Iter {
        for name in ["Joker", "Penguin"] {
            store
                .insert_one("enemies", doc! { "name": name }, Default::default())
                .await
                .unwrap();
        }
        let cursor = store
            .find("enemies", doc! {}, FindOptions::default())
            .await
            .unwrap();
        Iter::new("enemies", cursor, timeout, None)
    }

    #[tokio::test]
    async fn test_iterates_until_exhausted() {
        let store = MemoryStore::new("gotham");
        let iter = open(&store, None).await;

        let first: Enemy = iter.next().await.unwrap();
        assert_eq!(first.name, "Joker");
        assert!(!iter.done());
        assert_eq!(iter.next::<Enemy>().await.unwrap().name, "Penguin");
        assert!(iter.next::<Enemy>().await.is_none());
        assert!(iter.done());
        assert!(iter.err().is_none());
        assert!(!iter.timed_out());
    }

    #[tokio::test]
    async fn test_decode_failure_finishes_with_error() {
        #[derive(Debug, Deserialize)]
        struct Numbered {
            #[allow(dead_code)]
            number: i64,
        }

        let store = MemoryStore::new("gotham");
        let iter = open(&store, None).await;
        assert!(iter.next::<Numbered>().await.is_none());
        assert!(iter.done());
        assert!(iter.err().is_some());
        assert!(iter.next_document().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = MemoryStore::new("gotham");
        let iter = open(&store, None).await;
        iter.close().await.unwrap();
        iter.close().await.unwrap();
        assert!(iter.done());
        assert_eq!(store.cursors_closed(), 1);
        assert!(iter.next_document().await.is_none());
    }

    #[tokio::test]
    async fn test_all_drains_and_closes() {
        let store = MemoryStore::new("gotham");
        let iter = open(&store, None).await;
        let enemies: Vec<Enemy> = iter.all().await.unwrap();
        assert_eq!(enemies.len(), 2);
        assert_eq!(store.cursors_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_advance_times_out() {
        let store = MemoryStore::new("gotham");
        open(&store, None).await.close().await.unwrap();
        store.set_latency(Some(Duration::from_secs(1)));
        let cursor = store
            .find("enemies", doc! {}, FindOptions::default())
            .await
            .unwrap();
        let slow = Iter::new("enemies", cursor, Some(Duration::from_millis(50)), None);

        assert!(slow.next::<Enemy>().await.is_none());
        assert!(slow.timed_out());
        assert!(slow.err().is_some_and(|err| err.is_timeout()));
        let err = slow.all::<Enemy>().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_bounded_by_one_deadline() {
        let store = MemoryStore::new("gotham");
        let iter = open(&store, Some(Duration::from_millis(50))).await;
        store.set_latency(Some(Duration::from_millis(40)));

        let err = iter.all::<Enemy>().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(iter.timed_out());
        assert!(iter.done());
        assert_eq!(store.cursors_closed(), 1);
    }

    #[tokio::test]
    async fn test_all_after_partial_next_returns_rest() {
        let store = MemoryStore::new("gotham");
        let iter = open(&store, None).await;
        let first: Enemy = iter.next().await.unwrap();
        assert_eq!(first.name, "Joker");
        let rest: Vec<Enemy> = iter.all().await.unwrap();
        assert_eq!(rest, vec![Enemy { name: "Penguin".into() }]);
    }

    #[tokio::test]
    async fn test_state_readable_from_another_task() {
        let store = MemoryStore::new("gotham");
        let iter = Arc::new(open(&store, None).await);
        let reader = {
            let iter = Arc::clone(&iter);
            tokio::spawn(async move { (iter.done(), iter.err().is_none()) })
        };
        while iter.next_document().await.is_some() {}
        let (_, clean) = reader.await.unwrap();
        assert!(clean);
        assert!(iter.done());
    }
}
