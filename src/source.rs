//! The file-source contract shared by the local and remote variants,
//! and the waiter cell that coalesces concurrent fetches of one URI.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cancel::CancelToken;
use crate::error::Error;

/// Fetched file content, shared between every caller that asked for it.
pub type FileBytes = Arc<Vec<u8>>;

/// A fetchable byte store for one URI scheme family.
///
/// Implementations must uphold the coalescing contract: for any URI, at
/// most one underlying fetch is in flight across all concurrent callers,
/// and every caller observes the same `(bytes, error)` outcome.
pub trait FileSource: Send + Sync {
    /// Fetch the bytes behind `uri`, blocking until they are available,
    /// the fetch fails, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` for per-URI failures, `Error::Cancelled`
    /// when the token fires, and scheme-specific gate errors.
    fn open(&self, uri: &str, cancel: &CancelToken) -> Result<FileBytes, Error>;
}

/// How long a waiter sleeps between cancellation polls.
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// A per-URI synchronization cell. The first caller becomes the fetcher;
/// everyone else parks on the condvar until the result lands. A waiter
/// that cancels withdraws alone; the fetch and the remaining waiters are
/// unaffected.
struct Waiter {
    done: Mutex<Option<Result<FileBytes, Error>>>,
    cv: Condvar,
}

impl Waiter {
    fn new() -> Self {
        Self {
            done: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn complete(&self, result: Result<FileBytes, Error>) {
        *self.done.lock() = Some(result);
        self.cv.notify_all();
    }

    /// Duplicate the stored outcome for one caller.
    fn observe(&self, uri: &str) -> Option<Result<FileBytes, Error>> {
        let done = self.done.lock();
        done.as_ref().map(|result| match result {
            Ok(bytes) => Ok(Arc::clone(bytes)),
            Err(e) => Err(e.duplicate_for_waiter(uri)),
        })
    }

    fn wait(&self, uri: &str, cancel: &CancelToken) -> Result<FileBytes, Error> {
        let mut done = self.done.lock();
        loop {
            if let Some(result) = done.as_ref() {
                return match result {
                    Ok(bytes) => Ok(Arc::clone(bytes)),
                    Err(e) => Err(e.duplicate_for_waiter(uri)),
                };
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let _ = self.cv.wait_for(&mut done, WAIT_SLICE);
        }
    }
}

/// Per-URI waiter cells plus the completed-fetch cache. One table per
/// file source.
pub(crate) struct WaiterTable {
    cells: Mutex<HashMap<String, Arc<Waiter>>>,
}

impl WaiterTable {
    pub(crate) fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Run `fetch` for `uri` unless another caller already is (or did), in
    /// which case block on the shared waiter and observe that caller's
    /// result. Completed cells stay in the table, so later opens are
    /// cache hits.
    pub(crate) fn fetch_coalesced<F>(
        &self,
        uri: &str,
        cancel: &CancelToken,
        fetch: F,
    ) -> Result<FileBytes, Error>
    where
        F: FnOnce() -> Result<FileBytes, Error>,
    {
        let (cell, fetcher) = {
            let mut cells = self.cells.lock();
            match cells.get(uri) {
                Some(cell) => (Arc::clone(cell), false),
                None => {
                    let cell = Arc::new(Waiter::new());
                    cells.insert(uri.to_string(), Arc::clone(&cell));
                    (cell, true)
                }
            }
        };

        if !fetcher {
            // Already resolved or in flight elsewhere.
            if let Some(result) = cell.observe(uri) {
                return result;
            }
            return cell.wait(uri, cancel);
        }

        let result = fetch();
        let duplicate = match &result {
            Ok(bytes) => Ok(Arc::clone(bytes)),
            Err(e) => Err(e.duplicate_for_waiter(uri)),
        };
        cell.complete(result);
        duplicate
    }

    /// Pre-seed a URI with already-loaded bytes (directory-walk results).
    pub(crate) fn seed(&self, uri: &str, bytes: FileBytes) {
        let cell = Arc::new(Waiter::new());
        cell.complete(Ok(bytes));
        self.cells.lock().insert(uri.to_string(), cell);
    }
}
