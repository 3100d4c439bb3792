//! Remote HTTP source.
//!
//! Fetches `$ref` targets over HTTP(S) with an injected blocking client.
//! Requests are coalesced per URI like the local variant, capped per
//! host, and retried once on transient failure. Non-2xx responses are
//! per-URI errors.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::source::{FileBytes, FileSource, WaiterTable};

/// Pause before the single retry of a transient failure.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// How long a host-slot waiter sleeps between cancellation polls.
const HOST_WAIT_SLICE: Duration = Duration::from_millis(25);

/// Configuration for a [`RemoteSource`].
#[derive(Debug, Clone)]
pub struct RemoteSourceConfig {
    /// Base URL for resolving relative references.
    pub base_url: Option<Url>,
    /// Maximum in-flight requests per host.
    pub per_host_limit: usize,
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            per_host_limit: 4,
        }
    }
}

/// Serves `$ref` targets over HTTP(S).
pub struct RemoteSource {
    client: reqwest::blocking::Client,
    base_url: Option<Url>,
    per_host_limit: usize,
    in_flight: Mutex<HashMap<String, usize>>,
    host_freed: Condvar,
    waiters: WaiterTable,
}

impl RemoteSource {
    /// Build a source with a default client.
    pub fn new(config: RemoteSourceConfig) -> Self {
        Self::with_client(config, reqwest::blocking::Client::new())
    }

    /// Build a source around an injected client, so callers control
    /// timeouts, proxies, and TLS.
    pub fn with_client(config: RemoteSourceConfig, client: reqwest::blocking::Client) -> Self {
        Self {
            client,
            base_url: config.base_url,
            per_host_limit: config.per_host_limit.max(1),
            in_flight: Mutex::new(HashMap::new()),
            host_freed: Condvar::new(),
            waiters: WaiterTable::new(),
        }
    }

    /// Resolve `uri` to an absolute URL, against the base URL when the
    /// reference is relative.
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` when the reference cannot form an absolute
    /// URL.
    fn resolve(&self, uri: &str) -> Result<Url, Error> {
        if let Ok(url) = Url::parse(uri) {
            return Ok(url);
        }
        match &self.base_url {
            Some(base) => base.join(uri).map_err(|e| Error::Fetch {
                uri: uri.to_string(),
                reason: format!("cannot resolve against base url: {e}"),
            }),
            None => Err(Error::Fetch {
                uri: uri.to_string(),
                reason: "relative reference with no base url".to_string(),
            }),
        }
    }

    /// Take a per-host slot, blocking while the host is saturated.
    fn acquire_host(&self, host: &str, cancel: &CancelToken) -> Result<HostSlot<'_>, Error> {
        let mut in_flight = self.in_flight.lock();
        loop {
            let count = in_flight.entry(host.to_string()).or_insert(0);
            if *count < self.per_host_limit {
                *count += 1;
                return Ok(HostSlot {
                    source: self,
                    host: host.to_string(),
                });
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let _ = self.host_freed.wait_for(&mut in_flight, HOST_WAIT_SLICE);
        }
    }

    /// One GET with a single retry on transport failure or 5xx.
    fn fetch(&self, url: &Url, cancel: &CancelToken) -> Result<FileBytes, Error> {
        let host = url.host_str().unwrap_or_default().to_string();
        let _slot = self.acquire_host(&host, cancel)?;

        let mut last_reason = String::new();
        for attempt in 0..2 {
            cancel.ensure_live()?;
            if attempt > 0 {
                debug!(url = %url, "retrying transient failure");
                std::thread::sleep(RETRY_DELAY);
            }

            match self.client.get(url.clone()).send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().map_err(|e| Error::Fetch {
                            uri: url.to_string(),
                            reason: format!("failed reading body: {e}"),
                        })?;
                        return Ok(FileBytes::new(bytes.to_vec()));
                    }
                    last_reason = format!("status {status}");
                    if !status.is_server_error() {
                        // Client errors will not improve on retry.
                        break;
                    }
                }
                Err(e) => {
                    last_reason = e.to_string();
                }
            }
        }

        warn!(url = %url, reason = %last_reason, "remote fetch failed");
        Err(Error::Fetch {
            uri: url.to_string(),
            reason: last_reason,
        })
    }
}

impl FileSource for RemoteSource {
    fn open(&self, uri: &str, cancel: &CancelToken) -> Result<FileBytes, Error> {
        cancel.ensure_live()?;
        let url = self.resolve(uri)?;
        self.waiters
            .fetch_coalesced(url.as_str(), cancel, || self.fetch(&url, cancel))
    }
}

/// Releases a per-host slot on drop, waking one parked acquirer.
struct HostSlot<'a> {
    source: &'a RemoteSource,
    host: String,
}

impl Drop for HostSlot<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.source.in_flight.lock();
        if let Some(count) = in_flight.get_mut(&self.host) {
            *count = count.saturating_sub(1);
        }
        self.source.host_freed.notify_all();
    }
}
