//! Reusable rendering sessions keyed by navigation target

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::RenderSession;

/// Held for the whole configure, scroll and capture sequence on a session.
pub type SessionLock = Arc<tokio::sync::Mutex<()>>;

struct SessionEntry {
    session: Arc<dyn RenderSession>,
    lock: SessionLock,
    last_accessed: Instant,
}

/// Maps a URL to at most one navigated session.
///
/// The map lock is only held for bookkeeping; sessions are always closed
/// after their entry has been removed and the lock released.
pub struct SessionCache {
    entries: Mutex<HashMap<String, SessionEntry>>,
    inactivity_timeout: Duration,
}

impl SessionCache {
    pub fn new(inactivity_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inactivity_timeout,
        }
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout
    }

    /// Look up the session for `url`, refreshing its last-accessed time.
    pub fn get(&self, url: &str) -> Option<Arc<dyn RenderSession>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(url)?;
        entry.last_accessed = Instant::now();
        Some(entry.session.clone())
    }

    /// Like [`get`](Self::get), also returning the session's use lock.
    pub fn checkout(&self, url: &str) -> Option<(Arc<dyn RenderSession>, SessionLock)> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(url)?;
        entry.last_accessed = Instant::now();
        Some((entry.session.clone(), entry.lock.clone()))
    }

    /// Whether `url` still maps to exactly `session`.
    pub fn is_current(&self, url: &str, session: &Arc<dyn RenderSession>) -> bool {
        self.entries
            .lock()
            .get(url)
            .map(|entry| Arc::ptr_eq(&entry.session, session))
            .unwrap_or(false)
    }

    /// Insert a session, overwriting any prior entry for `url`.
    ///
    /// Returns the displaced session, if any, so the caller can close it.
    pub fn put(&self, url: &str, session: Arc<dyn RenderSession>) -> Option<Arc<dyn RenderSession>> {
        self.put_with_lock(url, session, SessionLock::default())
    }

    /// Insert a session guarded by `lock`. A caller already holding the lock
    /// keeps exclusive use of the session once it becomes visible.
    pub fn put_with_lock(
        &self,
        url: &str,
        session: Arc<dyn RenderSession>,
        lock: SessionLock,
    ) -> Option<Arc<dyn RenderSession>> {
        let entry = SessionEntry {
            session,
            lock,
            last_accessed: Instant::now(),
        };
        self.entries
            .lock()
            .insert(url.to_string(), entry)
            .map(|previous| previous.session)
    }

    /// Remove the entry for `url` and close its session.
    ///
    /// Close failures are logged; the entry is gone either way.
    pub async fn evict(&self, url: &str) -> bool {
        let removed = self.entries.lock().remove(url);
        match removed {
            Some(entry) => {
                close_session(url, &*entry.session).await;
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `url` only if it still holds `session`.
    ///
    /// Used after a failed capture: a concurrent request may already have
    /// replaced the failed session with a healthy one.
    pub fn remove_if_same(&self, url: &str, session: &Arc<dyn RenderSession>) -> bool {
        let mut entries = self.entries.lock();
        let same = entries
            .get(url)
            .map(|entry| Arc::ptr_eq(&entry.session, session))
            .unwrap_or(false);
        if same {
            entries.remove(url);
        }
        same
    }

    /// Close every session idle for longer than the inactivity timeout.
    /// Sessions in use by a capture are left for a later sweep.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, SessionEntry)> = {
            let mut entries = self.entries.lock();
            let urls: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_accessed) > self.inactivity_timeout)
                .filter(|(_, entry)| entry.lock.try_lock().is_ok())
                .map(|(url, _)| url.clone())
                .collect();
            urls.into_iter()
                .filter_map(|url| entries.remove(&url).map(|entry| (url, entry)))
                .collect()
        };

        for (url, entry) in &expired {
            info!("Closing inactive session for: {}", url);
            close_session(url, &*entry.session).await;
        }
        expired.len()
    }

    /// Remove every entry, returning the sessions for the caller to close.
    pub fn drain(&self) -> Vec<(String, Arc<dyn RenderSession>)> {
        self.entries
            .lock()
            .drain()
            .map(|(url, entry)| (url, entry.session))
            .collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Close a session, logging rather than propagating failures.
pub(crate) async fn close_session(url: &str, session: &dyn RenderSession) {
    if let Err(e) = session.close().await {
        warn!("Error closing session for {}: {}", url, e);
    }
}
