//! Session Store
//!
//! Maps a [`SessionToken`] to its [`SessionState`]. A lookup miss creates a
//! blank state atomically, so two racing requests for a new token share one
//! record. The returned handle is a per-token mutex; the request handler holds
//! it for the whole round, which serialises retransmissions of one
//! conversation while different conversations proceed in parallel. A
//! retransmission that waited on the lock finds the reply already sent in
//! [`SessionState::replay`].

use super::{EndStatus, SessionState, SessionToken};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time;
use tracing::debug;

pub type SharedSession = Arc<Mutex<SessionState>>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Existing state for `token`, or a fresh blank one
    async fn load_or_blank(&self, token: &SessionToken) -> SharedSession;

    /// Record that a round finished with `status`
    async fn persist(&self, token: &SessionToken, status: EndStatus);

    async fn remove(&self, token: &SessionToken);
}

struct Entry {
    session: SharedSession,
    last_activity: Instant,
    terminal: bool,
}

impl Entry {
    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        self.terminal || now.duration_since(self.last_activity) > ttl
    }
}

/// In-process store with idle eviction.
///
/// A background task sweeps every `ttl / 4`. Finished conversations go on the
/// next sweep, idle ones once `ttl` has passed. Dropping an entry drops all
/// method state, which cancels any handshake task the conversation owned.
pub struct MemorySessionStore {
    entries: Arc<DashMap<SessionToken, Entry>>,
    ttl: Duration,
    sweeper_running: Arc<AtomicBool>,
}

impl MemorySessionStore {
    /// Must be called inside a Tokio runtime
    pub fn new(ttl: Duration) -> Self {
        Self::new_internal(ttl, true)
    }

    #[cfg(test)]
    fn new_no_background(ttl: Duration) -> Self {
        Self::new_internal(ttl, false)
    }

    fn new_internal(ttl: Duration, start_background: bool) -> Self {
        let entries: Arc<DashMap<SessionToken, Entry>> = Arc::new(DashMap::new());
        let sweeper_running = Arc::new(AtomicBool::new(start_background));

        if start_background {
            let entries = Arc::clone(&entries);
            let running = Arc::clone(&sweeper_running);
            let sweep_interval = (ttl / 4).max(Duration::from_millis(10));

            tokio::spawn(async move {
                let mut interval = time::interval(sweep_interval);
                interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

                while running.load(Ordering::Relaxed) {
                    interval.tick().await;
                    let removed = sweep(&entries, ttl);
                    if removed > 0 {
                        debug!(
                            removed = removed,
                            remaining = entries.len(),
                            "Session sweep completed"
                        );
                    }
                }

                debug!("Session sweeper stopped");
            });
        }

        MemorySessionStore {
            entries,
            ttl,
            sweeper_running,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Evict expired entries now, returns how many went
    pub fn sweep_now(&self) -> usize {
        sweep(&self.entries, self.ttl)
    }
}

fn sweep(entries: &DashMap<SessionToken, Entry>, ttl: Duration) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.expired(now, ttl));
    before.saturating_sub(entries.len())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_or_blank(&self, token: &SessionToken) -> SharedSession {
        let mut entry = self.entries.entry(token.clone()).or_insert_with(|| {
            debug!(token = %token, "New session");
            Entry {
                session: Arc::new(Mutex::new(SessionState::new())),
                last_activity: Instant::now(),
                terminal: false,
            }
        });
        entry.last_activity = Instant::now();
        Arc::clone(&entry.session)
    }

    async fn persist(&self, token: &SessionToken, status: EndStatus) {
        if let Some(mut entry) = self.entries.get_mut(token) {
            entry.last_activity = Instant::now();
            entry.terminal = status.is_terminal();
        }
    }

    async fn remove(&self, token: &SessionToken) {
        self.entries.remove(token);
    }
}

impl Drop for MemorySessionStore {
    fn drop(&mut self) {
        self.sweeper_running.store(false, Ordering::Relaxed);
    }
}
