use super::types::NegotiationMessage;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SessionQueue {
    messages: Vec<NegotiationMessage>,
    last_activity: Instant,
    // set under the queue lock when pruning unlinks it from the map
    retired: bool,
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            last_activity: Instant::now(),
            retired: false,
        }
    }
}

/// In-memory mailbox of negotiation messages, one ordered queue per session.
///
/// Each session has its own lock, so traffic on one session never waits on
/// another. Reads are non-destructive: callers track how much of a queue they
/// have already processed.
#[derive(Debug, Default)]
pub struct SignalingStore {
    sessions: DashMap<String, Arc<Mutex<SessionQueue>>>,
}

fn lock(queue: &Mutex<SessionQueue>) -> MutexGuard<'_, SessionQueue> {
    // A panic while holding the lock cannot leave a half-pushed Vec behind.
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SignalingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message` to the queue of its session, creating the session on
    /// first use.
    pub fn submit(&self, message: NegotiationMessage) {
        loop {
            // The map guard is released before locking the queue.
            let shared = self
                .sessions
                .entry(message.session_id.clone())
                .or_default()
                .value()
                .clone();
            let mut queue = lock(&shared);
            if queue.retired {
                // pruned between lookup and lock, look it up again
                continue;
            }
            tracing::debug!(
                session_id = %message.session_id,
                kind = %message.kind,
                position = queue.messages.len(),
                "signal queued"
            );
            queue.messages.push(message);
            queue.last_activity = Instant::now();
            return;
        }
    }

    /// Snapshot of every message queued for `session_id`, oldest first.
    /// Unknown sessions yield an empty list.
    pub fn drain(&self, session_id: &str) -> Vec<NegotiationMessage> {
        let Some(queue) = self.sessions.get(session_id).map(|q| q.value().clone()) else {
            return Vec::new();
        };
        let queue = lock(&queue);
        queue.messages.clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drops sessions whose last submit is older than `ttl`. Returns how many
    /// were removed.
    pub fn prune_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, queue| {
            let mut queue = lock(queue);
            if queue.last_activity.elapsed() <= ttl {
                return true;
            }
            queue.retired = true;
            false
        });
        before.saturating_sub(self.sessions.len())
    }
}

/// Periodically evicts idle sessions. Returns immediately when `ttl` is zero.
pub async fn start_pruning_task(store: Arc<SignalingStore>, ttl: Duration, interval: Duration) {
    if ttl.is_zero() {
        tracing::info!("signaling session eviction disabled (ttl=0)");
        return;
    }
    let interval = interval.max(Duration::from_secs(1));
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = interval.as_secs(),
        "starting signaling pruning task"
    );

    loop {
        tokio::time::sleep(interval).await;
        let pruned = store.prune_idle(ttl);
        if pruned > 0 {
            tracing::info!(count = pruned, "pruned idle signaling sessions");
        }
    }
}
