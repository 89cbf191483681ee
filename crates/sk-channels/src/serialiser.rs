use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bound on `ChannelSession.message_buffer`, per the data model (N ≈ 10).
const MESSAGE_BUFFER_CAP: usize = 10;

/// Per-channel mutual-exclusion state (C3's `ChannelSession`).
///
/// `lock` provides FIFO mutual exclusion for the channel: `tokio::sync::Mutex`
/// wakes waiters in the order they queued, which is sufficient for the
/// per-channel FIFO fairness contract (fairness across channels is
/// unconstrained — each channel gets its own independent lock).
struct ChannelState {
    lock: Arc<Mutex<()>>,
    /// The cancellation token of the lease currently held, if any. Exposed
    /// so a peer component (e.g. an admin `/stop` command) can cancel the
    /// in-flight invocation for a channel without holding the lease itself.
    current_token: std::sync::Mutex<Option<CancellationToken>>,
    /// Bounded ordered sequence of the last `MESSAGE_BUFFER_CAP` user
    /// messages, oldest first — `ChannelSession.message_buffer`.
    message_buffer: std::sync::Mutex<VecDeque<String>>,
}

/// A signal emitted when a channel lease is acquired for a channel different
/// from the one last served by this process.
///
/// In the current (stateless subprocess) model this is inert — the agent
/// retains no cross-invocation session to clear. The type exists so a future
/// stateful collaborator (e.g. a screen-scrape or session-sticky backend)
/// can be wired in without changing the `Acquire` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSwitch {
    Same,
    Switched,
}

/// Process-wide channel-mutual-exclusion service (C3).
pub struct Serialiser {
    channels: DashMap<String, Arc<ChannelState>>,
    last_origin_channel: std::sync::Mutex<Option<String>>,
}

impl Default for Serialiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialiser {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            last_origin_channel: std::sync::Mutex::new(None),
        }
    }

    fn state_for(&self, channel_id: &str) -> Arc<ChannelState> {
        self.channels
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                Arc::new(ChannelState {
                    lock: Arc::new(Mutex::new(())),
                    current_token: std::sync::Mutex::new(None),
                    message_buffer: std::sync::Mutex::new(VecDeque::with_capacity(MESSAGE_BUFFER_CAP)),
                })
            })
            .clone()
    }

    /// Append a user message to `channel_id`'s bounded buffer, evicting the
    /// oldest entry once [`MESSAGE_BUFFER_CAP`] is exceeded.
    pub fn push_message(&self, channel_id: &str, text: impl Into<String>) {
        let state = self.state_for(channel_id);
        let mut buf = state.message_buffer.lock().unwrap();
        if buf.len() >= MESSAGE_BUFFER_CAP {
            buf.pop_front();
        }
        buf.push_back(text.into());
    }

    /// Returns the last `MESSAGE_BUFFER_CAP` messages for `channel_id`,
    /// oldest first, for C4's Context Assembler to consume.
    pub fn recent_messages(&self, channel_id: &str) -> Vec<String> {
        let state = self.state_for(channel_id);
        state.message_buffer.lock().unwrap().iter().cloned().collect()
    }

    /// Blocks until no other request holds `channel_id`, then returns a
    /// lease. Respects `cancel`: if `cancel` fires before the lease is
    /// granted, returns `None` and this acquisition never affects a lease
    /// already held by a peer.
    pub async fn acquire(&self, channel_id: &str, cancel: CancellationToken) -> Option<Lease> {
        let state = self.state_for(channel_id);
        let switch = self.note_origin(channel_id);
        debug!(channel_id, ?switch, "acquiring channel lease");

        let guard = tokio::select! {
            guard = state.lock.clone().lock_owned() => guard,
            _ = cancel.cancelled() => return None,
        };

        *state.current_token.lock().unwrap() = Some(cancel.clone());

        Some(Lease {
            channel_id: channel_id.to_string(),
            state,
            guard: Some(guard),
            released: AtomicBool::new(false),
        })
    }

    /// Cancels the invocation currently running under `channel_id`'s lease,
    /// if any. Used by operator commands (e.g. `/stop`) — never aborts a
    /// lease that is merely queued, only one already held.
    pub fn cancel_current(&self, channel_id: &str) {
        if let Some(state) = self.channels.get(channel_id) {
            if let Some(token) = state.current_token.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
    }

    fn note_origin(&self, channel_id: &str) -> ChannelSwitch {
        let mut last = self.last_origin_channel.lock().unwrap();
        let switch = match last.as_deref() {
            Some(prev) if prev == channel_id => ChannelSwitch::Same,
            None => ChannelSwitch::Same,
            Some(_) => ChannelSwitch::Switched,
        };
        *last = Some(channel_id.to_string());
        switch
    }
}

/// A held channel lease. `Release` is mandatory on every exit path; dropping
/// the lease (normal return, error return, or panic unwind) always releases
/// it, so callers cannot forget to.
pub struct Lease {
    channel_id: String,
    state: Arc<ChannelState>,
    guard: Option<OwnedMutexGuard<()>>,
    released: AtomicBool,
}

impl Lease {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Explicit release. Equivalent to dropping the lease, provided for
    /// call sites that want the release point to be visible in the code.
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.current_token.lock().unwrap() = None;
        self.guard.take();
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.do_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn at_most_one_outstanding_lease_per_channel() {
        let serialiser = Arc::new(Serialiser::new());
        let outstanding = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let serialiser = serialiser.clone();
            let outstanding = outstanding.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let lease = serialiser
                    .acquire("c1", CancellationToken::new())
                    .await
                    .unwrap();
                let n = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                outstanding.fetch_sub(1, Ordering::SeqCst);
                lease.release();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_channels_proceed_concurrently() {
        let serialiser = Arc::new(Serialiser::new());
        let l1 = serialiser.acquire("a", CancellationToken::new()).await.unwrap();
        let l2 = serialiser.acquire("b", CancellationToken::new()).await.unwrap();
        assert_eq!(l1.channel_id(), "a");
        assert_eq!(l2.channel_id(), "b");
    }

    #[tokio::test]
    async fn cancelled_acquisition_never_aborts_a_peer_lease() {
        let serialiser = Arc::new(Serialiser::new());
        let held = serialiser.acquire("c1", CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = serialiser.acquire("c1", cancel).await;
        assert!(result.is_none());

        // the peer's lease is untouched
        assert_eq!(held.channel_id(), "c1");
    }

    #[test]
    fn message_buffer_is_bounded_and_oldest_first() {
        let serialiser = Serialiser::new();
        for i in 0..(MESSAGE_BUFFER_CAP + 3) {
            serialiser.push_message("c1", format!("msg-{i}"));
        }
        let recent = serialiser.recent_messages("c1");
        assert_eq!(recent.len(), MESSAGE_BUFFER_CAP);
        assert_eq!(recent.first().unwrap(), "msg-3");
        assert_eq!(recent.last().unwrap(), &format!("msg-{}", MESSAGE_BUFFER_CAP + 2));
    }

    #[tokio::test]
    async fn channel_switch_is_detected() {
        let serialiser = Serialiser::new();
        let a = serialiser.acquire("a", CancellationToken::new()).await.unwrap();
        drop(a);
        let switch = serialiser.note_origin("b");
        assert_eq!(switch, ChannelSwitch::Switched);
        let switch = serialiser.note_origin("b");
        assert_eq!(switch, ChannelSwitch::Same);
    }
}
