use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    charla_common::ConvKey,
    dashmap::{DashMap, mapref::entry::Entry},
    tracing::debug,
};

/// Default quiet period before a buffered conversation is dispatched.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(7);

/// Receives the coalesced question once a conversation has gone quiet.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, key: ConvKey, question: String);
}

/// One accumulating buffer. Exists iff its timer is armed; `version` ties the
/// armed timer to the entry so a superseded timer can never consume it.
/// Versions are drawn from a window-wide counter, never per entry: a timer
/// left over from an earlier generation of the same key (purged or already
/// fired) can therefore never match a fresh entry.
struct BufferEntry {
    text: String,
    version: u64,
    last_update: Instant,
}

/// Per-(tenant, conversation) debounce buffer.
///
/// All mutations to one entry are serialized through the keyed map; entries
/// on different keys never block each other. The entry is removed before the
/// dispatcher runs, so a message arriving during a slow downstream call
/// starts a fresh buffer instead of waiting on it.
pub struct AggregationWindow {
    entries: DashMap<ConvKey, BufferEntry>,
    next_version: AtomicU64,
    quiet_period: Duration,
    dispatcher: Arc<dyn Dispatcher>,
}

impl AggregationWindow {
    pub fn new(quiet_period: Duration, dispatcher: Arc<dyn Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            next_version: AtomicU64::new(0),
            quiet_period,
            dispatcher,
        })
    }

    /// Buffer one cleaned message fragment and (re)arm the quiet-period
    /// timer for its key.
    pub fn push(self: &Arc<Self>, key: ConvKey, fragment: &str) {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.text.push(' ');
                entry.text.push_str(fragment);
                // The fresh version supersedes the armed timer.
                entry.version = version;
                entry.last_update = Instant::now();
            },
            Entry::Vacant(vacant) => {
                vacant.insert(BufferEntry {
                    text: fragment.to_string(),
                    version,
                    last_update: Instant::now(),
                });
            },
        }
        self.arm(key, version);
    }

    fn arm(self: &Arc<Self>, key: ConvKey, version: u64) {
        let window = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(window.quiet_period).await;
            window.fire(key, version).await;
        });
    }

    /// Timer expiry: consume the entry if this timer still owns it.
    async fn fire(&self, key: ConvKey, version: u64) {
        let Some((key, entry)) = self.entries.remove_if(&key, |_, e| e.version == version) else {
            // A later fragment re-armed the window; this timer is stale.
            return;
        };
        debug!(%key, quiet_for = ?entry.last_update.elapsed(), "aggregation window elapsed");
        self.dispatcher.dispatch(key, entry.text).await;
    }

    /// Drop every buffer belonging to a tenant; their armed timers become
    /// stale and fire as no-ops. Returns how many buffers were dropped.
    pub fn purge_tenant(&self, tenant_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.tenant_id != tenant_id);
        before - self.entries.len()
    }

    /// Number of conversations currently accumulating.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use {std::sync::Mutex, tokio::time::sleep};

    use super::*;

    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<(ConvKey, String)>>,
    }

    impl RecordingDispatcher {
        fn calls(&self) -> Vec<(ConvKey, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch(&self, key: ConvKey, question: String) {
            self.calls.lock().unwrap().push((key, question));
        }
    }

    fn window(dispatcher: &Arc<RecordingDispatcher>) -> Arc<AggregationWindow> {
        AggregationWindow::new(
            DEFAULT_QUIET_PERIOD,
            Arc::clone(dispatcher) as Arc<dyn Dispatcher>,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_rapid_messages_into_one_dispatch() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);
        let key = ConvKey::new("u1", "c1");

        window.push(key.clone(), "Hola");
        sleep(Duration::from_secs(2)).await;
        window.push(key.clone(), "como estas");
        sleep(Duration::from_secs(8)).await;

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, key);
        assert_eq!(calls[0].1, "Hola como estas");
        assert_eq!(window.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_fragments_dispatches_once() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);
        let key = ConvKey::new("u1", "c1");

        for fragment in ["a", "b", "c", "d", "e"] {
            window.push(key.clone(), fragment);
            sleep(Duration::from_secs(1)).await;
        }
        sleep(Duration::from_secs(8)).await;

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "a b c d e");
    }

    #[tokio::test(start_paused = true)]
    async fn different_conversations_never_coalesce() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);

        window.push(ConvKey::new("u1", "c1"), "uno");
        window.push(ConvKey::new("u1", "c2"), "dos");
        window.push(ConvKey::new("u2", "c1"), "tres");
        sleep(Duration::from_secs(8)).await;

        let mut texts: Vec<String> = dispatcher.calls().into_iter().map(|(_, t)| t).collect();
        texts.sort();
        assert_eq!(texts, ["dos", "tres", "uno"]);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_gap_longer_than_window_splits_dispatches() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);
        let key = ConvKey::new("u1", "c1");

        window.push(key.clone(), "primero");
        sleep(Duration::from_secs(8)).await;
        window.push(key.clone(), "segundo");
        sleep(Duration::from_secs(8)).await;

        let texts: Vec<String> = dispatcher.calls().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, ["primero", "segundo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_buffers_and_invalidates_timers() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);

        window.push(ConvKey::new("u1", "c1"), "hola");
        window.push(ConvKey::new("u1", "c2"), "hola");
        window.push(ConvKey::new("u2", "c1"), "sobrevivo");

        assert_eq!(window.purge_tenant("u1"), 2);
        sleep(Duration::from_secs(8)).await;

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ConvKey::new("u2", "c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn purged_buffer_timer_never_consumes_a_fresh_entry_early() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);
        let key = ConvKey::new("u1", "c1");

        // The purged buffer leaves a timer behind that would fire at t=7;
        // the fresh buffer at t=3 must get its full quiet period until t=10.
        window.push(key.clone(), "vieja");
        assert_eq!(window.purge_tenant("u1"), 1);
        sleep(Duration::from_secs(3)).await;
        window.push(key.clone(), "Hola");

        sleep(Duration::from_secs(5)).await;
        assert!(dispatcher.calls().is_empty());

        sleep(Duration::from_secs(3)).await;
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "Hola");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_never_consumes_rearmed_entry() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let window = window(&dispatcher);
        let key = ConvKey::new("u1", "c1");

        // First timer armed at t=0 would fire at t=7; the second fragment at
        // t=6 supersedes it, so nothing may fire until t=13.
        window.push(key.clone(), "Hola");
        sleep(Duration::from_secs(6)).await;
        window.push(key.clone(), "como estas");
        sleep(Duration::from_secs(2)).await;
        assert!(dispatcher.calls().is_empty());

        sleep(Duration::from_secs(6)).await;
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "Hola como estas");
    }
}
