//! Fetch issuing with per-channel backpressure.
//!
//! Every fetch runs as its own tokio task and reports back over an mpsc
//! channel as a [`Completion`]. At most one request per channel is
//! outstanding; a second `fetch` for a busy channel is a no-op. Requests
//! carry the scheduler epoch they were issued in: advancing the epoch (on
//! any transition to Paused) turns everything still in flight stale.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use scan_client::{DataQuery, DataResponse, DataSource, RefMode};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::ingest::FetchSpec;
use crate::model::{Channel, ChannelKind, PanelId};

/// Shortest primary tick.
pub const MIN_PRIMARY_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest image tick.
pub const MIN_IMAGE_INTERVAL: Duration = Duration::from_millis(10);

/// Primary tick: the update interval, at most one window, at least 100 ms.
#[must_use]
pub fn primary_interval(update: Duration, window: Duration) -> Duration {
    update.min(window).max(MIN_PRIMARY_INTERVAL)
}

/// Image tick: a tenth of the update interval.
#[must_use]
pub fn image_interval(update: Duration) -> Duration {
    (update / 10).max(MIN_IMAGE_INTERVAL)
}

/// Bounded wait for outstanding requests to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleGuard {
    /// Time between checks
    pub poll_interval: Duration,
    /// Checks before giving up
    pub max_polls: u32,
}

impl Default for IdleGuard {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_polls: 100,
        }
    }
}

impl IdleGuard {
    /// Longest the guard will wait.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.max_polls
    }
}

/// Identifier of one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// An issued request and the context it needs on completion.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request identifier
    pub id: RequestId,
    /// Channel fetched
    pub channel: Channel,
    /// Panel that asked for it
    pub panel: PanelId,
    /// What was asked for, after demotion
    pub spec: FetchSpec,
    /// Scheduler epoch at issue time
    pub epoch: u64,
}

/// A finished request.
#[derive(Debug)]
pub struct Completion {
    /// The request
    pub request: FetchRequest,
    /// Response or failure
    pub result: scan_client::Result<DataResponse>,
}

/// Issues fetches and collects their completions.
pub struct FetchScheduler<S: DataSource> {
    source: Arc<S>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: HashMap<String, RequestId>,
    epoch: u64,
    next_id: u64,
    cache_buster: u64,
    last_right_edge: Option<f64>,
}

impl<S: DataSource> fmt::Debug for FetchScheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchScheduler")
            .field("in_flight", &self.in_flight.len())
            .field("epoch", &self.epoch)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl<S: DataSource> FetchScheduler<S> {
    /// Scheduler over `source`.
    pub fn new(source: Arc<S>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source,
            tx,
            rx,
            in_flight: HashMap::new(),
            epoch: 0,
            next_id: 0,
            cache_buster: 0,
            last_right_edge: None,
        }
    }

    /// The data source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Issue a fetch unless one is already outstanding for the channel.
    ///
    /// Step requests on non-image channels are demoted to absolute. Must be
    /// called from within a tokio runtime.
    pub fn fetch(&mut self, channel: &Channel, panel: PanelId, spec: FetchSpec) -> Option<RequestId> {
        if let Some(pending) = self.in_flight.get(channel.path()) {
            trace!(channel = %channel, %pending, "fetch skipped, request in flight");
            return None;
        }

        let mut spec = spec;
        if spec.reference.is_step() && channel.kind() != ChannelKind::Image {
            spec.reference = RefMode::Absolute;
        }

        let mut query = match channel.kind() {
            ChannelKind::Numeric => {
                DataQuery::series(channel.path(), spec.window, spec.anchor, spec.reference)
            }
            ChannelKind::Audio => {
                DataQuery::audio(channel.path(), spec.window, spec.anchor, spec.reference)
            }
            ChannelKind::Image => DataQuery::frame(channel.path(), spec.anchor, spec.reference),
        };
        if spec.reference != RefMode::Absolute {
            self.cache_buster += 1;
            query = query.with_cache_buster(self.cache_buster);
        } else if channel.kind() == ChannelKind::Numeric {
            self.last_right_edge = Some(spec.right_edge());
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.in_flight.insert(channel.path().to_string(), id);

        let request = FetchRequest {
            id,
            channel: channel.clone(),
            panel,
            spec,
            epoch: self.epoch,
        };
        debug!(
            channel = %channel,
            %id,
            anchor = spec.anchor,
            window = spec.window,
            r = %spec.reference,
            in_flight = self.in_flight.len(),
            "fetch"
        );

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = source.fetch(&query).await;
            // receiver gone means the session was dropped
            let _ = tx.send(Completion { request, result });
        });

        Some(id)
    }

    /// Number of outstanding requests of the current epoch.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether a request for `path` is outstanding.
    #[must_use]
    pub fn is_in_flight(&self, path: &str) -> bool {
        self.in_flight.contains_key(path)
    }

    /// Whether nothing is outstanding.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new epoch; everything in flight becomes stale.
    pub fn advance_epoch(&mut self) -> u64 {
        self.epoch += 1;
        if !self.in_flight.is_empty() {
            debug!(
                abandoned = self.in_flight.len(),
                epoch = self.epoch,
                "abandoning in-flight requests"
            );
        }
        self.in_flight.clear();
        self.epoch
    }

    /// Right edge of the latest absolute numeric request.
    #[must_use]
    pub fn last_right_edge(&self) -> Option<f64> {
        self.last_right_edge
    }

    /// Forget the latest requested right edge.
    pub fn clear_last_right_edge(&mut self) {
        self.last_right_edge = None;
    }

    /// Wait for the next completion.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Take a completion if one is ready.
    pub fn try_next_completion(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }

    /// Book-keep a completion; returns `false` if it is stale.
    pub fn settle(&mut self, completion: &Completion) -> bool {
        let request = &completion.request;
        if self.in_flight.get(request.channel.path()) == Some(&request.id) {
            self.in_flight.remove(request.channel.path());
        }
        let fresh = request.epoch == self.epoch;
        if !fresh {
            debug!(
                channel = %request.channel,
                id = %request.id,
                issued = request.epoch,
                current = self.epoch,
                "discarding stale completion"
            );
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        queries: std::sync::Mutex<Vec<DataQuery>>,
    }

    #[async_trait]
    impl DataSource for CountingSource {
        async fn fetch(&self, query: &DataQuery) -> scan_client::Result<DataResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(DataResponse::text("1,1\n"))
        }
    }

    fn spec() -> FetchSpec {
        FetchSpec::absolute(1000.0, 1000.0)
    }

    #[test]
    fn intervals() {
        let s = Duration::from_secs;
        assert_eq!(primary_interval(s(1), s(10)), s(1));
        assert_eq!(primary_interval(s(30), s(10)), s(10));
        assert_eq!(primary_interval(Duration::from_millis(20), s(10)), Duration::from_millis(100));
        assert_eq!(image_interval(s(1)), Duration::from_millis(100));
        assert_eq!(image_interval(Duration::from_millis(50)), Duration::from_millis(10));
        assert_eq!(IdleGuard::default().budget(), s(10));
    }

    #[tokio::test(start_paused = true)]
    async fn one_request_per_channel() {
        let source = Arc::new(CountingSource::default());
        let mut sched = FetchScheduler::new(Arc::clone(&source));
        let ch = Channel::new("a");

        assert!(sched.fetch(&ch, PanelId(0), spec()).is_some());
        assert!(sched.fetch(&ch, PanelId(0), spec()).is_none());
        assert_eq!(sched.in_flight(), 1);

        let done = sched.next_completion().await.unwrap();
        assert!(sched.settle(&done));
        assert!(sched.is_idle());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_after_epoch_change() {
        let source = Arc::new(CountingSource::default());
        let mut sched = FetchScheduler::new(source);
        let ch = Channel::new("a");
        sched.fetch(&ch, PanelId(0), spec());
        sched.advance_epoch();
        assert!(sched.is_idle());

        // a new request for the same channel is allowed immediately
        let fresh_id = sched.fetch(&ch, PanelId(0), spec()).unwrap();
        let a = sched.next_completion().await.unwrap();
        let b = sched.next_completion().await.unwrap();
        let (stale, fresh) = if a.request.id == fresh_id { (b, a) } else { (a, b) };
        assert!(!sched.settle(&stale));
        assert!(sched.is_in_flight("a"), "stale completion must not clear the new request");
        assert!(sched.settle(&fresh));
        assert!(sched.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn step_demoted_for_series_and_cache_busted() {
        let source = Arc::new(CountingSource::default());
        let mut sched = FetchScheduler::new(Arc::clone(&source));
        let step = FetchSpec {
            anchor: 5000.0,
            window: 1000.0,
            reference: RefMode::Next,
        };
        sched.fetch(&Channel::new("num"), PanelId(0), step);
        sched.fetch(&Channel::new("cam.jpg"), PanelId(1), step);
        for _ in 0..2 {
            let c = sched.next_completion().await.unwrap();
            sched.settle(&c);
        }
        let queries = source.queries.lock().unwrap();
        let num = queries.iter().find(|q| q.channel == "num").unwrap();
        let cam = queries.iter().find(|q| q.channel == "cam.jpg").unwrap();
        assert_eq!(num.reference, RefMode::Absolute);
        assert_eq!(num.cache_buster, 0);
        assert_eq!(cam.reference, RefMode::Next);
        assert_eq!(cam.cache_buster, 1);
        assert_eq!(sched.last_right_edge(), Some(6000.0));
    }
}
