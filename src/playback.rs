//! The playback session: mode state machine, timers and user commands.
//!
//! A [`PlaybackSession`] owns the panel layout, the data store, the fetch
//! scheduler and the lag estimator. It is driven either directly (tests,
//! one-shot commands) or by [`PlaybackSession::run`], an event loop that
//! multiplexes user commands, fetch completions and the two tick timers.
//!
//! # Modes
//!
//! ```text
//!            start_realtime            start_playback
//!   RealTime <-------------- Paused --------------> Playback
//!            --------------> Paused <--------------
//!                 pause                   pause
//! ```
//!
//! Switching directly between RealTime and Playback is rejected; the
//! command helpers (`play`, `go_realtime`) route through Paused.
//!
//! Every mode change advances the scheduler epoch, which turns every
//! outstanding request stale; entering Paused also cancels both timers. One-shot commands
//! (`go_bof`, `go_eof`, stepping, `seek`) pause, fetch, wait for the
//! fetches to settle (bounded by [`IdleGuard`]) and render.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use scan_client::{DataSource, FailureClass, RefMode};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::bounds::Bounds;
use crate::clock::Clock;
use crate::error::{AppResult, ScanError};
use crate::ingest::{DataStore, FetchSpec};
use crate::lag::{LagConfig, LagEstimator};
use crate::model::{Channel, ChannelKind, PanelId, PanelSet, palette_color};
use crate::render::{PanelView, Renderer, SeriesView};
use crate::scale::{PanelScale, ScalingMode};
use crate::scheduler::{
    image_interval, primary_interval, Completion, FetchScheduler, IdleGuard, RequestId,
};
use crate::slider;

/// Audio handed to the sink while paused is cut to this many ms.
pub const PAUSED_AUDIO_MS: f64 = 200.0;

/// Playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    /// No timers; display frozen
    #[default]
    Paused,
    /// Wall clock minus adaptive lag
    RealTime,
    /// Wall clock minus a fixed offset
    Playback,
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Paused => "paused",
            Self::RealTime => "real-time",
            Self::Playback => "playback",
        };
        f.write_str(s)
    }
}

/// Snapshot of the session clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    /// Current mode
    pub mode: PlayMode,
    /// Right edge of the displayed window, ms since epoch
    pub display_time: f64,
    /// Current play delay, ms
    pub lag_estimate: f64,
    /// Window length, ms
    pub window: f64,
    /// Known session bounds
    pub bounds: Bounds,
}

/// Result of waiting for outstanding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Everything settled
    Idle,
    /// The guard expired; the stragglers were abandoned
    GaveUp,
}

/// Tuning of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Time between primary ticks (before clamping)
    pub update_interval: Duration,
    /// Visible window
    pub window: Duration,
    /// Lag estimator tuning
    pub lag: LagConfig,
    /// Bounded wait for requests to settle
    pub idle: IdleGuard,
    /// Points kept per channel
    pub buffer_capacity: usize,
    /// `update / window` below which panels render per completion
    pub incremental_ratio: f64,
    /// Scaling policy of new panels
    pub scaling: ScalingMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(1),
            window: Duration::from_secs(10),
            lag: LagConfig::default(),
            idle: IdleGuard::default(),
            buffer_capacity: 100_000,
            incremental_ratio: 0.001,
            scaling: ScalingMode::Standard,
        }
    }
}

/// Messages accepted by [`PlaybackSession::run`].
#[derive(Debug)]
pub enum SessionCommand {
    /// Stop timers and freeze the display
    Pause,
    /// Refill at newest and follow real time
    RealTime,
    /// Play forward from the display time
    Play,
    /// Jump to the oldest data
    Bof,
    /// Jump to the newest data
    Eof,
    /// Move one window forward
    StepForward,
    /// Move one window back
    StepBackward,
    /// Jump to a slider position (0..=100)
    Seek(f64),
    /// Step image channels by one frame (`Next` or `Prev`)
    StepFrame(RefMode),
    /// Reset and re-read the session bounds
    RefreshLimits,
    /// Change the visible window
    SetWindow(Duration),
    /// Change a panel's scaling policy
    SetScaling {
        /// Panel to change
        panel: PanelId,
        /// New policy
        mode: ScalingMode,
    },
    /// Report the current state
    State {
        /// Response channel
        response: oneshot::Sender<PlaybackState>,
    },
    /// Leave the event loop
    Shutdown,
}

/// A real-time/playback session over one data source.
pub struct PlaybackSession<S: DataSource> {
    panels: PanelSet,
    scales: HashMap<PanelId, PanelScale>,
    store: DataStore,
    scheduler: FetchScheduler<S>,
    lag: LagEstimator,
    clock: Arc<dyn Clock>,
    renderer: Box<dyn Renderer>,
    config: SessionConfig,
    mode: PlayMode,
    display_time: f64,
    primary: Option<Interval>,
    image: Option<Interval>,
}

impl<S: DataSource> fmt::Debug for PlaybackSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("mode", &self.mode)
            .field("display_time", &self.display_time)
            .field("panels", &self.panels.len())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<S: DataSource> PlaybackSession<S> {
    /// A paused session with no panels.
    pub fn new(
        source: Arc<S>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            panels: PanelSet::new(),
            scales: HashMap::new(),
            store: DataStore::new(config.buffer_capacity),
            scheduler: FetchScheduler::new(source),
            lag: LagEstimator::new(config.lag),
            clock,
            renderer,
            config,
            mode: PlayMode::Paused,
            display_time: 0.0,
            primary: None,
            image: None,
        }
    }

    // ---- layout -------------------------------------------------------

    /// Append an empty panel using the session's default scaling.
    pub fn create_panel(&mut self) -> PanelId {
        let id = self.panels.create_panel();
        self.scales.insert(id, PanelScale::new(self.config.scaling));
        id
    }

    /// Add a channel to a panel; returns its palette index.
    pub fn add_channel(&mut self, panel: PanelId, path: &str) -> AppResult<usize> {
        let slot = self.panels.add_channel(panel, path)?;
        self.store.register(&Channel::new(path));
        debug!(%panel, channel = path, slot, "channel added");
        Ok(slot)
    }

    /// Remove a panel and release buffers no other panel uses.
    pub fn remove_panel(&mut self, panel: PanelId) -> AppResult<()> {
        let removed = self.panels.remove_panel(panel)?;
        self.scales.remove(&panel);
        for channel in removed {
            if self.panels.find_channel(channel.path()).is_none() {
                self.store.release(channel.path());
            }
        }
        debug!(%panel, "panel removed");
        Ok(())
    }

    /// Panel layout.
    pub fn panels(&self) -> &PanelSet {
        &self.panels
    }

    /// Buffered data and bounds.
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Known session bounds.
    pub fn bounds(&self) -> &Bounds {
        self.store.bounds()
    }

    /// The fetch scheduler.
    pub fn scheduler(&self) -> &FetchScheduler<S> {
        &self.scheduler
    }

    /// The lag estimator.
    pub fn lag(&self) -> &LagEstimator {
        &self.lag
    }

    /// Scale state of a panel.
    pub fn scale(&self, panel: PanelId) -> Option<&PanelScale> {
        self.scales.get(&panel)
    }

    /// Session tuning.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current mode.
    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Right edge of the displayed window.
    pub fn display_time(&self) -> f64 {
        self.display_time
    }

    /// Snapshot of the session clock.
    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            mode: self.mode,
            display_time: self.display_time,
            lag_estimate: self.lag.estimate(),
            window: self.window_ms(),
            bounds: *self.store.bounds(),
        }
    }

    /// Whether the primary (series) timer is running.
    pub fn primary_active(&self) -> bool {
        self.primary.is_some()
    }

    /// Whether the image timer is running.
    pub fn image_active(&self) -> bool {
        self.image.is_some()
    }

    fn window_ms(&self) -> f64 {
        self.config.window.as_secs_f64() * 1000.0
    }

    fn tick_ms(&self) -> f64 {
        primary_interval(self.config.update_interval, self.config.window).as_secs_f64() * 1000.0
    }

    /// Window the slider accounts for; zero when only images are shown.
    pub fn slider_window(&self) -> f64 {
        if self.panels.is_image_only() {
            0.0
        } else {
            self.window_ms()
        }
    }

    /// Panels render on each completion rather than each tick.
    pub fn is_incremental(&self) -> bool {
        let window = self.config.window.as_secs_f64();
        window > 0.0
            && self.config.update_interval.as_secs_f64() / window < self.config.incremental_ratio
    }

    fn series_channels(&self) -> Vec<(PanelId, Channel)> {
        let mut seen = std::collections::HashSet::new();
        self.panels
            .channels()
            .filter(|(_, c)| c.kind().is_time_series() && seen.insert(c.path().to_string()))
            .map(|(p, c)| (p, c.clone()))
            .collect()
    }

    // ---- fetching -----------------------------------------------------

    /// Fetch `window` ms of `path` starting at `anchor`.
    ///
    /// Returns `None` when a request for the channel is already in flight.
    pub fn fetch(
        &mut self,
        path: &str,
        window: f64,
        anchor: f64,
        reference: RefMode,
    ) -> AppResult<Option<RequestId>> {
        let (panel, channel) = self
            .panels
            .find_channel(path)
            .map(|(p, c)| (p, c.clone()))
            .ok_or_else(|| ScanError::UnknownChannel(path.to_string()))?;
        let id = self.scheduler.fetch(
            &channel,
            panel,
            FetchSpec {
                anchor,
                window,
                reference,
            },
        );
        self.renderer.set_busy(!self.scheduler.is_idle());
        Ok(id)
    }

    /// Wait until nothing is in flight, processing completions meanwhile.
    ///
    /// Gives up after the configured guard budget; requests still
    /// outstanding then are abandoned.
    pub async fn wait_idle(&mut self) -> IdleOutcome {
        let deadline = Instant::now() + self.config.idle.budget();
        while !self.scheduler.is_idle() {
            match time::timeout_at(deadline, self.scheduler.next_completion()).await {
                Ok(Some(completion)) => self.handle_completion(completion),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        in_flight = self.scheduler.in_flight(),
                        budget = ?self.config.idle.budget(),
                        "gave up waiting for outstanding requests"
                    );
                    self.scheduler.advance_epoch();
                    self.renderer.set_busy(false);
                    return IdleOutcome::GaveUp;
                }
            }
        }
        IdleOutcome::Idle
    }

    /// Apply completions that have already arrived; returns how many.
    pub fn poll_completions(&mut self) -> usize {
        let mut n = 0;
        while let Some(completion) = self.scheduler.try_next_completion() {
            self.handle_completion(completion);
            n += 1;
        }
        n
    }

    /// Apply one finished request.
    ///
    /// Stale completions are dropped. Failures never propagate: they are
    /// classified and at most pause the session.
    pub fn handle_completion(&mut self, completion: Completion) {
        if !self.scheduler.settle(&completion) {
            return;
        }
        self.renderer.set_busy(!self.scheduler.is_idle());

        let Completion { request, result } = completion;
        let channel = &request.channel;
        let spec = request.spec;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.handle_failure(channel, &spec, &err);
                return;
            }
        };

        let outcome = self.store.ingest(channel, &response, &spec);

        if let Some(frame) = &outcome.frame {
            self.renderer.show_frame(request.panel, channel.path(), frame);
        }
        if let Some(chunk) = &outcome.audio {
            if !chunk.samples.is_empty() {
                if self.mode == PlayMode::Paused {
                    let trimmed = chunk.trimmed(PAUSED_AUDIO_MS);
                    self.renderer.play_audio(channel.path(), &trimmed);
                } else {
                    self.renderer.play_audio(channel.path(), chunk);
                }
            }
        }

        if spec.reference.is_step() {
            if let Some(edge) = outcome.edge_time(spec.reference) {
                self.set_display_time(edge);
            }
        }

        if self.mode != PlayMode::Paused
            && self.is_incremental()
            && channel.kind().is_time_series()
            && self.is_last_in_panel(request.panel, channel.path())
        {
            let right = self
                .scheduler
                .last_right_edge()
                .unwrap_or(self.display_time);
            self.render_panel(request.panel, right);
        }
    }

    fn handle_failure(&mut self, channel: &Channel, spec: &FetchSpec, err: &scan_client::ClientError) {
        match err.class() {
            FailureClass::Gone => {
                if spec.reference.is_step() {
                    self.store.mark_exhausted(channel.path(), spec.reference);
                }
                let beyond = self
                    .store
                    .bounds()
                    .newest()
                    .is_some_and(|newest| spec.right_edge() >= newest);
                if beyond && self.mode == PlayMode::Playback {
                    info!(channel = %channel, error = %err, "no data past newest, pausing");
                    self.pause();
                } else {
                    debug!(channel = %channel, error = %err, "requested time not available");
                }
            }
            FailureClass::Transient | FailureClass::Protocol => {
                warn!(channel = %channel, error = %err, class = ?err.class(), "fetch failed");
            }
        }
    }

    fn is_last_in_panel(&self, panel: PanelId, path: &str) -> bool {
        self.panels
            .panel(panel)
            .ok()
            .and_then(|p| p.channels().last())
            .is_some_and(|c| c.path() == path)
    }

    // ---- rendering ----------------------------------------------------

    fn set_display_time(&mut self, time: f64) {
        let bounds = self.store.bounds();
        let time = bounds.clamp(time);
        let percent = slider::to_percent(time, bounds, self.slider_window());
        self.display_time = time;
        self.renderer.set_time(time, percent);
    }

    /// Draw one strip-chart panel with its window ending at `right_edge`.
    pub fn render_panel(&mut self, panel: PanelId, right_edge: f64) {
        let Ok(p) = self.panels.panel(panel) else {
            return;
        };
        if !p.kind().is_some_and(ChannelKind::is_time_series) {
            return;
        }
        let window = self.window_ms();
        let left = right_edge - window;
        let series: Vec<SeriesView> = p
            .channels()
            .iter()
            .enumerate()
            .map(|(slot, c)| SeriesView {
                channel: c.path().to_string(),
                color: palette_color(slot),
                samples: self
                    .store
                    .series(c.path())
                    .map(|buf| buf.range(left, right_edge).cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();
        let values: Vec<Vec<f64>> = series
            .iter()
            .map(|s| s.samples.iter().map(|p| p.value).collect())
            .collect();
        let range = self.scales.entry(panel).or_default().compute(&values);

        trace!(%panel, right_edge, series = series.len(), "render");
        self.renderer.render_panel(&PanelView {
            panel,
            right_edge,
            window,
            range,
            series,
        });
    }

    fn render_all(&mut self, right_edge: f64) {
        let ids: Vec<PanelId> = self.panels.panels().iter().map(|p| p.id()).collect();
        for id in ids {
            self.render_panel(id, right_edge);
        }
    }

    /// Change a panel's scaling policy and redraw it.
    pub fn set_scaling(&mut self, panel: PanelId, mode: ScalingMode) -> AppResult<()> {
        self.panels.panel(panel)?;
        self.scales.entry(panel).or_default().set_mode(mode);
        self.render_panel(panel, self.display_time);
        Ok(())
    }

    /// Shift a manually scaled panel by `offset` ranges.
    pub fn pan(&mut self, panel: PanelId, offset: f64) -> AppResult<()> {
        self.panels.panel(panel)?;
        self.scales.entry(panel).or_default().pan(offset);
        self.render_panel(panel, self.display_time);
        Ok(())
    }

    /// Scale the range of a manually scaled panel by `factor`.
    pub fn zoom(&mut self, panel: PanelId, factor: f64) -> AppResult<()> {
        self.panels.panel(panel)?;
        self.scales.entry(panel).or_default().zoom(factor);
        self.render_panel(panel, self.display_time);
        Ok(())
    }

    fn request_rescale(&mut self) {
        for scale in self.scales.values_mut() {
            scale.request_rescale();
        }
    }

    // ---- mode machine -------------------------------------------------

    /// Stop timers, abandon outstanding requests and freeze the display.
    pub fn pause(&mut self) {
        self.primary = None;
        self.image = None;
        self.scheduler.advance_epoch();
        self.renderer.set_busy(false);
        if self.mode != PlayMode::Paused {
            info!(from = %self.mode, display_time = self.display_time, "paused");
            self.mode = PlayMode::Paused;
            self.renderer.set_mode(PlayMode::Paused);
        }
    }

    /// Follow real time from a reset lag estimate.
    pub fn start_realtime(&mut self) -> AppResult<()> {
        match self.mode {
            PlayMode::RealTime => return Ok(()),
            PlayMode::Playback => return Err(self.invalid(PlayMode::RealTime)),
            PlayMode::Paused => {}
        }
        self.lag.reset();
        self.enter(PlayMode::RealTime);
        Ok(())
    }

    /// Play forward from `seek`, at wall-clock pace.
    pub fn start_playback(&mut self, seek: f64) -> AppResult<()> {
        match self.mode {
            PlayMode::Playback => return Ok(()),
            PlayMode::RealTime => return Err(self.invalid(PlayMode::Playback)),
            PlayMode::Paused => {}
        }
        let seek = self.store.bounds().clamp(seek);
        self.lag.fix(self.clock.now_ms() - seek);
        self.set_display_time(seek);
        self.enter(PlayMode::Playback);
        Ok(())
    }

    /// Move to `to`; RealTime and Playback only connect through Paused.
    pub fn transition(&mut self, to: PlayMode) -> AppResult<()> {
        match to {
            PlayMode::Paused => {
                self.pause();
                Ok(())
            }
            PlayMode::RealTime => self.start_realtime(),
            PlayMode::Playback => self.start_playback(self.display_time),
        }
    }

    fn invalid(&self, to: PlayMode) -> ScanError {
        ScanError::InvalidTransition {
            from: self.mode.to_string(),
            to: to.to_string(),
        }
    }

    fn enter(&mut self, mode: PlayMode) {
        // requests issued while paused belong to the old mode
        self.scheduler.advance_epoch();
        let primary = primary_interval(self.config.update_interval, self.config.window);
        let image = image_interval(self.config.update_interval);
        self.primary = Some(ticker(primary));
        self.image = Some(ticker(image));
        self.mode = mode;
        info!(%mode, ?primary, ?image, lag = self.lag.estimate(), "mode started");
        self.renderer.set_mode(mode);
    }

    fn stop_primary(&mut self) {
        self.primary = None;
        if self.image.is_none() {
            self.pause();
        }
    }

    fn stop_image(&mut self) {
        self.image = None;
        if self.primary.is_none() {
            self.pause();
        }
    }

    /// Current play time; in real time this feeds the lag estimator.
    fn advance_play_time(&mut self) -> f64 {
        let now = self.clock.now_ms();
        if self.mode == PlayMode::RealTime {
            let paths: Vec<String> = self
                .panels
                .channels()
                .map(|(_, c)| c.path().to_string())
                .collect();
            let latest = self.store.oldest_newest(paths.iter().map(String::as_str));
            self.lag.observe(now, latest, self.window_ms())
        } else {
            self.lag.play_time(now)
        }
    }

    // ---- ticks --------------------------------------------------------

    /// One primary tick: fetch the gap of every series channel up to play time.
    pub fn on_primary_tick(&mut self) {
        let channels = self.series_channels();
        if channels.is_empty() {
            debug!("no series channels, primary timer stopped");
            self.stop_primary();
            return;
        }

        let tright = self.advance_play_time();
        let window = self.window_ms();
        let tleft = tright - window;
        let tick = self.tick_ms();
        let newest = self.store.bounds().newest();
        let mut at_end = 0;

        for (panel, channel) in &channels {
            let tfetch = self
                .store
                .param_time(channel.path())
                .filter(|t| *t > tleft && *t <= tright)
                .unwrap_or(tleft);
            if self.mode != PlayMode::RealTime && newest.is_some_and(|n| tfetch >= n) {
                at_end += 1;
                continue;
            }
            let d = (1.1 * tick + (tright - tfetch)).min(2.0 * window);
            if d <= 0.0 {
                continue;
            }
            self.scheduler
                .fetch(channel, *panel, FetchSpec::absolute(tfetch, d));
        }
        self.renderer.set_busy(!self.scheduler.is_idle());

        if !self.is_incremental() {
            self.render_all(tright);
        }
        self.set_display_time(tright);

        if at_end == channels.len() {
            info!(newest = ?newest, "end of data, primary timer stopped");
            self.stop_primary();
        }
    }

    /// One image tick: fetch every image channel at mid-window.
    pub fn on_image_tick(&mut self) {
        let images = self.panels.channels_of_kind(ChannelKind::Image);
        if images.is_empty() {
            trace!("no image channels, image timer stopped");
            self.stop_image();
            return;
        }

        let play = if self.primary.is_some() {
            self.lag.play_time(self.clock.now_ms())
        } else {
            let t = self.advance_play_time();
            self.set_display_time(t);
            t
        };
        let target = play + self.window_ms() / 2.0;

        if self.mode != PlayMode::RealTime
            && self.store.bounds().newest().is_some_and(|n| target >= n)
        {
            info!(target, "end of frames, image timer stopped");
            self.stop_image();
            return;
        }
        for (panel, channel) in &images {
            self.scheduler.fetch(channel, *panel, FetchSpec::absolute(target, 0.0));
        }
        self.renderer.set_busy(!self.scheduler.is_idle());
    }

    // ---- commands -----------------------------------------------------

    /// Pause, refetch every channel around `time` and either render once
    /// (`onestep`) or continue in real time.
    ///
    /// For `Absolute`, `time` is the window's right edge; a time in the
    /// future becomes a `Newest` refresh and one before the oldest known
    /// data an `Oldest` refresh.
    pub async fn refresh(&mut self, onestep: bool, time: f64, reference: RefMode) -> IdleOutcome {
        self.pause();
        let window = self.window_ms();
        let now = self.clock.now_ms();

        let (mut time, mut reference) = (time, reference);
        if reference == RefMode::Absolute {
            if time > now {
                (time, reference) = (0.0, RefMode::Newest);
            } else if self.store.bounds().oldest().is_some_and(|o| time < o) {
                (time, reference) = (0.0, RefMode::Oldest);
            }
        }
        debug!(onestep, time, r = %reference, "refresh");

        self.scheduler.clear_last_right_edge();
        self.store.drop_data();
        self.request_rescale();

        let channels: Vec<(PanelId, Channel)> =
            self.panels.channels().map(|(p, c)| (p, c.clone())).collect();
        for (panel, channel) in &channels {
            let spec = if channel.kind() == ChannelKind::Image {
                FetchSpec { anchor: time, window, reference }
            } else {
                FetchSpec { anchor: time - window, window, reference }
            };
            self.scheduler.fetch(channel, *panel, spec);
        }
        self.renderer.set_busy(!self.scheduler.is_idle());

        let outcome = self.wait_idle().await;

        let bounds = *self.store.bounds();
        let sw = self.slider_window();
        let right = match reference {
            RefMode::Absolute => Some(time),
            RefMode::Oldest => slider::from_percent(0.0, &bounds, sw),
            RefMode::Newest => slider::from_percent(100.0, &bounds, sw),
            RefMode::Next | RefMode::Prev => None,
        }
        .unwrap_or(self.display_time);
        self.set_display_time(right);

        if onestep {
            self.render_all(self.display_time);
        } else if let Err(err) = self.start_realtime() {
            warn!(error = %err, "could not resume real time");
        }
        outcome
    }

    /// Jump to the oldest data.
    pub async fn go_bof(&mut self) -> IdleOutcome {
        let window = self.window_ms();
        self.refresh(true, window, RefMode::Oldest).await
    }

    /// Jump to the newest data.
    pub async fn go_eof(&mut self) -> IdleOutcome {
        self.refresh(true, 0.0, RefMode::Newest).await
    }

    /// Move the display one window forward.
    pub async fn step_forward(&mut self) -> IdleOutcome {
        let target = self.display_time + self.window_ms();
        self.refresh(true, target, RefMode::Absolute).await
    }

    /// Move the display one window back.
    pub async fn step_backward(&mut self) -> IdleOutcome {
        let target = self.display_time - self.window_ms();
        self.refresh(true, target, RefMode::Absolute).await
    }

    /// Refill at newest and follow real time.
    pub async fn go_realtime(&mut self) -> IdleOutcome {
        self.refresh(false, 0.0, RefMode::Newest).await
    }

    /// Jump to a slider position.
    pub async fn seek(&mut self, percent: f64) -> IdleOutcome {
        let percent = percent.clamp(0.0, 100.0);
        if percent <= 0.0 {
            return self.refresh(true, 0.0, RefMode::Oldest).await;
        }
        if percent >= 100.0 {
            return self.refresh(true, 0.0, RefMode::Newest).await;
        }
        if !self.store.bounds().is_known() {
            self.refresh_limits().await;
        }
        let bounds = *self.store.bounds();
        let Some(right) = slider::from_percent(percent, &bounds, self.slider_window()) else {
            warn!(percent, "limits unknown, cannot seek");
            return IdleOutcome::Idle;
        };
        self.refresh(true, right, RefMode::Absolute).await
    }

    /// Play forward from the display time.
    pub async fn play(&mut self) -> AppResult<()> {
        if self.mode == PlayMode::Playback {
            return Ok(());
        }
        self.pause();
        if !self.store.bounds().is_known() {
            self.refresh_limits().await;
        }
        self.request_rescale();
        // start from where the slider stands; a fresh session stands at 0 %
        let bounds = *self.store.bounds();
        let sw = self.slider_window();
        let percent = slider::to_percent(self.display_time, &bounds, sw);
        let start = slider::from_percent(percent, &bounds, sw).unwrap_or(self.display_time);
        self.start_playback(start)
    }

    /// Step image channels by one frame in the direction of `reference`.
    ///
    /// `Next` advances the channel furthest behind, `Prev` the one furthest
    /// ahead. Returns `false` if there is nothing to step.
    pub async fn step_frame(&mut self, reference: RefMode) -> bool {
        if !reference.is_step() {
            return false;
        }
        let images = self.panels.channels_of_kind(ChannelKind::Image);
        let display = self.display_time;
        let time_of = |store: &DataStore, c: &Channel| store.param_time(c.path()).unwrap_or(display);
        let pick = match reference {
            RefMode::Next => images
                .iter()
                .min_by(|a, b| time_of(&self.store, &a.1).total_cmp(&time_of(&self.store, &b.1))),
            _ => images
                .iter()
                .max_by(|a, b| time_of(&self.store, &a.1).total_cmp(&time_of(&self.store, &b.1))),
        };
        let Some((panel, channel)) = pick.cloned() else {
            return false;
        };
        if self.store.is_exhausted(channel.path(), reference) {
            debug!(channel = %channel, r = %reference, "no more frames in this direction");
            return false;
        }

        self.pause();
        let anchor = time_of(&self.store, &channel);
        self.scheduler.fetch(
            &channel,
            panel,
            FetchSpec {
                anchor,
                window: 0.0,
                reference,
            },
        );
        self.wait_idle().await;
        self.render_all(self.display_time);
        true
    }

    /// Forget the session bounds and re-read them from the first channel.
    pub async fn refresh_limits(&mut self) -> IdleOutcome {
        let Some((panel, channel)) = self.panels.channels().next().map(|(p, c)| (p, c.clone()))
        else {
            return IdleOutcome::Idle;
        };
        if self.wait_idle().await == IdleOutcome::GaveUp {
            return IdleOutcome::GaveUp;
        }
        self.store.reset_bounds();
        for reference in [RefMode::Oldest, RefMode::Newest] {
            self.scheduler.fetch(
                &channel,
                panel,
                FetchSpec {
                    anchor: 0.0,
                    window: 0.0,
                    reference,
                },
            );
            if self.wait_idle().await == IdleOutcome::GaveUp {
                return IdleOutcome::GaveUp;
            }
        }
        let b = self.store.bounds();
        debug!(oldest = ?b.oldest(), newest = ?b.newest(), "limits refreshed");
        IdleOutcome::Idle
    }

    /// Change the visible window, keeping the current mode.
    pub async fn set_window(&mut self, window: Duration) {
        if window.is_zero() || window == self.config.window {
            return;
        }
        self.config.window = window;
        self.request_rescale();
        match self.mode {
            PlayMode::Paused => {
                if self.store.bounds().is_known() {
                    self.refresh(true, self.display_time, RefMode::Absolute).await;
                }
            }
            PlayMode::RealTime => {
                self.go_realtime().await;
            }
            PlayMode::Playback => {
                let at = self.display_time;
                self.pause();
                if let Err(err) = self.start_playback(at) {
                    warn!(error = %err, "could not resume playback");
                }
            }
        }
    }

    // ---- event loop ---------------------------------------------------

    /// Drive the session until `Shutdown` or the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!(panels = self.panels.len(), "session started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(command) => self.execute(command).await,
                    }
                }
                Some(completion) = self.scheduler.next_completion() => {
                    self.handle_completion(completion);
                }
                () = next_tick(&mut self.primary) => self.on_primary_tick(),
                () = next_tick(&mut self.image) => self.on_image_tick(),
            }
        }
        self.pause();
        info!("session stopped");
    }

    /// Execute one command.
    pub async fn execute(&mut self, command: SessionCommand) {
        debug!(?command, "command");
        match command {
            SessionCommand::Pause => self.pause(),
            SessionCommand::RealTime => {
                self.go_realtime().await;
            }
            SessionCommand::Play => {
                if let Err(err) = self.play().await {
                    warn!(error = %err, "play failed");
                }
            }
            SessionCommand::Bof => {
                self.go_bof().await;
            }
            SessionCommand::Eof => {
                self.go_eof().await;
            }
            SessionCommand::StepForward => {
                self.step_forward().await;
            }
            SessionCommand::StepBackward => {
                self.step_backward().await;
            }
            SessionCommand::Seek(percent) => {
                self.seek(percent).await;
            }
            SessionCommand::StepFrame(reference) => {
                self.step_frame(reference).await;
            }
            SessionCommand::RefreshLimits => {
                self.refresh_limits().await;
            }
            SessionCommand::SetWindow(window) => self.set_window(window).await,
            SessionCommand::SetScaling { panel, mode } => {
                if let Err(err) = self.set_scaling(panel, mode) {
                    warn!(error = %err, "scaling change failed");
                }
            }
            SessionCommand::State { response } => {
                let _ = response.send(self.state());
            }
            SessionCommand::Shutdown => self.pause(),
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
