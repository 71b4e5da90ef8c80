//! Response parsing and the per-channel data store.
//!
//! [`DataStore::ingest`] turns one delivered [`DataResponse`] into samples,
//! a frame or an audio chunk, updates the channel's last delivered time
//! (`param_time`) and merges the session [`Bounds`]. All bound updates are
//! min/max merges, so completions may be ingested in any order and
//! re-delivery changes nothing.

use std::collections::{HashMap, HashSet};

use scan_client::{DataResponse, RefMode};
use tracing::{debug, trace};

use crate::bounds::Bounds;
use crate::data::{AudioChunk, ChannelData, Frame, Sample, SeriesBuffer};
use crate::model::{Channel, ChannelKind};

/// Bytes of a canonical `.wav` header preceding the PCM payload.
pub const WAV_HEADER_BYTES: usize = 44;

/// Samples-per-second above which a chunk is taken to be 22.05 kHz audio.
const RATE_THRESHOLD: f64 = 10_000.0;

/// What was asked for; carried alongside each request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchSpec {
    /// Window start (series, audio) or frame time (image), ms since epoch
    pub anchor: f64,
    /// Window length in ms
    pub window: f64,
    /// Anchor semantics
    pub reference: RefMode,
}

impl FetchSpec {
    /// Absolute window `[anchor, anchor + window]`.
    #[must_use]
    pub fn absolute(anchor: f64, window: f64) -> Self {
        Self {
            anchor,
            window,
            reference: RefMode::Absolute,
        }
    }

    /// Right edge of the requested window.
    #[must_use]
    pub fn right_edge(&self) -> f64 {
        self.anchor + self.window
    }
}

/// Result of ingesting one delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    /// Points appended to the channel buffer
    pub points: usize,
    /// Rows skipped because their time did not parse
    pub skipped: usize,
    /// Newest timestamp in this delivery
    pub latest: Option<f64>,
    /// Oldest timestamp in this delivery
    pub earliest: Option<f64>,
    /// Frame delivered on an image channel
    pub frame: Option<Frame>,
    /// Chunk delivered on an audio channel
    pub audio: Option<AudioChunk>,
}

impl IngestOutcome {
    /// Time the display should move to for a limit or step delivery.
    #[must_use]
    pub fn edge_time(&self, reference: RefMode) -> Option<f64> {
        match reference {
            RefMode::Oldest => self.earliest,
            RefMode::Newest | RefMode::Next | RefMode::Prev => self.latest,
            RefMode::Absolute => None,
        }
    }
}

/// Parse `"<epochSeconds>,<value>"` rows into samples.
///
/// Rows whose time does not parse are skipped and counted. Rows with a
/// valid time but a non-finite or missing value contribute their time to
/// the returned times but no sample.
#[must_use]
pub fn parse_numeric_rows(text: &str) -> (Vec<Sample>, Vec<f64>, usize) {
    let mut samples = Vec::new();
    let mut times = Vec::new();
    let mut skipped = 0;

    for row in text.lines().map(str::trim).filter(|r| !r.is_empty()) {
        let mut fields = row.split(',');
        let time = fields
            .next()
            .and_then(|t| t.trim().parse::<f64>().ok())
            .map(|s| s * 1000.0)
            .filter(|t| t.is_finite());
        let Some(time) = time else {
            skipped += 1;
            trace!(row, "skipping row with bad time");
            continue;
        };
        times.push(time);

        let value = fields.next().and_then(|v| v.trim().parse::<f64>().ok());
        if let Some(value) = value.filter(|v| v.is_finite()) {
            samples.push(Sample::new(time, value));
        }
    }

    (samples, times, skipped)
}

/// Decode little-endian signed 16-bit PCM into `[-1, 1)` floats.
#[must_use]
pub fn decode_pcm16(body: &[u8]) -> Vec<f32> {
    body.chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Guess the sample rate of `samples` values spanning `duration_ms`.
#[must_use]
pub fn estimate_sample_rate(samples: usize, duration_ms: f64) -> u32 {
    if duration_ms <= 0.0 {
        return 22_050;
    }
    let rate = samples as f64 / (duration_ms / 1000.0);
    if rate > RATE_THRESHOLD {
        22_050
    } else {
        8_000
    }
}

/// Per-channel buffers, last delivered times and the session bounds.
#[derive(Debug, Clone)]
pub struct DataStore {
    channels: HashMap<String, ChannelData>,
    param_time: HashMap<String, f64>,
    exhausted_next: HashSet<String>,
    exhausted_prev: HashSet<String>,
    bounds: Bounds,
    capacity: usize,
}

impl DataStore {
    /// Empty store; each series buffer holds at most `capacity` points.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: HashMap::new(),
            param_time: HashMap::new(),
            exhausted_next: HashSet::new(),
            exhausted_prev: HashSet::new(),
            bounds: Bounds::new(),
            capacity,
        }
    }

    /// Make room for a channel. Registering twice keeps existing data.
    pub fn register(&mut self, channel: &Channel) {
        self.channels
            .entry(channel.path().to_string())
            .or_insert_with(|| ChannelData::new(channel.kind(), self.capacity));
    }

    /// Release everything held for a channel.
    pub fn release(&mut self, path: &str) {
        self.channels.remove(path);
        self.param_time.remove(path);
        self.exhausted_next.remove(path);
        self.exhausted_prev.remove(path);
    }

    /// Session bounds.
    #[must_use]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Forget the session bounds (explicit reset).
    pub fn reset_bounds(&mut self) {
        self.bounds.reset();
    }

    /// Drop buffered data of every channel, keeping bounds and delivery times.
    pub fn drop_data(&mut self) {
        for data in self.channels.values_mut() {
            data.clear();
        }
    }

    /// Retained data for a channel.
    #[must_use]
    pub fn channel(&self, path: &str) -> Option<&ChannelData> {
        self.channels.get(path)
    }

    /// Numeric (or audio-expanded) samples of a channel.
    #[must_use]
    pub fn series(&self, path: &str) -> Option<&SeriesBuffer> {
        self.channels.get(path).map(|d| &d.series)
    }

    /// Last delivered time of a channel.
    #[must_use]
    pub fn param_time(&self, path: &str) -> Option<f64> {
        self.param_time.get(path).copied()
    }

    /// Oldest of the per-channel newest times among `paths`; channels
    /// that have not delivered yet are ignored.
    #[must_use]
    pub fn oldest_newest<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Option<f64> {
        paths
            .into_iter()
            .filter_map(|p| self.param_time(p))
            .reduce(f64::min)
    }

    /// Mark a channel as having no frame in the step direction of `reference`.
    pub fn mark_exhausted(&mut self, path: &str, reference: RefMode) {
        match reference {
            RefMode::Next => {
                self.exhausted_next.insert(path.to_string());
            }
            RefMode::Prev => {
                self.exhausted_prev.insert(path.to_string());
            }
            _ => {}
        }
    }

    /// Whether stepping `path` in the direction of `reference` is exhausted.
    #[must_use]
    pub fn is_exhausted(&self, path: &str, reference: RefMode) -> bool {
        match reference {
            RefMode::Next => self.exhausted_next.contains(path),
            RefMode::Prev => self.exhausted_prev.contains(path),
            _ => false,
        }
    }

    /// Apply one delivery for `channel`.
    pub fn ingest(
        &mut self,
        channel: &Channel,
        response: &DataResponse,
        spec: &FetchSpec,
    ) -> IngestOutcome {
        self.register(channel);
        let path = channel.path();

        // authoritative header limits first
        if let Some(oldest) = response.headers.oldest {
            self.bounds.merge_oldest(oldest);
        }
        if let Some(newest) = response.headers.newest {
            self.bounds.merge_newest(newest);
        }

        let outcome = match channel.kind() {
            ChannelKind::Numeric => self.ingest_numeric(path, response),
            ChannelKind::Audio => self.ingest_audio(channel, response, spec),
            ChannelKind::Image => self.ingest_image(path, response, spec),
        };

        if let (Some(lo), Some(hi)) = (outcome.earliest, outcome.latest) {
            match spec.reference {
                RefMode::Oldest => self.bounds.merge_oldest(lo),
                RefMode::Newest => self.bounds.merge_newest(hi),
                _ => {}
            }
            self.bounds.include(lo);
            self.bounds.include(hi);
        }

        if let Some(latest) = outcome.latest {
            if channel.kind() == ChannelKind::Image {
                // frames may step backwards
                self.param_time.insert(path.to_string(), latest);
            } else {
                let entry = self.param_time.entry(path.to_string()).or_insert(latest);
                *entry = entry.max(latest);
            }
            self.exhausted_next.remove(path);
            self.exhausted_prev.remove(path);
        }

        debug!(
            channel = %path,
            points = outcome.points,
            skipped = outcome.skipped,
            latest = ?outcome.latest,
            "ingested"
        );
        outcome
    }

    fn ingest_numeric(&mut self, path: &str, response: &DataResponse) -> IngestOutcome {
        let (samples, times, skipped) = parse_numeric_rows(&response.body_text());
        let points = samples.len();
        if let Some(data) = self.channels.get_mut(path) {
            data.series.extend(samples);
        }
        IngestOutcome {
            points,
            skipped,
            latest: times.iter().copied().reduce(f64::max),
            earliest: times.iter().copied().reduce(f64::min),
            ..IngestOutcome::default()
        }
    }

    fn ingest_audio(
        &mut self,
        channel: &Channel,
        response: &DataResponse,
        spec: &FetchSpec,
    ) -> IngestOutcome {
        if response.body.len() <= 1 {
            return IngestOutcome::default();
        }
        let pcm = if channel.is_wav() {
            response.body.get(WAV_HEADER_BYTES..).unwrap_or_default()
        } else {
            &response.body[..]
        };
        let samples = decode_pcm16(pcm);
        let header_duration = response.headers.duration.unwrap_or(spec.window);
        let sample_rate = estimate_sample_rate(samples.len(), spec.window);
        let duration_ms = if channel.is_wav() {
            1000.0 * samples.len() as f64 / f64::from(sample_rate)
        } else {
            header_duration
        };
        let start = response.headers.time.unwrap_or(spec.anchor);

        let chunk = AudioChunk {
            start,
            duration_ms,
            samples,
            sample_rate,
        };
        let series = chunk.to_samples();
        let points = series.len();
        let earliest = series.first().map(|s| s.time);
        let latest = series.last().map(|s| s.time);

        if let Some(data) = self.channels.get_mut(channel.path()) {
            // limit probes are not displayed
            if spec.window > 0.0 {
                data.series.extend(series);
            }
            data.audio = Some(chunk.clone());
        }

        IngestOutcome {
            points,
            latest,
            earliest,
            audio: Some(chunk),
            ..IngestOutcome::default()
        }
    }

    fn ingest_image(
        &mut self,
        path: &str,
        response: &DataResponse,
        spec: &FetchSpec,
    ) -> IngestOutcome {
        if response.body.is_empty() {
            return IngestOutcome::default();
        }
        let time = response.headers.time.unwrap_or(spec.anchor);
        let frame = Frame {
            time,
            payload: response.body.clone(),
        };
        if let Some(data) = self.channels.get_mut(path) {
            data.frame = Some(frame.clone());
        }
        IngestOutcome {
            points: 1,
            latest: Some(time),
            earliest: Some(time),
            frame: Some(frame),
            ..IngestOutcome::default()
        }
    }
}
