//! Canonical ingested data: samples, frames and audio chunks.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::model::ChannelKind;

/// One numeric point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since epoch
    pub time: f64,
    /// Finite value
    pub value: f64,
}

impl Sample {
    /// Create a sample.
    #[must_use]
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// One image frame; the payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Milliseconds since epoch
    pub time: f64,
    /// Encoded image bytes
    pub payload: Bytes,
}

/// One decoded audio chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Start of the chunk, milliseconds since epoch
    pub start: f64,
    /// Length of the chunk in milliseconds
    pub duration_ms: f64,
    /// Normalized samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Playback rate estimate in Hz
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Spread the chunk over its duration as time-series samples.
    #[must_use]
    pub fn to_samples(&self) -> Vec<Sample> {
        let n = self.samples.len();
        if n == 0 {
            return Vec::new();
        }
        let dt = self.duration_ms / n as f64;
        self.samples
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(self.start + i as f64 * dt, f64::from(*v)))
            .collect()
    }

    /// Leading part of the chunk covering at most `max_ms`.
    #[must_use]
    pub fn trimmed(&self, max_ms: f64) -> Self {
        if self.duration_ms <= max_ms || self.samples.is_empty() {
            return self.clone();
        }
        let keep = ((self.samples.len() as f64) * max_ms / self.duration_ms).round() as usize;
        Self {
            start: self.start,
            duration_ms: max_ms,
            samples: self.samples[..keep.min(self.samples.len())].to_vec(),
            sample_rate: self.sample_rate,
        }
    }
}

/// Time-ordered rolling buffer of samples for one channel.
///
/// Out-of-order inserts land at their sorted position; equal timestamps are
/// kept (newest after existing ones). When `capacity` is exceeded the oldest
/// samples are dropped.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SeriesBuffer {
    /// Empty buffer holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert one sample in time order.
    pub fn push(&mut self, sample: Sample) {
        match self.samples.back() {
            Some(last) if last.time > sample.time => {
                let idx = self.samples.partition_point(|s| s.time <= sample.time);
                self.samples.insert(idx, sample);
            }
            _ => self.samples.push_back(sample),
        }
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Insert many samples.
    pub fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        for s in samples {
            self.push(s);
        }
    }

    /// Drop samples older than `time`.
    pub fn retain_after(&mut self, time: f64) {
        let idx = self.samples.partition_point(|s| s.time < time);
        self.samples.drain(..idx);
    }

    /// Samples within `[start, end]`.
    pub fn range(&self, start: f64, end: f64) -> impl Iterator<Item = &Sample> {
        let lo = self.samples.partition_point(|s| s.time < start);
        self.samples
            .range(lo..)
            .take_while(move |s| s.time <= end)
    }

    /// All samples in time order.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Number of buffered samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Newest buffered sample.
    #[must_use]
    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Oldest buffered sample.
    #[must_use]
    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Everything retained for one channel.
#[derive(Debug, Clone)]
pub struct ChannelData {
    /// Channel kind
    pub kind: ChannelKind,
    /// Numeric samples (also audio expanded to samples)
    pub series: SeriesBuffer,
    /// Most recent image frame
    pub frame: Option<Frame>,
    /// Most recent audio chunk
    pub audio: Option<AudioChunk>,
}

impl ChannelData {
    /// Empty data for a channel of `kind`.
    #[must_use]
    pub fn new(kind: ChannelKind, capacity: usize) -> Self {
        Self {
            kind,
            series: SeriesBuffer::new(capacity),
            frame: None,
            audio: None,
        }
    }

    /// Drop all retained data.
    pub fn clear(&mut self) {
        self.series.clear();
        self.frame = None;
        self.audio = None;
    }
}
