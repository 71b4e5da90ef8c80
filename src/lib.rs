//! # Rust Scan Core Library
//!
//! Real-time and playback synchronization engine for a telemetry viewer.
//! It decides when and what to fetch from the data server, tracks the known
//! time bounds of the data, compensates for delivery lag in real-time mode,
//! maps display time to a scrub slider and computes panel y-ranges. Drawing,
//! frame display and audio output are external and sit behind
//! [`render::Renderer`]; HTTP transport lives in the `scan-client` crate.
//!
//! ## Crate Structure
//!
//! - **`model`**: channels, their kinds and the panels grouping them.
//! - **`data`**: samples, frames, audio chunks and per-channel buffers.
//! - **`bounds`**: session-wide oldest/newest limits with monotone merges.
//! - **`ingest`**: turns responses into buffered data and bound updates.
//! - **`scheduler`**: issues fetches, one in flight per channel, and tags
//!   them with an epoch so stale completions can be dropped.
//! - **`lag`**: adaptive play delay for real time, fixed offset for playback.
//! - **`slider`**: display time to slider percent and back.
//! - **`scale`**: humane rounding and the four panel scaling policies.
//! - **`playback`**: the `PlaybackSession` mode machine and event loop.
//! - **`render`**, **`clock`**, **`format`**: output sinks, time source and labels.
//! - **`config`**, **`logging`**, **`error`**: configuration, tracing setup and errors.

pub mod bounds;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod format;
pub mod ingest;
pub mod lag;
pub mod logging;
pub mod model;
pub mod playback;
pub mod render;
pub mod scale;
pub mod scheduler;
pub mod slider;

pub use bounds::Bounds;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ScanConfig;
pub use error::{AppResult, ScanError};
pub use ingest::{DataStore, FetchSpec};
pub use model::{Channel, ChannelKind, PanelId, PanelSet};
pub use playback::{IdleOutcome, PlayMode, PlaybackSession, PlaybackState, SessionCommand, SessionConfig};
pub use render::{LogRenderer, NullRenderer, Renderer};
pub use scale::{round_humane, PanelScale, ScalingMode};
pub use scheduler::{FetchScheduler, IdleGuard};

pub use scan_client;
