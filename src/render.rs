//! Output sinks: chart drawing, frame display and audio playback.
//!
//! The engine decides *what* to show; a [`Renderer`] shows it. Drawing
//! libraries, image decoders and audio devices live behind this trait.

use tracing::{debug, info};

use crate::data::{AudioChunk, Frame, Sample};
use crate::model::PanelId;
use crate::playback::PlayMode;
use crate::scale::YRange;

/// One series of a panel, ready to draw.
#[derive(Debug, Clone)]
pub struct SeriesView {
    /// Channel path
    pub channel: String,
    /// Palette color
    pub color: &'static str,
    /// Points within the visible window
    pub samples: Vec<Sample>,
}

/// Everything needed to draw one strip-chart panel.
#[derive(Debug, Clone)]
pub struct PanelView {
    /// Panel being drawn
    pub panel: PanelId,
    /// Right edge of the visible window, ms since epoch
    pub right_edge: f64,
    /// Window length, ms
    pub window: f64,
    /// Y range, if any data has been measured
    pub range: Option<YRange>,
    /// Series in slot order
    pub series: Vec<SeriesView>,
}

/// Where the engine's output goes.
pub trait Renderer: Send {
    /// Draw a strip-chart panel.
    fn render_panel(&mut self, view: &PanelView);

    /// Show an image frame in a panel.
    fn show_frame(&mut self, panel: PanelId, channel: &str, frame: &Frame);

    /// Play an audio chunk.
    fn play_audio(&mut self, channel: &str, chunk: &AudioChunk);

    /// Display time and slider position changed.
    fn set_time(&mut self, time: f64, percent: f64);

    /// Mode changed.
    fn set_mode(&mut self, _mode: PlayMode) {}

    /// Requests are (or are no longer) outstanding.
    fn set_busy(&mut self, _busy: bool) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render_panel(&mut self, _view: &PanelView) {}
    fn show_frame(&mut self, _panel: PanelId, _channel: &str, _frame: &Frame) {}
    fn play_audio(&mut self, _channel: &str, _chunk: &AudioChunk) {}
    fn set_time(&mut self, _time: f64, _percent: f64) {}
}

/// Writes a line per event through `tracing`; used by the CLI.
#[derive(Debug, Default, Clone)]
pub struct LogRenderer {
    last_label: String,
}

impl Renderer for LogRenderer {
    fn render_panel(&mut self, view: &PanelView) {
        for s in &view.series {
            let last = s.samples.last();
            info!(
                panel = %view.panel,
                channel = %s.channel,
                points = s.samples.len(),
                time = ?last.map(|p| crate::format::time_label(p.time, view.window / 1000.0, p.time)),
                value = last.map(|p| p.value),
                range = ?view.range.map(|r| (
                    crate::format::range_label(r.min, false),
                    crate::format::range_label(r.max, false)
                )),
                "panel"
            );
        }
    }

    fn show_frame(&mut self, panel: PanelId, channel: &str, frame: &Frame) {
        info!(%panel, channel, time = frame.time, bytes = frame.payload.len(), "frame");
    }

    fn play_audio(&mut self, channel: &str, chunk: &AudioChunk) {
        debug!(
            channel,
            samples = chunk.samples.len(),
            rate = chunk.sample_rate,
            "audio"
        );
    }

    fn set_time(&mut self, time: f64, percent: f64) {
        let label = crate::format::time_label(time, 0.0, time);
        if label != self.last_label {
            debug!(time = %label, percent = %format!("{percent:.1}"), "time");
            self.last_label = label;
        }
    }

    fn set_mode(&mut self, mode: PlayMode) {
        info!(%mode, "mode");
    }
}

#[cfg(test)]
pub(crate) mod recording {
    //! A renderer that records calls, shared with the session tests.

    use std::sync::{Arc, Mutex};

    use super::*;

    /// Calls seen by a [`RecordingRenderer`].
    #[derive(Debug, Default)]
    pub struct Recorded {
        pub panels: Vec<PanelView>,
        pub frames: Vec<(PanelId, String, f64)>,
        pub audio: Vec<(String, usize)>,
        pub times: Vec<(f64, f64)>,
        pub modes: Vec<PlayMode>,
    }

    #[derive(Debug, Default, Clone)]
    pub struct RecordingRenderer(pub Arc<Mutex<Recorded>>);

    impl Renderer for RecordingRenderer {
        fn render_panel(&mut self, view: &PanelView) {
            self.0.lock().unwrap().panels.push(view.clone());
        }
        fn show_frame(&mut self, panel: PanelId, channel: &str, frame: &Frame) {
            self.0
                .lock()
                .unwrap()
                .frames
                .push((panel, channel.to_string(), frame.time));
        }
        fn play_audio(&mut self, channel: &str, chunk: &AudioChunk) {
            self.0
                .lock()
                .unwrap()
                .audio
                .push((channel.to_string(), chunk.samples.len()));
        }
        fn set_time(&mut self, time: f64, percent: f64) {
            self.0.lock().unwrap().times.push((time, percent));
        }
        fn set_mode(&mut self, mode: PlayMode) {
            self.0.lock().unwrap().modes.push(mode);
        }
    }
}
