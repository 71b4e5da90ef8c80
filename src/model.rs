//! Channels and panels.
//!
//! A [`Channel`] is a server path plus its [`ChannelKind`]. Panels group
//! channels for display: a panel takes its kind from the first channel
//! added and may then hold any number of numeric channels, or exactly one
//! image or audio channel.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ScanError};

/// Trace colors, assigned by slot. Slots past the end reuse the last entry.
pub const PALETTE: [&str; 6] = [
    "#2020ee", "#ee1010", "#00dd00", "#880088", "#000000", "#808080",
];

/// Color for a channel slot within its panel.
#[must_use]
pub fn palette_color(slot: usize) -> &'static str {
    PALETTE[color_index(slot)]
}

/// Palette index for a channel slot within its panel.
#[must_use]
pub fn color_index(slot: usize) -> usize {
    slot.min(PALETTE.len() - 1)
}

/// Kind of data a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Time/value rows
    Numeric,
    /// One opaque frame per fetch
    Image,
    /// 16-bit PCM chunks
    Audio,
}

impl ChannelKind {
    /// Infer the kind from the channel path suffix.
    ///
    /// ```
    /// use rust_scan::model::ChannelKind;
    /// assert_eq!(ChannelKind::from_path("cam/front.jpg"), ChannelKind::Image);
    /// assert_eq!(ChannelKind::from_path("mic/left.wav"), ChannelKind::Audio);
    /// assert_eq!(ChannelKind::from_path("engine/rpm"), ChannelKind::Numeric);
    /// ```
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".jpg") {
            Self::Image
        } else if lower.ends_with(".pcm") || lower.ends_with(".mp3") || lower.ends_with(".wav") {
            Self::Audio
        } else {
            Self::Numeric
        }
    }

    /// Image and audio panels hold a single channel.
    #[must_use]
    pub fn is_exclusive(self) -> bool {
        !matches!(self, Self::Numeric)
    }

    /// Kinds rendered as a time series strip (numeric and audio).
    #[must_use]
    pub fn is_time_series(self) -> bool {
        !matches!(self, Self::Image)
    }
}

/// A server data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    path: String,
    kind: ChannelKind,
}

impl Channel {
    /// Create a channel, inferring its kind from the path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let kind = ChannelKind::from_path(&path);
        Self { path, kind }
    }

    /// Server path of the channel.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Kind of data on the channel.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Whether this is an audio channel stored as `.wav`.
    #[must_use]
    pub fn is_wav(&self) -> bool {
        self.path.to_ascii_lowercase().ends_with(".wav")
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Panel identifier, stable for the life of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelId(pub usize);

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

/// An ordered group of channels drawn together.
#[derive(Debug, Clone)]
pub struct Panel {
    id: PanelId,
    kind: Option<ChannelKind>,
    channels: Vec<Channel>,
}

impl Panel {
    fn new(id: PanelId) -> Self {
        Self {
            id,
            kind: None,
            channels: Vec::new(),
        }
    }

    /// Panel identifier.
    #[must_use]
    pub fn id(&self) -> PanelId {
        self.id
    }

    /// Kind fixed by the first channel, `None` while empty.
    #[must_use]
    pub fn kind(&self) -> Option<ChannelKind> {
        self.kind
    }

    /// Channels in slot order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Whether the panel has no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Whether `path` is in this panel.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.channels.iter().any(|c| c.path == path)
    }

    /// Slot of `path` within the panel.
    #[must_use]
    pub fn slot_of(&self, path: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.path == path)
    }

    /// Add a channel, returning its palette index.
    pub fn add_channel(&mut self, channel: Channel) -> AppResult<usize> {
        if self.contains(channel.path()) {
            return Err(ScanError::DuplicateChannel(channel.path));
        }
        if let Some(kind) = self.kind {
            if kind != channel.kind {
                return Err(ScanError::TypeMismatch {
                    channel: channel.path,
                    expected: kind,
                    found: channel.kind,
                });
            }
            if kind.is_exclusive() {
                return Err(ScanError::PanelFull(kind));
            }
        }
        self.kind = Some(channel.kind);
        self.channels.push(channel);
        Ok(color_index(self.channels.len() - 1))
    }

    /// Remove every channel; the panel kind becomes unset.
    pub fn clear(&mut self) -> Vec<Channel> {
        self.kind = None;
        std::mem::take(&mut self.channels)
    }
}

/// All panels of a session, in display order.
#[derive(Debug, Clone, Default)]
pub struct PanelSet {
    panels: Vec<Panel>,
    next_id: usize,
}

impl PanelSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty panel.
    pub fn create_panel(&mut self) -> PanelId {
        let id = PanelId(self.next_id);
        self.next_id += 1;
        self.panels.push(Panel::new(id));
        id
    }

    /// Add the channel at `path` to `panel`, returning its palette index.
    pub fn add_channel(&mut self, panel: PanelId, path: &str) -> AppResult<usize> {
        self.panel_mut(panel)?.add_channel(Channel::new(path))
    }

    /// Remove a panel, returning its channels so their buffers can be released.
    pub fn remove_panel(&mut self, panel: PanelId) -> AppResult<Vec<Channel>> {
        let idx = self
            .panels
            .iter()
            .position(|p| p.id == panel)
            .ok_or(ScanError::UnknownPanel(panel.0))?;
        let mut removed = self.panels.remove(idx);
        Ok(removed.clear())
    }

    /// Look up a panel.
    pub fn panel(&self, panel: PanelId) -> AppResult<&Panel> {
        self.panels
            .iter()
            .find(|p| p.id == panel)
            .ok_or(ScanError::UnknownPanel(panel.0))
    }

    fn panel_mut(&mut self, panel: PanelId) -> AppResult<&mut Panel> {
        self.panels
            .iter_mut()
            .find(|p| p.id == panel)
            .ok_or(ScanError::UnknownPanel(panel.0))
    }

    /// Panels in display order.
    #[must_use]
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Number of panels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// Whether there are no panels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// First occurrence of `path` across all panels.
    #[must_use]
    pub fn find_channel(&self, path: &str) -> Option<(PanelId, &Channel)> {
        self.panels.iter().find_map(|p| {
            p.channels
                .iter()
                .find(|c| c.path == path)
                .map(|c| (p.id, c))
        })
    }

    /// Every (panel, channel) pair in display order.
    pub fn channels(&self) -> impl Iterator<Item = (PanelId, &Channel)> {
        self.panels
            .iter()
            .flat_map(|p| p.channels.iter().map(move |c| (p.id, c)))
    }

    /// Distinct channels of one kind, in display order.
    #[must_use]
    pub fn channels_of_kind(&self, kind: ChannelKind) -> Vec<(PanelId, Channel)> {
        let mut seen = std::collections::HashSet::new();
        self.channels()
            .filter(|(_, c)| c.kind == kind && seen.insert(c.path.clone()))
            .map(|(p, c)| (p, c.clone()))
            .collect()
    }

    /// Whether every channel is an image channel (or there are none).
    #[must_use]
    pub fn is_image_only(&self) -> bool {
        self.channels().all(|(_, c)| c.kind == ChannelKind::Image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_suffix() {
        assert_eq!(ChannelKind::from_path("a/B.JPG"), ChannelKind::Image);
        assert_eq!(ChannelKind::from_path("a/b.pcm"), ChannelKind::Audio);
        assert_eq!(ChannelKind::from_path("a/b.mp3"), ChannelKind::Audio);
        assert_eq!(ChannelKind::from_path("a/b.txt"), ChannelKind::Numeric);
    }

    #[test]
    fn image_after_numeric_is_type_mismatch() {
        let mut set = PanelSet::new();
        let p = set.create_panel();
        set.add_channel(p, "Src/temp").unwrap();
        let err = set.add_channel(p, "Src/cam.jpg").unwrap_err();
        assert!(matches!(
            err,
            ScanError::TypeMismatch {
                expected: ChannelKind::Numeric,
                found: ChannelKind::Image,
                ..
            }
        ));
        assert_eq!(set.panel(p).unwrap().channels().len(), 1);
    }

    #[test]
    fn duplicate_channel_rejected() {
        let mut set = PanelSet::new();
        let p = set.create_panel();
        set.add_channel(p, "Src/temp").unwrap();
        assert!(matches!(
            set.add_channel(p, "Src/temp"),
            Err(ScanError::DuplicateChannel(_))
        ));
    }

    #[test]
    fn image_panel_holds_one_channel() {
        let mut set = PanelSet::new();
        let p = set.create_panel();
        set.add_channel(p, "Src/a.jpg").unwrap();
        assert!(matches!(
            set.add_channel(p, "Src/b.jpg"),
            Err(ScanError::PanelFull(ChannelKind::Image))
        ));
    }

    #[test]
    fn color_indices_round_robin_then_stick() {
        let mut set = PanelSet::new();
        let p = set.create_panel();
        let idx: Vec<usize> = (0..8)
            .map(|i| set.add_channel(p, &format!("Src/c{i}")).unwrap())
            .collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5, 5, 5]);
        assert_eq!(palette_color(0), "#2020ee");
        assert_eq!(palette_color(42), "#808080");
    }

    #[test]
    fn remove_panel_returns_channels() {
        let mut set = PanelSet::new();
        let a = set.create_panel();
        let b = set.create_panel();
        set.add_channel(a, "x").unwrap();
        set.add_channel(b, "y.jpg").unwrap();

        let removed = set.remove_panel(a).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(set.len(), 1);
        assert!(set.find_channel("x").is_none());
        assert_eq!(set.find_channel("y.jpg").map(|(p, _)| p), Some(b));
        assert!(set.is_image_only());
        assert!(matches!(set.remove_panel(a), Err(ScanError::UnknownPanel(0))));
    }

    #[test]
    fn channels_of_kind_dedupes_across_panels() {
        let mut set = PanelSet::new();
        let a = set.create_panel();
        let b = set.create_panel();
        set.add_channel(a, "x").unwrap();
        set.add_channel(b, "x").unwrap();
        set.add_channel(b, "z").unwrap();
        let numeric = set.channels_of_kind(ChannelKind::Numeric);
        assert_eq!(numeric.len(), 2);
        assert_eq!(numeric[0].0, a);
    }
}
