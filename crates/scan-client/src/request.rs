//! Fetch request description and GET URL construction.
//!
//! A [`DataQuery`] names one channel and a time window; [`DataQuery::to_url`]
//! renders it into the server's query-string form:
//!
//! ```text
//! <root>/<channel>?dt=s&f=b&d=<window s>&t=<anchor s>&r=<ref>&refresh=<n>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::connection::ServerAddress;
use crate::error::Result;

/// Anchor semantics of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefMode {
    /// Window starts at the explicit anchor time.
    Absolute,
    /// Window at the oldest available data.
    Oldest,
    /// Window at the newest available data.
    Newest,
    /// Frame following the anchor time.
    Next,
    /// Frame preceding the anchor time.
    Prev,
}

impl RefMode {
    /// Query-string value for the `r` parameter.
    #[must_use]
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Oldest => "oldest",
            Self::Newest => "newest",
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }

    /// Whether the request is anchored at a server limit rather than a time.
    #[must_use]
    pub fn is_limit(self) -> bool {
        matches!(self, Self::Oldest | Self::Newest)
    }

    /// Whether this steps to an adjacent discrete frame.
    #[must_use]
    pub fn is_step(self) -> bool {
        matches!(self, Self::Next | Self::Prev)
    }
}

impl fmt::Display for RefMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for RefMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "absolute" => Ok(Self::Absolute),
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            "next" => Ok(Self::Next),
            "prev" | "previous" => Ok(Self::Prev),
            _ => Err(format!("Unknown reference mode: {s}")),
        }
    }
}

/// Payload encoding requested with `dt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Text rows (`dt=s`)
    Strings,
    /// Raw binary payload (`dt=b`)
    Binary,
}

impl DataType {
    fn as_query(self) -> &'static str {
        match self {
            Self::Strings => "s",
            Self::Binary => "b",
        }
    }
}

/// Row format requested with `f` (text rows only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    /// `time,value` rows (`f=b`)
    TimeValue,
    /// Bare times (`f=t`)
    TimeOnly,
}

impl Format {
    fn as_query(self) -> &'static str {
        match self {
            Self::TimeValue => "b",
            Self::TimeOnly => "t",
        }
    }
}

/// One GET against the telemetry server.
#[derive(Debug, Clone, PartialEq)]
pub struct DataQuery {
    /// Channel path below the server root
    pub channel: String,
    /// Payload encoding
    pub data_type: DataType,
    /// Row format; only sent for [`DataType::Strings`]
    pub format: Option<Format>,
    /// Window length in milliseconds; `None` omits `d`
    pub duration_ms: Option<f64>,
    /// Anchor in milliseconds since epoch: window start for series and
    /// audio, frame time for images
    pub time_ms: f64,
    /// Anchor semantics
    pub reference: RefMode,
    /// Cache-buster counter, sent on non-absolute requests
    pub cache_buster: u64,
}

impl DataQuery {
    /// Time-series rows over `[time_ms, time_ms + duration_ms]`.
    #[must_use]
    pub fn series(channel: impl Into<String>, duration_ms: f64, time_ms: f64, reference: RefMode) -> Self {
        Self {
            channel: channel.into(),
            data_type: DataType::Strings,
            format: Some(Format::TimeValue),
            duration_ms: Some(duration_ms),
            time_ms,
            reference,
            cache_buster: 0,
        }
    }

    /// A single image frame at `time_ms`.
    #[must_use]
    pub fn frame(channel: impl Into<String>, time_ms: f64, reference: RefMode) -> Self {
        Self {
            channel: channel.into(),
            data_type: DataType::Binary,
            format: None,
            duration_ms: None,
            time_ms,
            reference,
            cache_buster: 0,
        }
    }

    /// A binary audio chunk over `[time_ms, time_ms + duration_ms]`.
    #[must_use]
    pub fn audio(channel: impl Into<String>, duration_ms: f64, time_ms: f64, reference: RefMode) -> Self {
        Self {
            channel: channel.into(),
            data_type: DataType::Binary,
            format: None,
            duration_ms: Some(duration_ms),
            time_ms,
            reference,
            cache_buster: 0,
        }
    }

    /// Probe for the newest timestamp of a channel.
    #[must_use]
    pub fn newest_time(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            data_type: DataType::Strings,
            format: Some(Format::TimeOnly),
            duration_ms: Some(0.0),
            time_ms: 0.0,
            reference: RefMode::Newest,
            cache_buster: 0,
        }
    }

    /// Set the cache-buster counter.
    #[must_use]
    pub fn with_cache_buster(mut self, counter: u64) -> Self {
        self.cache_buster = counter;
        self
    }

    /// Render the full request URL below `root`.
    pub fn to_url(&self, root: &ServerAddress) -> Result<Url> {
        let mut url = root.channel_url(&self.channel)?;
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("dt", self.data_type.as_query());
            if self.data_type == DataType::Strings {
                if let Some(format) = self.format {
                    query.append_pair("f", format.as_query());
                }
            }
            if let Some(duration) = self.duration_ms {
                query.append_pair("d", &seconds(duration.max(0.0)));
            }
            if !self.reference.is_limit() {
                query.append_pair("t", &seconds(self.time_ms.max(0.0)));
            }
            query.append_pair("r", self.reference.as_query());
            if self.reference != RefMode::Absolute {
                query.append_pair("refresh", &self.cache_buster.to_string());
            }
        }
        Ok(url)
    }
}

fn seconds(ms: f64) -> String {
    format!("{}", ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::AddressSource;

    fn root() -> ServerAddress {
        ServerAddress::parse("http://localhost:8000/RBNB", AddressSource::UserInput).unwrap()
    }

    #[test]
    fn test_series_url() {
        let q = DataQuery::series("Src/temp", 10_000.0, 1_500_000.0, RefMode::Absolute);
        let url = q.to_url(&root()).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/RBNB/Src/temp?dt=s&f=b&d=10&t=1500&r=absolute"
        );
    }

    #[test]
    fn test_frame_url_has_no_duration() {
        let q = DataQuery::frame("Src/cam.jpg", 2500.0, RefMode::Next).with_cache_buster(7);
        let url = q.to_url(&root()).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/RBNB/Src/cam.jpg?dt=b&t=2.5&r=next&refresh=7"
        );
    }

    #[test]
    fn test_limit_requests_omit_time() {
        let q = DataQuery::audio("Src/mic.pcm", 1000.0, 99_000.0, RefMode::Newest).with_cache_buster(3);
        let url = q.to_url(&root()).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/RBNB/Src/mic.pcm?dt=b&d=1&r=newest&refresh=3"
        );
    }

    #[test]
    fn test_negative_anchor_clamped() {
        let q = DataQuery::series("a", 500.0, -20.0, RefMode::Absolute);
        let url = q.to_url(&root()).unwrap();
        assert!(url.as_str().contains("t=0&"));
    }

    #[test]
    fn test_newest_probe_url() {
        let url = DataQuery::newest_time("a/b").to_url(&root()).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/RBNB/a/b?dt=s&f=t&d=0&r=newest&refresh=0"
        );
    }

    #[test]
    fn test_ref_mode_parse() {
        assert_eq!("Oldest".parse::<RefMode>().unwrap(), RefMode::Oldest);
        assert_eq!("previous".parse::<RefMode>().unwrap(), RefMode::Prev);
        assert!("sideways".parse::<RefMode>().is_err());
        assert!(RefMode::Next.is_step());
        assert!(!RefMode::Absolute.is_limit());
    }
}
