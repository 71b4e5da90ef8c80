//! Scripted in-memory data server shared by the integration tests.
//!
//! Numeric channels answer with rows from an explicit script or, given a
//! clock, a single row lagging the clock by a fixed amount. Image channels
//! (`.jpg`) hold one frame per second between `OLDEST` and `NEWEST`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rust_scan::scan_client::{
    ClientError, DataQuery, DataResponse, DataSource, RefMode, ResponseHeaders, Result,
};
use rust_scan::{Clock, ManualClock, NullRenderer, PlaybackSession, SessionConfig};

/// Oldest data on the scripted server, ms.
pub const OLDEST: f64 = 1_000_000.0;
/// Newest data on the scripted server, ms.
pub const NEWEST: f64 = 2_000_000.0;
/// Spacing of image frames, ms.
pub const FRAME_STEP: f64 = 1_000.0;

#[derive(Default)]
pub struct ScriptedSource {
    rows: Mutex<HashMap<String, String>>,
    status: Mutex<HashMap<String, u16>>,
    silent: Mutex<HashSet<String>>,
    lag_clock: Option<(ManualClock, f64)>,
    pub queries: Mutex<Vec<DataQuery>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric channels deliver one row `lag_ms` behind `clock`.
    pub fn lagging(clock: ManualClock, lag_ms: f64) -> Self {
        Self {
            lag_clock: Some((clock, lag_ms)),
            ..Self::default()
        }
    }

    pub fn rows(self, channel: &str, body: &str) -> Self {
        self.rows.lock().unwrap().insert(channel.into(), body.into());
        self
    }

    pub fn fail(&self, channel: &str, status: u16) {
        self.status.lock().unwrap().insert(channel.into(), status);
    }

    pub fn silence(&self, channel: &str) {
        self.silent.lock().unwrap().insert(channel.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn limits() -> ResponseHeaders {
        ResponseHeaders {
            oldest: Some(OLDEST),
            newest: Some(NEWEST),
            ..ResponseHeaders::default()
        }
    }

    fn frame(query: &DataQuery) -> Option<f64> {
        let t = match query.reference {
            RefMode::Oldest => OLDEST,
            RefMode::Newest => NEWEST,
            RefMode::Absolute => query.time_ms.clamp(OLDEST, NEWEST),
            RefMode::Next => query.time_ms + FRAME_STEP,
            RefMode::Prev => query.time_ms - FRAME_STEP,
        };
        (OLDEST..=NEWEST).contains(&t).then_some(t)
    }

    fn numeric(&self, query: &DataQuery) -> String {
        if let Some(body) = self.rows.lock().unwrap().get(&query.channel) {
            return body.clone();
        }
        if let Some((clock, lag)) = &self.lag_clock {
            return format!("{},1.0\n", (clock.now_ms() - lag) / 1000.0);
        }
        let t = match query.reference {
            RefMode::Oldest => OLDEST,
            RefMode::Newest => NEWEST,
            _ => query.time_ms.clamp(OLDEST, NEWEST),
        };
        format!("{},1.0\n", t / 1000.0)
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch(&self, query: &DataQuery) -> Result<DataResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        // read before any await so the reply reflects issue-time state
        let silent = self.silent.lock().unwrap().contains(&query.channel);
        let status = self.status.lock().unwrap().get(&query.channel).copied();
        if silent {
            std::future::pending::<()>().await;
        }
        let body = self.numeric(query);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let gone = || ClientError::Status {
            status: 404,
            url: query.channel.clone(),
        };
        if let Some(status) = status {
            return Err(ClientError::Status {
                status,
                url: query.channel.clone(),
            });
        }
        if query.channel.ends_with(".jpg") {
            let t = Self::frame(query).ok_or_else(gone)?;
            return Ok(DataResponse {
                headers: ResponseHeaders {
                    time: Some(t),
                    ..Self::limits()
                },
                body: Bytes::from_static(b"\xff\xd8jpeg"),
            });
        }
        Ok(DataResponse::text(body).with_headers(Self::limits()))
    }
}

/// Paused session over `source` with a clock at `now`.
pub fn session(source: &Arc<ScriptedSource>, now: f64) -> (PlaybackSession<ScriptedSource>, ManualClock) {
    let clock = ManualClock::new(now);
    let s = PlaybackSession::new(
        Arc::clone(source),
        SessionConfig::default(),
        Arc::new(clock.clone()),
        Box::new(NullRenderer),
    );
    (s, clock)
}
