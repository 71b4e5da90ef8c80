//! Integration tests for the playback session against a scripted server.
//!
//! Time is paused (`start_paused`) so request latency, tick timers and the
//! idle watchdog run deterministically.

mod common;

use std::sync::Arc;

use common::{ScriptedSource, NEWEST, OLDEST};
use rust_scan::scan_client::RefMode;
use rust_scan::{
    IdleOutcome, NullRenderer, PlayMode, PlaybackSession, ScanError, SessionCommand,
    SessionConfig,
};
use tokio::sync::{mpsc, oneshot};

#[tokio::test(start_paused = true)]
async fn end_to_end_numeric_rows() {
    let source = Arc::new(ScriptedSource::new().rows("A", "10.0,5.2\n11.0,5.4\n"));
    let (mut session, _clock) = common::session(&source, 20_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();

    session.fetch("A", 1000.0, 10_000.0, RefMode::Absolute).unwrap();
    assert_eq!(session.wait_idle().await, IdleOutcome::Idle);

    let samples: Vec<_> = session
        .store()
        .series("A")
        .unwrap()
        .iter()
        .map(|s| (s.time, s.value))
        .collect();
    assert_eq!(samples, vec![(10_000.0, 5.2), (11_000.0, 5.4)]);
    assert!(session.bounds().newest().unwrap() >= 11_000.0);
    assert_eq!(session.store().param_time("A"), Some(11_000.0));
}

#[tokio::test(start_paused = true)]
async fn second_fetch_while_in_flight_is_dropped() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();

    assert!(session.fetch("A", 1000.0, OLDEST, RefMode::Absolute).unwrap().is_some());
    assert!(session.fetch("A", 1000.0, OLDEST, RefMode::Absolute).unwrap().is_none());
    session.wait_idle().await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_channel_is_an_error() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    assert!(matches!(
        session.fetch("nope", 1000.0, 0.0, RefMode::Absolute),
        Err(ScanError::UnknownChannel(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn completion_after_pause_is_discarded() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 1_500_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();

    session.start_realtime().unwrap();
    session.on_primary_tick();
    assert_eq!(session.scheduler().in_flight(), 1);
    let bounds_before = *session.bounds();

    session.pause();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(session.poll_completions(), 1);

    assert_eq!(*session.bounds(), bounds_before);
    assert!(session.store().series("A").unwrap().is_empty());
    assert_eq!(session.store().param_time("A"), None);
}

#[tokio::test(start_paused = true)]
async fn completion_after_leaving_paused_is_discarded() {
    let source = Arc::new(ScriptedSource::new().rows("A", "10.0,5.2\n11.0,5.4\n"));
    let (mut session, _clock) = common::session(&source, 20_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();

    session.fetch("A", 1000.0, 10_000.0, RefMode::Absolute).unwrap();
    session.start_realtime().unwrap();
    assert!(session.scheduler().is_idle());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(session.poll_completions(), 1);
    assert!(session.store().series("A").unwrap().is_empty());
    assert!(!session.bounds().is_known());
    assert_eq!(session.mode(), PlayMode::RealTime);
}

#[tokio::test(start_paused = true)]
async fn watchdog_gives_up_on_lost_response() {
    let source = Arc::new(ScriptedSource::new());
    source.silence("A");
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();
    session.add_channel(panel, "B").unwrap();

    // B answers, A never does; the refresh still completes
    let started = tokio::time::Instant::now();
    assert_eq!(session.go_eof().await, IdleOutcome::GaveUp);
    assert!(started.elapsed() >= SessionConfig::default().idle.budget());
    assert!(session.scheduler().is_idle());
    assert_eq!(session.store().param_time("B"), Some(NEWEST));
    assert_eq!(session.mode(), PlayMode::Paused);
}

#[tokio::test(start_paused = true)]
async fn gone_beyond_newest_pauses_playback() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();
    session.refresh_limits().await;
    assert_eq!(session.bounds().span(), Some((OLDEST, NEWEST)));

    source.fail("A", 410);
    session.start_playback(NEWEST - 100.0).unwrap();
    session.on_primary_tick();
    session.wait_idle().await;
    assert_eq!(session.mode(), PlayMode::Paused);
}

#[tokio::test(start_paused = true)]
async fn gone_inside_data_keeps_playing() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();
    session.refresh_limits().await;

    // a gap in the middle of the data
    source.fail("A", 404);
    session.start_playback(1_500_000.0).unwrap();
    session.on_primary_tick();
    session.wait_idle().await;
    assert_eq!(session.mode(), PlayMode::Playback);
}

#[tokio::test(start_paused = true)]
async fn lag_estimate_converges_to_constant_lag() {
    let clock = rust_scan::ManualClock::new(1_700_000_000_000.0);
    let source = Arc::new(ScriptedSource::lagging(clock.clone(), 500.0));
    let mut session = PlaybackSession::new(
        Arc::clone(&source),
        SessionConfig::default(),
        Arc::new(clock.clone()),
        Box::new(NullRenderer),
    );
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();
    session.start_realtime().unwrap();

    for _ in 0..70 {
        session.on_primary_tick();
        clock.advance(100.0);
        session.wait_idle().await;
    }
    let lag = session.lag().estimate();
    assert!((lag - 500.0).abs() / 500.0 < 0.05, "lag estimate {lag}");
    assert_eq!(session.mode(), PlayMode::RealTime);
}

#[tokio::test(start_paused = true)]
async fn realtime_and_playback_connect_only_through_paused() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);

    session.start_playback(1_500_000.0).unwrap();
    assert!(matches!(
        session.start_realtime(),
        Err(ScanError::InvalidTransition { .. })
    ));
    assert_eq!(session.mode(), PlayMode::Playback);

    session.transition(PlayMode::Paused).unwrap();
    session.transition(PlayMode::RealTime).unwrap();
    assert_eq!(session.mode(), PlayMode::RealTime);
    assert!(session.primary_active());
}

#[tokio::test(start_paused = true)]
async fn panels_stay_homogeneous() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    assert_eq!(session.add_channel(panel, "rbnb/temp").unwrap(), 0);
    assert_eq!(session.add_channel(panel, "rbnb/pres").unwrap(), 1);
    assert!(matches!(
        session.add_channel(panel, "rbnb/cam.jpg"),
        Err(ScanError::TypeMismatch { .. })
    ));
    assert!(matches!(
        session.add_channel(panel, "rbnb/temp"),
        Err(ScanError::DuplicateChannel(_))
    ));

    let images = session.create_panel();
    session.add_channel(images, "rbnb/cam.jpg").unwrap();
    assert!(matches!(
        session.add_channel(images, "rbnb/cam2.jpg"),
        Err(ScanError::PanelFull(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn seek_and_step_through_numeric_data() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();

    session.go_bof().await;
    let window = session.state().window;
    assert_eq!(session.display_time(), OLDEST + window);

    session.seek(50.0).await;
    let mid = OLDEST + window + 0.5 * (NEWEST - OLDEST - window);
    assert!((session.display_time() - mid).abs() < 1e-6);

    session.step_forward().await;
    assert!((session.display_time() - (mid + window)).abs() < 1e-6);
    session.step_backward().await;
    assert!((session.display_time() - mid).abs() < 1e-6);

    session.go_eof().await;
    assert_eq!(session.display_time(), NEWEST);
    assert_eq!(session.mode(), PlayMode::Paused);
}

#[tokio::test(start_paused = true)]
async fn image_frames_step_until_exhausted() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, _clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "cam.jpg").unwrap();
    assert_eq!(session.slider_window(), 0.0);

    session.go_eof().await;
    assert_eq!(session.display_time(), NEWEST);

    assert!(session.step_frame(RefMode::Prev).await);
    assert_eq!(session.display_time(), NEWEST - common::FRAME_STEP);
    assert!(session.step_frame(RefMode::Next).await);
    assert_eq!(session.display_time(), NEWEST);

    // past the newest frame the server answers 404
    assert!(session.step_frame(RefMode::Next).await);
    assert!(session.store().is_exhausted("cam.jpg", RefMode::Next));
    assert!(!session.step_frame(RefMode::Next).await);
    assert!(session.step_frame(RefMode::Prev).await);
}

#[tokio::test(start_paused = true)]
async fn run_loop_plays_until_end_of_data() {
    let source = Arc::new(ScriptedSource::new());
    let (mut session, clock) = common::session(&source, 5_000_000.0);
    let panel = session.create_panel();
    session.add_channel(panel, "A").unwrap();

    let (tx, rx) = mpsc::channel(8);
    let driver = tokio::spawn(async move {
        tx.send(SessionCommand::Seek(99.0)).await.unwrap();
        tx.send(SessionCommand::Play).await.unwrap();
        // let playback reach the end of the data
        for _ in 0..40 {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            clock.advance(1000.0);
        }
        let (resp, state) = oneshot::channel();
        tx.send(SessionCommand::State { response: resp }).await.unwrap();
        let state = state.await.unwrap();
        tx.send(SessionCommand::Shutdown).await.unwrap();
        state
    });

    session.run(rx).await;
    let state = driver.await.unwrap();
    assert_eq!(state.mode, PlayMode::Paused);
    assert_eq!(state.display_time, NEWEST);
    assert!(source.calls() > 3);
}
